//! Drives submissions through preparation, the deferred two-pass protocol, strategy
//! selection and result application.
//!
//! Every failure inside an attempt becomes exactly one submit-error notification.
//! Finish notifications (submit-done, insert/delete) run after the attempt boundary, so
//! a failure while dispatching them is returned to the caller instead of being turned
//! into a second notification.

use super::context::SubmissionContext;
use super::prepare::document_to_submit;
use super::result::SubmissionResult;
use super::state::{ModelSubmission, PassEvent};
use crate::constants::media;
use crate::error::{EngineResult, ErrorKind, SubmissionError};
use crate::events::{SubmissionEvent, SubmissionTrigger, SubmitErrorInfo};
use crate::instance::DocumentModel;
use crate::logging::{log_error, log_submission_operation};
use crate::model::{FirstPassParameters, ResolvedSubmission, SecondPassParameters};
use crate::replacer::ReplaceContext;
use crate::serialization::{serialize, SerializationRequest};
use crate::transport::ConnectionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What handling a trigger led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// First pass done; waiting for the client round trip
    Deferred,
    /// Running asynchronously; the result arrives through the session manager
    Pending,
    /// Result applied and finish notifications dispatched
    Completed,
    /// One submit-error notification was dispatched
    Failed(ErrorKind),
    /// Another deferred submission is already active
    Ignored,
    /// Round trip received with no deferred submission to resume
    NoDeferredSubmission,
}

enum Prepared {
    Ready(Arc<ResolvedSubmission>),
    Deferred,
    Ignored,
}

#[derive(Debug)]
pub struct SubmissionOrchestrator {
    ctx: SubmissionContext,
    submissions: HashMap<String, ModelSubmission>,
}

impl SubmissionOrchestrator {
    pub fn new(ctx: SubmissionContext) -> Self {
        Self {
            ctx,
            submissions: HashMap::new(),
        }
    }

    pub fn context(&self) -> &SubmissionContext {
        &self.ctx
    }

    /// Register a submission; replaces any previous one with the same id.
    pub fn register(&mut self, submission: ModelSubmission) {
        debug!(submission_id = %submission.id, model_id = %submission.model_id, "Registered submission");
        self.submissions.insert(submission.id.clone(), submission);
    }

    pub fn submission(&self, submission_id: &str) -> Option<&ModelSubmission> {
        self.submissions.get(submission_id)
    }

    fn submission_mut(&mut self, submission_id: &str) -> EngineResult<&mut ModelSubmission> {
        self.submissions
            .get_mut(submission_id)
            .ok_or_else(|| unknown_submission(submission_id))
    }

    fn transition(&mut self, submission_id: &str, event: PassEvent) -> EngineResult<()> {
        self.submission_mut(submission_id)?.transition(event).map(|_| ())
    }

    #[instrument(skip(self, doc, trigger), fields(trigger = trigger.name(), document = %doc.uuid()))]
    pub async fn handle(
        &mut self,
        doc: &mut dyn DocumentModel,
        trigger: SubmissionTrigger,
    ) -> EngineResult<SubmitOutcome> {
        match trigger {
            SubmissionTrigger::Submit { submission_id } => self.submit(doc, &submission_id).await,
            SubmissionTrigger::ClientRoundTrip => self.handle_client_round_trip(doc).await,
            SubmissionTrigger::ResultAvailable(result) => self.apply_result(doc, result),
        }
    }

    /// Handle a submit trigger on a registered submission.
    pub async fn submit(
        &mut self,
        doc: &mut dyn DocumentModel,
        submission_id: &str,
    ) -> EngineResult<SubmitOutcome> {
        let submission = self.submission_mut(submission_id)?;
        if submission.state().is_waiting_for_round_trip() {
            warn!(
                submission_id = %submission_id,
                "Submission is still waiting for its second pass, ignoring submit"
            );
            return Ok(SubmitOutcome::Ignored);
        }
        submission.transition(PassEvent::Start)?;
        self.run_attempt(doc, submission_id, false).await
    }

    /// Resume the active deferred submission, if any.
    pub async fn handle_client_round_trip(
        &mut self,
        doc: &mut dyn DocumentModel,
    ) -> EngineResult<SubmitOutcome> {
        let Some(submission_id) = doc.active_deferred_submission().map(str::to_string) else {
            debug!(document = %doc.uuid(), "Client round trip without a deferred submission");
            return Ok(SubmitOutcome::NoDeferredSubmission);
        };
        self.transition(&submission_id, PassEvent::Resume)?;
        doc.set_active_deferred_submission(None);
        info!(submission_id = %submission_id, "▶️ Resuming deferred submission");
        self.run_attempt(doc, &submission_id, true).await
    }

    /// Apply whatever asynchronous results are ready now. Never waits.
    ///
    /// A failing result does not stop the others from being applied; the first failure
    /// is returned once the ready results are exhausted.
    pub fn process_completed_async(
        &mut self,
        doc: &mut dyn DocumentModel,
    ) -> EngineResult<Vec<SubmitOutcome>> {
        let Some(manager) = self.ctx.sessions.get(doc.uuid()) else {
            return Ok(Vec::new());
        };
        let mut applied = AppliedResults::default();
        while let Some(result) = manager.poll_completed() {
            applied.record(self.apply_result(doc, result));
        }
        applied.finish()
    }

    /// Wait for and apply every pending asynchronous result, in completion order.
    ///
    /// Runs until nothing is pending, then returns the first failure if any result could
    /// not be applied.
    pub async fn process_all_async(
        &mut self,
        doc: &mut dyn DocumentModel,
    ) -> EngineResult<Vec<SubmitOutcome>> {
        let Some(manager) = self.ctx.sessions.get(doc.uuid()) else {
            return Ok(Vec::new());
        };
        let mut applied = AppliedResults::with_capacity(manager.pending_count());
        while let Some(result) = manager.take_next().await {
            applied.record(self.apply_result(doc, result));
        }
        applied.finish()
    }

    async fn run_attempt(
        &mut self,
        doc: &mut dyn DocumentModel,
        submission_id: &str,
        round_trip: bool,
    ) -> EngineResult<SubmitOutcome> {
        let submission = self
            .submissions
            .get(submission_id)
            .cloned()
            .ok_or_else(|| unknown_submission(submission_id))?;

        let attempt = match self.prepare(doc, &submission, round_trip) {
            Ok(Prepared::Ready(attempt)) => attempt,
            Ok(Prepared::Deferred) => {
                self.transition(submission_id, PassEvent::Defer)?;
                doc.set_active_deferred_submission(Some(submission_id.to_string()));
                log_submission_operation("first_pass", submission_id, None, "deferred", None);
                return Ok(SubmitOutcome::Deferred);
            }
            Ok(Prepared::Ignored) => {
                self.transition(submission_id, PassEvent::Complete)?;
                return Ok(SubmitOutcome::Ignored);
            }
            Err(error) => {
                self.transition(submission_id, PassEvent::Complete)?;
                return self.notify_failure(submission_id, error, None);
            }
        };
        self.transition(submission_id, PassEvent::Complete)?;

        let resource = attempt.p2.resource.clone();
        match self.ctx.strategies.connect(&self.ctx, attempt).await {
            Ok(Some(result)) => self.apply_result(doc, result),
            Ok(None) => {
                log_submission_operation("connect", submission_id, None, "pending", Some(&resource));
                Ok(SubmitOutcome::Pending)
            }
            Err(error) => self.notify_failure(submission_id, with_resource(error, &resource), None),
        }
    }

    /// Everything up to the connect: parameters, model upkeep, the document to submit
    /// and its serialization.
    fn prepare(
        &self,
        doc: &mut dyn DocumentModel,
        submission: &ModelSubmission,
        round_trip: bool,
    ) -> EngineResult<Prepared> {
        let declaration = submission.declaration.extract();
        let p = FirstPassParameters::compute(
            &*doc,
            &submission.id,
            &submission.model_id,
            declaration,
            round_trip,
            &self.ctx.config,
        )?;

        if p.is_deferred_first_pass() {
            if let Some(existing) = doc.active_deferred_submission() {
                warn!(
                    existing_submission = %existing,
                    new_submission = %submission.id,
                    "Another submission requiring a second pass already exists"
                );
                return Ok(Prepared::Ignored);
            }
        }

        let instance_id = p.bound_node.instance_id.clone();
        if p.serialize && doc.has_pending_uploads(&instance_id) {
            return Err(SubmissionError::preparation(
                "instance to submit has at least one pending upload",
            ));
        }

        let model_id = doc
            .instance(&instance_id)
            .map_or_else(|| submission.model_id.clone(), |instance| instance.model_id.clone());
        if p.validate || p.relevant {
            doc.rebuild(&model_id)?;
        }
        if p.relevant {
            doc.recalculate_revalidate(&model_id)?;
        }

        let document = if p.serialize {
            let bound = doc.element(&p.bound_node).ok_or_else(|| {
                SubmissionError::preparation(format!(
                    "bound node of submission '{}' disappeared",
                    submission.id
                ))
            })?;
            Some(document_to_submit(bound, p.relevant, p.validate)?)
        } else {
            None
        };

        if p.is_deferred_first_pass() {
            return Ok(Prepared::Deferred);
        }

        let p2 = SecondPassParameters::compute(&p, declaration, &self.ctx.config)?;
        let sp = serialize(SerializationRequest {
            kind: p.serialization,
            document: document.as_ref(),
            method: p.actual_method,
            options: &p2.output,
            separator: &p2.separator,
            resolved_mediatype: p.resolved_mediatype.as_deref(),
            resolver: self.ctx.resolver.as_ref(),
        })
        .map_err(|e| with_resource(e, &p2.resource))?;

        Ok(Prepared::Ready(Arc::new(ResolvedSubmission {
            document_uuid: doc.uuid().to_string(),
            p,
            p2,
            sp,
        })))
    }

    /// Run the replacer of a finished exchange, then its finish notification.
    pub fn apply_result(
        &self,
        doc: &mut dyn DocumentModel,
        result: SubmissionResult,
    ) -> EngineResult<SubmitOutcome> {
        let SubmissionResult {
            effective_id,
            outcome,
            connection,
            attempt,
        } = result;

        let Some(submission) = self.submissions.get(&effective_id) else {
            if let Some(connection) = &connection {
                connection.close();
            }
            return Err(unknown_submission(&effective_id));
        };
        let declaration = submission.declaration.clone();

        let replaced = outcome.and_then(|replacer| {
            replacer.replace(ReplaceContext {
                doc,
                container: &self.ctx.container,
                declaration: declaration.extract(),
                attempt: &attempt,
                connection: connection.as_ref(),
            })
        });

        match replaced {
            Ok(notification) => {
                if let Some(connection) = &connection {
                    connection.close();
                }
                log_submission_operation("replace", &effective_id, None, "completed", None);
                notification.run(self.ctx.dispatcher.as_ref())?;
                Ok(SubmitOutcome::Completed)
            }
            Err(error) => self.notify_failure(
                &effective_id,
                with_resource(error, &attempt.p2.resource),
                connection,
            ),
        }
    }

    /// Dispatch the single submit-error of a failed attempt.
    fn notify_failure(
        &self,
        submission_id: &str,
        error: SubmissionError,
        connection: Option<ConnectionResult>,
    ) -> EngineResult<SubmitOutcome> {
        let body = connection.as_ref().and_then(textual_body);
        if let Some(connection) = &connection {
            connection.close();
        }
        log_error("submission", "submit", &error.to_string(), Some(submission_id));

        let kind = error.kind;
        self.ctx.dispatcher.dispatch(
            submission_id,
            SubmissionEvent::SubmitError(SubmitErrorInfo::from_error(&error, body)),
        )?;
        Ok(SubmitOutcome::Failed(kind))
    }
}

/// Outcomes of a batch of asynchronous results, keeping the first failure
#[derive(Debug, Default)]
struct AppliedResults {
    outcomes: Vec<SubmitOutcome>,
    first_error: Option<SubmissionError>,
}

impl AppliedResults {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(capacity),
            first_error: None,
        }
    }

    fn record(&mut self, applied: EngineResult<SubmitOutcome>) {
        match applied {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(error) => {
                warn!(error = %error, "Applying an asynchronous result failed, continuing");
                self.first_error.get_or_insert(error);
            }
        }
    }

    fn finish(self) -> EngineResult<Vec<SubmitOutcome>> {
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(self.outcomes),
        }
    }
}

fn unknown_submission(submission_id: &str) -> SubmissionError {
    SubmissionError::internal(format!("no submission registered with id '{submission_id}'"))
}

fn with_resource(error: SubmissionError, resource: &str) -> SubmissionError {
    if error.resource_uri.is_some() || resource.is_empty() {
        error
    } else {
        error.with_resource(resource)
    }
}

/// Response body for diagnostics, when it is text or XML.
fn textual_body(connection: &ConnectionResult) -> Option<String> {
    let media_type = connection.media_type.as_deref()?;
    if !media::is_text(media_type) && !media::is_xml(media_type) {
        return None;
    }
    let body = connection.peek_body()?;
    String::from_utf8(body.to_vec()).ok()
}
