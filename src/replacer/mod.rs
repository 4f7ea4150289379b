//! # Replacers
//!
//! A replacer consumes a successful exchange and applies it: to the original response
//! (`all`, redirects), to the document (`instance`, `text`), or not at all (`none`).
//! Parsing happens in [`Replacer::deserialize`], which may run on the worker pool;
//! [`Replacer::replace`] always runs on the caller's turn and hands back a
//! [`FinishNotification`] for the orchestrator to dispatch afterwards.

pub mod document;
pub mod response;

use crate::container::ContainerContext;
use crate::error::{EngineResult, SubmissionError};
use crate::events::{EventDispatcher, SubmissionEvent, SubmitDoneInfo};
use crate::instance::{DocumentModel, Element};
use crate::model::{ExtractedDeclaration, FirstPassParameters, ReplaceMode, ResolvedSubmission};
use crate::transport::ConnectionResult;
use tracing::{debug, warn};

pub use document::{InstanceReplacer, TextReplacer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacer {
    All,
    Instance(InstanceReplacer),
    Text(TextReplacer),
    None {
        /// The response already went to the client during connect
        direct_response: bool,
    },
    Redirect,
    /// The client loads the URL itself
    ClientLoad { url: String },
}

impl Replacer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Instance(_) => "instance",
            Self::Text(_) => "text",
            Self::None { .. } => "none",
            Self::Redirect => "redirect",
            Self::ClientLoad { .. } => "client-load",
        }
    }

    /// Instance replacer already holding its document, as served from the cache.
    pub fn prefilled_instance(document: Element) -> Self {
        Self::Instance(InstanceReplacer::prefilled(document))
    }

    /// Parse the response body where the replacer needs one.
    pub fn deserialize(&mut self, connection: &ConnectionResult) -> EngineResult<()> {
        match self {
            Self::Instance(replacer) => replacer.deserialize(connection),
            Self::Text(replacer) => replacer.deserialize(connection),
            _ => Ok(()),
        }
    }

    pub fn replace(self, mut ctx: ReplaceContext<'_>) -> EngineResult<FinishNotification> {
        debug!(
            submission_id = %ctx.attempt.effective_id(),
            replacer = self.name(),
            "🔁 Applying submission result"
        );
        match self {
            Self::All => response::replace_all(ctx),
            Self::Redirect => response::redirect(ctx),
            Self::Instance(replacer) => replacer.replace(ctx),
            Self::Text(replacer) => replacer.replace(ctx),
            Self::None { direct_response } => {
                if direct_response {
                    ctx.doc.mark_submission_replace_all();
                    return Ok(done_unless_second_pass(&ctx));
                }
                Ok(FinishNotification::submit_done(
                    ctx.attempt.effective_id(),
                    ctx.done_info(),
                ))
            }
            Self::ClientLoad { url } => {
                ctx.doc.schedule_client_load(url);
                Ok(FinishNotification::submit_done(
                    ctx.attempt.effective_id(),
                    ctx.done_info(),
                ))
            }
        }
    }
}

/// Pick the replacer for a finished exchange, or fail on statuses no replacer handles.
pub fn select_replacer(
    p: &FirstPassParameters,
    connection: &ConnectionResult,
) -> EngineResult<Replacer> {
    if connection.dont_handle_response {
        return Ok(Replacer::None {
            direct_response: true,
        });
    }

    if connection.is_success() {
        if connection.has_content() {
            return Ok(match p.replace {
                ReplaceMode::All => Replacer::All,
                ReplaceMode::Instance => Replacer::Instance(InstanceReplacer::new()),
                ReplaceMode::Text => Replacer::Text(TextReplacer::new()),
                ReplaceMode::None => Replacer::None {
                    direct_response: false,
                },
            });
        }
        if matches!(p.replace, ReplaceMode::Instance | ReplaceMode::Text) {
            warn!(
                submission_id = %p.effective_id,
                replace = %p.replace,
                status_code = connection.status_code,
                "Empty response body, skipping replacement"
            );
        }
        return Ok(Replacer::None {
            direct_response: false,
        });
    }

    if connection.is_redirect() {
        if p.replace == ReplaceMode::All {
            return Ok(Replacer::Redirect);
        }
        return Err(SubmissionError::transport(format!(
            "redirect code received with replace=\"{}\"",
            p.replace
        ))
        .with_status(connection.status_code)
        .with_resource(connection.resource_uri.clone()));
    }

    Err(
        SubmissionError::transport("error code received when submitting instance")
            .with_status(connection.status_code)
            .with_resource(connection.resource_uri.clone()),
    )
}

/// Everything a replacer may touch on the caller's turn
pub struct ReplaceContext<'a> {
    pub doc: &'a mut dyn DocumentModel,
    pub container: &'a ContainerContext,
    pub declaration: &'a ExtractedDeclaration,
    pub attempt: &'a ResolvedSubmission,
    pub connection: Option<&'a ConnectionResult>,
}

impl ReplaceContext<'_> {
    fn done_info(&self) -> SubmitDoneInfo {
        SubmitDoneInfo {
            resource_uri: Some(
                self.connection
                    .map_or_else(|| self.attempt.p2.resource.clone(), |c| c.resource_uri.clone()),
            ),
            status_code: self.connection.map(|c| c.status_code),
        }
    }
}

fn done_unless_second_pass(ctx: &ReplaceContext<'_>) -> FinishNotification {
    if ctx.attempt.p.is_deferred_second_pass() {
        FinishNotification::nothing()
    } else {
        FinishNotification::submit_done(ctx.attempt.effective_id(), ctx.done_info())
    }
}

/// Notifications to dispatch once a replacement has been applied
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinishNotification {
    events: Vec<(String, SubmissionEvent)>,
}

impl FinishNotification {
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn submit_done(effective_id: &str, info: SubmitDoneInfo) -> Self {
        Self {
            events: vec![(effective_id.to_string(), SubmissionEvent::SubmitDone(info))],
        }
    }

    /// Queue `event` ahead of any submit-done already queued.
    #[must_use]
    pub fn preceded_by(mut self, target: impl Into<String>, event: SubmissionEvent) -> Self {
        let position = self
            .events
            .iter()
            .position(|(_, queued)| queued.is_submit_done())
            .unwrap_or(self.events.len());
        self.events.insert(position, (target.into(), event));
        self
    }

    pub fn events(&self) -> &[(String, SubmissionEvent)] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn run(self, dispatcher: &dyn EventDispatcher) -> EngineResult<()> {
        for (target, event) in self.events {
            dispatcher.dispatch(&target, event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::SubmissionConfig;
    use crate::instance::{Element, InMemoryDocument, Instance};
    use crate::model::{
        FirstPassParameters, ResolvedSubmission, SecondPassParameters, SubmissionDeclaration,
    };
    use crate::serialization::SerializationParameters;

    pub fn document() -> InMemoryDocument {
        InMemoryDocument::new("doc")
            .with_instance(Instance::new(
                "main",
                "model",
                Element::new("order")
                    .with_child(Element::new("id").with_text("7"))
                    .with_child(Element::new("status").with_text("new")),
            ))
            .with_instance(Instance::new("results", "model", Element::new("results")))
    }

    pub fn attempt(
        doc: &InMemoryDocument,
        declaration: &SubmissionDeclaration,
        round_trip: bool,
    ) -> ResolvedSubmission {
        let config = SubmissionConfig::default();
        let p = FirstPassParameters::compute(
            doc,
            "save",
            "model",
            declaration.extract(),
            round_trip,
            &config,
        )
        .unwrap();
        let p2 = SecondPassParameters::compute(&p, declaration.extract(), &config).unwrap();
        let sp = SerializationParameters::empty(p.serialization, None);
        ResolvedSubmission {
            document_uuid: "doc".to_string(),
            p,
            p2,
            sp,
        }
    }
}
