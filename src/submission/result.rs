use crate::error::SubmissionError;
use crate::model::ResolvedSubmission;
use crate::replacer::Replacer;
use crate::transport::ConnectionResult;
use std::sync::Arc;

/// Outcome of one connect, produced by a strategy now or by a unit of work later.
///
/// Exactly one of replacer and failure is present. The connection, when any, is owned
/// by the result until the orchestrator closes it.
#[derive(Debug)]
pub struct SubmissionResult {
    pub effective_id: String,
    pub outcome: Result<Replacer, SubmissionError>,
    pub connection: Option<ConnectionResult>,
    pub attempt: Arc<ResolvedSubmission>,
}

impl SubmissionResult {
    pub fn success(
        attempt: Arc<ResolvedSubmission>,
        replacer: Replacer,
        connection: Option<ConnectionResult>,
    ) -> Self {
        Self {
            effective_id: attempt.effective_id().to_string(),
            outcome: Ok(replacer),
            connection,
            attempt,
        }
    }

    pub fn failure(
        attempt: Arc<ResolvedSubmission>,
        error: SubmissionError,
        connection: Option<ConnectionResult>,
    ) -> Self {
        Self {
            effective_id: attempt.effective_id().to_string(),
            outcome: Err(error),
            connection,
            attempt,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// Close the connection if there is one; later calls are no-ops.
    pub fn close_connection(&self) -> bool {
        self.connection.as_ref().is_some_and(ConnectionResult::close)
    }
}
