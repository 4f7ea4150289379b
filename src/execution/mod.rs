//! # Execution
//!
//! Units of work, the executors that run them, and the per-session manager that
//! collects asynchronous completions in arrival order.

pub mod manager;
pub mod unit;

use crate::model::ResolvedSubmission;
use crate::submission::SubmissionResult;
use std::sync::Arc;
use tracing::debug;

pub use manager::{AsyncSubmissionManager, SessionSubmissionStore};
pub use unit::{run_unit, InlineExecutor, SubmissionExecutor, TokioExecutor, UnitOfWork};

/// Run `unit` now, or hand it to the session's manager when the attempt is asynchronous.
///
/// Returns `None` for asynchronous attempts: the result arrives later through the
/// manager.
pub async fn submit_callable(
    sessions: &SessionSubmissionStore,
    attempt: &Arc<ResolvedSubmission>,
    unit: UnitOfWork,
) -> Option<SubmissionResult> {
    if attempt.p2.is_async {
        debug!(
            submission_id = %attempt.effective_id(),
            document = %attempt.document_uuid,
            "⏳ Queuing asynchronous submission"
        );
        sessions
            .manager_for(&attempt.document_uuid)
            .submit(unit)
            .await;
        None
    } else {
        Some(run_unit(unit).await)
    }
}
