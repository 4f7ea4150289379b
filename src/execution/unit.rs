use crate::error::{EngineResult, SubmissionError};
use crate::model::ResolvedSubmission;
use crate::submission::SubmissionResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

/// A connect that yields its result later. Failures are values, never panics or errors.
pub struct UnitOfWork {
    pub effective_id: String,
    attempt: Arc<ResolvedSubmission>,
    future: BoxFuture<'static, SubmissionResult>,
}

impl UnitOfWork {
    pub fn new(
        attempt: Arc<ResolvedSubmission>,
        future: impl std::future::Future<Output = SubmissionResult> + Send + 'static,
    ) -> Self {
        Self {
            effective_id: attempt.effective_id().to_string(),
            attempt,
            future: future.boxed(),
        }
    }

    pub fn attempt(&self) -> &Arc<ResolvedSubmission> {
        &self.attempt
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("effective_id", &self.effective_id)
            .finish_non_exhaustive()
    }
}

/// Await the unit, turning a panic into an internal-error result.
pub async fn run_unit(unit: UnitOfWork) -> SubmissionResult {
    let UnitOfWork {
        effective_id,
        attempt,
        future,
    } = unit;

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(submission_id = %effective_id, panic = %message, "❌ Unit of work panicked");
            SubmissionResult::failure(
                attempt,
                SubmissionError::internal(format!("unit of work panicked: {message}")),
                None,
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Where units of work run
#[async_trait]
pub trait SubmissionExecutor: Send + Sync + std::fmt::Debug {
    /// Start `unit`; its result is sent on `completions` when done.
    async fn execute(&self, unit: UnitOfWork, completions: UnboundedSender<SubmissionResult>);
}

/// Runs units on the tokio worker pool
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime the caller is running on.
    pub fn current() -> EngineResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SubmissionError::internal(format!("no tokio runtime available: {e}")))
    }
}

#[async_trait]
impl SubmissionExecutor for TokioExecutor {
    async fn execute(&self, unit: UnitOfWork, completions: UnboundedSender<SubmissionResult>) {
        self.handle.spawn(async move {
            let result = run_unit(unit).await;
            // The manager may have been dropped with its session; the result is abandoned
            let _ = completions.send(result);
        });
    }
}

/// Runs units to completion on the calling task
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

#[async_trait]
impl SubmissionExecutor for InlineExecutor {
    async fn execute(&self, unit: UnitOfWork, completions: UnboundedSender<SubmissionResult>) {
        let _ = completions.send(run_unit(unit).await);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::instance::{Element, InMemoryDocument, Instance};
    use crate::model::{ResolvedSubmission, SubmissionDeclaration};
    use crate::replacer::Replacer;
    use crate::submission::SubmissionResult;
    use std::sync::Arc;
    use std::time::Duration;

    pub fn attempt(id: &str) -> Arc<ResolvedSubmission> {
        let doc = InMemoryDocument::new("doc")
            .with_instance(Instance::new("main", "model", Element::new("root")));
        let declaration = SubmissionDeclaration::new()
            .with("replace", "none")
            .with("mode", "asynchronous")
            .with("resource", "http://example.org/x");
        let mut attempt = crate::replacer::test_support::attempt(&doc, &declaration, false);
        attempt.p.effective_id = id.to_string();
        Arc::new(attempt)
    }

    /// Unit that finishes after `delay` with a none replacer.
    pub fn delayed_unit(id: &str, delay: Duration) -> super::UnitOfWork {
        let attempt = attempt(id);
        let inner = attempt.clone();
        super::UnitOfWork::new(attempt, async move {
            tokio::time::sleep(delay).await;
            SubmissionResult::success(
                inner,
                Replacer::None {
                    direct_response: false,
                },
                None,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{attempt, delayed_unit};
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn explode() -> SubmissionResult {
        panic!("connection exploded")
    }

    #[tokio::test]
    async fn test_panics_become_internal_errors() {
        let unit = UnitOfWork::new(attempt("boom"), explode());

        let result = run_unit(unit).await;
        let error = result.outcome.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Internal);
        assert!(error.message.contains("connection exploded"));
        assert_eq!(result.effective_id, "boom");
    }

    #[tokio::test]
    async fn test_inline_executor_completes_before_returning() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        InlineExecutor
            .execute(delayed_unit("a", Duration::ZERO), tx)
            .await;
        assert_eq!(rx.try_recv().unwrap().effective_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_executor_runs_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = TokioExecutor::current().unwrap();
        executor
            .execute(delayed_unit("a", Duration::from_millis(50)), tx)
            .await;
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await.unwrap().effective_id, "a");
    }
}
