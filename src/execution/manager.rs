use super::unit::{SubmissionExecutor, UnitOfWork};
use crate::submission::SubmissionResult;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Asynchronous submissions of one document.
///
/// Results come back in the order units finish, not the order they were submitted.
#[derive(Debug)]
pub struct AsyncSubmissionManager {
    executor: Arc<dyn SubmissionExecutor>,
    sender: mpsc::UnboundedSender<SubmissionResult>,
    receiver: Mutex<mpsc::UnboundedReceiver<SubmissionResult>>,
    pending: AtomicUsize,
}

impl AsyncSubmissionManager {
    pub fn new(executor: Arc<dyn SubmissionExecutor>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            executor,
            sender,
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
        }
    }

    pub async fn submit(&self, unit: UnitOfWork) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        debug!(
            submission_id = %unit.effective_id,
            pending = self.pending_count(),
            "⏳ Unit of work submitted"
        );
        self.executor.execute(unit, self.sender.clone()).await;
    }

    /// Next completed result, if one is ready. Never waits.
    pub fn poll_completed(&self) -> Option<SubmissionResult> {
        let mut receiver = self.receiver.try_lock().ok()?;
        let result = receiver.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(result)
    }

    /// Wait for the next result; `None` once nothing is pending.
    pub async fn take_next(&self) -> Option<SubmissionResult> {
        if self.pending_count() == 0 {
            return None;
        }
        let result = self.receiver.lock().await.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(result)
    }

    /// Wait for every pending result, in completion order.
    pub async fn drain_all(&self) -> Vec<SubmissionResult> {
        let mut results = Vec::with_capacity(self.pending_count());
        while let Some(result) = self.take_next().await {
            results.push(result);
        }
        results
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Per-session registry of managers keyed by document uuid
#[derive(Debug)]
pub struct SessionSubmissionStore {
    executor: Arc<dyn SubmissionExecutor>,
    managers: DashMap<String, Arc<AsyncSubmissionManager>>,
}

impl SessionSubmissionStore {
    pub fn new(executor: Arc<dyn SubmissionExecutor>) -> Self {
        Self {
            executor,
            managers: DashMap::new(),
        }
    }

    /// The manager for `document_uuid`, created on first use.
    pub fn manager_for(&self, document_uuid: &str) -> Arc<AsyncSubmissionManager> {
        self.managers
            .entry(document_uuid.to_string())
            .or_insert_with(|| Arc::new(AsyncSubmissionManager::new(self.executor.clone())))
            .clone()
    }

    pub fn get(&self, document_uuid: &str) -> Option<Arc<AsyncSubmissionManager>> {
        self.managers
            .get(document_uuid)
            .map(|manager| manager.value().clone())
    }

    pub fn pending_count(&self, document_uuid: &str) -> usize {
        self.get(document_uuid)
            .map_or(0, |manager| manager.pending_count())
    }

    /// Forget a document; its outstanding units finish but their results are dropped.
    pub fn remove(&self, document_uuid: &str) -> Option<Arc<AsyncSubmissionManager>> {
        self.managers
            .remove(document_uuid)
            .map(|(_, manager)| manager)
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::unit::test_support::delayed_unit;
    use crate::execution::{InlineExecutor, TokioExecutor};
    use std::time::Duration;

    fn tokio_manager() -> AsyncSubmissionManager {
        AsyncSubmissionManager::new(Arc::new(TokioExecutor::current().unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_all_returns_completion_order() {
        let manager = tokio_manager();
        manager
            .submit(delayed_unit("first", Duration::from_millis(300)))
            .await;
        manager
            .submit(delayed_unit("second", Duration::from_millis(100)))
            .await;
        manager
            .submit(delayed_unit("third", Duration::from_millis(200)))
            .await;
        assert_eq!(manager.pending_count(), 3);

        let order: Vec<String> = manager
            .drain_all()
            .await
            .into_iter()
            .map(|result| result.effective_id)
            .collect();
        assert_eq!(order, vec!["second", "third", "first"]);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_completed_never_blocks() {
        let manager = tokio_manager();
        manager
            .submit(delayed_unit("slow", Duration::from_secs(10)))
            .await;

        assert!(manager.poll_completed().is_none());
        assert_eq!(manager.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.poll_completed().unwrap().effective_id, "slow");
        assert_eq!(manager.pending_count(), 0);
        assert!(manager.take_next().await.is_none());
    }

    #[tokio::test]
    async fn test_store_keeps_one_manager_per_document() {
        let store = SessionSubmissionStore::new(Arc::new(InlineExecutor));
        let a = store.manager_for("doc-a");
        let again = store.manager_for("doc-a");
        assert!(Arc::ptr_eq(&a, &again));

        a.submit(delayed_unit("x", Duration::ZERO)).await;
        assert_eq!(store.pending_count("doc-a"), 1);
        assert_eq!(store.pending_count("doc-b"), 0);

        store.manager_for("doc-b");
        assert_eq!(store.len(), 2);
        assert!(store.remove("doc-b").is_some());
        assert!(store.get("doc-b").is_none());
    }
}
