use super::{EventDispatcher, SubmissionEvent};
use crate::error::{EngineResult, SubmissionError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Receives notifications synchronously, before `dispatch` returns
pub trait SubmissionObserver: Send + Sync {
    fn on_event(&self, target: &str, event: &SubmissionEvent) -> EngineResult<()>;
}

/// Event dispatcher for submission notifications.
///
/// Registered observers run in registration order on the dispatching turn. Every event
/// is also broadcast as a [`PublishedEvent`] for passive listeners.
///
/// ```rust
/// use submission_core::events::{EventDispatcher, EventPublisher, SubmissionEvent, SubmitDoneInfo};
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::default();
/// let mut receiver = publisher.subscribe();
///
/// publisher
///     .dispatch("save", SubmissionEvent::SubmitDone(SubmitDoneInfo::default()))
///     .unwrap();
///
/// let published = receiver.recv().await.unwrap();
/// assert_eq!(published.name, "xforms-submit-done");
/// assert_eq!(published.target, "save");
/// # });
/// ```
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
    observers: Arc<RwLock<Vec<Arc<dyn SubmissionObserver>>>>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub target: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SubmissionObserver>) {
        self.observers.write().push(observer);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribers", &self.subscriber_count())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000) // Default capacity of 1000 events
    }
}

impl EventDispatcher for EventPublisher {
    fn dispatch(&self, target: &str, event: SubmissionEvent) -> EngineResult<()> {
        debug!(event = event.name(), target = %target, "📣 Dispatching submission event");

        // Snapshot so observers may register further observers without deadlocking
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_event(target, &event)?;
        }

        let context = serde_json::to_value(&event).map_err(|e| {
            SubmissionError::internal(format!("cannot serialize event context: {e}"))
        })?;
        let published = PublishedEvent {
            name: event.name().to_string(),
            target: target.to_string(),
            context,
            published_at: chrono::Utc::now(),
        };

        // No subscribers is fine: observers have already been notified
        let _ = self.sender.send(published);
        Ok(())
    }
}

/// Observer that keeps every notification it sees, for assertions and diagnostics
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(String, SubmissionEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, SubmissionEvent)> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl SubmissionObserver for RecordingObserver {
    fn on_event(&self, target: &str, event: &SubmissionEvent) -> EngineResult<()> {
        self.events.lock().push((target.to_string(), event.clone()));
        Ok(())
    }
}
