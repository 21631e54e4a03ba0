//! Event bus abstraction for decoupled event emission.
//!
//! Components publish named events with a JSON payload; whoever wires the
//! application decides where those events go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::observers::{Observers, Subscription};

/// Trait for emitting events to subscribers.
pub trait EventBus: Send + Sync {
    /// Emit an event with a JSON payload.
    ///
    /// # Arguments
    /// * `topic` - Event name/topic (e.g., "popup_stack:changed")
    /// * `payload` - JSON payload to emit
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

/// Type alias for shared event bus reference.
pub type EventBusRef = Arc<dyn EventBus>;

/// In-process event bus with per-topic listeners.
///
/// Every listener subscribed to a topic receives each payload emitted on it.
#[derive(Default)]
pub struct LocalEventBus {
    topics: Mutex<HashMap<String, Observers<serde_json::Value>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for events on `topic`.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, topic: &str, listener: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let observers = self
            .topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.to_string())
            .or_default()
            .clone();
        observers.subscribe(listener)
    }

    /// Number of live listeners on `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map_or(0, Observers::len)
    }
}

impl EventBus for LocalEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        let observers = self
            .topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .cloned();
        match observers {
            Some(observers) => observers.notify(&payload),
            None => tracing::trace!(topic, "Event emitted with no listeners"),
        }
    }
}

/// In-memory event bus for testing.
///
/// Captures all emitted events for later inspection.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<EmittedEvent>>,
}

/// A captured event from InMemoryEventBus.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn captured(&self) -> MutexGuard<'_, Vec<EmittedEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<EmittedEvent> {
        self.captured().clone()
    }

    /// Captured events on `topic`, oldest first.
    pub fn events_for(&self, topic: &str) -> Vec<EmittedEvent> {
        self.captured()
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// Most recent event on `topic`, if any.
    pub fn last_for(&self, topic: &str) -> Option<EmittedEvent> {
        self.captured()
            .iter()
            .rev()
            .find(|e| e.topic == topic)
            .cloned()
    }

    pub fn clear(&self) {
        self.captured().clear();
    }

    pub fn len(&self) -> usize {
        self.captured().len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured().is_empty()
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.captured().push(EmittedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Bus for components whose only observers subscribe to them directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn emit(&self, topic: &str, _payload: serde_json::Value) {
        tracing::trace!(topic, "Event dropped, no bus attached");
    }
}
