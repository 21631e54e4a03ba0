//! Shared event contracts for cropmap components.
//!
//! Defines the payloads that travel between the persistence layer and its
//! listeners, plus the `EventBus` trait and the observer registry used to
//! deliver them.

mod bus;
mod observers;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, LocalEventBus, NullEventBus};
pub use observers::{Observers, Subscription};

use serde::{Deserialize, Serialize};

/// Change signal raised by a key-value store shared between contexts.
///
/// Producers: stores whose contents are visible to more than one context
/// Consumers: history stack watchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// Value before the change.
    #[serde(default)]
    pub old_value: Option<String>,
    /// Value after the change; `None` when the key was deleted.
    #[serde(default)]
    pub new_value: Option<String>,
}

/// Event emitted after the popup stack has been persisted.
///
/// Producers: history stack
/// Consumers: history list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupStackChangedEvent {
    /// The full stack as persisted, newest first.
    pub stack: Vec<serde_json::Value>,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    /// Popup stack changed event.
    pub const POPUP_STACK_CHANGED: &str = "popup_stack:changed";
}
