//! History stack service.
//!
//! Most recent first, bounded, persisted as one JSON array. Every successful
//! mutation is announced both on the event bus and to direct subscribers.

use std::sync::Arc;

use cropmap_events::{
    event_names, EventBusRef, NullEventBus, Observers, PopupStackChangedEvent, StorageEvent,
    Subscription,
};
use cropmap_storage::{ClockRef, StorageError, StoreRef, DAY_MS};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::popup::{wire_field, NewPopup, PopupEntry};
use crate::stats::StackStats;

/// Store key the stack lives under.
pub const POPUP_STACK_KEY: &str = "crop_analysis_popup_stack";

/// Maximum number of popups kept.
pub const MAX_POPUPS: usize = 20;

/// Popups expire this many days after creation.
pub const POPUP_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOptions {
    pub storage_key: String,
    pub max_entries: usize,
    pub retention_ms: i64,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            storage_key: POPUP_STACK_KEY.to_string(),
            max_entries: MAX_POPUPS,
            retention_ms: POPUP_EXPIRY_DAYS * DAY_MS,
        }
    }
}

pub struct HistoryStack {
    store: StoreRef,
    clock: ClockRef,
    bus: EventBusRef,
    options: HistoryOptions,
    listeners: Observers<Vec<PopupEntry>>,
}

impl HistoryStack {
    pub fn new(store: StoreRef, clock: ClockRef, bus: EventBusRef) -> Self {
        Self::with_options(store, clock, bus, HistoryOptions::default())
    }

    /// A stack with no bus attached. Changes still reach [`Self::subscribe`]
    /// listeners.
    pub fn standalone(store: StoreRef, clock: ClockRef) -> Self {
        Self::new(store, clock, Arc::new(NullEventBus))
    }

    pub fn with_options(
        store: StoreRef,
        clock: ClockRef,
        bus: EventBusRef,
        options: HistoryOptions,
    ) -> Self {
        Self {
            store,
            clock,
            bus,
            options,
            listeners: Observers::new(),
        }
    }

    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    /// The live stack, newest first. Expired popups are dropped and the
    /// result written back if anything expired.
    pub fn get_stack(&self) -> Vec<PopupEntry> {
        let mut stack = self.load();
        let before = stack.len();
        let now = self.clock.now_ms();
        stack.retain(|p| p.is_live(now, self.options.retention_ms));

        if stack.len() != before {
            debug!(purged = before - stack.len(), "Purged expired popups");
            if let Err(e) = self.write(&stack) {
                error!(error = %e, "Failed to save popup stack");
            }
        }
        stack
    }

    /// Push a new popup on top of the stack.
    pub fn add_popup(&self, data: NewPopup) -> Vec<PopupEntry> {
        let mut stack = self.get_stack();
        let now = self.clock.now_ms();

        let mut id = generate_id(now);
        while stack.iter().any(|p| p.id == id) {
            id = generate_id(now);
        }

        let popup = data.into_entry(id, now);
        info!(id = %popup.id, lat = popup.lat, lng = popup.lon, "Popup added to stack");

        stack.insert(0, popup);
        stack.truncate(self.options.max_entries);
        self.save(&stack);

        debug!(size = stack.len(), "Popup stack updated");
        stack
    }

    /// Remove the popup with `id`. Unknown ids leave the stack untouched.
    pub fn remove_popup(&self, id: &str) -> Vec<PopupEntry> {
        let mut stack = self.get_stack();
        let before = stack.len();
        stack.retain(|p| p.id != id);

        if stack.len() == before {
            debug!(id, "Popup not in stack");
            return stack;
        }

        self.save(&stack);
        info!(id, "Popup removed from stack");
        stack
    }

    pub fn clear_popup_stack(&self) -> Vec<PopupEntry> {
        let stack = Vec::new();
        self.save(&stack);
        info!("Popup stack cleared");
        stack
    }

    /// Shallow-merge `updates` into the popup with `id`.
    ///
    /// Keys may use wire names (`lng`, `cropData`, `locationInfo`) or API
    /// names (`lon`, `payload`, `location_info`). `id` and `timestamp` are
    /// always restored to their original values.
    pub fn update_popup(&self, id: &str, updates: Map<String, Value>) -> Vec<PopupEntry> {
        let mut stack = self.get_stack();
        let Some(index) = stack.iter().position(|p| p.id == id) else {
            debug!(id, "Popup not in stack");
            return stack;
        };

        let current = &stack[index];
        let merged = match merge_popup(current, updates) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(id, error = %e, "Rejected popup update");
                return stack;
            }
        };

        stack[index] = merged;
        self.save(&stack);
        info!(id, "Popup updated");
        stack
    }

    pub fn get_popup_by_id(&self, id: &str) -> Option<PopupEntry> {
        self.get_stack().into_iter().find(|p| p.id == id)
    }

    /// Move the popup with `id` to `new_index`.
    ///
    /// An index outside `0..len` (or an unknown id) leaves the stack as is;
    /// the popup is never clamped to an end. Any in-range index is saved and
    /// announced, including the popup's current one.
    pub fn reorder_popup(&self, id: &str, new_index: usize) -> Vec<PopupEntry> {
        let mut stack = self.get_stack();
        let Some(index) = stack.iter().position(|p| p.id == id) else {
            return stack;
        };
        if new_index >= stack.len() {
            debug!(id, new_index, "Reorder index out of range");
            return stack;
        }

        let popup = stack.remove(index);
        stack.insert(new_index, popup);
        self.save(&stack);
        info!(id, new_index, "Popup reordered");
        stack
    }

    pub fn stack_stats(&self) -> StackStats {
        let stack = self.get_stack();
        StackStats::compute(&stack, self.clock.now_ms())
    }

    /// Called with the new stack after every successful mutation made
    /// through this instance.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[PopupEntry]) + Send + Sync + 'static,
    {
        self.listeners
            .subscribe(move |stack: &Vec<PopupEntry>| listener(stack))
    }

    /// Called with the live stack whenever another context sharing the store
    /// rewrites it. `None` if the store cannot signal such changes.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn watch_external<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&[PopupEntry]) + Send + Sync + 'static,
    {
        let changes = self.store.changes()?;
        let key = self.options.storage_key.clone();
        let retention_ms = self.options.retention_ms;
        let clock = self.clock.clone();

        Some(changes.subscribe(move |event: &StorageEvent| {
            if event.key != key {
                return;
            }
            let mut stack = match event.new_value.as_deref() {
                Some(raw) => decode_stack(raw),
                None => Vec::new(),
            };
            let now = clock.now_ms();
            stack.retain(|p| p.is_live(now, retention_ms));
            listener(&stack);
        }))
    }

    fn load(&self) -> Vec<PopupEntry> {
        match self.store.read(&self.options.storage_key) {
            Ok(Some(raw)) => decode_stack(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read popup stack, treating as empty");
                Vec::new()
            }
        }
    }

    /// Persist without announcing. Returns the serialized entries.
    fn write(&self, stack: &[PopupEntry]) -> Result<Vec<Value>, StorageError> {
        let values = stack
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let json = serde_json::to_string(&values)?;
        self.store.write(&self.options.storage_key, &json)?;
        Ok(values)
    }

    /// Persist, then announce. Nothing is announced if the write fails.
    fn save(&self, stack: &[PopupEntry]) {
        let values = match self.write(stack) {
            Ok(values) => values,
            Err(e) => {
                error!(error = %e, "Failed to save popup stack");
                return;
            }
        };

        self.listeners.notify(&stack.to_vec());

        let event = PopupStackChangedEvent { stack: values };
        match serde_json::to_value(&event) {
            Ok(payload) => self.bus.emit(event_names::POPUP_STACK_CHANGED, payload),
            Err(e) => error!(error = %e, "Failed to encode popup stack event"),
        }
    }
}

/// `popup_{millis}_{9 random chars}`.
fn generate_id(now_ms: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("popup_{now_ms}_{}", &random[..9])
}

/// Parse a persisted stack. Anything that is not an array reads as empty;
/// malformed elements are skipped.
fn decode_stack(raw: &str) -> Vec<PopupEntry> {
    let values: Vec<Value> = match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Corrupt popup stack, treating as empty");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<PopupEntry>(value) {
            Ok(popup) => Some(popup),
            Err(e) => {
                warn!(error = %e, "Skipping malformed popup");
                None
            }
        })
        .collect()
}

fn merge_popup(current: &PopupEntry, updates: Map<String, Value>) -> serde_json::Result<PopupEntry> {
    let mut fields = match serde_json::to_value(current)? {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    for (name, value) in updates {
        fields.insert(wire_field(&name).to_string(), value);
    }
    fields.insert("id".to_string(), Value::String(current.id.clone()));
    fields.insert("timestamp".to_string(), Value::from(current.timestamp));

    serde_json::from_value(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropmap_events::InMemoryEventBus;
    use cropmap_storage::{KeyValueStore, ManualClock, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        bus: Arc<InMemoryEventBus>,
        stack: HistoryStack,
    }

    fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let bus = Arc::new(InMemoryEventBus::new());
        let stack = HistoryStack::new(store.clone(), clock.clone(), bus.clone());
        Fixture {
            store,
            clock,
            bus,
            stack,
        }
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id(T0);
        let prefix = format!("popup_{T0}_");
        assert!(id.starts_with(&prefix));
        assert_eq!(id.len(), prefix.len() + 9);
    }

    #[test]
    fn test_add_popup_emits_changed_event() {
        let f = setup();
        f.stack.add_popup(NewPopup::new(1.0, 2.0, json!({"crop": "maize"})));

        let events = f.bus.events_for(event_names::POPUP_STACK_CHANGED);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["stack"][0]["cropData"]["crop"], "maize");
    }

    #[test]
    fn test_get_stack_purge_is_not_announced() {
        let f = setup();
        f.stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        f.bus.clear();

        f.clock.advance(8 * DAY_MS);
        assert!(f.stack.get_stack().is_empty());
        assert!(f.bus.is_empty());
        assert_eq!(
            f.store.read(POPUP_STACK_KEY).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_update_popup_merges_and_keeps_identity() {
        let f = setup();
        let added = f.stack.add_popup(NewPopup::new(1.0, 2.0, json!({"v": 1})));
        let id = added[0].id.clone();
        f.clock.advance(1_000);

        let mut updates = Map::new();
        updates.insert("payload".into(), json!({"v": 2}));
        updates.insert("id".into(), json!("hijack"));
        updates.insert("timestamp".into(), json!(0));
        updates.insert("label".into(), json!("farm"));

        let stack = f.stack.update_popup(&id, updates);
        assert_eq!(stack[0].id, id);
        assert_eq!(stack[0].timestamp, T0);
        assert_eq!(stack[0].payload, json!({"v": 2}));
        assert_eq!(stack[0].extra["label"], "farm");
        assert_eq!(f.stack.get_popup_by_id(&id).unwrap().payload, json!({"v": 2}));
    }

    #[test]
    fn test_update_popup_rejects_invalid_merge() {
        let f = setup();
        let added = f.stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        let id = added[0].id.clone();
        f.bus.clear();

        let mut updates = Map::new();
        updates.insert("lat".into(), json!("north"));
        let stack = f.stack.update_popup(&id, updates);

        assert_eq!(stack[0].lat, 1.0);
        assert!(f.bus.is_empty());
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let f = setup();
        f.stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        f.bus.clear();

        let stack = f.stack.update_popup("popup_missing", Map::new());
        assert_eq!(stack.len(), 1);
        assert!(f.bus.is_empty());
    }

    #[test]
    fn test_write_failure_is_not_announced() {
        let store = Arc::new(MemoryStore::with_quota(32));
        let bus = Arc::new(InMemoryEventBus::new());
        let stack = HistoryStack::new(store, Arc::new(ManualClock::new(T0)), bus.clone());

        let result = stack.add_popup(NewPopup::new(1.0, 2.0, json!({"big": "x".repeat(64)})));
        assert_eq!(result.len(), 1);
        assert!(bus.is_empty());
        assert!(stack.get_stack().is_empty());
    }

    #[test]
    fn test_corrupt_stack_reads_as_empty() {
        let f = setup();
        f.store.write(POPUP_STACK_KEY, "{\"not\": \"an array\"}").unwrap();
        assert!(f.stack.get_stack().is_empty());

        f.store
            .write(POPUP_STACK_KEY, r#"[{"id": 5}, {"id": "popup_1_a", "lat": 1, "lng": 2, "cropData": {}, "timestamp": 1700000000000}]"#)
            .unwrap();
        let stack = f.stack.get_stack();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].id, "popup_1_a");
    }

    #[test]
    fn test_minimum_timestamp_is_purged() {
        let f = setup();
        f.store
            .write(
                POPUP_STACK_KEY,
                r#"[{"id": "p", "lat": 0, "lng": 0, "cropData": {}, "timestamp": -9223372036854775808}]"#,
            )
            .unwrap();

        assert!(f.stack.get_stack().is_empty());
        assert_eq!(f.store.read(POPUP_STACK_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(f.stack.stack_stats().total, 0);
    }

    #[test]
    fn test_reorder_to_current_index_persists_and_notifies() {
        let f = setup();
        f.stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        let added = f.stack.add_popup(NewPopup::new(3.0, 4.0, json!(2)));
        f.bus.clear();

        let stack = f.stack.reorder_popup(&added[1].id, 1);
        assert_eq!(stack, added);
        assert_eq!(f.bus.events_for(event_names::POPUP_STACK_CHANGED).len(), 1);
    }

    #[test]
    fn test_reorder_out_of_range_is_silent() {
        let f = setup();
        let added = f.stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        f.bus.clear();

        assert_eq!(f.stack.reorder_popup(&added[0].id, 1), added);
        assert_eq!(f.stack.reorder_popup("popup_missing", 0), added);
        assert!(f.bus.is_empty());
    }

    #[test]
    fn test_standalone_stack_notifies_subscribers() {
        let stack = HistoryStack::standalone(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(T0)),
        );
        let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));

        let s = Arc::clone(&sizes);
        let _sub = stack.subscribe(move |current| s.lock().unwrap().push(current.len()));
        stack.add_popup(NewPopup::new(1.0, 2.0, json!(1)));
        stack.clear_popup_stack();

        assert_eq!(*sizes.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_custom_options() {
        let store = Arc::new(MemoryStore::new());
        let stack = HistoryStack::with_options(
            store.clone(),
            Arc::new(ManualClock::new(T0)),
            Arc::new(InMemoryEventBus::new()),
            HistoryOptions {
                storage_key: "alt_stack".to_string(),
                max_entries: 2,
                retention_ms: DAY_MS,
            },
        );

        for i in 0..3 {
            stack.add_popup(NewPopup::new(i as f64, 0.0, json!(i)));
        }
        let current = stack.get_stack();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].lat, 2.0);
        assert!(store.read("alt_stack").unwrap().is_some());
    }
}
