//! In-memory store with cross-context change signals.
//!
//! A `MemoryStore` is one *context* (think: one browser tab) looking at a
//! shared key-value map. [`MemoryStore::open_context`] opens another context
//! over the same data. Writes made through one context are signalled to the
//! `changes()` listeners of every other context, never to the writer itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cropmap_events::{Observers, StorageEvent};

use crate::{KeyValueStore, Result, StorageError};

struct Shared {
    data: Mutex<HashMap<String, String>>,
    contexts: Mutex<Vec<(u64, Observers<StorageEvent>)>>,
    next_context: AtomicU64,
    quota_bytes: Option<usize>,
}

impl Shared {
    fn data(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store mutex poisoned".to_string()))
    }

    fn register(&self) -> (u64, Observers<StorageEvent>) {
        let id = self.next_context.fetch_add(1, Ordering::SeqCst);
        let changes = Observers::new();
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, changes.clone()));
        (id, changes)
    }

    fn broadcast_from(&self, origin: u64, event: StorageEvent) {
        let targets: Vec<Observers<StorageEvent>> = self
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(id, _)| *id != origin)
            .map(|(_, obs)| obs.clone())
            .collect();
        for observers in targets {
            observers.notify(&event);
        }
    }
}

pub struct MemoryStore {
    shared: Arc<Shared>,
    context: u64,
    changes: Observers<StorageEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_shared(Shared {
            data: Mutex::new(HashMap::new()),
            contexts: Mutex::new(Vec::new()),
            next_context: AtomicU64::new(0),
            quota_bytes: None,
        })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once the total size of keys and values
    /// would exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self::with_shared(Shared {
            data: Mutex::new(HashMap::new()),
            contexts: Mutex::new(Vec::new()),
            next_context: AtomicU64::new(0),
            quota_bytes: Some(bytes),
        })
    }

    fn with_shared(shared: Shared) -> Self {
        let shared = Arc::new(shared);
        let (context, changes) = shared.register();
        Self {
            shared,
            context,
            changes,
        }
    }

    /// Open another context over the same data.
    pub fn open_context(&self) -> Self {
        let (context, changes) = self.shared.register();
        Self {
            shared: Arc::clone(&self.shared),
            context,
            changes,
        }
    }

    fn used_bytes_without(data: &HashMap<String, String>, key: &str) -> usize {
        data.iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shared
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(id, _)| *id != self.context);
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.shared.data()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let old_value = {
            let mut data = self.shared.data()?;
            if let Some(limit) = self.shared.quota_bytes {
                let needed = Self::used_bytes_without(&data, key) + key.len() + value.len();
                if needed > limit {
                    return Err(StorageError::QuotaExceeded {
                        key: key.to_string(),
                        needed,
                        limit,
                    });
                }
            }
            data.insert(key.to_string(), value.to_string())
        };

        if old_value.as_deref() != Some(value) {
            self.shared.broadcast_from(
                self.context,
                StorageEvent {
                    key: key.to_string(),
                    old_value,
                    new_value: Some(value.to_string()),
                },
            );
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let old_value = self.shared.data()?.remove(key);
        if old_value.is_some() {
            self.shared.broadcast_from(
                self.context,
                StorageEvent {
                    key: key.to_string(),
                    old_value,
                    new_value: None,
                },
            );
        }
        Ok(())
    }

    fn changes(&self) -> Option<&Observers<StorageEvent>> {
        Some(&self.changes)
    }
}
