//! Persisted key-value stores.
//!
//! Everything above this crate stores whole serialized documents under a
//! fixed key, so the only contract is read/write/delete of strings.

mod clock;
mod memory;
mod sqlite;

pub use clock::{local_date, Clock, ClockRef, ManualClock, SystemClock, DAY_MS, HOUR_MS, MINUTE_MS};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use cropmap_events::{Observers, StorageEvent};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("quota exceeded writing '{key}': {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A string key-value store holding whole serialized documents.
///
/// Writes replace the full value; there are no partial or keyed updates
/// inside a value, and no transactions across keys.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;

    /// Change signal for writes made through *other* handles sharing the
    /// same underlying data. `None` when the backend cannot observe them.
    fn changes(&self) -> Option<&Observers<StorageEvent>> {
        None
    }
}

/// Type alias for shared store reference.
pub type StoreRef = Arc<dyn KeyValueStore>;
