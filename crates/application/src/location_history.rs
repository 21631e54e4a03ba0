//! Wiring for the two persistence components.

use std::sync::Arc;

use cropmap_events::LocalEventBus;
use cropmap_geocache::GeoCache;
use cropmap_history::{HistoryStack, NewPopup, PopupEntry};
use cropmap_storage::{ClockRef, MemoryStore, SqliteStore, StorageError, StoreRef, SystemClock};
use serde_json::Value;

use crate::config::{ConfigError, PersistenceConfig};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open store: {0}")]
    Storage(#[from] StorageError),
}

/// Geo cache and history stack sharing one store, one clock and one bus.
pub struct LocationHistory {
    cache: GeoCache,
    history: HistoryStack,
    events: Arc<LocalEventBus>,
}

impl LocationHistory {
    /// Open the SQLite store named by `config`.
    pub fn open(config: &PersistenceConfig) -> Result<Self, AppError> {
        config.validate()?;
        let path = config.database_path();
        let store = Arc::new(SqliteStore::open(&path)?);
        tracing::info!(path = %path.display(), "Location history opened");
        Ok(Self::from_parts(store, Arc::new(SystemClock), config))
    }

    /// Non-durable instance over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            &PersistenceConfig::default(),
        )
    }

    pub fn from_parts(store: StoreRef, clock: ClockRef, config: &PersistenceConfig) -> Self {
        let events = Arc::new(LocalEventBus::new());
        let cache = GeoCache::with_options(store.clone(), clock.clone(), config.cache_options());
        let history = HistoryStack::with_options(
            store,
            clock,
            events.clone(),
            config.history_options(),
        );
        Self {
            cache,
            history,
            events,
        }
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    /// Bus carrying `popup_stack:changed`.
    pub fn events(&self) -> &LocalEventBus {
        &self.events
    }

    /// Remember a freshly fetched result: cache it under its location and
    /// push it onto the history. Returns the updated history.
    pub fn record_analysis(
        &self,
        lat: f64,
        lon: f64,
        location_info: Option<Value>,
        payload: Value,
    ) -> Vec<PopupEntry> {
        self.cache
            .put(lat, lon, location_info.clone(), payload.clone());

        let mut popup = NewPopup::new(lat, lon, payload);
        popup.location_info = location_info;
        self.history.add_popup(popup)
    }
}
