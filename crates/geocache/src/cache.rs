//! Geo cache service.
//!
//! Read-modify-write over a single persisted document. Failures never reach
//! the caller: the cache only saves backend round-trips, so a broken store
//! behaves like an empty one.

use cropmap_storage::{local_date, ClockRef, StoreRef, DAY_MS};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::entry::{CacheEntry, CacheHit, CacheTable, CachedLocation};
use crate::key::CacheKey;

/// Store key the mapping lives under.
pub const CACHE_KEY: &str = "crop_analysis_cache";

/// Maximum number of locations kept.
pub const MAX_CACHE_SIZE: usize = 50;

/// Entries expire this many days after creation.
pub const CACHE_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoCacheOptions {
    pub storage_key: String,
    pub max_entries: usize,
    pub retention_ms: i64,
}

impl Default for GeoCacheOptions {
    fn default() -> Self {
        Self {
            storage_key: CACHE_KEY.to_string(),
            max_entries: MAX_CACHE_SIZE,
            retention_ms: CACHE_EXPIRY_DAYS * DAY_MS,
        }
    }
}

pub struct GeoCache {
    store: StoreRef,
    clock: ClockRef,
    options: GeoCacheOptions,
}

impl GeoCache {
    pub fn new(store: StoreRef, clock: ClockRef) -> Self {
        Self::with_options(store, clock, GeoCacheOptions::default())
    }

    pub fn with_options(store: StoreRef, clock: ClockRef, options: GeoCacheOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &GeoCacheOptions {
        &self.options
    }

    /// The full mapping with expired entries removed.
    ///
    /// The purge is written back only when something expired.
    pub fn get(&self) -> CacheTable {
        let mut table = self.load();
        let purged = table.purge_expired(self.clock.now_ms(), self.options.retention_ms);
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
            self.save(&table);
        }
        table
    }

    /// Store `payload` for the rounded location, replacing any previous entry.
    pub fn put(&self, lat: f64, lon: f64, location_info: Option<Value>, payload: Value) {
        let mut table = self.get();
        let key = CacheKey::from_coords(lat, lon);

        table.insert(
            key.to_string(),
            CacheEntry {
                lat,
                lon,
                location_info,
                payload,
                timestamp: self.clock.now_ms(),
            },
        );
        table.retain_most_recent(self.options.max_entries);

        if self.save(&table) {
            debug!(key = %key, size = table.len(), "Location cached");
        }
    }

    pub fn lookup(&self, lat: f64, lon: f64) -> Option<CacheHit> {
        let key = CacheKey::from_coords(lat, lon);
        let table = self.get();
        let entry = table.get(key.as_str())?;

        debug!(key = %key, "Cache hit");
        Some(CacheHit {
            location_info: entry.location_info.clone(),
            payload: entry.payload.clone(),
            from_cache: true,
        })
    }

    /// Delete the entry for the rounded location. Persists even when absent.
    pub fn remove(&self, lat: f64, lon: f64) {
        let mut table = self.get();
        let key = CacheKey::from_coords(lat, lon);
        table.remove(key.as_str());

        if self.save(&table) {
            debug!(key = %key, "Location removed from cache");
        }
    }

    pub fn clear(&self) {
        match self.store.delete(&self.options.storage_key) {
            Ok(()) => info!("Cache cleared"),
            Err(e) => error!(error = %e, "Failed to clear cache"),
        }
    }

    /// Summaries of every live entry, in mapping order.
    pub fn list_all(&self) -> Vec<CachedLocation> {
        self.get()
            .iter()
            .map(|(_, entry)| CachedLocation {
                lat: entry.lat,
                lon: entry.lon,
                location_info: entry.location_info.clone(),
                timestamp: entry.timestamp,
                date: local_date(entry.timestamp).unwrap_or_default(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_empty()
    }

    fn load(&self) -> CacheTable {
        let raw = match self.store.read(&self.options.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheTable::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read cache, treating as empty");
                return CacheTable::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Corrupt cache document, treating as empty");
                CacheTable::new()
            }
        }
    }

    fn save(&self, table: &CacheTable) -> bool {
        let json = match serde_json::to_string(table) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize cache");
                return false;
            }
        };

        match self.store.write(&self.options.storage_key, &json) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to save cache");
                false
            }
        }
    }
}
