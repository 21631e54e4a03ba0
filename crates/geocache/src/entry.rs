use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Last analysis result fetched for one rounded location.
///
/// Field names on the wire match what the browser client always wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Latitude as supplied by the caller, not rounded.
    pub lat: f64,
    /// Longitude as supplied by the caller, not rounded.
    #[serde(rename = "lng")]
    pub lon: f64,
    /// Reverse-geocode result.
    #[serde(default)]
    pub location_info: Option<Value>,
    /// Analysis result.
    #[serde(rename = "cropData", default)]
    pub payload: Value,
    /// Creation time in milliseconds since epoch.
    pub timestamp: i64,
}

impl CacheEntry {
    /// Younger than `retention_ms` at `now_ms`. An age that does not fit in
    /// an `i64` counts as expired.
    pub fn is_live(&self, now_ms: i64, retention_ms: i64) -> bool {
        now_ms
            .checked_sub(self.timestamp)
            .is_some_and(|age| age < retention_ms)
    }
}

/// Result of a successful [`GeoCache::lookup`](crate::GeoCache::lookup).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHit {
    pub location_info: Option<Value>,
    #[serde(rename = "cropData")]
    pub payload: Value,
    /// Always `true`; lets callers tell a replayed result from a fresh one.
    pub from_cache: bool,
}

/// Display summary produced by [`GeoCache::list_all`](crate::GeoCache::list_all).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLocation {
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
    pub location_info: Option<Value>,
    pub timestamp: i64,
    /// Local calendar date, `d/m/yyyy`.
    pub date: String,
}

/// The whole persisted mapping, rounded key -> entry, in insertion order.
///
/// Overwriting a key keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheTable {
    entries: Vec<(String, CacheEntry)>,
}

impl CacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entry)| entry)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) -> Option<CacheEntry> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, entry)),
            None => {
                self.entries.push((key, entry));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Drop entries created `retention_ms` or longer before `now_ms`.
    /// Returns how many were dropped.
    pub(crate) fn purge_expired(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(_, entry)| entry.is_live(now_ms, retention_ms));
        before - self.entries.len()
    }

    /// Keep only the `max` newest entries, reordered newest first.
    /// No-op when already within bounds.
    pub(crate) fn retain_most_recent(&mut self, max: usize) {
        if self.entries.len() <= max {
            return;
        }
        self.entries
            .sort_by(|(_, a), (_, b)| b.timestamp.cmp(&a.timestamp));
        self.entries.truncate(max);
    }
}

impl Serialize for CacheTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, e)| (k, e)))
    }
}

impl<'de> Deserialize<'de> for CacheTable {
    /// Members that do not parse as an entry are skipped; only a document
    /// that is not a JSON object at all is an error.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let Value::Object(map) = raw else {
            return Err(D::Error::custom("cache document is not a JSON object"));
        };

        let mut table = CacheTable::new();
        for (key, value) in map {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    table.insert(key, entry);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed cache entry");
                }
            }
        }
        Ok(table)
    }
}
