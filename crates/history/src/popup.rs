//! Popup model: one saved analysis event in the history stack.

use cropmap_storage::{DAY_MS, HOUR_MS, MINUTE_MS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A saved analysis event.
///
/// Field names on the wire match what the browser client always wrote.
/// Fields this type does not know about are kept in `extra` and written
/// back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupEntry {
    /// Unique within the stack, never changes.
    pub id: String,
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
    #[serde(default)]
    pub location_info: Option<Value>,
    #[serde(rename = "cropData", default)]
    pub payload: Value,
    /// Creation time in milliseconds since epoch, never changes.
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PopupEntry {
    /// Younger than `retention_ms` at `now_ms`. An age that does not fit in
    /// an `i64` counts as expired.
    pub fn is_live(&self, now_ms: i64, retention_ms: i64) -> bool {
        now_ms
            .checked_sub(self.timestamp)
            .is_some_and(|age| age < retention_ms)
    }

    /// Short relative age label: `now`, `5m`, `3h`, `2d`.
    pub fn time_ago(&self, now_ms: i64) -> String {
        let diff = now_ms.saturating_sub(self.timestamp);
        let minutes = diff.div_euclid(MINUTE_MS);
        let hours = diff.div_euclid(HOUR_MS);
        let days = diff.div_euclid(DAY_MS);

        if minutes < 1 {
            "now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m")
        } else if hours < 24 {
            format!("{hours}h")
        } else {
            format!("{days}d")
        }
    }
}

/// Caller-supplied data for a new popup. The stack assigns `id` and
/// `timestamp`.
///
/// Deserializes from either the wire names (`lng`, `cropData`) or the API
/// names (`lon`, `payload`). Each pair names one field, so a document
/// carrying both `lng` and `lon` (or both `cropData` and `payload`) is
/// rejected as a duplicate field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPopup {
    pub lat: f64,
    #[serde(rename = "lng", alias = "lon")]
    pub lon: f64,
    #[serde(default)]
    pub location_info: Option<Value>,
    #[serde(rename = "cropData", alias = "payload", default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewPopup {
    pub fn new(lat: f64, lon: f64, payload: Value) -> Self {
        Self {
            lat,
            lon,
            location_info: None,
            payload,
            extra: Map::new(),
        }
    }

    pub fn with_location_info(mut self, location_info: Value) -> Self {
        self.location_info = Some(location_info);
        self
    }

    pub(crate) fn into_entry(self, id: String, timestamp: i64) -> PopupEntry {
        let mut extra = self.extra;
        extra.remove("id");
        extra.remove("timestamp");
        PopupEntry {
            id,
            lat: self.lat,
            lon: self.lon,
            location_info: self.location_info,
            payload: self.payload,
            timestamp,
            extra,
        }
    }
}

/// Map API field names used in an update onto their wire names.
pub(crate) fn wire_field(name: &str) -> &str {
    match name {
        "lon" => "lng",
        "payload" => "cropData",
        "location_info" => "locationInfo",
        other => other,
    }
}
