//! Rounded coordinate keys.
//!
//! Four decimal places is roughly 11 m at the equator, so repeated clicks on
//! the same field land in the same slot.

use std::fmt;

const SCALE: f64 = 10_000.0;

/// Round half-up to four decimals. `-0` comes back as `0`.
pub fn round_coord(value: f64) -> f64 {
    let rounded = (value * SCALE + 0.5).floor() / SCALE;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Cache slot for a (lat, lon) pair: `"{lat},{lon}"` with both rounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self(format!("{},{}", round_coord(lat), round_coord(lon)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
