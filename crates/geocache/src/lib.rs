//! Coordinate-keyed cache of crop analysis results.
//!
//! Remembers the last result fetched for each ~11 m cell so the caller can
//! skip a backend round-trip when the user clicks the same spot again.
//! Whether to consult it is entirely the caller's decision.

mod cache;
mod entry;
mod key;

pub use cache::{GeoCache, GeoCacheOptions, CACHE_EXPIRY_DAYS, CACHE_KEY, MAX_CACHE_SIZE};
pub use entry::{CacheEntry, CacheHit, CacheTable, CachedLocation};
pub use key::{round_coord, CacheKey};
