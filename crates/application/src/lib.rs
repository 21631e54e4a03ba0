mod config;
mod constants;
mod location_history;
mod logging;

pub use config::{ConfigError, PersistenceConfig};
pub use constants::*;
pub use location_history::{AppError, LocationHistory};
pub use logging::init_logging;

pub use cropmap_events::{event_names, LocalEventBus, Subscription};
pub use cropmap_geocache::{CacheHit, CachedLocation, GeoCache};
pub use cropmap_history::{HistoryStack, NewPopup, PopupEntry, StackStats};
