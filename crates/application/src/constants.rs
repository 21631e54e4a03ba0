/// Directory under the platform data dir holding the store.
pub const APP_DIR_NAME: &str = "cropmap";

/// SQLite file name inside [`APP_DIR_NAME`].
pub const DATABASE_FILE: &str = "store.db";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,cropmap=debug";
