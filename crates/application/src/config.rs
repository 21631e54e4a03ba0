//! Persistence configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::{Path, PathBuf};

use cropmap_geocache::{GeoCacheOptions, CACHE_EXPIRY_DAYS, CACHE_KEY, MAX_CACHE_SIZE};
use cropmap_history::{HistoryOptions, MAX_POPUPS, POPUP_STACK_KEY};
use cropmap_storage::DAY_MS;
use serde::{Deserialize, Serialize};

use crate::constants::{APP_DIR_NAME, DATABASE_FILE};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Store key of the geo cache document.
    pub cache_key: String,
    /// Store key of the history stack document.
    pub stack_key: String,
    pub max_cache_entries: usize,
    pub max_stack_entries: usize,
    /// Retention window for both components.
    pub retention_days: i64,
    /// SQLite file; `None` means the platform data directory.
    pub database_path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_key: CACHE_KEY.to_string(),
            stack_key: POPUP_STACK_KEY.to_string(),
            max_cache_entries: MAX_CACHE_SIZE,
            max_stack_entries: MAX_POPUPS,
            retention_days: CACHE_EXPIRY_DAYS,
            database_path: None,
        }
    }
}

impl PersistenceConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded persistence config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_key.is_empty() || self.stack_key.is_empty() {
            return Err(ConfigError::Validation(
                "storage keys must not be empty".to_string(),
            ));
        }
        if self.cache_key == self.stack_key {
            return Err(ConfigError::Validation(format!(
                "cache_key and stack_key must differ (both '{}')",
                self.cache_key
            )));
        }
        if self.max_cache_entries == 0 || self.max_stack_entries == 0 {
            return Err(ConfigError::Validation(
                "entry limits must be positive".to_string(),
            ));
        }
        if self.retention_days <= 0 {
            return Err(ConfigError::Validation(format!(
                "retention_days must be positive, got {}",
                self.retention_days
            )));
        }
        if self.retention_days.checked_mul(DAY_MS).is_none() {
            return Err(ConfigError::Validation(format!(
                "retention_days is too large, got {}",
                self.retention_days
            )));
        }
        Ok(())
    }

    /// Configured database path, or `<data_local_dir>/cropmap/store.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join(DATABASE_FILE)
        })
    }

    pub fn cache_options(&self) -> GeoCacheOptions {
        GeoCacheOptions {
            storage_key: self.cache_key.clone(),
            max_entries: self.max_cache_entries,
            retention_ms: self.retention_ms(),
        }
    }

    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            storage_key: self.stack_key.clone(),
            max_entries: self.max_stack_entries,
            retention_ms: self.retention_ms(),
        }
    }

    /// Saturates for configs that skipped `validate`.
    fn retention_ms(&self) -> i64 {
        self.retention_days.saturating_mul(DAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_components() {
        let config = PersistenceConfig::default();
        assert_eq!(config.cache_options(), GeoCacheOptions::default());
        assert_eq!(config.history_options(), HistoryOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_is_default() {
        let config: PersistenceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PersistenceConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_stack_entries": 5, "database_path": "/tmp/x.db"}"#).unwrap();

        let config = PersistenceConfig::load(&path).unwrap();
        assert_eq!(config.max_stack_entries, 5);
        assert_eq!(config.max_cache_entries, MAX_CACHE_SIZE);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PersistenceConfig::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            PersistenceConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_shared_key() {
        let config = PersistenceConfig {
            stack_key: CACHE_KEY.to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_overflowing_retention() {
        let config: PersistenceConfig =
            serde_json::from_str(r#"{"retention_days": 200000000000000}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        assert_eq!(config.cache_options().retention_ms, i64::MAX);
        assert_eq!(config.history_options().retention_ms, i64::MAX);

        let config = PersistenceConfig {
            retention_days: 36_500,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let config = PersistenceConfig {
            max_cache_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PersistenceConfig {
            retention_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_database_path() {
        let path = PersistenceConfig::default().database_path();
        assert!(path.ends_with("cropmap/store.db"));
    }
}
