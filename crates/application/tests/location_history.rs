//! End-to-end tests over an on-disk store.

use cropmap_application::{AppError, LocationHistory, PersistenceConfig};
use serde_json::json;
use tempfile::tempdir;

fn config_in(dir: &std::path::Path) -> PersistenceConfig {
    PersistenceConfig {
        database_path: Some(dir.join("data").join("store.db")),
        ..Default::default()
    }
}

#[test]
fn test_open_creates_database() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());

    LocationHistory::open(&config).unwrap();
    assert!(config.database_path().exists());
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());

    let id = {
        let app = LocationHistory::open(&config).unwrap();
        let stack = app.record_analysis(
            -12.05,
            -77.04,
            Some(json!({"display_name": "Lima"})),
            json!({"crop": "maize"}),
        );
        stack[0].id.clone()
    };

    let app = LocationHistory::open(&config).unwrap();
    assert_eq!(app.history().get_popup_by_id(&id).unwrap().lat, -12.05);
    let hit = app.cache().lookup(-12.05, -77.04).unwrap();
    assert!(hit.from_cache);
    assert_eq!(hit.location_info, Some(json!({"display_name": "Lima"})));

    let listed = app.cache().list_all();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].date.is_empty());
}

#[test]
fn test_open_rejects_invalid_config() {
    let dir = tempdir().unwrap();
    let config = PersistenceConfig {
        max_stack_entries: 0,
        ..config_in(dir.path())
    };

    assert!(matches!(
        LocationHistory::open(&config),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_open_reports_unusable_path() {
    let config = PersistenceConfig {
        database_path: Some("/dev/null/store.db".into()),
        ..Default::default()
    };

    assert!(matches!(
        LocationHistory::open(&config),
        Err(AppError::Storage(_))
    ));
}

#[test]
fn test_stats_after_recording() {
    let dir = tempdir().unwrap();
    let app = LocationHistory::open(&config_in(dir.path())).unwrap();

    app.record_analysis(1.0, 1.0, None, json!(1));
    app.record_analysis(2.0, 2.0, None, json!(2));

    let stats = app.history().stack_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.today, 2);
    assert_eq!(stats.this_week, 2);
    assert!(stats.oldest <= stats.newest);
}
