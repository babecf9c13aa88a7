// Settings Tests - defaults, validation and JSON persistence

use crate::storage::{IndexOrdering, Settings};
use crate::Error;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.api_base_url, "http://localhost:5000/api");
    assert_eq!(settings.poll_interval_ms, 4_000);
    assert_eq!(settings.request_timeout_ms, 10_000);
    assert!(!settings.narrow_viewport);
    assert_eq!(settings.conversation_ordering, IndexOrdering::UnreadFirst);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Settings::load(dir.path().join("absent.json")).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_load_empty_file_returns_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "  \n").expect("Failed to write");

    let settings = Settings::load(&path).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("settings.json");

    let settings = Settings {
        api_base_url: "https://rentals.example.com/api".to_string(),
        poll_interval_ms: 3_000,
        request_timeout_ms: 5_000,
        narrow_viewport: true,
        conversation_ordering: IndexOrdering::ServerOrder,
    };
    settings.save(&path).expect("Failed to save");

    let loaded = Settings::load(&path).expect("Failed to load");
    assert_eq!(loaded, settings);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"poll_interval_ms": 5000, "conversation_ordering": "server_order"}"#)
        .expect("Failed to write");

    let settings = Settings::load(&path).expect("Failed to load");
    assert_eq!(settings.poll_interval_ms, 5_000);
    assert_eq!(settings.conversation_ordering, IndexOrdering::ServerOrder);
    assert_eq!(settings.api_base_url, Settings::default().api_base_url);
}

#[test]
fn test_load_rejects_out_of_range_interval() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"poll_interval_ms": 10}"#).expect("Failed to write");

    let result = Settings::load(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_load_rejects_malformed_json() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{not json").expect("Failed to write");

    assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
}

#[test]
fn test_update_poll_interval_saves() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.update_poll_interval(3_000, &path).expect("Failed to update");
    assert_eq!(settings.poll_interval(), Duration::from_millis(3_000));

    let loaded = Settings::load(&path).expect("Failed to load");
    assert_eq!(loaded.poll_interval_ms, 3_000);
}

#[test]
fn test_update_poll_interval_rejects_invalid_and_keeps_previous() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");

    let mut settings = Settings::default();
    assert!(settings.update_poll_interval(0, &path).is_err());
    assert_eq!(settings.poll_interval_ms, 4_000);
    assert!(!path.exists());
}

#[test]
fn test_engine_options_from_settings() {
    let settings = Settings {
        poll_interval_ms: 3_000,
        narrow_viewport: true,
        ..Settings::default()
    };

    let options = settings.engine_options();
    assert_eq!(options.poll_interval, Duration::from_millis(3_000));
    assert!(options.narrow_viewport);
    assert_eq!(options.ordering, IndexOrdering::UnreadFirst);
    assert_eq!(settings.request_timeout(), Duration::from_millis(10_000));
}
