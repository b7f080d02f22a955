//! Config loading and defaults integration tests

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use relief_sync::Config;
use tempfile::TempDir;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.api.base_url, "http://localhost:8000");
    assert_eq!(config.api.request_timeout(), Duration::from_secs(5));
    assert_eq!(config.api.route_timeout(), Duration::from_secs(10));
    assert_eq!(config.sync.centers_interval_ms, 10_000);
    assert_eq!(config.sync.requests_interval_ms, 5000);
    assert_eq!(config.sync.hazards_interval_ms, 0);
    assert!(config.sync.refresh_on_reconnect);
    assert_eq!(config.storage.data_dir, PathBuf::from("./relief-data"));
    assert_eq!(config.transit.tick(), Duration::from_millis(200));
    assert_eq!(config.guest.min_phone_digits, 10);
    assert_eq!(config.guest.max_verify_attempts, 5);
}

#[test]
fn test_partial_sections_fill_defaults() {
    let toml_str = r#"
[api]
base_url = "https://relief.example.org"

[sync]
requests_interval_ms = 2000
request_center_id = "3"

[guest]
max_verify_attempts = 3
"#;

    let config: Config = toml::from_str(toml_str).expect("valid TOML");
    assert_eq!(config.api.base_url, "https://relief.example.org");
    assert_eq!(config.api.request_timeout_ms, 5000);
    assert_eq!(config.sync.requests_interval_ms, 2000);
    assert_eq!(config.sync.centers_interval_ms, 10_000);
    assert_eq!(config.sync.request_center_id.as_deref(), Some("3"));
    assert_eq!(config.guest.max_verify_attempts, 3);
    assert_eq!(config.guest.code_ttl_secs, 300);
    assert_eq!(config.transit.tick_ms, 200);
}

#[test]
fn test_empty_file_is_all_defaults() {
    let config: Config = toml::from_str("").expect("empty TOML");
    assert_eq!(config.sync.probe_interval_ms, 15_000);
    assert_eq!(config.storage.data_dir, PathBuf::from("./relief-data"));
}

#[test]
fn test_load_or_default() {
    let dir = TempDir::new().unwrap();

    let missing = dir.path().join("absent.toml");
    let config = Config::load_or_default(&missing).unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8000");

    let path = dir.path().join("relief-sync.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[transit]\ntick_ms = 50").unwrap();
    let config = Config::load_or_default(&path).unwrap();
    assert_eq!(config.transit.tick(), Duration::from_millis(50));

    std::fs::write(&path, "[transit\n").unwrap();
    assert!(Config::load_or_default(&path).is_err());
}

#[test]
fn test_zero_tick_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relief-sync.toml");
    std::fs::write(&path, "[transit]\ntick_ms = 0\n").unwrap();

    let err = Config::load_or_default(&path).unwrap_err();
    assert!(err.to_string().contains("tick_ms"), "{}", err);
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.sync.request_center_id = Some("5".into());
    let text = toml::to_string(&config).unwrap();
    let back: Config = toml::from_str(&text).unwrap();
    assert_eq!(back.sync.request_center_id.as_deref(), Some("5"));
    assert_eq!(back.api.base_url, config.api.base_url);
}
