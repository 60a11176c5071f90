//! Integration tests for loading configuration files
//!
//! Covers the template written by `loadpulse config` and the error variant
//! produced by each loading phase (read, parse, validate).

use loadpulse::config::{CONFIG_TEMPLATE, Config};
use loadpulse::error::AppError;
use std::error::Error;
use std::fs;
use tempfile::TempDir;

fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

#[test]
fn test_template_written_to_disk_loads() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("loadpulse.toml");
    fs::write(&config_path, CONFIG_TEMPLATE).expect("Failed to write template");

    let config = Config::from_file(&config_path).expect("template should load");

    assert_eq!(config.target.base_url, "http://localhost:8080");
    assert_eq!(config.http.max_retries, 3);
    assert_eq!(config.load.max_concurrency, 50);
    assert_eq!(config.backends.jaeger_admin_url, "http://localhost:14269");
    assert!(config.notifier.chat_id.is_none());
}

#[test]
fn test_template_has_all_sections() {
    for section in [
        "[target]",
        "[http]",
        "[load]",
        "[backends]",
        "[notifier]",
        "[observability]",
    ] {
        assert!(CONFIG_TEMPLATE.contains(section), "Missing {}", section);
    }
    assert!(
        !CONFIG_TEMPLATE.contains("bot_token"),
        "the bot token must only come from the environment"
    );
}

#[test]
fn test_missing_file_is_a_read_error() {
    let temp_dir = create_temp_dir();
    let missing = temp_dir.path().join("absent.toml");

    let err = Config::from_file(&missing).unwrap_err();

    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(err.to_string().contains("absent.toml"));
    let source = err.source().expect("should keep the io error");
    assert!(source.is::<std::io::Error>());
}

#[test]
fn test_broken_toml_is_a_parse_error() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[target\nbase_url = ").unwrap();

    let err = Config::from_file(&config_path).unwrap_err();

    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    let source = err.source().expect("should keep the toml error");
    assert!(source.is::<toml::de::Error>());
}

#[test]
fn test_invalid_values_are_a_validation_error_naming_the_file() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("invalid.toml");
    fs::write(
        &config_path,
        "[target]\nbase_url = \"http://localhost:8080\"\n\n[load]\nmax_concurrency = 500\n",
    )
    .unwrap();

    let err = Config::from_file(&config_path).unwrap_err();

    match err {
        AppError::ConfigValidationFailed { path, reason } => {
            assert!(path.ends_with("invalid.toml"));
            assert!(reason.contains("load.max_concurrency=500"), "got: {}", reason);
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_scheme_in_backend_url_is_rejected() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("backends.toml");
    fs::write(
        &config_path,
        "[target]\nbase_url = \"http://localhost:8080\"\n\n[backends]\nloki_url = \"loki:3100\"\n",
    )
    .unwrap();

    let err = Config::from_file(&config_path).unwrap_err();

    assert!(err.to_string().contains("backends.loki_url"));
}
