//! Configuration tests

use std::fs;

use tempfile::tempdir;

use crate::util::config::{load_config, save_config, BridgeConfig, ConfigError};
use crate::util::logger::LogLevel;

#[test]
fn test_defaults() {
    let config = BridgeConfig::default();
    assert_eq!(config.log.level, "info");
    assert_eq!(config.scope.large_scope_warning, 64);
    assert_eq!(config.registry.sweep_interval, 0);
    assert_eq!(config.log_level().unwrap(), LogLevel::Info);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = BridgeConfig::from_toml_str("[registry]\nsweep_interval = 10\n").unwrap();
    assert_eq!(config.registry.sweep_interval, 10);
    assert_eq!(config.scope.large_scope_warning, 64);
    assert_eq!(config.log.level, "info");
}

#[test]
fn test_empty_file() {
    assert_eq!(BridgeConfig::from_toml_str("").unwrap(), BridgeConfig::default());
}

#[test]
fn test_invalid_level_rejected() {
    let err = BridgeConfig::from_toml_str("[log]\nlevel = \"chatty\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidLogLevel(ref l) if l == "chatty"));
    assert!(err.to_string().contains("chatty"));
}

#[test]
fn test_parse_error() {
    let err = BridgeConfig::from_toml_str("[scope\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("uibridge.toml");

    let mut config = BridgeConfig::default();
    config.log.level = "debug".to_string();
    config.scope.large_scope_warning = 8;
    config.registry.sweep_interval = 100;

    save_config(&path, &config).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("[scope]"));
    assert!(text.contains("large_scope_warning = 8"));

    assert_eq!(load_config(&path).unwrap(), config);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}
