//! Configuration resolution and graceful degradation
//!
//! Tests that touch `RENTDESK_ROOT_FOLDER` / `RENTDESK_CONFIG` are marked
//! `#[serial]` so they never race on the process environment.

use rentdesk_common::config::{
    default_root_folder, resolve_root_folder, CliOverrides, ServiceConfig, TomlConfig,
    CONFIG_FILE_ENV, DEFAULT_PORT, ROOT_FOLDER_ENV,
};
use rentdesk_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_default_root_folder_is_not_empty() {
    let root = default_root_folder();
    assert!(!root.as_os_str().is_empty());
    assert!(root.ends_with("rentdesk") || root.ends_with("rentdesk_data"));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let toml_config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(None, &toml_config),
        PathBuf::from("/from/toml")
    );
    assert_eq!(resolve_root_folder(None, &TomlConfig::default()), default_root_folder());

    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_root_folder(None, &toml_config),
        PathBuf::from("/from/env")
    );
    assert_eq!(
        resolve_root_folder(Some(&PathBuf::from("/from/cli")), &toml_config),
        PathBuf::from("/from/cli")
    );

    // Blank values are ignored
    env::set_var(ROOT_FOLDER_ENV, "  ");
    assert_eq!(
        resolve_root_folder(None, &toml_config),
        PathBuf::from("/from/toml")
    );

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    env::remove_var(ROOT_FOLDER_ENV);

    let cli = CliOverrides {
        root_folder: Some(dir.path().to_path_buf()),
        config_file: Some(dir.path().join("does-not-exist.toml")),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&cli).expect("Missing config must not be fatal");

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.business_tz.offset_hours(), 8);
    assert_eq!(config.database_path(), dir.path().join("rentdesk.db"));
}

#[test]
#[serial]
fn test_config_file_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "port = 6001\nbusiness_utc_offset_hours = -5\nlog_level = \"debug\"\n",
    )
    .unwrap();

    env::remove_var(ROOT_FOLDER_ENV);
    env::set_var(CONFIG_FILE_ENV, &path);

    let cli = CliOverrides {
        root_folder: Some(dir.path().to_path_buf()),
        log_level: Some("warn".to_string()),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&cli).unwrap();
    env::remove_var(CONFIG_FILE_ENV);

    assert_eq!(config.port, 6001);
    assert_eq!(config.business_tz.offset_hours(), -5);
    // CLI beats TOML
    assert_eq!(config.log_level, "warn");
}

#[test]
#[serial]
fn test_malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = [not toml").unwrap();

    let cli = CliOverrides {
        root_folder: Some(dir.path().to_path_buf()),
        config_file: Some(path),
        ..Default::default()
    };

    assert!(matches!(ServiceConfig::resolve(&cli), Err(Error::Config(_))));
}

#[test]
fn test_out_of_range_offset_rejected() {
    let toml_config = TomlConfig {
        business_utc_offset_hours: Some(15),
        ..Default::default()
    };
    let cli = CliOverrides {
        root_folder: Some(PathBuf::from("/tmp/rentdesk-test")),
        ..Default::default()
    };

    assert!(matches!(
        ServiceConfig::from_sources(&cli, &toml_config),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_ensure_root_folder_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("root");
    let cli = CliOverrides {
        root_folder: Some(root.clone()),
        ..Default::default()
    };
    let config = ServiceConfig::from_sources(&cli, &TomlConfig::default()).unwrap();

    config.ensure_root_folder().unwrap();
    assert!(root.is_dir());
}
