//! Loading through the public entry points with a `--config` style path.

use graphwatch_conf::{ConfigError, GraphwatchConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn explicit_path_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        "[paths]\nstate_dir = \"/srv/graphwatch\"\n\n[policy]\nsave_interval_ms = 20\n",
    )
    .unwrap();

    let (config, sources) = GraphwatchConfig::load_with_sources_from(Some(&path)).unwrap();
    assert!(sources.files.contains(&path));
    assert_eq!(config.policy.save_interval_ms, 20);
}

#[test]
fn broken_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[policy\n").unwrap();

    let err = GraphwatchConfig::load_from(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn missing_explicit_path_falls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let (_, sources) = GraphwatchConfig::load_with_sources_from(Some(&path)).unwrap();
    assert!(!sources.files.contains(&path));
}
