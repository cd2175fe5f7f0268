//! Configuration loading tests
//!
//! Covers:
//! - Missing TOML files fall back to defaults without failing startup
//! - Malformed TOML is reported
//! - Environment variables override file values
//! - Round trip through write_config/load_config
//!
//! Tests that touch BOT_* variables are marked #[serial] so they never run
//! in parallel with each other.

use beabot_common::config::{
    load_config, write_config, BotConfig, ReversalScope, ENV_FILTER_FILE, ENV_MUSIC_DIR,
};
use beabot_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(ENV_MUSIC_DIR);
    env::remove_var(ENV_FILTER_FILE);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config = load_config(Some(&missing)).unwrap();
    assert_eq!(config, BotConfig::default());
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[playback\nmax_queue_length = ").unwrap();

    let result = load_config(Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [music]
        library_dir = "/from/file"

        [moderation]
        filter_file = "file_words.json"
        "#,
    )
    .unwrap();

    env::set_var(ENV_MUSIC_DIR, "/from/env");
    let config = load_config(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.music.library_dir, PathBuf::from("/from/env"));
    assert_eq!(config.moderation.filter_file, PathBuf::from("file_words.json"));
}

#[test]
#[serial]
fn test_write_then_load_round_trip() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut config = BotConfig::default();
    config.music.library_dir = temp_dir.path().join("library");
    config.playback.max_queue_length = 25;
    config.scheduler.reversal_scope = ReversalScope::OriginWorkspace;

    write_config(&config, &path).unwrap();
    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
#[serial]
fn test_invalid_values_rejected_on_load() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[scheduler]\nmax_attempts = 0\n").unwrap();

    assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
}

#[test]
fn test_ensure_directories_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = BotConfig::default();
    config.music.library_dir = temp_dir.path().to_path_buf();

    config.ensure_directories().unwrap();
    assert!(config.download_dir().is_dir());
    assert!(config.playlist_dir().is_dir());

    // Second call is a no-op
    config.ensure_directories().unwrap();
}
