//! Integration tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Priority order: command line > PULSEMIX_CONFIG > platform file > defaults
//! - Missing platform config file SHALL NOT cause termination
//! - An explicitly named but missing or malformed file is an error
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PULSEMIX_CONFIG or XDG_CONFIG_HOME are marked with
//! #[serial] so they run sequentially.

use pulsemix_common::config::{ConfigSource, TomlConfig, CONFIG_ENV_VAR};
use pulsemix_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("Failed to write config file");
    path
}

#[test]
#[serial]
fn test_command_line_path_takes_priority() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "cli.toml", "[server]\nbase_url = \"http://cli.local\"\n");
    let envf = write_config(&dir, "env.toml", "[server]\nbase_url = \"http://env.local\"\n");
    env::set_var(CONFIG_ENV_VAR, &envf);

    let (config, source) = TomlConfig::resolve(Some(&cli)).unwrap();

    assert_eq!(config.base_url(), "http://cli.local");
    assert_eq!(source, ConfigSource::CommandLine(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_variable_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let envf = write_config(
        &dir,
        "env.toml",
        "[server]\nbase_url = \"http://env.local:9000/\"\n[playback]\npreview_window_secs = 5\n",
    );
    env::set_var(CONFIG_ENV_VAR, &envf);

    let (config, source) = TomlConfig::resolve(None).unwrap();

    assert_eq!(config.base_url(), "http://env.local:9000");
    assert_eq!(config.playback.preview_window_secs, 5);
    // Unspecified sections fall back to defaults
    assert_eq!(config.output.media_type, "audio/mpeg");
    assert_eq!(source, ConfigSource::Environment(envf));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let result = TomlConfig::resolve(Some(&missing));

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let bad = write_config(&dir, "bad.toml", "[server\nbase_url = ");

    let result = TomlConfig::resolve(Some(&bad));

    assert!(matches!(result, Err(Error::Config(_))));
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_missing_platform_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let saved = env::var("XDG_CONFIG_HOME").ok();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let (config, source) = TomlConfig::resolve(None).unwrap();

    assert_eq!(source, ConfigSource::CompiledDefaults);
    assert_eq!(config.server.health_interval_secs, 6);

    match saved {
        Some(v) => env::set_var("XDG_CONFIG_HOME", v),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_platform_file_is_loaded_when_present() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let saved = env::var("XDG_CONFIG_HOME").ok();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let app_dir = dir.path().join("pulsemix");
    fs::create_dir_all(&app_dir).unwrap();
    fs::write(app_dir.join("config.toml"), "[output]\ndownload_prefix = \"beat\"\n").unwrap();

    let (config, source) = TomlConfig::resolve(None).unwrap();

    assert!(matches!(source, ConfigSource::PlatformDefault(_)));
    assert_eq!(config.output.download_prefix, "beat");

    match saved {
        Some(v) => env::set_var("XDG_CONFIG_HOME", v),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }
}
