//! Configuration loading tests
//!
//! Tests that the config file is created with defaults, read back, and
//! that the onboarding flag survives a restart

use readaloud::state::config::Config;
use readaloud::voice::{Gender, Provider};
use std::fs;
use std::time::Duration;

#[test]
fn test_config_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readaloud.cfg");

    let config = Config::load_from(&path).expect("Failed to load config");
    assert!(path.exists());
    assert_eq!(config.path(), &path);

    let settings = config.settings();
    assert_eq!(settings.rate, 1.0);
    assert_eq!(settings.language, "en-US");
    assert_eq!(settings.provider, Provider::Native);
    assert_eq!(config.max_chars(), 5000);
    assert!(!config.onboarding_shown());
}

#[test]
fn test_config_reads_user_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readaloud.cfg");
    fs::write(
        &path,
        "[speech]\nrate = 1.5\nlanguage = si-LK\ngender = female\nvoice = Hazel\n\n\
         [loader]\ninterval_ms = 50\nsettle_hits = 1\n",
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let settings = config.settings();
    assert_eq!(settings.rate, 1.5);
    assert_eq!(settings.language, "si-LK");
    assert_eq!(settings.gender, Some(Gender::Female));
    assert_eq!(config.voice().as_deref(), Some("Hazel"));

    // Missing keys fall back to defaults
    assert_eq!(settings.pitch, 1.0);
    let policy = config.retry_policy();
    assert_eq!(policy.interval, Duration::from_millis(50));
    assert_eq!(policy.settle_hits, 1);
    assert_eq!(policy.max_attempts, 20);
}

#[test]
fn test_onboarding_flag_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readaloud.cfg");

    let mut config = Config::load_from(&path).unwrap();
    assert!(!config.onboarding_shown());
    config.mark_onboarding_shown().unwrap();

    let reloaded = Config::load_from(&path).unwrap();
    assert!(reloaded.onboarding_shown());
}

#[test]
fn test_in_memory_config_never_writes() {
    let mut config = Config::in_memory();
    config.mark_onboarding_shown().unwrap();
    assert!(config.onboarding_shown());
    assert!(config.path().as_os_str().is_empty());
}
