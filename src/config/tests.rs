//! Tests for configuration loading and validation.

use super::*;

#[test]
fn default_config_is_valid() {
    let config = Config::default();
    config.validate().unwrap();

    assert_eq!(config.prefix, "uniq");
    assert_eq!(config.default_lock_ttl_ms, None);
    assert_eq!(config.default_lock_timeout_ms, Some(0));
    assert_eq!(config.changelog_history_size, 1_000);
    assert_eq!(config.reaper, ReaperStrategy::Scripted);
    assert_eq!(config.reaper_count, 1_000);
    assert_eq!(config.reaper_interval_secs, 600);
    assert!(!config.log_duplicate_payloads);
}

#[test]
fn partial_yaml_fills_defaults() {
    let config = Config::from_yaml("prefix: jobs\nreaper_count: 50\n").unwrap();

    assert_eq!(config.prefix, "jobs");
    assert_eq!(config.reaper_count, 50);
    assert_eq!(config.changelog_history_size, 1_000);
    assert_eq!(config.reaper, ReaperStrategy::Scripted);
}

#[test]
fn unknown_yaml_fields_are_ignored() {
    let config = Config::from_yaml("prefix: jobs\nsome_future_field: 42\n").unwrap();
    assert_eq!(config.prefix, "jobs");
}

#[test]
fn reaper_strategy_parses_from_yaml() {
    let config = Config::from_yaml("reaper: client_loop\n").unwrap();
    assert_eq!(config.reaper, ReaperStrategy::ClientLoop);
}

#[test]
fn reaper_strategy_from_str() {
    assert_eq!(
        ReaperStrategy::from_str("scripted"),
        Some(ReaperStrategy::Scripted)
    );
    assert_eq!(
        ReaperStrategy::from_str("client_loop"),
        Some(ReaperStrategy::ClientLoop)
    );
    assert_eq!(ReaperStrategy::from_str("bogus"), None);
}

#[test]
fn null_timeout_means_wait_forever() {
    let config = Config::from_yaml("default_lock_timeout_ms: null\n").unwrap();
    assert_eq!(config.default_lock_timeout_ms, None);
    assert_eq!(config.default_lock_timeout(), None);
}

#[test]
fn empty_prefix_is_rejected() {
    let err = Config::from_yaml("prefix: \"\"\n").unwrap_err();
    assert!(err.to_string().contains("prefix must not be empty"));
}

#[test]
fn prefix_with_colon_is_rejected() {
    let err = Config::from_yaml("prefix: \"a:b\"\n").unwrap_err();
    assert!(err.to_string().contains("must not contain"));
}

#[test]
fn zero_changelog_history_is_rejected() {
    let err = Config::from_yaml("changelog_history_size: 0\n").unwrap_err();
    assert!(err.to_string().contains("changelog_history_size"));
}

#[test]
fn zero_reaper_count_is_rejected() {
    let err = Config::from_yaml("reaper_count: 0\n").unwrap_err();
    assert!(err.to_string().contains("reaper_count"));
}

#[test]
fn yaml_round_trip_preserves_values() {
    let mut config = Config::default();
    config.prefix = "jobs".to_string();
    config.default_lock_ttl_ms = Some(5_000);
    config.reaper = ReaperStrategy::ClientLoop;

    let yaml = config.to_yaml().unwrap();
    let parsed = Config::from_yaml(&yaml).unwrap();

    assert_eq!(parsed.prefix, "jobs");
    assert_eq!(parsed.default_lock_ttl_ms, Some(5_000));
    assert_eq!(parsed.reaper, ReaperStrategy::ClientLoop);
}

#[test]
fn load_reads_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unijob.yaml");
    std::fs::write(&path, "prefix: filecfg\nreaper_interval_secs: 30\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.prefix, "filecfg");
    assert_eq!(config.reaper_interval_secs, 30);
}

#[test]
fn load_missing_file_fails_with_path() {
    let err = Config::load("/nonexistent/unijob.yaml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/unijob.yaml"));
}
