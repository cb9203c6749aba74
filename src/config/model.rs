//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for the unijob lock engine.
///
/// Every component receives a reference to this value at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Key namespace
    // =========================================================================
    /// Global key prefix for every lock key (default: "uniq").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    // =========================================================================
    // Lock defaults
    // =========================================================================
    /// Default TTL in milliseconds applied to acquired locks.
    ///
    /// `None` (the default) means locks persist until explicitly unlocked;
    /// a crashed holder is then cleaned up by the reaper.
    #[serde(default)]
    pub default_lock_ttl_ms: Option<u64>,

    /// Default acquisition timeout in milliseconds.
    ///
    /// `Some(0)` (the default) means "try once, fail immediately on
    /// conflict". An explicit `null` in YAML means wait forever.
    #[serde(default = "default_lock_timeout_ms")]
    pub default_lock_timeout_ms: Option<u64>,

    /// Warn on stderr when a duplicate payload is rejected at submission.
    #[serde(default)]
    pub log_duplicate_payloads: bool,

    // =========================================================================
    // Changelog settings
    // =========================================================================
    /// Maximum number of changelog entries retained (default: 1000).
    #[serde(default = "default_changelog_history_size")]
    pub changelog_history_size: usize,

    // =========================================================================
    // Reaper settings
    // =========================================================================
    /// Reaper execution strategy.
    #[serde(default)]
    pub reaper: ReaperStrategy,

    /// Maximum number of orphans removed per reaper run (default: 1000).
    #[serde(default = "default_reaper_count")]
    pub reaper_count: usize,

    /// Seconds between reaper runs (default: 600).
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            default_lock_ttl_ms: None,
            default_lock_timeout_ms: default_lock_timeout_ms(),
            log_duplicate_payloads: false,
            changelog_history_size: default_changelog_history_size(),
            reaper: ReaperStrategy::default(),
            reaper_count: default_reaper_count(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}
