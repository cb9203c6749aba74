//! Configuration types and defaults for unijob.

use serde::{Deserialize, Serialize};

/// Execution strategy for the orphan reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReaperStrategy {
    /// One atomic store-scripted round trip (default, fastest).
    #[default]
    Scripted,
    /// Client-driven loop issuing one existence check per digest. Slower, but
    /// avoids a single long-running atomic operation under heavy load.
    ClientLoop,
}

impl ReaperStrategy {
    /// Parse a reaper strategy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scripted" => Some(Self::Scripted),
            "client_loop" => Some(Self::ClientLoop),
            _ => None,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_prefix() -> String {
    "uniq".to_string()
}
pub(crate) fn default_lock_timeout_ms() -> Option<u64> {
    Some(0)
}
pub(crate) fn default_changelog_history_size() -> usize {
    1_000
}
pub(crate) fn default_reaper_count() -> usize {
    1_000
}
pub(crate) fn default_reaper_interval_secs() -> u64 {
    600
}
