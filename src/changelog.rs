//! Changelog: the bounded append-only audit trail.
//!
//! Every mutating script appends one entry to the `<prefix>:changelog`
//! sorted set, scored by event time and trimmed to the configured history
//! size. Entries are single JSON objects so the log keeps working with
//! plain operational tooling.

use crate::config::Config;
use crate::error::Result;
use crate::keys::changelog_key;
use crate::store::Store;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One changelog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Event time as a float unix timestamp.
    pub time: f64,

    /// The lock digest the event concerns.
    pub digest: String,

    /// The token (execution id) that triggered the event.
    pub token: String,

    /// Which script recorded the event.
    pub script: String,

    /// Short event description (e.g. "locked", "not_holder").
    pub message: String,

    /// Who recorded the event (`user@HOST`).
    pub actor: String,
}

impl ChangelogEntry {
    /// The event time as a `DateTime`.
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt((self.time * 1000.0) as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Read access to the changelog.
#[derive(Clone)]
pub struct Changelog {
    store: Store,
    key: String,
}

impl Changelog {
    /// Create a changelog view for the configured prefix.
    pub fn new(store: &Store, config: &Config) -> Self {
        Self {
            store: store.clone(),
            key: changelog_key(&config.prefix),
        }
    }

    /// Number of retained entries.
    pub fn count(&self) -> Result<usize> {
        Ok(self.store.zcard(&self.key)?)
    }

    /// All retained entries, oldest first. Unparsable members are skipped.
    pub fn entries(&self) -> Result<Vec<ChangelogEntry>> {
        let members = self.store.zrange_with_scores(&self.key)?;
        Ok(members
            .into_iter()
            .filter_map(|(member, _)| serde_json::from_str(&member).ok())
            .collect())
    }

    /// A page of entries, oldest first. Returns `(total, next_cursor,
    /// entries)`; a next cursor of 0 means the scan is complete.
    pub fn page(&self, cursor: usize, page_size: usize) -> Result<(usize, usize, Vec<ChangelogEntry>)> {
        let members = self.store.zrange_with_scores(&self.key)?;
        let total = members.len();

        let page: Vec<ChangelogEntry> = members
            .into_iter()
            .skip(cursor)
            .take(page_size)
            .filter_map(|(member, _)| serde_json::from_str(&member).ok())
            .collect();

        let consumed = cursor + page_size;
        let next_cursor = if consumed >= total { 0 } else { consumed };

        Ok((total, next_cursor, page))
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let count = self.store.zcard(&self.key)?;
        self.store.del(&self.key);
        Ok(count)
    }
}

/// The `user@HOST` string recorded as the changelog actor.
pub(crate) fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
