//! The digest registry: every digest with live lock state, queryable.
//!
//! The registry is a sorted set scored by registration time. Acquisition
//! registers a digest, release and reaping unregister it; this module adds
//! the query and administrative side: pattern listing, cursor pagination,
//! and deletion by digest or by glob pattern.

use crate::config::Config;
use crate::error::{Result, UnijobError};
use crate::keys::digests_key;
use crate::script::{Gateway, Script, now_f, time_args};
use crate::store::Store;
use globset::Glob;

/// Default number of entries fetched per query.
pub const DEFAULT_COUNT: usize = 1000;

/// Pattern matching every digest.
pub const SCAN_PATTERN: &str = "*";

/// One registry entry: a digest and its registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestEntry {
    pub digest: String,
    pub registered_at: f64,
}

/// Query and administration handle for the digest registry.
pub struct Digests {
    store: Store,
    gateway: Gateway,
    config: Config,
    key: String,
}

impl Digests {
    /// Create a handle over the registry under the configured prefix.
    pub fn new(store: &Store, config: &Config) -> Self {
        Self {
            store: store.clone(),
            gateway: Gateway::new(store),
            config: config.clone(),
            key: digests_key(&config.prefix),
        }
    }

    /// Number of registered digests.
    pub fn count(&self) -> Result<usize> {
        Ok(self.store.zcard(&self.key)?)
    }

    /// Register a digest directly, outside the lock protocol. Used by
    /// tooling that reconstructs registry state.
    pub fn add(&self, digest: &str) -> Result<bool> {
        Ok(self.store.zadd(&self.key, now_f(), digest)?)
    }

    /// Registered digests matching a glob pattern, oldest first, capped at
    /// `count`.
    pub fn entries(&self, pattern: &str, count: usize) -> Result<Vec<DigestEntry>> {
        let matcher = compile_pattern(pattern)?;
        Ok(self
            .store
            .zrange_with_scores(&self.key)?
            .into_iter()
            .filter(|(digest, _)| matcher.is_match(digest))
            .take(count)
            .map(|(digest, registered_at)| DigestEntry {
                digest,
                registered_at,
            })
            .collect())
    }

    /// One page of matching digests.
    ///
    /// `cursor` is an opaque offset; the returned cursor is `0` when the
    /// scan is complete, otherwise it is passed to the next call. Also
    /// returns the total number of digests matching the pattern so callers
    /// can show progress.
    pub fn page(
        &self,
        cursor: usize,
        pattern: &str,
        page_size: usize,
    ) -> Result<(usize, usize, Vec<DigestEntry>)> {
        let matcher = compile_pattern(pattern)?;
        let matching: Vec<(String, f64)> = self
            .store
            .zrange_with_scores(&self.key)?
            .into_iter()
            .filter(|(digest, _)| matcher.is_match(digest))
            .collect();
        let total = matching.len();

        let entries: Vec<DigestEntry> = matching
            .into_iter()
            .skip(cursor)
            .take(page_size)
            .map(|(digest, registered_at)| DigestEntry {
                digest,
                registered_at,
            })
            .collect();

        let next_cursor = if entries.len() < page_size {
            0
        } else {
            cursor + entries.len()
        };
        Ok((total, next_cursor, entries))
    }

    /// The collaborator queue currently holding a payload locked under this
    /// digest, if any.
    pub fn find_in_queues(&self, digest: &str) -> Result<Option<String>> {
        let reply = self
            .gateway
            .call(Script::FindDigestInQueues, &[digest.to_string()], &[])?;
        Ok(reply.as_str().map(str::to_string))
    }

    /// Delete one digest: registry entry plus every lock sub-key.
    pub fn delete_by_digest(&self, digest: &str) -> Result<bool> {
        let (now, limit) = time_args(&self.config);
        let keys = [
            self.key.clone(),
            crate::keys::changelog_key(&self.config.prefix),
        ];
        let argv = [digest.to_string(), now, limit];
        let reply = self.gateway.call(Script::DeleteByDigest, &keys, &argv)?;
        Ok(reply.as_int() == Some(1))
    }

    /// Delete digests matching a glob pattern, at most `count` of them.
    /// Returns how many were removed.
    pub fn delete_by_pattern(&self, pattern: &str, count: usize) -> Result<usize> {
        let mut deleted = 0;
        for entry in self.entries(pattern, count)? {
            if self.delete_by_digest(&entry.digest)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn compile_pattern(pattern: &str) -> Result<globset::GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| UnijobError::Pattern(pattern.to_string(), e.to_string()))
}
