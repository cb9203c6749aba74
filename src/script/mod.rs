//! Scripting gateway: named atomic operations over the store.
//!
//! The gateway is the only component that mutates lock state. Each named
//! script runs server-side (inside the store's atomic section) against a
//! KEYS vector and an ARGV vector, and returns a typed [`Reply`].
//!
//! Scripts are cached by name in the store. The gateway first submits by
//! name alone; when the store answers [`StoreError::NoScript`] (this store
//! instance has never seen the script), the gateway transparently re-submits
//! the full script body instead of failing the caller.

mod programs;


use crate::config::Config;
use crate::error::{Result, UnijobError};
use crate::store::{Program, Reply, Store, StoreError};

/// The named atomic operations the lock engine is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    /// Enqueue a waiter token (or self-prime it when the lock is free).
    Queue,
    /// Attempt to acquire the lock for a token.
    Acquire,
    /// Release a token's hold and promote the next waiter.
    Release,
    /// Remove a digest's registry entry and every lock sub-key.
    DeleteByDigest,
    /// Delete every registered digest whose job no longer exists.
    ReapOrphans,
    /// Find which collaborator queue, if any, holds a digest.
    FindDigestInQueues,
}

impl Script {
    /// Stable script name used as the store cache key.
    pub fn name(self) -> &'static str {
        match self {
            Script::Queue => "queue",
            Script::Acquire => "acquire",
            Script::Release => "release",
            Script::DeleteByDigest => "delete_by_digest",
            Script::ReapOrphans => "reap_orphans",
            Script::FindDigestInQueues => "find_digest_in_queues",
        }
    }

    fn program(self) -> Program {
        match self {
            Script::Queue => programs::queue,
            Script::Acquire => programs::acquire,
            Script::Release => programs::release,
            Script::DeleteByDigest => programs::delete_by_digest,
            Script::ReapOrphans => programs::reap_orphans,
            Script::FindDigestInQueues => programs::find_digest_in_queues,
        }
    }
}

/// Executes named scripts against one store.
#[derive(Clone)]
pub struct Gateway {
    store: Store,
}

impl Gateway {
    /// Create a gateway over the given store.
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Run a named script atomically.
    ///
    /// A cache miss is handled here by re-submitting the full body; any
    /// other store failure propagates as a hard error.
    pub fn call(&self, script: Script, keys: &[String], argv: &[String]) -> Result<Reply> {
        match self.store.eval_cached(script.name(), keys, argv) {
            Ok(reply) => Ok(reply),
            Err(StoreError::NoScript) => self
                .store
                .eval(script.name(), script.program(), keys, argv)
                .map_err(|e| UnijobError::Script(script.name(), e.to_string())),
            Err(e) => Err(UnijobError::Script(script.name(), e.to_string())),
        }
    }
}

/// Current time as a float unix timestamp, the score format shared by the
/// registry and the changelog.
pub(crate) fn now_f() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// The common ARGV tail carrying event time and changelog bound.
pub(crate) fn time_args(config: &Config) -> (String, String) {
    (now_f().to_string(), config.changelog_history_size.to_string())
}
