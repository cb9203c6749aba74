//! Embedded atomic key-value store.
//!
//! The lock protocol only ever assumes a store with strings (plus TTL),
//! lists, hashes, sorted sets, and atomic multi-key scripts. This module
//! provides exactly that contract as an embedded engine: a cheaply-clonable
//! [`Store`] handle over shared state guarded by one mutex, with a condition
//! variable for the blocking waits the protocol needs.
//!
//! # Atomicity
//!
//! Every named script runs while holding the state mutex, so a script is
//! all-or-nothing and linearizes with respect to every other script on the
//! same store. No caller ever observes partial effects.
//!
//! # Script cache
//!
//! Scripts are registered by name on their first full submission via
//! [`Store::eval`]. [`Store::eval_cached`] fails with [`StoreError::NoScript`]
//! when the named script has not been registered on this store instance yet;
//! the scripting gateway reacts by re-submitting the full script body.

mod state;


pub use state::State;

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The named script is not in this store's script cache.
    #[error("script not loaded in store cache")]
    NoScript,

    /// A key holds a value of the wrong type for the requested operation.
    #[error("key '{key}' holds a {found}, expected {expected}")]
    WrongType {
        key: String,
        found: &'static str,
        expected: &'static str,
    },

    /// A script received a malformed argument.
    #[error("bad script argument: {0}")]
    BadArgument(String),
}

/// A typed script result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No result (e.g. a failed acquisition).
    Nil,
    Int(i64),
    Str(String),
}

impl Reply {
    /// The integer value, if this reply is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this reply is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this reply is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}

/// A script body: runs against the state with the invocation's keys and
/// arguments, all under the store mutex.
pub type Program = fn(&mut State, &[String], &[String]) -> Result<Reply, StoreError>;

struct Cell {
    state: State,
    programs: HashMap<&'static str, Program>,
}

struct Inner {
    cell: Mutex<Cell>,
    changed: Condvar,
}

/// Handle to one shared store. Clones refer to the same state and are safe
/// to use from many threads without additional locking.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Granularity of the blocking-wait re-check loop.
const WAIT_SLICE: Duration = Duration::from_millis(100);

impl Store {
    /// Create a fresh, empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(Cell {
                    state: State::new(),
                    programs: HashMap::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock_cell(&self) -> MutexGuard<'_, Cell> {
        // A poisoned mutex means another thread panicked mid-script. The
        // state itself is still structurally sound (scripts mutate through
        // typed operations), so recover rather than cascade the panic.
        self.inner
            .cell
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn notify(&self) {
        self.inner.changed.notify_all();
    }

    // =========================================================================
    // Atomic scripts
    // =========================================================================

    /// Run a previously-registered script by name.
    ///
    /// Fails with [`StoreError::NoScript`] when the script has never been
    /// submitted in full to this store instance.
    pub fn eval_cached(
        &self,
        name: &str,
        keys: &[String],
        argv: &[String],
    ) -> Result<Reply, StoreError> {
        let mut cell = self.lock_cell();
        let program = *cell.programs.get(name).ok_or(StoreError::NoScript)?;
        let result = program(&mut cell.state, keys, argv);
        drop(cell);
        self.notify();
        result
    }

    /// Submit a script in full: register it under `name` and run it.
    pub fn eval(
        &self,
        name: &'static str,
        program: Program,
        keys: &[String],
        argv: &[String],
    ) -> Result<Reply, StoreError> {
        let mut cell = self.lock_cell();
        cell.programs.insert(name, program);
        let result = program(&mut cell.state, keys, argv);
        drop(cell);
        self.notify();
        result
    }

    // =========================================================================
    // Blocking wait
    // =========================================================================

    /// Block until `token` is promoted into the PRIMED list for a lock, or
    /// the timeout elapses. `None` waits forever.
    ///
    /// Two paths count as being promoted:
    /// - the token appears in `primed` (a releaser moved it there), or
    /// - the lock is entirely free, nothing is primed, and the token sits
    ///   at the head of `queued`: the head, and only the head, may then pop
    ///   itself (strict single-popper), which covers releases and TTL
    ///   expiries that happened before this waiter enqueued. A non-empty
    ///   `primed` list means another token has already been handed the
    ///   lock, so the head must keep waiting behind it.
    ///
    /// Returns `true` when promoted (the token has been removed from the
    /// list and the caller should attempt acquisition), `false` on timeout.
    pub fn wait_for_turn(
        &self,
        exists: &str,
        queued: &str,
        primed: &str,
        locked: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut cell = self.lock_cell();

        loop {
            if cell.state.lrem(primed, token)? > 0 {
                return Ok(true);
            }

            let free = !cell.state.exists(exists)
                && cell.state.hlen(locked)? == 0
                && cell.state.llen(primed)? == 0;
            if free && cell.state.list_head(queued)?.as_deref() == Some(token) {
                cell.state.lrem(queued, token)?;
                return Ok(true);
            }

            let slice = match deadline {
                None => WAIT_SLICE,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(false);
                    }
                    WAIT_SLICE.min(d - now)
                }
            };

            let (guard, _) = self
                .inner
                .changed
                .wait_timeout(cell, slice)
                .unwrap_or_else(|poison| poison.into_inner());
            cell = guard;
        }
    }

    // =========================================================================
    // Plain operations (reads, plus the few writes that are single-key and
    // outside the lock protocol: registry adds and collaborator seeding)
    // =========================================================================

    /// Get a string value.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.lock_cell().state.get(key)
    }

    /// Set a string value with an optional TTL.
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        self.lock_cell().state.set(key, value, ttl);
        self.notify();
    }

    /// Delete a key. Returns whether it existed.
    pub fn del(&self, key: &str) -> bool {
        let existed = self.lock_cell().state.del(key);
        self.notify();
        existed
    }

    /// Whether a key exists (and has not expired).
    pub fn exists(&self, key: &str) -> bool {
        self.lock_cell().state.exists(key)
    }

    /// Remaining TTL of a key, when one is set.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.lock_cell().state.ttl_remaining(key)
    }

    /// Append to the tail of a list.
    pub fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let len = self.lock_cell().state.rpush(key, value);
        self.notify();
        len
    }

    /// Length of a list (0 when absent).
    pub fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.lock_cell().state.llen(key)
    }

    /// Full contents of a list.
    pub fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.lock_cell().state.lrange(key)
    }

    /// Number of fields in a hash (0 when absent).
    pub fn hlen(&self, key: &str) -> Result<usize, StoreError> {
        self.lock_cell().state.hlen(key)
    }

    /// All field/value pairs of a hash.
    pub fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.lock_cell().state.hgetall(key)
    }

    /// Add a member to a sorted set. Returns whether the member was new.
    pub fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool, StoreError> {
        let added = self.lock_cell().state.zadd(key, score, member);
        self.notify();
        added
    }

    /// Remove a member from a sorted set.
    pub fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed = self.lock_cell().state.zrem(key, member);
        self.notify();
        removed
    }

    /// Cardinality of a sorted set (0 when absent).
    pub fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        self.lock_cell().state.zcard(key)
    }

    /// Score of a member, when present.
    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.lock_cell().state.zscore(key, member)
    }

    /// Members with scores, ordered by (score, member) ascending.
    pub fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.lock_cell().state.zrange_with_scores(key)
    }

    /// Members ordered by (score, member) descending.
    pub fn zrevrange_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.lock_cell().state.zrevrange_members(key)
    }

    /// Add a member to a set. Returns whether the member was new.
    pub fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let added = self.lock_cell().state.sadd(key, member);
        self.notify();
        added
    }

    /// All members of a set.
    pub fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.lock_cell().state.smembers(key)
    }
}
