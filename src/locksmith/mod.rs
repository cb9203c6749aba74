//! The locksmith: one lock attempt for one job.
//!
//! A [`Locksmith`] binds a job's digest, token (its jid), and effective
//! TTL/timeout to a store and drives the full acquisition protocol:
//!
//! ```text
//! UNLOCKED --queue--> QUEUED --promote--> PRIMED --acquire--> LOCKED
//! ```
//!
//! Acquisition first tries directly; on conflict with a zero timeout it
//! fails fast, otherwise it enqueues its token and blocks until promoted
//! (or the deadline passes, in which case it withdraws its token so no
//! stale waiter lingers). All state changes go through the scripting
//! gateway, so every step is atomic.

mod guard;


pub use guard::LockGuard;

use crate::config::Config;
use crate::error::{Result, UnijobError};
use crate::job::Job;
use crate::keys::{Digest, LockKeySet};
use crate::script::{Gateway, Script, time_args};
use crate::store::Store;
use std::time::{Duration, Instant};

/// Drives the lock protocol for one (digest, token) pair.
#[derive(Clone)]
pub struct Locksmith {
    store: Store,
    gateway: Gateway,
    config: Config,
    digest: Digest,
    keys: LockKeySet,
    token: String,
    ttl: Option<Duration>,
    timeout: Option<Duration>,
    policy_name: &'static str,
}

impl Locksmith {
    /// Build a locksmith for a job. Derives the job's digest under the
    /// configured prefix and captures its effective TTL and timeout.
    pub fn new(store: &Store, config: &Config, job: &Job) -> Result<Self> {
        let digest = job.digest(config)?;
        Ok(Self::for_digest(store, config, digest, job))
    }

    fn for_digest(store: &Store, config: &Config, digest: Digest, job: &Job) -> Self {
        let keys = LockKeySet::new(&config.prefix, &digest);
        Self {
            store: store.clone(),
            gateway: Gateway::new(store),
            config: config.clone(),
            keys,
            digest,
            token: job.jid.clone(),
            ttl: job.lock_ttl(config),
            timeout: job.lock_timeout(config),
            policy_name: job.policy.as_str(),
        }
    }

    /// The execution-scope twin of this locksmith: same token, same
    /// settings, digest suffixed so submission- and execution-scope locks
    /// never collide.
    pub fn runtime(&self) -> Self {
        let digest = self.digest.runtime();
        let keys = LockKeySet::new(&self.config.prefix, &digest);
        Self {
            digest,
            keys,
            ..self.clone()
        }
    }

    /// The digest this locksmith operates on.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The token (jid) this locksmith locks as.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Acquire the lock, waiting up to the effective timeout.
    ///
    /// Returns `Ok(true)` when this token holds the lock, `Ok(false)` when
    /// the attempt timed out (or failed fast with a zero timeout). Waiting
    /// is FIFO: tokens are promoted in enqueue order.
    pub fn lock(&self) -> Result<bool> {
        if self.try_acquire()? {
            return Ok(true);
        }
        if self.timeout == Some(Duration::ZERO) {
            return Ok(false);
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            self.enqueue()?;

            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        self.withdraw()?;
                        return Ok(false);
                    }
                    Some(d - now)
                }
            };

            let promoted = self
                .store
                .wait_for_turn(
                    &self.keys.exists,
                    &self.keys.queued,
                    &self.keys.primed,
                    &self.keys.locked,
                    &self.token,
                    remaining,
                )
                .map_err(|e| UnijobError::Lock(e.to_string()))?;

            if !promoted {
                self.withdraw()?;
                return Ok(false);
            }
            if self.try_acquire()? {
                return Ok(true);
            }
            // Promoted but beaten to the marker; go around and re-queue.
        }
    }

    /// One atomic acquisition attempt, no waiting.
    pub fn try_acquire(&self) -> Result<bool> {
        let (now, limit) = time_args(&self.config);
        let ttl = self
            .ttl
            .map(|t| t.as_millis().to_string())
            .unwrap_or_default();
        let argv = [
            self.token.clone(),
            self.digest.as_str().to_string(),
            self.policy_name.to_string(),
            now,
            ttl,
            limit,
        ];
        let reply = self
            .gateway
            .call(Script::Acquire, &self.keys.script_keys(), &argv)?;
        Ok(!reply.is_nil())
    }

    /// Release this token's hold.
    ///
    /// Promotes the next waiter when one exists, otherwise cleans up every
    /// sub-key (the EXISTS marker is left behind only when it carries an
    /// explicit TTL, so the uniqueness window survives the unlock).
    /// Returns whether the token actually held the lock; releasing a lock
    /// you do not hold is a no-op, not an error.
    pub fn unlock(&self) -> Result<bool> {
        let reply = self
            .gateway
            .call(Script::Release, &self.keys.script_keys(), &self.release_argv())?;
        Ok(reply.as_int() == Some(1))
    }

    /// Whether any token currently holds or marks this lock.
    pub fn is_locked(&self) -> Result<bool> {
        if self.store.exists(&self.keys.exists) {
            return Ok(true);
        }
        Ok(self.store.hlen(&self.keys.locked)? > 0)
    }

    /// Drop this digest entirely: registry entry and every sub-key,
    /// regardless of holders. Administrative; running jobs lose their lock.
    pub fn delete(&self) -> Result<bool> {
        let (now, limit) = time_args(&self.config);
        let keys = [self.keys.digests.clone(), self.keys.changelog.clone()];
        let argv = [self.digest.as_str().to_string(), now, limit];
        let reply = self.gateway.call(Script::DeleteByDigest, &keys, &argv)?;
        Ok(reply.as_int() == Some(1))
    }

    /// Run `body` under the lock.
    ///
    /// Returns `Ok(None)` when the lock could not be acquired in time. The
    /// lock is released when `body` returns, panics included (the guard
    /// releases on drop).
    pub fn with_lock<T>(&self, body: impl FnOnce() -> T) -> Result<Option<T>> {
        if !self.lock()? {
            return Ok(None);
        }
        let guard = self.guard();
        let value = body();
        guard.release()?;
        Ok(Some(value))
    }

    /// Guard a lock this locksmith currently holds, releasing it on drop.
    pub(crate) fn guard(&self) -> LockGuard<'_> {
        LockGuard::new(self)
    }

    fn enqueue(&self) -> Result<()> {
        let (now, limit) = time_args(&self.config);
        let argv = [self.token.clone(), now, limit];
        self.gateway
            .call(Script::Queue, &self.keys.script_keys(), &argv)?;
        Ok(())
    }

    // Withdraw a timed-out waiter. Release removes the token from every
    // stage and tidies the sub-keys when nobody is left.
    fn withdraw(&self) -> Result<()> {
        self.gateway
            .call(Script::Release, &self.keys.script_keys(), &self.release_argv())?;
        Ok(())
    }

    fn release_argv(&self) -> [String; 4] {
        let (now, limit) = time_args(&self.config);
        [
            self.token.clone(),
            self.digest.as_str().to_string(),
            now,
            limit,
        ]
    }
}
