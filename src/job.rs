//! Job descriptors: the unit of work a lock protects.
//!
//! A [`Job`] carries everything the lock engine needs to know about one unit
//! of work: its worker class, queue, arguments, execution id (the lock
//! token), the lock policy, and per-job lock overrides. How a collaborator
//! turns its own job representation into this descriptor, including any
//! argument filtering, is its business; the digest only sees the canonical
//! payload built here.

use crate::config::Config;
use crate::error::{Result, UnijobError};
use crate::keys::{Digest, digest_for};
use crate::policy::LockPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A unit-of-work descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Worker class name (e.g. `OrderWorker`).
    pub class: String,

    /// Queue the job is destined for.
    pub queue: String,

    /// Declared job arguments.
    pub args: Vec<Value>,

    /// Execution id of this attempt. Doubles as the lock token.
    pub jid: String,

    /// Which lock policy governs this job.
    pub policy: LockPolicy,

    /// Per-job lock TTL override in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_ttl_ms: Option<u64>,

    /// Per-job acquisition timeout override in milliseconds.
    /// `None` falls back to the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,

    /// When true, the queue name does not participate in the digest, making
    /// the job unique across every queue.
    pub unique_across_queues: bool,

    /// Pre-filtered argument subset. When present it replaces `args` in the
    /// digest payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_args: Option<Vec<Value>>,

    /// The digest the job was locked under, filled in at submission time so
    /// queued payloads can be cross-referenced by the reaper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_digest: Option<String>,

    /// When the descriptor was created.
    pub created_at: DateTime<Utc>,
}

/// The canonical digest payload. Field order is fixed by this struct, never
/// by map iteration, so serialization is stable across processes.
#[derive(Serialize)]
struct DigestPayload<'a> {
    class: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<&'a str>,
    args: &'a [Value],
}

impl Default for Job {
    fn default() -> Self {
        Self {
            class: String::new(),
            queue: "default".to_string(),
            args: Vec::new(),
            jid: generate_jid(),
            policy: LockPolicy::default(),
            lock_ttl_ms: None,
            lock_timeout_ms: None,
            unique_across_queues: false,
            unique_args: None,
            lock_digest: None,
            created_at: Utc::now(),
        }
    }
}

impl Job {
    /// Create a job for the given worker class with a fresh jid.
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            ..Self::default()
        }
    }

    /// Set the declared arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the destination queue.
    pub fn with_queue(mut self, queue: &str) -> Self {
        self.queue = queue.to_string();
        self
    }

    /// Set the lock policy.
    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    /// Override the acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Make the job unique across all queues.
    pub fn across_queues(mut self) -> Self {
        self.unique_across_queues = true;
        self
    }

    /// Replace the digest arguments with a pre-filtered subset.
    pub fn with_unique_args(mut self, unique_args: Vec<Value>) -> Self {
        self.unique_args = Some(unique_args);
        self
    }

    /// The canonical payload bytes this job is fingerprinted by.
    pub fn digest_payload(&self) -> Result<String> {
        let args = self.unique_args.as_deref().unwrap_or(&self.args);
        let queue = if self.unique_across_queues {
            None
        } else {
            Some(self.queue.as_str())
        };

        let payload = DigestPayload {
            class: &self.class,
            queue,
            args,
        };

        serde_json::to_string(&payload).map_err(|e| UnijobError::Payload(e.to_string()))
    }

    /// The lock digest for this job under the given config's prefix.
    pub fn digest(&self, config: &Config) -> Result<Digest> {
        let payload = self.digest_payload()?;
        Ok(digest_for(&config.prefix, payload.as_bytes()))
    }

    /// Serialize the full descriptor, as stored on collaborator queues and
    /// the dead set.
    pub fn payload_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| UnijobError::Payload(e.to_string()))
    }

    /// Effective lock TTL, falling back to the configured default.
    pub fn lock_ttl(&self, config: &Config) -> Option<Duration> {
        self.lock_ttl_ms
            .map(Duration::from_millis)
            .or_else(|| config.default_lock_ttl())
    }

    /// Effective acquisition timeout, falling back to the configured default.
    /// `None` means wait forever.
    pub fn lock_timeout(&self, config: &Config) -> Option<Duration> {
        match self.lock_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => config.default_lock_timeout(),
        }
    }
}

/// Generate a fresh execution id.
pub(crate) fn generate_jid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
