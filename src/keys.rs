//! Key namespace for the locking protocol.
//!
//! Every lock lives under a set of store keys derived from a single digest:
//!
//! - `<prefix>:<hex>`: the EXISTS key (existence + owner marker, optional TTL)
//! - `<prefix>:<hex>:QUEUED`: FIFO list of waiter tokens
//! - `<prefix>:<hex>:PRIMED`: tokens selected as next-in-line
//! - `<prefix>:<hex>:LOCKED`: hash of holding tokens -> acquisition time
//!
//! plus two globals shared by every lock:
//!
//! - `<prefix>:digests`: sorted set of all known digests (the registry)
//! - `<prefix>:changelog`: bounded sorted set of audit entries
//!
//! The layout is bit-exact by design; operational tooling greps for these
//! names. A digest string carries the prefix, so the digest itself *is* the
//! EXISTS key.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Suffix appended to a digest for runtime (execution-scope) locks, so a
/// submission-scope lock and its execution-scope twin never collide.
pub const RUN_SUFFIX: &str = ":RUN";

const QUEUED_SUFFIX: &str = ":QUEUED";
const PRIMED_SUFFIX: &str = ":PRIMED";
const LOCKED_SUFFIX: &str = ":LOCKED";

/// Well-known collaborator keys. The lock core never writes these except for
/// the dead set; the reaper reads them to decide whether a digest still
/// belongs to a live job.
pub mod collaborator {
    /// Sorted set of scheduled job payloads.
    pub const SCHEDULE: &str = "schedule";
    /// Sorted set of job payloads awaiting retry.
    pub const RETRY: &str = "retry";
    /// Sorted set of dead job payloads (destination for reject-on-conflict).
    pub const DEAD: &str = "dead";
    /// Set of active queue names.
    pub const QUEUES: &str = "queues";

    /// Key of the payload list for one named queue.
    pub fn queue_key(name: &str) -> String {
        format!("queue:{}", name)
    }
}

/// A lock digest: the stable fingerprint identifying one logical unit of work.
///
/// The string form includes the key prefix (e.g. `uniq:3f2a...`), so a digest
/// doubles as the EXISTS key for its lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap an already-derived digest string (e.g. one read back from the
    /// registry).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The runtime (execution-scope) twin of this digest.
    pub fn runtime(&self) -> Digest {
        Digest(format!("{}{}", self.0, RUN_SUFFIX))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the digest for a canonical payload.
///
/// Pure and stable across processes and restarts: equal payload bytes always
/// produce equal digests. Canonicalizing the payload (field order, filtered
/// args) is the caller's responsibility.
pub fn digest_for(prefix: &str, payload: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let fingerprint = hasher.finalize();

    let mut hex = String::with_capacity(fingerprint.len() * 2);
    for byte in fingerprint {
        hex.push_str(&format!("{:02x}", byte));
    }

    Digest(format!("{}:{}", prefix, hex))
}

/// The four per-digest sub-keys for a raw digest string, in protocol order.
/// Used by scripts that receive a digest rather than a full key set.
pub(crate) fn sub_keys_for(digest: &str) -> [String; 4] {
    [
        digest.to_string(),
        format!("{}{}", digest, QUEUED_SUFFIX),
        format!("{}{}", digest, PRIMED_SUFFIX),
        format!("{}{}", digest, LOCKED_SUFFIX),
    ]
}

/// Key of the global digest registry.
pub fn digests_key(prefix: &str) -> String {
    format!("{}:digests", prefix)
}

/// Key of the global changelog.
pub fn changelog_key(prefix: &str) -> String {
    format!("{}:changelog", prefix)
}

/// The full set of store keys for one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeySet {
    /// Existence + owner marker. Equal to the digest string itself.
    pub exists: String,
    /// FIFO list of waiter tokens.
    pub queued: String,
    /// Tokens eligible to attempt acquisition.
    pub primed: String,
    /// Hash of holding tokens -> acquisition time.
    pub locked: String,
    /// Global digest registry (shared).
    pub digests: String,
    /// Global changelog (shared).
    pub changelog: String,
}

impl LockKeySet {
    /// Derive the key set for a digest under the given prefix.
    pub fn new(prefix: &str, digest: &Digest) -> Self {
        Self {
            exists: digest.as_str().to_string(),
            queued: format!("{}{}", digest, QUEUED_SUFFIX),
            primed: format!("{}{}", digest, PRIMED_SUFFIX),
            locked: format!("{}{}", digest, LOCKED_SUFFIX),
            digests: digests_key(prefix),
            changelog: changelog_key(prefix),
        }
    }

    /// The per-digest sub-keys (everything except the shared globals).
    pub fn sub_keys(&self) -> [&str; 4] {
        [&self.exists, &self.queued, &self.primed, &self.locked]
    }

    /// The KEYS vector handed to the named scripts, in protocol order.
    pub fn script_keys(&self) -> Vec<String> {
        vec![
            self.exists.clone(),
            self.queued.clone(),
            self.primed.clone(),
            self.locked.clone(),
            self.digests.clone(),
            self.changelog.clone(),
        ]
    }
}
