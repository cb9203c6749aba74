//! unijob: distributed uniqueness locks for background jobs.
//!
//! The crate guarantees that at most one job with a given canonical payload
//! is queued or running at a time, across every process sharing a store.
//! A job's payload is fingerprinted into a [`keys::Digest`]; a lock on that
//! digest is acquired and released at the lifecycle moments its
//! [`policy::LockPolicy`] dictates.
//!
//! Integration happens through [`middleware::Middleware`]: call
//! `before_enqueue` when pushing a job, `around_execute` around its body,
//! and `on_permanent_removal` when a job is discarded for good. Lower-level
//! access goes through [`locksmith::Locksmith`] for direct lock control,
//! [`digests::Digests`] for registry queries, [`changelog::Changelog`] for
//! the audit trail, and [`orphans::Reaper`] for reclaiming locks whose jobs
//! have vanished.

pub mod changelog;
pub mod config;
pub mod digests;
pub mod error;
pub mod job;
pub mod keys;
pub mod locksmith;
pub mod middleware;
pub mod orphans;
pub mod policy;
pub mod script;
pub mod store;

#[cfg(test)]
pub mod test_support;

pub use changelog::{Changelog, ChangelogEntry};
pub use config::{Config, ReaperStrategy};
pub use digests::{DigestEntry, Digests};
pub use error::{Result, UnijobError};
pub use job::Job;
pub use keys::{Digest, digest_for};
pub use locksmith::{LockGuard, Locksmith};
pub use middleware::Middleware;
pub use orphans::{Manager, Reaper};
pub use policy::{Decision, Execution, LockPolicy};
pub use store::Store;
