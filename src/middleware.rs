//! Collaborator-facing middleware.
//!
//! A job system integrates by calling three hooks: [`Middleware::before_enqueue`]
//! when a job is about to be pushed, [`Middleware::around_execute`] around the
//! job body, and [`Middleware::on_permanent_removal`] when a job is removed
//! for good (killed from a dead set, manually deleted). Everything else,
//! meaning which locks are taken when, is the job's policy's business.

use crate::config::Config;
use crate::digests::Digests;
use crate::error::Result;
use crate::job::Job;
use crate::keys::Digest;
use crate::policy::{self, Decision, Execution};
use crate::store::Store;

/// The integration surface for a job system.
#[derive(Clone)]
pub struct Middleware {
    store: Store,
    config: Config,
}

impl Middleware {
    /// Build the middleware over a store with a validated config.
    pub fn new(store: &Store, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: store.clone(),
            config: config.clone(),
        })
    }

    /// The config this middleware runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submission hook. [`Decision::Reject`] means a duplicate payload is
    /// already locked and the job must not be enqueued. On
    /// [`Decision::Allow`] the job's `lock_digest` has been filled in and
    /// must be persisted with the payload.
    pub fn before_enqueue(&self, job: &mut Job) -> Result<Decision> {
        policy::before_enqueue(&self.store, &self.config, job)
    }

    /// Execution hook. Wraps the job body in the policy's execution-time
    /// lock handling.
    pub fn around_execute<T>(
        &self,
        job: &Job,
        body: impl FnOnce() -> Result<T>,
    ) -> Result<Execution<T>> {
        policy::around_execute(&self.store, &self.config, job, body)
    }

    /// Removal hook: the job is gone for good, so its lock state must not
    /// outlive it. Deletes the job's digest and its runtime twin.
    pub fn on_permanent_removal(&self, job: &Job) -> Result<()> {
        let digest = match &job.lock_digest {
            Some(raw) => Digest::from_raw(raw.clone()),
            None => job.digest(&self.config)?,
        };
        let registry = Digests::new(&self.store, &self.config);
        registry.delete_by_digest(digest.as_str())?;
        registry.delete_by_digest(digest.runtime().as_str())?;
        Ok(())
    }
}
