//! Lock policies: when a lock is taken and when it is let go.
//!
//! A policy binds the two lifecycle moments every collaborator has, job
//! submission and job execution, to lock operations. The set of policies
//! is closed: dispatch is a match on [`LockPolicy`], so every arm is
//! checked at compile time and adding a policy forces every call site to
//! decide what it means there.

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Result, UnijobError};
use crate::job::Job;
use crate::keys::collaborator;
use crate::locksmith::Locksmith;
use crate::script::now_f;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of lock policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Lock at submission, release after the job body completes. Duplicates
    /// are suppressed for the job's whole queued-plus-running life.
    #[default]
    UntilExecuted,

    /// Lock at submission, release the moment execution starts. Suppresses
    /// duplicate enqueues while allowing concurrent runs.
    UntilExecuting,

    /// No submission lock. A runtime lock serializes execution; a second
    /// run of the same payload waits its turn.
    WhileExecuting,

    /// Submission lock handed off to a runtime lock at execution start, so
    /// the payload is unique from enqueue all the way through its run.
    UntilAndWhileExecuting,

    /// Like [`LockPolicy::WhileExecuting`] but never waits: a conflicting
    /// run is pushed to the dead set instead of blocking a worker.
    WhileExecutingReject,

    /// Pure deduplication window: the lock is taken with a mandatory TTL
    /// and never explicitly released. Duplicates are suppressed until the
    /// window lapses, regardless of execution.
    UntilExpired,
}

impl LockPolicy {
    /// Stable snake_case name, as used in configuration and the changelog.
    pub fn as_str(self) -> &'static str {
        match self {
            LockPolicy::UntilExecuted => "until_executed",
            LockPolicy::UntilExecuting => "until_executing",
            LockPolicy::WhileExecuting => "while_executing",
            LockPolicy::UntilAndWhileExecuting => "until_and_while_executing",
            LockPolicy::WhileExecutingReject => "while_executing_reject",
            LockPolicy::UntilExpired => "until_expired",
        }
    }

    /// Whether the policy takes a lock at submission time.
    pub fn locks_at_submission(self) -> bool {
        !matches!(
            self,
            LockPolicy::WhileExecuting | LockPolicy::WhileExecutingReject
        )
    }
}

impl FromStr for LockPolicy {
    type Err = UnijobError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "until_executed" => Ok(LockPolicy::UntilExecuted),
            "until_executing" => Ok(LockPolicy::UntilExecuting),
            "while_executing" => Ok(LockPolicy::WhileExecuting),
            "until_and_while_executing" => Ok(LockPolicy::UntilAndWhileExecuting),
            "while_executing_reject" => Ok(LockPolicy::WhileExecutingReject),
            "until_expired" => Ok(LockPolicy::UntilExpired),
            other => Err(UnijobError::Config(format!(
                "unknown lock policy '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the submission-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The job may be enqueued.
    Allow,
    /// A duplicate payload already holds the lock; drop the job.
    Reject,
}

/// Outcome of running a job body under its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution<T> {
    /// The body ran to completion.
    Completed(T),
    /// The policy refused to run the body (lost the runtime lock race, or
    /// was rejected to the dead set).
    Rejected,
}

impl<T> Execution<T> {
    /// The completed value, if the body ran.
    pub fn completed(self) -> Option<T> {
        match self {
            Execution::Completed(value) => Some(value),
            Execution::Rejected => None,
        }
    }
}

/// Apply a job's policy at submission time.
///
/// On [`Decision::Allow`] the job's `lock_digest` is filled in so its queued
/// payload can be cross-referenced by digest later. [`LockPolicy::UntilExpired`]
/// requires a TTL; submitting such a job without one is a configuration error.
pub fn before_enqueue(store: &Store, config: &Config, job: &mut Job) -> Result<Decision> {
    let smith = Locksmith::new(store, config, job)?;
    job.lock_digest = Some(smith.digest().as_str().to_string());

    if !job.policy.locks_at_submission() {
        return Ok(Decision::Allow);
    }
    if job.policy == LockPolicy::UntilExpired && job.lock_ttl(config).is_none() {
        return Err(UnijobError::Config(format!(
            "job '{}' uses until_expired without a lock ttl",
            job.class
        )));
    }

    let acquired = match job.policy {
        // The window either exists or it does not; waiting makes no sense.
        LockPolicy::UntilExpired => smith.try_acquire()?,
        _ => smith.lock()?,
    };
    if acquired {
        return Ok(Decision::Allow);
    }

    if config.log_duplicate_payloads {
        eprintln!(
            "Duplicate payload rejected for class '{}' (digest {})",
            job.class,
            smith.digest()
        );
    }
    Ok(Decision::Reject)
}

/// Run a job body under its policy's execution-time semantics.
pub fn around_execute<T>(
    store: &Store,
    config: &Config,
    job: &Job,
    body: impl FnOnce() -> Result<T>,
) -> Result<Execution<T>> {
    let smith = Locksmith::new(store, config, job)?;

    match job.policy {
        LockPolicy::UntilExecuted => {
            // The submission lock is held through the run and released only
            // on success; a failed run keeps its lock for the retry.
            let value = body()?;
            smith.unlock()?;
            Ok(Execution::Completed(value))
        }

        LockPolicy::UntilExecuting => {
            smith.unlock()?;
            Ok(Execution::Completed(body()?))
        }

        LockPolicy::WhileExecuting => {
            let runtime = smith.runtime();
            if !runtime.lock()? {
                return Ok(Execution::Rejected);
            }
            let value = run_releasing(&runtime, body)?;
            Ok(Execution::Completed(value))
        }

        LockPolicy::WhileExecutingReject => {
            let runtime = smith.runtime();
            if !runtime.try_acquire()? {
                store.zadd(collaborator::DEAD, now_f(), &job.payload_json()?)?;
                return Ok(Execution::Rejected);
            }
            let value = run_releasing(&runtime, body)?;
            Ok(Execution::Completed(value))
        }

        LockPolicy::UntilAndWhileExecuting => {
            smith.unlock()?;
            let runtime = smith.runtime();
            if !runtime.lock()? {
                // Hand-off failed: restore the submission lock before
                // reporting the rejection.
                smith.lock()?;
                return Ok(Execution::Rejected);
            }
            match run_releasing(&runtime, body) {
                Ok(value) => Ok(Execution::Completed(value)),
                Err(e) => {
                    smith.lock()?;
                    Err(e)
                }
            }
        }

        LockPolicy::UntilExpired => {
            // The TTL window is the lock's whole lifecycle; execution
            // neither takes nor releases anything.
            Ok(Execution::Completed(body()?))
        }
    }
}

// The guard covers panic unwinds too: an execution-scope lock has no TTL by
// default, so a leaked one would reject every later run of the payload.
fn run_releasing<T>(runtime: &Locksmith, body: impl FnOnce() -> Result<T>) -> Result<T> {
    let guard = runtime.guard();
    let value = body()?;
    guard.release()?;
    Ok(value)
}
