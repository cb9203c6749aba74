//! Shared fixtures for the test suite.

use crate::config::Config;
use crate::error::Result;
use crate::job::Job;
use crate::keys::collaborator;
use crate::script::now_f;
use crate::store::Store;

/// A fresh store and default config.
pub fn harness() -> (Store, Config) {
    (Store::new(), Config::default())
}

/// A job whose payload embeds its lock digest, the way submission leaves it.
pub fn digested_job(class: &str, config: &Config) -> Result<Job> {
    let mut job = Job::new(class);
    let digest = job.digest(config)?;
    job.lock_digest = Some(digest.as_str().to_string());
    Ok(job)
}

/// Put a job's payload on the schedule set.
pub fn seed_scheduled(store: &Store, job: &Job) -> Result<()> {
    store.zadd(collaborator::SCHEDULE, now_f(), &job.payload_json()?)?;
    Ok(())
}

/// Put a job's payload on the retry set.
pub fn seed_retry(store: &Store, job: &Job) -> Result<()> {
    store.zadd(collaborator::RETRY, now_f(), &job.payload_json()?)?;
    Ok(())
}

/// Put a job's payload on its queue, registering the queue name.
pub fn seed_queue(store: &Store, job: &Job) -> Result<()> {
    store.sadd(collaborator::QUEUES, &job.queue)?;
    store.rpush(&collaborator::queue_key(&job.queue), &job.payload_json()?)?;
    Ok(())
}
