//! Orphan reaping: reclaiming digests whose job no longer exists.
//!
//! A lock becomes an orphan when the process holding it dies without
//! unlocking and the lock carries no TTL. The reaper walks the digest
//! registry and deletes every digest that can no longer be tied to a live
//! job: not on the schedule set, not on the retry set, not sitting on any
//! queue. Cross-referencing works because queued payloads embed the digest
//! they were locked under.
//!
//! Two strategies exist. `Scripted` does the whole sweep in one atomic
//! script, which blocks the store for the duration; `ClientLoop` walks the
//! registry from the client with one small atomic delete per orphan,
//! trading a longer wall-clock sweep for short critical sections.

mod manager;

#[cfg(test)]
mod tests;

pub use manager::Manager;

use crate::config::{Config, ReaperStrategy};
use crate::error::Result;
use crate::keys::{changelog_key, collaborator, digests_key};
use crate::script::{Gateway, Script, time_args};
use crate::store::Store;

/// Removes orphaned digests from the registry and the store.
pub struct Reaper {
    store: Store,
    gateway: Gateway,
    config: Config,
    digests: String,
}

impl Reaper {
    /// Create a reaper over the given store.
    pub fn new(store: &Store, config: &Config) -> Self {
        Self {
            store: store.clone(),
            gateway: Gateway::new(store),
            config: config.clone(),
            digests: digests_key(&config.prefix),
        }
    }

    /// Run one sweep with the configured strategy. Returns the number of
    /// digests reaped.
    ///
    /// A failing scripted sweep falls back to the client loop for this run,
    /// with a warning, so a single bad script never stops reaping.
    pub fn run(&self) -> Result<usize> {
        match self.config.reaper {
            ReaperStrategy::Scripted => match self.scripted() {
                Ok(reaped) => Ok(reaped),
                Err(e) => {
                    eprintln!("Warning: scripted reap failed ({}), falling back to client loop", e);
                    self.client_loop()
                }
            },
            ReaperStrategy::ClientLoop => self.client_loop(),
        }
    }

    fn scripted(&self) -> Result<usize> {
        let keys = [
            self.digests.clone(),
            collaborator::SCHEDULE.to_string(),
            collaborator::RETRY.to_string(),
        ];
        let argv = [self.config.reaper_count.to_string()];
        let reply = self.gateway.call(Script::ReapOrphans, &keys, &argv)?;
        Ok(reply.as_int().unwrap_or(0) as usize)
    }

    fn client_loop(&self) -> Result<usize> {
        let mut reaped = 0;
        for digest in self.store.zrevrange_members(&self.digests)? {
            if reaped >= self.config.reaper_count {
                break;
            }
            if self.belongs_to_job(&digest)? {
                continue;
            }
            if self.delete(&digest)? {
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Whether any live job still accounts for this digest.
    fn belongs_to_job(&self, digest: &str) -> Result<bool> {
        Ok(self.scheduled(digest)? || self.retried(digest)? || self.enqueued(digest)?)
    }

    fn scheduled(&self, digest: &str) -> Result<bool> {
        self.zset_mentions(collaborator::SCHEDULE, digest)
    }

    fn retried(&self, digest: &str) -> Result<bool> {
        self.zset_mentions(collaborator::RETRY, digest)
    }

    fn enqueued(&self, digest: &str) -> Result<bool> {
        for queue in self.store.smembers(collaborator::QUEUES)? {
            let payloads = self.store.lrange(&collaborator::queue_key(&queue))?;
            if payloads.iter().any(|payload| payload.contains(digest)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn zset_mentions(&self, key: &str, digest: &str) -> Result<bool> {
        Ok(self
            .store
            .zrange_with_scores(key)?
            .iter()
            .any(|(member, _)| member.contains(digest)))
    }

    fn delete(&self, digest: &str) -> Result<bool> {
        let (now, limit) = time_args(&self.config);
        let keys = [
            self.digests.clone(),
            changelog_key(&self.config.prefix),
        ];
        let argv = [digest.to_string(), now, limit];
        let reply = self.gateway.call(Script::DeleteByDigest, &keys, &argv)?;
        Ok(reply.as_int() == Some(1))
    }
}
