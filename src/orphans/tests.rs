//! Reaper tests, run once per strategy where the behavior must match.

use super::*;
use crate::config::ReaperStrategy;
use crate::locksmith::Locksmith;
use crate::test_support::{digested_job, harness, seed_queue, seed_retry, seed_scheduled};
use std::time::Duration;

fn lock_job(store: &Store, config: &Config, class: &str) -> crate::job::Job {
    let job = digested_job(class, config).unwrap();
    let smith = Locksmith::new(store, config, &job).unwrap();
    assert!(smith.lock().unwrap());
    job
}

fn config_with(strategy: ReaperStrategy) -> Config {
    Config {
        reaper: strategy,
        ..Config::default()
    }
}

#[test]
fn reaps_orphans_and_spares_live_jobs_scripted() {
    reaps_orphans_and_spares_live_jobs(ReaperStrategy::Scripted);
}

#[test]
fn reaps_orphans_and_spares_live_jobs_client_loop() {
    reaps_orphans_and_spares_live_jobs(ReaperStrategy::ClientLoop);
}

fn reaps_orphans_and_spares_live_jobs(strategy: ReaperStrategy) {
    let (store, _) = harness();
    let config = config_with(strategy);

    // Three live jobs: scheduled, retrying, enqueued.
    let scheduled = lock_job(&store, &config, "ScheduledWorker");
    seed_scheduled(&store, &scheduled).unwrap();
    let retried = lock_job(&store, &config, "RetriedWorker");
    seed_retry(&store, &retried).unwrap();
    let enqueued = lock_job(&store, &config, "EnqueuedWorker");
    seed_queue(&store, &enqueued).unwrap();

    // One lock with no job behind it anywhere.
    let orphan = lock_job(&store, &config, "OrphanWorker");

    let reaper = Reaper::new(&store, &config);
    assert_eq!(reaper.run().unwrap(), 1);

    assert!(!store.exists(orphan.lock_digest.as_deref().unwrap()));
    for job in [&scheduled, &retried, &enqueued] {
        assert!(store.exists(job.lock_digest.as_deref().unwrap()));
    }

    // A second sweep finds nothing left to reap.
    assert_eq!(reaper.run().unwrap(), 0);
}

#[test]
fn reap_respects_the_per_run_cap() {
    let (store, _) = harness();
    let config = Config {
        reaper_count: 2,
        ..Config::default()
    };

    for i in 0..5 {
        lock_job(&store, &config, &format!("Orphan{}", i));
    }

    let reaper = Reaper::new(&store, &config);
    assert_eq!(reaper.run().unwrap(), 2);
    assert_eq!(reaper.run().unwrap(), 2);
    assert_eq!(reaper.run().unwrap(), 1);
}

#[test]
fn reap_cleans_every_lock_sub_key() {
    let (store, config) = harness();
    let orphan = lock_job(&store, &config, "OrphanWorker");
    let digest = orphan.lock_digest.as_deref().unwrap();

    Reaper::new(&store, &config).run().unwrap();

    for suffix in ["", ":QUEUED", ":PRIMED", ":LOCKED"] {
        assert!(!store.exists(&format!("{}{}", digest, suffix)));
    }
    assert_eq!(store.zcard(&digests_key(&config.prefix)).unwrap(), 0);
}

#[test]
fn manager_sweeps_in_the_background_and_stops_cleanly() {
    let (store, _) = harness();
    let config = Config {
        reaper_interval_secs: 3600,
        ..Config::default()
    };

    let orphan = lock_job(&store, &config, "OrphanWorker");
    let manager = Manager::start(&store, &config);

    // The first sweep runs on start; give the thread a moment.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while store.exists(orphan.lock_digest.as_deref().unwrap()) {
        assert!(std::time::Instant::now() < deadline, "orphan never reaped");
        std::thread::sleep(Duration::from_millis(20));
    }

    // Stop joins promptly even though the interval is an hour.
    manager.stop();
}
