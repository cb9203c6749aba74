//! Policy dispatch tests.

use super::*;
use crate::job::Job;
use serde_json::json;
use std::time::Duration;

fn harness() -> (Store, Config) {
    (Store::new(), Config::default())
}

fn job_with(policy: LockPolicy) -> Job {
    Job::new("ReportWorker")
        .with_args(vec![json!("2026-08")])
        .with_policy(policy)
}

fn smith_for(store: &Store, config: &Config, job: &Job) -> Locksmith {
    Locksmith::new(store, config, job).unwrap()
}

#[test]
fn policy_names_round_trip() {
    for policy in [
        LockPolicy::UntilExecuted,
        LockPolicy::UntilExecuting,
        LockPolicy::WhileExecuting,
        LockPolicy::UntilAndWhileExecuting,
        LockPolicy::WhileExecutingReject,
        LockPolicy::UntilExpired,
    ] {
        assert_eq!(policy.as_str().parse::<LockPolicy>().unwrap(), policy);
    }
    assert!("no_such_policy".parse::<LockPolicy>().is_err());
}

#[test]
fn policy_serde_uses_snake_case() {
    let json = serde_json::to_string(&LockPolicy::UntilAndWhileExecuting).unwrap();
    assert_eq!(json, r#""until_and_while_executing""#);
    let back: LockPolicy = serde_json::from_str(&json).unwrap();
    assert_eq!(back, LockPolicy::UntilAndWhileExecuting);
}

#[test]
fn until_executed_rejects_duplicates_until_completion() {
    let (store, config) = harness();
    let mut first = job_with(LockPolicy::UntilExecuted);
    let mut second = job_with(LockPolicy::UntilExecuted);

    assert_eq!(
        before_enqueue(&store, &config, &mut first).unwrap(),
        Decision::Allow
    );
    assert_eq!(
        before_enqueue(&store, &config, &mut second).unwrap(),
        Decision::Reject
    );

    let ran = around_execute(&store, &config, &first, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Completed(()));

    // The lock is gone once the body completed.
    assert_eq!(
        before_enqueue(&store, &config, &mut second).unwrap(),
        Decision::Allow
    );
}

#[test]
fn until_executed_keeps_the_lock_when_the_body_fails() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilExecuted);
    before_enqueue(&store, &config, &mut job).unwrap();

    let result: Result<Execution<()>> = around_execute(&store, &config, &job, || {
        Err(UnijobError::Lock("boom".to_string()))
    });
    assert!(result.is_err());

    // Still unique: a retry of the same payload is covered.
    let mut dup = job_with(LockPolicy::UntilExecuted);
    assert_eq!(
        before_enqueue(&store, &config, &mut dup).unwrap(),
        Decision::Reject
    );
}

#[test]
fn until_executing_releases_at_execution_start() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilExecuting);
    before_enqueue(&store, &config, &mut job).unwrap();

    let smith = smith_for(&store, &config, &job);
    let ran = around_execute(&store, &config, &job, || {
        // Mid-body the submission lock is already gone.
        assert!(!smith.is_locked().unwrap());
        Ok(1)
    })
    .unwrap();
    assert_eq!(ran, Execution::Completed(1));
}

#[test]
fn while_executing_takes_no_submission_lock() {
    let (store, config) = harness();
    let mut a = job_with(LockPolicy::WhileExecuting);
    let mut b = job_with(LockPolicy::WhileExecuting);

    assert_eq!(
        before_enqueue(&store, &config, &mut a).unwrap(),
        Decision::Allow
    );
    assert_eq!(
        before_enqueue(&store, &config, &mut b).unwrap(),
        Decision::Allow
    );
}

#[test]
fn while_executing_serializes_runs() {
    let (store, config) = harness();
    let job = job_with(LockPolicy::WhileExecuting);

    let runtime = smith_for(&store, &config, &job).runtime();
    assert!(runtime.lock().unwrap());

    // A concurrent run of the same payload loses the runtime lock race.
    let other = job_with(LockPolicy::WhileExecuting);
    let ran = around_execute(&store, &config, &other, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Rejected);

    runtime.unlock().unwrap();
    let ran = around_execute(&store, &config, &other, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Completed(()));
}

#[test]
fn while_executing_releases_the_runtime_lock_when_the_body_panics() {
    let (store, config) = harness();
    let job = job_with(LockPolicy::WhileExecuting);

    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        around_execute(&store, &config, &job, || -> Result<()> { panic!("boom") })
    }));
    assert!(unwound.is_err());

    let runtime = smith_for(&store, &config, &job).runtime();
    assert!(!runtime.is_locked().unwrap());

    // A fresh run of the same payload is not locked out.
    let retry = job_with(LockPolicy::WhileExecuting);
    let ran = around_execute(&store, &config, &retry, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Completed(()));
}

#[test]
fn while_executing_reject_sends_conflicts_to_the_dead_set() {
    let (store, config) = harness();
    let job = job_with(LockPolicy::WhileExecutingReject);

    let runtime = smith_for(&store, &config, &job).runtime();
    assert!(runtime.lock().unwrap());

    let other = job_with(LockPolicy::WhileExecutingReject);
    let ran = around_execute(&store, &config, &other, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Rejected);

    let dead = store.zrange_with_scores(collaborator::DEAD).unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].0.contains("ReportWorker"));
}

#[test]
fn until_and_while_executing_hands_off_to_a_runtime_lock() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilAndWhileExecuting);
    before_enqueue(&store, &config, &mut job).unwrap();

    let smith = smith_for(&store, &config, &job);
    let runtime = smith.runtime();
    let ran = around_execute(&store, &config, &job, || {
        assert!(!smith.is_locked().unwrap());
        assert!(runtime.is_locked().unwrap());
        Ok(())
    })
    .unwrap();
    assert_eq!(ran, Execution::Completed(()));
    assert!(!runtime.is_locked().unwrap());
}

#[test]
fn until_and_while_executing_relocks_when_the_body_fails() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilAndWhileExecuting);
    before_enqueue(&store, &config, &mut job).unwrap();

    let result: Result<Execution<()>> = around_execute(&store, &config, &job, || {
        Err(UnijobError::Lock("boom".to_string()))
    });
    assert!(result.is_err());

    // The submission lock is back in place for the retry.
    let smith = smith_for(&store, &config, &job);
    assert!(smith.is_locked().unwrap());
    assert!(!smith.runtime().is_locked().unwrap());
}

#[test]
fn until_and_while_executing_relocks_when_the_handoff_fails() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilAndWhileExecuting);
    before_enqueue(&store, &config, &mut job).unwrap();

    // Occupy the runtime lock under a different token; acquisition is
    // re-entrant for the holder, so blocking with the job's own jid would
    // let the hand-off through.
    let blocker = job_with(LockPolicy::UntilAndWhileExecuting);
    let runtime = smith_for(&store, &config, &blocker).runtime();
    assert!(runtime.lock().unwrap());

    let ran = around_execute(&store, &config, &job, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Rejected);

    let smith = smith_for(&store, &config, &job);
    assert!(smith.is_locked().unwrap());
}

#[test]
fn until_expired_requires_a_ttl() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilExpired);

    let result = before_enqueue(&store, &config, &mut job);
    assert!(matches!(result, Err(UnijobError::Config(_))));
}

#[test]
fn until_expired_dedupes_for_the_window_only() {
    let (store, config) = harness();
    let ttl = Duration::from_millis(80);
    let mut first = job_with(LockPolicy::UntilExpired).with_lock_ttl(ttl);
    let mut second = job_with(LockPolicy::UntilExpired).with_lock_ttl(ttl);

    assert_eq!(
        before_enqueue(&store, &config, &mut first).unwrap(),
        Decision::Allow
    );
    assert_eq!(
        before_enqueue(&store, &config, &mut second).unwrap(),
        Decision::Reject
    );

    // Execution never releases the window.
    let ran = around_execute(&store, &config, &first, || Ok(())).unwrap();
    assert_eq!(ran, Execution::Completed(()));
    assert_eq!(
        before_enqueue(&store, &config, &mut second).unwrap(),
        Decision::Reject
    );

    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(
        before_enqueue(&store, &config, &mut second).unwrap(),
        Decision::Allow
    );
}

#[test]
fn lock_digest_is_recorded_at_submission() {
    let (store, config) = harness();
    let mut job = job_with(LockPolicy::UntilExecuted);

    before_enqueue(&store, &config, &mut job).unwrap();
    let digest = job.digest(&config).unwrap();
    assert_eq!(job.lock_digest.as_deref(), Some(digest.as_str()));
}
