//! The atomic script bodies.
//!
//! Each script receives KEYS and ARGV exactly like a store-side script
//! would, runs under the store mutex, and returns a typed reply. Key order
//! for the lock scripts is fixed:
//!
//! ```text
//! KEYS[0] exists   KEYS[1] queued   KEYS[2] primed
//! KEYS[3] locked   KEYS[4] digests  KEYS[5] changelog
//! ```
//!
//! ARGV layouts are documented per script. Every mutating script appends a
//! changelog entry and trims the changelog to the bound passed as the final
//! argument.

use crate::changelog::actor_string;
use crate::keys::{collaborator, sub_keys_for};
use crate::store::{Reply, State, StoreError};
use std::time::Duration;

const EXISTS: usize = 0;
const QUEUED: usize = 1;
const PRIMED: usize = 2;
const LOCKED: usize = 3;
const DIGESTS: usize = 4;
const CHANGELOG: usize = 5;

fn key<'a>(keys: &'a [String], idx: usize) -> Result<&'a str, StoreError> {
    keys.get(idx)
        .map(|k| k.as_str())
        .ok_or_else(|| StoreError::BadArgument(format!("missing key at index {}", idx)))
}

fn arg<'a>(argv: &'a [String], idx: usize) -> Result<&'a str, StoreError> {
    argv.get(idx)
        .map(|a| a.as_str())
        .ok_or_else(|| StoreError::BadArgument(format!("missing argument at index {}", idx)))
}

fn float_arg(argv: &[String], idx: usize) -> Result<f64, StoreError> {
    let raw = arg(argv, idx)?;
    raw.parse::<f64>()
        .map_err(|_| StoreError::BadArgument(format!("expected float at index {}: '{}'", idx, raw)))
}

fn usize_arg(argv: &[String], idx: usize) -> Result<usize, StoreError> {
    let raw = arg(argv, idx)?;
    raw.parse::<usize>().map_err(|_| {
        StoreError::BadArgument(format!("expected integer at index {}: '{}'", idx, raw))
    })
}

/// TTL argument: empty string means none, otherwise milliseconds.
fn ttl_arg(argv: &[String], idx: usize) -> Result<Option<Duration>, StoreError> {
    let raw = arg(argv, idx)?;
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| StoreError::BadArgument(format!("expected ttl millis at index {}: '{}'", idx, raw)))
}

/// Append a changelog entry and trim the log to `limit`.
fn log_change(
    state: &mut State,
    changelog: &str,
    digest: &str,
    token: &str,
    script: &str,
    message: &str,
    now: f64,
    limit: usize,
) -> Result<(), StoreError> {
    let entry = serde_json::json!({
        "time": now,
        "digest": digest,
        "token": token,
        "script": script,
        "message": message,
        "actor": actor_string(),
    })
    .to_string();

    state.zadd(changelog, now, &entry)?;
    state.ztrim_to(changelog, limit)?;
    Ok(())
}

/// Enqueue a waiter.
///
/// ARGV: `[token, now, changelog_limit]`
///
/// When the lock is entirely free with no other waiters, the token is
/// primed directly so the waiter wakes without a releaser. Tokens already
/// queued, primed, or holding are not enqueued twice. Returns the queue
/// length (or the token when it already holds the lock).
pub(super) fn queue(
    state: &mut State,
    keys: &[String],
    argv: &[String],
) -> Result<Reply, StoreError> {
    let exists = key(keys, EXISTS)?;
    let queued = key(keys, QUEUED)?;
    let primed = key(keys, PRIMED)?;
    let locked = key(keys, LOCKED)?;
    let changelog = key(keys, CHANGELOG)?;

    let token = arg(argv, 0)?;
    let now = float_arg(argv, 1)?;
    let limit = usize_arg(argv, 2)?;

    if state.get(exists)?.as_deref() == Some(token) {
        return Ok(Reply::Str(token.to_string()));
    }
    if state.list_contains(queued, token)? || state.list_contains(primed, token)? {
        return Ok(Reply::Int(state.llen(queued)? as i64));
    }

    let free = !state.exists(exists)
        && state.hlen(locked)? == 0
        && state.llen(queued)? == 0
        && state.llen(primed)? == 0;
    if free {
        state.rpush(primed, token)?;
    } else {
        state.rpush(queued, token)?;
    }

    log_change(state, changelog, exists, token, "queue", "queued", now, limit)?;
    Ok(Reply::Int(state.llen(queued)? as i64))
}

/// Attempt acquisition.
///
/// ARGV: `[token, digest, policy, now, ttl_ms_or_empty, changelog_limit]`
///
/// Fails (nil) when another token owns the EXISTS marker. On success the
/// token is removed from QUEUED/PRIMED (a token is in at most one stage at
/// a time), recorded in LOCKED with its acquisition time, and the digest is
/// registered. A supplied TTL lands on both EXISTS and LOCKED so a crashed
/// holder self-heals.
pub(super) fn acquire(
    state: &mut State,
    keys: &[String],
    argv: &[String],
) -> Result<Reply, StoreError> {
    let exists = key(keys, EXISTS)?;
    let queued = key(keys, QUEUED)?;
    let primed = key(keys, PRIMED)?;
    let locked = key(keys, LOCKED)?;
    let digests = key(keys, DIGESTS)?;
    let changelog = key(keys, CHANGELOG)?;

    let token = arg(argv, 0)?;
    let digest = arg(argv, 1)?;
    let policy = arg(argv, 2)?;
    let now = float_arg(argv, 3)?;
    let ttl = ttl_arg(argv, 4)?;
    let limit = usize_arg(argv, 5)?;

    if let Some(holder) = state.get(exists)?
        && holder != token
    {
        return Ok(Reply::Nil);
    }

    state.set(exists, token, ttl);
    state.lrem(queued, token)?;
    state.lrem(primed, token)?;
    state.hset(locked, token, &now.to_string())?;
    if let Some(ttl) = ttl {
        state.expire(locked, ttl);
    }
    state.zadd(digests, now, digest)?;

    let message = format!("locked:{}", policy);
    log_change(state, changelog, digest, token, "acquire", &message, now, limit)?;
    Ok(Reply::Str(token.to_string()))
}

/// Release a token.
///
/// ARGV: `[token, digest, now, changelog_limit]`
///
/// Removes the token from every stage. With waiters queued, the next one is
/// promoted into PRIMED (the registry entry survives the handoff). With
/// nobody left, every sub-key is deleted and the registry entry dropped,
/// unless the EXISTS marker carries an explicit TTL, in which case it is
/// left to expire so the uniqueness window outlives the holder.
///
/// Returns 1 when the token actually held the lock, 0 otherwise (double
/// unlocks are a no-op, never an error).
pub(super) fn release(
    state: &mut State,
    keys: &[String],
    argv: &[String],
) -> Result<Reply, StoreError> {
    let exists = key(keys, EXISTS)?;
    let queued = key(keys, QUEUED)?;
    let primed = key(keys, PRIMED)?;
    let locked = key(keys, LOCKED)?;
    let digests = key(keys, DIGESTS)?;
    let changelog = key(keys, CHANGELOG)?;

    let token = arg(argv, 0)?;
    let digest = arg(argv, 1)?;
    let now = float_arg(argv, 2)?;
    let limit = usize_arg(argv, 3)?;

    let was_held = state.hdel(locked, token)?;
    state.lrem(queued, token)?;
    state.lrem(primed, token)?;

    let keeps_window = state.ttl_remaining(exists).is_some();
    if state.get(exists)?.as_deref() == Some(token) && !keeps_window {
        state.del(exists);
    }

    // Only a genuinely free lock hands off to the next waiter. A withdrawal
    // by a non-holder must not promote anyone past a live holder or an
    // unexpired uniqueness window.
    let free = !state.exists(exists) && state.hlen(locked)? == 0;
    if free && state.llen(queued)? > 0 {
        if let Some(next) = state.lpop(queued)? {
            state.rpush(primed, &next)?;
        }
    } else if state.llen(queued)? == 0 && state.hlen(locked)? == 0 && state.llen(primed)? == 0 {
        state.del(queued);
        state.del(primed);
        state.del(locked);
        if !state.exists(exists) {
            state.zrem(digests, digest)?;
        }
    }

    let message = if was_held { "unlocked" } else { "not_holder" };
    log_change(state, changelog, digest, token, "release", message, now, limit)?;
    Ok(Reply::Int(was_held as i64))
}

/// Remove one digest entirely: registry entry plus every lock sub-key.
///
/// KEYS: `[digests, changelog]`, ARGV: `[digest, now, changelog_limit]`
///
/// Requires no token and no holder. Returns 1 when the digest was known in
/// any form, 0 otherwise.
pub(super) fn delete_by_digest(
    state: &mut State,
    keys: &[String],
    argv: &[String],
) -> Result<Reply, StoreError> {
    let digests = key(keys, 0)?;
    let changelog = key(keys, 1)?;

    let digest = arg(argv, 0)?;
    let now = float_arg(argv, 1)?;
    let limit = usize_arg(argv, 2)?;

    let mut removed_any = false;
    for sub_key in sub_keys_for(digest) {
        removed_any |= state.del(&sub_key);
    }
    removed_any |= state.zrem(digests, digest)?;

    if removed_any {
        log_change(state, changelog, digest, "", "delete_by_digest", "deleted", now, limit)?;
    }
    Ok(Reply::Int(removed_any as i64))
}

fn zset_member_mentions(
    state: &mut State,
    key: &str,
    digest: &str,
) -> Result<bool, StoreError> {
    Ok(state
        .zrange_with_scores(key)?
        .iter()
        .any(|(member, _)| member.contains(digest)))
}

fn queue_holding(state: &mut State, digest: &str) -> Result<Option<String>, StoreError> {
    for queue in state.smembers(collaborator::QUEUES)? {
        let payloads = state.lrange(&collaborator::queue_key(&queue))?;
        if payloads.iter().any(|payload| payload.contains(digest)) {
            return Ok(Some(queue));
        }
    }
    Ok(None)
}

/// Reap orphaned digests in one atomic pass.
///
/// KEYS: `[digests, schedule, retry]`, ARGV: `[count]`
///
/// Walks the registry newest first and deletes every digest whose job
/// appears nowhere (not scheduled, not retrying, not on any queue), up to
/// `count` per run. Returns the number reaped.
pub(super) fn reap_orphans(
    state: &mut State,
    keys: &[String],
    argv: &[String],
) -> Result<Reply, StoreError> {
    let digests = key(keys, 0)?;
    let schedule = key(keys, 1)?;
    let retry = key(keys, 2)?;
    let count = usize_arg(argv, 0)?;

    let mut reaped: i64 = 0;
    for digest in state.zrevrange_members(digests)? {
        if reaped >= count as i64 {
            break;
        }
        if zset_member_mentions(state, schedule, &digest)?
            || zset_member_mentions(state, retry, &digest)?
            || queue_holding(state, &digest)?.is_some()
        {
            continue;
        }

        for sub_key in sub_keys_for(&digest) {
            state.del(&sub_key);
        }
        state.zrem(digests, &digest)?;
        reaped += 1;
    }

    Ok(Reply::Int(reaped))
}

/// Find the collaborator queue holding a digest, if any.
///
/// KEYS: `[digest]`
pub(super) fn find_digest_in_queues(
    state: &mut State,
    keys: &[String],
    _argv: &[String],
) -> Result<Reply, StoreError> {
    let digest = key(keys, 0)?;
    match queue_holding(state, digest)? {
        Some(queue) => Ok(Reply::Str(queue)),
        None => Ok(Reply::Nil),
    }
}
