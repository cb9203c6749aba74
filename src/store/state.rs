//! Typed key space with lazy TTL expiry.
//!
//! `State` is the data plane scripts run against. Expiry is enforced
//! lazily: any access to a key first drops it when its deadline has passed,
//! which is what makes TTL-carrying locks self-heal without a sweeper.

use super::StoreError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    Zset(HashMap<String, f64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::Zset(_) => "sorted set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// The store's key space. Scripts receive `&mut State` and mutate through
/// these typed operations only.
#[derive(Debug, Default)]
pub struct State {
    entries: HashMap<String, Entry>,
}

fn wrong_type(key: &str, found: &Value, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        found: found.type_name(),
        expected,
    }
}

impl State {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry, dropping it first when expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && entry.is_expired(now)
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Whether a key exists and has not expired.
    pub fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Delete a key. Returns whether it existed.
    pub fn del(&mut self, key: &str) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }

    /// Set an expiry on an existing key. Returns whether the key existed.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        let deadline = Instant::now() + ttl;
        match self.live(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                true
            }
            None => false,
        }
    }

    /// Remaining TTL, when the key exists and carries one.
    pub fn ttl_remaining(&mut self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.live(key)
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Get a string value.
    pub fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                other => Err(wrong_type(key, other, "string")),
            },
        }
    }

    /// Set a string value, replacing any previous value and TTL.
    pub fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.insert(key.to_string(), entry);
    }

    // =========================================================================
    // Lists
    // =========================================================================

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                Value::List(items) => Ok(Some(items)),
                other => Err(wrong_type(key, other, "list")),
            },
        }
    }

    /// Append to the tail of a list, creating it when absent.
    pub fn rpush(&mut self, key: &str, value: &str) -> Result<usize, StoreError> {
        match self.list(key)? {
            Some(items) => {
                items.push_back(value.to_string());
                Ok(items.len())
            }
            None => {
                let mut items = VecDeque::new();
                items.push_back(value.to_string());
                self.entries
                    .insert(key.to_string(), Entry::new(Value::List(items)));
                Ok(1)
            }
        }
    }

    /// Pop from the head of a list.
    pub fn lpop(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(items) = self.list(key)? else {
            return Ok(None);
        };
        let popped = items.pop_front();
        if items.is_empty() {
            self.entries.remove(key);
        }
        Ok(popped)
    }

    /// Remove every occurrence of `value`. Returns the number removed.
    pub fn lrem(&mut self, key: &str, value: &str) -> Result<usize, StoreError> {
        let Some(items) = self.list(key)? else {
            return Ok(0);
        };
        let before = items.len();
        items.retain(|item| item != value);
        let removed = before - items.len();
        if items.is_empty() {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    /// Length of a list (0 when absent).
    pub fn llen(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self.list(key)?.map_or(0, |items| items.len()))
    }

    /// Full contents of a list, head first.
    pub fn lrange(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list(key)?
            .map_or_else(Vec::new, |items| items.iter().cloned().collect()))
    }

    /// The head of a list, without removing it.
    pub fn list_head(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.list(key)?.and_then(|items| items.front().cloned()))
    }

    /// Whether a list contains `value`.
    pub fn list_contains(&mut self, key: &str, value: &str) -> Result<bool, StoreError> {
        Ok(self
            .list(key)?
            .is_some_and(|items| items.iter().any(|item| item == value)))
    }

    // =========================================================================
    // Hashes
    // =========================================================================

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, String>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                Value::Hash(fields) => Ok(Some(fields)),
                other => Err(wrong_type(key, other, "hash")),
            },
        }
    }

    /// Set a hash field, creating the hash when absent.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        match self.hash(key)? {
            Some(fields) => {
                fields.insert(field.to_string(), value.to_string());
            }
            None => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                self.entries
                    .insert(key.to_string(), Entry::new(Value::Hash(fields)));
            }
        }
        Ok(())
    }

    /// Delete a hash field. Returns whether it existed.
    pub fn hdel(&mut self, key: &str, field: &str) -> Result<bool, StoreError> {
        let Some(fields) = self.hash(key)? else {
            return Ok(false);
        };
        let removed = fields.remove(field).is_some();
        if fields.is_empty() {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    /// Number of hash fields (0 when absent).
    pub fn hlen(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self.hash(key)?.map_or(0, |fields| fields.len()))
    }

    /// All field/value pairs, sorted by field for stable output.
    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut pairs: Vec<(String, String)> = self.hash(key)?.map_or_else(Vec::new, |fields| {
            fields
                .iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect()
        });
        pairs.sort();
        Ok(pairs)
    }

    // =========================================================================
    // Sorted sets
    // =========================================================================

    fn zset(&mut self, key: &str) -> Result<Option<&mut HashMap<String, f64>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                Value::Zset(members) => Ok(Some(members)),
                other => Err(wrong_type(key, other, "sorted set")),
            },
        }
    }

    /// Add a member (or update its score). Returns whether it was new.
    pub fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<bool, StoreError> {
        match self.zset(key)? {
            Some(members) => Ok(members.insert(member.to_string(), score).is_none()),
            None => {
                let mut members = HashMap::new();
                members.insert(member.to_string(), score);
                self.entries
                    .insert(key.to_string(), Entry::new(Value::Zset(members)));
                Ok(true)
            }
        }
    }

    /// Remove a member. Returns whether it existed.
    pub fn zrem(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let Some(members) = self.zset(key)? else {
            return Ok(false);
        };
        let removed = members.remove(member).is_some();
        if members.is_empty() {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    /// Cardinality (0 when absent).
    pub fn zcard(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self.zset(key)?.map_or(0, |members| members.len()))
    }

    /// Score of a member, when present.
    pub fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.zset(key)?.and_then(|members| members.get(member).copied()))
    }

    /// Members with scores, ordered by (score, member) ascending.
    pub fn zrange_with_scores(&mut self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut entries: Vec<(String, f64)> = self.zset(key)?.map_or_else(Vec::new, |members| {
            members.iter().map(|(m, s)| (m.clone(), *s)).collect()
        });
        entries.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(entries)
    }

    /// Members ordered by (score, member) descending.
    pub fn zrevrange_members(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.zrange_with_scores(key)?;
        entries.reverse();
        Ok(entries.into_iter().map(|(member, _)| member).collect())
    }

    /// Drop the oldest members beyond `keep`. Returns the number removed.
    pub fn ztrim_to(&mut self, key: &str, keep: usize) -> Result<usize, StoreError> {
        let entries = self.zrange_with_scores(key)?;
        if entries.len() <= keep {
            return Ok(0);
        }
        let excess = entries.len() - keep;
        for (member, _) in entries.iter().take(excess) {
            self.zrem(key, member)?;
        }
        Ok(excess)
    }

    // =========================================================================
    // Sets
    // =========================================================================

    fn set_value(&mut self, key: &str) -> Result<Option<&mut HashSet<String>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.value {
                Value::Set(members) => Ok(Some(members)),
                other => Err(wrong_type(key, other, "set")),
            },
        }
    }

    /// Add a member to a set. Returns whether it was new.
    pub fn sadd(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.set_value(key)? {
            Some(members) => Ok(members.insert(member.to_string())),
            None => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                self.entries
                    .insert(key.to_string(), Entry::new(Value::Set(members)));
                Ok(true)
            }
        }
    }

    /// All members of a set, sorted for stable output.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut members: Vec<String> = self
            .set_value(key)?
            .map_or_else(Vec::new, |set| set.iter().cloned().collect());
        members.sort();
        Ok(members)
    }
}
