//! Shared KV/Stream store abstraction (§5, §6, §9): strings, hashes,
//! score-ordered sorted sets, sets, and TTLs. One in-memory implementation
//! backs both production (single-process deployment, no external store) and
//! tests, per SPEC_FULL §10.4.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;

use crate::clock::Clock;
use std::sync::Arc;

/// Everything the pipeline needs from a shared key-value / sorted-set store.
/// Implementors decide their own eviction/TTL story; callers only rely on
/// the documented read-after-TTL behavior: an expired key reads as absent.
pub trait Store: Send + Sync {
    fn set_string(&self, key: &str, value: String, ttl_ms: i64);
    fn get_string(&self, key: &str) -> Option<String>;
    fn del(&self, key: &str);

    fn hash_set(&self, key: &str, field: &str, value: String, ttl_ms: i64);
    fn hash_get(&self, key: &str, field: &str) -> Option<String>;
    fn hash_get_all(&self, key: &str) -> HashMap<String, String>;

    /// Adds `member` scored by `score` (e.g. a timestamp) to a sorted set,
    /// refreshing the key's TTL.
    fn zadd(&self, key: &str, score: f64, member: String, ttl_ms: i64);
    /// Members with `min <= score <= max`, ascending by score.
    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<(f64, String)>;
    /// Removes members with `score < min` (used to trim rolling windows).
    fn zremrange_by_score_below(&self, key: &str, min: f64);
    fn zcard(&self, key: &str) -> usize;

    fn sadd(&self, key: &str, member: String, ttl_ms: i64);
    fn srem(&self, key: &str, member: &str);
    fn sismember(&self, key: &str, member: &str) -> bool;
    fn smembers(&self, key: &str) -> HashSet<String>;
}

struct Entry<T> {
    value: T,
    expires_at_ms: Option<i64>,
}

impl<T> Entry<T> {
    fn is_live(&self, now_ms: i64) -> bool {
        match self.expires_at_ms {
            None => true,
            Some(exp) => now_ms < exp,
        }
    }
}

#[derive(Default)]
struct Shard {
    strings: HashMap<String, Entry<String>>,
    hashes: HashMap<String, Entry<HashMap<String, String>>>,
    zsets: HashMap<String, Entry<BTreeMap<(i64, String), f64>>>,
    sets: HashMap<String, Entry<HashSet<String>>>,
}

/// In-memory implementation preserving insertion ordering within equal
/// scores (via a `(score_bits, member)` composite key) and TTL semantics.
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    shard: Mutex<Shard>,
}

fn expiry(now_ms: i64, ttl_ms: i64) -> Option<i64> {
    if ttl_ms <= 0 {
        None
    } else {
        Some(now_ms + ttl_ms)
    }
}

/// `f64` scores need a total order for the `BTreeMap` key; prediction-market
/// scores here are always timestamps or finite metrics, never NaN.
fn score_key(score: f64) -> i64 {
    (score * 1000.0).round() as i64
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            shard: Mutex::new(Shard::default()),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }
}

impl Store for InMemoryStore {
    fn set_string(&self, key: &str, value: String, ttl_ms: i64) {
        let now = self.now();
        self.shard.lock().strings.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_ms: expiry(now, ttl_ms),
            },
        );
    }

    fn get_string(&self, key: &str) -> Option<String> {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .strings
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    fn del(&self, key: &str) {
        let mut guard = self.shard.lock();
        guard.strings.remove(key);
        guard.hashes.remove(key);
        guard.zsets.remove(key);
        guard.sets.remove(key);
    }

    fn hash_set(&self, key: &str, field: &str, value: String, ttl_ms: i64) {
        let now = self.now();
        let mut guard = self.shard.lock();
        let entry = guard.hashes.entry(key.to_string()).or_insert_with(|| Entry {
            value: HashMap::new(),
            expires_at_ms: None,
        });
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.insert(field.to_string(), value);
        entry.expires_at_ms = expiry(now, ttl_ms);
    }

    fn hash_get(&self, key: &str, field: &str) -> Option<String> {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .hashes
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.get(field).cloned())
    }

    fn hash_get_all(&self, key: &str) -> HashMap<String, String> {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .hashes
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    fn zadd(&self, key: &str, score: f64, member: String, ttl_ms: i64) {
        let now = self.now();
        let mut guard = self.shard.lock();
        let entry = guard.zsets.entry(key.to_string()).or_insert_with(|| Entry {
            value: BTreeMap::new(),
            expires_at_ms: None,
        });
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.insert((score_key(score), member), score);
        entry.expires_at_ms = expiry(now, ttl_ms);
    }

    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<(f64, String)> {
        let now = self.now();
        let guard = self.shard.lock();
        match guard.zsets.get(key).filter(|e| e.is_live(now)) {
            None => Vec::new(),
            Some(entry) => entry
                .value
                .iter()
                .filter(|((_, _), &score)| score >= min && score <= max)
                .map(|((_, member), &score)| (score, member.clone()))
                .collect(),
        }
    }

    fn zremrange_by_score_below(&self, key: &str, min: f64) {
        let mut guard = self.shard.lock();
        if let Some(entry) = guard.zsets.get_mut(key) {
            entry.value.retain(|_, &mut score| score >= min);
        }
    }

    fn zcard(&self, key: &str) -> usize {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .zsets
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.len())
            .unwrap_or(0)
    }

    fn sadd(&self, key: &str, member: String, ttl_ms: i64) {
        let now = self.now();
        let mut guard = self.shard.lock();
        let entry = guard.sets.entry(key.to_string()).or_insert_with(|| Entry {
            value: HashSet::new(),
            expires_at_ms: None,
        });
        if !entry.is_live(now) {
            entry.value.clear();
        }
        entry.value.insert(member);
        entry.expires_at_ms = expiry(now, ttl_ms);
    }

    fn srem(&self, key: &str, member: &str) {
        let mut guard = self.shard.lock();
        if let Some(entry) = guard.sets.get_mut(key) {
            entry.value.remove(member);
        }
    }

    fn sismember(&self, key: &str, member: &str) -> bool {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .sets
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.contains(member))
            .unwrap_or(false)
    }

    fn smembers(&self, key: &str) -> HashSet<String> {
        let now = self.now();
        let guard = self.shard.lock();
        guard
            .sets
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn store() -> (InMemoryStore, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(0));
        (InMemoryStore::new(clock.clone()), clock)
    }

    #[test]
    fn string_ttl_expires() {
        let (s, clock) = store();
        s.set_string("k", "v".into(), 1000);
        assert_eq!(s.get_string("k"), Some("v".to_string()));
        clock.advance_ms(1001);
        assert_eq!(s.get_string("k"), None);
    }

    #[test]
    fn zset_orders_by_score_and_trims() {
        let (s, _clock) = store();
        s.zadd("window", 10.0, "a".into(), 0);
        s.zadd("window", 5.0, "b".into(), 0);
        s.zadd("window", 20.0, "c".into(), 0);
        let all = s.zrange_by_score("window", 0.0, 100.0);
        assert_eq!(
            all.iter().map(|(_, m)| m.clone()).collect::<Vec<_>>(),
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );
        s.zremrange_by_score_below("window", 10.0);
        assert_eq!(s.zcard("window"), 2);
    }

    #[test]
    fn dedupe_by_identical_member_at_same_score() {
        let (s, _clock) = store();
        s.zadd("w", 1.0, "same".into(), 0);
        s.zadd("w", 1.0, "same".into(), 0);
        assert_eq!(s.zcard("w"), 1);
    }

    #[test]
    fn set_membership() {
        let (s, _clock) = store();
        s.sadd("wallets", "0xabc".into(), 0);
        assert!(s.sismember("wallets", "0xabc"));
        assert!(!s.sismember("wallets", "0xdef"));
    }

    #[test]
    fn hash_fields_independent() {
        let (s, _clock) = store();
        s.hash_set("h", "a", "1".into(), 0);
        s.hash_set("h", "b", "2".into(), 0);
        assert_eq!(s.hash_get("h", "a"), Some("1".to_string()));
        assert_eq!(s.hash_get_all("h").len(), 2);
    }
}
