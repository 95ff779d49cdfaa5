//! Per-token online estimator state (§4.2): the Hawkes intensity process and
//! the two CUSUM detectors (trade size, spread) and the trade-size digest
//! each need to persist across polls for one token. Backed by the `Store`
//! the same way `windows.rs` backs the rolling windows, so one process can
//! restart mid-session without losing recent context (bounded by TTL, not
//! meant as durable storage).

use crate::estimators::{CusumState, HawkesState, RollingStats, SizeDigest};
use crate::store::Store;

const TTL_MS: i64 = 24 * 3_600_000;
const CUSUM_THRESHOLD: f64 = 5.0;

fn hawkes_key(token_id: &str) -> String {
    format!("estimator:{token_id}:hawkes")
}

fn cusum_size_key(token_id: &str) -> String {
    format!("estimator:{token_id}:cusum_size")
}

fn cusum_spread_key(token_id: &str) -> String {
    format!("estimator:{token_id}:cusum_spread")
}

fn digest_key(token_id: &str) -> String {
    format!("estimator:{token_id}:size_digest")
}

fn rolling_stats_key(token_id: &str) -> String {
    format!("stats:{token_id}:rolling:60m")
}

pub fn load_hawkes(store: &dyn Store, token_id: &str) -> HawkesState {
    store
        .get_string(&hawkes_key(token_id))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

pub fn save_hawkes(store: &dyn Store, token_id: &str, state: &HawkesState) {
    if let Ok(json) = serde_json::to_string(state) {
        store.set_string(&hawkes_key(token_id), json, TTL_MS);
    }
}

pub fn load_cusum_size(store: &dyn Store, token_id: &str) -> CusumState {
    store
        .get_string(&cusum_size_key(token_id))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_else(|| CusumState::new(CUSUM_THRESHOLD))
}

pub fn save_cusum_size(store: &dyn Store, token_id: &str, state: &CusumState) {
    if let Ok(json) = serde_json::to_string(state) {
        store.set_string(&cusum_size_key(token_id), json, TTL_MS);
    }
}

pub fn load_cusum_spread(store: &dyn Store, token_id: &str) -> CusumState {
    store
        .get_string(&cusum_spread_key(token_id))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_else(|| CusumState::new(CUSUM_THRESHOLD))
}

pub fn save_cusum_spread(store: &dyn Store, token_id: &str, state: &CusumState) {
    if let Ok(json) = serde_json::to_string(state) {
        store.set_string(&cusum_spread_key(token_id), json, TTL_MS);
    }
}

pub fn load_digest(store: &dyn Store, token_id: &str) -> SizeDigest {
    store
        .get_string(&digest_key(token_id))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

pub fn save_digest(store: &dyn Store, token_id: &str, digest: &SizeDigest) {
    if let Ok(json) = serde_json::to_string(digest) {
        store.set_string(&digest_key(token_id), json, TTL_MS);
    }
}

/// Recomputes and persists the trade window's rolling stats (§3, §6) so a
/// consumer outside the feature pipeline (e.g. a future dashboard or alert
/// rule) can read them without recomputing from the raw window itself.
pub fn save_rolling_stats(store: &dyn Store, token_id: &str, window_sizes_usd: &[f64]) -> RollingStats {
    let stats = RollingStats::compute(window_sizes_usd);
    if let Ok(json) = serde_json::to_string(&stats) {
        store.set_string(&rolling_stats_key(token_id), json, TTL_MS);
    }
    stats
}

pub fn load_rolling_stats(store: &dyn Store, token_id: &str) -> Option<RollingStats> {
    store
        .get_string(&rolling_stats_key(token_id))
        .and_then(|json| serde_json::from_str(&json).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn round_trips_through_the_store() {
        let store = InMemoryStore::new(Arc::new(FakeClock::new(0)));
        let mut hawkes = load_hawkes(&store, "tok");
        hawkes.record_event(1000);
        save_hawkes(&store, "tok", &hawkes);
        let reloaded = load_hawkes(&store, "tok");
        assert_eq!(reloaded.event_count, 1);

        let mut cusum = load_cusum_size(&store, "tok");
        cusum.update(10.0);
        save_cusum_size(&store, "tok", &cusum);
        assert_eq!(load_cusum_size(&store, "tok").n, 1);
    }

    #[test]
    fn missing_state_falls_back_to_defaults() {
        let store = InMemoryStore::new(Arc::new(FakeClock::new(0)));
        assert_eq!(load_hawkes(&store, "ghost"), HawkesState::default());
        assert_eq!(load_cusum_spread(&store, "ghost").threshold, CUSUM_THRESHOLD);
        assert!(load_rolling_stats(&store, "ghost").is_none());
    }

    #[test]
    fn rolling_stats_round_trip_through_the_store() {
        let store = InMemoryStore::new(Arc::new(FakeClock::new(0)));
        let computed = save_rolling_stats(&store, "tok", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(computed.count, 8);
        let reloaded = load_rolling_stats(&store, "tok").unwrap();
        assert_eq!(reloaded.count, 8);
        assert!((reloaded.mean - 5.0).abs() < 1e-9);
    }
}
