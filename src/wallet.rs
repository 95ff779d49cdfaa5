//! Wallet Enricher (§2 component 10, §4.9): cache-first wallet enrichment,
//! blocking for the emitting trade-poll job but coalescing concurrent
//! lookups for the same new wallet via a per-wallet single-flight token
//! (§9 "Per-trade blocking wallet enrichment").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::adapters::BlockExplorer;
use crate::models::{Address, WalletProfile};
use crate::store::Store;

const CACHE_TTL_MS: i64 = 30 * 24 * 3_600_000; // 30 days
const FIRST_SEEN_TTL_MS: i64 = 30 * 24 * 3_600_000;
const SENTINEL_TTL_MS: i64 = 3_600_000; // shorter TTL on enrichment failure

fn cache_key(addr: &Address) -> String {
    format!("wallet:{}:enriched", addr.as_str())
}

fn first_seen_key(addr: &Address) -> String {
    format!("wallet:{}:first_seen", addr.as_str())
}

fn markets_key(addr: &Address) -> String {
    format!("wallet:{}:markets", addr.as_str())
}

pub struct WalletEnricher {
    store: Arc<dyn Store>,
    explorer: Arc<dyn BlockExplorer>,
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl WalletEnricher {
    pub fn new(store: Arc<dyn Store>, explorer: Arc<dyn BlockExplorer>) -> Self {
        Self {
            store,
            explorer,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn read_cached(&self, addr: &Address) -> Option<WalletProfile> {
        let fields = self.store.hash_get_all(&cache_key(addr));
        if fields.is_empty() {
            return None;
        }
        serde_json::from_str(fields.get("profile")?).ok()
    }

    fn write_cached(&self, profile: &WalletProfile, ttl_ms: i64) {
        if let Ok(json) = serde_json::to_string(profile) {
            self.store
                .hash_set(&cache_key(&profile.address), "profile", json, ttl_ms);
        }
    }

    /// Returns the enriched profile for `address`, fetching on-chain facts
    /// on first sighting. Never fails the caller: on adapter error, writes a
    /// short-TTL sentinel with neutral defaults and returns it.
    pub async fn enrich(&self, address: &Address, now_ms: i64) -> WalletProfile {
        if let Some(cached) = self.read_cached(address) {
            return cached;
        }

        let notify = {
            let mut guard = self.inflight.lock();
            if let Some(existing) = guard.get(address.as_str()) {
                Some(existing.clone())
            } else {
                let n = Arc::new(Notify::new());
                guard.insert(address.as_str().to_string(), n);
                None
            }
        };

        if let Some(notify) = notify {
            // Another job is already enriching this wallet; wait for it to
            // finish, then read whatever it wrote (cache or sentinel).
            notify.notified().await;
            return self.read_cached(address).unwrap_or_else(|| neutral_profile(address, now_ms));
        }

        let profile = match self.explorer.account_info(address.as_str()).await {
            Ok(info) => {
                let profile = WalletProfile {
                    address: address.clone(),
                    first_seen_at_ms: info.first_tx_timestamp_ms,
                    first_seen_block: info.first_tx_block,
                    tx_count: info.tx_count,
                    trade_count: 0,
                    markets_traded: 0,
                    total_volume: 0.0,
                    last_enriched_at_ms: now_ms,
                    ttl_secs: (CACHE_TTL_MS / 1000) as u64,
                };
                if let Some(first_seen) = info.first_tx_timestamp_ms {
                    self.store.set_string(
                        &first_seen_key(address),
                        first_seen.to_string(),
                        FIRST_SEEN_TTL_MS,
                    );
                }
                self.write_cached(&profile, CACHE_TTL_MS);
                profile
            }
            Err(_) => {
                let sentinel = neutral_profile(address, now_ms);
                self.write_cached(&sentinel, SENTINEL_TTL_MS);
                sentinel
            }
        };

        let guard = self.inflight.lock();
        if let Some(n) = guard.get(address.as_str()) {
            n.notify_waiters();
        }
        drop(guard);
        self.inflight.lock().remove(address.as_str());

        profile
    }

    /// Folds observed trading activity into the cached profile so
    /// `walletActivityScore` reflects platform behavior, not just on-chain
    /// age. Called by the trade-poll job after a wallet's trade is recorded.
    /// `marketsTraded` tracks the wallet's distinct-condition-id set in the
    /// store so it decays the activity gate on genuine cross-market reach,
    /// not just repeat trades in one market.
    pub fn record_trade(&self, address: &Address, condition_id: &str, size_usd: f64, now_ms: i64) {
        let mut profile = self
            .read_cached(address)
            .unwrap_or_else(|| neutral_profile(address, now_ms));
        profile.trade_count += 1;
        profile.total_volume += size_usd;
        self.store
            .sadd(&markets_key(address), condition_id.to_string(), CACHE_TTL_MS);
        profile.markets_traded = self.store.smembers(&markets_key(address)).len() as u64;
        self.write_cached(&profile, CACHE_TTL_MS);
    }
}

/// Neutral defaults on enrichment failure (§4.9): age-unknown scores 0.5 via
/// `WalletFeature::compute`'s `None` branch.
fn neutral_profile(address: &Address, now_ms: i64) -> WalletProfile {
    WalletProfile {
        address: address.clone(),
        first_seen_at_ms: None,
        first_seen_block: None,
        tx_count: 0,
        trade_count: 0,
        markets_traded: 0,
        total_volume: 0.0,
        last_enriched_at_ms: now_ms,
        ttl_secs: (SENTINEL_TTL_MS / 1000) as u64,
    }
}
