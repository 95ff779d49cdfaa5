//! Rolling windows (§3): the 60-minute trade window, 60-minute book window,
//! and 60-minute wallet-seen set, all backed by the `Store`'s sorted-set /
//! set primitives. Window trim is idempotent (range delete by score, §5).

use std::sync::Arc;

use crate::models::{OrderbookMetrics, OrderbookSnapshot, Trade};
use crate::store::Store;

const WINDOW_MS: i64 = 3_600_000; // 60 minutes
const TTL_MS: i64 = 3_600_000; // 1h, per §3/§6

fn trade_window_key(token_id: &str) -> String {
    format!("trades:{token_id}:window:60m")
}

fn book_window_key(token_id: &str) -> String {
    format!("book:{token_id}:window:60m")
}

fn wallet_seen_key(token_id: &str) -> String {
    format!("wallets:{token_id}:60m")
}

/// Appends `trade` to the rolling window, trims entries older than 1h, and
/// returns `true` if this was a new entry (dedupe by `(timestamp, tradeId)`,
/// §8 idempotence property).
pub fn append_trade(store: &dyn Store, token_id: &str, trade: &Trade) -> bool {
    let key = trade_window_key(token_id);
    let member = format!("{}:{}", trade.timestamp_ms, trade.trade_id);
    let already_present = store
        .zrange_by_score(&key, trade.timestamp_ms as f64, trade.timestamp_ms as f64)
        .iter()
        .any(|(_, m)| m == &member);
    if already_present {
        return false;
    }
    let payload = serde_json::to_string(trade).unwrap_or_default();
    // The store keys members by `(score, member)`; we embed the payload in
    // the member string itself so a single zset can carry both ordering and
    // content without a second lookup.
    let value = format!("{member}|{payload}");
    store.zadd(&key, trade.timestamp_ms as f64, value, TTL_MS);
    trim_trade_window(store, token_id, trade.timestamp_ms);
    true
}

pub fn trim_trade_window(store: &dyn Store, token_id: &str, now_ms: i64) {
    store.zremrange_by_score_below(&trade_window_key(token_id), (now_ms - WINDOW_MS) as f64);
}

fn decode_trade_member(member: &str) -> Option<Trade> {
    let payload = member.splitn(2, '|').nth(1)?;
    serde_json::from_str(payload).ok()
}

pub fn load_trades(store: &dyn Store, token_id: &str, now_ms: i64) -> Vec<Trade> {
    store
        .zrange_by_score(&trade_window_key(token_id), (now_ms - WINDOW_MS) as f64, now_ms as f64)
        .into_iter()
        .filter_map(|(_, member)| decode_trade_member(&member))
        .collect()
}

pub fn trade_sizes_usd(store: &dyn Store, token_id: &str, now_ms: i64) -> Vec<f64> {
    load_trades(store, token_id, now_ms)
        .iter()
        .map(|t| t.price * t.size)
        .collect()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BookWindowEntry {
    pub snapshot: OrderbookSnapshot,
    pub metrics: OrderbookMetrics,
}

pub fn append_book(store: &dyn Store, token_id: &str, entry: &BookWindowEntry) {
    let key = book_window_key(token_id);
    let ts = entry.snapshot.timestamp_ms;
    let payload = serde_json::to_string(entry).unwrap_or_default();
    let value = format!("{ts}|{payload}");
    store.zadd(&key, ts as f64, value, TTL_MS);
    store.zremrange_by_score_below(&key, (ts - WINDOW_MS) as f64);
}

fn decode_book_member(member: &str) -> Option<BookWindowEntry> {
    let payload = member.splitn(2, '|').nth(1)?;
    serde_json::from_str(payload).ok()
}

pub fn load_book_window(store: &dyn Store, token_id: &str, now_ms: i64) -> Vec<BookWindowEntry> {
    store
        .zrange_by_score(&book_window_key(token_id), (now_ms - WINDOW_MS) as f64, now_ms as f64)
        .into_iter()
        .filter_map(|(_, member)| decode_book_member(&member))
        .collect()
}

/// `(timestamp_ms, mid_price)` pairs for the Feature Builder's impact-drift
/// sampling (§4.3).
pub fn book_window_mids(store: &dyn Store, token_id: &str, now_ms: i64) -> Vec<(i64, f64)> {
    load_book_window(store, token_id, now_ms)
        .into_iter()
        .filter_map(|e| e.snapshot.mid_price.map(|mid| (e.snapshot.timestamp_ms, mid)))
        .collect()
}

/// Returns `true` if `taker` had not previously been observed for `token_id`
/// in the last hour, and records it either way.
pub fn observe_wallet(store: &Arc<dyn Store>, token_id: &str, taker: &str) -> bool {
    let key = wallet_seen_key(token_id);
    let seen_before = store.sismember(&key, taker);
    store.sadd(&key, taker.to_string(), TTL_MS);
    !seen_before
}
