//! Collector (§2 component 9, §4.8): the three polling jobs that turn raw
//! upstream feeds into the store-resident state everything downstream reads
//! — market metadata + the tracked-token set, orderbook snapshots, and new
//! trades (with wallet enrichment and optional tabular persistence).
//!
//! Grounded on the teacher's `scrapers::polymarket_gamma::GammaMarketLookup`
//! for the paginate-filter-cache market sweep, and `scrapers::polymarket_api`
//! for the orderbook/trade polling shape; reworked against the `adapters`
//! traits instead of concrete HTTP clients (§1, §6).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::adapters::{MarketsFeed, OrderbookFeed, RawMarket, TradeFeed};
use crate::clock::{Clock, DataKind, StalenessTracker};
use crate::models::{
    ConditionId, Level, MarketMetadata, Outcome, OrderbookMetrics, OrderbookSnapshot, TokenId,
    Trade,
};
use crate::store::Store;
use crate::tape::TradeTape;
use crate::wallet::WalletEnricher;
use crate::windows::{self, BookWindowEntry};

const METADATA_TTL_MS: i64 = 24 * 3_600_000;
const ORDERBOOK_STATE_TTL_MS: i64 = 30_000;
const SINCE_CURSOR_TTL_MS: i64 = 24 * 3_600_000;
const TRACKED_TOKENS_KEY: &str = "config:tracked_tokens";

/// One entry of the tracked-token set persisted at `config:tracked_tokens`
/// (§4.8): the pair of token ids for every market within the tracking
/// horizon, refreshed on every market-metadata sweep and pruned once the
/// market has been over for `cleanup_grace_ms`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackedToken {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub outcome: String,
    pub end_time_ms: i64,
}

/// Caller-supplied predicate deciding whether a market is worth tracking
/// (§4.8: "pluggable market filter — volume/liquidity floor, category
/// whitelist, tag blacklist, banned question words").
pub type MarketFilter = Arc<dyn Fn(&RawMarket) -> bool + Send + Sync>;

/// A conservative default filter: floors on volume/liquidity, a tag
/// blacklist, and a banned-word scan over the question text. Upstream
/// markets rarely carry a dedicated "category" field; this treats a
/// market's own tags as its category for whitelist purposes.
pub fn default_filter(
    min_volume: f64,
    min_liquidity: f64,
    category_whitelist: Option<Vec<String>>,
    tag_blacklist: Vec<String>,
    banned_words: Vec<String>,
) -> MarketFilter {
    Arc::new(move |m: &RawMarket| {
        if m.volume < min_volume || m.liquidity < min_liquidity {
            return false;
        }
        if m.tags.iter().any(|t| tag_blacklist.contains(t)) {
            return false;
        }
        if let Some(whitelist) = &category_whitelist {
            if !m.tags.iter().any(|t| whitelist.contains(t)) {
                return false;
            }
        }
        let question = m.question.to_lowercase();
        if banned_words.iter().any(|w| question.contains(&w.to_lowercase())) {
            return false;
        }
        true
    })
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorParams {
    /// Upstream page size for `MarketsFeed::list_markets` (§6).
    pub page_size: usize,
    /// Safety cap on total markets inspected per sweep (§6: 5000).
    pub max_markets: usize,
    /// Markets ending further out than this are not yet tracked.
    pub tracked_horizon_ms: i64,
    /// Grace period past a market's end time before its tokens are dropped
    /// from the tracked set.
    pub cleanup_grace_ms: i64,
}

impl Default for CollectorParams {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_markets: 5000,
            tracked_horizon_ms: 24 * 3_600_000,
            cleanup_grace_ms: 5 * 60_000,
        }
    }
}

/// Emitted by the Collector for the feature-build consumer loop to pick up
/// (§4.8 "enqueue onto the features queue"); `main.rs` owns the receiver.
#[derive(Debug, Clone)]
pub enum FeatureEvent {
    Orderbook {
        token_id: TokenId,
        condition_id: ConditionId,
    },
    Trade {
        token_id: TokenId,
        condition_id: ConditionId,
        trade_id: String,
    },
}

pub struct Collector {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    staleness: Arc<StalenessTracker>,
    markets_feed: Arc<dyn MarketsFeed>,
    orderbook_feed: Arc<dyn OrderbookFeed>,
    trade_feed: Arc<dyn TradeFeed>,
    wallet_enricher: Arc<WalletEnricher>,
    tape: Option<Arc<TradeTape>>,
    filter: MarketFilter,
    params: CollectorParams,
    events_tx: mpsc::UnboundedSender<FeatureEvent>,
}

impl Collector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        staleness: Arc<StalenessTracker>,
        markets_feed: Arc<dyn MarketsFeed>,
        orderbook_feed: Arc<dyn OrderbookFeed>,
        trade_feed: Arc<dyn TradeFeed>,
        wallet_enricher: Arc<WalletEnricher>,
        tape: Option<Arc<TradeTape>>,
        filter: MarketFilter,
        params: CollectorParams,
        events_tx: mpsc::UnboundedSender<FeatureEvent>,
    ) -> Self {
        Self {
            store,
            clock,
            staleness,
            markets_feed,
            orderbook_feed,
            trade_feed,
            wallet_enricher,
            tape,
            filter,
            params,
            events_tx,
        }
    }

    /// Every tracked token's tokenId/conditionId/outcome/endTime, read from
    /// `config:tracked_tokens` (§4.8). The scheduler enumerates this set to
    /// dispatch orderbook/trade jobs.
    pub fn tracked_tokens(&self) -> Vec<TrackedToken> {
        self.store
            .smembers(TRACKED_TOKENS_KEY)
            .into_iter()
            .filter_map(|member| serde_json::from_str(&member).ok())
            .collect()
    }

    /// Paginates `MarketsFeed` up to the safety cap, ingesting each
    /// qualifying market and then pruning tracked tokens whose market ended
    /// more than `cleanup_grace_ms` ago (§4.8).
    pub async fn run_market_metadata_job(&self) -> anyhow::Result<()> {
        let now_ms = self.clock.now_ms();
        let mut offset = 0usize;
        let mut inspected = 0usize;

        loop {
            let page = self
                .markets_feed
                .list_markets(offset, self.params.page_size)
                .await
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            if page.is_empty() {
                break;
            }

            for raw in &page {
                if inspected >= self.params.max_markets {
                    break;
                }
                inspected += 1;
                self.ingest_market(raw, now_ms);
            }

            if page.len() < self.params.page_size || inspected >= self.params.max_markets {
                break;
            }
            offset += self.params.page_size;
        }

        self.cleanup_tracked_tokens(now_ms);
        Ok(())
    }

    fn ingest_market(&self, raw: &RawMarket, now_ms: i64) {
        if !raw.active || raw.closed || raw.archived {
            return;
        }
        if raw.clob_token_ids.len() != 2 || raw.outcomes.len() != 2 {
            warn!(condition_id = %raw.condition_id, "dropping market without exactly two outcomes");
            return;
        }

        let end_time_ms = match chrono::DateTime::parse_from_rfc3339(&raw.end_date_iso) {
            Ok(dt) => dt.timestamp_millis(),
            Err(_) => {
                warn!(condition_id = %raw.condition_id, end_date = %raw.end_date_iso, "dropping market with unparseable end date");
                return;
            }
        };
        if end_time_ms <= now_ms {
            return;
        }
        if end_time_ms - now_ms > self.params.tracked_horizon_ms {
            return;
        }
        if !(self.filter)(raw) {
            return;
        }

        let outcomes = [
            Outcome {
                name: raw.outcomes[0].clone(),
                token_id: raw.clob_token_ids[0].clone(),
            },
            Outcome {
                name: raw.outcomes[1].clone(),
                token_id: raw.clob_token_ids[1].clone(),
            },
        ];
        let metadata = MarketMetadata {
            condition_id: raw.condition_id.clone(),
            question: raw.question.clone(),
            end_date_iso: raw.end_date_iso.clone(),
            active: raw.active,
            closed: raw.closed,
            resolved: false,
            volume: raw.volume,
            liquidity: raw.liquidity,
            outcomes,
            tags: raw.tags.clone(),
            category: raw.tags.first().cloned(),
        };
        if !metadata.has_distinct_outcomes() {
            warn!(condition_id = %raw.condition_id, "dropping market with duplicate outcome token ids");
            return;
        }

        let Ok(payload) = serde_json::to_string(&metadata) else {
            return;
        };
        self.store.set_string(
            &format!("market:{}:metadata", metadata.condition_id),
            payload,
            METADATA_TTL_MS,
        );
        self.staleness.record(DataKind::Market, &metadata.condition_id);

        for outcome in &metadata.outcomes {
            self.store.set_string(
                &format!("token:{}:condition", outcome.token_id),
                metadata.condition_id.clone(),
                METADATA_TTL_MS,
            );
            let tracked = TrackedToken {
                token_id: outcome.token_id.clone(),
                condition_id: metadata.condition_id.clone(),
                outcome: outcome.name.clone(),
                end_time_ms,
            };
            if let Ok(json) = serde_json::to_string(&tracked) {
                self.store.sadd(TRACKED_TOKENS_KEY, json, METADATA_TTL_MS);
            }
        }
    }

    fn cleanup_tracked_tokens(&self, now_ms: i64) {
        for member in self.store.smembers(TRACKED_TOKENS_KEY) {
            match serde_json::from_str::<TrackedToken>(&member) {
                Ok(tracked) if tracked.end_time_ms + self.params.cleanup_grace_ms < now_ms => {
                    self.store.srem(TRACKED_TOKENS_KEY, &member);
                }
                Ok(_) => {}
                Err(_) => self.store.srem(TRACKED_TOKENS_KEY, &member),
            }
        }
    }

    /// Fetches, normalizes, and caches a token's current book; appends it to
    /// the rolling 60-minute book window; marks the token fresh (§4.8).
    pub async fn run_orderbook_snapshot_job(&self, token: &TrackedToken) -> anyhow::Result<()> {
        let raw = self
            .orderbook_feed
            .fetch_orderbook(&token.token_id)
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        let now_ms = self.clock.now_ms();

        let bids: Vec<Level> = raw.bids.iter().filter_map(|l| l.parsed()).collect();
        let asks: Vec<Level> = raw.asks.iter().filter_map(|l| l.parsed()).collect();
        let snapshot = OrderbookSnapshot::normalize(token.token_id.clone(), now_ms, bids, asks);

        if let Ok(payload) = serde_json::to_string(&snapshot) {
            self.store.set_string(
                &format!("orderbook:{}:state", token.token_id),
                payload,
                ORDERBOOK_STATE_TTL_MS,
            );
        }

        if let Some(metrics) = OrderbookMetrics::compute(&snapshot) {
            windows::append_book(
                self.store.as_ref(),
                &token.token_id,
                &BookWindowEntry { snapshot, metrics },
            );
        }

        self.staleness.record(DataKind::Orderbook, &token.token_id);
        let _ = self.events_tx.send(FeatureEvent::Orderbook {
            token_id: token.token_id.clone(),
            condition_id: token.condition_id.clone(),
        });
        Ok(())
    }

    /// Polls new trades since the last cursor, appends each to the rolling
    /// window, enriches any wallet seen for the first time on this token,
    /// optionally persists to the trade tape, and emits one feature event per
    /// new trade (§4.8, §4.9).
    pub async fn run_trade_poll_job(&self, token: &TrackedToken) -> anyhow::Result<()> {
        let since_key = format!("trades:{}:since", token.token_id);
        let since_sec = self
            .store
            .get_string(&since_key)
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        let raw_trades = self
            .trade_feed
            .fetch_trades(&token.token_id)
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;

        let mut max_seen_sec = since_sec;
        let mut latest_new_ts_ms: Option<i64> = None;

        for raw in &raw_trades {
            if raw.timestamp <= since_sec {
                continue;
            }
            max_seen_sec = max_seen_sec.max(raw.timestamp);

            let trade = match Trade::from_raw(raw) {
                Ok(t) => t,
                Err(err) => {
                    warn!(token_id = %token.token_id, error = %err, "dropping malformed trade");
                    continue;
                }
            };

            if !windows::append_trade(self.store.as_ref(), &token.token_id, &trade) {
                continue;
            }
            latest_new_ts_ms = Some(latest_new_ts_ms.map_or(trade.timestamp_ms, |t| t.max(trade.timestamp_ms)));

            let now_ms = self.clock.now_ms();
            let newly_seen = windows::observe_wallet(&self.store, &token.token_id, trade.taker_address.as_str());
            if newly_seen {
                let _ = self.wallet_enricher.enrich(&trade.taker_address, now_ms).await;
            }
            self.wallet_enricher.record_trade(
                &trade.taker_address,
                &token.condition_id,
                trade.price * trade.size,
                now_ms,
            );

            if let Some(tape) = &self.tape {
                if let Err(err) = tape.record(&trade) {
                    warn!(error = %err, "failed to persist trade to tape");
                }
            }

            let _ = self.events_tx.send(FeatureEvent::Trade {
                token_id: token.token_id.clone(),
                condition_id: token.condition_id.clone(),
                trade_id: trade.trade_id.clone(),
            });
        }

        if max_seen_sec > since_sec {
            self.store
                .set_string(&since_key, max_seen_sec.to_string(), SINCE_CURSOR_TTL_MS);
        }
        if let Some(ts_ms) = latest_new_ts_ms {
            self.staleness.record_at(DataKind::Trade, &token.token_id, ts_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::{FakeMarketsFeed, FakeOrderbookFeed, FakeTradeFeed};
    use crate::adapters::fakes::FakeBlockExplorer;
    use crate::adapters::{RawLevel, RawOrderbook};
    use crate::clock::FakeClock;
    use crate::models::RawTrade;
    use crate::store::InMemoryStore;

    fn market(condition_id: &str, end_date_iso: &str, volume: f64) -> RawMarket {
        RawMarket {
            condition_id: condition_id.to_string(),
            question: "Will X happen?".to_string(),
            end_date_iso: end_date_iso.to_string(),
            active: true,
            closed: false,
            archived: false,
            volume,
            liquidity: 1000.0,
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: vec!["0.5".to_string(), "0.5".to_string()],
            clob_token_ids: vec![format!("{condition_id}-yes"), format!("{condition_id}-no")],
            neg_risk: false,
            tags: vec!["politics".to_string()],
        }
    }

    struct Harness {
        collector: Collector,
        events: mpsc::UnboundedReceiver<FeatureEvent>,
        store: Arc<dyn Store>,
        markets: Arc<FakeMarketsFeed>,
        orderbooks: Arc<FakeOrderbookFeed>,
        trades: Arc<FakeTradeFeed>,
    }

    fn harness(now_ms: i64) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(now_ms));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(clock.clone()));
        let staleness = Arc::new(StalenessTracker::new(clock.clone()));
        let markets = Arc::new(FakeMarketsFeed::default());
        let orderbooks = Arc::new(FakeOrderbookFeed::default());
        let trades = Arc::new(FakeTradeFeed::default());
        let explorer = Arc::new(FakeBlockExplorer::default());
        let wallet_enricher = Arc::new(WalletEnricher::new(store.clone(), explorer));
        let filter = default_filter(0.0, 0.0, None, vec![], vec![]);
        let (tx, rx) = mpsc::unbounded_channel();

        let collector = Collector::new(
            store.clone(),
            clock,
            staleness,
            markets.clone(),
            orderbooks.clone(),
            trades.clone(),
            wallet_enricher,
            None,
            filter,
            CollectorParams::default(),
            tx,
        );
        Harness {
            collector,
            events: rx,
            store,
            markets,
            orderbooks,
            trades,
        }
    }

    #[tokio::test]
    async fn market_job_tracks_active_market_within_horizon() {
        let h = harness(0);
        h.markets.pages.lock().push(vec![market("cond1", "1970-01-01T01:00:00Z", 5000.0)]);

        h.collector.run_market_metadata_job().await.unwrap();

        let tracked = h.collector.tracked_tokens();
        assert_eq!(tracked.len(), 2);
        assert!(h.store.get_string("market:cond1:metadata").is_some());
        assert_eq!(h.store.get_string("token:cond1-yes:condition"), Some("cond1".to_string()));
    }

    #[tokio::test]
    async fn market_job_skips_closed_and_out_of_horizon_markets() {
        let h = harness(0);
        let mut closed = market("cond2", "1970-01-01T01:00:00Z", 5000.0);
        closed.closed = true;
        let far_out = market("cond3", "2099-01-01T00:00:00Z", 5000.0);
        h.markets.pages.lock().push(vec![closed, far_out]);

        h.collector.run_market_metadata_job().await.unwrap();
        assert!(h.collector.tracked_tokens().is_empty());
    }

    #[tokio::test]
    async fn market_job_prunes_tokens_past_grace_period() {
        let h = harness(0);
        h.markets.pages.lock().push(vec![market("cond4", "1970-01-01T00:01:00Z", 5000.0)]);
        h.collector.run_market_metadata_job().await.unwrap();
        assert_eq!(h.collector.tracked_tokens().len(), 2);

        // Advance past end_time + grace via a fresh clock-backed harness run:
        // simulate by directly invoking cleanup with a later "now".
        h.collector.cleanup_tracked_tokens(60_000 + CollectorParams::default().cleanup_grace_ms + 1);
        assert!(h.collector.tracked_tokens().is_empty());
    }

    #[tokio::test]
    async fn orderbook_job_normalizes_caches_and_marks_fresh() {
        let mut h = harness(0);
        let token = TrackedToken {
            token_id: "tok".to_string(),
            condition_id: "cond".to_string(),
            outcome: "Yes".to_string(),
            end_time_ms: 1_000_000,
        };
        h.orderbooks.books.lock().insert(
            "tok".to_string(),
            RawOrderbook {
                market: None,
                asset_id: "tok".to_string(),
                bids: vec![RawLevel { price: "0.40".into(), size: "100".into() }],
                asks: vec![RawLevel { price: "0.42".into(), size: "100".into() }],
                hash: None,
                timestamp: None,
            },
        );

        h.collector.run_orderbook_snapshot_job(&token).await.unwrap();

        assert!(h.store.get_string("orderbook:tok:state").is_some());
        assert!(matches!(h.events.try_recv(), Ok(FeatureEvent::Orderbook { .. })));
    }

    #[tokio::test]
    async fn trade_job_dedupes_by_since_cursor_and_enriches_new_wallets() {
        let mut h = harness(10_000);
        let token = TrackedToken {
            token_id: "tok".to_string(),
            condition_id: "cond".to_string(),
            outcome: "Yes".to_string(),
            end_time_ms: 1_000_000,
        };
        h.trades.trades.lock().insert(
            "tok".to_string(),
            vec![RawTrade {
                proxy_wallet: "0xabc".to_string(),
                side: "BUY".to_string(),
                asset: "tok".to_string(),
                condition_id: "cond".to_string(),
                size: 50.0,
                price: 0.4,
                timestamp: 5,
                transaction_hash: None,
            }],
        );

        h.collector.run_trade_poll_job(&token).await.unwrap();
        assert!(matches!(h.events.try_recv(), Ok(FeatureEvent::Trade { .. })));
        assert_eq!(h.store.get_string("trades:tok:since"), Some("5".to_string()));

        // Polling again with the same (already-seen) trade emits nothing new.
        h.collector.run_trade_poll_job(&token).await.unwrap();
        assert!(h.events.try_recv().is_err());
    }
}
