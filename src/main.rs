//! Sentinel: real-time anomaly-detection and decision pipeline for a binary
//! prediction-market venue.
//!
//! Wires the Collector, Wallet Enricher, Feature Builder, Scorer, Sizer,
//! Risk Guards, and Decision Service onto the Queue Runtime and a periodic
//! scheduler. Concrete venue HTTP/WebSocket clients are out of scope (§1);
//! this binary runs against the in-memory adapter fakes by default so it
//! builds and starts without network access — a real deployment swaps those
//! out for adapters implementing the same traits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_engine::adapters::fakes::{FakeBlockExplorer, FakeMarketsFeed, FakeOrderbookFeed, FakeTradeFeed};
use sentinel_engine::clock::{Clock, StalenessTracker, SystemClock};
use sentinel_engine::collector::{Collector, CollectorParams, FeatureEvent};
use sentinel_engine::config::Config;
use sentinel_engine::decision::{DecisionService, PortfolioState};
use sentinel_engine::estimator_state;
use sentinel_engine::features::{FeatureBuilder, FeatureBuilderInputs, FeatureVector};
use sentinel_engine::models::{OrderbookMetrics, OrderbookSnapshot, Trade};
use sentinel_engine::paper::PaperQueue;
use sentinel_engine::queue::{self, QueueParams, QueueRegistry};
use sentinel_engine::store::{InMemoryStore, Store};
use sentinel_engine::tape::TradeTape;
use sentinel_engine::wallet::WalletEnricher;
use sentinel_engine::windows;

/// Command-line overrides layered on top of the environment (§10.1). Every
/// field stays optional/off-by-default so running with no flags reproduces
/// the pure-env-var behavior `Config::from_env` has always had.
#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(about = "Real-time anomaly-detection and decision pipeline for a binary prediction-market venue")]
struct Args {
    /// Force paper-trading mode on, regardless of PAPER_MODE.
    #[arg(long)]
    paper_mode: bool,

    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Override the tracing filter (e.g. "debug", "sentinel_engine=trace").
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Per-token mutable estimator state live in the running process; their
/// serialized form round-trips through the `Store` between accesses so the
/// Feature Builder's borrow-checked `&mut CusumState` API is satisfied
/// without holding a process-wide lock across an `.await`.
fn build_features_for_trade(
    builder: &FeatureBuilder,
    store: &dyn Store,
    token_id: &str,
    condition_id: &str,
    close_time_ms: i64,
    trade: &Trade,
    snapshot: Option<&OrderbookSnapshot>,
    metrics: Option<&OrderbookMetrics>,
) -> FeatureVector {
    let now_ms = trade.timestamp_ms;
    let window_sizes = windows::trade_sizes_usd(store, token_id, now_ms);
    estimator_state::save_rolling_stats(store, token_id, &window_sizes);
    let mut digest = estimator_state::load_digest(store, token_id);
    digest.insert(trade.price * trade.size);
    let p99 = digest.quantile(0.99);
    estimator_state::save_digest(store, token_id, &digest);

    let wallet_key = format!("wallet:{}:enriched", trade.taker_address.as_str());
    let wallet_profile = store
        .hash_get(&wallet_key, "profile")
        .and_then(|json| serde_json::from_str(&json).ok());

    let mut hawkes = estimator_state::load_hawkes(store, token_id);
    hawkes.record_event(now_ms);
    let mut cusum_size = estimator_state::load_cusum_size(store, token_id);
    let mut cusum_spread = estimator_state::load_cusum_spread(store, token_id);
    let book_mids = windows::book_window_mids(store, token_id, now_ms);

    let inputs = FeatureBuilderInputs {
        token_id,
        condition_id,
        timestamp_ms: now_ms,
        close_time_ms,
        snapshot,
        metrics,
        trade: Some(trade),
        window_sizes_usd: &window_sizes,
        digest_p99: p99,
        wallet: wallet_profile.as_ref(),
        book_window_mids: &book_mids,
        hawkes: &hawkes,
        cusum_size: &mut cusum_size,
        cusum_spread: &mut cusum_spread,
    };
    let features = builder.build(inputs);

    estimator_state::save_hawkes(store, token_id, &hawkes);
    estimator_state::save_cusum_size(store, token_id, &cusum_size);
    estimator_state::save_cusum_spread(store, token_id, &cusum_spread);
    features
}

fn build_features_for_orderbook(
    builder: &FeatureBuilder,
    store: &dyn Store,
    token_id: &str,
    condition_id: &str,
    close_time_ms: i64,
    now_ms: i64,
    snapshot: Option<&OrderbookSnapshot>,
    metrics: Option<&OrderbookMetrics>,
) -> FeatureVector {
    let mut hawkes = estimator_state::load_hawkes(store, token_id);
    let mut cusum_size = estimator_state::load_cusum_size(store, token_id);
    let mut cusum_spread = estimator_state::load_cusum_spread(store, token_id);
    let window_sizes = windows::trade_sizes_usd(store, token_id, now_ms);
    estimator_state::save_rolling_stats(store, token_id, &window_sizes);
    let digest = estimator_state::load_digest(store, token_id);

    let inputs = FeatureBuilderInputs {
        token_id,
        condition_id,
        timestamp_ms: now_ms,
        close_time_ms,
        snapshot,
        metrics,
        trade: None,
        window_sizes_usd: &window_sizes,
        digest_p99: digest.quantile(0.99),
        wallet: None,
        book_window_mids: &[],
        hawkes: &hawkes,
        cusum_size: &mut cusum_size,
        cusum_spread: &mut cusum_spread,
    };
    let features = builder.build(inputs);

    estimator_state::save_hawkes(store, token_id, &hawkes);
    estimator_state::save_cusum_size(store, token_id, &cusum_size);
    estimator_state::save_cusum_spread(store, token_id, &cusum_spread);
    features
}

fn load_orderbook_state(store: &dyn Store, token_id: &str) -> Option<(OrderbookSnapshot, Option<OrderbookMetrics>)> {
    let snapshot: OrderbookSnapshot =
        serde_json::from_str(&store.get_string(&format!("orderbook:{token_id}:state"))?).ok()?;
    let metrics = OrderbookMetrics::compute(&snapshot);
    Some((snapshot, metrics))
}

fn load_close_time_ms(store: &dyn Store, condition_id: &str) -> i64 {
    store
        .get_string(&format!("market:{condition_id}:metadata"))
        .and_then(|json| serde_json::from_str::<sentinel_engine::models::MarketMetadata>(&json).ok())
        .and_then(|m| chrono::DateTime::parse_from_rfc3339(&m.end_date_iso).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(i64::MAX)
}

/// Consumes `FeatureEvent`s off the Collector, builds a feature vector, and
/// runs it through the Decision Service (§4.3, §4.7). One decision per event;
/// the Decision Service's own 60s cache absorbs repeats within a token.
async fn run_feature_consumer(
    mut events: mpsc::UnboundedReceiver<FeatureEvent>,
    store: Arc<dyn Store>,
    staleness: Arc<StalenessTracker>,
    clock: Arc<dyn Clock>,
    decision_service: Arc<DecisionService>,
    portfolio: Arc<Mutex<PortfolioState>>,
) {
    let builder = FeatureBuilder::new(clock.clone(), staleness);
    while let Some(event) = events.recv().await {
        let (token_id, condition_id) = match &event {
            FeatureEvent::Orderbook { token_id, condition_id } => (token_id.clone(), condition_id.clone()),
            FeatureEvent::Trade { token_id, condition_id, .. } => (token_id.clone(), condition_id.clone()),
        };
        let close_time_ms = load_close_time_ms(store.as_ref(), &condition_id);
        let (snapshot, metrics) = load_orderbook_state(store.as_ref(), &token_id)
            .map(|(s, m)| (Some(s), m))
            .unwrap_or((None, None));

        let features = match &event {
            FeatureEvent::Trade { .. } => {
                let trades = windows::load_trades(store.as_ref(), &token_id, clock.now_ms());
                match trades.last() {
                    Some(trade) => build_features_for_trade(
                        &builder,
                        store.as_ref(),
                        &token_id,
                        &condition_id,
                        close_time_ms,
                        trade,
                        snapshot.as_ref(),
                        metrics.as_ref(),
                    ),
                    None => continue,
                }
            }
            FeatureEvent::Orderbook { .. } => build_features_for_orderbook(
                &builder,
                store.as_ref(),
                &token_id,
                &condition_id,
                close_time_ms,
                clock.now_ms(),
                snapshot.as_ref(),
                metrics.as_ref(),
            ),
        };

        let decision = {
            let portfolio = portfolio.lock();
            decision_service.decide(features, &portfolio)
        };
        if decision.approved {
            info!(
                token_id = %decision.token_id,
                action = ?decision.action,
                size_usd = decision.target_size_usd,
                "decision approved"
            );
        }
    }
}

/// Periodically sweeps `MarketsFeed` for markets to track (§4.8).
async fn run_market_metadata_scheduler(collector: Arc<Collector>, queues: Arc<QueueRegistry>, clock: Arc<dyn Clock>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        let queue = queues.get("normalize");
        let collector = collector.clone();
        let job_id = queue::job_id("market-metadata", "all", clock.now_ms());
        queue
            .run(job_id, move || {
                let collector = collector.clone();
                Box::pin(async move { collector.run_market_metadata_job().await })
            })
            .await;
    }
}

/// Periodically snapshots the orderbook for every currently tracked token
/// (§4.8).
async fn run_orderbook_scheduler(collector: Arc<Collector>, queues: Arc<QueueRegistry>, clock: Arc<dyn Clock>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        for token in collector.tracked_tokens() {
            let queue = queues.get("normalize");
            let collector = collector.clone();
            let job_id = queue::job_id("orderbook", &token.token_id, clock.now_ms());
            let token_clone = token.clone();
            queue
                .run(job_id, move || {
                    let collector = collector.clone();
                    let token = token_clone.clone();
                    Box::pin(async move { collector.run_orderbook_snapshot_job(&token).await })
                })
                .await;
        }
    }
}

/// Periodically polls for new trades on every currently tracked token
/// (§4.8).
async fn run_trade_poll_scheduler(collector: Arc<Collector>, queues: Arc<QueueRegistry>, clock: Arc<dyn Clock>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        for token in collector.tracked_tokens() {
            let queue = queues.get("normalize");
            let collector = collector.clone();
            let job_id = queue::job_id("trade-poll", &token.token_id, clock.now_ms());
            let token_clone = token.clone();
            queue
                .run(job_id, move || {
                    let collector = collector.clone();
                    let token = token_clone.clone();
                    Box::pin(async move { collector.run_trade_poll_job(&token).await })
                })
                .await;
        }
    }
}

/// Logs a one-line operational summary every 30s (§4.10).
async fn run_summary_logger(queues: Arc<QueueRegistry>, paper_queue: Arc<PaperQueue>, collector: Arc<Collector>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        let tracked = collector.tracked_tokens().len();
        let completed: usize = queue::QUEUE_NAMES.iter().copied().map(|n| queues.get(n).completed_count()).sum();
        let failed: usize = queue::QUEUE_NAMES.iter().copied().map(|n| queues.get(n).failed_count()).sum();
        info!(
            tracked_tokens = tracked,
            jobs_completed = completed,
            jobs_failed = failed,
            decisions_recorded = paper_queue.len(),
            "sentinel tick"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.config {
        dotenv::from_path(path).ok();
    }

    let mut config = Config::from_env()?;
    if args.paper_mode {
        config.paper_mode = true;
    }
    if let Some(level) = args.log_level {
        config.log_filter = level;
    }
    init_tracing(&config.log_filter);

    info!("starting sentinel engine");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(clock.clone()));
    let staleness = Arc::new(StalenessTracker::new(clock.clone()));

    let queue_params = QueueParams {
        concurrency: config.queue_default_concurrency,
        rate_per_sec: config.queue_default_rate_per_sec,
        max_attempts: config.queue_max_attempts,
        keep_on_complete: 200,
        keep_on_fail: 100,
    };
    let queues = Arc::new(QueueRegistry::new(clock.clone(), queue_params));

    // No concrete venue client ships with this crate (§1); these fakes sit
    // idle until seeded, but give the binary something real to run against
    // for local smoke-testing the full pipeline end to end.
    let markets_feed = Arc::new(FakeMarketsFeed::default());
    let orderbook_feed = Arc::new(FakeOrderbookFeed::default());
    let trade_feed = Arc::new(FakeTradeFeed::default());
    let block_explorer = Arc::new(FakeBlockExplorer::default());

    let wallet_enricher = Arc::new(WalletEnricher::new(store.clone(), block_explorer));
    let tape = match TradeTape::open(&config.database_path) {
        Ok(tape) => Some(Arc::new(tape)),
        Err(err) => {
            warn!(error = %err, path = %config.database_path, "trade tape unavailable, continuing without persistence");
            None
        }
    };

    let filter = sentinel_engine::collector::default_filter(
        1000.0,
        500.0,
        None,
        vec!["spam".to_string(), "test".to_string()],
        vec![],
    );
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let collector = Arc::new(Collector::new(
        store.clone(),
        clock.clone(),
        staleness.clone(),
        markets_feed,
        orderbook_feed,
        trade_feed,
        wallet_enricher,
        tape,
        filter,
        CollectorParams {
            tracked_horizon_ms: (config.tracked_horizon_hours as i64) * 3_600_000,
            ..CollectorParams::default()
        },
        events_tx,
    ));

    let paper_queue = Arc::new(PaperQueue::new());
    let decision_service = Arc::new(DecisionService::new(
        clock.clone(),
        store.clone(),
        staleness.clone(),
        paper_queue.clone(),
        config.clone(),
    ));
    let portfolio = Arc::new(Mutex::new(PortfolioState {
        bankroll: config.paper_initial_bankroll_usd,
        ..PortfolioState::default()
    }));

    let feature_consumer = tokio::spawn(run_feature_consumer(
        events_rx,
        store.clone(),
        staleness.clone(),
        clock.clone(),
        decision_service.clone(),
        portfolio.clone(),
    ));

    let market_scheduler = tokio::spawn(run_market_metadata_scheduler(
        collector.clone(),
        queues.clone(),
        clock.clone(),
        config.market_metadata_interval_secs,
    ));
    let orderbook_scheduler = tokio::spawn(run_orderbook_scheduler(
        collector.clone(),
        queues.clone(),
        clock.clone(),
        config.orderbook_snapshot_interval_secs,
    ));
    let trade_scheduler = tokio::spawn(run_trade_poll_scheduler(
        collector.clone(),
        queues.clone(),
        clock.clone(),
        config.trade_poll_interval_secs,
    ));
    let summary_logger = tokio::spawn(run_summary_logger(queues.clone(), paper_queue.clone(), collector.clone()));

    tokio::select! {
        _ = feature_consumer => warn!("feature consumer task exited"),
        _ = market_scheduler => warn!("market metadata scheduler exited"),
        _ = orderbook_scheduler => warn!("orderbook scheduler exited"),
        _ = trade_scheduler => warn!("trade poll scheduler exited"),
        _ = summary_logger => warn!("summary logger exited"),
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    Ok(())
}
