//! End-to-end scenarios for the Decision Service: a feature vector goes in,
//! an approved/rejected decision comes out, exercising the full
//! freshness -> score gates -> direction -> sizing -> risk pipeline through
//! the public API rather than any single module in isolation.

use std::sync::Arc;

use sentinel_engine::clock::{Clock, FakeClock, StalenessTracker};
use sentinel_engine::config::Config;
use sentinel_engine::decision::{DecisionService, PortfolioState};
use sentinel_engine::features::{ramp_multiplier, FeatureVector, OrderbookFeature, TradeSizeFeature, WalletFeature};
use sentinel_engine::models::{DecisionAction, MarketSide};
use sentinel_engine::paper::PaperQueue;
use sentinel_engine::store::InMemoryStore;

fn service() -> DecisionService {
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let staleness = Arc::new(StalenessTracker::new(clock.clone()));
    let config = Config::from_env().expect("env-free defaults always parse");
    DecisionService::new(clock, store, staleness, Arc::new(PaperQueue::new()), config)
}

fn calm_features() -> FeatureVector {
    FeatureVector {
        token_id: "calm-token".into(),
        condition_id: "calm-cond".into(),
        timestamp_ms: 0,
        time_to_close_secs: 7200,
        ramp_multiplier: ramp_multiplier(2.0),
        in_no_trade_zone: false,
        trade_size: Some(TradeSizeFeature {
            size_usd: 100.0,
            robust_z: 0.1,
            percentile: 0.1,
            size_tail_score: 0.0,
        }),
        orderbook: Some(OrderbookFeature {
            bid_depth_10pct: 5000.0,
            ask_depth_10pct: 5000.0,
            imbalance_abs: 0.0,
            book_imbalance_score: 0.0,
            thin_opposite_score: 1.0,
            spread_bps: 50.0,
            mid_price: 0.50,
            imbalance_signed: 0.0,
            best_bid: 0.4975,
            best_ask: 0.5025,
        }),
        wallet: None,
        impact: None,
        burst_score: 0.0,
        change_point_detected: false,
        data_complete: true,
        data_stale: false,
    }
}

/// Insider-pattern shape: an oversized trade from a brand-new, thin-history
/// wallet against a one-sided, thin-opposite book shortly before close.
fn insider_pattern_features() -> FeatureVector {
    FeatureVector {
        token_id: "insider-token".into(),
        condition_id: "insider-cond".into(),
        timestamp_ms: 0,
        time_to_close_secs: 7200,
        ramp_multiplier: ramp_multiplier(2.0),
        in_no_trade_zone: false,
        trade_size: Some(TradeSizeFeature {
            size_usd: 50_000.0,
            robust_z: 10.0,
            percentile: 1.0,
            size_tail_score: 1.0,
        }),
        orderbook: Some(OrderbookFeature {
            bid_depth_10pct: 2000.0,
            ask_depth_10pct: 500.0,
            imbalance_abs: 0.6,
            book_imbalance_score: 0.9,
            thin_opposite_score: 0.8,
            spread_bps: 150.0,
            mid_price: 0.55,
            imbalance_signed: 0.6,
            best_bid: 0.54,
            best_ask: 0.56,
        }),
        wallet: Some(WalletFeature {
            age_days: Some(2.0),
            wallet_new_score: 1.0,
            wallet_activity_score: 0.9,
        }),
        impact: None,
        burst_score: 0.8,
        change_point_detected: true,
        data_complete: true,
        data_stale: false,
    }
}

#[test]
fn calm_market_falls_below_the_anomaly_threshold() {
    let svc = service();
    let decision = svc.decide(calm_features(), &PortfolioState::default());

    assert!(!decision.approved);
    assert_eq!(decision.rejection_reason.as_deref(), Some("below_anomaly_threshold"));
    assert!(!decision.scores.anomaly.triggered);
}

#[test]
fn triple_signal_insider_pattern_triggers_a_buy_yes() {
    let svc = service();
    let decision = svc.decide(insider_pattern_features(), &PortfolioState::default());

    assert!(decision.approved);
    assert!(decision.scores.anomaly.triggered);
    assert!(decision.scores.anomaly.triple_signal);
    assert_eq!(decision.action, DecisionAction::Buy);
    assert_eq!(decision.side, Some(MarketSide::Yes));
    assert!(decision.sizing.is_some());
}

#[test]
fn stale_book_data_rejects_before_any_scoring_gate() {
    let svc = service();
    let mut features = insider_pattern_features();
    features.data_stale = true;

    let decision = svc.decide(features, &PortfolioState::default());

    assert!(!decision.approved);
    assert_eq!(decision.rejection_reason.as_deref(), Some("stale_book_data"));
}

#[test]
fn exposure_already_in_use_caps_the_approved_size_at_one_hundred() {
    let svc = service();
    let portfolio = PortfolioState {
        bankroll: 10_000.0,
        total_exposure_usd: 900.0, // leaves only $100 of the 10% exposure cap
        existing_position_usd: 0.0,
        daily_pnl_usd: 0.0,
        drawdown_fraction: 0.0,
        consecutive_losses: 0,
    };

    let decision = svc.decide(insider_pattern_features(), &portfolio);

    assert!(decision.approved);
    assert_eq!(decision.target_size_usd, Some(100.0));
}

#[test]
fn position_already_at_its_limit_rejects_with_position_limit_exceeded() {
    let svc = service();
    let portfolio = PortfolioState {
        bankroll: 10_000.0,
        total_exposure_usd: 0.0,
        existing_position_usd: 500.0, // already at the 5% position cap
        daily_pnl_usd: 0.0,
        drawdown_fraction: 0.0,
        consecutive_losses: 0,
    };

    let decision = svc.decide(insider_pattern_features(), &portfolio);

    assert!(!decision.approved);
    assert_eq!(decision.rejection_reason.as_deref(), Some("position_limit_exceeded"));
}

#[test]
fn inside_the_no_trade_zone_rejects_even_a_strong_signal() {
    let svc = service();
    let mut features = insider_pattern_features();
    features.time_to_close_secs = 60; // inside the 120s no-trade zone

    let decision = svc.decide(features, &PortfolioState::default());

    assert!(!decision.approved);
    assert_eq!(decision.rejection_reason.as_deref(), Some("no_trade_zone"));
    // direction and sizing still resolve; only the risk gate rejects.
    assert_eq!(decision.side, Some(MarketSide::Yes));
}
