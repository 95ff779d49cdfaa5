//! Feature Builder (§4.3): combines the latest book snapshot, the rolling
//! trade window, and wallet enrichment into a per-(token, trigger) feature
//! vector.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, DataKind, StalenessTracker};
use crate::estimators::{cusum::CusumState, hawkes::HawkesState, robust_z_score, RollingStats};
use crate::models::{OrderbookMetrics, OrderbookSnapshot, Trade, WalletProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookFeature {
    pub bid_depth_10pct: f64,
    pub ask_depth_10pct: f64,
    pub imbalance_abs: f64,
    pub book_imbalance_score: f64,
    pub thin_opposite_score: f64,
    pub spread_bps: f64,
    pub mid_price: f64,
    /// Signed imbalance, kept alongside the absolute-value score above
    /// because the Scorer's edge/direction logic needs the sign (§4.4, §9).
    pub imbalance_signed: f64,
    /// Best bid/ask, carried through so the Decision Service can set
    /// `targetPrice` to the actual marketable quote rather than the mid
    /// (§3, §4.7): bestAsk on a YES buy, bestBid on a NO sell.
    pub best_bid: f64,
    pub best_ask: f64,
}

/// `sigmoidLike` per §4.3: maps `[0,1]` absolute imbalance to `[0,1]` with a
/// soft knee, steeper than linear near the extremes.
fn sigmoid_like(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    (2.0 / (1.0 + (-6.0 * x).exp())) - 1.0
}

impl OrderbookFeature {
    pub fn compute(snapshot: &OrderbookSnapshot, metrics: &OrderbookMetrics) -> Option<Self> {
        let mid = snapshot.mid_price?;
        let imbalance_abs = metrics.imbalance.abs();
        Some(OrderbookFeature {
            bid_depth_10pct: metrics.bid_depth_10pct,
            ask_depth_10pct: metrics.ask_depth_10pct,
            imbalance_abs,
            book_imbalance_score: sigmoid_like(imbalance_abs),
            thin_opposite_score: (1.0 - metrics.thin_side_ratio).clamp(0.0, 1.0),
            spread_bps: snapshot.spread_bps.unwrap_or(0.0),
            mid_price: mid,
            imbalance_signed: metrics.imbalance,
            best_bid: snapshot.best_bid.unwrap_or(mid),
            best_ask: snapshot.best_ask.unwrap_or(mid),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSizeFeature {
    pub size_usd: f64,
    pub robust_z: f64,
    pub percentile: f64,
    pub size_tail_score: f64,
}

/// Dollar-floor policy (§4.3): below $5000 the tail score is zeroed;
/// scaled 0.5/0.75/1.0 in the bands above.
fn dollar_floor_scale(size_usd: f64) -> f64 {
    if size_usd < 5000.0 {
        0.0
    } else if size_usd < 10_000.0 {
        0.5
    } else if size_usd < 25_000.0 {
        0.75
    } else {
        1.0
    }
}

impl TradeSizeFeature {
    pub fn compute(trade: &Trade, window_sizes_usd: &[f64], digest_p99: Option<f64>) -> Self {
        let size_usd = trade.price * trade.size;
        let robust_z = robust_z_score(size_usd, window_sizes_usd);
        let tail_from_z = if robust_z.is_infinite() {
            1.0
        } else {
            (robust_z / 4.0).clamp(0.0, 1.0)
        };
        let percentile = digest_p99
            .map(|p99| if p99 > 0.0 { (size_usd / p99).min(1.0) } else { 0.0 })
            .unwrap_or(0.0);
        let raw_tail = tail_from_z.max(percentile);
        TradeSizeFeature {
            size_usd,
            robust_z,
            percentile,
            size_tail_score: raw_tail * dollar_floor_scale(size_usd),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFeature {
    pub age_days: Option<f64>,
    pub wallet_new_score: f64,
    pub wallet_activity_score: f64,
}

impl WalletFeature {
    pub fn compute(profile: &WalletProfile, now_ms: i64) -> Self {
        let age_days = profile.age_days(now_ms);
        let wallet_new_score = match age_days {
            None => 0.5,
            Some(d) if d < 7.0 => 1.0,
            Some(d) if d < 30.0 => 0.7,
            Some(d) if d < 180.0 => 0.3,
            Some(_) => 0.0,
        };

        let trades_gate = (1.0 - profile.trade_count as f64 / 100.0).max(0.0);
        let markets_gate = (1.0 - profile.markets_traded as f64 / 20.0).max(0.0);
        let volume_gate = (1.0 - profile.total_volume / 10_000.0).max(0.0);
        let wallet_activity_score =
            0.4 * trades_gate + 0.3 * markets_gate + 0.3 * volume_gate;

        WalletFeature {
            age_days,
            wallet_new_score,
            wallet_activity_score,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactFeature {
    pub drift_30s: Option<f64>,
    pub drift_60s: Option<f64>,
}

impl ImpactFeature {
    /// Nearest-snapshot-within-1s-of-target sampling (§9 resolved open
    /// question). `book_window` is `(timestamp_ms, mid_price)` pairs.
    pub fn compute(trade_ts_ms: i64, trade_mid: f64, book_window: &[(i64, f64)]) -> Option<Self> {
        let sample_at = |target_ms: i64| -> Option<f64> {
            book_window
                .iter()
                .filter(|(ts, _)| (*ts - target_ms).abs() <= 1000)
                .min_by_key(|(ts, _)| (*ts - target_ms).abs())
                .map(|(_, mid)| *mid)
        };

        let drift_30s = sample_at(trade_ts_ms + 30_000).map(|mid| mid - trade_mid);
        let drift_60s = sample_at(trade_ts_ms + 60_000).map(|mid| mid - trade_mid);

        if drift_30s.is_none() && drift_60s.is_none() {
            None
        } else {
            Some(ImpactFeature { drift_30s, drift_60s })
        }
    }

    pub fn score(&self) -> f64 {
        let drift = self.drift_60s.or(self.drift_30s).unwrap_or(0.0);
        (drift.abs() / 0.05).clamp(0.0, 1.0)
    }

    pub fn direction(&self) -> f64 {
        self.drift_60s.or(self.drift_30s).unwrap_or(0.0).signum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub token_id: String,
    pub condition_id: String,
    pub timestamp_ms: i64,
    pub time_to_close_secs: i64,
    pub ramp_multiplier: f64,
    pub in_no_trade_zone: bool,
    pub trade_size: Option<TradeSizeFeature>,
    pub orderbook: Option<OrderbookFeature>,
    pub wallet: Option<WalletFeature>,
    pub impact: Option<ImpactFeature>,
    pub burst_score: f64,
    pub change_point_detected: bool,
    pub data_complete: bool,
    pub data_stale: bool,
}

/// `rampMultiplier = min(maxMult, 1 + alpha*exp(-beta*ttc_hours))` (§4.3).
pub fn ramp_multiplier(ttc_hours: f64) -> f64 {
    const ALPHA: f64 = 2.0;
    const BETA: f64 = 0.1;
    const MAX_MULT: f64 = 5.0;
    (1.0 + ALPHA * (-BETA * ttc_hours).exp()).min(MAX_MULT)
}

pub struct FeatureBuilderInputs<'a> {
    pub token_id: &'a str,
    pub condition_id: &'a str,
    pub timestamp_ms: i64,
    pub close_time_ms: i64,
    pub snapshot: Option<&'a OrderbookSnapshot>,
    pub metrics: Option<&'a OrderbookMetrics>,
    pub trade: Option<&'a Trade>,
    pub window_sizes_usd: &'a [f64],
    pub digest_p99: Option<f64>,
    pub wallet: Option<&'a WalletProfile>,
    pub book_window_mids: &'a [(i64, f64)],
    pub hawkes: &'a HawkesState,
    pub cusum_size: &'a mut CusumState,
    pub cusum_spread: &'a mut CusumState,
}

/// Builds a full feature vector for a trigger, per the six steps in §4.3.
pub struct FeatureBuilder {
    clock: Arc<dyn Clock>,
    staleness: Arc<StalenessTracker>,
}

impl FeatureBuilder {
    pub fn new(clock: Arc<dyn Clock>, staleness: Arc<StalenessTracker>) -> Self {
        Self { clock, staleness }
    }

    pub fn build(&self, inputs: FeatureBuilderInputs) -> FeatureVector {
        let now = self.clock.now_ms();

        let orderbook = match (inputs.snapshot, inputs.metrics) {
            (Some(s), Some(m)) => OrderbookFeature::compute(s, m),
            _ => None,
        };

        let trade_size = inputs.trade.map(|t| {
            TradeSizeFeature::compute(t, inputs.window_sizes_usd, inputs.digest_p99)
        });

        let wallet = inputs.wallet.map(|w| WalletFeature::compute(w, now));

        let impact = match (inputs.trade, orderbook.as_ref()) {
            (Some(t), Some(ob)) => {
                ImpactFeature::compute(t.timestamp_ms, ob.mid_price, inputs.book_window_mids)
            }
            _ => None,
        };

        let burst_score = inputs.hawkes.burst_score(now);

        let change_point_detected = if let Some(ts) = &trade_size {
            inputs.cusum_size.update(ts.size_usd).detected
        } else if let Some(ob) = &orderbook {
            inputs.cusum_spread.update(ob.spread_bps).detected
        } else {
            false
        };

        let ttc_secs = ((inputs.close_time_ms - inputs.timestamp_ms) / 1000).max(0);
        let ttc_hours = ttc_secs as f64 / 3600.0;
        let ramp = ramp_multiplier(ttc_hours);
        let in_no_trade_zone = ttc_secs > 0 && ttc_secs <= 120;

        let freshness = self.staleness.check_freshness(inputs.token_id);

        FeatureVector {
            token_id: inputs.token_id.to_string(),
            condition_id: inputs.condition_id.to_string(),
            timestamp_ms: inputs.timestamp_ms,
            time_to_close_secs: ttc_secs,
            ramp_multiplier: ramp,
            in_no_trade_zone,
            trade_size,
            orderbook,
            wallet,
            impact,
            burst_score,
            change_point_detected,
            data_complete: freshness.is_data_complete(),
            data_stale: freshness.is_data_stale(),
        }
    }
}

/// Convenience to record freshness after a successful orderbook/trade fetch,
/// used by the Collector jobs (§4.8).
pub fn record_orderbook_update(tracker: &StalenessTracker, token_id: &str) {
    tracker.record(DataKind::Orderbook, token_id);
}

pub fn record_trade_update(tracker: &StalenessTracker, token_id: &str) {
    tracker.record(DataKind::Trade, token_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_floor_zeroes_small_trades() {
        let trade = Trade {
            trade_id: "t1".into(),
            token_id: "tok".into(),
            timestamp_ms: 0,
            side: crate::models::Side::Buy,
            price: 0.5,
            size: 20.0, // $10 notional
            maker_address: crate::models::Address::new(""),
            taker_address: crate::models::Address::new("0xabc"),
            fee_rate_bps: None,
            transaction_hash: None,
        };
        let f = TradeSizeFeature::compute(&trade, &[], None);
        assert_eq!(f.size_tail_score, 0.0);
    }

    #[test]
    fn ramp_multiplier_decays_and_caps() {
        assert!((ramp_multiplier(0.0) - 3.0).abs() < 1e-9);
        assert!(ramp_multiplier(1000.0) >= 1.0 && ramp_multiplier(1000.0) < 1.01);
        assert!(ramp_multiplier(0.0) <= 5.0);
    }

    #[test]
    fn impact_uses_nearest_snapshot_within_window() {
        let window = vec![(29_500, 0.52), (60_900, 0.55)];
        let impact = ImpactFeature::compute(0, 0.50, &window).unwrap();
        assert!((impact.drift_30s.unwrap() - 0.02).abs() < 1e-9);
        assert!((impact.drift_60s.unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn impact_none_when_no_snapshot_in_range() {
        let window = vec![(5_000, 0.52)];
        assert!(ImpactFeature::compute(0, 0.50, &window).is_none());
    }

    #[test]
    fn no_trade_zone_boundary() {
        // ttc=120s -> in zone; ttc=121s -> not.
        assert!(120i64 > 0 && 120i64 <= 120);
        assert!(!(121i64 > 0 && 121i64 <= 120));
    }
}
