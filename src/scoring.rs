//! Scorer (§4.4): transforms a feature vector into
//! `{anomaly, execution, edge, composite}` with a time-ramp multiplier and
//! signal-strength tag.

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;
use crate::models::SignalStrength;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub size_tail: f64,
    pub book_imbalance: f64,
    pub thin_opposite: f64,
    pub wallet: f64,
    pub impact: f64,
    pub burst: f64,
    pub change_point: f64,
    pub core_score: f64,
    pub context_score: f64,
    pub score: f64,
    pub confidence: f64,
    pub triggered: bool,
    pub triple_signal: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionScore {
    pub depth_score: f64,
    pub spread_score: f64,
    pub volatility_score: f64,
    pub time_score: f64,
    pub score: f64,
    pub slippage_bps: f64,
    pub fill_probability: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeScore {
    pub implied_prob: f64,
    pub estimated_prob: f64,
    pub edge: f64,
    pub edge_confidence: f64,
    pub aligned_signals: u8,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scores {
    pub anomaly: AnomalyScore,
    pub execution: ExecutionScore,
    pub edge: EdgeScore,
    pub composite_score: f64,
    pub ramped_score: f64,
    pub signal_strength: SignalStrength,
}

const ANOMALY_THRESHOLD: f64 = 0.65;

fn score_anomaly(features: &FeatureVector) -> AnomalyScore {
    let size_tail = features.trade_size.as_ref().map(|t| t.size_tail_score);
    let book_imbalance = features.orderbook.as_ref().map(|o| o.book_imbalance_score);
    let thin_opposite = features.orderbook.as_ref().map(|o| o.thin_opposite_score);
    let wallet = features
        .wallet
        .as_ref()
        .map(|w| 0.5 * w.wallet_new_score + 0.5 * w.wallet_activity_score);
    let impact = features.impact.as_ref().map(|i| i.score());

    let present = [size_tail, book_imbalance, thin_opposite, wallet, impact]
        .iter()
        .filter(|v| v.is_some())
        .count();

    let core_score = 0.35 * size_tail.unwrap_or(0.0)
        + 0.30 * (0.6 * book_imbalance.unwrap_or(0.0) + 0.4 * thin_opposite.unwrap_or(0.0))
        + 0.20 * wallet.unwrap_or(0.0)
        + 0.15 * impact.unwrap_or(0.0);

    let burst = features.burst_score;
    let change_point = if features.change_point_detected { 1.0 } else { 0.0 };
    let context_score = burst.max(change_point);

    let score = ((core_score + 0.15 * context_score).min(1.0) * features.ramp_multiplier).min(1.0);

    // Confidence denominator counts the five sub-features named in §3:
    // sizeTail, bookImbalance, thinOpposite, wallet, impact — each counted
    // independently even though bookImbalance and thinOpposite are combined
    // with sub-weights in the core-score formula above.
    let confidence = (present as f64) / 5.0;

    let triggered = score >= ANOMALY_THRESHOLD;

    let triple_signal = size_tail.unwrap_or(0.0) >= 0.90
        && book_imbalance.unwrap_or(0.0) >= 0.70
        && thin_opposite.unwrap_or(0.0) >= 0.70
        && (features.wallet.as_ref().map(|w| w.wallet_new_score).unwrap_or(0.0) >= 0.80
            || features.wallet.as_ref().map(|w| w.wallet_activity_score).unwrap_or(0.0) >= 0.70);

    AnomalyScore {
        size_tail: size_tail.unwrap_or(0.0),
        book_imbalance: book_imbalance.unwrap_or(0.0),
        thin_opposite: thin_opposite.unwrap_or(0.0),
        wallet: wallet.unwrap_or(0.0),
        impact: impact.unwrap_or(0.0),
        burst,
        change_point,
        core_score,
        context_score,
        score,
        confidence: confidence.min(1.0),
        triggered,
        triple_signal,
    }
}

fn score_execution(features: &FeatureVector, target_size_usd: f64) -> ExecutionScore {
    let ob = features.orderbook.as_ref();
    let min_depth = ob
        .map(|o| o.bid_depth_10pct.min(o.ask_depth_10pct))
        .unwrap_or(0.0);
    let depth_score = if target_size_usd <= 0.0 {
        1.0
    } else {
        (min_depth / (target_size_usd * 5.0)).clamp(0.0, 1.0)
    };

    let spread_bps = ob.map(|o| o.spread_bps).unwrap_or(500.0);
    let spread_score = 1.0 - ((spread_bps - 10.0) / (500.0 - 10.0)).clamp(0.0, 1.0);

    let imbalance_penalty = ob.map(|o| o.imbalance_abs).unwrap_or(0.0);
    let spread_penalty = (spread_bps / 500.0).clamp(0.0, 1.0);
    let volatility_score = (1.0 - 0.5 * imbalance_penalty - 0.5 * spread_penalty).clamp(0.0, 1.0);

    let time_score = (1.0 / features.ramp_multiplier).clamp(0.0, 1.0);

    let score = (0.35 * depth_score + 0.30 * spread_score + 0.20 * volatility_score
        + 0.15 * time_score)
        .clamp(0.0, 1.0);

    let slippage_bps = if min_depth > 0.0 {
        (target_size_usd / min_depth * 100.0).min(1000.0)
    } else {
        1000.0
    };

    let fill_probability = (depth_score * 0.6 + spread_score * 0.4).clamp(0.0, 1.0);

    ExecutionScore {
        depth_score,
        spread_score,
        volatility_score,
        time_score,
        score,
        slippage_bps,
        fill_probability,
    }
}

/// Edge construction resolved per SPEC_FULL §9 (open question in the source
/// spec): blends anomaly direction and orderbook imbalance sign into an
/// estimated-probability delta, with confidence gated by how many of the
/// four directional signals agree.
fn score_edge(features: &FeatureVector, anomaly: &AnomalyScore) -> EdgeScore {
    let implied_prob = features.orderbook.as_ref().map(|o| o.mid_price).unwrap_or(0.5);
    let imbalance_signed = features.orderbook.as_ref().map(|o| o.imbalance_signed).unwrap_or(0.0);
    let direction = if imbalance_signed > 0.0 {
        1.0
    } else if imbalance_signed < 0.0 {
        -1.0
    } else {
        0.0
    };

    let impact_direction = features.impact.as_ref().map(|i| i.direction()).unwrap_or(0.0);
    let impact_score = features.impact.as_ref().map(|i| i.score()).unwrap_or(0.0);

    let estimated_prob = (implied_prob
        + direction * imbalance_signed.abs() * 0.15
        + direction * impact_score * 0.05)
        .clamp(0.01, 0.99);
    let edge = estimated_prob - implied_prob;

    let mut aligned_signals = 0u8;
    if direction != 0.0 {
        aligned_signals += 1;
    }
    if impact_direction == direction && direction != 0.0 {
        aligned_signals += 1;
    }
    if anomaly.burst > 0.0 {
        aligned_signals += 1;
    }
    if anomaly.change_point > 0.0 {
        aligned_signals += 1;
    }

    let edge_confidence = ((aligned_signals as f64 / 4.0) + 0.15).min(1.0);
    let score = (edge.abs() / 0.20).clamp(0.0, 1.0) * edge_confidence;

    EdgeScore {
        implied_prob,
        estimated_prob,
        edge,
        edge_confidence,
        aligned_signals,
        score,
    }
}

pub fn score(features: &FeatureVector, target_size_usd: f64) -> Scores {
    let anomaly = score_anomaly(features);
    let execution = score_execution(features, target_size_usd);
    let edge = score_edge(features, &anomaly);

    let composite_score =
        (anomaly.score * 0.35 + execution.score * 0.25 + edge.score * 0.40).clamp(0.0, 1.0);
    let ramped_score = (composite_score * features.ramp_multiplier).min(1.0);
    let signal_strength = SignalStrength::from_score(ramped_score);

    Scores {
        anomaly,
        execution,
        edge,
        composite_score,
        ramped_score,
        signal_strength,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{OrderbookFeature, TradeSizeFeature, WalletFeature};

    fn base_features() -> FeatureVector {
        FeatureVector {
            token_id: "tok".into(),
            condition_id: "cond".into(),
            timestamp_ms: 0,
            time_to_close_secs: 7200,
            ramp_multiplier: crate::features::ramp_multiplier(2.0),
            in_no_trade_zone: false,
            trade_size: None,
            orderbook: None,
            wallet: None,
            impact: None,
            burst_score: 0.0,
            change_point_detected: false,
            data_complete: true,
            data_stale: false,
        }
    }

    #[test]
    fn calm_market_scores_low() {
        let mut f = base_features();
        f.orderbook = Some(OrderbookFeature {
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
        });
        f.trade_size = Some(TradeSizeFeature {
            size_usd: 100.0,
            robust_z: 0.0,
            percentile: 0.1,
            size_tail_score: 0.0,
        });
        let s = score(&f, 100.0);
        assert!(s.anomaly.score < 0.3);
        assert!(!s.anomaly.triggered);
    }

    #[test]
    fn triple_signal_requires_all_four_conditions() {
        let mut f = base_features();
        f.ramp_multiplier = crate::features::ramp_multiplier(5.0 / 60.0);
        f.time_to_close_secs = 300;
        f.orderbook = Some(OrderbookFeature {
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
        });
        f.trade_size = Some(TradeSizeFeature {
            size_usd: 50_000.0,
            robust_z: 10.0,
            percentile: 1.0,
            size_tail_score: 1.0,
        });
        f.wallet = Some(WalletFeature {
            age_days: Some(2.0),
            wallet_new_score: 1.0,
            wallet_activity_score: 0.9,
        });
        f.burst_score = 0.8;
        f.change_point_detected = true;

        let s = score(&f, 5000.0);
        assert!(s.anomaly.triple_signal);
        assert!(s.anomaly.triggered);
        assert!(s.anomaly.score >= 0.65);
    }

    #[test]
    fn composite_and_ramped_are_bounded() {
        let mut f = base_features();
        f.ramp_multiplier = 5.0;
        f.orderbook = Some(OrderbookFeature {
            bid_depth_10pct: 1.0,
            ask_depth_10pct: 1.0,
            imbalance_abs: 1.0,
            book_imbalance_score: 1.0,
            thin_opposite_score: 1.0,
            spread_bps: 500.0,
            mid_price: 0.9,
            imbalance_signed: 1.0,
            best_bid: 0.85,
            best_ask: 0.95,
        });
        f.trade_size = Some(TradeSizeFeature {
            size_usd: 1_000_000.0,
            robust_z: f64::INFINITY,
            percentile: 1.0,
            size_tail_score: 1.0,
        });
        let s = score(&f, 10.0);
        assert!(s.composite_score >= 0.0 && s.composite_score <= 1.0);
        assert!(s.ramped_score >= 0.0 && s.ramped_score <= 1.0);
    }
}
