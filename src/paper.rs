//! Paper Queue Observer (§4.10): an in-process append-only log of emitted
//! decisions. Grounded on `signals::storage::SignalStorage`'s bounded
//! `VecDeque` pattern, made thread-safe and generalized from signals to
//! decisions.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::Decision;

const MAX_SIZE: usize = 10_000;

pub struct PaperQueue {
    decisions: Mutex<VecDeque<Decision>>,
}

impl Default for PaperQueue {
    fn default() -> Self {
        Self {
            decisions: Mutex::new(VecDeque::with_capacity(MAX_SIZE)),
        }
    }
}

impl PaperQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, decision: Decision) {
        let mut guard = self.decisions.lock();
        if guard.len() >= MAX_SIZE {
            guard.pop_front();
        }
        guard.push_back(decision);
    }

    pub fn recent(&self, limit: usize) -> Vec<Decision> {
        self.decisions.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.decisions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.decisions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::models::{DecisionAction, SignalStrength};
    use crate::scoring::{AnomalyScore, EdgeScore, ExecutionScore, Scores};

    fn sample(id: &str) -> Decision {
        let scores = Scores {
            anomaly: AnomalyScore {
                size_tail: 0.0,
                book_imbalance: 0.0,
                thin_opposite: 0.0,
                wallet: 0.0,
                impact: 0.0,
                burst: 0.0,
                change_point: 0.0,
                core_score: 0.0,
                context_score: 0.0,
                score: 0.0,
                confidence: 0.0,
                triggered: false,
                triple_signal: false,
            },
            execution: ExecutionScore {
                depth_score: 0.0,
                spread_score: 0.0,
                volatility_score: 0.0,
                time_score: 0.0,
                score: 0.0,
                slippage_bps: 0.0,
                fill_probability: 0.0,
            },
            edge: EdgeScore {
                implied_prob: 0.5,
                estimated_prob: 0.5,
                edge: 0.0,
                edge_confidence: 0.0,
                aligned_signals: 0,
                score: 0.0,
            },
            composite_score: 0.0,
            ramped_score: 0.0,
            signal_strength: SignalStrength::None,
        };

        let features = FeatureVector {
            token_id: "tok".into(),
            condition_id: "cond".into(),
            timestamp_ms: 0,
            time_to_close_secs: 0,
            ramp_multiplier: 1.0,
            in_no_trade_zone: false,
            trade_size: None,
            orderbook: None,
            wallet: None,
            impact: None,
            burst_score: 0.0,
            change_point_detected: false,
            data_complete: true,
            data_stale: false,
        };

        Decision {
            id: id.to_string(),
            token_id: "tok".into(),
            condition_id: "cond".into(),
            timestamp_ms: 0,
            action: DecisionAction::NoTrade,
            side: None,
            target_price: None,
            limit_price: None,
            sizing: None,
            target_size_usd: None,
            scores,
            features,
            approved: false,
            rejection_reason: None,
            risk_checks_passed: vec![],
            created_at_ms: 0,
            expires_at_ms: 60_000,
            paper_mode: true,
        }
    }

    #[test]
    fn push_and_read_recent() {
        let q = PaperQueue::new();
        q.push(sample("a"));
        q.push(sample("b"));
        let recent = q.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "b");
    }

    #[test]
    fn drops_oldest_past_capacity() {
        let q = PaperQueue::new();
        for i in 0..(MAX_SIZE + 5) {
            q.push(sample(&i.to_string()));
        }
        assert_eq!(q.len(), MAX_SIZE);
    }
}
