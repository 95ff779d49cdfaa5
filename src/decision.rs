//! Decision Service (§4.7): freshness → score gates → direction → sizing →
//! risk → immutable decision, cached 60s and emitted to the paper queue.

use std::sync::Arc;

use crate::clock::{Clock, DataKind, StalenessTracker};
use crate::config::Config;
use crate::error::RiskRejection;
use crate::features::FeatureVector;
use crate::models::{Decision, DecisionAction, MarketSide};
use crate::paper::PaperQueue;
use crate::risk::{self, CircuitBreaker, RiskInputs, RiskParams};
use crate::scoring::{self, Scores};
use crate::sizing::{self, SizerInputs, SizerParams};
use crate::store::Store;

const CACHE_TTL_MS: i64 = 60_000;
/// `expiresAt = createdAt + 30s` (§3), distinct from the 60s decision cache
/// above — a cached decision can legitimately outlive the order it quoted.
const DECISION_EXPIRY_MS: i64 = 30_000;

pub struct PortfolioState {
    pub bankroll: f64,
    pub total_exposure_usd: f64,
    pub existing_position_usd: f64,
    pub daily_pnl_usd: f64,
    pub drawdown_fraction: f64,
    pub consecutive_losses: u32,
}

pub struct DecisionService {
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    staleness: Arc<StalenessTracker>,
    breaker: CircuitBreaker,
    paper_queue: Arc<PaperQueue>,
    config: Config,
}

fn cache_key(token_id: &str) -> String {
    format!("decision:{token_id}:latest")
}

impl DecisionService {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn Store>,
        staleness: Arc<StalenessTracker>,
        paper_queue: Arc<PaperQueue>,
        config: Config,
    ) -> Self {
        let breaker = CircuitBreaker::new(store.clone());
        Self {
            clock,
            store,
            staleness,
            breaker,
            paper_queue,
            config,
        }
    }

    /// Returns a cached decision for `token_id` if one was emitted within the
    /// last 60s, without recomputing anything.
    pub fn cached(&self, token_id: &str) -> Option<Decision> {
        self.store
            .get_string(&cache_key(token_id))
            .and_then(|json| serde_json::from_str(&json).ok())
    }

    fn cache_and_emit(&self, decision: Decision) -> Decision {
        if let Ok(json) = serde_json::to_string(&decision) {
            self.store
                .set_string(&cache_key(&decision.token_id), json, CACHE_TTL_MS);
        }
        if decision.approved {
            self.paper_queue.push(decision.clone());
        }
        decision
    }

    fn rejected(
        &self,
        features: &FeatureVector,
        scores: Scores,
        reason: RiskRejection,
        checks_passed: Vec<String>,
    ) -> Decision {
        let now = self.clock.now_ms();
        self.cache_and_emit(Decision {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: features.token_id.clone(),
            condition_id: features.condition_id.clone(),
            timestamp_ms: features.timestamp_ms,
            action: DecisionAction::NoTrade,
            side: None,
            target_price: None,
            limit_price: None,
            sizing: None,
            target_size_usd: None,
            scores,
            features: features.clone(),
            approved: false,
            rejection_reason: Some(reason.to_string()),
            risk_checks_passed: checks_passed,
            created_at_ms: now,
            expires_at_ms: now + DECISION_EXPIRY_MS,
            paper_mode: self.config.paper_mode,
        })
    }

    /// Runs the full pipeline for one trigger. `features` must already
    /// reflect the latest freshness state (`FeatureBuilder::build`).
    pub fn decide(&self, features: FeatureVector, portfolio: &PortfolioState) -> Decision {
        if let Some(cached) = self.cached(&features.token_id) {
            return cached;
        }

        if !features.data_complete || features.data_stale {
            let scores = scoring::score(&features, 0.0);
            return self.rejected(&features, scores, RiskRejection::StaleBookData, vec![]);
        }

        let target_size_seed = portfolio.bankroll * 0.02;
        let scores = scoring::score(&features, target_size_seed);

        if scores.anomaly.score < self.config.min_anomaly_score {
            return self.rejected(
                &features,
                scores,
                RiskRejection::BelowAnomalyThreshold,
                vec![],
            );
        }
        if scores.execution.score < self.config.min_execution_score {
            return self.rejected(
                &features,
                scores,
                RiskRejection::BelowExecutionThreshold,
                vec![],
            );
        }
        if scores.edge.score < self.config.min_edge_score {
            return self.rejected(&features, scores, RiskRejection::BelowEdgeThreshold, vec![]);
        }

        let imbalance_signed = features
            .orderbook
            .as_ref()
            .map(|o| o.imbalance_signed)
            .unwrap_or(0.0);
        let thin_opposite_ok = features
            .orderbook
            .as_ref()
            .map(|o| o.thin_opposite_score >= 0.5)
            .unwrap_or(false);

        if imbalance_signed.abs() < 0.2 || !thin_opposite_ok {
            return self.rejected(&features, scores, RiskRejection::NoDirection, vec![]);
        }

        let side = if imbalance_signed > 0.0 {
            MarketSide::Yes
        } else {
            MarketSide::No
        };

        let mid_price = features
            .orderbook
            .as_ref()
            .map(|o| o.mid_price)
            .unwrap_or(0.5);
        let best_bid = features.orderbook.as_ref().map(|o| o.best_bid).unwrap_or(mid_price);
        let best_ask = features.orderbook.as_ref().map(|o| o.best_ask).unwrap_or(mid_price);
        let spread_bps = features.orderbook.as_ref().map(|o| o.spread_bps).unwrap_or(0.0);
        let spread_fraction = spread_bps / 10_000.0;
        // targetPrice is the actual marketable quote (§3): bestAsk to buy
        // YES, bestBid to sell into NO.
        let target_price = match side {
            MarketSide::Yes => best_ask,
            MarketSide::No => best_bid,
        };
        let improvement = spread_fraction * 0.5;
        let limit_price = match side {
            MarketSide::Yes => (target_price + improvement).clamp(0.01, 0.99),
            MarketSide::No => (target_price - improvement).clamp(0.01, 0.99),
        };

        let sizer_inputs = SizerInputs {
            edge: scores.edge,
            price: target_price,
            side,
            bankroll: portfolio.bankroll,
            existing_position_usd: portfolio.existing_position_usd,
        };
        let sizing = sizing::size_position(&sizer_inputs, &SizerParams::default());

        let risk_inputs = RiskInputs {
            close_time_ms: features.timestamp_ms + features.time_to_close_secs * 1000,
            now_ms: features.timestamp_ms,
            proposed_size_usd: sizing.target_size_usd,
            bankroll: portfolio.bankroll,
            total_exposure_usd: portfolio.total_exposure_usd,
            existing_position_usd: portfolio.existing_position_usd,
            daily_pnl_usd: portfolio.daily_pnl_usd,
            drawdown_fraction: portfolio.drawdown_fraction,
            consecutive_losses: portfolio.consecutive_losses,
            spread_bps,
            top_of_book_depth_usd: features
                .orderbook
                .as_ref()
                .map(|o| o.bid_depth_10pct.min(o.ask_depth_10pct))
                .unwrap_or(0.0),
            book_age_ms: self.staleness.age_ms(DataKind::Orderbook, &features.token_id),
            trade_age_ms: self.staleness.age_ms(DataKind::Trade, &features.token_id),
        };
        let risk_outcome = risk::evaluate(&risk_inputs, &RiskParams::default(), &self.breaker);

        if !risk_outcome.approved {
            let reason = risk_outcome
                .rejection_reason
                .unwrap_or_else(|| RiskRejection::NoDirection.to_string());
            let now = self.clock.now_ms();
            return self.cache_and_emit(Decision {
                id: uuid::Uuid::new_v4().to_string(),
                token_id: features.token_id.clone(),
                condition_id: features.condition_id.clone(),
                timestamp_ms: features.timestamp_ms,
                action: DecisionAction::NoTrade,
                side: Some(side),
                target_price: Some(target_price),
                limit_price: Some(limit_price),
                sizing: None,
                target_size_usd: None,
                scores,
                features: features.clone(),
                approved: false,
                rejection_reason: Some(reason),
                risk_checks_passed: risk_outcome.checks_passed,
                created_at_ms: now,
                expires_at_ms: now + DECISION_EXPIRY_MS,
                paper_mode: self.config.paper_mode,
            });
        }

        let target_size_shares = match side {
            MarketSide::Yes => risk_outcome.adjusted_size_usd / target_price,
            MarketSide::No => risk_outcome.adjusted_size_usd / (1.0 - target_price),
        };
        let action = match side {
            MarketSide::Yes => DecisionAction::Buy,
            MarketSide::No => DecisionAction::Sell,
        };

        let final_sizing = crate::models::Sizing {
            target_size_usd: risk_outcome.adjusted_size_usd,
            target_size_shares,
            kelly_raw: sizing.kelly_raw,
            kelly_adjusted: sizing.kelly_adjusted,
            clamp_tags: sizing.clamp_tags,
        };

        let now = self.clock.now_ms();
        self.cache_and_emit(Decision {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: features.token_id.clone(),
            condition_id: features.condition_id.clone(),
            timestamp_ms: features.timestamp_ms,
            action,
            side: Some(side),
            target_price: Some(target_price),
            limit_price: Some(limit_price),
            sizing: Some(final_sizing),
            target_size_usd: Some(risk_outcome.adjusted_size_usd),
            scores,
            features: features.clone(),
            approved: true,
            rejection_reason: None,
            risk_checks_passed: risk_outcome.checks_passed,
            created_at_ms: now,
            expires_at_ms: now + DECISION_EXPIRY_MS,
            paper_mode: self.config.paper_mode,
        })
    }
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self {
            bankroll: 10_000.0,
            total_exposure_usd: 0.0,
            existing_position_usd: 0.0,
            daily_pnl_usd: 0.0,
            drawdown_fraction: 0.0,
            consecutive_losses: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::features::{OrderbookFeature, TradeSizeFeature, WalletFeature};
    use crate::store::InMemoryStore;

    fn service() -> DecisionService {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(clock.clone()));
        let staleness = Arc::new(StalenessTracker::new(clock.clone()));
        let config = Config::from_env().unwrap();
        DecisionService::new(clock, store, staleness, Arc::new(PaperQueue::new()), config)
    }

    fn hot_features() -> FeatureVector {
        FeatureVector {
            token_id: "tok".into(),
            condition_id: "cond".into(),
            timestamp_ms: 0,
            time_to_close_secs: 7200,
            ramp_multiplier: crate::features::ramp_multiplier(2.0),
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
    fn stale_data_rejects_without_scoring_gates() {
        let svc = service();
        let mut f = hot_features();
        f.data_stale = true;
        let d = svc.decide(f, &PortfolioState::default());
        assert!(!d.approved);
        assert_eq!(d.rejection_reason.as_deref(), Some("stale_book_data"));
    }

    #[test]
    fn strong_signal_approves_and_caches() {
        let svc = service();
        let d1 = svc.decide(hot_features(), &PortfolioState::default());
        assert!(d1.approved);
        assert_eq!(d1.action, DecisionAction::Buy);
        assert!(d1.sizing.is_some());

        // second call within 60s returns the identical cached decision.
        let d2 = svc.decide(hot_features(), &PortfolioState::default());
        assert_eq!(d1.id, d2.id);
    }

    #[test]
    fn weak_imbalance_rejects_with_no_direction() {
        let svc = service();
        let mut f = hot_features();
        if let Some(ob) = f.orderbook.as_mut() {
            ob.imbalance_signed = 0.05;
        }
        let d = svc.decide(f, &PortfolioState::default());
        assert!(!d.approved);
        assert_eq!(d.rejection_reason.as_deref(), Some("no_direction"));
    }
}
