//! Risk Guards (§4.6). Grounded on the teacher's `risk::RiskManager`
//! structural pattern (latched breaker state, a `Vec<String>` of guardrail
//! flags, successive-clamp sizing) but reimplemented against the source
//! spec's own thresholds rather than the teacher's literal constants
//! (teacher: `MAX_KELLY_CAP=0.20`, `DRAWNDOWN_THROTTLE_TRIGGER=0.08`; here:
//! 2%/5%/10% caps, 5%/15%/5-loss circuit breakers per §4.6).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RiskRejection;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    pub daily_loss_limit_fraction: f64,
    pub max_drawdown_fraction: f64,
    pub consecutive_loss_limit: u32,
    pub no_trade_zone_secs: i64,
    pub stale_book_threshold_ms: i64,
    pub stale_trade_threshold_ms: i64,
    pub max_spread_bps: f64,
    pub min_depth_usd: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            daily_loss_limit_fraction: 0.05,
            max_drawdown_fraction: 0.15,
            consecutive_loss_limit: 5,
            no_trade_zone_secs: 120,
            stale_book_threshold_ms: 10_000,
            stale_trade_threshold_ms: 30_000,
            max_spread_bps: 500.0,
            min_depth_usd: 100.0,
        }
    }
}

pub struct RiskInputs {
    pub close_time_ms: i64,
    pub now_ms: i64,
    pub proposed_size_usd: f64,
    pub bankroll: f64,
    pub total_exposure_usd: f64,
    pub existing_position_usd: f64,
    pub daily_pnl_usd: f64,
    pub drawdown_fraction: f64,
    pub consecutive_losses: u32,
    pub spread_bps: f64,
    pub top_of_book_depth_usd: f64,
    pub book_age_ms: Option<i64>,
    pub trade_age_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskOutcome {
    pub approved: bool,
    pub adjusted_size_usd: f64,
    pub rejection_reason: Option<String>,
    pub checks_passed: Vec<String>,
    pub warnings: Vec<String>,
}

const BREAKER_LATCH_TTL_MS: i64 = 86_400_000;

/// Latched circuit-breaker state, persisted in the store with a 24h TTL so
/// it survives process restarts (§4.6).
pub struct CircuitBreaker {
    store: Arc<dyn Store>,
}

const CB_KEY: &str = "risk:circuit_breaker";

impl CircuitBreaker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn active_reason(&self) -> Option<String> {
        self.store.hash_get(CB_KEY, "reason")
    }

    fn latch(&self, reason: &str) {
        self.store
            .hash_set(CB_KEY, "reason", reason.to_string(), BREAKER_LATCH_TTL_MS);
    }

    /// Clears the latch explicitly; never called automatically.
    pub fn clear(&self) {
        self.store.del(CB_KEY);
    }
}

/// Runs the ordered checks in §4.6, returning the final outcome. `breaker`
/// owns the persisted latch; arming checks below may latch it for future
/// calls but this call itself still evaluates the rest of the pipeline with
/// the pre-latch state per the spec's "approved iff no rejection" rule.
pub fn evaluate(
    inputs: &RiskInputs,
    params: &RiskParams,
    breaker: &CircuitBreaker,
) -> RiskOutcome {
    let mut checks_passed = Vec::new();
    let mut warnings = Vec::new();

    // 1. Circuit breaker active (latched).
    if let Some(reason) = breaker.active_reason() {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(RiskRejection::CircuitBreakerActive.to_string()),
            checks_passed,
            warnings: vec![format!("latched:{reason}")],
        };
    }
    checks_passed.push("circuit_breaker_active".to_string());

    // 2. Circuit breaker arming.
    let daily_loss_limit = params.daily_loss_limit_fraction * inputs.bankroll;
    let mut armed_rejection: Option<RiskRejection> = None;

    if inputs.daily_pnl_usd < -daily_loss_limit {
        breaker.latch("daily_loss");
        armed_rejection = Some(RiskRejection::DailyLossCircuitBreaker);
    } else if inputs.daily_pnl_usd < -0.8 * daily_loss_limit {
        warnings.push("daily_loss_warning_80pct".to_string());
    }

    if inputs.drawdown_fraction > params.max_drawdown_fraction {
        breaker.latch("max_drawdown");
        armed_rejection = armed_rejection.or(Some(RiskRejection::DrawdownCircuitBreaker));
    } else if inputs.drawdown_fraction > 0.8 * params.max_drawdown_fraction {
        warnings.push("drawdown_warning_80pct".to_string());
    }

    if inputs.consecutive_losses >= params.consecutive_loss_limit {
        breaker.latch("consecutive_losses");
        armed_rejection = armed_rejection.or(Some(RiskRejection::ConsecutiveLossCircuitBreaker));
    } else if inputs.consecutive_losses as f64 >= 0.8 * params.consecutive_loss_limit as f64 {
        warnings.push("consecutive_losses_warning_80pct".to_string());
    }

    if let Some(reason) = armed_rejection {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(reason.to_string()),
            checks_passed,
            warnings,
        };
    }
    checks_passed.push("circuit_breaker_arming".to_string());

    // 3. No-trade zone.
    let ttc_secs = (inputs.close_time_ms - inputs.now_ms) / 1000;
    if ttc_secs <= params.no_trade_zone_secs {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(RiskRejection::NoTradeZone.to_string()),
            checks_passed,
            warnings,
        };
    }
    checks_passed.push("no_trade_zone".to_string());

    // 4. Staleness.
    match inputs.book_age_ms {
        Some(age) if age > params.stale_book_threshold_ms => {
            return RiskOutcome {
                approved: false,
                adjusted_size_usd: 0.0,
                rejection_reason: Some(RiskRejection::StaleBookData.to_string()),
                checks_passed,
                warnings,
            };
        }
        _ => checks_passed.push("stale_book_data".to_string()),
    }
    if let Some(age) = inputs.trade_age_ms {
        if age > params.stale_trade_threshold_ms {
            warnings.push("stale_trade_data".to_string());
        }
    }

    // 5. Spread.
    if inputs.spread_bps > params.max_spread_bps {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(RiskRejection::SpreadTooWide.to_string()),
            checks_passed,
            warnings,
        };
    }
    checks_passed.push("spread_too_wide".to_string());

    // 6. Depth.
    if inputs.top_of_book_depth_usd < params.min_depth_usd {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(RiskRejection::InsufficientDepth.to_string()),
            checks_passed,
            warnings,
        };
    }
    checks_passed.push("insufficient_depth".to_string());

    // 7. Caps, successive min-clamps.
    let mut size = inputs.proposed_size_usd;

    let bet_cap = 0.02 * inputs.bankroll;
    if size > bet_cap {
        size = bet_cap;
        warnings.push("size_capped_bet".to_string());
    }

    let position_cap = (0.05 * inputs.bankroll - inputs.existing_position_usd).max(0.0);
    if size > position_cap {
        size = position_cap;
        if position_cap <= 0.0 {
            return RiskOutcome {
                approved: false,
                adjusted_size_usd: 0.0,
                rejection_reason: Some(RiskRejection::PositionLimitExceeded.to_string()),
                checks_passed,
                warnings,
            };
        }
        warnings.push("size_capped_position".to_string());
    }

    let exposure_cap = (0.10 * inputs.bankroll - inputs.total_exposure_usd).max(0.0);
    if size > exposure_cap {
        size = exposure_cap;
        if exposure_cap <= 0.0 {
            return RiskOutcome {
                approved: false,
                adjusted_size_usd: 0.0,
                rejection_reason: Some(RiskRejection::ExposureLimitExceeded.to_string()),
                checks_passed,
                warnings,
            };
        }
        warnings.push("size_capped_exposure".to_string());
    }

    checks_passed.push("position_and_exposure_caps".to_string());

    if size <= 0.0 {
        return RiskOutcome {
            approved: false,
            adjusted_size_usd: 0.0,
            rejection_reason: Some(RiskRejection::BelowMinBetSize.to_string()),
            checks_passed,
            warnings,
        };
    }

    RiskOutcome {
        approved: true,
        adjusted_size_usd: size,
        rejection_reason: None,
        checks_passed,
        warnings,
    }
}
