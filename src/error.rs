//! Error taxonomy for adapter I/O and risk decisions.
//!
//! Everything else threads `anyhow::Result` through job boundaries with
//! `.context(...)`; these two enums exist only where a caller branches on
//! error *kind* rather than just logging and moving on.

use std::fmt;

/// Errors surfaced by the external adapters (markets/orderbook/trade feed,
/// block explorer). The queue runtime matches on this to decide retry vs.
/// drop.
#[derive(Debug, Clone)]
pub enum AdapterError {
    Transport(String),
    Timeout,
    RateLimited,
    Validation(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Transport(msg) => write!(f, "transport error: {msg}"),
            AdapterError::Timeout => write!(f, "request timed out"),
            AdapterError::RateLimited => write!(f, "rate limited by upstream"),
            AdapterError::Validation(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    /// Transport and timeout failures are retried by the queue; rate limits
    /// are retried with a longer backoff; validation failures are dropped
    /// (the item, not the whole job).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transport(_) | AdapterError::Timeout | AdapterError::RateLimited
        )
    }
}

/// Structured reasons a decision was rejected by the risk guards (§4.6/§4.7).
/// Not an `Error` impl: rejection is a normal decision outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRejection {
    CircuitBreakerActive,
    DailyLossCircuitBreaker,
    DrawdownCircuitBreaker,
    ConsecutiveLossCircuitBreaker,
    NoTradeZone,
    StaleBookData,
    SpreadTooWide,
    InsufficientDepth,
    PositionLimitExceeded,
    ExposureLimitExceeded,
    BelowMinBetSize,
    NoDirection,
    BelowAnomalyThreshold,
    BelowExecutionThreshold,
    BelowEdgeThreshold,
}

impl RiskRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRejection::CircuitBreakerActive => "circuit_breaker_active",
            RiskRejection::DailyLossCircuitBreaker => "daily_loss_circuit_breaker",
            RiskRejection::DrawdownCircuitBreaker => "drawdown_circuit_breaker",
            RiskRejection::ConsecutiveLossCircuitBreaker => "consecutive_loss_circuit_breaker",
            RiskRejection::NoTradeZone => "no_trade_zone",
            RiskRejection::StaleBookData => "stale_book_data",
            RiskRejection::SpreadTooWide => "spread_too_wide",
            RiskRejection::InsufficientDepth => "insufficient_depth",
            RiskRejection::PositionLimitExceeded => "position_limit_exceeded",
            RiskRejection::ExposureLimitExceeded => "exposure_limit_exceeded",
            RiskRejection::BelowMinBetSize => "below_min_bet_size",
            RiskRejection::NoDirection => "no_direction",
            RiskRejection::BelowAnomalyThreshold => "below_anomaly_threshold",
            RiskRejection::BelowExecutionThreshold => "below_execution_threshold",
            RiskRejection::BelowEdgeThreshold => "below_edge_threshold",
        }
    }
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
