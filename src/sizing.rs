//! Sizer (§4.5): fractional Kelly with a conservative variance floor and
//! hard caps. Grounded on the teacher's `vault::kelly::calculate_kelly_position`
//! clamp-and-skip-reason shape, re-derived to the source spec's exact
//! formula and cap values rather than the teacher's literal constants.

use serde::{Deserialize, Serialize};

use crate::models::{MarketSide, Sizing};
use crate::scoring::EdgeScore;

#[derive(Debug, Clone, Copy)]
pub struct SizerParams {
    pub kelly_fraction: f64,
    pub max_bet_fraction: f64,
    pub max_position_fraction: f64,
    pub min_bet_size_usd: f64,
}

impl Default for SizerParams {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.25,
            max_bet_fraction: 0.02,
            max_position_fraction: 0.05,
            min_bet_size_usd: 5.0,
        }
    }
}

pub struct SizerInputs {
    pub edge: EdgeScore,
    pub price: f64,
    pub side: MarketSide,
    pub bankroll: f64,
    pub existing_position_usd: f64,
}

/// Computes `targetSizeUsd`/shares per §4.5, applying the three successive
/// clamps (bet, position, min-size) and recording which ones fired.
pub fn size_position(inputs: &SizerInputs, params: &SizerParams) -> Sizing {
    let edge_estimate = inputs.edge.score * 0.1;
    let variance_proxy = (inputs.price * (1.0 - inputs.price)).max(0.25);
    let kelly_raw = edge_estimate / variance_proxy;
    let kelly_adjusted = kelly_raw * params.kelly_fraction;

    let mut size_usd = kelly_adjusted * inputs.bankroll;
    let mut clamp_tags = Vec::new();

    let bet_cap = params.max_bet_fraction * inputs.bankroll;
    if size_usd > bet_cap {
        size_usd = bet_cap;
        clamp_tags.push("max_bet_fraction".to_string());
    }

    let position_cap =
        (params.max_position_fraction * inputs.bankroll - inputs.existing_position_usd).max(0.0);
    if size_usd > position_cap {
        size_usd = position_cap;
        clamp_tags.push("max_position_fraction".to_string());
    }

    if size_usd < params.min_bet_size_usd {
        size_usd = 0.0;
        clamp_tags.push("below_min_bet_size".to_string());
    }

    let target_size_shares = if size_usd > 0.0 {
        match inputs.side {
            MarketSide::Yes => size_usd / inputs.price,
            MarketSide::No => size_usd / (1.0 - inputs.price),
        }
    } else {
        0.0
    };

    Sizing {
        target_size_usd: size_usd,
        target_size_shares,
        kelly_raw,
        kelly_adjusted,
        clamp_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(score: f64) -> EdgeScore {
        EdgeScore {
            implied_prob: 0.5,
            estimated_prob: 0.55,
            edge: 0.05,
            edge_confidence: 1.0,
            aligned_signals: 3,
            score,
        }
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let inputs = SizerInputs {
            edge: edge(0.8),
            price: 0.55,
            side: MarketSide::Yes,
            bankroll: 10_000.0,
            existing_position_usd: 0.0,
        };
        let a = size_position(&inputs, &SizerParams::default());
        let b = size_position(
            &SizerInputs {
                edge: edge(0.8),
                price: 0.55,
                side: MarketSide::Yes,
                bankroll: 10_000.0,
                existing_position_usd: 0.0,
            },
            &SizerParams::default(),
        );
        assert_eq!(a.target_size_usd, b.target_size_usd);
    }

    #[test]
    fn max_bet_fraction_clamp_fires() {
        let inputs = SizerInputs {
            edge: edge(1.0),
            price: 0.5,
            side: MarketSide::Yes,
            bankroll: 10_000.0,
            existing_position_usd: 0.0,
        };
        let sizing = size_position(&inputs, &SizerParams::default());
        assert!(sizing.target_size_usd <= 200.0 + 1e-9); // 2% of 10,000
        assert!(sizing.clamp_tags.contains(&"max_bet_fraction".to_string()));
    }

    #[test]
    fn position_cap_zeroes_when_exhausted() {
        let inputs = SizerInputs {
            edge: edge(1.0),
            price: 0.5,
            side: MarketSide::Yes,
            bankroll: 10_000.0,
            existing_position_usd: 500.0, // already at 5% cap
        };
        let sizing = size_position(&inputs, &SizerParams::default());
        assert_eq!(sizing.target_size_usd, 0.0);
        assert!(sizing.clamp_tags.contains(&"max_position_fraction".to_string())
            || sizing.clamp_tags.contains(&"below_min_bet_size".to_string()));
    }

    #[test]
    fn below_min_bet_zeroes_out() {
        let inputs = SizerInputs {
            edge: edge(0.01),
            price: 0.5,
            side: MarketSide::Yes,
            bankroll: 1000.0,
            existing_position_usd: 0.0,
        };
        let sizing = size_position(&inputs, &SizerParams::default());
        assert_eq!(sizing.target_size_usd, 0.0);
        assert!(sizing.clamp_tags.contains(&"below_min_bet_size".to_string()));
    }
}
