//! Core data model (§3): identifiers, market metadata, trades, orderbook
//! snapshots/metrics, wallet profiles, feature vectors, scores, and decisions.

use serde::{Deserialize, Serialize};

pub type TokenId = String;
pub type ConditionId = String;

/// Lowercased 20-byte hex address with `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Normalizes to lowercase; does not validate length/hex-ness beyond a
    /// cheap prefix check, matching upstream feeds that are themselves loose.
    pub fn new(raw: &str) -> Self {
        Address(raw.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// One of the two outcomes of a binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub token_id: TokenId,
}

/// Read-mostly market metadata cache entry (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub condition_id: ConditionId,
    pub question: String,
    pub end_date_iso: String,
    pub active: bool,
    pub closed: bool,
    pub resolved: bool,
    pub volume: f64,
    pub liquidity: f64,
    pub outcomes: [Outcome; 2],
    pub tags: Vec<String>,
    pub category: Option<String>,
}

impl MarketMetadata {
    /// Invariant: exactly two outcomes with distinct token ids (enforced by
    /// the `[Outcome; 2]` shape plus this check at construction sites).
    pub fn has_distinct_outcomes(&self) -> bool {
        self.outcomes[0].token_id != self.outcomes[1].token_id
    }
}

/// Canonical normalized trade (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub trade_id: String,
    pub token_id: TokenId,
    pub timestamp_ms: i64,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub maker_address: Address,
    pub taker_address: Address,
    pub fee_rate_bps: Option<f64>,
    pub transaction_hash: Option<String>,
}

/// Returns true for a syntactically valid 32-byte hex hash with `0x` prefix.
fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 66 && hash.starts_with("0x") && hash[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Raw shape of the public trade feed (§6), before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub proxy_wallet: String,
    pub side: String,
    pub asset: TokenId,
    pub condition_id: ConditionId,
    pub size: f64,
    pub price: f64,
    pub timestamp: i64,
    pub transaction_hash: Option<String>,
}

impl Trade {
    /// Trade id derivation per §3: prefer a valid 32-byte hash; else
    /// `conditionId-unixSec-takerAddress`. Upstream timestamps are seconds;
    /// converted to ms here.
    pub fn from_raw(raw: &RawTrade) -> anyhow::Result<Self> {
        let side = match raw.side.to_uppercase().as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => anyhow::bail!("unknown trade side: {other}"),
        };
        if raw.size <= 0.0 {
            anyhow::bail!("non-positive trade size: {}", raw.size);
        }
        if !(0.0..=1.0).contains(&raw.price) {
            anyhow::bail!("trade price out of [0,1]: {}", raw.price);
        }

        let taker = Address::new(&raw.proxy_wallet);
        let trade_id = match &raw.transaction_hash {
            Some(h) if is_valid_tx_hash(h) => h.clone(),
            _ => format!("{}-{}-{}", raw.condition_id, raw.timestamp, taker.as_str()),
        };

        Ok(Trade {
            trade_id,
            token_id: raw.asset.clone(),
            timestamp_ms: raw.timestamp * 1000,
            side,
            price: raw.price,
            size: raw.size,
            maker_address: Address::new(""),
            taker_address: taker,
            fee_rate_bps: None,
            transaction_hash: raw.transaction_hash.clone(),
        })
    }
}

/// One price level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

/// Normalized orderbook snapshot (§3). Invariants enforced in `normalize`:
/// bids desc, asks asc, zero-size levels filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub token_id: TokenId,
    pub timestamp_ms: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread: Option<f64>,
    pub spread_bps: Option<f64>,
}

impl OrderbookSnapshot {
    pub fn normalize(
        token_id: TokenId,
        timestamp_ms: i64,
        mut bids: Vec<Level>,
        mut asks: Vec<Level>,
    ) -> Self {
        bids.retain(|l| l.size > 0.0);
        asks.retain(|l| l.size > 0.0);
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);
        let (mid_price, spread, spread_bps) = match (best_bid, best_ask) {
            (Some(b), Some(a)) => {
                let mid = (b + a) / 2.0;
                let spread = a - b;
                let spread_bps = if mid > 0.0 { spread / mid * 10_000.0 } else { 0.0 };
                (Some(mid), Some(spread), Some(spread_bps))
            }
            _ => (None, None, None),
        };

        OrderbookSnapshot {
            token_id,
            timestamp_ms,
            bids,
            asks,
            best_bid,
            best_ask,
            mid_price,
            spread,
            spread_bps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinSide {
    Bid,
    Ask,
    Balanced,
}

/// Derived orderbook metrics (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookMetrics {
    pub bid_depth_5pct: f64,
    pub ask_depth_5pct: f64,
    pub bid_depth_10pct: f64,
    pub ask_depth_10pct: f64,
    pub bid_depth_top5: f64,
    pub ask_depth_top5: f64,
    pub imbalance: f64,
    pub thin_side: ThinSide,
    pub thin_side_ratio: f64,
    pub depth_adequate: bool,
}

fn depth_within(levels: &[Level], mid: f64, pct: f64) -> f64 {
    let bound = mid * pct;
    levels
        .iter()
        .filter(|l| (l.price - mid).abs() <= bound)
        .map(|l| l.price * l.size)
        .sum()
}

impl OrderbookMetrics {
    pub fn compute(snapshot: &OrderbookSnapshot) -> Option<Self> {
        let mid = snapshot.mid_price?;

        let bid_depth_5pct = depth_within(&snapshot.bids, mid, 0.05);
        let ask_depth_5pct = depth_within(&snapshot.asks, mid, 0.05);
        let bid_depth_10pct = depth_within(&snapshot.bids, mid, 0.10);
        let ask_depth_10pct = depth_within(&snapshot.asks, mid, 0.10);
        let bid_depth_top5: f64 = snapshot.bids.iter().take(5).map(|l| l.price * l.size).sum();
        let ask_depth_top5: f64 = snapshot.asks.iter().take(5).map(|l| l.price * l.size).sum();

        let total = bid_depth_10pct + ask_depth_10pct;
        let imbalance = if total > 0.0 {
            (bid_depth_10pct - ask_depth_10pct) / total
        } else {
            0.0
        };

        let (thin_side, thin_side_ratio) = if imbalance.abs() > 0.3 {
            if imbalance < 0.0 {
                let ratio = if ask_depth_10pct > 0.0 {
                    bid_depth_10pct / ask_depth_10pct
                } else {
                    0.0
                };
                (ThinSide::Bid, ratio)
            } else {
                let ratio = if bid_depth_10pct > 0.0 {
                    ask_depth_10pct / bid_depth_10pct
                } else {
                    0.0
                };
                (ThinSide::Ask, ratio)
            }
        } else {
            // Ambiguity at |imbalance| <= 0.3 resolved as `balanced` (SPEC_FULL §9).
            (ThinSide::Balanced, 1.0)
        };

        let depth_adequate = bid_depth_10pct >= 100.0 && ask_depth_10pct >= 100.0;

        Some(OrderbookMetrics {
            bid_depth_5pct,
            ask_depth_5pct,
            bid_depth_10pct,
            ask_depth_10pct,
            bid_depth_top5,
            ask_depth_top5,
            imbalance,
            thin_side,
            thin_side_ratio,
            depth_adequate,
        })
    }
}

/// Wallet profile, enriched on first sighting (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: Address,
    pub first_seen_at_ms: Option<i64>,
    pub first_seen_block: Option<u64>,
    pub tx_count: u64,
    pub trade_count: u64,
    pub markets_traded: u64,
    pub total_volume: f64,
    pub last_enriched_at_ms: i64,
    pub ttl_secs: u64,
}

impl WalletProfile {
    pub fn age_days(&self, now_ms: i64) -> Option<f64> {
        let first = self.first_seen_at_ms?;
        Some((now_ms - first) as f64 / 86_400_000.0)
    }

    pub fn is_new_account(&self, now_ms: i64) -> bool {
        self.age_days(now_ms).map(|d| d < 7.0).unwrap_or(true)
    }

    pub fn is_low_activity(&self) -> bool {
        self.trade_count < 10
    }
}

/// Signal strength bands for the composite score (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    None,
    Weak,
    Moderate,
    Strong,
    Extreme,
}

impl SignalStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            SignalStrength::Extreme
        } else if score >= 0.75 {
            SignalStrength::Strong
        } else if score >= 0.55 {
            SignalStrength::Moderate
        } else if score >= 0.35 {
            SignalStrength::Weak
        } else {
            SignalStrength::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    NoTrade,
    Hold,
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketSide {
    Yes,
    No,
}

/// Sizing recommendation attached to a decision (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sizing {
    pub target_size_usd: f64,
    pub target_size_shares: f64,
    pub kelly_raw: f64,
    pub kelly_adjusted: f64,
    pub clamp_tags: Vec<String>,
}

/// Immutable decision emitted by the Decision Service (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub timestamp_ms: i64,
    pub action: DecisionAction,
    pub side: Option<MarketSide>,
    pub target_price: Option<f64>,
    pub limit_price: Option<f64>,
    pub sizing: Option<Sizing>,
    pub target_size_usd: Option<f64>,
    pub scores: crate::scoring::Scores,
    pub features: crate::features::FeatureVector,
    pub approved: bool,
    pub rejection_reason: Option<String>,
    pub risk_checks_passed: Vec<String>,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub paper_mode: bool,
}
