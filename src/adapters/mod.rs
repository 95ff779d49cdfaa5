//! External adapter traits (§6): the upstream collaborators this crate
//! depends on but does not implement a concrete transport for (§1 scope
//! line — "concrete HTTP/WebSocket client code... out of scope"). Each
//! feed is an `async_trait` so the Collector and Wallet Enricher can be
//! exercised against an in-memory fake without any network stack.
//!
//! Raw shapes below are grounded on the teacher's `scrapers::polymarket_gamma`
//! (string-or-array outcome/clobTokenId fields, string-or-number numeric
//! fields) and `scrapers::polymarket_api` (string-encoded price/size levels)
//! parsing conventions, generalized behind `Result<_, AdapterError>` instead
//! of `anyhow::Result` so the queue runtime can match on error kind (§7).

pub mod signing;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::AdapterError;
use crate::models::RawTrade;

fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Array(arr) => arr
            .into_iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => serde_json::from_str::<Vec<String>>(&s).unwrap_or_default(),
        _ => Vec::new(),
    })
}

fn de_string_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Raw shape of one market-feed page entry (§6). Pagination limit 100,
/// safety cap 5000 items total, enforced by the caller in `collector.rs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub question: String,
    #[serde(rename = "endDateIso", alias = "endDate")]
    pub end_date_iso: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, deserialize_with = "de_string_f64")]
    pub volume: f64,
    #[serde(default, deserialize_with = "de_string_f64")]
    pub liquidity: f64,
    #[serde(deserialize_with = "de_string_vec")]
    pub outcomes: Vec<String>,
    #[serde(rename = "outcomePrices", default, deserialize_with = "de_string_vec")]
    pub outcome_prices: Vec<String>,
    #[serde(rename = "clobTokenIds", deserialize_with = "de_string_vec")]
    pub clob_token_ids: Vec<String>,
    #[serde(rename = "negRisk", default)]
    pub neg_risk: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Raw price level with string-encoded price/size (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

impl RawLevel {
    pub fn parsed(&self) -> Option<crate::models::Level> {
        Some(crate::models::Level {
            price: self.price.parse().ok()?,
            size: self.size.parse().ok()?,
        })
    }
}

/// Raw orderbook feed response (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderbook {
    #[serde(default)]
    pub market: Option<String>,
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Account facts from the block explorer, used by the Wallet Enricher
/// (§4.9): first tx (ascending block), total tx count, balance, contract
/// flag.
#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    pub first_tx_block: Option<u64>,
    pub first_tx_timestamp_ms: Option<i64>,
    pub tx_count: u64,
    pub balance_wei: u128,
    pub is_contract: bool,
}

/// Page-based market list (§6). Implementors paginate upstream; this trait
/// exposes one page at a time so the Collector controls the safety cap.
#[async_trait]
pub trait MarketsFeed: Send + Sync {
    async fn list_markets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawMarket>, AdapterError>;
}

/// Current orderbook for one token (§6).
#[async_trait]
pub trait OrderbookFeed: Send + Sync {
    async fn fetch_orderbook(&self, token_id: &str) -> Result<RawOrderbook, AdapterError>;
}

/// Recent public trades for one token, no auth required (§6).
#[async_trait]
pub trait TradeFeed: Send + Sync {
    async fn fetch_trades(&self, token_id: &str) -> Result<Vec<RawTrade>, AdapterError>;
}

/// On-chain account lookups (§4.9, §6).
#[async_trait]
pub trait BlockExplorer: Send + Sync {
    async fn account_info(&self, address: &str) -> Result<AccountInfo, AdapterError>;
}

/// In-memory fakes, seeded by tests; no network stack anywhere in this
/// crate (§1, §9).
pub mod fakes {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeMarketsFeed {
        pub pages: Mutex<Vec<Vec<RawMarket>>>,
    }

    #[async_trait]
    impl MarketsFeed for FakeMarketsFeed {
        async fn list_markets(
            &self,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<RawMarket>, AdapterError> {
            let pages = self.pages.lock();
            let page_index = offset / limit.max(1);
            Ok(pages.get(page_index).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct FakeOrderbookFeed {
        pub books: Mutex<HashMap<String, RawOrderbook>>,
    }

    #[async_trait]
    impl OrderbookFeed for FakeOrderbookFeed {
        async fn fetch_orderbook(&self, token_id: &str) -> Result<RawOrderbook, AdapterError> {
            self.books
                .lock()
                .get(token_id)
                .cloned()
                .ok_or_else(|| AdapterError::Transport(format!("no book for {token_id}")))
        }
    }

    #[derive(Default)]
    pub struct FakeTradeFeed {
        pub trades: Mutex<HashMap<String, Vec<RawTrade>>>,
    }

    #[async_trait]
    impl TradeFeed for FakeTradeFeed {
        async fn fetch_trades(&self, token_id: &str) -> Result<Vec<RawTrade>, AdapterError> {
            Ok(self.trades.lock().get(token_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct FakeBlockExplorer {
        pub accounts: Mutex<HashMap<String, AccountInfo>>,
        pub fail_for: Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl BlockExplorer for FakeBlockExplorer {
        async fn account_info(&self, address: &str) -> Result<AccountInfo, AdapterError> {
            if self.fail_for.lock().contains(address) {
                return Err(AdapterError::Timeout);
            }
            self.accounts
                .lock()
                .get(address)
                .copied()
                .ok_or_else(|| AdapterError::Transport(format!("unknown account {address}")))
        }
    }
}
