//! Monotonic-ish wall clock and per-(kind, entity) freshness tracking (§4.1).

use std::sync::Arc;

use parking_lot::RwLock;
use std::collections::HashMap;

/// Source of "now", injected so tests can advance time deterministically
/// instead of reading `SystemTime::now()` directly.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Fixed/advanceable clock for tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Arc<RwLock<i64>>,
}

impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(RwLock::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, delta: i64) {
        *self.now.write() += delta;
    }

    pub fn set_ms(&self, value: i64) {
        *self.now.write() = value;
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        *self.now.read()
    }
}

/// The four freshness-tracked data kinds (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Orderbook,
    Trade,
    Market,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Warning,
    Stale,
    Critical,
}

impl Freshness {
    /// "trade-safe" per §4.1: fresh or warning only.
    pub fn is_trade_safe(&self) -> bool {
        matches!(self, Freshness::Fresh | Freshness::Warning)
    }
}

struct Thresholds {
    warning: i64,
    stale: i64,
    critical: i64,
}

fn thresholds(kind: DataKind) -> Thresholds {
    match kind {
        DataKind::Orderbook => Thresholds {
            warning: 2000,
            stale: 5000,
            critical: 10_000,
        },
        DataKind::Trade => Thresholds {
            warning: 5000,
            stale: 10_000,
            critical: 30_000,
        },
        DataKind::Market => Thresholds {
            warning: 60_000,
            stale: 300_000,
            critical: 600_000,
        },
        DataKind::Wallet => Thresholds {
            warning: 3_600_000,
            stale: 7_200_000,
            critical: 21_600_000,
        },
    }
}

fn classify(age_ms: i64, kind: DataKind) -> Freshness {
    let t = thresholds(kind);
    if age_ms < t.warning {
        Freshness::Fresh
    } else if age_ms < t.stale {
        Freshness::Warning
    } else if age_ms < t.critical {
        Freshness::Stale
    } else {
        Freshness::Critical
    }
}

/// Records `lastUpdate(kind, entity) = nowMs` with a 1h TTL on each write
/// (§4.1). The KV-store keyspace entry is `staleness:{service}:{entity}:last_update`;
/// this tracker keeps an in-process mirror for hot-path freshness checks so
/// the Decision Service doesn't round-trip through the store per gate check.
pub struct StalenessTracker {
    clock: Arc<dyn Clock>,
    last_update: RwLock<HashMap<(DataKind, String), i64>>,
}

const TTL_MS: i64 = 3_600_000;

impl StalenessTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_update: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, kind: DataKind, entity: &str) {
        let now = self.clock.now_ms();
        self.record_at(kind, entity, now);
    }

    /// Like `record`, but stamped with a caller-supplied timestamp rather
    /// than the clock's own "now" (the trade-poll job records freshness at
    /// the latest trade's own timestamp, not the poll time, §4.8).
    pub fn record_at(&self, kind: DataKind, entity: &str, at_ms: i64) {
        self.last_update
            .write()
            .insert((kind, entity.to_string()), at_ms);
    }

    /// Age in ms since the last record, or `None` if never recorded or the
    /// record expired past its 1h TTL.
    pub fn age_ms(&self, kind: DataKind, entity: &str) -> Option<i64> {
        let now = self.clock.now_ms();
        let guard = self.last_update.read();
        let last = *guard.get(&(kind, entity.to_string()))?;
        let age = now - last;
        if age > TTL_MS {
            None
        } else {
            Some(age)
        }
    }

    pub fn status(&self, kind: DataKind, entity: &str) -> Option<Freshness> {
        self.age_ms(kind, entity).map(|age| classify(age, kind))
    }
}

/// Combined freshness verdict for a token, used by the Decision Service
/// (§4.1 "For a token, checkFreshness combines...").
#[derive(Debug, Clone)]
pub struct TokenFreshness {
    pub orderbook: Option<Freshness>,
    pub trade: Option<Freshness>,
    pub market_present: bool,
}

impl TokenFreshness {
    /// Orderbook is required; trade is only a problem if present and beyond
    /// its threshold; market metadata must simply exist.
    pub fn is_data_complete(&self) -> bool {
        self.orderbook.is_some() && self.market_present
    }

    pub fn is_data_stale(&self) -> bool {
        let orderbook_stale = match self.orderbook {
            None => true,
            Some(f) => !f.is_trade_safe(),
        };
        // Trade freshness only disqualifies when a trade has actually been
        // seen for this token and its own staleness has crossed threshold;
        // a quiet token with no recent trades is not "trade-stale".
        let trade_stale = match self.trade {
            None => false,
            Some(f) => !f.is_trade_safe(),
        };
        orderbook_stale || trade_stale
    }
}

impl StalenessTracker {
    pub fn check_freshness(&self, token_id: &str) -> TokenFreshness {
        TokenFreshness {
            orderbook: self.status(DataKind::Orderbook, token_id),
            trade: self.status(DataKind::Trade, token_id),
            market_present: self.age_ms(DataKind::Market, token_id).is_some(),
        }
    }
}
