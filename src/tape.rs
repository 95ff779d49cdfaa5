//! Tabular trade persistence (§4.8: "optionally persists new trades to a
//! tabular store idempotently keyed on `(tradeId, time)`"). SQLite via
//! `rusqlite`, matching the teacher's choice of an embedded database for
//! durable local state rather than an external service.

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::models::{Side, Trade};

pub struct TradeTape {
    conn: Mutex<Connection>,
}

impl TradeTape {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                token_id TEXT NOT NULL,
                side TEXT NOT NULL,
                price REAL NOT NULL,
                size REAL NOT NULL,
                maker_address TEXT NOT NULL,
                taker_address TEXT NOT NULL,
                transaction_hash TEXT,
                PRIMARY KEY (trade_id, timestamp_ms)
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::open(":memory:")
    }

    /// `INSERT OR IGNORE` on the composite primary key makes repeated polls
    /// of the same trade a no-op rather than an error (§4.8, §8).
    pub fn record(&self, trade: &Trade) -> anyhow::Result<()> {
        let side = match trade.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO trades
                (trade_id, timestamp_ms, token_id, side, price, size, maker_address, taker_address, transaction_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trade.trade_id,
                trade.timestamp_ms,
                trade.token_id,
                side,
                trade.price,
                trade.size,
                trade.maker_address.as_str(),
                trade.taker_address.as_str(),
                trade.transaction_hash,
            ],
        )?;
        Ok(())
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Address;

    fn trade(id: &str, ts: i64) -> Trade {
        Trade {
            trade_id: id.to_string(),
            token_id: "tok".into(),
            timestamp_ms: ts,
            side: Side::Buy,
            price: 0.5,
            size: 10.0,
            maker_address: Address::new(""),
            taker_address: Address::new("0xabc"),
            fee_rate_bps: None,
            transaction_hash: None,
        }
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let tape = TradeTape::in_memory().unwrap();
        tape.record(&trade("t1", 1000)).unwrap();
        tape.record(&trade("t1", 1000)).unwrap();
        assert_eq!(tape.count().unwrap(), 1);
    }

    #[test]
    fn distinct_trades_both_persist() {
        let tape = TradeTape::in_memory().unwrap();
        tape.record(&trade("t1", 1000)).unwrap();
        tape.record(&trade("t2", 1001)).unwrap();
        assert_eq!(tape.count().unwrap(), 2);
    }
}
