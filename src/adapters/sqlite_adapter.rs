//! SQLite adapter: result sink plus an optional daily bar store.
//!
//! Every write is `INSERT OR REPLACE` keyed on the record's natural key, so
//! re-running a scan or backtest overwrites rather than duplicates.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::StratscanError;
use crate::domain::frame::Signal;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::scanner::SignalResult;
use crate::domain::timeframe::Timeframe;
use crate::ports::bar_loader::BarSeriesLoader;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_sink::{ResultSink, SinkRecord};
use crate::ports::symbol_directory::SymbolDirectory;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::BTreeSet;
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ohlcv (
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        PRIMARY KEY (symbol, date)
    );
    CREATE TABLE IF NOT EXISTS daily_signals (
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        strategy_name TEXT NOT NULL,
        signal TEXT NOT NULL,
        price REAL NOT NULL,
        setup_valid INTEGER NOT NULL,
        trigger_met INTEGER NOT NULL,
        confidence REAL NOT NULL,
        metadata TEXT NOT NULL,
        PRIMARY KEY (symbol, date, strategy_name)
    );
    CREATE TABLE IF NOT EXISTS top_picks (
        scan_date TEXT NOT NULL,
        pick_type TEXT NOT NULL,
        rank INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        strategy_name TEXT NOT NULL,
        signal TEXT NOT NULL,
        price REAL NOT NULL,
        confidence REAL NOT NULL,
        ranking_score REAL,
        metadata TEXT NOT NULL,
        PRIMARY KEY (scan_date, pick_type, rank)
    );
    CREATE TABLE IF NOT EXISTS backtest_runs (
        symbol TEXT NOT NULL,
        strategy_name TEXT NOT NULL,
        initial_capital REAL NOT NULL,
        final_capital REAL NOT NULL,
        total_trades INTEGER NOT NULL,
        win_rate REAL NOT NULL,
        total_return_pct REAL NOT NULL,
        max_drawdown_pct REAL NOT NULL,
        sharpe_ratio REAL NOT NULL,
        result TEXT NOT NULL,
        PRIMARY KEY (symbol, strategy_name)
    );
    CREATE INDEX IF NOT EXISTS idx_daily_signals_date ON daily_signals(date);";

fn pool_err(e: r2d2::Error) -> StratscanError {
    StratscanError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> StratscanError {
    StratscanError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn signal_label(signal: Signal) -> &'static str {
    match signal {
        Signal::Buy => "BUY",
        Signal::Sell => "SELL",
        Signal::Hold => "HOLD",
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratscanError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StratscanError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(db_path.trim());
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Single-connection pool; an in-memory database lives per connection.
    pub fn in_memory() -> Result<Self, StratscanError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StratscanError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), StratscanError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_bars(&self, bars: &[OhlcvBar]) -> Result<usize, StratscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    date_text(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    /// Row count of one of the adapter's tables.
    pub fn count_rows(&self, table: &str) -> Result<usize, StratscanError> {
        let table = match table {
            "ohlcv" | "daily_signals" | "top_picks" | "backtest_runs" => table,
            other => {
                return Err(StratscanError::DatabaseQuery {
                    reason: format!("unknown table '{other}'"),
                })
            }
        };
        let count: i64 = self
            .conn()?
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }

    fn persist_signals(&self, signals: &[SignalResult]) -> Result<usize, StratscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for s in signals {
            let metadata = serde_json::to_string(&s.metadata)?;
            tx.execute(
                "INSERT OR REPLACE INTO daily_signals
                 (symbol, date, strategy_name, signal, price, setup_valid, trigger_met, confidence, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    s.symbol,
                    date_text(s.date),
                    s.metadata.strategy_name,
                    signal_label(s.signal),
                    s.price,
                    s.setup_valid,
                    s.trigger_met,
                    s.confidence,
                    metadata
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(signals.len())
    }

    /// Replaces the whole (scan_date, pick_type) slate so a shorter re-run
    /// leaves no stale ranks behind.
    fn persist_picks(
        &self,
        scan_date: NaiveDate,
        pick_type: &str,
        picks: &[SignalResult],
    ) -> Result<usize, StratscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let scan_date = date_text(scan_date);
        tx.execute(
            "DELETE FROM top_picks WHERE scan_date = ?1 AND pick_type = ?2",
            params![scan_date, pick_type],
        )
        .map_err(query_err)?;
        for (idx, s) in picks.iter().enumerate() {
            let metadata = serde_json::to_string(&s.metadata)?;
            tx.execute(
                "INSERT OR REPLACE INTO top_picks
                 (scan_date, pick_type, rank, symbol, strategy_name, signal, price, confidence, ranking_score, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    scan_date,
                    pick_type,
                    (idx + 1) as i64,
                    s.symbol,
                    s.metadata.strategy_name,
                    signal_label(s.signal),
                    s.price,
                    s.confidence,
                    s.metadata.ranking_score,
                    metadata
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(picks.len())
    }

    fn persist_backtest(&self, result: &BacktestResult) -> Result<usize, StratscanError> {
        let json = serde_json::to_string(result)?;
        let m = &result.metrics;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO backtest_runs
                 (symbol, strategy_name, initial_capital, final_capital, total_trades, win_rate,
                  total_return_pct, max_drawdown_pct, sharpe_ratio, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    result.symbol,
                    result.strategy_name,
                    result.initial_capital,
                    result.final_capital,
                    m.total_trades as i64,
                    m.win_rate,
                    m.total_return_pct,
                    m.max_drawdown_pct,
                    m.sharpe_ratio,
                    json
                ],
            )
            .map_err(query_err)
    }
}

impl ResultSink for SqliteAdapter {
    fn persist(&self, record: SinkRecord<'_>) -> Result<usize, StratscanError> {
        let written = match record {
            SinkRecord::Signals(signals) => self.persist_signals(signals)?,
            SinkRecord::RankedPicks {
                scan_date,
                pick_type,
                picks,
            } => self.persist_picks(scan_date, pick_type, picks)?,
            SinkRecord::Backtest(result) => self.persist_backtest(result)?,
        };
        debug!(rows = written, "persisted to sqlite");
        Ok(written)
    }
}

impl BarSeriesLoader for SqliteAdapter {
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StratscanError> {
        let unavailable = || StratscanError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe,
        };
        if !timeframe.is_daily() {
            return Err(unavailable());
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, date_text(start), date_text(end)], |row| {
                let date_str: String = row.get(1)?;
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(OhlcvBar {
                    symbol: row.get(0)?,
                    date,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            })
            .map_err(query_err)?;

        let bars = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        if bars.is_empty() {
            return Err(unavailable());
        }
        Ok(bars)
    }
}

impl SymbolDirectory for SqliteAdapter {
    fn active_symbols(&self) -> Result<BTreeSet<String>, StratscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM ohlcv ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<BTreeSet<String>, _>>().map_err(query_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scanner::SignalMetadata;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn make_bar(symbol: &str, day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.into(),
            date: date(day),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    fn make_signal(symbol: &str, strategy: &str, confidence: f64) -> SignalResult {
        SignalResult {
            symbol: symbol.into(),
            date: date(20),
            signal: Signal::Buy,
            price: 10.0,
            setup_valid: true,
            trigger_met: true,
            confidence,
            metadata: SignalMetadata {
                strategy_name: strategy.into(),
                description: String::new(),
                timeframes: vec![Timeframe::DAILY],
                base_timeframe: Timeframe::DAILY,
                signal_date: date(19),
                ranking_score: Some(confidence + 0.4),
                pick_type: None,
                vote: None,
            },
        }
    }

    #[test]
    fn from_config_missing_path() {
        let result = SqliteAdapter::from_config(&EmptyConfig);
        assert!(
            matches!(result, Err(StratscanError::ConfigMissing { ref key, .. }) if key == "path")
        );
    }

    #[test]
    fn in_memory_initialization() {
        let adapter = adapter();
        assert_eq!(adapter.count_rows("daily_signals").unwrap(), 0);
        assert!(adapter.count_rows("users").is_err());
    }

    #[test]
    fn signals_upsert_is_idempotent() {
        let adapter = adapter();
        let signals = vec![make_signal("BHP", "rsi_momentum", 0.7), make_signal("CBA", "rsi_momentum", 0.9)];

        assert_eq!(adapter.persist(SinkRecord::Signals(&signals)).unwrap(), 2);
        assert_eq!(adapter.persist(SinkRecord::Signals(&signals)).unwrap(), 2);
        assert_eq!(adapter.count_rows("daily_signals").unwrap(), 2);

        let other = vec![make_signal("BHP", "golden_cross", 0.5)];
        adapter.persist(SinkRecord::Signals(&other)).unwrap();
        assert_eq!(adapter.count_rows("daily_signals").unwrap(), 3);
    }

    #[test]
    fn picks_replace_previous_slate() {
        let adapter = adapter();
        let picks = vec![
            make_signal("BHP", "s", 0.9),
            make_signal("CBA", "s", 0.8),
            make_signal("WBC", "s", 0.7),
        ];
        let record = SinkRecord::RankedPicks {
            scan_date: date(20),
            pick_type: "daily",
            picks: &picks,
        };
        adapter.persist(record).unwrap();
        adapter.persist(record).unwrap();
        assert_eq!(adapter.count_rows("top_picks").unwrap(), 3);

        adapter
            .persist(SinkRecord::RankedPicks {
                scan_date: date(20),
                pick_type: "daily",
                picks: &picks[..1],
            })
            .unwrap();
        assert_eq!(adapter.count_rows("top_picks").unwrap(), 1);

        adapter
            .persist(SinkRecord::RankedPicks {
                scan_date: date(20),
                pick_type: "short_term",
                picks: &picks,
            })
            .unwrap();
        assert_eq!(adapter.count_rows("top_picks").unwrap(), 4);
    }

    #[test]
    fn sqlite_load_returns_bars_in_range() {
        let adapter = adapter();
        adapter
            .insert_bars(&[
                make_bar("BHP", 17, 103.0),
                make_bar("BHP", 15, 101.0),
                make_bar("BHP", 16, 102.0),
                make_bar("CBA", 15, 50.0),
            ])
            .unwrap();

        let bars = adapter.load("BHP", Timeframe::DAILY, date(15), date(16)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(15));
        assert_eq!(bars[1].close, 102.0);

        let err = adapter.load("BHP", Timeframe::DAILY, date(20), date(25)).unwrap_err();
        assert!(matches!(err, StratscanError::DataUnavailable { .. }));
    }

    #[test]
    fn sqlite_active_symbols() {
        let adapter = adapter();
        adapter
            .insert_bars(&[make_bar("WBC", 15, 20.0), make_bar("BHP", 15, 101.0)])
            .unwrap();
        let symbols: Vec<String> = adapter.active_symbols().unwrap().into_iter().collect();
        assert_eq!(symbols, vec!["BHP", "WBC"]);
    }
}
