//! Result persistence port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::StratscanError;
use crate::domain::scanner::SignalResult;
use chrono::NaiveDate;

/// One batch of results to persist.
#[derive(Debug, Clone, Copy)]
pub enum SinkRecord<'a> {
    /// Keyed by (symbol, date, strategy_name).
    Signals(&'a [SignalResult]),
    /// Keyed by (scan_date, pick_type, rank); rank is the 1-based position
    /// in `picks`.
    RankedPicks {
        scan_date: NaiveDate,
        pick_type: &'a str,
        picks: &'a [SignalResult],
    },
    /// Keyed by (symbol, strategy_name).
    Backtest(&'a BacktestResult),
}

pub trait ResultSink: Send + Sync {
    /// Upserts the record; writing the same record twice leaves the store
    /// unchanged. Returns the number of rows written.
    fn persist(&self, record: SinkRecord<'_>) -> Result<usize, StratscanError>;
}

impl<T: ResultSink + ?Sized> ResultSink for Box<T> {
    fn persist(&self, record: SinkRecord<'_>) -> Result<usize, StratscanError> {
        (**self).persist(record)
    }
}
