//! Annotated bar series for one (symbol, timeframe).
//!
//! A [`Frame`] owns the bars plus a set of named, typed columns with exactly
//! one entry per bar. Indicators, pattern flags and step outputs all live
//! here; price fields (`open`, `high`, `low`, `close`, `volume`) are read
//! straight from the bars.

use crate::domain::error::StratscanError;
use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::pattern;
use crate::domain::timeframe::Timeframe;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const SETUP_VALID: &str = "setup_valid";
pub const SIGNAL: &str = "signal";
pub const EXIT_SIGNAL: &str = "exit_signal";
pub const STOP_LOSS_PRICE: &str = "stop_loss_price";
pub const TAKE_PROFIT_PRICE: &str = "take_profit_price";
pub const TRAILING_STOP_PRICE: &str = "trailing_stop_price";

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitSignal {
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<Option<f64>>),
    Flag(Vec<Option<bool>>),
    Signal(Vec<Option<Signal>>),
    Exit(Vec<Option<ExitSignal>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Flag(v) => v.len(),
            Column::Signal(v) => v.len(),
            Column::Exit(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gathers rows by index; `None` yields a null row.
    fn gather(&self, rows: &[Option<usize>]) -> Column {
        fn pick<T: Copy>(src: &[Option<T>], rows: &[Option<usize>]) -> Vec<Option<T>> {
            rows.iter().map(|r| r.and_then(|i| src[i])).collect()
        }
        match self {
            Column::Float(v) => Column::Float(pick(v, rows)),
            Column::Flag(v) => Column::Flag(pick(v, rows)),
            Column::Signal(v) => Column::Signal(pick(v, rows)),
            Column::Exit(v) => Column::Exit(pick(v, rows)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<OhlcvBar>,
    columns: BTreeMap<String, Column>,
    date_index: HashMap<NaiveDate, usize>,
}

impl Frame {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<OhlcvBar>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            symbol: symbol.into(),
            timeframe,
            bars,
            columns: BTreeMap::new(),
            date_index,
        }
    }

    /// Bars enriched with the standard indicator set and every pattern flag.
    pub fn prepared(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<OhlcvBar>) -> Self {
        let mut frame = Self::new(symbol, timeframe, bars);
        for indicator in crate::domain::indicator::standard_indicators() {
            frame.ensure_indicator(indicator);
        }
        for (name, flags) in pattern::detect_all(&frame.bars) {
            frame
                .columns
                .insert(name.to_string(), Column::Flag(flags.into_iter().map(Some).collect()));
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.bars.iter().map(|b| b.date)
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name) || PRICE_COLUMNS.contains(&name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), StratscanError> {
        if column.len() != self.len() {
            return Err(StratscanError::ColumnLength {
                column: name.to_string(),
                expected: self.len(),
                actual: column.len(),
            });
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    /// Computes and attaches `indicator` unless all its columns already exist.
    pub fn ensure_indicator(&mut self, indicator: IndicatorType) {
        let names = indicator.column_names();
        if names.iter().all(|n| self.columns.contains_key(n)) {
            return;
        }
        for (name, values) in indicator.calculate(&self.bars).into_columns() {
            self.columns.insert(name, Column::Float(values));
        }
    }

    /// Makes a numeric column available, computing it if it names a known
    /// indicator.
    pub fn ensure_column(&mut self, name: &str) -> Result<(), StratscanError> {
        if self.has_column(name) {
            return Ok(());
        }
        match IndicatorType::for_column(name) {
            Some(indicator) => {
                self.ensure_indicator(indicator);
                // `rsi_14` resolves to the default-named `rsi` column
                if !self.columns.contains_key(name) {
                    if let [canonical] = indicator.column_names().as_slice() {
                        if let Some(col) = self.columns.get(canonical).cloned() {
                            self.columns.insert(name.to_string(), col);
                        }
                    }
                }
                Ok(())
            }
            None => Err(StratscanError::MissingColumn {
                column: name.to_string(),
            }),
        }
    }

    /// Numeric view of a price or float column.
    pub fn floats(&self, name: &str) -> Result<Vec<Option<f64>>, StratscanError> {
        let price = |f: fn(&OhlcvBar) -> f64| -> Vec<Option<f64>> {
            self.bars.iter().map(|b| Some(f(b))).collect()
        };
        match name {
            "open" => Ok(price(|b| b.open)),
            "high" => Ok(price(|b| b.high)),
            "low" => Ok(price(|b| b.low)),
            "close" => Ok(price(|b| b.close)),
            "volume" => Ok(price(|b| b.volume as f64)),
            _ => match self.columns.get(name) {
                Some(Column::Float(v)) => Ok(v.clone()),
                _ => Err(StratscanError::MissingColumn {
                    column: name.to_string(),
                }),
            },
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn flags(&self, name: &str) -> Result<&[Option<bool>], StratscanError> {
        match self.columns.get(name) {
            Some(Column::Flag(v)) => Ok(v),
            _ => Err(StratscanError::MissingColumn {
                column: name.to_string(),
            }),
        }
    }

    pub fn signals(&self) -> Result<&[Option<Signal>], StratscanError> {
        match self.columns.get(SIGNAL) {
            Some(Column::Signal(v)) => Ok(v),
            _ => Err(StratscanError::MissingColumn {
                column: SIGNAL.to_string(),
            }),
        }
    }

    pub fn exit_signals(&self) -> Result<&[Option<ExitSignal>], StratscanError> {
        match self.columns.get(EXIT_SIGNAL) {
            Some(Column::Exit(v)) => Ok(v),
            _ => Err(StratscanError::MissingColumn {
                column: EXIT_SIGNAL.to_string(),
            }),
        }
    }

    /// `setup_valid` at row `i`, treating nulls and a missing column as false.
    pub fn setup_valid_at(&self, i: usize) -> bool {
        self.flags(SETUP_VALID)
            .ok()
            .and_then(|v| v.get(i).copied().flatten())
            .unwrap_or(false)
    }

    pub fn signal_at(&self, i: usize) -> Signal {
        self.signals()
            .ok()
            .and_then(|v| v.get(i).copied().flatten())
            .unwrap_or(Signal::Hold)
    }

    /// For each row, the index of the most recent `other` row dated on or
    /// before it.
    pub fn asof_rows(&self, other: &Frame) -> Vec<Option<usize>> {
        let mut rows = Vec::with_capacity(self.len());
        let mut j = 0usize;
        let mut last: Option<usize> = None;
        for bar in &self.bars {
            while j < other.bars.len() && other.bars[j].date <= bar.date {
                last = Some(j);
                j += 1;
            }
            rows.push(last);
        }
        rows
    }

    /// Backward as-of join of `columns` from `other` onto this frame.
    ///
    /// Columns already present here are left untouched. Returns the names that
    /// were actually attached.
    pub fn merge_asof(&mut self, other: &Frame, columns: &[String]) -> Vec<String> {
        let rows = self.asof_rows(other);
        let mut attached = Vec::new();
        for name in columns {
            if self.has_column(name) {
                continue;
            }
            if let Some(col) = other.columns.get(name) {
                self.columns.insert(name.clone(), col.gather(&rows));
                attached.push(name.clone());
            }
        }
        attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_bar(date: NaiveDate, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "BHP".into(),
            date,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn daily(days: &[u32]) -> Frame {
        let bars = days.iter().map(|&day| make_bar(d(day), 100.0 + day as f64)).collect();
        Frame::new("BHP", Timeframe::DAILY, bars)
    }

    #[test]
    fn new_builds_date_index() {
        let frame = daily(&[1, 2, 3]);
        assert_eq!(frame.get_bar_index(d(2)), Some(1));
        assert_eq!(frame.get_bar_index(d(5)), None);
    }

    #[test]
    fn set_column_checks_length() {
        let mut frame = daily(&[1, 2]);
        let err = frame
            .set_column("x", Column::Float(vec![Some(1.0)]))
            .unwrap_err();
        assert!(matches!(err, StratscanError::ColumnLength { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn price_columns_are_implicit() {
        let frame = daily(&[1, 2]);
        assert!(frame.has_column("close"));
        assert_eq!(frame.floats("close").unwrap(), vec![Some(101.0), Some(102.0)]);
        assert!(matches!(
            frame.floats("nope"),
            Err(StratscanError::MissingColumn { .. })
        ));
    }

    #[test]
    fn ensure_column_computes_known_indicators() {
        let mut frame = daily(&[1, 2, 3, 4]);
        frame.ensure_column("sma_2").unwrap();
        let sma = frame.floats("sma_2").unwrap();
        assert_eq!(sma[0], None);
        assert_eq!(sma[3], Some(103.5));
        assert!(frame.ensure_column("setup_valid").is_err());
    }

    #[test]
    fn ensure_column_aliases_default_period_names() {
        let mut frame = daily(&[1, 2, 3, 4]);
        frame.ensure_column("atr_14").unwrap();
        assert!(frame.has_column("atr"));
        assert_eq!(frame.floats("atr_14").unwrap(), frame.floats("atr").unwrap());
    }

    #[test]
    fn prepared_frame_has_standard_columns() {
        let frame = Frame::prepared("BHP", Timeframe::DAILY, daily(&[1, 2, 3]).bars);
        for name in ["rsi", "sma_20", "sma_200", "ema_12", "macd", "bb_upper", "atr", "stoch_k", "hammer", "green_candle"] {
            assert!(frame.has_column(name), "missing {name}");
        }
    }

    #[test]
    fn setup_valid_defaults_to_false() {
        let mut frame = daily(&[1, 2]);
        assert!(!frame.setup_valid_at(0));
        frame
            .set_column(SETUP_VALID, Column::Flag(vec![None, Some(true)]))
            .unwrap();
        assert!(!frame.setup_valid_at(0));
        assert!(frame.setup_valid_at(1));
        assert_eq!(frame.signal_at(1), Signal::Hold);
    }

    #[test]
    fn merge_asof_takes_latest_prior_value() {
        let mut base = daily(&[1, 2, 3, 4, 5, 6]);
        let mut higher = Frame::new(
            "BHP",
            Timeframe::days(3),
            vec![make_bar(d(3), 103.0), make_bar(d(6), 106.0)],
        );
        higher
            .set_column("trend", Column::Float(vec![Some(1.0), Some(2.0)]))
            .unwrap();

        let attached = base.merge_asof(&higher, &["trend".to_string()]);
        assert_eq!(attached, vec!["trend".to_string()]);
        assert_eq!(
            base.floats("trend").unwrap(),
            vec![None, None, Some(1.0), Some(1.0), Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn merge_asof_never_overwrites() {
        let mut base = daily(&[1, 2]);
        base.set_column("trend", Column::Float(vec![Some(9.0), Some(9.0)]))
            .unwrap();
        let mut higher = daily(&[1, 2]);
        higher
            .set_column("trend", Column::Float(vec![Some(1.0), Some(1.0)]))
            .unwrap();
        assert!(base.merge_asof(&higher, &["trend".to_string()]).is_empty());
        assert_eq!(base.floats("trend").unwrap(), vec![Some(9.0), Some(9.0)]);
    }

    proptest! {
        #[test]
        fn asof_never_looks_ahead(
            base_days in prop::collection::btree_set(0i64..200, 1..60),
            other_days in prop::collection::btree_set(0i64..200, 0..60),
        ) {
            let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
            let mk = |days: &std::collections::BTreeSet<i64>| -> Vec<OhlcvBar> {
                days.iter().map(|o| make_bar(start + chrono::Duration::days(*o), 1.0)).collect()
            };
            let base = Frame::new("P", Timeframe::DAILY, mk(&base_days));
            let other = Frame::new("P", Timeframe::days(5), mk(&other_days));
            let rows = base.asof_rows(&other);
            for (i, row) in rows.iter().enumerate() {
                let base_date = base.bars[i].date;
                match row {
                    Some(j) => {
                        prop_assert!(other.bars[*j].date <= base_date);
                        if let Some(next) = other.bars.get(j + 1) {
                            prop_assert!(next.date > base_date);
                        }
                    }
                    None => prop_assert!(other.bars.iter().all(|b| b.date > base_date)),
                }
            }
        }
    }
}
