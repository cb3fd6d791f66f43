#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use stratscan::domain::error::StratscanError;
pub use stratscan::domain::ohlcv::OhlcvBar;
use stratscan::domain::step::{CrossDirection, Direction, ExitStep, SetupStep, TriggerStep};
use stratscan::domain::strategy::Strategy;
use stratscan::domain::timeframe::{resample, Timeframe};
use stratscan::ports::bar_loader::BarSeriesLoader;
use stratscan::ports::result_sink::{ResultSink, SinkRecord};

/// In-memory daily bars; coarser timeframes are resampled on request.
pub struct MockBarLoader {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashSet<(String, Option<Timeframe>)>,
}

impl MockBarLoader {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashSet::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    /// Every load for `symbol` fails.
    pub fn with_error(mut self, symbol: &str) -> Self {
        self.errors.insert((symbol.to_string(), None));
        self
    }

    /// Loads for `symbol` at `timeframe` fail.
    pub fn with_timeframe_error(mut self, symbol: &str, timeframe: Timeframe) -> Self {
        self.errors.insert((symbol.to_string(), Some(timeframe)));
        self
    }
}

impl BarSeriesLoader for MockBarLoader {
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
        if self.errors.contains(&(symbol.to_string(), None))
            || self.errors.contains(&(symbol.to_string(), Some(timeframe)))
        {
            return Err(unavailable());
        }
        let daily: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .into_iter()
            .flatten()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect();
        let bars = if timeframe.is_daily() {
            daily
        } else {
            resample(&daily, timeframe.n_days())
        };
        if bars.is_empty() {
            return Err(unavailable());
        }
        Ok(bars)
    }
}

/// Counts rows handed to it per record type.
#[derive(Default)]
pub struct MemorySink {
    pub signals: Mutex<Vec<String>>,
    pub picks: Mutex<Vec<(String, usize, String)>>,
    pub backtests: Mutex<Vec<String>>,
}

impl ResultSink for MemorySink {
    fn persist(&self, record: SinkRecord<'_>) -> Result<usize, StratscanError> {
        match record {
            SinkRecord::Signals(signals) => {
                let mut rows = self.signals.lock().unwrap();
                rows.extend(signals.iter().map(|s| s.symbol.clone()));
                Ok(signals.len())
            }
            SinkRecord::RankedPicks {
                pick_type, picks, ..
            } => {
                let mut rows = self.picks.lock().unwrap();
                rows.extend(
                    picks
                        .iter()
                        .enumerate()
                        .map(|(i, s)| (pick_type.to_string(), i + 1, s.symbol.clone())),
                );
                Ok(picks.len())
            }
            SinkRecord::Backtest(result) => {
                self.backtests.lock().unwrap().push(result.symbol.clone());
                Ok(1)
            }
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// Consecutive daily bars starting at 2024-01-01 with the given closes.
pub fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = date(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            symbol: symbol.to_string(),
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        })
        .collect()
}

pub fn generate_bars(
    symbol: &str,
    start_date: &str,
    count: usize,
    start_price: f64,
) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| OhlcvBar {
            symbol: symbol.to_string(),
            date: start + chrono::Duration::days(i as i64),
            open: start_price + i as f64,
            high: start_price + i as f64 + 1.0,
            low: start_price + i as f64 - 1.0,
            close: start_price + i as f64,
            volume: 1000,
        })
        .collect()
}

/// Closes for which [`breakout_strategy`] buys on day 3 (106), exits on the
/// day 6 cross below 100 (99), buys again on day 8 (107) and is still long
/// at the day 9 close (110).
pub const BREAKOUT_CLOSES: [f64; 9] = [100.0, 104.0, 106.0, 108.0, 103.0, 99.0, 98.0, 107.0, 110.0];

/// Buys when the close crosses above 105, exits when it crosses below 100.
pub fn breakout_strategy() -> Strategy {
    Strategy::fixed(
        "breakout_105",
        "close crosses 105",
        SetupStep::None,
        TriggerStep::ThresholdCross {
            indicator: "close".into(),
            value: 105.0,
            direction: Direction::Above,
        },
        ExitStep::IndicatorCross {
            indicator: "close".into(),
            direction: CrossDirection::Down,
            value: Some(100.0),
            indicator2: None,
        },
    )
    .unwrap()
}

pub const BREAKOUT_JSON: &str = r#"{
    "name": "breakout_105",
    "description": "close crosses 105",
    "definition": {
        "fixed": {
            "setup": {"type": "NONE"},
            "trigger": {"type": "THRESHOLD_CROSS", "indicator": "close", "value": 105.0, "direction": "ABOVE"},
            "exit": {"type": "INDICATOR_CROSS", "indicator": "close", "direction": "DOWN", "value": 100.0}
        }
    }
}"#;
