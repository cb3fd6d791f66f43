//! CSV file bar adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a
//! `date,open,high,low,close,volume` header. Files hold daily bars only;
//! wrap in [`ResamplingLoader`](super::resampling_loader::ResamplingLoader)
//! for N-day timeframes.

use crate::domain::error::StratscanError;
use crate::domain::ohlcv::{normalize_bars, OhlcvBar};
use crate::domain::timeframe::Timeframe;
use crate::ports::bar_loader::BarSeriesLoader;
use crate::ports::config_port::ConfigPort;
use crate::ports::symbol_directory::SymbolDirectory;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratscanError> {
        let dir = config
            .get_string("data", "csv_dir")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| StratscanError::ConfigMissing {
                section: "data".into(),
                key: "csv_dir".into(),
            })?;
        Ok(Self::new(dir.trim()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Every bar in the symbol's file, ascending and deduplicated.
    pub fn read_all(&self, symbol: &str) -> Result<Vec<OhlcvBar>, StratscanError> {
        let path = self.csv_path(symbol);
        if !path.is_file() {
            return Err(StratscanError::DataUnavailable {
                symbol: symbol.to_string(),
                timeframe: Timeframe::DAILY,
            });
        }
        let source_name = path.display().to_string();
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| StratscanError::DataFormat {
                source_name: source_name.clone(),
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = result.map_err(|e| StratscanError::DataFormat {
                source_name: source_name.clone(),
                reason: format!("row {}: {e}", line + 1),
            })?;
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume.round() as i64,
            });
        }
        Ok(normalize_bars(bars))
    }
}

impl BarSeriesLoader for CsvAdapter {
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
        let bars: Vec<OhlcvBar> = self
            .read_all(symbol)?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect();
        if bars.is_empty() {
            return Err(unavailable());
        }
        Ok(bars)
    }
}

impl SymbolDirectory for CsvAdapter {
    fn active_symbols(&self) -> Result<BTreeSet<String>, StratscanError> {
        let entries = fs::read_dir(&self.base_path)?;
        let mut symbols = BTreeSet::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.insert(stem.to_string());
            }
        }
        Ok(symbols)
    }
}
