//! Sampling granularity and N-day resampling.
//!
//! A timeframe is written `"<N>d"`. Daily bars are grouped into calendar
//! buckets of N days counted from an anchor date; each bucket becomes one bar
//! with open = first, high = max, low = min, close = last, volume = sum.
//! The resampled bar carries the date of the last daily bar in its bucket,
//! which is the first date on which its close is known.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(u32);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeframeError {
    #[error("timeframe '{0}' must look like '<N>d'")]
    Malformed(String),

    #[error("timeframe must be at least 1d")]
    Zero,
}

impl Timeframe {
    pub const DAILY: Timeframe = Timeframe(1);

    /// N-day timeframe. Panics on zero; use [`try_days`](Self::try_days)
    /// for untrusted input.
    pub const fn days(n: u32) -> Self {
        assert!(n > 0, "timeframe must be at least 1d");
        Timeframe(n)
    }

    pub fn try_days(n: u32) -> Result<Self, TimeframeError> {
        if n == 0 { Err(TimeframeError::Zero) } else { Ok(Timeframe(n)) }
    }

    pub fn n_days(&self) -> u32 {
        self.0
    }

    pub fn is_daily(&self) -> bool {
        self.0 == 1
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::DAILY
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let digits = trimmed
            .strip_suffix('d')
            .ok_or_else(|| TimeframeError::Malformed(s.to_string()))?;
        let n: u32 = digits
            .parse()
            .map_err(|_| TimeframeError::Malformed(s.to_string()))?;
        Timeframe::try_days(n)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

/// Parses a comma separated list such as `"1d, 3d,5d"`.
pub fn parse_timeframes(input: &str) -> Result<Vec<Timeframe>, TimeframeError> {
    input.split(',').map(|t| t.parse()).collect()
}

/// Resamples daily bars into `n`-day buckets anchored at 1970-01-01.
pub fn resample(bars: &[OhlcvBar], n: u32) -> Vec<OhlcvBar> {
    resample_anchored(bars, n, NaiveDate::default())
}

/// Resamples daily bars into `n`-day buckets whose boundaries fall on
/// `anchor + k * n` days. Input must be ascending by date.
pub fn resample_anchored(bars: &[OhlcvBar], n: u32, anchor: NaiveDate) -> Vec<OhlcvBar> {
    let n = i64::from(n.max(1));
    let mut out: Vec<OhlcvBar> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for bar in bars {
        let bucket = (bar.date - anchor).num_days().div_euclid(n);
        match out.last_mut() {
            Some(agg) if current_bucket == Some(bucket) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.date = bar.date;
            }
            _ => {
                out.push(bar.clone());
                current_bucket = Some(bucket);
            }
        }
    }

    out
}
