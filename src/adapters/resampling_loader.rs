//! Derives N-day bars from a daily loader.

use crate::domain::error::StratscanError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::timeframe::{resample_anchored, Timeframe};
use crate::ports::bar_loader::BarSeriesLoader;
use chrono::{Duration, NaiveDate};
use tracing::debug;

/// Wraps a daily [`BarSeriesLoader`]; daily requests pass straight through,
/// anything coarser is resampled into calendar buckets anchored at
/// 1970-01-01. A bucket is dated by its last daily bar, so the newest bucket
/// may be partial but never reaches past `end`.
pub struct ResamplingLoader<L> {
    inner: L,
    anchor: NaiveDate,
}

impl<L: BarSeriesLoader> ResamplingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            anchor: NaiveDate::default(),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// First day of the bucket containing `date`.
    fn bucket_start(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let n = i64::from(n.max(1));
        let offset = (date - self.anchor).num_days().rem_euclid(n);
        date - Duration::days(offset)
    }
}

impl<L: BarSeriesLoader> BarSeriesLoader for ResamplingLoader<L> {
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StratscanError> {
        if timeframe.is_daily() {
            return self.inner.load(symbol, timeframe, start, end);
        }
        let n = timeframe.n_days();
        let unavailable = || StratscanError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe,
        };

        // widen so the first bucket holds all of its days
        let daily_start = self.bucket_start(start, n);
        let daily = match self.inner.load(symbol, Timeframe::DAILY, daily_start, end) {
            Ok(bars) => bars,
            Err(StratscanError::DataUnavailable { .. }) => return Err(unavailable()),
            Err(e) => return Err(e),
        };

        let bars: Vec<OhlcvBar> = resample_anchored(&daily, n, self.anchor)
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect();
        debug!(
            symbol,
            timeframe = %timeframe,
            daily = daily.len(),
            resampled = bars.len(),
            "resampled bars"
        );
        if bars.is_empty() {
            return Err(unavailable());
        }
        Ok(bars)
    }
}
