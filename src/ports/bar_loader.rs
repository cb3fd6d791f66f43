//! Bar series access port.

use crate::domain::error::StratscanError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::timeframe::Timeframe;
use chrono::NaiveDate;

pub trait BarSeriesLoader: Send + Sync {
    /// Bars for `symbol` at `timeframe` dated within `start..=end`, ascending
    /// and one per date.
    ///
    /// An empty range is [`StratscanError::DataUnavailable`], never an empty
    /// vector.
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StratscanError>;
}

impl<T: BarSeriesLoader + ?Sized> BarSeriesLoader for Box<T> {
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StratscanError> {
        (**self).load(symbol, timeframe, start, end)
    }
}

impl<T: BarSeriesLoader + ?Sized> BarSeriesLoader for std::sync::Arc<T> {
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StratscanError> {
        (**self).load(symbol, timeframe, start, end)
    }
}
