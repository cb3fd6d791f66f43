//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), EMA[0] = C[0], then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Non-adjusted and seeded with the first close, so every bar is valid.

use crate::domain::indicator::{simple_series, IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::exponential_smoothing;
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return simple_series(IndicatorType::Ema(period), bars, &vec![None; bars.len()]);
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema: Vec<Option<f64>> = exponential_smoothing(&closes, period)
        .into_iter()
        .map(Some)
        .collect();
    simple_series(IndicatorType::Ema(period), bars, &ema)
}
