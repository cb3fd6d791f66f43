//! RSI (Relative Strength Index) indicator.
//!
//! Average gain/loss are *simple* rolling means over the last n price
//! changes (not Wilder's smoothing):
//!
//! RSI = 100 - (100 / (1 + mean(gains) / mean(losses)))
//! If mean(losses) == 0: RSI = 100
//!
//! Warmup: first n bars are invalid (need n price changes).

use crate::domain::indicator::{simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values: Vec<Option<f64>> = vec![None; bars.len()];
    if period == 0 || bars.len() < 2 {
        return simple_series(IndicatorType::Rsi(period), bars, &values);
    }

    let mut gains: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    let mut losses: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    for pair in bars.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    for (i, value) in values.iter_mut().enumerate().skip(period) {
        // bar i owns change index i-1
        let window = (i - period)..i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        *value = Some(rsi);
    }

    simple_series(IndicatorType::Rsi(period), bars, &values)
}
