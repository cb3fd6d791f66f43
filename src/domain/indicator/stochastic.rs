//! Stochastic oscillator.
//!
//! %K = 100 * (C - lowest low) / (highest high - lowest low) over k bars.
//! %D = simple mean of %K over d bars.
//!
//! A zero high-low range leaves %K undefined for that bar.
//! Warmup: %K needs k bars, %D needs k + d - 1.

use crate::domain::indicator::{warmup_point, IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::rolling_mean_opt;
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_stochastic(bars: &[OhlcvBar], k_period: usize, d_period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stochastic { k_period, d_period };

    let k_values: Vec<Option<f64>> = (0..bars.len())
        .map(|i| {
            if k_period == 0 || i + 1 < k_period {
                return None;
            }
            let window = &bars[i + 1 - k_period..=i];
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            if range == 0.0 {
                None
            } else {
                Some(100.0 * (bars[i].close - lowest) / range)
            }
        })
        .collect();
    let d_values = rolling_mean_opt(&k_values, d_period);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match k_values[i] {
            Some(k) => IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Stochastic { k, d: d_values[i] },
            },
            None => warmup_point(bar.date),
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
