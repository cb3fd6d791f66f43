//! Simple Moving Average of close, and of volume.
//!
//! SMA[i] = mean(C[i-n+1..=i]).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{simple_series, IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::rolling_mean;
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    simple_series(IndicatorType::Sma(period), bars, &rolling_mean(&closes, period))
}

pub fn calculate_volume_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    simple_series(
        IndicatorType::VolumeSma(period),
        bars,
        &rolling_mean(&volumes, period),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorValue;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                symbol: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: (i as i64 + 1) * 100,
            })
            .collect()
    }

    #[test]
    fn sma_warmup_and_value() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let series = calculate_sma(&bars, 3);
        assert_eq!(series.values.len(), 4);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        if let IndicatorValue::Simple(v) = series.values[3].value {
            assert!((v - 30.0).abs() < 1e-9);
        } else {
            panic!("Expected Simple value");
        }
    }

    #[test]
    fn sma_insufficient_history() {
        let bars = make_bars(&[10.0, 20.0]);
        let series = calculate_sma(&bars, 5);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn volume_sma() {
        let bars = make_bars(&[1.0, 1.0, 1.0]);
        let series = calculate_volume_sma(&bars, 2);
        assert_eq!(series.indicator_type, IndicatorType::VolumeSma(2));
        if let IndicatorValue::Simple(v) = series.values[2].value {
            assert!((v - 250.0).abs() < 1e-9);
        } else {
            panic!("Expected Simple value");
        }
    }
}
