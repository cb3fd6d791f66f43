//! Technical indicator implementations.
//!
//! Every calculator returns an [`IndicatorSeries`]: one [`IndicatorPoint`]
//! per input bar, flagged invalid while the lookback window is still warming
//! up. [`IndicatorType`] identifies an indicator together with its parameters
//! and knows the frame column names its values are published under.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::fmt;

pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_ATR_PERIOD: usize = 14;
pub const DEFAULT_MACD: (usize, usize, usize) = (12, 26, 9);
pub const DEFAULT_BOLLINGER_PERIOD: usize = 20;
pub const DEFAULT_BOLLINGER_MULT_X100: u32 = 200;
pub const DEFAULT_STOCHASTIC: (usize, usize) = (14, 3);

/// Indicators attached to every prepared frame.
pub fn standard_indicators() -> Vec<IndicatorType> {
    vec![
        IndicatorType::Rsi(DEFAULT_RSI_PERIOD),
        IndicatorType::Sma(20),
        IndicatorType::Sma(50),
        IndicatorType::Sma(200),
        IndicatorType::Ema(12),
        IndicatorType::Ema(26),
        IndicatorType::default_macd(),
        IndicatorType::default_bollinger(),
        IndicatorType::Atr(DEFAULT_ATR_PERIOD),
        IndicatorType::default_stochastic(),
        IndicatorType::VolumeSma(20),
    ]
}

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: Option<f64>,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    VolumeSma(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

impl IndicatorType {
    pub fn default_macd() -> Self {
        let (fast, slow, signal) = DEFAULT_MACD;
        IndicatorType::Macd { fast, slow, signal }
    }

    pub fn default_bollinger() -> Self {
        IndicatorType::Bollinger {
            period: DEFAULT_BOLLINGER_PERIOD,
            stddev_mult_x100: DEFAULT_BOLLINGER_MULT_X100,
        }
    }

    pub fn default_stochastic() -> Self {
        let (k_period, d_period) = DEFAULT_STOCHASTIC;
        IndicatorType::Stochastic { k_period, d_period }
    }

    /// Frame column names this indicator publishes, in output order.
    ///
    /// Multi-output indicators use fixed names (`macd`, `bb_upper`, ...), so a
    /// frame holds at most one parameterisation of each.
    pub fn column_names(&self) -> Vec<String> {
        match self {
            IndicatorType::Sma(p) => vec![format!("sma_{p}")],
            IndicatorType::Ema(p) => vec![format!("ema_{p}")],
            IndicatorType::Rsi(p) if *p == DEFAULT_RSI_PERIOD => vec!["rsi".into()],
            IndicatorType::Rsi(p) => vec![format!("rsi_{p}")],
            IndicatorType::Atr(p) if *p == DEFAULT_ATR_PERIOD => vec!["atr".into()],
            IndicatorType::Atr(p) => vec![format!("atr_{p}")],
            IndicatorType::VolumeSma(p) => vec![format!("volume_sma_{p}")],
            IndicatorType::Macd { .. } => vec![
                "macd".into(),
                "macd_signal".into(),
                "macd_histogram".into(),
            ],
            IndicatorType::Stochastic { .. } => vec!["stoch_k".into(), "stoch_d".into()],
            IndicatorType::Bollinger { .. } => {
                vec!["bb_upper".into(), "bb_middle".into(), "bb_lower".into()]
            }
        }
    }

    /// Resolves a column name back to the indicator that produces it.
    pub fn for_column(name: &str) -> Option<IndicatorType> {
        match name {
            "rsi" => return Some(IndicatorType::Rsi(DEFAULT_RSI_PERIOD)),
            "atr" => return Some(IndicatorType::Atr(DEFAULT_ATR_PERIOD)),
            "macd" | "macd_signal" | "macd_histogram" => return Some(Self::default_macd()),
            "bb_upper" | "bb_middle" | "bb_lower" => return Some(Self::default_bollinger()),
            "stoch_k" | "stoch_d" => return Some(Self::default_stochastic()),
            _ => {}
        }

        let (prefix, period) = name.rsplit_once('_')?;
        let period: usize = period.parse().ok().filter(|p| *p > 0)?;
        match prefix {
            "sma" => Some(IndicatorType::Sma(period)),
            "ema" => Some(IndicatorType::Ema(period)),
            "rsi" => Some(IndicatorType::Rsi(period)),
            "atr" => Some(IndicatorType::Atr(period)),
            "volume_sma" => Some(IndicatorType::VolumeSma(period)),
            _ => None,
        }
    }

    pub fn calculate(&self, bars: &[OhlcvBar]) -> IndicatorSeries {
        match *self {
            IndicatorType::Sma(p) => sma::calculate_sma(bars, p),
            IndicatorType::Ema(p) => ema::calculate_ema(bars, p),
            IndicatorType::Rsi(p) => rsi::calculate_rsi(bars, p),
            IndicatorType::Atr(p) => atr::calculate_atr(bars, p),
            IndicatorType::VolumeSma(p) => sma::calculate_volume_sma(bars, p),
            IndicatorType::Macd { fast, slow, signal } => {
                macd::calculate_macd(bars, fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                stochastic::calculate_stochastic(bars, k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => bollinger::calculate_bollinger(bars, period, stddev_mult_x100),
        }
    }
}

impl IndicatorSeries {
    /// Splits the series into one nullable column per output, named by
    /// [`IndicatorType::column_names`].
    pub fn into_columns(self) -> Vec<(String, Vec<Option<f64>>)> {
        let names = self.indicator_type.column_names();
        let mut columns: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(self.values.len()); names.len()];

        for point in &self.values {
            let outputs: Vec<Option<f64>> = match (&point.value, point.valid) {
                (_, false) => vec![None; names.len()],
                (IndicatorValue::Simple(v), true) => vec![Some(*v)],
                (
                    IndicatorValue::Macd {
                        line,
                        signal,
                        histogram,
                    },
                    true,
                ) => vec![Some(*line), Some(*signal), Some(*histogram)],
                (IndicatorValue::Stochastic { k, d }, true) => vec![Some(*k), *d],
                (
                    IndicatorValue::Bollinger {
                        upper,
                        middle,
                        lower,
                    },
                    true,
                ) => vec![Some(*upper), Some(*middle), Some(*lower)],
            };
            for (column, value) in columns.iter_mut().zip(outputs) {
                column.push(value);
            }
        }

        names.into_iter().zip(columns).collect()
    }
}

/// Invalid point used during warm-up.
pub(crate) fn warmup_point(date: NaiveDate) -> IndicatorPoint {
    IndicatorPoint {
        date,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    }
}

/// Series of `Simple` points from optional per-bar values.
pub(crate) fn simple_series(
    indicator_type: IndicatorType,
    bars: &[OhlcvBar],
    values: &[Option<f64>],
) -> IndicatorSeries {
    let values = bars
        .iter()
        .zip(values)
        .map(|(bar, value)| match value {
            Some(v) => IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Simple(*v),
            },
            None => warmup_point(bar.date),
        })
        .collect();
    IndicatorSeries {
        indicator_type,
        values,
    }
}
