//! Candlestick pattern detection.
//!
//! Each pattern is a predicate over the current bar and at most two prior
//! bars. Rows without enough history are `false`.

use crate::domain::ohlcv::OhlcvBar;
use serde::{Deserialize, Serialize};

/// A hammer-like body may be at most this share of the range.
const SMALL_BODY_RATIO: f64 = 0.3;
const DOJI_BODY_RATIO: f64 = 0.1;
/// Star middle bar body relative to the first bar's body.
const STAR_BODY_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandlePattern {
    EngulfingBullish,
    EngulfingBearish,
    Hammer,
    ShootingStar,
    Doji,
    MorningStar,
    EveningStar,
    GreenCandle,
    RedCandle,
}

impl CandlePattern {
    pub const ALL: [CandlePattern; 9] = [
        CandlePattern::EngulfingBullish,
        CandlePattern::EngulfingBearish,
        CandlePattern::Hammer,
        CandlePattern::ShootingStar,
        CandlePattern::Doji,
        CandlePattern::MorningStar,
        CandlePattern::EveningStar,
        CandlePattern::GreenCandle,
        CandlePattern::RedCandle,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            CandlePattern::EngulfingBullish => "engulfing_bullish",
            CandlePattern::EngulfingBearish => "engulfing_bearish",
            CandlePattern::Hammer => "hammer",
            CandlePattern::ShootingStar => "shooting_star",
            CandlePattern::Doji => "doji",
            CandlePattern::MorningStar => "morning_star",
            CandlePattern::EveningStar => "evening_star",
            CandlePattern::GreenCandle => "green_candle",
            CandlePattern::RedCandle => "red_candle",
        }
    }

    /// Patterns that trigger a BUY; every other pattern triggers a SELL.
    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            CandlePattern::EngulfingBullish
                | CandlePattern::Hammer
                | CandlePattern::MorningStar
                | CandlePattern::GreenCandle
        )
    }

    fn lookback(&self) -> usize {
        match self {
            CandlePattern::EngulfingBullish | CandlePattern::EngulfingBearish => 1,
            CandlePattern::MorningStar | CandlePattern::EveningStar => 2,
            _ => 0,
        }
    }

    fn matches(&self, bars: &[OhlcvBar], i: usize) -> bool {
        let cur = &bars[i];
        match self {
            CandlePattern::GreenCandle => cur.is_green(),
            CandlePattern::RedCandle => cur.is_red(),
            CandlePattern::Doji => cur.range() > 0.0 && cur.body() <= DOJI_BODY_RATIO * cur.range(),
            CandlePattern::Hammer => {
                let body = cur.body();
                cur.range() > 0.0
                    && body <= SMALL_BODY_RATIO * cur.range()
                    && cur.lower_shadow() >= 2.0 * body
                    && cur.upper_shadow() <= 0.5 * body
            }
            CandlePattern::ShootingStar => {
                let body = cur.body();
                cur.range() > 0.0
                    && body <= SMALL_BODY_RATIO * cur.range()
                    && cur.upper_shadow() >= 2.0 * body
                    && cur.lower_shadow() <= 0.5 * body
            }
            CandlePattern::EngulfingBullish => {
                let prev = &bars[i - 1];
                prev.is_red() && cur.is_green() && cur.open < prev.close && cur.close > prev.open
            }
            CandlePattern::EngulfingBearish => {
                let prev = &bars[i - 1];
                prev.is_green() && cur.is_red() && cur.open > prev.close && cur.close < prev.open
            }
            CandlePattern::MorningStar => {
                let (first, middle) = (&bars[i - 2], &bars[i - 1]);
                first.is_red()
                    && middle.open < first.close
                    && middle.body() <= STAR_BODY_RATIO * first.body()
                    && cur.is_green()
                    && cur.close > (first.open + first.close) / 2.0
            }
            CandlePattern::EveningStar => {
                let (first, middle) = (&bars[i - 2], &bars[i - 1]);
                first.is_green()
                    && middle.open > first.close
                    && middle.body() <= STAR_BODY_RATIO * first.body()
                    && cur.is_red()
                    && cur.close < (first.open + first.close) / 2.0
            }
        }
    }

    pub fn detect(&self, bars: &[OhlcvBar]) -> Vec<bool> {
        let lookback = self.lookback();
        (0..bars.len())
            .map(|i| i >= lookback && self.matches(bars, i))
            .collect()
    }
}

/// Every pattern flag, keyed by column name.
pub fn detect_all(bars: &[OhlcvBar]) -> Vec<(&'static str, Vec<bool>)> {
    CandlePattern::ALL
        .iter()
        .map(|p| (p.column_name(), p.detect(bars)))
        .collect()
}
