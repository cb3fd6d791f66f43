//! EMA channel velocity and momentum.
//!
//! Every bar is classified against a short channel (EMA 8 and 13) and a long
//! channel (EMA 144 and 169). Momentum fires when velocity was lost more
//! often than it was maintained over a trailing observation window and the
//! bar then clears the short channel (accelerated) or falls through both
//! channels (decelerated).

use crate::domain::error::StratscanError;
use crate::domain::frame::Frame;
use crate::domain::indicator_helpers::rolling_count;
use crate::domain::ohlcv::OhlcvBar;

/// Bars needed before the long channel carries any weight.
pub const MIN_BARS: usize = 169;
pub const DEFAULT_OBS_WINDOW: usize = 30;
/// A repeat of the same momentum signal within this many bars is dropped.
const COOLDOWN_BARS: usize = 30;

const CHANNEL_EMAS: [&str; 4] = ["ema_8", "ema_13", "ema_144", "ema_169"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Velocity {
    Maintained,
    Weak,
    Loss,
    Negotiating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Accelerated,
    Decelerated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bands {
    ema13: f64,
    ema169: f64,
    short_max: f64,
    short_min: f64,
    long_max: f64,
    long_min: f64,
}

impl Bands {
    fn new(ema8: f64, ema13: f64, ema144: f64, ema169: f64) -> Self {
        Self {
            ema13,
            ema169,
            short_max: ema8.max(ema13),
            short_min: ema8.min(ema13),
            long_max: ema144.max(ema169),
            long_min: ema144.min(ema169),
        }
    }
}

/// Velocity and momentum for every row of a frame.
#[derive(Debug, Clone)]
pub struct Channel {
    pub velocity: Vec<Velocity>,
    pub momentum: Vec<Option<Momentum>>,
}

impl Channel {
    /// Computes the channel EMAs on `frame` if they are not there yet.
    pub fn compute(frame: &mut Frame, obs_window: usize) -> Result<Self, StratscanError> {
        let mut emas = Vec::with_capacity(CHANNEL_EMAS.len());
        for name in CHANNEL_EMAS {
            frame.ensure_column(name)?;
            emas.push(frame.floats(name)?);
        }
        let bands: Vec<Option<Bands>> = (0..frame.len())
            .map(|i| match (emas[0][i], emas[1][i], emas[2][i], emas[3][i]) {
                (Some(e8), Some(e13), Some(e144), Some(e169)) => {
                    Some(Bands::new(e8, e13, e144, e169))
                }
                _ => None,
            })
            .collect();

        let velocity: Vec<Velocity> = frame
            .bars
            .iter()
            .zip(&bands)
            .map(|(bar, b)| classify(bar, *b))
            .collect();
        let momentum = momentum_signals(&frame.bars, &bands, &velocity, obs_window);
        Ok(Self { velocity, momentum })
    }

    pub fn accelerated(&self) -> Vec<bool> {
        self.momentum
            .iter()
            .map(|m| *m == Some(Momentum::Accelerated))
            .collect()
    }

    pub fn is(&self, status: Velocity) -> Vec<bool> {
        self.velocity.iter().map(|v| *v == status).collect()
    }
}

fn classify(bar: &OhlcvBar, bands: Option<Bands>) -> Velocity {
    let Some(b) = bands else {
        return Velocity::Negotiating;
    };
    let close = bar.close;
    if bar.is_green() && close > b.short_max && close > b.long_max && b.short_min > b.long_max {
        Velocity::Maintained
    } else if close < b.ema13 && close > b.ema169 {
        Velocity::Weak
    } else if close < b.ema13 && close < b.ema169 {
        Velocity::Loss
    } else {
        Velocity::Negotiating
    }
}

fn momentum_signals(
    bars: &[OhlcvBar],
    bands: &[Option<Bands>],
    velocity: &[Velocity],
    obs_window: usize,
) -> Vec<Option<Momentum>> {
    // weak and negotiating bars count as lost velocity
    let lost: Vec<bool> = velocity.iter().map(|v| *v != Velocity::Maintained).collect();
    let losses = rolling_count(&lost, obs_window);

    let raw: Vec<Option<Momentum>> = bars
        .iter()
        .zip(bands)
        .zip(losses)
        .map(|((bar, b), lost)| {
            let (Some(b), Some(lost)) = (b, lost) else {
                return None;
            };
            if 2 * lost <= obs_window {
                return None;
            }
            if b.long_max <= b.short_max && b.short_max < bar.open && bar.open < bar.close {
                Some(Momentum::Accelerated)
            } else if bar.close < b.short_min && b.short_min <= b.long_min {
                Some(Momentum::Decelerated)
            } else {
                None
            }
        })
        .collect();

    (0..raw.len())
        .map(|i| {
            let signal = raw[i]?;
            let recent = &raw[i.saturating_sub(COOLDOWN_BARS)..i];
            (!recent.contains(&Some(signal))).then_some(signal)
        })
        .collect()
}
