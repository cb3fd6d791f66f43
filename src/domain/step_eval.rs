//! Step evaluation.
//!
//! Evaluates one step against a [`Frame`] and publishes its output columns:
//! setups write `setup_valid`, triggers write `signal`, exits write
//! `exit_signal` plus any price levels.
//!
//! # Evaluation Semantics
//!
//! - A comparison with a null operand is `false`
//! - `CROSS_ABOVE`: current `a > b` and previous `a <= b`; `false` at row 0
//! - `CROSS_BELOW`: current `a < b` and previous `a >= b`; `false` at row 0
//! - Triggers only fire where the frame's `setup_valid` is true (all rows if
//!   the frame has no setup column)

use crate::domain::error::StratscanError;
use crate::domain::frame::{
    Column, ExitSignal, Frame, Signal, EXIT_SIGNAL, SETUP_VALID, SIGNAL, STOP_LOSS_PRICE,
    TAKE_PROFIT_PRICE, TRAILING_STOP_PRICE,
};
use crate::domain::indicator_helpers::{rolling_max, rolling_mean_opt};
use crate::domain::step::{
    BreakoutLevel, CrossDirection, CrossoverType, Direction, ExitStep, MacdDirection, Operator,
    ReversalCondition, SetupStep, StepKind, TriggerStep,
};
use crate::domain::velocity::{self, Channel, Velocity};

const EPSILON: f64 = 1e-9;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

pub fn apply(step: &StepKind, frame: &mut Frame) -> Result<(), StratscanError> {
    match step {
        StepKind::Setup(s) => apply_setup(s, frame),
        StepKind::Trigger(t) => apply_trigger(t, frame),
        StepKind::Exit(e) => apply_exit(e, frame),
    }
}

pub fn apply_setup(step: &SetupStep, frame: &mut Frame) -> Result<(), StratscanError> {
    let valid = evaluate_setup(step, frame)?;
    frame.set_column(SETUP_VALID, Column::Flag(valid.into_iter().map(Some).collect()))
}

pub fn apply_trigger(step: &TriggerStep, frame: &mut Frame) -> Result<(), StratscanError> {
    let (buy, sell) = evaluate_trigger(step, frame)?;
    let mask: Vec<bool> = match frame.flags(SETUP_VALID) {
        Ok(flags) => flags.iter().map(|v| v.unwrap_or(false)).collect(),
        Err(_) => vec![true; frame.len()],
    };
    let signals = (0..frame.len())
        .map(|i| {
            Some(if mask[i] && buy[i] {
                Signal::Buy
            } else if mask[i] && sell[i] {
                Signal::Sell
            } else {
                Signal::Hold
            })
        })
        .collect();
    frame.set_column(SIGNAL, Column::Signal(signals))
}

pub fn apply_exit(step: &ExitStep, frame: &mut Frame) -> Result<(), StratscanError> {
    let out = evaluate_exit(step, frame)?;
    let exits = out
        .sell
        .iter()
        .map(|&s| s.then_some(ExitSignal::Sell))
        .collect();
    frame.set_column(EXIT_SIGNAL, Column::Exit(exits))?;
    for (name, level) in [
        (STOP_LOSS_PRICE, out.stop_loss),
        (TAKE_PROFIT_PRICE, out.take_profit),
        (TRAILING_STOP_PRICE, out.trailing_stop),
    ] {
        if let Some(values) = level {
            frame.set_column(name, Column::Float(values))?;
        }
    }
    Ok(())
}

fn evaluate_setup(step: &SetupStep, frame: &mut Frame) -> Result<Vec<bool>, StratscanError> {
    let n = frame.len();
    match step {
        SetupStep::None => Ok(vec![true; n]),
        SetupStep::IndicatorThreshold {
            indicator,
            operator,
            value,
            indicator2,
        } => {
            let left = numeric(frame, indicator)?;
            let right = operand(frame, *value, indicator2.as_deref())?;
            Ok(compare(*operator, &left, &right))
        }
        SetupStep::RsiMomentum { min_rsi, max_rsi } => {
            let rsi = numeric(frame, "rsi")?;
            Ok(rsi
                .iter()
                .map(|v| v.is_some_and(|r| r >= *min_rsi && r <= *max_rsi))
                .collect())
        }
        SetupStep::SmaTrend {
            fast_period,
            slow_period,
            direction,
        } => {
            let fast = numeric(frame, &format!("sma_{fast_period}"))?;
            let slow = numeric(frame, &format!("sma_{slow_period}"))?;
            let op = match direction {
                Direction::Above => Operator::Gt,
                Direction::Below => Operator::Lt,
            };
            Ok(compare(op, &fast, &slow))
        }
        SetupStep::MacdTrend { direction } => {
            let line = numeric(frame, "macd")?;
            let signal = numeric(frame, "macd_signal")?;
            let op = match direction {
                MacdDirection::Bullish => Operator::Gt,
                MacdDirection::Bearish => Operator::Lt,
            };
            Ok(compare(op, &line, &signal))
        }
        SetupStep::VolumeTrend { multiplier, period } => {
            let volume = numeric(frame, "volume")?;
            let average = numeric(frame, &format!("volume_sma_{period}"))?;
            let threshold: Vec<Option<f64>> =
                average.iter().map(|a| a.map(|v| v * multiplier)).collect();
            Ok(compare(Operator::Gt, &volume, &threshold))
        }
        SetupStep::VegasChannel { obs_window } => {
            if n < velocity::MIN_BARS {
                return Ok(vec![false; n]);
            }
            let channel = Channel::compute(frame, *obs_window)?;
            Ok(channel
                .accelerated()
                .into_iter()
                .zip(channel.is(Velocity::Maintained))
                .map(|(accelerated, maintained)| accelerated || maintained)
                .collect())
        }
        SetupStep::AtrExpansion { multiplier, period } => {
            let atr = numeric(frame, "atr")?;
            let threshold: Vec<Option<f64>> = rolling_mean_opt(&atr, *period)
                .into_iter()
                .map(|a| a.map(|v| v * multiplier))
                .collect();
            Ok(compare(Operator::Gt, &atr, &threshold))
        }
    }
}

/// Highest high of the `lookback` bars ending at each row.
fn recent_high(frame: &Frame, lookback: usize) -> Vec<Option<f64>> {
    let highs: Vec<f64> = frame.bars.iter().map(|b| b.high).collect();
    rolling_max(&highs, lookback)
}

/// Raw (unmasked) buy and sell conditions.
fn evaluate_trigger(
    step: &TriggerStep,
    frame: &mut Frame,
) -> Result<(Vec<bool>, Vec<bool>), StratscanError> {
    let n = frame.len();
    let none = vec![false; n];
    match step {
        TriggerStep::CandlePattern { pattern } => {
            let flags = pattern.detect(&frame.bars);
            if pattern.is_bullish() {
                Ok((flags, none))
            } else {
                Ok((none, flags))
            }
        }
        TriggerStep::PriceCrossover {
            price_level,
            indicator,
            direction,
        } => {
            let close = numeric(frame, "close")?;
            let level = operand(frame, *price_level, indicator.as_deref())?;
            Ok(directional_cross(*direction, &close, &level, none))
        }
        TriggerStep::ThresholdCross {
            indicator,
            value,
            direction,
        } => {
            let series = numeric(frame, indicator)?;
            let level = vec![Some(*value); n];
            Ok(directional_cross(*direction, &series, &level, none))
        }
        TriggerStep::IndicatorCrossover {
            indicator1,
            indicator2,
            crossover_type,
        } => {
            let a = numeric(frame, indicator1)?;
            let b = numeric(frame, indicator2)?;
            match crossover_type {
                CrossoverType::Golden => Ok((crosses_above(&a, &b), none)),
                CrossoverType::Death => Ok((none, crosses_below(&a, &b))),
            }
        }
        TriggerStep::Breakout {
            level: BreakoutLevel::BollingerUpper,
        } => {
            let close = numeric(frame, "close")?;
            let upper = numeric(frame, "bb_upper")?;
            Ok((crosses_above(&close, &upper), none))
        }
        TriggerStep::Reversal { condition } => {
            let rsi = numeric(frame, "rsi")?;
            match condition {
                ReversalCondition::RsiOversold => {
                    let level = vec![Some(RSI_OVERSOLD); n];
                    let buy = crosses_above(&rsi, &level)
                        .into_iter()
                        .zip(&frame.bars)
                        .map(|(cross, bar)| cross && bar.is_green())
                        .collect();
                    Ok((buy, none))
                }
                ReversalCondition::RsiOverbought => {
                    let level = vec![Some(RSI_OVERBOUGHT); n];
                    let sell = crosses_below(&rsi, &level)
                        .into_iter()
                        .zip(&frame.bars)
                        .map(|(cross, bar)| cross && bar.is_red())
                        .collect();
                    Ok((none, sell))
                }
            }
        }
        TriggerStep::VegasMomentum { obs_window } => {
            let channel = Channel::compute(frame, *obs_window)?;
            let buy = channel
                .accelerated()
                .into_iter()
                .zip(&frame.bars)
                .map(|(accelerated, bar)| accelerated && bar.is_green())
                .collect();
            Ok((buy, none))
        }
        TriggerStep::RangeBreakout { lookback } => {
            // level is the prior bar's range high, so the breakout bar is excluded
            let high = recent_high(frame, *lookback);
            let close = frame.closes();
            let buy = (0..n)
                .map(|i| {
                    i > 0
                        && high[i - 1].is_some_and(|level| close[i] > level && close[i - 1] <= level)
                })
                .collect();
            Ok((buy, none))
        }
    }
}

/// Outputs of one exit step before they are written to the frame.
struct ExitOutputs {
    sell: Vec<bool>,
    stop_loss: Option<Vec<Option<f64>>>,
    take_profit: Option<Vec<Option<f64>>>,
    trailing_stop: Option<Vec<Option<f64>>>,
}

impl ExitOutputs {
    fn empty(n: usize) -> Self {
        Self {
            sell: vec![false; n],
            stop_loss: None,
            take_profit: None,
            trailing_stop: None,
        }
    }

    /// OR the sells; earlier levels win, later ones fill gaps.
    fn merge(mut self, other: ExitOutputs) -> Self {
        for (s, o) in self.sell.iter_mut().zip(&other.sell) {
            *s = *s || *o;
        }
        self.stop_loss = merge_levels(self.stop_loss, other.stop_loss);
        self.take_profit = merge_levels(self.take_profit, other.take_profit);
        self.trailing_stop = merge_levels(self.trailing_stop, other.trailing_stop);
        self
    }
}

fn merge_levels(
    first: Option<Vec<Option<f64>>>,
    second: Option<Vec<Option<f64>>>,
) -> Option<Vec<Option<f64>>> {
    match (first, second) {
        (Some(a), Some(b)) => Some(a.into_iter().zip(b).map(|(x, y)| x.or(y)).collect()),
        (a, b) => a.or(b),
    }
}

fn evaluate_exit(step: &ExitStep, frame: &mut Frame) -> Result<ExitOutputs, StratscanError> {
    let n = frame.len();
    let buys: Vec<bool> = match frame.signals() {
        Ok(signals) => signals.iter().map(|s| *s == Some(Signal::Buy)).collect(),
        Err(_) => vec![false; n],
    };
    let closes = frame.closes();
    let on_buys = |factor: f64| -> Vec<Option<f64>> {
        closes
            .iter()
            .zip(&buys)
            .map(|(c, &b)| b.then_some(c * factor))
            .collect()
    };

    let mut out = ExitOutputs::empty(n);
    match step {
        ExitStep::ConditionalOrFixed { conditions } => {
            for condition in conditions {
                let part = evaluate_exit(condition, frame)?;
                out = out.merge(part);
            }
        }
        ExitStep::StopLossPct { value } => out.stop_loss = Some(on_buys(1.0 - value)),
        ExitStep::TakeProfitPct { value } => out.take_profit = Some(on_buys(1.0 + value)),
        ExitStep::TrailingStopPct { value } => {
            out.trailing_stop = Some(closes.iter().map(|c| Some(c * (1.0 - value))).collect());
        }
        ExitStep::TimeBased { .. } => {}
        ExitStep::IndicatorCross {
            indicator,
            direction,
            value,
            indicator2,
        } => {
            let series = numeric(frame, indicator)?;
            let other = operand(frame, *value, indicator2.as_deref())?;
            out.sell = match direction {
                CrossDirection::Up => crosses_above(&series, &other),
                CrossDirection::Down => crosses_below(&series, &other),
            };
        }
        ExitStep::VelocityLoss => {
            out.sell = Channel::compute(frame, velocity::DEFAULT_OBS_WINDOW)?.is(Velocity::Loss);
        }
        ExitStep::AtrTrailingStop {
            multiplier,
            lookback,
        } => {
            let atr = numeric(frame, "atr")?;
            let level: Vec<Option<f64>> = recent_high(frame, *lookback)
                .into_iter()
                .zip(&atr)
                .map(|(high, atr)| Some(high? - (*atr)? * multiplier))
                .collect();
            out.sell = closes
                .iter()
                .zip(&level)
                .map(|(c, l)| l.is_some_and(|l| *c < l))
                .collect();
            out.trailing_stop = Some(level);
        }
    }
    Ok(out)
}

/// Resolves a numeric column, computing known indicators on demand.
fn numeric(frame: &mut Frame, name: &str) -> Result<Vec<Option<f64>>, StratscanError> {
    frame.ensure_column(name)?;
    frame.floats(name)
}

/// Either a constant or a second column.
fn operand(
    frame: &mut Frame,
    value: Option<f64>,
    column: Option<&str>,
) -> Result<Vec<Option<f64>>, StratscanError> {
    match (value, column) {
        (Some(v), _) => Ok(vec![Some(v); frame.len()]),
        (None, Some(name)) => numeric(frame, name),
        (None, None) => Err(StratscanError::MissingColumn {
            column: "value".to_string(),
        }),
    }
}

fn directional_cross(
    direction: Direction,
    series: &[Option<f64>],
    level: &[Option<f64>],
    none: Vec<bool>,
) -> (Vec<bool>, Vec<bool>) {
    match direction {
        Direction::Above => (crosses_above(series, level), none),
        Direction::Below => (none, crosses_below(series, level)),
    }
}

pub fn compare(op: Operator, left: &[Option<f64>], right: &[Option<f64>]) -> Vec<bool> {
    match op {
        Operator::CrossAbove => crosses_above(left, right),
        Operator::CrossBelow => crosses_below(left, right),
        _ => left
            .iter()
            .zip(right)
            .map(|(l, r)| match (l, r) {
                (Some(l), Some(r)) => match op {
                    Operator::Gt => l > r,
                    Operator::Lt => l < r,
                    Operator::Ge => l >= r,
                    Operator::Le => l <= r,
                    Operator::Eq => (l - r).abs() < EPSILON,
                    Operator::CrossAbove | Operator::CrossBelow => false,
                },
                _ => false,
            })
            .collect(),
    }
}

pub fn crosses_above(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    cross(a, b, |cur_a, cur_b, prev_a, prev_b| cur_a > cur_b && prev_a <= prev_b)
}

pub fn crosses_below(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    cross(a, b, |cur_a, cur_b, prev_a, prev_b| cur_a < cur_b && prev_a >= prev_b)
}

fn cross(a: &[Option<f64>], b: &[Option<f64>], test: fn(f64, f64, f64, f64) -> bool) -> Vec<bool> {
    (0..a.len())
        .map(|i| {
            if i == 0 {
                return false;
            }
            match (a[i], b[i], a[i - 1], b[i - 1]) {
                (Some(ca), Some(cb), Some(pa), Some(pb)) => test(ca, cb, pa, pb),
                _ => false,
            }
        })
        .collect()
}
