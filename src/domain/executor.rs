//! Multi-timeframe strategy execution.
//!
//! Each step runs on the frame of its own timeframe. Outputs of steps on a
//! non-base timeframe are joined onto the base frame backward as-of: a base
//! bar sees the latest higher-timeframe value dated on or before it. Since
//! resampled bars are dated by their last constituent day, no base bar can
//! see a value that was not yet known.

use crate::domain::error::{ErrorKind, StratscanError};
use crate::domain::frame::{
    Column, Frame, Signal, EXIT_SIGNAL, SETUP_VALID, SIGNAL, STOP_LOSS_PRICE, TAKE_PROFIT_PRICE,
    TRAILING_STOP_PRICE,
};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::step::StepKind;
use crate::domain::step_eval;
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::bar_loader::BarSeriesLoader;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub type LoadedBars = BTreeMap<Timeframe, Result<Vec<OhlcvBar>, StratscanError>>;

/// A step that could not run because its timeframe had no usable data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStep {
    pub step_index: usize,
    pub timeframe: Timeframe,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Execution {
    /// Base-timeframe frame carrying reconciled `setup_valid`, `signal` and
    /// `exit_signal`.
    pub frame: Frame,
    pub skipped: Vec<SkippedStep>,
}

pub struct MultiTimeframeExecutor<'a> {
    loader: &'a dyn BarSeriesLoader,
}

impl<'a> MultiTimeframeExecutor<'a> {
    pub fn new(loader: &'a dyn BarSeriesLoader) -> Self {
        Self { loader }
    }

    pub fn required_timeframes(&self, strategy: &Strategy, base: Timeframe) -> Vec<Timeframe> {
        strategy.required_timeframes(base)
    }

    /// Loads every timeframe, keeping failures next to successes.
    pub fn load(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        start: NaiveDate,
        end: NaiveDate,
    ) -> LoadedBars {
        timeframes
            .iter()
            .map(|&tf| (tf, self.loader.load(symbol, tf, start, end)))
            .collect()
    }

    pub fn prepare(symbol: &str, timeframe: Timeframe, bars: Vec<OhlcvBar>) -> Frame {
        Frame::prepared(symbol, timeframe, bars)
    }

    /// Loads the union of `timeframes` and the strategy's own requirements,
    /// then evaluates the strategy with `base` as the output timeframe.
    pub fn execute_strategy(
        &self,
        strategy: &Strategy,
        symbol: &str,
        timeframes: &[Timeframe],
        start: NaiveDate,
        end: NaiveDate,
        base: Timeframe,
    ) -> Result<Execution, StratscanError> {
        let mut wanted = self.required_timeframes(strategy, base);
        wanted.extend_from_slice(timeframes);
        wanted.sort();
        wanted.dedup();
        let loaded = self.load(symbol, &wanted, start, end);
        Self::execute_loaded(strategy, symbol, loaded, base)
    }

    /// Evaluates a strategy against already loaded bars.
    pub fn execute_loaded(
        strategy: &Strategy,
        symbol: &str,
        mut loaded: LoadedBars,
        base: Timeframe,
    ) -> Result<Execution, StratscanError> {
        let base_bars = match loaded.remove(&base) {
            Some(result) => result?,
            None => {
                return Err(StratscanError::DataUnavailable {
                    symbol: symbol.to_string(),
                    timeframe: base,
                })
            }
        };
        let mut frame = Self::prepare(symbol, base, base_bars);
        let mut skipped = Vec::new();

        if strategy.is_fixed() {
            strategy.evaluate(&mut frame)?;
            reconcile(&mut frame)?;
            return Ok(Execution { frame, skipped });
        }

        let mut working: BTreeMap<Timeframe, Frame> = BTreeMap::new();
        let mut unavailable: BTreeMap<Timeframe, String> = BTreeMap::new();
        for (tf, result) in loaded {
            match result {
                Ok(bars) => {
                    working.insert(tf, Self::prepare(symbol, tf, bars));
                }
                Err(e) => {
                    warn!(symbol, timeframe = %tf, error = %e, "timeframe unavailable");
                    unavailable.insert(tf, e.to_string());
                }
            }
        }

        for (step_index, config) in strategy.enabled_steps() {
            let tf = config.timeframe;
            if tf == base {
                step_eval::apply(&config.step, &mut frame)?;
                debug!(symbol, step_index, timeframe = %tf, "base step evaluated");
                continue;
            }

            let Some(tf_frame) = working.get_mut(&tf) else {
                let reason = unavailable
                    .get(&tf)
                    .cloned()
                    .unwrap_or_else(|| format!("timeframe {tf} was not loaded"));
                warn!(symbol, step_index, timeframe = %tf, %reason, "step skipped");
                skipped.push(SkippedStep {
                    step_index,
                    timeframe: tf,
                    reason,
                });
                continue;
            };

            match step_eval::apply(&config.step, tf_frame) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Data => {
                    warn!(symbol, step_index, timeframe = %tf, error = %e, "step skipped");
                    skipped.push(SkippedStep {
                        step_index,
                        timeframe: tf,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            }

            let outputs: Vec<String> = output_columns(&config.step)
                .iter()
                .filter(|name| tf_frame.column(name).is_some())
                .map(|name| name.to_string())
                .collect();
            let attached = frame.merge_asof(tf_frame, &outputs);
            debug!(symbol, step_index, timeframe = %tf, ?attached, "step merged onto base");
        }

        reconcile(&mut frame)?;
        Ok(Execution { frame, skipped })
    }
}

/// Columns a step publishes.
fn output_columns(step: &StepKind) -> &'static [&'static str] {
    match step {
        StepKind::Setup(_) => &[SETUP_VALID],
        StepKind::Trigger(_) => &[SIGNAL],
        StepKind::Exit(_) => &[
            EXIT_SIGNAL,
            STOP_LOSS_PRICE,
            TAKE_PROFIT_PRICE,
            TRAILING_STOP_PRICE,
        ],
    }
}

/// Final clean-up of the base frame.
///
/// `setup_valid` becomes null-free (missing means false), BUY/SELL where the
/// setup is not valid become HOLD, a missing `signal` becomes all HOLD and a
/// missing `exit_signal` becomes all null.
pub fn reconcile(frame: &mut Frame) -> Result<(), StratscanError> {
    let n = frame.len();
    let valid: Vec<bool> = match frame.flags(SETUP_VALID) {
        Ok(flags) => flags.iter().map(|v| v.unwrap_or(false)).collect(),
        Err(_) => vec![false; n],
    };
    let signals: Vec<Option<Signal>> = match frame.signals() {
        Ok(signals) => signals
            .iter()
            .zip(&valid)
            .map(|(s, &ok)| match s {
                Some(sig @ (Signal::Buy | Signal::Sell)) if ok => Some(*sig),
                _ => Some(Signal::Hold),
            })
            .collect(),
        Err(_) => vec![Some(Signal::Hold); n],
    };
    if frame.exit_signals().is_err() {
        frame.set_column(EXIT_SIGNAL, Column::Exit(vec![None; n]))?;
    }
    frame.set_column(SETUP_VALID, Column::Flag(valid.into_iter().map(Some).collect()))?;
    frame.set_column(SIGNAL, Column::Signal(signals))
}
