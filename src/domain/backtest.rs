//! Single-position backtester.
//!
//! A two-state machine (flat/long) driven by a frame annotated with `signal`
//! and `exit_signal`. While long, exits are checked in fixed order: stop loss,
//! take profit, trailing stop, max holding, then the strategy's exit signal.
//! The first one that fires closes the position on that bar.

use crate::domain::error::StratscanError;
use crate::domain::frame::{ExitSignal, Frame, Signal, SIGNAL};
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::position::{ExitReason, Position};
use crate::domain::strategy::Strategy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;

/// How realized per-share P&L is converted into a capital change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Scale by `capital_at_entry / entry_price`, as if all capital were
    /// invested (fractional shares allowed).
    FullReinvest,
    FixedShares { quantity: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Flat amount per side.
    pub commission: f64,
    /// Fraction of price, e.g. `0.001`.
    pub slippage: f64,
    pub position_sizing: PositionSizing,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            commission: 0.0,
            slippage: 0.0,
            position_sizing: PositionSizing::FullReinvest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExitRules {
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing_stop_pct: Option<f64>,
    pub max_holding_days: Option<u32>,
}

impl ExitRules {
    /// Fills unset thresholds from `fallback`.
    pub fn or(self, fallback: ExitRules) -> ExitRules {
        ExitRules {
            stop_loss_pct: self.stop_loss_pct.or(fallback.stop_loss_pct),
            take_profit_pct: self.take_profit_pct.or(fallback.take_profit_pct),
            trailing_stop_pct: self.trailing_stop_pct.or(fallback.trailing_stop_pct),
            max_holding_days: self.max_holding_days.or(fallback.max_holding_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy_name: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub exit_rules: ExitRules,
    pub metrics: Metrics,
    pub equity_curve: Vec<f64>,
    pub trades: Vec<Position>,
}

/// Long entry (buy): price * (1 + slippage)
pub fn apply_slippage_entry(price: f64, slippage: f64) -> f64 {
    price * (1.0 + slippage)
}

/// Long exit (sell): price * (1 - slippage)
pub fn apply_slippage_exit(price: f64, slippage: f64) -> f64 {
    price * (1.0 - slippage)
}

#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Runs `strategy` over `frame`.
    ///
    /// Explicit `rules` take precedence over thresholds declared by the
    /// strategy's exit steps. A frame without a `signal` column is evaluated
    /// with the strategy first.
    pub fn run_backtest(
        &self,
        strategy: &Strategy,
        frame: &Frame,
        rules: ExitRules,
    ) -> Result<BacktestResult, StratscanError> {
        let rules = rules.or(strategy.exit_rules());

        let evaluated;
        let frame = if frame.column(SIGNAL).is_none() {
            let mut copy = frame.clone();
            strategy.evaluate(&mut copy)?;
            evaluated = copy;
            &evaluated
        } else {
            frame
        };

        let signals = frame.signals().map_err(|_| StratscanError::Evaluation {
            strategy: strategy.name().to_string(),
            reason: "frame has no signal column".to_string(),
        })?;
        let exits = frame.exit_signals().ok();

        let slippage = self.config.slippage;
        let commission = self.config.commission;
        let mut capital = self.config.initial_capital;
        let mut equity_curve = Vec::with_capacity(frame.len() + 1);
        equity_curve.push(capital);
        let mut trades: Vec<Position> = Vec::new();
        let mut open: Option<Position> = None;

        for (i, bar) in frame.bars.iter().enumerate() {
            if let Some(pos) = open.as_mut() {
                let exit_signal = exits.and_then(|e| e[i]);
                if let Some((reason, fill)) = check_exit(pos, bar, exit_signal, &rules) {
                    pos.close(bar.date, apply_slippage_exit(fill, slippage), reason);
                    capital += self.realized(pos) - commission;
                    debug!(date = %bar.date, ?reason, pnl = pos.pnl, capital, "position closed");
                    trades.extend(open.take());
                }
            }

            if open.is_none() && signals[i] == Some(Signal::Buy) {
                capital -= commission;
                let entry = apply_slippage_entry(bar.close, slippage);
                debug!(date = %bar.date, entry, capital, "position opened");
                open = Some(Position::open(bar.date, entry, capital));
            }

            equity_curve.push(capital);
        }

        if let (Some(mut pos), Some(last)) = (open.take(), frame.bars.last()) {
            pos.close(
                last.date,
                apply_slippage_exit(last.close, slippage),
                ExitReason::EndOfData,
            );
            capital += self.realized(&pos) - commission;
            if let Some(point) = equity_curve.last_mut() {
                *point = capital;
            }
            trades.push(pos);
        }

        let metrics = Metrics::compute(&trades, &equity_curve, self.config.initial_capital);
        info!(
            symbol = %frame.symbol,
            strategy = strategy.name(),
            trades = trades.len(),
            final_capital = capital,
            "backtest complete"
        );

        Ok(BacktestResult {
            symbol: frame.symbol.clone(),
            strategy_name: strategy.name().to_string(),
            initial_capital: self.config.initial_capital,
            final_capital: capital,
            exit_rules: rules,
            metrics,
            equity_curve,
            trades,
        })
    }

    /// Capital change for a closed position.
    fn realized(&self, pos: &Position) -> f64 {
        match self.config.position_sizing {
            PositionSizing::FullReinvest if pos.entry_price != 0.0 => {
                pos.pnl * (pos.capital_at_entry / pos.entry_price)
            }
            PositionSizing::FullReinvest => 0.0,
            PositionSizing::FixedShares { quantity } => pos.pnl * quantity as f64,
        }
    }
}

/// First exit condition that fires on `bar`, with its fill price before
/// slippage.
fn check_exit(
    pos: &Position,
    bar: &OhlcvBar,
    exit_signal: Option<ExitSignal>,
    rules: &ExitRules,
) -> Option<(ExitReason, f64)> {
    if let Some(sl) = rules.stop_loss_pct {
        if pos.should_stop_loss(bar.close, sl) {
            return Some((ExitReason::StopLoss, pos.stop_loss_level(sl)));
        }
    }
    if let Some(tp) = rules.take_profit_pct {
        if pos.should_take_profit(bar.close, tp) {
            return Some((ExitReason::TakeProfit, pos.take_profit_level(tp)));
        }
    }
    // Simplified trailing stop: compares the close with a fraction of
    // itself rather than a running peak, so it only fires for ts <= 0.
    if let Some(ts) = rules.trailing_stop_pct {
        if bar.close < bar.close * (1.0 - ts) {
            return Some((ExitReason::TrailingStop, bar.close));
        }
    }
    if let Some(max_days) = rules.max_holding_days {
        if pos.days_held(bar.date) >= i64::from(max_days) {
            return Some((ExitReason::TimeBased, bar.close));
        }
    }
    if exit_signal == Some(ExitSignal::Sell) {
        return Some((ExitReason::ExitSignal, bar.close));
    }
    None
}
