//! Single long position tracked by the backtester.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeBased,
    ExitSignal,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    /// Capital left after the entry commission.
    pub capital_at_entry: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    /// Per-share profit.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub holding_days: i64,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn open(entry_date: NaiveDate, entry_price: f64, capital_at_entry: f64) -> Self {
        Self {
            entry_date,
            entry_price,
            capital_at_entry,
            exit_date: None,
            exit_price: None,
            pnl: 0.0,
            pnl_pct: 0.0,
            holding_days: 0,
            exit_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_date.is_none()
    }

    pub fn days_held(&self, date: NaiveDate) -> i64 {
        (date - self.entry_date).num_days()
    }

    pub fn should_stop_loss(&self, price: f64, stop_loss_pct: f64) -> bool {
        price <= self.stop_loss_level(stop_loss_pct)
    }

    pub fn should_take_profit(&self, price: f64, take_profit_pct: f64) -> bool {
        price >= self.take_profit_level(take_profit_pct)
    }

    pub fn stop_loss_level(&self, stop_loss_pct: f64) -> f64 {
        self.entry_price * (1.0 - stop_loss_pct)
    }

    pub fn take_profit_level(&self, take_profit_pct: f64) -> f64 {
        self.entry_price * (1.0 + take_profit_pct)
    }

    /// Sets every exit field at once.
    pub fn close(&mut self, exit_date: NaiveDate, exit_price: f64, reason: ExitReason) {
        self.exit_date = Some(exit_date);
        self.exit_price = Some(exit_price);
        self.pnl = exit_price - self.entry_price;
        self.pnl_pct = if self.entry_price != 0.0 {
            exit_price / self.entry_price - 1.0
        } else {
            0.0
        };
        self.holding_days = self.days_held(exit_date);
        self.exit_reason = Some(reason);
    }
}
