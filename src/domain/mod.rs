//! Core domain types and logic.

pub mod ohlcv;
pub mod timeframe;
pub mod indicator;
pub mod indicator_helpers;
pub mod pattern;
pub mod frame;
pub mod step;
pub mod step_eval;
pub mod velocity;
pub mod strategy;
pub mod library;
pub mod executor;
pub mod position;
pub mod backtest;
pub mod metrics;
pub mod scanner;
pub mod error;
pub mod config_validation;
