//! Strategy step definitions.
//!
//! Each role (setup, trigger, exit) has a closed set of step types. The
//! enums are deserialized from the declarative strategy format with an
//! internal `"type"` tag, so unknown tags, unknown fields and missing
//! parameters are rejected while parsing. [`validate`](SetupStep::validate)
//! catches the parameter combinations serde cannot express.

use crate::domain::error::StratscanError;
use crate::domain::indicator::IndicatorType;
use crate::domain::pattern::CandlePattern;
use crate::domain::timeframe::Timeframe;
use crate::domain::velocity;
use serde::{Deserialize, Serialize};

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "CROSS_ABOVE")]
    CrossAbove,
    #[serde(rename = "CROSS_BELOW")]
    CrossBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacdDirection {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossoverType {
    Golden,
    Death,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakoutLevel {
    BollingerUpper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReversalCondition {
    RsiOversold,
    RsiOverbought,
}

fn default_volume_period() -> usize {
    20
}

fn default_obs_window() -> usize {
    velocity::DEFAULT_OBS_WINDOW
}

fn default_atr_multiplier() -> f64 {
    2.0
}

fn default_range_lookback() -> usize {
    20
}

fn default_stop_loss() -> f64 {
    0.05
}

fn default_take_profit() -> f64 {
    0.10
}

fn default_trailing_stop() -> f64 {
    0.03
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum SetupStep {
    None,
    IndicatorThreshold {
        indicator: String,
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        indicator2: Option<String>,
    },
    RsiMomentum {
        min_rsi: f64,
        max_rsi: f64,
    },
    SmaTrend {
        fast_period: usize,
        slow_period: usize,
        direction: Direction,
    },
    MacdTrend {
        direction: MacdDirection,
    },
    VolumeTrend {
        multiplier: f64,
        #[serde(default = "default_volume_period")]
        period: usize,
    },
    /// Velocity maintained above the EMA channels, or momentum accelerating.
    VegasChannel {
        #[serde(default = "default_obs_window")]
        obs_window: usize,
    },
    /// ATR above `multiplier` times its own rolling mean over `period`.
    AtrExpansion {
        #[serde(default = "default_atr_multiplier")]
        multiplier: f64,
        #[serde(default = "default_range_lookback")]
        period: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum TriggerStep {
    CandlePattern {
        pattern: CandlePattern,
    },
    PriceCrossover {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price_level: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        indicator: Option<String>,
        direction: Direction,
    },
    IndicatorCrossover {
        indicator1: String,
        indicator2: String,
        crossover_type: CrossoverType,
    },
    ThresholdCross {
        indicator: String,
        value: f64,
        direction: Direction,
    },
    Breakout {
        level: BreakoutLevel,
    },
    Reversal {
        condition: ReversalCondition,
    },
    VegasMomentum {
        #[serde(default = "default_obs_window")]
        obs_window: usize,
    },
    /// Close crosses above the highest high of the previous `lookback` bars.
    RangeBreakout {
        #[serde(default = "default_range_lookback")]
        lookback: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum ExitStep {
    ConditionalOrFixed {
        conditions: Vec<ExitStep>,
    },
    StopLossPct {
        #[serde(default = "default_stop_loss")]
        value: f64,
    },
    TakeProfitPct {
        #[serde(default = "default_take_profit")]
        value: f64,
    },
    TrailingStopPct {
        #[serde(default = "default_trailing_stop")]
        value: f64,
    },
    TimeBased {
        max_holding_days: u32,
    },
    IndicatorCross {
        indicator: String,
        direction: CrossDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        indicator2: Option<String>,
    },
    VelocityLoss,
    /// Highest high over `lookback` bars minus `multiplier` ATRs.
    AtrTrailingStop {
        #[serde(default = "default_atr_multiplier")]
        multiplier: f64,
        #[serde(default = "default_range_lookback")]
        lookback: usize,
    },
}

/// A step of any role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Setup(SetupStep),
    Trigger(TriggerStep),
    Exit(ExitStep),
}

fn default_enabled() -> bool {
    true
}

/// One entry of an expandable pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub step: StepKind,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl StepConfig {
    pub fn new(step: StepKind, timeframe: Timeframe) -> Self {
        Self {
            step,
            timeframe,
            enabled: true,
        }
    }
}

impl StepKind {
    pub fn role(&self) -> &'static str {
        match self {
            StepKind::Setup(_) => "setup",
            StepKind::Trigger(_) => "trigger",
            StepKind::Exit(_) => "exit",
        }
    }

    pub fn validate(&self, strategy: &str) -> Result<(), StratscanError> {
        match self {
            StepKind::Setup(s) => s.validate(strategy),
            StepKind::Trigger(t) => t.validate(strategy),
            StepKind::Exit(e) => e.validate(strategy),
        }
    }
}

/// A column reference must be a price field or a computable indicator.
fn check_column(name: &str) -> Result<(), StratscanError> {
    if PRICE_COLUMNS.contains(&name) || IndicatorType::for_column(name).is_some() {
        Ok(())
    } else {
        Err(StratscanError::UnknownIndicator {
            name: name.to_string(),
        })
    }
}

fn exactly_one<T, U>(
    strategy: &str,
    a: &Option<T>,
    b: &Option<U>,
    what: &str,
) -> Result<(), StratscanError> {
    match (a.is_some(), b.is_some()) {
        (true, false) | (false, true) => Ok(()),
        _ => Err(StratscanError::invalid_strategy(
            strategy,
            format!("exactly one of {what} is required"),
        )),
    }
}

fn check_positive(strategy: &str, name: &str, value: f64) -> Result<(), StratscanError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(StratscanError::invalid_strategy(
            strategy,
            format!("{name} must be positive, got {value}"),
        ))
    }
}

fn check_window(strategy: &str, name: &str, value: usize) -> Result<(), StratscanError> {
    check_positive(strategy, name, value as f64)
}

fn check_fraction(strategy: &str, name: &str, value: f64) -> Result<(), StratscanError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(StratscanError::invalid_strategy(
            strategy,
            format!("{name} must be between 0 and 1, got {value}"),
        ))
    }
}

impl SetupStep {
    pub fn validate(&self, strategy: &str) -> Result<(), StratscanError> {
        match self {
            SetupStep::None | SetupStep::MacdTrend { .. } => Ok(()),
            SetupStep::IndicatorThreshold {
                indicator,
                value,
                indicator2,
                ..
            } => {
                check_column(indicator)?;
                exactly_one(strategy, value, indicator2, "value or indicator2")?;
                if let Some(other) = indicator2 {
                    check_column(other)?;
                }
                Ok(())
            }
            SetupStep::RsiMomentum { min_rsi, max_rsi } => {
                if *min_rsi < 0.0 || *max_rsi > 100.0 || min_rsi >= max_rsi {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        format!("RSI band [{min_rsi}, {max_rsi}] must satisfy 0 <= min < max <= 100"),
                    ));
                }
                Ok(())
            }
            SetupStep::SmaTrend {
                fast_period,
                slow_period,
                ..
            } => {
                if *fast_period == 0 {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        "fast_period must be positive",
                    ));
                }
                if slow_period <= fast_period {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        format!(
                            "slow_period ({slow_period}) must be greater than fast_period ({fast_period})"
                        ),
                    ));
                }
                Ok(())
            }
            SetupStep::VolumeTrend { multiplier, period } => {
                if *multiplier <= 0.0 || *period == 0 {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        "volume trend needs a positive multiplier and period",
                    ));
                }
                Ok(())
            }
            SetupStep::VegasChannel { obs_window } => check_window(strategy, "obs_window", *obs_window),
            SetupStep::AtrExpansion { multiplier, period } => {
                check_positive(strategy, "ATR multiplier", *multiplier)?;
                check_window(strategy, "period", *period)
            }
        }
    }
}

impl TriggerStep {
    pub fn validate(&self, strategy: &str) -> Result<(), StratscanError> {
        match self {
            TriggerStep::CandlePattern { .. }
            | TriggerStep::Breakout { .. }
            | TriggerStep::Reversal { .. } => Ok(()),
            TriggerStep::PriceCrossover {
                price_level,
                indicator,
                ..
            } => {
                exactly_one(strategy, price_level, indicator, "price_level or indicator")?;
                if let Some(name) = indicator {
                    check_column(name)?;
                }
                Ok(())
            }
            TriggerStep::IndicatorCrossover {
                indicator1,
                indicator2,
                ..
            } => {
                check_column(indicator1)?;
                check_column(indicator2)?;
                if indicator1 == indicator2 {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        "crossover needs two different indicators",
                    ));
                }
                Ok(())
            }
            TriggerStep::ThresholdCross { indicator, .. } => check_column(indicator),
            TriggerStep::VegasMomentum { obs_window } => check_window(strategy, "obs_window", *obs_window),
            TriggerStep::RangeBreakout { lookback } => check_window(strategy, "lookback", *lookback),
        }
    }
}

impl ExitStep {
    pub fn validate(&self, strategy: &str) -> Result<(), StratscanError> {
        match self {
            ExitStep::ConditionalOrFixed { conditions } => {
                if conditions.is_empty() {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        "CONDITIONAL_OR_FIXED needs at least one condition",
                    ));
                }
                conditions.iter().try_for_each(|c| c.validate(strategy))
            }
            ExitStep::StopLossPct { value } => check_fraction(strategy, "stop loss", *value),
            ExitStep::TakeProfitPct { value } => {
                if *value > 0.0 {
                    Ok(())
                } else {
                    Err(StratscanError::invalid_strategy(
                        strategy,
                        "take profit must be positive",
                    ))
                }
            }
            ExitStep::TrailingStopPct { value } => check_fraction(strategy, "trailing stop", *value),
            ExitStep::TimeBased { max_holding_days } => {
                if *max_holding_days == 0 {
                    return Err(StratscanError::invalid_strategy(
                        strategy,
                        "max_holding_days must be positive",
                    ));
                }
                Ok(())
            }
            ExitStep::IndicatorCross {
                indicator,
                value,
                indicator2,
                ..
            } => {
                check_column(indicator)?;
                exactly_one(strategy, value, indicator2, "value or indicator2")?;
                if let Some(other) = indicator2 {
                    check_column(other)?;
                }
                Ok(())
            }
            ExitStep::VelocityLoss => Ok(()),
            ExitStep::AtrTrailingStop {
                multiplier,
                lookback,
            } => {
                check_positive(strategy, "ATR multiplier", *multiplier)?;
                check_window(strategy, "lookback", *lookback)
            }
        }
    }

    /// Depth-first walk over this exit and any nested conditions.
    pub fn flatten(&self) -> Vec<&ExitStep> {
        match self {
            ExitStep::ConditionalOrFixed { conditions } => {
                conditions.iter().flat_map(|c| c.flatten()).collect()
            }
            other => vec![other],
        }
    }
}
