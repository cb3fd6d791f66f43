//! Prebuilt strategies and the strategy registry.

use crate::domain::error::StratscanError;
use crate::domain::step::{
    BreakoutLevel, CrossDirection, CrossoverType, Direction, ExitStep, MacdDirection, Operator,
    ReversalCondition, SetupStep, TriggerStep,
};
use crate::domain::strategy::Strategy;
use crate::domain::velocity;
use std::collections::BTreeMap;

pub fn golden_cross() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "golden_cross",
        "SMA 50 crosses above SMA 200 while in an uptrend",
        SetupStep::SmaTrend {
            fast_period: 50,
            slow_period: 200,
            direction: Direction::Above,
        },
        TriggerStep::IndicatorCrossover {
            indicator1: "sma_50".into(),
            indicator2: "sma_200".into(),
            crossover_type: CrossoverType::Golden,
        },
        ExitStep::ConditionalOrFixed {
            conditions: vec![
                ExitStep::IndicatorCross {
                    indicator: "sma_50".into(),
                    direction: CrossDirection::Down,
                    value: None,
                    indicator2: Some("sma_200".into()),
                },
                ExitStep::StopLossPct { value: 0.05 },
            ],
        },
    )
}

pub fn rsi_momentum() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "rsi_momentum",
        "RSI crosses above 50 with positive momentum",
        SetupStep::IndicatorThreshold {
            indicator: "rsi".into(),
            operator: Operator::Gt,
            value: Some(50.0),
            indicator2: None,
        },
        TriggerStep::ThresholdCross {
            indicator: "rsi".into(),
            value: 50.0,
            direction: Direction::Above,
        },
        ExitStep::IndicatorCross {
            indicator: "rsi".into(),
            direction: CrossDirection::Down,
            value: Some(50.0),
            indicator2: None,
        },
    )
}

pub fn macd_crossover() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "macd_crossover",
        "MACD line crosses above its signal line",
        SetupStep::MacdTrend {
            direction: MacdDirection::Bullish,
        },
        TriggerStep::IndicatorCrossover {
            indicator1: "macd".into(),
            indicator2: "macd_signal".into(),
            crossover_type: CrossoverType::Golden,
        },
        ExitStep::IndicatorCross {
            indicator: "macd".into(),
            direction: CrossDirection::Down,
            value: None,
            indicator2: Some("macd_signal".into()),
        },
    )
}

pub fn bollinger_breakout() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "bollinger_breakout",
        "Close breaks above the upper Bollinger band on above-average volume",
        SetupStep::VolumeTrend {
            multiplier: 1.0,
            period: 20,
        },
        TriggerStep::Breakout {
            level: BreakoutLevel::BollingerUpper,
        },
        ExitStep::IndicatorCross {
            indicator: "close".into(),
            direction: CrossDirection::Down,
            value: None,
            indicator2: Some("bb_middle".into()),
        },
    )
}

pub fn rsi_reversal() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "rsi_reversal",
        "RSI recovers from oversold on a green bar",
        SetupStep::RsiMomentum {
            min_rsi: 0.0,
            max_rsi: 100.0,
        },
        TriggerStep::Reversal {
            condition: ReversalCondition::RsiOversold,
        },
        ExitStep::TakeProfitPct { value: 0.10 },
    )
}

/// EMA 8/13 over 144/169 channel trend follower. Needs 169 bars of history.
pub fn vegas_channel() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "vegas_channel",
        "Velocity held above the EMA channels or momentum breaking out of them",
        SetupStep::VegasChannel {
            obs_window: velocity::DEFAULT_OBS_WINDOW,
        },
        TriggerStep::VegasMomentum {
            obs_window: velocity::DEFAULT_OBS_WINDOW,
        },
        ExitStep::VelocityLoss,
    )
}

pub fn atr_breakout() -> Result<Strategy, StratscanError> {
    Strategy::fixed(
        "atr_breakout",
        "20-bar high breakout during a 2x ATR volatility expansion",
        SetupStep::AtrExpansion {
            multiplier: 2.0,
            period: 20,
        },
        TriggerStep::RangeBreakout { lookback: 20 },
        ExitStep::AtrTrailingStop {
            multiplier: 2.0,
            lookback: 20,
        },
    )
}

/// Named strategies available to the scanner.
///
/// Iteration order is by name, so scans over the whole registry are
/// reproducible.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Strategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every prebuilt strategy.
    pub fn prebuilt() -> Result<Self, StratscanError> {
        let mut registry = Self::new();
        for strategy in [
            golden_cross()?,
            rsi_momentum()?,
            macd_crossover()?,
            bollinger_breakout()?,
            rsi_reversal()?,
            vegas_channel()?,
            atr_breakout()?,
        ] {
            registry.register(strategy);
        }
        Ok(registry)
    }

    /// Adds or replaces a strategy by name.
    pub fn register(&mut self, strategy: Strategy) -> Option<Strategy> {
        self.strategies.insert(strategy.name().to_string(), strategy)
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Looks up each name, failing on the first unknown one.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Strategy>, StratscanError> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    StratscanError::invalid_strategy(name, "no strategy registered under this name")
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{ExitSignal, Frame, Signal};
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::step::StepKind;
    use chrono::{Duration, NaiveDate};
    use crate::domain::strategy::StrategyDefinition;
    use crate::domain::step::StepConfig;
    use crate::domain::timeframe::Timeframe;

    #[test]
    fn prebuilt_strategies_all_valid() {
        let registry = StrategyRegistry::prebuilt().unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "atr_breakout",
                "bollinger_breakout",
                "golden_cross",
                "macd_crossover",
                "rsi_momentum",
                "rsi_reversal",
                "vegas_channel"
            ]
        );
        assert!(registry.iter().all(|s| s.is_fixed()));
    }

    #[test]
    fn golden_cross_declares_stop_loss() {
        let strategy = golden_cross().unwrap();
        assert_eq!(strategy.exit_rules().stop_loss_pct, Some(0.05));
        assert_eq!(rsi_reversal().unwrap().exit_rules().take_profit_pct, Some(0.10));
    }

    #[test]
    fn register_adds_user_strategy() {
        let mut registry = StrategyRegistry::prebuilt().unwrap();
        let custom = Strategy::new(
            "weekly_trend",
            "",
            StrategyDefinition::ExpandableSteps(vec![
                StepConfig::new(
                    StepKind::Setup(SetupStep::MacdTrend {
                        direction: MacdDirection::Bullish,
                    }),
                    Timeframe::days(5),
                ),
                StepConfig::new(
                    StepKind::Trigger(TriggerStep::Breakout {
                        level: BreakoutLevel::BollingerUpper,
                    }),
                    Timeframe::DAILY,
                ),
            ]),
        )
        .unwrap();
        assert!(registry.register(custom).is_none());
        assert_eq!(registry.len(), 8);
        assert!(registry.get("weekly_trend").is_some());
    }

    fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "TEST".into(),
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn flat_bars(n: usize) -> Vec<OhlcvBar> {
        (0..n).map(|i| make_bar(i, 100.0, 101.0, 99.0, 100.0)).collect()
    }

    fn bar_rows(frame: &Frame, signal: Signal) -> Vec<usize> {
        (0..frame.len()).filter(|&i| frame.signal_at(i) == signal).collect()
    }

    fn exit_rows(frame: &Frame) -> Vec<usize> {
        frame
            .exit_signals()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Some(ExitSignal::Sell))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn vegas_channel_buys_the_first_breakout_only() {
        // 170 flat bars, two green breakouts, then a collapse
        let mut bars = flat_bars(170);
        bars.push(make_bar(170, 101.0, 103.0, 100.0, 102.0));
        bars.push(make_bar(171, 103.0, 105.0, 102.0, 104.0));
        bars.push(make_bar(172, 104.0, 105.0, 89.0, 90.0));
        let mut frame = Frame::new("TEST", Timeframe::DAILY, bars);
        vegas_channel().unwrap().evaluate(&mut frame).unwrap();

        let setup = frame.flags("setup_valid").unwrap();
        assert_eq!(setup[169], Some(false));
        assert_eq!(setup[170], Some(true));
        assert_eq!(setup[171], Some(true));
        // second breakout falls inside the momentum cooldown
        assert_eq!(bar_rows(&frame, Signal::Buy), vec![170]);
        assert_eq!(exit_rows(&frame), vec![172]);
    }

    #[test]
    fn vegas_channel_needs_full_history() {
        let mut bars = flat_bars(100);
        bars.push(make_bar(100, 101.0, 103.0, 100.0, 102.0));
        let mut frame = Frame::new("TEST", Timeframe::DAILY, bars);
        vegas_channel().unwrap().evaluate(&mut frame).unwrap();
        assert!(bar_rows(&frame, Signal::Buy).is_empty());
    }

    #[test]
    fn atr_breakout_enters_on_volatility_and_trails_out() {
        let mut bars = flat_bars(40);
        bars.push(make_bar(40, 100.0, 160.0, 99.0, 150.0));
        bars.push(make_bar(41, 150.0, 151.0, 139.0, 140.0));
        let mut frame = Frame::new("TEST", Timeframe::DAILY, bars);
        atr_breakout().unwrap().evaluate(&mut frame).unwrap();

        let setup = frame.flags("setup_valid").unwrap();
        assert_eq!(setup[39], Some(false));
        assert_eq!(setup[40], Some(true));
        assert_eq!(bar_rows(&frame, Signal::Buy), vec![40]);
        assert_eq!(exit_rows(&frame), vec![41]);
        assert!(frame.has_column("trailing_stop_price"));
    }

    #[test]
    fn select_rejects_unknown_names() {
        let registry = StrategyRegistry::prebuilt().unwrap();
        assert_eq!(registry.select(&["rsi_momentum".into()]).unwrap().len(), 1);
        assert!(registry.select(&["nope".into()]).is_err());
    }
}
