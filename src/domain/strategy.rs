//! Strategy definitions and single-frame evaluation.
//!
//! A strategy is either a fixed setup/trigger/exit triple evaluated on one
//! frame, or an ordered list of steps that may each run on their own
//! timeframe (see [`crate::domain::executor`]). Construction always
//! validates; an existing [`Strategy`] is known to be well formed.

use crate::domain::backtest::ExitRules;
use crate::domain::error::StratscanError;
use crate::domain::frame::Frame;
use crate::domain::step::{ExitStep, SetupStep, StepConfig, StepKind, TriggerStep};
use crate::domain::step_eval;
use crate::domain::timeframe::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrategyDefinition {
    #[serde(rename = "fixed")]
    Fixed3Step {
        setup: SetupStep,
        trigger: TriggerStep,
        exit: ExitStep,
    },
    #[serde(rename = "steps")]
    ExpandableSteps(Vec<StepConfig>),
}

/// Declarative (JSON) form of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub definition: StrategyDefinition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    name: String,
    description: String,
    definition: StrategyDefinition,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        definition: StrategyDefinition,
    ) -> Result<Self, StratscanError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StratscanError::invalid_strategy(
                "<unnamed>",
                "strategy name must not be empty",
            ));
        }
        validate_definition(&name, &definition)?;
        Ok(Self {
            name,
            description: description.into(),
            definition,
        })
    }

    pub fn fixed(
        name: impl Into<String>,
        description: impl Into<String>,
        setup: SetupStep,
        trigger: TriggerStep,
        exit: ExitStep,
    ) -> Result<Self, StratscanError> {
        Self::new(
            name,
            description,
            StrategyDefinition::Fixed3Step {
                setup,
                trigger,
                exit,
            },
        )
    }

    pub fn from_json(json: &str) -> Result<Self, StratscanError> {
        let config: StrategyConfig = serde_json::from_str(json)?;
        Self::try_from(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn definition(&self) -> &StrategyDefinition {
        &self.definition
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.definition, StrategyDefinition::Fixed3Step { .. })
    }

    /// Enabled steps of an expandable strategy with their original indices.
    pub fn enabled_steps(&self) -> Vec<(usize, &StepConfig)> {
        match &self.definition {
            StrategyDefinition::Fixed3Step { .. } => Vec::new(),
            StrategyDefinition::ExpandableSteps(steps) => steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.enabled)
                .collect(),
        }
    }

    /// Sorted union of `base` and every enabled step's timeframe.
    pub fn required_timeframes(&self, base: Timeframe) -> Vec<Timeframe> {
        let mut set: BTreeSet<Timeframe> = self
            .enabled_steps()
            .into_iter()
            .map(|(_, s)| s.timeframe)
            .collect();
        set.insert(base);
        set.into_iter().collect()
    }

    fn exit_steps(&self) -> Vec<&ExitStep> {
        match &self.definition {
            StrategyDefinition::Fixed3Step { exit, .. } => exit.flatten(),
            StrategyDefinition::ExpandableSteps(_) => self
                .enabled_steps()
                .into_iter()
                .filter_map(|(_, s)| match &s.step {
                    StepKind::Exit(e) => Some(e),
                    _ => None,
                })
                .flat_map(|e| e.flatten())
                .collect(),
        }
    }

    /// Shortest `TIME_BASED` holding limit among the exit steps.
    pub fn max_holding_days(&self) -> Option<u32> {
        self.exit_steps()
            .into_iter()
            .filter_map(|e| match e {
                ExitStep::TimeBased { max_holding_days } => Some(*max_holding_days),
                _ => None,
            })
            .min()
    }

    /// Exit thresholds declared by the strategy's own exit steps.
    pub fn exit_rules(&self) -> ExitRules {
        let mut rules = ExitRules {
            max_holding_days: self.max_holding_days(),
            ..ExitRules::default()
        };
        for step in self.exit_steps() {
            match step {
                ExitStep::StopLossPct { value } => {
                    rules.stop_loss_pct.get_or_insert(*value);
                }
                ExitStep::TakeProfitPct { value } => {
                    rules.take_profit_pct.get_or_insert(*value);
                }
                ExitStep::TrailingStopPct { value } => {
                    rules.trailing_stop_pct.get_or_insert(*value);
                }
                _ => {}
            }
        }
        rules
    }

    /// Evaluates every step on `frame`, ignoring step timeframes.
    pub fn evaluate(&self, frame: &mut Frame) -> Result<(), StratscanError> {
        match &self.definition {
            StrategyDefinition::Fixed3Step {
                setup,
                trigger,
                exit,
            } => self.run_fixed(setup, trigger, exit, frame),
            StrategyDefinition::ExpandableSteps(_) => {
                for (_, step) in self.enabled_steps() {
                    step_eval::apply(&step.step, frame)?;
                }
                Ok(())
            }
        }
    }

    fn run_fixed(
        &self,
        setup: &SetupStep,
        trigger: &TriggerStep,
        exit: &ExitStep,
        frame: &mut Frame,
    ) -> Result<(), StratscanError> {
        step_eval::apply_setup(setup, frame)?;
        step_eval::apply_trigger(trigger, frame)?;
        step_eval::apply_exit(exit, frame)
    }
}

fn validate_definition(name: &str, definition: &StrategyDefinition) -> Result<(), StratscanError> {
    match definition {
        StrategyDefinition::Fixed3Step {
            setup,
            trigger,
            exit,
        } => {
            setup.validate(name)?;
            trigger.validate(name)?;
            exit.validate(name)
        }
        StrategyDefinition::ExpandableSteps(steps) => {
            for step in steps {
                step.step.validate(name)?;
            }
            let enabled = |role: &str| steps.iter().any(|s| s.enabled && s.step.role() == role);
            if !enabled("setup") || !enabled("trigger") {
                return Err(StratscanError::invalid_strategy(
                    name,
                    "needs at least one enabled setup step and one enabled trigger step",
                ));
            }
            Ok(())
        }
    }
}

impl TryFrom<StrategyConfig> for Strategy {
    type Error = StratscanError;

    fn try_from(config: StrategyConfig) -> Result<Self, Self::Error> {
        Strategy::new(config.name, config.description, config.definition)
    }
}

impl From<&Strategy> for StrategyConfig {
    fn from(strategy: &Strategy) -> Self {
        StrategyConfig {
            name: strategy.name.clone(),
            description: strategy.description.clone(),
            definition: strategy.definition.clone(),
        }
    }
}
