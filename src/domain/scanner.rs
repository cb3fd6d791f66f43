//! Daily scanner and signal ranking.
//!
//! Runs strategies over a symbol universe as of a scan date, turns each
//! symbol's latest actionable row into a [`SignalResult`], optionally votes
//! across the timeframes of a [`PickProfile`], and ranks the outcome.
//! Per-unit failures are collected as [`ScanFailure`]s rather than dropped.

use crate::domain::error::{ErrorKind, StratscanError};
use crate::domain::executor::{Execution, MultiTimeframeExecutor, SkippedStep};
use crate::domain::frame::{Frame, Signal};
use crate::domain::library::StrategyRegistry;
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::{parse_timeframes, Timeframe};
use crate::ports::bar_loader::BarSeriesLoader;
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;
pub const DEFAULT_TOP_K: usize = 10;
/// Group name for signals that did not come from a pick profile.
pub const DEFAULT_PICK_TYPE: &str = "daily";

const SETUP_BONUS: f64 = 0.15;
const TRIGGER_BONUS: f64 = 0.15;
const BUY_BONUS: f64 = 0.10;
const MAX_RANKING_SCORE: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub weighted_score: f64,
    pub total_weight: f64,
    pub weighted_setup_score: f64,
    pub weighted_trigger_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub strategy_name: String,
    pub description: String,
    pub timeframes: Vec<Timeframe>,
    pub base_timeframe: Timeframe,
    /// Date of the row that produced the signal.
    pub signal_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub symbol: String,
    /// Scan date.
    pub date: NaiveDate,
    pub signal: Signal,
    pub price: f64,
    pub setup_valid: bool,
    pub trigger_met: bool,
    pub confidence: f64,
    pub metadata: SignalMetadata,
}

impl SignalResult {
    pub fn pick_type(&self) -> &str {
        self.metadata.pick_type.as_deref().unwrap_or(DEFAULT_PICK_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub strategy: String,
    pub pick_type: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ScanFailure {
    fn from_error(
        symbol: &str,
        strategy: &Strategy,
        pick_type: Option<&str>,
        timeframe: Option<Timeframe>,
        error: &StratscanError,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            strategy: strategy.name().to_string(),
            pick_type: pick_type.map(str::to_string),
            timeframe,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// One data failure per step the executor had to skip.
fn skipped_failures(
    symbol: &str,
    strategy: &Strategy,
    pick_type: Option<&str>,
    skipped: &[SkippedStep],
) -> Vec<ScanFailure> {
    skipped
        .iter()
        .map(|step| ScanFailure {
            symbol: symbol.to_string(),
            strategy: strategy.name().to_string(),
            pick_type: pick_type.map(str::to_string),
            timeframe: Some(step.timeframe),
            kind: ErrorKind::Data,
            message: format!("step {} skipped: {}", step.step_index, step.reason),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub results: Vec<SignalResult>,
    pub failures: Vec<ScanFailure>,
}

impl ScanOutcome {
    fn sort(&mut self) {
        self.results.sort_by(|a, b| {
            (&a.symbol, &a.metadata.strategy_name, a.pick_type())
                .cmp(&(&b.symbol, &b.metadata.strategy_name, b.pick_type()))
        });
        self.failures.sort_by(|a, b| {
            (&a.symbol, &a.strategy, &a.pick_type, a.timeframe)
                .cmp(&(&b.symbol, &b.strategy, &b.pick_type, b.timeframe))
        });
    }
}

/// A named set of timeframes that vote together; weights are 1, 2, 3, ...
/// in listed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickProfile {
    pub name: String,
    pub timeframes: Vec<Timeframe>,
}

impl PickProfile {
    pub fn new(name: impl Into<String>, timeframes: Vec<Timeframe>) -> Self {
        Self {
            name: name.into(),
            timeframes,
        }
    }

    pub fn short_term() -> Self {
        Self::new(
            "short_term",
            vec![Timeframe::DAILY, Timeframe::days(3), Timeframe::days(5)],
        )
    }

    pub fn long_term() -> Self {
        Self::new(
            "long_term",
            vec![
                Timeframe::days(8),
                Timeframe::days(13),
                Timeframe::days(21),
                Timeframe::days(34),
            ],
        )
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::short_term(), Self::long_term()]
    }

    /// Parses `"short_term:1d,3d,5d | long_term:8d,13d"`.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, StratscanError> {
        input
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for PickProfile {
    type Err = StratscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| StratscanError::ConfigInvalid {
            section: "scan".into(),
            key: "profiles".into(),
            reason,
        };
        let (name, tfs) = s
            .split_once(':')
            .ok_or_else(|| invalid(format!("profile '{s}' must look like 'name:1d,3d'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid(format!("profile '{s}' has no name")));
        }
        let timeframes = parse_timeframes(tfs).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::new(name, timeframes))
    }
}

/// The row a timeframe votes with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeVote {
    pub date: NaiveDate,
    pub signal: Signal,
    pub price: f64,
    pub setup_valid: bool,
    pub trigger_met: bool,
}

/// Latest non-HOLD row, if any.
pub fn latest_signal(frame: &Frame) -> Option<TimeframeVote> {
    (0..frame.len()).rev().find_map(|i| {
        let signal = frame.signal_at(i);
        (signal != Signal::Hold).then(|| TimeframeVote {
            date: frame.bars[i].date,
            signal,
            price: frame.bars[i].close,
            setup_valid: frame.setup_valid_at(i),
            trigger_met: true,
        })
    })
}

/// Latest non-HOLD row, or a HOLD vote from the last row.
fn vote_of(frame: &Frame) -> Option<TimeframeVote> {
    latest_signal(frame).or_else(|| {
        let i = frame.len().checked_sub(1)?;
        Some(TimeframeVote {
            date: frame.bars[i].date,
            signal: Signal::Hold,
            price: frame.bars[i].close,
            setup_valid: frame.setup_valid_at(i),
            trigger_met: false,
        })
    })
}

/// `0.5` base, `+0.2` for a valid setup, `+0.3` for a met trigger.
pub fn signal_confidence(setup_valid: bool, trigger_met: bool) -> f64 {
    let mut confidence = 0.5;
    if setup_valid {
        confidence += 0.2;
    }
    if trigger_met {
        confidence += 0.3;
    }
    f64::min(confidence, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTally {
    pub summary: VoteSummary,
    /// Weight-weighted mean price over timeframes that voted.
    pub price: Option<f64>,
    pub latest_date: Option<NaiveDate>,
}

impl ProfileTally {
    pub fn retained(&self) -> bool {
        self.summary.weighted_score > 0.0
    }

    pub fn confidence(&self) -> f64 {
        if self.summary.total_weight > 0.0 {
            (self.summary.weighted_score / self.summary.total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn setup_valid(&self) -> bool {
        self.summary.weighted_setup_score * 2.0 > self.summary.total_weight
    }

    pub fn trigger_met(&self) -> bool {
        self.summary.weighted_trigger_score > 0.0
    }
}

/// Weighted vote over `(weight, vote)` pairs. A `None` vote is a failed
/// timeframe: it casts nothing but its weight still counts.
pub fn tally_votes(votes: &[(f64, Option<TimeframeVote>)]) -> ProfileTally {
    let mut summary = VoteSummary {
        weighted_score: 0.0,
        total_weight: 0.0,
        weighted_setup_score: 0.0,
        weighted_trigger_score: 0.0,
    };
    let mut price_sum = 0.0;
    let mut price_weight = 0.0;
    let mut latest_date: Option<NaiveDate> = None;

    for (weight, vote) in votes {
        summary.total_weight += weight;
        let Some(vote) = vote else { continue };
        match vote.signal {
            Signal::Buy => summary.weighted_score += weight,
            Signal::Sell => summary.weighted_score -= weight,
            Signal::Hold => {}
        }
        if vote.setup_valid {
            summary.weighted_setup_score += weight;
        }
        if vote.trigger_met && vote.signal == Signal::Buy {
            summary.weighted_trigger_score += weight;
        }
        price_sum += weight * vote.price;
        price_weight += weight;
        latest_date = latest_date.max(Some(vote.date));
    }

    ProfileTally {
        summary,
        price: (price_weight > 0.0).then(|| price_sum / price_weight),
        latest_date,
    }
}

/// `confidence + 0.15·setup + 0.15·trigger + 0.10·BUY`, capped at 1.5.
pub fn ranking_score(signal: &SignalResult) -> f64 {
    let mut score = signal.confidence;
    if signal.setup_valid {
        score += SETUP_BONUS;
    }
    if signal.trigger_met {
        score += TRIGGER_BONUS;
    }
    if signal.signal == Signal::Buy {
        score += BUY_BONUS;
    }
    f64::min(score, MAX_RANKING_SCORE)
}

/// Scores, sorts (stable, descending), optionally keeps one entry per
/// symbol, and truncates to `top_k`.
pub fn rank_signals(signals: Vec<SignalResult>, top_k: usize, unique_symbol: bool) -> Vec<SignalResult> {
    let mut scored: Vec<(f64, SignalResult)> = signals
        .into_iter()
        .map(|mut s| {
            let score = ranking_score(&s);
            s.metadata.ranking_score = Some(score);
            (score, s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut seen = std::collections::BTreeSet::new();
    scored
        .into_iter()
        .map(|(_, s)| s)
        .filter(|s| !unique_symbol || seen.insert(s.symbol.clone()))
        .take(top_k)
        .collect()
}

/// Ranks each pick type independently.
pub fn rank_by_pick_type(
    signals: Vec<SignalResult>,
    top_k: usize,
    unique_symbol: bool,
) -> BTreeMap<String, Vec<SignalResult>> {
    let mut groups: BTreeMap<String, Vec<SignalResult>> = BTreeMap::new();
    for signal in signals {
        groups
            .entry(signal.pick_type().to_string())
            .or_default()
            .push(signal);
    }
    groups
        .into_iter()
        .map(|(pick_type, group)| (pick_type, rank_signals(group, top_k, unique_symbol)))
        .collect()
}

pub struct DailyScanner<'a> {
    loader: &'a dyn BarSeriesLoader,
    registry: &'a StrategyRegistry,
    lookback_days: i64,
    base_timeframe: Timeframe,
}

impl<'a> DailyScanner<'a> {
    pub fn new(loader: &'a dyn BarSeriesLoader, registry: &'a StrategyRegistry) -> Self {
        Self {
            loader,
            registry,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            base_timeframe: Timeframe::DAILY,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_base_timeframe(mut self, base: Timeframe) -> Self {
        self.base_timeframe = base;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        self.registry
    }

    /// Window ending at `scan_date` spanning `lookback_days` buckets of
    /// `widest`, so a 34d step gets as many bars as a daily one.
    fn window(&self, scan_date: NaiveDate, widest: Timeframe) -> (NaiveDate, NaiveDate) {
        let days = self.lookback_days * i64::from(widest.n_days());
        (scan_date - Duration::days(days), scan_date)
    }

    /// Evaluates `strategy` with `base` as output timeframe over the window
    /// of its widest timeframe.
    fn evaluate(
        &self,
        symbol: &str,
        strategy: &Strategy,
        scan_date: NaiveDate,
        base: Timeframe,
    ) -> Result<Execution, StratscanError> {
        let widest = strategy
            .required_timeframes(base)
            .into_iter()
            .max()
            .unwrap_or(base);
        let (start, end) = self.window(scan_date, widest);
        let executor = MultiTimeframeExecutor::new(self.loader);
        executor.execute_strategy(strategy, symbol, &[], start, end, base)
    }

    /// Latest actionable signal for one symbol, dated `scan_date`.
    ///
    /// A load error, or a step skipped for lack of data on its timeframe,
    /// comes back as a failure instead of a missing result.
    pub fn scan_symbol(&self, symbol: &str, strategy: &Strategy, scan_date: NaiveDate) -> ScanOutcome {
        let base = self.base_timeframe;
        let execution = match self.evaluate(symbol, strategy, scan_date, base) {
            Ok(execution) => execution,
            Err(e) => {
                warn!(%symbol, strategy = strategy.name(), error = %e, "scan failed");
                return ScanOutcome {
                    results: Vec::new(),
                    failures: vec![ScanFailure::from_error(symbol, strategy, None, None, &e)],
                };
            }
        };
        let failures = skipped_failures(symbol, strategy, None, &execution.skipped);
        let results = latest_signal(&execution.frame)
            .map(|vote| SignalResult {
                symbol: symbol.to_string(),
                date: scan_date,
                signal: vote.signal,
                price: vote.price,
                setup_valid: vote.setup_valid,
                trigger_met: vote.trigger_met,
                confidence: signal_confidence(vote.setup_valid, vote.trigger_met),
                metadata: SignalMetadata {
                    strategy_name: strategy.name().to_string(),
                    description: strategy.description().to_string(),
                    timeframes: strategy.required_timeframes(base),
                    base_timeframe: base,
                    signal_date: vote.date,
                    ranking_score: None,
                    pick_type: None,
                    vote: None,
                },
            })
            .into_iter()
            .collect();
        ScanOutcome { results, failures }
    }

    /// Every (symbol, strategy) pair, evaluated in parallel.
    pub fn scan(
        &self,
        symbols: &[String],
        strategies: &[&Strategy],
        scan_date: NaiveDate,
    ) -> ScanOutcome {
        info!(
            symbols = symbols.len(),
            strategies = strategies.len(),
            %scan_date,
            "scan started"
        );
        let units: Vec<(&String, &Strategy)> = symbols
            .iter()
            .flat_map(|sym| strategies.iter().map(move |s| (sym, *s)))
            .collect();

        let per_unit: Vec<ScanOutcome> = units
            .par_iter()
            .map(|(symbol, strategy)| self.scan_symbol(symbol, strategy, scan_date))
            .collect();

        let mut outcome = ScanOutcome::default();
        for unit in per_unit {
            outcome.results.extend(unit.results);
            outcome.failures.extend(unit.failures);
        }
        outcome.sort();
        info!(
            results = outcome.results.len(),
            failures = outcome.failures.len(),
            "scan complete"
        );
        outcome
    }

    /// [`scan`](Self::scan) over every registered strategy.
    pub fn scan_registry(&self, symbols: &[String], scan_date: NaiveDate) -> ScanOutcome {
        let strategies: Vec<&Strategy> = self.registry.iter().collect();
        self.scan(symbols, &strategies, scan_date)
    }

    /// Timeframe-weighted votes per (symbol, strategy, profile). Only
    /// profiles with a positive weighted score produce a result.
    pub fn scan_pick_profiles(
        &self,
        symbols: &[String],
        strategies: &[&Strategy],
        profiles: &[PickProfile],
        scan_date: NaiveDate,
    ) -> ScanOutcome {
        info!(
            symbols = symbols.len(),
            strategies = strategies.len(),
            profiles = profiles.len(),
            %scan_date,
            "pick-profile scan started"
        );
        let units: Vec<(&String, &Strategy, &PickProfile)> = symbols
            .iter()
            .flat_map(|sym| {
                strategies
                    .iter()
                    .flat_map(move |s| profiles.iter().map(move |p| (sym, *s, p)))
            })
            .collect();

        let per_unit: Vec<(Option<SignalResult>, Vec<ScanFailure>)> = units
            .par_iter()
            .map(|(symbol, strategy, profile)| self.vote_profile(symbol, strategy, profile, scan_date))
            .collect();

        let mut outcome = ScanOutcome::default();
        for (result, failures) in per_unit {
            outcome.results.extend(result);
            outcome.failures.extend(failures);
        }
        outcome.sort();
        info!(
            results = outcome.results.len(),
            failures = outcome.failures.len(),
            "pick-profile scan complete"
        );
        outcome
    }

    fn vote_profile(
        &self,
        symbol: &str,
        strategy: &Strategy,
        profile: &PickProfile,
        scan_date: NaiveDate,
    ) -> (Option<SignalResult>, Vec<ScanFailure>) {
        let mut failures = Vec::new();
        let votes: Vec<(f64, Option<TimeframeVote>)> = profile
            .timeframes
            .iter()
            .enumerate()
            .map(|(idx, &tf)| {
                let weight = (idx + 1) as f64;
                match self.evaluate(symbol, strategy, scan_date, tf) {
                    Ok(execution) if execution.skipped.is_empty() => {
                        (weight, vote_of(&execution.frame))
                    }
                    Ok(execution) => {
                        failures.extend(skipped_failures(
                            symbol,
                            strategy,
                            Some(profile.name.as_str()),
                            &execution.skipped,
                        ));
                        (weight, None)
                    }
                    Err(e) => {
                        warn!(
                            symbol,
                            strategy = strategy.name(),
                            profile = %profile.name,
                            timeframe = %tf,
                            error = %e,
                            "timeframe vote failed"
                        );
                        failures.push(ScanFailure::from_error(
                            symbol,
                            strategy,
                            Some(profile.name.as_str()),
                            Some(tf),
                            &e,
                        ));
                        (weight, None)
                    }
                }
            })
            .collect();

        let tally = tally_votes(&votes);
        if !tally.retained() {
            return (None, failures);
        }

        let base = profile.timeframes.first().copied().unwrap_or(self.base_timeframe);
        let result = SignalResult {
            symbol: symbol.to_string(),
            date: scan_date,
            signal: Signal::Buy,
            price: tally.price.unwrap_or(0.0),
            setup_valid: tally.setup_valid(),
            trigger_met: tally.trigger_met(),
            confidence: tally.confidence(),
            metadata: SignalMetadata {
                strategy_name: strategy.name().to_string(),
                description: strategy.description().to_string(),
                timeframes: profile.timeframes.clone(),
                base_timeframe: base,
                signal_date: tally.latest_date.unwrap_or(scan_date),
                ranking_score: None,
                pick_type: Some(profile.name.clone()),
                vote: Some(tally.summary),
            },
        };
        (Some(result), failures)
    }
}
