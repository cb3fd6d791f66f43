//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::resampling_loader::ResamplingLoader;
use crate::adapters::strategy_file::{load_strategies, register_from_path};
use crate::domain::backtest::{
    BacktestConfig, BacktestResult, Backtester, ExitRules, PositionSizing, DEFAULT_INITIAL_CAPITAL,
};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_data_config, validate_scan_config,
    validate_sqlite_config,
};
use crate::domain::error::StratscanError;
use crate::domain::executor::{MultiTimeframeExecutor, SkippedStep};
use crate::domain::library::StrategyRegistry;
use crate::domain::scanner::{
    rank_by_pick_type, DailyScanner, PickProfile, ScanFailure, SignalResult,
    DEFAULT_LOOKBACK_DAYS, DEFAULT_TOP_K,
};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::bar_loader::BarSeriesLoader;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_sink::{ResultSink, SinkRecord};
use crate::ports::symbol_directory::SymbolDirectory;

#[derive(Parser, Debug)]
#[command(
    name = "stratscan",
    about = "Multi-timeframe strategy backtester and daily signal scanner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest one strategy over one or more symbols
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Registered strategy name
        #[arg(short, long)]
        strategy: String,
        /// Extra JSON strategy file or directory
        #[arg(long)]
        strategies: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// Output timeframe of the strategy
        #[arg(long, default_value = "1d")]
        timeframe: Timeframe,
        /// Write results as JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Upsert results into the [sqlite] store
        #[arg(long)]
        persist: bool,
    },
    /// Scan the universe for the latest signals and rank them
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        /// Scan date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Restrict to these strategy names
        #[arg(long = "strategy")]
        strategy_names: Vec<String>,
        #[arg(long)]
        strategies: Option<PathBuf>,
        /// Restrict to these symbols instead of the whole directory
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Vote across the configured pick profiles
        #[arg(long)]
        profiles: bool,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        persist: bool,
    },
    /// Validate strategy JSON and, optionally, a config file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List symbols available in the configured data source
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            strategy,
            strategies,
            symbols,
            timeframe,
            output,
            persist,
        } => run_backtest(
            &config,
            &strategy,
            strategies.as_deref(),
            &symbols,
            timeframe,
            output.as_deref(),
            persist,
        ),
        Command::Scan {
            config,
            date,
            strategy_names,
            strategies,
            symbols,
            profiles,
            top_k,
            output,
            persist,
        } => run_scan(ScanArgs {
            config,
            date,
            strategy_names,
            strategies,
            symbols,
            profiles,
            top_k,
            output,
            persist,
        }),
        Command::Validate { strategy, config } => run_validate(&strategy, config.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StratscanError> {
    let config = FileConfigAdapter::from_file(path)?;
    debug!(path = %path.display(), sections = ?config.sections(), "config loaded");
    Ok(config)
}

/// Bar loader and symbol directory behind the `[data]` section.
pub struct DataSource {
    pub loader: ResamplingLoader<Arc<dyn BarSeriesLoader>>,
    pub directory: Arc<dyn SymbolDirectory>,
}

pub fn build_data_source(config: &dyn ConfigPort) -> Result<DataSource, StratscanError> {
    validate_data_config(config)?;
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim() {
        "csv" => {
            let csv = Arc::new(CsvAdapter::from_config(config)?);
            info!(dir = %csv.base_path().display(), "using csv bar source");
            Ok(DataSource {
                loader: ResamplingLoader::new(csv.clone() as Arc<dyn BarSeriesLoader>),
                directory: csv,
            })
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let db = Arc::new(open_sqlite(config)?);
            info!("using sqlite bar source");
            Ok(DataSource {
                loader: ResamplingLoader::new(db.clone() as Arc<dyn BarSeriesLoader>),
                directory: db,
            })
        }
        other => Err(StratscanError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unsupported source '{other}'"),
        }),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(
    config: &dyn ConfigPort,
) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, StratscanError> {
    validate_sqlite_config(config)?;
    let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(adapter)
}

fn build_sink(config: &dyn ConfigPort) -> Result<Box<dyn ResultSink>, StratscanError> {
    #[cfg(feature = "sqlite")]
    {
        Ok(Box::new(open_sqlite(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        Err(StratscanError::Database {
            reason: "the sqlite feature is required for --persist".into(),
        })
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, StratscanError> {
    let position_sizing = match config
        .get_string("backtest", "position_sizing")
        .as_deref()
        .map(str::trim)
    {
        None | Some("full_reinvest") => PositionSizing::FullReinvest,
        Some("fixed_shares") => PositionSizing::FixedShares {
            quantity: config.get_int("backtest", "fixed_quantity", 1),
        },
        Some(other) => {
            return Err(StratscanError::ConfigInvalid {
                section: "backtest".into(),
                key: "position_sizing".into(),
                reason: format!("unknown mode '{other}'"),
            })
        }
    };

    Ok(BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL),
        commission: config.get_double("backtest", "commission", 0.0),
        slippage: config.get_double("backtest", "slippage", 0.0),
        position_sizing,
    })
}

/// Exit thresholds set in `[backtest]`; unset keys stay `None` so the
/// strategy's own exit steps can fill them.
pub fn build_exit_rules(config: &dyn ConfigPort) -> ExitRules {
    let fraction = |key: &str| {
        config
            .is_set("backtest", key)
            .then(|| config.get_double("backtest", key, 0.0))
    };
    ExitRules {
        stop_loss_pct: fraction("stop_loss_pct"),
        take_profit_pct: fraction("take_profit_pct"),
        trailing_stop_pct: fraction("trailing_stop_pct"),
        max_holding_days: config
            .is_set("backtest", "max_holding_days")
            .then(|| config.get_int("backtest", "max_holding_days", 1).max(1) as u32),
    }
}

pub fn build_date_range(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), StratscanError> {
    let start = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;
    Ok((start, end))
}

/// Prebuilt strategies plus any loaded from `extra`.
pub fn build_registry(extra: Option<&Path>) -> Result<StrategyRegistry, StratscanError> {
    let mut registry = StrategyRegistry::prebuilt()?;
    if let Some(path) = extra {
        let added = register_from_path(&mut registry, path)?;
        info!(path = %path.display(), added, "registered user strategies");
    }
    Ok(registry)
}

fn write_json<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<(), StratscanError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), "results written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Serialize)]
struct BacktestReport<'a> {
    strategy: &'a str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    results: Vec<BacktestResult>,
    skipped: BTreeMap<String, Vec<SkippedStep>>,
    failures: Vec<ScanFailure>,
}

fn run_backtest(
    config_path: &Path,
    strategy_name: &str,
    strategies_path: Option<&Path>,
    symbols: &[String],
    timeframe: Timeframe,
    output: Option<&Path>,
    persist: bool,
) -> Result<(), StratscanError> {
    info!(path = %config_path.display(), "loading config");
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;

    let bt_config = build_backtest_config(&config)?;
    let rules = build_exit_rules(&config);
    let (start, end) = build_date_range(&config)?;
    let registry = build_registry(strategies_path)?;
    let strategy = registry
        .get(strategy_name)
        .ok_or_else(|| StratscanError::invalid_strategy(strategy_name, "not registered"))?;
    let source = build_data_source(&config)?;
    let sink = if persist { Some(build_sink(&config)?) } else { None };

    let symbols = normalize_symbols(symbols);
    info!(
        strategy = strategy.name(),
        symbols = symbols.len(),
        %start,
        %end,
        %timeframe,
        "running backtest"
    );

    let executor = MultiTimeframeExecutor::new(&source.loader);
    let backtester = Backtester::new(bt_config);
    let mut report = BacktestReport {
        strategy: strategy.name(),
        start_date: start,
        end_date: end,
        results: Vec::new(),
        skipped: BTreeMap::new(),
        failures: Vec::new(),
    };

    let mut last_error = None;
    for symbol in &symbols {
        let outcome = executor
            .execute_strategy(strategy, symbol, &[], start, end, timeframe)
            .and_then(|execution| {
                let result = backtester.run_backtest(strategy, &execution.frame, rules)?;
                Ok((execution.skipped, result))
            });
        match outcome {
            Ok((skipped, result)) => {
                info!(
                    symbol = %symbol,
                    trades = result.metrics.total_trades,
                    total_return_pct = result.metrics.total_return_pct,
                    sharpe = result.metrics.sharpe_ratio,
                    "backtest complete"
                );
                if let Some(sink) = &sink {
                    sink.persist(SinkRecord::Backtest(&result))?;
                }
                if !skipped.is_empty() {
                    report.skipped.insert(symbol.clone(), skipped);
                }
                report.results.push(result);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol");
                report.failures.push(ScanFailure {
                    symbol: symbol.clone(),
                    strategy: strategy.name().to_string(),
                    pick_type: None,
                    timeframe: Some(timeframe),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                last_error = Some(e);
            }
        }
    }

    if report.results.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }
    write_json(&report, output)
}

struct ScanArgs {
    config: PathBuf,
    date: Option<NaiveDate>,
    strategy_names: Vec<String>,
    strategies: Option<PathBuf>,
    symbols: Vec<String>,
    profiles: bool,
    top_k: Option<usize>,
    output: Option<PathBuf>,
    persist: bool,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    scan_date: NaiveDate,
    picks: BTreeMap<String, Vec<SignalResult>>,
    failures: Vec<ScanFailure>,
}

/// `[scan] profiles`, or the short/long term defaults.
pub fn build_profiles(config: &dyn ConfigPort) -> Result<Vec<PickProfile>, StratscanError> {
    match config.get_string("scan", "profiles") {
        Some(s) => PickProfile::parse_list(&s),
        None => Ok(PickProfile::defaults()),
    }
}

fn run_scan(args: ScanArgs) -> Result<(), StratscanError> {
    info!(path = %args.config.display(), "loading config");
    let config = load_config(&args.config)?;
    validate_scan_config(&config)?;

    let registry = build_registry(args.strategies.as_deref())?;
    let strategies: Vec<&Strategy> = if args.strategy_names.is_empty() {
        registry.iter().collect()
    } else {
        registry.select(&args.strategy_names)?
    };
    let source = build_data_source(&config)?;
    let sink = if args.persist { Some(build_sink(&config)?) } else { None };

    let symbols = if args.symbols.is_empty() {
        source.directory.active_symbols()?.into_iter().collect()
    } else {
        normalize_symbols(&args.symbols)
    };
    let scan_date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let base = config
        .get_string("scan", "base_timeframe")
        .map(|s| s.parse::<Timeframe>())
        .transpose()
        .map_err(|e| StratscanError::ConfigInvalid {
            section: "scan".into(),
            key: "base_timeframe".into(),
            reason: e.to_string(),
        })?
        .unwrap_or(Timeframe::DAILY);
    let top_k = args
        .top_k
        .unwrap_or_else(|| config.get_int("scan", "top_k", DEFAULT_TOP_K as i64).max(1) as usize);
    let unique_symbol = config.get_bool("scan", "unique_symbol", true);

    let scanner = DailyScanner::new(&source.loader, &registry)
        .with_lookback_days(config.get_int("scan", "lookback_days", DEFAULT_LOOKBACK_DAYS))
        .with_base_timeframe(base);

    let outcome = if args.profiles {
        let profiles = build_profiles(&config)?;
        scanner.scan_pick_profiles(&symbols, &strategies, &profiles, scan_date)
    } else {
        scanner.scan(&symbols, &strategies, scan_date)
    };

    if let Some(sink) = &sink {
        if !args.profiles {
            sink.persist(SinkRecord::Signals(&outcome.results))?;
        }
    }
    let picks = rank_by_pick_type(outcome.results, top_k, unique_symbol);
    if let Some(sink) = &sink {
        for (pick_type, ranked) in &picks {
            sink.persist(SinkRecord::RankedPicks {
                scan_date,
                pick_type,
                picks: ranked,
            })?;
        }
    }

    for failure in &outcome.failures {
        warn!(
            symbol = %failure.symbol,
            strategy = %failure.strategy,
            kind = ?failure.kind,
            message = %failure.message,
            "unit failed"
        );
    }

    let report = ScanReport {
        scan_date,
        picks,
        failures: outcome.failures,
    };
    write_json(&report, args.output.as_deref())
}

fn run_validate(strategy_path: &Path, config_path: Option<&Path>) -> Result<(), StratscanError> {
    info!(path = %strategy_path.display(), "validating strategies");
    let strategies = load_strategies(strategy_path)?;
    for strategy in &strategies {
        let timeframes: Vec<String> = strategy
            .required_timeframes(Timeframe::DAILY)
            .iter()
            .map(Timeframe::to_string)
            .collect();
        println!(
            "{}: {} ({})",
            strategy.name(),
            if strategy.is_fixed() { "fixed" } else { "steps" },
            timeframes.join(", ")
        );
    }

    if let Some(path) = config_path {
        let config = load_config(path)?;
        validate_data_config(&config)?;
        if config.is_set("backtest", "start_date") {
            validate_backtest_config(&config)?;
        }
        validate_scan_config(&config)?;
        if config.is_set("sqlite", "path") {
            validate_sqlite_config(&config)?;
        }
        info!(path = %path.display(), "config is valid");
    }

    info!(count = strategies.len(), "strategies are valid");
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), StratscanError> {
    let config = load_config(config_path)?;
    let source = build_data_source(&config)?;
    let symbols = source.directory.active_symbols()?;
    if symbols.is_empty() {
        warn!("no symbols found");
    }
    for symbol in &symbols {
        println!("{symbol}");
    }
    info!(count = symbols.len(), "symbols listed");
    Ok(())
}
