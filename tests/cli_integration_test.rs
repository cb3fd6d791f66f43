//! CLI integration tests for command orchestration.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_exit_rules, build_profiles)
//! - Data source construction from the `[data]` section
//! - `backtest`, `scan` and `validate` run against INI, CSV and JSON files on disk

mod common;

use approx::assert_relative_eq;
use clap::Parser;
use common::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use stratscan::adapters::file_config_adapter::FileConfigAdapter;
use stratscan::cli::{self, Cli};
use stratscan::domain::backtest::PositionSizing;
use stratscan::domain::error::StratscanError;
use stratscan::domain::timeframe::Timeframe;
use stratscan::ports::bar_loader::BarSeriesLoader;
use stratscan::ports::symbol_directory::SymbolDirectory;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config(content: &str) -> FileConfigAdapter {
    FileConfigAdapter::from_string(content).unwrap()
}

fn write_csv(dir: &Path, symbol: &str, closes: &[f64]) {
    let mut content = String::from("date,open,high,low,close,volume\n");
    for bar in bars_from_closes(symbol, closes) {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
}

/// Temp dir holding `data/BHP.csv`, `strategies.json` and `stratscan.ini`.
fn workspace(extra_ini: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    write_csv(&data, "BHP", &BREAKOUT_CLOSES);
    write_csv(&data, "CBA", &[100.0; 9]);
    fs::write(dir.path().join("strategies.json"), BREAKOUT_JSON).unwrap();
    let ini = format!(
        "[data]\ncsv_dir = {}\n\n[backtest]\ninitial_capital = 10000\nstart_date = 2024-01-01\nend_date = 2024-01-09\n{extra_ini}",
        data.display()
    );
    fs::write(dir.path().join("stratscan.ini"), ini).unwrap();
    dir
}

fn path_arg(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).display().to_string()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

mod config_loading {
    use super::*;

    #[test]
    fn backtest_config_defaults() {
        let bt = cli::build_backtest_config(&config("[backtest]\n")).unwrap();
        assert_relative_eq!(bt.initial_capital, 10_000.0);
        assert_relative_eq!(bt.commission, 0.0);
        assert_relative_eq!(bt.slippage, 0.0);
        assert_eq!(bt.position_sizing, PositionSizing::FullReinvest);
    }

    #[test]
    fn backtest_config_reads_values() {
        let bt = cli::build_backtest_config(&config(
            "[backtest]\ninitial_capital = 50000\ncommission = 9.95\nslippage = 0.001\nposition_sizing = fixed_shares\nfixed_quantity = 100\n",
        ))
        .unwrap();
        assert_relative_eq!(bt.initial_capital, 50_000.0);
        assert_relative_eq!(bt.commission, 9.95);
        assert_relative_eq!(bt.slippage, 0.001);
        assert_eq!(bt.position_sizing, PositionSizing::FixedShares { quantity: 100 });
    }

    #[test]
    fn unknown_position_sizing_is_rejected() {
        let err = cli::build_backtest_config(&config("[backtest]\nposition_sizing = kelly\n"))
            .unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { ref key, .. } if key == "position_sizing"));
    }

    #[test]
    fn unset_exit_rules_stay_unset() {
        let rules = cli::build_exit_rules(&config("[backtest]\nstop_loss_pct = 0.05\n"));
        assert_eq!(rules.stop_loss_pct, Some(0.05));
        assert_eq!(rules.take_profit_pct, None);
        assert_eq!(rules.trailing_stop_pct, None);
        assert_eq!(rules.max_holding_days, None);
    }

    #[test]
    fn exit_rules_read_holding_limit() {
        let rules = cli::build_exit_rules(&config(
            "[backtest]\ntake_profit_pct = 0.1\nmax_holding_days = 20\n",
        ));
        assert_eq!(rules.take_profit_pct, Some(0.1));
        assert_eq!(rules.max_holding_days, Some(20));
    }

    #[test]
    fn date_range_requires_both_dates() {
        let cfg = config("[backtest]\nstart_date = 2024-01-01\nend_date = 2024-06-30\n");
        let (start, end) = cli::build_date_range(&cfg).unwrap();
        assert_eq!(start, date(2024, 1, 1));
        assert_eq!(end, date(2024, 6, 30));

        let err = cli::build_date_range(&config("[backtest]\nstart_date = 2024-01-01\n"))
            .unwrap_err();
        assert!(matches!(err, StratscanError::ConfigMissing { .. }));
    }

    #[test]
    fn profiles_default_to_short_and_long_term() {
        let profiles = cli::build_profiles(&config("[scan]\n")).unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["short_term", "long_term"]);
    }

    #[test]
    fn profiles_parse_from_scan_section() {
        let profiles =
            cli::build_profiles(&config("[scan]\nprofiles = swing:1d,3d | position:5d,10d\n"))
                .unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "swing");
        assert_eq!(profiles[0].timeframes, vec![Timeframe::DAILY, Timeframe::days(3)]);
        assert_eq!(profiles[1].timeframes, vec![Timeframe::days(5), Timeframe::days(10)]);
    }

    #[test]
    fn missing_config_file_is_parse_error() {
        let err = cli::load_config(Path::new("/nonexistent/stratscan.ini")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigParse { .. }));
    }

    #[test]
    fn config_file_round_trips_through_disk() {
        let file = write_temp_ini("[backtest]\ninitial_capital = 25000\n");
        let cfg = cli::load_config(file.path()).unwrap();
        let bt = cli::build_backtest_config(&cfg).unwrap();
        assert_relative_eq!(bt.initial_capital, 25_000.0);
    }

    #[test]
    fn user_strategies_join_the_registry() {
        let dir = workspace("");
        let registry = cli::build_registry(Some(&dir.path().join("strategies.json"))).unwrap();
        assert!(registry.get("breakout_105").is_some());
        assert!(registry.get("golden_cross").is_some());
    }
}

mod data_source {
    use super::*;

    #[test]
    fn csv_source_lists_and_loads_symbols() {
        let dir = workspace("");
        let cfg = cli::load_config(&dir.path().join("stratscan.ini")).unwrap();
        let source = cli::build_data_source(&cfg).unwrap();

        let symbols = source.directory.active_symbols().unwrap();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["BHP", "CBA"]);

        let bars = source
            .loader
            .load("BHP", Timeframe::days(3), date(2024, 1, 1), date(2024, 1, 9))
            .unwrap();
        assert!(!bars.is_empty());
        assert!(bars.iter().all(|b| b.date <= date(2024, 1, 9)));
    }

    #[test]
    fn missing_csv_dir_is_reported() {
        let err = cli::build_data_source(&config("[data]\nsource = csv\n"))
            .err()
            .unwrap();
        assert!(matches!(err, StratscanError::ConfigMissing { ref key, .. } if key == "csv_dir"));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let err = cli::build_data_source(&config("[data]\nsource = parquet\n"))
            .err()
            .unwrap();
        assert!(matches!(err, StratscanError::ConfigInvalid { ref key, .. } if key == "source"));
    }
}

mod commands {
    use super::*;

    fn run(args: &[&str]) {
        let cli = Cli::try_parse_from(args).unwrap();
        let _ = cli::run(cli);
    }

    #[test]
    fn backtest_writes_report() {
        let dir = workspace("");
        let out = path_arg(&dir, "backtest.json");
        run(&[
            "stratscan",
            "backtest",
            "-c",
            &path_arg(&dir, "stratscan.ini"),
            "-s",
            "breakout_105",
            "--strategies",
            &path_arg(&dir, "strategies.json"),
            "--symbols",
            "BHP,XXX",
            "-o",
            &out,
        ]);

        let report = read_json(Path::new(&out));
        assert_eq!(report["strategy"], "breakout_105");
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["symbol"], "BHP");
        assert_eq!(results[0]["metrics"]["total_trades"], 2);
        assert_relative_eq!(
            results[0]["final_capital"].as_f64().unwrap(),
            9601.481220243342,
            epsilon = 1e-6
        );
        let failures = report["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["symbol"], "XXX");
    }

    #[test]
    fn configured_stop_loss_reaches_the_backtest() {
        let dir = workspace("stop_loss_pct = 0.05\n");
        let out = path_arg(&dir, "backtest.json");
        run(&[
            "stratscan",
            "backtest",
            "-c",
            &path_arg(&dir, "stratscan.ini"),
            "-s",
            "breakout_105",
            "--strategies",
            &path_arg(&dir, "strategies.json"),
            "--symbols",
            "BHP",
            "-o",
            &out,
        ]);

        let report = read_json(Path::new(&out));
        let trades = report["results"][0]["trades"].as_array().unwrap();
        assert_eq!(trades[0]["exit_reason"], "stop_loss");
    }

    #[test]
    fn scan_ranks_latest_signals() {
        let dir = workspace("");
        let out = path_arg(&dir, "scan.json");
        run(&[
            "stratscan",
            "scan",
            "-c",
            &path_arg(&dir, "stratscan.ini"),
            "--date",
            "2024-01-09",
            "--strategy",
            "breakout_105",
            "--strategies",
            &path_arg(&dir, "strategies.json"),
            "-o",
            &out,
        ]);

        let report = read_json(Path::new(&out));
        assert_eq!(report["scan_date"], "2024-01-09");
        let daily = report["picks"]["daily"].as_array().unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0]["symbol"], "BHP");
        assert_eq!(daily[0]["signal"], "BUY");
        assert!(report["failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn profile_scan_groups_by_pick_type() {
        let dir = workspace("\n[scan]\nprofiles = swing:1d,2d\n");
        let out = path_arg(&dir, "scan.json");
        run(&[
            "stratscan",
            "scan",
            "-c",
            &path_arg(&dir, "stratscan.ini"),
            "--date",
            "2024-01-09",
            "--strategy",
            "breakout_105",
            "--strategies",
            &path_arg(&dir, "strategies.json"),
            "--symbols",
            "BHP",
            "--profiles",
            "-o",
            &out,
        ]);

        let report = read_json(Path::new(&out));
        let swing = report["picks"]["swing"].as_array().unwrap();
        assert_eq!(swing.len(), 1);
        assert_eq!(swing[0]["metadata"]["pick_type"], "swing");
    }

    #[test]
    fn invalid_strategy_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, BREAKOUT_JSON.replace("THRESHOLD_CROSS", "COIN_FLIP")).unwrap();
        let cli = Cli::try_parse_from([
            "stratscan",
            "validate",
            "-s",
            path.to_str().unwrap(),
        ])
        .unwrap();
        // failure is reported through the exit code; the command must not panic
        let _ = cli::run(cli);

        let err = stratscan::adapters::strategy_file::load_strategies(&path).unwrap_err();
        assert!(matches!(err, StratscanError::StrategyInvalid { .. }));
    }

    #[test]
    fn symbols_are_required_for_backtest() {
        let result = Cli::try_parse_from(["stratscan", "backtest", "-c", "x.ini", "-s", "golden_cross"]);
        assert!(result.is_err());
    }
}
