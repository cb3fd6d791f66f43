//! Configuration validation.
//!
//! Checks INI values before any data is loaded, so a bad key fails the run
//! up front rather than half-way through a scan.

use crate::domain::error::StratscanError;
use crate::domain::scanner::PickProfile;
use crate::domain::timeframe::Timeframe;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    match validate_source(config)? {
        DataSourceKind::Csv => validate_csv_dir(config),
        DataSourceKind::Sqlite => validate_sqlite_config(config),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_position_sizing(config)?;
    validate_fraction(config, "stop_loss_pct")?;
    validate_fraction(config, "take_profit_pct")?;
    validate_fraction(config, "trailing_stop_pct")?;
    validate_max_holding_days(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_scan_config(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    validate_lookback_days(config)?;
    validate_base_timeframe(config)?;
    validate_top_k(config)?;
    validate_profiles(config)?;
    Ok(())
}

pub fn validate_sqlite_config(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    validate_sqlite_path(config)?;
    validate_pool_size(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratscanError {
    StratscanError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> StratscanError {
    StratscanError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

enum DataSourceKind {
    Csv,
    Sqlite,
}

fn validate_source(config: &dyn ConfigPort) -> Result<DataSourceKind, StratscanError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim() {
        "csv" => Ok(DataSourceKind::Csv),
        "sqlite" => Ok(DataSourceKind::Sqlite),
        other => Err(invalid(
            "data",
            "source",
            format!("unsupported source '{other}', expected csv or sqlite"),
        )),
    }
}

fn validate_csv_dir(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    match config.get_string("data", "csv_dir") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(missing("data", "csv_dir")),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_double("backtest", "initial_capital", 10_000.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_double("backtest", "commission", 0.0);
    if value < 0.0 {
        return Err(invalid(
            "backtest",
            "commission",
            "commission must be non-negative",
        ));
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_double("backtest", "slippage", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "slippage",
            "slippage must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_position_sizing(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let mode = config
        .get_string("backtest", "position_sizing")
        .unwrap_or_else(|| "full_reinvest".to_string());
    match mode.trim() {
        "full_reinvest" => Ok(()),
        "fixed_shares" => {
            let quantity = config.get_int("backtest", "fixed_quantity", 0);
            if quantity < 1 {
                return Err(invalid(
                    "backtest",
                    "fixed_quantity",
                    "fixed_quantity must be at least 1 when position_sizing = fixed_shares",
                ));
            }
            Ok(())
        }
        other => Err(invalid(
            "backtest",
            "position_sizing",
            format!("unknown mode '{other}', expected full_reinvest or fixed_shares"),
        )),
    }
}

/// Optional threshold; when set it must lie strictly inside (0, 1).
fn validate_fraction(config: &dyn ConfigPort, key: &str) -> Result<(), StratscanError> {
    if !config.is_set("backtest", key) {
        return Ok(());
    }
    let value = config.get_double("backtest", key, f64::NAN);
    if !(value > 0.0 && value < 1.0) {
        return Err(invalid(
            "backtest",
            key,
            format!("{key} must be between 0 and 1 (exclusive)"),
        ));
    }
    Ok(())
}

fn validate_max_holding_days(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    if !config.is_set("backtest", "max_holding_days") {
        return Ok(());
    }
    let value = config.get_int("backtest", "max_holding_days", 0);
    if value < 1 {
        return Err(invalid(
            "backtest",
            "max_holding_days",
            "max_holding_days must be at least 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, StratscanError> {
    match value {
        None => Err(missing("backtest", field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_lookback_days(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_int("scan", "lookback_days", 365);
    if value < 1 {
        return Err(invalid(
            "scan",
            "lookback_days",
            "lookback_days must be at least 1",
        ));
    }
    Ok(())
}

fn validate_base_timeframe(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    match config.get_string("scan", "base_timeframe") {
        None => Ok(()),
        Some(s) => s
            .parse::<Timeframe>()
            .map(|_| ())
            .map_err(|e| invalid("scan", "base_timeframe", e.to_string())),
    }
}

fn validate_top_k(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_int("scan", "top_k", 10);
    if value < 1 {
        return Err(invalid("scan", "top_k", "top_k must be at least 1"));
    }
    Ok(())
}

fn validate_profiles(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    match config.get_string("scan", "profiles") {
        None => Ok(()),
        Some(s) => {
            let profiles = PickProfile::parse_list(&s)?;
            if profiles.iter().any(|p| p.timeframes.is_empty()) {
                return Err(invalid(
                    "scan",
                    "profiles",
                    "every profile needs at least one timeframe",
                ));
            }
            Ok(())
        }
    }
}

fn validate_sqlite_path(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    match config.get_string("sqlite", "path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(missing("sqlite", "path")),
    }
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), StratscanError> {
    let value = config.get_int("sqlite", "pool_size", 4);
    if !(1..=64).contains(&value) {
        return Err(invalid(
            "sqlite",
            "pool_size",
            "pool_size must be between 1 and 64",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const DATES: &str = "start_date = 2020-01-01\nend_date = 2024-12-31\n";

    fn backtest(extra: &str) -> FileConfigAdapter {
        make_config(&format!("[backtest]\n{DATES}{extra}"))
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 100000.0
commission = 10.0
slippage = 0.001
position_sizing = fixed_shares
fixed_quantity = 100
stop_loss_pct = 0.05
take_profit_pct = 0.10
max_holding_days = 20
start_date = 2020-01-01
end_date = 2024-12-31
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_backtest_config(&backtest("")).is_ok());
        assert!(validate_scan_config(&make_config("[scan]\n")).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let err = validate_backtest_config(&backtest("initial_capital = 0\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn commission_negative_fails() {
        let err = validate_backtest_config(&backtest("commission = -5\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "commission"));
    }

    #[test]
    fn slippage_out_of_range_fails() {
        let err = validate_backtest_config(&backtest("slippage = 1.5\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "slippage"));
    }

    #[test]
    fn unknown_position_sizing_fails() {
        let err = validate_backtest_config(&backtest("position_sizing = kelly\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "position_sizing")
        );
    }

    #[test]
    fn fixed_shares_needs_quantity() {
        let err =
            validate_backtest_config(&backtest("position_sizing = fixed_shares\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "fixed_quantity")
        );
    }

    #[test]
    fn stop_loss_must_be_fraction() {
        let err = validate_backtest_config(&backtest("stop_loss_pct = 5\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "stop_loss_pct"));
    }

    #[test]
    fn take_profit_non_numeric_fails() {
        let err = validate_backtest_config(&backtest("take_profit_pct = lots\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "take_profit_pct")
        );
    }

    #[test]
    fn max_holding_days_zero_fails() {
        let err = validate_backtest_config(&backtest("max_holding_days = 0\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "max_holding_days")
        );
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_csv_dir_fails() {
        let err = validate_data_config(&make_config("[data]\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigMissing { key, .. } if key == "csv_dir"));
        assert!(validate_data_config(&make_config("[data]\ncsv_dir = ./bars\n")).is_ok());
    }

    #[test]
    fn sqlite_source_needs_sqlite_section() {
        let err = validate_data_config(&make_config("[data]\nsource = sqlite\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigMissing { key, .. } if key == "path"));
        let ok = make_config("[data]\nsource = sqlite\n[sqlite]\npath = bars.db\n");
        assert!(validate_data_config(&ok).is_ok());
        let err = validate_data_config(&make_config("[data]\nsource = s3\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "source"));
    }

    #[test]
    fn bad_base_timeframe_fails() {
        let err = validate_scan_config(&make_config("[scan]\nbase_timeframe = 1w\n")).unwrap_err();
        assert!(
            matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "base_timeframe")
        );
    }

    #[test]
    fn top_k_zero_fails() {
        let err = validate_scan_config(&make_config("[scan]\ntop_k = 0\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "top_k"));
    }

    #[test]
    fn lookback_zero_fails() {
        let err = validate_scan_config(&make_config("[scan]\nlookback_days = 0\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "lookback_days"));
    }

    #[test]
    fn profiles_must_parse() {
        let ok = make_config("[scan]\nprofiles = short_term:1d,3d,5d | long_term:8d,13d\n");
        assert!(validate_scan_config(&ok).is_ok());
        let err = validate_scan_config(&make_config("[scan]\nprofiles = broken\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "profiles"));
    }

    #[test]
    fn sqlite_pool_size_bounds() {
        let ok = make_config("[sqlite]\npath = signals.db\npool_size = 4\n");
        assert!(validate_sqlite_config(&ok).is_ok());
        let err =
            validate_sqlite_config(&make_config("[sqlite]\npath = x.db\npool_size = 0\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigInvalid { key, .. } if key == "pool_size"));
        let err = validate_sqlite_config(&make_config("[sqlite]\n")).unwrap_err();
        assert!(matches!(err, StratscanError::ConfigMissing { key, .. } if key == "path"));
    }
}
