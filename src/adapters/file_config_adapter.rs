//! INI configuration for `[data]`, `[backtest]`, `[scan]` and `[sqlite]`.

use crate::domain::error::StratscanError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
    origin: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StratscanError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| StratscanError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            origin: path.display().to_string(),
        })
    }

    pub fn from_string(content: &str) -> Result<Self, StratscanError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| StratscanError::ConfigParse {
                file: "<inline>".into(),
                reason,
            })?;
        Ok(Self {
            config,
            origin: "<inline>".into(),
        })
    }

    /// File the settings came from, or `<inline>`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    // `key =` with nothing after it reads as unset
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| Self::parse_bool(&v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[data]
source = csv
csv_dir = /srv/bars

[backtest]
initial_capital = 25000.5
position_sizing = fixed_shares
fixed_quantity = 100
stop_loss_pct =

[scan]
top_k = 5
unique_symbol = off
profiles = short_term:1d,3d | long_term:8d,13d ; trailing comment
"#;

    fn adapter() -> FileConfigAdapter {
        FileConfigAdapter::from_string(FULL).unwrap()
    }

    #[test]
    fn reads_every_section() {
        assert_eq!(adapter().sections(), vec!["backtest", "data", "scan"]);
        assert_eq!(adapter().origin(), "<inline>");
    }

    #[test]
    fn strings_are_trimmed() {
        assert_eq!(
            adapter().get_string("data", "csv_dir").as_deref(),
            Some("/srv/bars")
        );
        assert_eq!(adapter().get_string("data", "missing"), None);
        assert_eq!(adapter().get_string("nowhere", "csv_dir"), None);
    }

    #[test]
    fn empty_value_is_unset() {
        assert_eq!(adapter().get_string("backtest", "stop_loss_pct"), None);
        assert_eq!(adapter().get_double("backtest", "stop_loss_pct", 0.07), 0.07);
    }

    #[test]
    fn numbers_fall_back_to_default() {
        let a = adapter();
        assert_eq!(a.get_int("backtest", "fixed_quantity", 1), 100);
        assert_eq!(a.get_int("backtest", "position_sizing", 1), 1);
        assert_eq!(a.get_double("backtest", "initial_capital", 0.0), 25000.5);
        assert_eq!(a.get_double("scan", "lookback_days", 365.0), 365.0);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let a = FileConfigAdapter::from_string("[scan]\na = Yes\nb = on\nc = 0\nd = maybe\n").unwrap();
        assert!(a.get_bool("scan", "a", false));
        assert!(a.get_bool("scan", "b", false));
        assert!(!a.get_bool("scan", "c", true));
        assert!(a.get_bool("scan", "d", true));
        assert!(!adapter().get_bool("scan", "unique_symbol", true));
    }

    #[test]
    fn semicolon_starts_a_comment() {
        assert_eq!(
            adapter().get_string("scan", "profiles").as_deref(),
            Some("short_term:1d,3d | long_term:8d,13d")
        );
    }

    #[test]
    fn from_file_records_origin() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[sqlite]\npath = /tmp/stratscan.db\n").unwrap();
        let a = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(a.origin(), file.path().display().to_string());
        assert_eq!(a.get_string("sqlite", "path").as_deref(), Some("/tmp/stratscan.db"));
    }

    #[test]
    fn missing_file_is_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/stratscan.ini").err().unwrap();
        assert!(matches!(err, StratscanError::ConfigParse { .. }));
    }
}
