//! Domain error types.
//!
//! Every failure falls into one of three kinds (see [`ErrorKind`]):
//! configuration problems are raised before evaluation starts, data problems
//! are scoped to a single symbol/timeframe, and evaluation problems abort the
//! run that produced them.

use crate::domain::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Data,
    Evaluation,
}

/// Top-level error type for stratscan.
#[derive(Debug, thiserror::Error)]
pub enum StratscanError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid strategy {strategy}: {reason}")]
    StrategyInvalid { strategy: String, reason: String },

    #[error("unknown indicator '{name}'")]
    UnknownIndicator { name: String },

    #[error("no data for {symbol} at {timeframe}")]
    DataUnavailable { symbol: String, timeframe: Timeframe },

    #[error("malformed data in {source_name}: {reason}")]
    DataFormat { source_name: String, reason: String },

    #[error("required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("strategy {strategy} failed: {reason}")]
    Evaluation { strategy: String, reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratscanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StratscanError::ConfigParse { .. }
            | StratscanError::ConfigMissing { .. }
            | StratscanError::ConfigInvalid { .. }
            | StratscanError::StrategyInvalid { .. }
            | StratscanError::UnknownIndicator { .. }
            | StratscanError::Json(_) => ErrorKind::Configuration,
            StratscanError::DataUnavailable { .. }
            | StratscanError::DataFormat { .. }
            | StratscanError::MissingColumn { .. }
            | StratscanError::ColumnLength { .. }
            | StratscanError::Database { .. }
            | StratscanError::DatabaseQuery { .. }
            | StratscanError::Io(_) => ErrorKind::Data,
            StratscanError::Evaluation { .. } => ErrorKind::Evaluation,
        }
    }

    pub(crate) fn invalid_strategy(strategy: &str, reason: impl Into<String>) -> Self {
        StratscanError::StrategyInvalid {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&StratscanError> for std::process::ExitCode {
    fn from(err: &StratscanError) -> Self {
        let code: u8 = match err {
            StratscanError::Io(_) => 1,
            StratscanError::ConfigParse { .. }
            | StratscanError::ConfigMissing { .. }
            | StratscanError::ConfigInvalid { .. } => 2,
            StratscanError::Database { .. } | StratscanError::DatabaseQuery { .. } => 3,
            StratscanError::StrategyInvalid { .. }
            | StratscanError::UnknownIndicator { .. }
            | StratscanError::Json(_) => 4,
            StratscanError::DataUnavailable { .. }
            | StratscanError::DataFormat { .. }
            | StratscanError::MissingColumn { .. }
            | StratscanError::ColumnLength { .. } => 5,
            StratscanError::Evaluation { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
