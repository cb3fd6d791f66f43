//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod resampling_loader;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod strategy_file;
