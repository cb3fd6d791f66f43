//! Port traits the domain depends on.

pub mod bar_loader;
pub mod config_port;
pub mod result_sink;
pub mod symbol_directory;
