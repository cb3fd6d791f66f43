//! JSON strategy definitions on disk.
//!
//! A file holds either one strategy object or an array of them. A directory
//! is read as every `*.json` file inside it, in file-name order.

use crate::domain::error::StratscanError;
use crate::domain::library::StrategyRegistry;
use crate::domain::strategy::{Strategy, StrategyConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyDocument {
    Many(Vec<StrategyConfig>),
    One(StrategyConfig),
}

/// Parses one JSON document into validated strategies.
pub fn parse_strategies(json: &str, origin: &str) -> Result<Vec<Strategy>, StratscanError> {
    // untagged errors are opaque, so retry the single form for a useful message
    let document: StrategyDocument = match serde_json::from_str(json) {
        Ok(doc) => doc,
        Err(_) => {
            let one: StrategyConfig =
                serde_json::from_str(json).map_err(|e| StratscanError::StrategyInvalid {
                    strategy: origin.to_string(),
                    reason: e.to_string(),
                })?;
            StrategyDocument::One(one)
        }
    };
    let configs = match document {
        StrategyDocument::Many(configs) => configs,
        StrategyDocument::One(config) => vec![config],
    };
    configs.into_iter().map(Strategy::try_from).collect()
}

pub fn load_strategy_file(path: &Path) -> Result<Vec<Strategy>, StratscanError> {
    let json = fs::read_to_string(path)?;
    let strategies = parse_strategies(&json, &path.display().to_string())?;
    debug!(path = %path.display(), count = strategies.len(), "loaded strategies");
    Ok(strategies)
}

/// Loads a file, or every `*.json` file of a directory.
pub fn load_strategies(path: &Path) -> Result<Vec<Strategy>, StratscanError> {
    if !path.is_dir() {
        return load_strategy_file(path);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    files.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("json"));
    files.sort();

    let mut strategies = Vec::new();
    for file in files {
        strategies.extend(load_strategy_file(&file)?);
    }
    Ok(strategies)
}

/// Adds user strategies to `registry`; a name clash replaces the existing
/// entry.
pub fn register_from_path(
    registry: &mut StrategyRegistry,
    path: &Path,
) -> Result<usize, StratscanError> {
    let strategies = load_strategies(path)?;
    let count = strategies.len();
    for strategy in strategies {
        registry.register(strategy);
    }
    Ok(count)
}
