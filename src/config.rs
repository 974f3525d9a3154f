//! Engine configuration loaded from YAML, TOML or JSON files.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::error::LoadError;
use super::matching::MatchLimits;

/// Default number of passes over the rule set allowed by the `N` flag.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Inline rule text, appended after `rules_file`.
    pub rules: Option<String>,
    pub rules_file: Option<PathBuf>,
    pub max_iterations: usize,
    pub regex: MatchLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: None,
            rules_file: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            regex: MatchLimits::default(),
        }
    }
}

/// Errors when loading an [`EngineConfig`] or the rules it references.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration")]
    Io(#[from] io::Error),

    #[error("Invalid yaml configuration")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid toml configuration")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid json configuration")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported configuration format: {0:?}")]
    UnknownFormat(PathBuf),

    #[error("Failed to load rewrite rules")]
    Rules(#[from] LoadError),
}

/// Read a configuration file, choosing the format by its extension.
///
/// A relative `rules_file` is resolved against the directory holding the
/// configuration file.
pub fn load_configuration<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| matches!(ext.as_str(), "yaml" | "yml" | "toml" | "json"))
        .ok_or_else(|| ConfigError::UnknownFormat(path.to_owned()))?;

    let content = fs::read_to_string(path)?;
    let mut config: EngineConfig = match format.as_str() {
        "toml" => toml::from_str(&content)?,
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.rules_file = config.rules_file.map(|file| match file.is_relative() {
        true => base.join(file),
        false => file,
    });
    Ok(config)
}
