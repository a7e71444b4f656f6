//! Configuration - store location, default plan and log filter
//!
//! Read from YAML. Every field has a default, so a missing file or an empty
//! document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `data_dir`
pub const DATA_DIR_ENV: &str = "DELEGATOR_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the plan document
    pub data_dir: PathBuf,
    /// Plan document file name inside `data_dir`
    pub file_name: String,
    /// Plan used when none is given on the command line
    pub default_plan: String,
    /// env_logger filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            file_name: "plans.json".to_string(),
            default_plan: "__default__".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("delegator").join("config.yml"))
    }

    /// Load from `path`, or from the per-user file when `path` is `None`.
    /// A file that does not exist yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        Ok(config.with_env())
    }

    /// Load from a specific YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    /// Full path of the plan document
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}
