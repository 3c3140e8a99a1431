//! LegoVM configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (LEGOVM_*)
//! 3. Config file (--config, or ~/.config/legovm/config.ron)
//! 4. Default values
//! ```
//!
//! `max_passes` and `time_limit_ms` bound `Vm::run` and take effect through
//! [`Vm::with_config`](crate::vm::Vm::with_config). The `legovm` binary only
//! loads images, so for it they are parsed and validated but never applied.
//!
//! # Usage
//!
//! ```rust
//! use legovm::util::config::VmConfig;
//!
//! let config: VmConfig = "(max_passes: Some(1000))".parse().unwrap();
//! assert_eq!(config.max_passes, Some(1000));
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::memory::DEFAULT_POOL_CAPACITY;
use crate::util::logger::LogLevel;
use crate::vm::RunLimits;

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Bytes the VM may allocate for dataspace, clumps and arrays
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Stop a run after this many passes (applied by `Vm::with_config`)
    #[serde(default)]
    pub max_passes: Option<u64>,
    /// Stop a run after this many milliseconds (applied by `Vm::with_config`)
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_memory_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_POOL_CAPACITY,
            max_passes: None,
            time_limit_ms: None,
            log_level: "info".to_string(),
        }
    }
}

/// Config errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    #[error("Serialize error: {0}")]
    SerializeError(#[from] ron::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("No config directory found")]
    NoConfigDir,
}

impl FromStr for VmConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ron::from_str(s)?)
    }
}

impl VmConfig {
    /// Run limits described by this config
    pub fn run_limits(&self) -> RunLimits {
        RunLimits {
            max_passes: self.max_passes,
            time_limit: self.time_limit_ms.map(Duration::from_millis),
        }
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level.parse().map_err(|_| ConfigError::InvalidValue {
            key: "log_level".to_string(),
            value: self.log_level.clone(),
        })
    }

    /// Apply `LEGOVM_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `LEGOVM_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LEGOVM_MEMORY") {
            self.memory_capacity = parse_env("LEGOVM_MEMORY", &value)?;
        }
        if let Some(value) = lookup("LEGOVM_MAX_PASSES") {
            self.max_passes = Some(parse_env("LEGOVM_MAX_PASSES", &value)?);
        }
        if let Some(value) = lookup("LEGOVM_TIME_LIMIT_MS") {
            self.time_limit_ms = Some(parse_env("LEGOVM_TIME_LIMIT_MS", &value)?);
        }
        if let Some(value) = lookup("LEGOVM_LOG") {
            self.log_level = value;
            self.log_level()?;
        }
        Ok(())
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

fn parse_env<T: FromStr>(
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("legovm"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("legovm"));
    }

    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("legovm"));
    }

    None
}

/// Get the user config file path (~/.config/legovm/config.ron)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.ron"))
}

/// Load a config file
pub fn load_config(path: &Path) -> Result<VmConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    content.parse()
}

/// Load the user config, or defaults if there is none
pub fn load_user_config() -> Result<VmConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(VmConfig::default()),
    }
}

/// Save a config file, creating its directory if needed
pub fn save_config(
    path: &Path,
    config: &VmConfig,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, config.to_ron()?)?;
    Ok(())
}
