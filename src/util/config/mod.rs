//! Bridge configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. UIBRIDGE_LOG environment variable (log level only)
//! 2. File named by --config or UIBRIDGE_CONFIG
//! 3. Default values
//! ```
//!
//! # Example file
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [scope]
//! large_scope_warning = 128
//!
//! [registry]
//! sweep_interval = 1000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runtime::scope::DEFAULT_LARGE_SCOPE_WARNING;
use crate::util::logger::LogLevel;

/// Environment variable overriding the log level
pub const LOG_ENV: &str = "UIBRIDGE_LOG";

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "UIBRIDGE_CONFIG";

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
    /// Handle scope settings
    #[serde(default)]
    pub scope: ScopeConfig,
    /// Instance registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Handle scope configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Owned handle count above which a scope logs a warning (0 = never)
    #[serde(default = "default_large_scope_warning")]
    pub large_scope_warning: usize,
}

fn default_large_scope_warning() -> usize {
    DEFAULT_LARGE_SCOPE_WARNING
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            large_scope_warning: DEFAULT_LARGE_SCOPE_WARNING,
        }
    }
}

/// Instance registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Full sweep every N protect calls (0 = purge only on access)
    #[serde(default)]
    pub sweep_interval: usize,
}

impl BridgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.log_level()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Parsed log level
    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.log
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log.level.clone()))
    }

    /// Apply the log level from `UIBRIDGE_LOG`, if set
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = std::env::var(LOG_ENV) {
            level
                .parse::<LogLevel>()
                .map_err(|_| ConfigError::InvalidLogLevel(level.clone()))?;
            self.log.level = level;
        }
        Ok(())
    }
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    BridgeConfig::from_toml_str(&content)
}

/// Load configuration from `path`, falling back to `UIBRIDGE_CONFIG` and
/// then to defaults; `UIBRIDGE_LOG` is applied last
pub fn load(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let file = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut config = match file {
        Some(file) => load_config(&file)?,
        None => BridgeConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Load configuration from the environment only
pub fn load_from_env() -> Result<BridgeConfig, ConfigError> {
    load(None)
}

/// Save configuration, creating parent directories as needed
pub fn save_config(
    path: &Path,
    config: &BridgeConfig,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }

    let content = config.to_toml_string()?;
    fs::write(path, content).map_err(ConfigError::IoError)?;

    Ok(())
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    InvalidLogLevel(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::InvalidLogLevel(level) => write!(f, "Invalid log level: {}", level),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests;
