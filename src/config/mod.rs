//! Application configuration loading and validation.
//!
//! The top-level `Config` aggregates the `[logger]`, `[metrics]` and
//! `[handlers]` tables of one TOML file. It is loaded once at startup,
//! before the tracing subscriber exists, and stays immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{handlers::HandlersConfig, logger::LoggerConfig, metrics::MetricsConfig};

pub mod handlers;
pub mod logger;
pub mod metrics;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "NECTAR_CONFIG";

/// Used when `NECTAR_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nectar/config.toml";

/// Macros for printing timestamped lines before the tracing subscriber is
/// initialized. Used during configuration loading and logger setup.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::config::print_early($crate::config::EarlyLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::config::print_early($crate::config::EarlyLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::config::print_early($crate::config::EarlyLevel::Error, format_args!($($arg)*))
    };
}

#[doc(hidden)]
#[derive(Debug, Clone, Copy)]
pub enum EarlyLevel {
    Info,
    Warn,
    Error,
}

#[doc(hidden)]
pub fn print_early(level: EarlyLevel, message: std::fmt::Arguments<'_>) {
    let now = time::OffsetDateTime::now_utc();
    let timestamp = now
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let level = match level {
        EarlyLevel::Info => console::style("INFO").green(),
        EarlyLevel::Warn => console::style("WARN").yellow(),
        EarlyLevel::Error => console::style("ERROR").red(),
    };
    println!("{}  {} {}", console::style(timestamp).dim(), level, message);
}

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file could be located.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub metrics: MetricsConfig,

    #[validate(nested)]
    pub handlers: HandlersConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration file cannot be found,
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::config_path(std::env::var(CONFIG_ENV).ok())?;
        Self::load(&config_path)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. the `NECTAR_CONFIG` environment variable (passed in as `from_env`)
    /// 2. `/etc/nectar/config.toml`
    fn config_path(from_env: Option<String>) -> Result<PathBuf, ConfigError> {
        if let Some(config_path) = from_env {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(format!(
            "No configuration file found; set {} or create {}",
            CONFIG_ENV, DEFAULT_CONFIG_PATH
        )))
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::parse(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const SAMPLE: &str = r#"
[logger]
level = "debug"

[metrics]
hostname = "db1"
collection_interval = 10

[[metrics.collectors]]
name = "mongodb"

[[metrics.collectors]]
name = "redisuploadqueue"
options = { host = "queue.internal", port = 6380 }

[handlers.datagram]
port = 5565
include_filters = "^mongo\\."
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.metrics.path_prefix, "servers");
        assert_eq!(config.metrics.collection_interval, 10);
        assert_eq!(config.metrics.collector_names(), ["mongodb", "redisuploadqueue"]);

        let datagram = config.handlers.datagram.unwrap();
        assert_eq!(datagram.port, 5565);
        assert_eq!(datagram.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_env_path_wins() {
        let path = Config::config_path(Some("/tmp/nectar-test.toml".into())).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/nectar-test.toml"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Config::parse("[metrics\n"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            Config::parse("[metrics]\ncollection_interval = 0\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            Config::parse("[handlers.datagram]\ninclude_filters = [\"(\"]\n"),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.metrics.collectors.is_empty());
        assert!(config.handlers.datagram.is_none());
    }
}
