//! Structured logging setup
//!
//! Logging goes through `tracing`; binaries call [`init_logging`] once at
//! startup. `RUST_LOG` wins over the configured level when set.

use crate::config::{ConfigLoader, ENV_PREFIX};
use crate::error::RecommenderError;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging initialization errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable multi-line output
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
///
/// # Environment Variables
///
/// - `VENUE_RECS_LOG_LEVEL` (optional): trace, debug, info, warn, error (default: info)
/// - `VENUE_RECS_LOG_FORMAT` (optional): json or pretty (default: json)
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl ConfigLoader for LogConfig {
    fn from_env() -> Result<Self, RecommenderError> {
        let level_key = format!("{}LOG_LEVEL", ENV_PREFIX);
        let format_key = format!("{}LOG_FORMAT", ENV_PREFIX);

        let level = std::env::var(&level_key).unwrap_or_else(|_| LogConfig::default().level);
        let format = match std::env::var(&format_key) {
            Ok(v) => v
                .parse::<LogFormat>()
                .map_err(|e| RecommenderError::config(e, &format_key))?,
            Err(_) => LogConfig::default().format,
        };

        Ok(Self { level, format })
    }

    fn validate(&self) -> Result<(), RecommenderError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(RecommenderError::config(
                format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.level,
                    valid_log_levels.join(", ")
                ),
                &format!("{}LOG_LEVEL", ENV_PREFIX),
            ));
        }
        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Fails if the filter cannot be parsed or a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), ObservabilityError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| ObservabilityError::InvalidFilter(config.level.clone()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    result.map_err(|e| ObservabilityError::SubscriberInit(e.to_string()))
}
