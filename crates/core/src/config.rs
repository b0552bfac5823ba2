//! Shared configuration loader for recommendation services
//!
//! Configuration is read from environment variables with the `VENUE_RECS_`
//! prefix, with optional `.env` support via dotenvy. Each configuration type
//! implements [`ConfigLoader`] so that loading and validation look the same
//! everywhere.
//!
//! # Example
//!
//! ```no_run
//! use venue_recs_core::config::{load_dotenv, ConfigLoader};
//! use venue_recs_core::observability::LogConfig;
//!
//! # fn example() -> Result<(), venue_recs_core::RecommenderError> {
//! load_dotenv();
//!
//! let log_config = LogConfig::from_env()?;
//! log_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::RecommenderError;

/// Prefix shared by every environment variable this workspace reads
pub const ENV_PREFIX: &str = "VENUE_RECS_";

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// Missing variables fall back to the type's defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a variable is set but cannot be parsed.
    fn from_env() -> Result<Self, RecommenderError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the offending key if any check fails.
    fn validate(&self) -> Result<(), RecommenderError>;
}

/// Parse an environment variable, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the value is present but cannot be parsed
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, RecommenderError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| RecommenderError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// Parse an optional environment variable; unset or empty yields `None`
pub fn parse_optional_env_var<T>(key: &str) -> Result<Option<T>, RecommenderError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RecommenderError::config(format!("Failed to parse {}: {}", key, e), key)),
        _ => Ok(None),
    }
}

/// Parse a boolean flag accepting `true`/`false`/`1`/`0`/`yes`/`no`
pub fn parse_env_flag(key: &str, default: bool) -> Result<bool, RecommenderError> {
    match std::env::var(key) {
        Ok(v) => match v.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(RecommenderError::config(
                format!("Failed to parse {}: '{}' is not a boolean", key, other),
                key,
            )),
        },
        Err(_) => Ok(default),
    }
}

/// Load .env file if present
///
/// Does not return an error if the file is missing.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
