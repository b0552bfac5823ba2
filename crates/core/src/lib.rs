//! # Venue Recommendations Core
//!
//! Shared building blocks for the venue recommendation workspace.
//!
//! ## Modules
//!
//! - `types`: Partition definitions and the category mapping
//! - `error`: Error taxonomy for aggregation, training and queries
//! - `config`: Environment-driven configuration loading and validation
//! - `observability`: Structured logging setup

pub mod config;
pub mod error;
pub mod observability;
pub mod types;

pub use config::{load_dotenv, parse_env_var, ConfigLoader, ENV_PREFIX};
pub use error::RecommenderError;
pub use observability::{init_logging, LogConfig, LogFormat, ObservabilityError};
pub use types::Partition;

/// Result type alias for recommendation operations
pub type Result<T> = std::result::Result<T, RecommenderError>;
