//! Error types shared by every stage of the recommendation pipeline.

use crate::types::Partition;

/// Errors raised while aggregating, training or querying recommendation models
///
/// Every variant is a distinct condition the caller can match on. None of them
/// is ever turned into an empty result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecommenderError {
    /// Interaction matrix with zero rows or zero columns passed to the solver
    #[error("Degenerate interaction matrix ({rows} items x {cols} users)")]
    DimensionError { rows: usize, cols: usize },

    /// User id or key not present in a partition
    #[error("User {user} not in {partition} partition")]
    UnknownUser { user: String, partition: Partition },

    /// Item id without an entry in a partition's id map
    #[error("Item {item_id} not in {partition} partition")]
    UnknownItem { item_id: usize, partition: Partition },

    /// Invalid hyperparameter or environment value
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    /// Least-squares solve failed numerically
    #[error("Solver error: {0}")]
    SolverError(String),

    /// Malformed input handed to a builder
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RecommenderError {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Partition the error is scoped to, if any
    pub fn partition(&self) -> Option<Partition> {
        match self {
            Self::UnknownUser { partition, .. } | Self::UnknownItem { partition, .. } => {
                Some(*partition)
            }
            _ => None,
        }
    }
}
