//! Venue purchase recommendation engine
//!
//! Turns cleaned point-of-sale rows into per-user food and drink
//! recommendations using implicit-feedback alternating least squares.
//!
//! The pipeline per partition:
//!
//! 1. [`aggregate`] rows into (user, item) purchase counts with dense ids
//! 2. [`build_interaction_matrix`] into a sparse item x user confidence matrix
//! 3. [`AlternatingLeastSquares::fit`] latent factors
//! 4. [`Recommender::recommend`] unpurchased items ranked by score
//!
//! [`train_partitions`] runs steps 2 and 3 for every partition, isolating
//! failures so one partition never blocks the other.

pub mod aggregate;
pub mod matrix;
pub mod matrix_factorization;
pub mod pipeline;
pub mod recommendation;

pub use aggregate::{
    aggregate, AggregatedInteractions, IdMap, InteractionRecord, PartitionTable, TransactionRow,
};
pub use matrix::{build_interaction_matrix, CsrView, InteractionMatrix, DEFAULT_ALPHA};
pub use matrix_factorization::{AlsConfig, AlternatingLeastSquares, FactorModel};
pub use pipeline::{
    train_partition, train_partitions, PipelineConfig, TrainedModels, TrainedPartition,
    DEFAULT_TOP_N,
};
pub use recommendation::{Recommendation, Recommender};

pub use venue_recs_core::{Partition, RecommenderError, Result};
