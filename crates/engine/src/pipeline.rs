//! Per-partition training pipeline
//!
//! aggregate -> build matrix -> fit -> query, run independently for each
//! partition so a failure in one (say, no drink sales at all) never blocks the
//! other.

use crate::aggregate::{AggregatedInteractions, IdMap, PartitionTable};
use crate::matrix::{build_interaction_matrix, InteractionMatrix, DEFAULT_ALPHA};
use crate::matrix_factorization::{AlsConfig, AlternatingLeastSquares, FactorModel};
use crate::recommendation::{Recommendation, Recommender};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use venue_recs_core::config::parse_env_var;
use venue_recs_core::{ConfigLoader, Partition, RecommenderError, Result};

/// Default number of recommendations per query
pub const DEFAULT_TOP_N: usize = 3;

/// Full pipeline configuration
///
/// # Environment Variables
///
/// Everything [`AlsConfig`] reads, plus:
///
/// - `VENUE_RECS_ALPHA` (default: 40)
/// - `VENUE_RECS_TOP_N` (default: 3)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub als: AlsConfig,
    /// Confidence multiplier applied to purchase counts
    pub alpha: f32,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            als: AlsConfig::default(),
            alpha: DEFAULT_ALPHA,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl ConfigLoader for PipelineConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            als: AlsConfig::from_env()?,
            alpha: parse_env_var("VENUE_RECS_ALPHA", DEFAULT_ALPHA)?,
            top_n: parse_env_var("VENUE_RECS_TOP_N", DEFAULT_TOP_N)?,
        })
    }

    fn validate(&self) -> Result<()> {
        self.als.validate()?;

        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(RecommenderError::config(
                format!("alpha must be a positive finite number, got {}", self.alpha),
                "VENUE_RECS_ALPHA",
            ));
        }

        if self.top_n == 0 {
            return Err(RecommenderError::config(
                "top_n must be greater than 0",
                "VENUE_RECS_TOP_N",
            ));
        }

        Ok(())
    }
}

/// Trained model plus the matrix and item names it was trained on
#[derive(Debug, Clone)]
pub struct TrainedPartition {
    partition: Partition,
    items: Arc<IdMap>,
    matrix: InteractionMatrix,
    model: FactorModel,
}

impl TrainedPartition {
    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn items(&self) -> &IdMap {
        &self.items
    }

    pub fn matrix(&self) -> &InteractionMatrix {
        &self.matrix
    }

    pub fn model(&self) -> &FactorModel {
        &self.model
    }

    pub fn recommender(&self) -> Result<Recommender<'_>> {
        Recommender::new(self.partition, &self.model, &self.matrix, &self.items)
    }

    pub fn recommend(&self, user_id: usize, top_n: usize) -> Result<Vec<Recommendation>> {
        self.recommender()?.recommend(user_id, top_n)
    }

    /// Recommend for an opaque user key, resolved through the shared user map
    pub fn recommend_for_key(
        &self,
        users: &IdMap,
        user_key: &str,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let user_id = users
            .id_of(user_key)
            .ok_or_else(|| RecommenderError::UnknownUser {
                user: user_key.to_string(),
                partition: self.partition,
            })?;
        self.recommend(user_id, top_n)
    }
}

/// Build and fit one partition
///
/// A partition without purchases yields an empty model instead of invoking
/// the solver; every query against it fails with `UnknownUser`.
#[instrument(skip_all, fields(partition = %table.partition))]
pub fn train_partition(table: &PartitionTable, config: &PipelineConfig) -> Result<TrainedPartition> {
    config.validate()?;

    let matrix = build_interaction_matrix(table, config.alpha)?;

    let model = if matrix.is_empty() {
        info!("No purchases in partition; skipping fit");
        FactorModel::empty(config.als.factors)
    } else {
        AlternatingLeastSquares::new(config.als.clone()).fit(&matrix)?
    };

    info!(
        items = matrix.n_items(),
        users = matrix.n_users(),
        nnz = matrix.nnz(),
        iterations = model.iterations_completed(),
        "Partition trained"
    );

    Ok(TrainedPartition {
        partition: table.partition,
        items: Arc::clone(&table.items),
        matrix,
        model,
    })
}

/// Models for every partition, each trained or failed on its own
#[derive(Debug)]
pub struct TrainedModels {
    users: Arc<IdMap>,
    food: Result<TrainedPartition>,
    drink: Result<TrainedPartition>,
}

impl TrainedModels {
    pub fn users(&self) -> &IdMap {
        &self.users
    }

    pub fn partition(&self, partition: Partition) -> &Result<TrainedPartition> {
        match partition {
            Partition::Food => &self.food,
            Partition::Drink => &self.drink,
        }
    }

    /// Recommend for a user key within one partition
    ///
    /// If that partition failed to train, its training error is returned.
    pub fn recommend(
        &self,
        partition: Partition,
        user_key: &str,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        match self.partition(partition) {
            Ok(trained) => trained.recommend_for_key(&self.users, user_key, top_n),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Train every partition independently
pub fn train_partitions(data: &AggregatedInteractions, config: &PipelineConfig) -> TrainedModels {
    let train = |partition: Partition| {
        let result = train_partition(data.partition(partition), config);
        if let Err(e) = &result {
            warn!(%partition, error = %e, "Partition failed to train");
        }
        result
    };

    TrainedModels {
        users: Arc::clone(&data.users),
        food: train(Partition::Food),
        drink: train(Partition::Drink),
    }
}
