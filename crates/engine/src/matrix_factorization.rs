//! Matrix Factorization using Alternating Least Squares (ALS)
//!
//! Implicit-feedback ALS over an item x user interaction matrix. Every stored
//! cell is a "preference exists" signal (`p = 1`) whose confidence is the
//! stored weight itself (`c = alpha * count`); missing cells are `p = 0, c = 1`.
//! Each half-step solves,
//! per row,
//!
//! ```text
//! (YᵀY + λI + Σᵢ (cᵢ - 1) yᵢ yᵢᵀ) x = Σᵢ cᵢ yᵢ
//! ```
//!
//! with the Gram matrix `YᵀY` computed once per half-step, so a row costs
//! `O(nnz_row · k² + k³)` instead of touching every column.

use crate::matrix::{CsrView, InteractionMatrix};
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use venue_recs_core::config::{parse_env_flag, parse_env_var, parse_optional_env_var};
use venue_recs_core::{ConfigLoader, RecommenderError, Result};

/// Floor applied to λ so every normal-equation system stays positive definite
const MIN_REGULARIZATION: f64 = 1e-6;

/// ALS configuration parameters
///
/// # Environment Variables
///
/// - `VENUE_RECS_FACTORS` (default: 50)
/// - `VENUE_RECS_ITERATIONS` (default: 100)
/// - `VENUE_RECS_REGULARIZATION` (default: 0.01)
/// - `VENUE_RECS_SEED` (default: 42)
/// - `VENUE_RECS_NUM_THREADS` (default: 1, `0` lets rayon pick)
/// - `VENUE_RECS_DEADLINE_SECS` (optional)
/// - `VENUE_RECS_TRAINING_LOSS` (default: false)
#[derive(Debug, Clone, PartialEq)]
pub struct AlsConfig {
    /// Number of latent factors (embedding dimension)
    pub factors: usize,
    /// Number of full user/item sweeps
    pub iterations: usize,
    /// Regularization parameter (lambda)
    pub regularization: f32,
    /// Seed for factor initialization
    pub seed: u64,
    /// Size of the dedicated solver thread pool
    pub num_threads: usize,
    /// Wall-clock budget, checked between iterations
    pub deadline: Option<Duration>,
    /// Compute the implicit loss after every iteration
    pub calculate_training_loss: bool,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 50,
            iterations: 100,
            regularization: 0.01,
            seed: 42,
            num_threads: 1,
            deadline: None,
            calculate_training_loss: false,
        }
    }
}

impl ConfigLoader for AlsConfig {
    fn from_env() -> Result<Self> {
        let defaults = AlsConfig::default();

        let deadline = match parse_optional_env_var::<f64>("VENUE_RECS_DEADLINE_SECS")? {
            Some(secs) if secs > 0.0 => Some(Duration::try_from_secs_f64(secs).map_err(|e| {
                RecommenderError::config(
                    format!("deadline of {} seconds is not representable: {}", secs, e),
                    "VENUE_RECS_DEADLINE_SECS",
                )
            })?),
            Some(secs) => {
                return Err(RecommenderError::config(
                    format!("deadline must be a positive number of seconds, got {}", secs),
                    "VENUE_RECS_DEADLINE_SECS",
                ))
            }
            None => None,
        };

        Ok(Self {
            factors: parse_env_var("VENUE_RECS_FACTORS", defaults.factors)?,
            iterations: parse_env_var("VENUE_RECS_ITERATIONS", defaults.iterations)?,
            regularization: parse_env_var("VENUE_RECS_REGULARIZATION", defaults.regularization)?,
            seed: parse_env_var("VENUE_RECS_SEED", defaults.seed)?,
            num_threads: parse_env_var("VENUE_RECS_NUM_THREADS", defaults.num_threads)?,
            deadline,
            calculate_training_loss: parse_env_flag(
                "VENUE_RECS_TRAINING_LOSS",
                defaults.calculate_training_loss,
            )?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.factors == 0 {
            return Err(RecommenderError::config(
                "factors must be greater than 0",
                "VENUE_RECS_FACTORS",
            ));
        }

        if self.iterations == 0 {
            return Err(RecommenderError::config(
                "iterations must be greater than 0",
                "VENUE_RECS_ITERATIONS",
            ));
        }

        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(RecommenderError::config(
                format!(
                    "regularization must be a finite non-negative number, got {}",
                    self.regularization
                ),
                "VENUE_RECS_REGULARIZATION",
            ));
        }

        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(RecommenderError::config(
                "deadline must be greater than 0",
                "VENUE_RECS_DEADLINE_SECS",
            ));
        }

        Ok(())
    }
}

/// Fitted latent factors for one partition
///
/// Read-only once returned from [`AlternatingLeastSquares::fit`]; retraining
/// produces a new model.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorModel {
    /// Item latent factors: [num_items x factors]
    item_factors: Array2<f32>,
    /// User latent factors: [num_users x factors]
    user_factors: Array2<f32>,
    iterations_completed: usize,
    training_loss: Option<f32>,
}

impl FactorModel {
    /// Model with no users and no items, for partitions without purchases
    pub fn empty(factors: usize) -> Self {
        Self {
            item_factors: Array2::zeros((0, factors)),
            user_factors: Array2::zeros((0, factors)),
            iterations_completed: 0,
            training_loss: None,
        }
    }

    pub fn factors(&self) -> usize {
        self.item_factors.ncols()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.nrows()
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.nrows()
    }

    pub fn item_factors(&self) -> &Array2<f32> {
        &self.item_factors
    }

    pub fn user_factors(&self) -> &Array2<f32> {
        &self.user_factors
    }

    pub fn user_vector(&self, user_id: usize) -> Option<ArrayView1<'_, f32>> {
        (user_id < self.num_users()).then(|| self.user_factors.row(user_id))
    }

    pub fn item_vector(&self, item_id: usize) -> Option<ArrayView1<'_, f32>> {
        (item_id < self.num_items()).then(|| self.item_factors.row(item_id))
    }

    /// Predicted preference of a user for an item
    pub fn score(&self, user_id: usize, item_id: usize) -> Option<f32> {
        Some(self.user_vector(user_id)?.dot(&self.item_vector(item_id)?))
    }

    /// Iterations actually run (fewer than requested if the deadline hit)
    pub fn iterations_completed(&self) -> usize {
        self.iterations_completed
    }

    /// Normalized implicit loss after the last iteration, when requested
    pub fn training_loss(&self) -> Option<f32> {
        self.training_loss
    }
}

/// ALS solver
#[derive(Debug, Clone)]
pub struct AlternatingLeastSquares {
    config: AlsConfig,
}

impl AlternatingLeastSquares {
    pub fn new(config: AlsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    /// Train ALS model on an item x user matrix
    ///
    /// Runs on a dedicated pool of `num_threads` workers. Each row solve is
    /// sequential, so the factors depend on the seed only, not on the pool size.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` for invalid hyperparameters
    /// - `DimensionError` if the matrix has no rows or no columns
    /// - `SolverError` if a normal-equation system cannot be factorized
    #[instrument(
        name = "als_fit",
        skip_all,
        fields(items = matrix.n_items(), users = matrix.n_users(), nnz = matrix.nnz())
    )]
    pub fn fit(&self, matrix: &InteractionMatrix) -> Result<FactorModel> {
        self.config.validate()?;

        let (rows, cols) = matrix.shape();
        if rows == 0 || cols == 0 {
            return Err(RecommenderError::DimensionError { rows, cols });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .thread_name(|i| format!("als-worker-{}", i))
            .build()
            .map_err(|e| {
                RecommenderError::SolverError(format!("Failed to build ALS thread pool: {}", e))
            })?;

        let k = self.config.factors;
        let lambda = f64::from(self.config.regularization).max(MIN_REGULARIZATION);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut item_factors = random_factors(&mut rng, rows, k);
        let mut user_factors = random_factors(&mut rng, cols, k);

        let started = Instant::now();
        let mut completed = 0;
        let mut loss = None;

        for iteration in 0..self.config.iterations {
            item_factors = pool.install(|| solve_side(matrix.by_item(), &user_factors, lambda))?;
            user_factors = pool.install(|| solve_side(matrix.by_user(), &item_factors, lambda))?;
            completed = iteration + 1;

            if self.config.calculate_training_loss {
                let value = training_loss(matrix.by_user(), &user_factors, &item_factors, lambda);
                debug!(iteration, loss = value, "ALS iteration");
                loss = Some(value);
            } else {
                debug!(iteration, "ALS iteration");
            }

            if let Some(deadline) = self.config.deadline {
                if completed < self.config.iterations && started.elapsed() >= deadline {
                    warn!(
                        completed,
                        requested = self.config.iterations,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "ALS deadline reached, stopping early"
                    );
                    break;
                }
            }
        }

        info!(
            iterations = completed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ALS fit complete"
        );

        Ok(FactorModel {
            item_factors,
            user_factors,
            iterations_completed: completed,
            training_loss: loss,
        })
    }
}

fn random_factors(rng: &mut StdRng, n: usize, k: usize) -> Array2<f32> {
    Array2::from_shape_fn((n, k), |_| rng.gen_range(-0.1f32..0.1))
}

fn gramian(factors: &Array2<f32>) -> Array2<f64> {
    let y = factors.mapv(f64::from);
    y.t().dot(&y)
}

/// Solve every row of `rows` against the fixed factors of the other side
fn solve_side(rows: CsrView<'_>, other: &Array2<f32>, lambda: f64) -> Result<Array2<f32>> {
    let k = other.ncols();
    let gram = gramian(other);

    let solved = (0..rows.n_rows())
        .into_par_iter()
        .map(|row| {
            let (cols, weights) = rows.row(row);
            solve_row(cols, weights, other, &gram, lambda)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = Array2::<f32>::zeros((rows.n_rows(), k));
    for (mut target, x) in out.outer_iter_mut().zip(solved) {
        target.assign(&x);
    }
    Ok(out)
}

fn solve_row(
    cols: &[usize],
    weights: &[f32],
    other: &Array2<f32>,
    gram: &Array2<f64>,
    lambda: f64,
) -> Result<Array1<f32>> {
    let k = gram.nrows();
    if cols.is_empty() {
        return Ok(Array1::zeros(k));
    }

    let mut a = gram.clone();
    a.diag_mut().mapv_inplace(|v| v + lambda);
    let mut b = Array1::<f64>::zeros(k);

    for (&col, &weight) in cols.iter().zip(weights) {
        let y = other.row(col).mapv(f64::from);
        let confidence = f64::from(weight);

        // b += c * y, A += (c - 1) * y yᵀ
        b.scaled_add(confidence, &y);
        for (p, &yp) in y.iter().enumerate() {
            a.row_mut(p).scaled_add((confidence - 1.0) * yp, &y);
        }
    }

    let x = cholesky_solve(&a, &b)?;
    Ok(x.mapv(|v| v as f32))
}

/// Solve `A x = b` for symmetric positive-definite `A` via `A = L Lᵀ`
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let partial = l.slice(s![i, ..j]).dot(&l.slice(s![j, ..j]));
            if i == j {
                let diag = a[[i, i]] - partial;
                if !diag.is_finite() || diag <= 0.0 {
                    return Err(RecommenderError::SolverError(format!(
                        "normal equations not positive definite at pivot {}",
                        i
                    )));
                }
                l[[i, i]] = diag.sqrt();
            } else {
                let value = (a[[i, j]] - partial) / l[[j, j]];
                l[[i, j]] = value;
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let value = (b[i] - l.slice(s![i, ..i]).dot(&y.slice(s![..i]))) / l[[i, i]];
        y[i] = value;
    }

    // Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let value = (y[i] - l.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]))) / l[[i, i]];
        x[i] = value;
    }

    Ok(x)
}

/// Implicit-feedback loss normalized by total confidence
fn training_loss(
    by_user: CsrView<'_>,
    user_factors: &Array2<f32>,
    item_factors: &Array2<f32>,
    lambda: f64,
) -> f32 {
    let gram = gramian(item_factors);
    let mut loss = 0.0f64;
    let mut total_confidence = 0.0f64;
    let mut nnz = 0usize;

    for user in 0..by_user.n_rows() {
        let x = user_factors.row(user).mapv(f64::from);

        // every cell as p = 0, c = 1, then corrected for stored cells
        loss += x.dot(&gram.dot(&x));

        let (items, weights) = by_user.row(user);
        for (&item, &weight) in items.iter().zip(weights) {
            let score = x.dot(&item_factors.row(item).mapv(f64::from));
            let confidence = f64::from(weight);
            loss += confidence * (1.0 - score).powi(2) - score.powi(2);
            total_confidence += confidence;
            nnz += 1;
        }

        loss += lambda * x.dot(&x);
    }

    loss += lambda
        * item_factors
            .iter()
            .map(|&v| f64::from(v).powi(2))
            .sum::<f64>();

    let cells = (user_factors.nrows() * item_factors.nrows()) as f64;
    let denominator = total_confidence + cells - nnz as f64;
    if denominator > 0.0 {
        (loss / denominator) as f32
    } else {
        0.0
    }
}
