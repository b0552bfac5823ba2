//! Sparse item x user interaction matrices
//!
//! Stored as compressed rows over items plus a transposed copy over users, so
//! both ALS half-steps and per-user masking read contiguous slices. Memory is
//! proportional to the number of stored cells.

use crate::aggregate::PartitionTable;
use tracing::debug;
use venue_recs_core::{RecommenderError, Result};

/// Default confidence multiplier applied to raw purchase counts
pub const DEFAULT_ALPHA: f32 = 40.0;

/// Borrowed compressed-row view
#[derive(Debug, Clone, Copy)]
pub struct CsrView<'a> {
    indptr: &'a [usize],
    indices: &'a [usize],
    data: &'a [f32],
}

impl<'a> CsrView<'a> {
    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// Column indices (ascending) and weights of one row
    pub fn row(&self, row: usize) -> (&'a [usize], &'a [f32]) {
        let (start, end) = (self.indptr[row], self.indptr[row + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Csr {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
}

impl Csr {
    fn view(&self) -> CsrView<'_> {
        CsrView {
            indptr: &self.indptr,
            indices: &self.indices,
            data: &self.data,
        }
    }

    /// Build from triplets sorted by (row, col) with no duplicates
    fn from_sorted(n_rows: usize, cells: &[(usize, usize, f32)]) -> Self {
        let mut indptr = vec![0usize; n_rows + 1];
        for &(row, _, _) in cells {
            indptr[row + 1] += 1;
        }
        for row in 0..n_rows {
            indptr[row + 1] += indptr[row];
        }

        Self {
            indptr,
            indices: cells.iter().map(|&(_, col, _)| col).collect(),
            data: cells.iter().map(|&(_, _, w)| w).collect(),
        }
    }

    fn transpose(&self, n_cols: usize) -> Self {
        let nnz = self.indices.len();
        let mut indptr = vec![0usize; n_cols + 1];
        for &col in &self.indices {
            indptr[col + 1] += 1;
        }
        for col in 0..n_cols {
            indptr[col + 1] += indptr[col];
        }

        let mut indices = vec![0usize; nnz];
        let mut data = vec![0.0f32; nnz];
        let mut next = indptr[..n_cols].to_vec();
        for row in 0..self.indptr.len() - 1 {
            for idx in self.indptr[row]..self.indptr[row + 1] {
                let col = self.indices[idx];
                indices[next[col]] = row;
                data[next[col]] = self.data[idx];
                next[col] += 1;
            }
        }

        Self {
            indptr,
            indices,
            data,
        }
    }
}

/// Sparse `[item_id, user_id] -> weight` matrix for one partition
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    n_items: usize,
    n_users: usize,
    by_item: Csr,
    by_user: Csr,
}

impl InteractionMatrix {
    /// Matrix with shape `(0, 0)`
    pub fn empty() -> Self {
        let csr = Csr::from_sorted(0, &[]);
        Self {
            n_items: 0,
            n_users: 0,
            by_user: csr.clone(),
            by_item: csr,
        }
    }

    /// Build from `(item_id, user_id, weight)` triplets in one pass
    ///
    /// Duplicate cells are summed and zero-weight cells are dropped, so every
    /// stored cell stands for at least one purchase.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an out-of-range index or a negative or non-finite weight.
    pub fn from_triplets<I>(n_items: usize, n_users: usize, triplets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        let triplets = triplets.into_iter();
        let mut cells: Vec<(usize, usize, f32)> = Vec::with_capacity(triplets.size_hint().0);

        for (item, user, weight) in triplets {
            if item >= n_items || user >= n_users {
                return Err(RecommenderError::InvalidInput(format!(
                    "cell ({}, {}) outside {} x {} matrix",
                    item, user, n_items, n_users
                )));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecommenderError::InvalidInput(format!(
                    "weight {} at ({}, {}) must be finite and non-negative",
                    weight, item, user
                )));
            }
            cells.push((item, user, weight));
        }

        cells.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        cells.dedup_by(|next, kept| {
            if (next.0, next.1) == (kept.0, kept.1) {
                kept.2 += next.2;
                true
            } else {
                false
            }
        });
        cells.retain(|&(_, _, w)| w > 0.0);

        let by_item = Csr::from_sorted(n_items, &cells);
        let by_user = by_item.transpose(n_users);

        Ok(Self {
            n_items,
            n_users,
            by_item,
            by_user,
        })
    }

    /// `(rows, cols)` = `(items, users)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_items, self.n_users)
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn n_users(&self) -> usize {
        self.n_users
    }

    /// Number of stored cells
    pub fn nnz(&self) -> usize {
        self.by_item.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_items == 0 || self.n_users == 0
    }

    /// Item-major rows (one per item, columns are users)
    pub fn by_item(&self) -> CsrView<'_> {
        self.by_item.view()
    }

    /// User-major rows (one per user, columns are items)
    pub fn by_user(&self) -> CsrView<'_> {
        self.by_user.view()
    }

    /// Items the user has purchased, ascending, with their weights
    ///
    /// Empty for a user id outside the matrix.
    pub fn user_items(&self, user_id: usize) -> (&[usize], &[f32]) {
        if user_id >= self.n_users {
            return (&[], &[]);
        }
        self.by_user().row(user_id)
    }

    /// Whether the user has at least one purchase in this matrix
    pub fn has_user(&self, user_id: usize) -> bool {
        !self.user_items(user_id).0.is_empty()
    }

    pub fn get(&self, item_id: usize, user_id: usize) -> f32 {
        if item_id >= self.n_items {
            return 0.0;
        }
        let (users, weights) = self.by_item().row(item_id);
        users
            .binary_search(&user_id)
            .map(|pos| weights[pos])
            .unwrap_or(0.0)
    }

    /// Sum of all stored weights, accumulated in f64
    pub fn weight_sum(&self) -> f64 {
        self.by_item.data.iter().map(|&w| f64::from(w)).sum()
    }

    /// `(item_id, user_id, weight)` for every stored cell, item-major
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        let view = self.by_item();
        (0..self.n_items).flat_map(move |item| {
            let (users, weights) = view.row(item);
            users
                .iter()
                .zip(weights)
                .map(move |(&user, &weight)| (item, user, weight))
        })
    }
}

/// Build the item x user matrix for one partition
///
/// Weights are `count * alpha`. The shape is
/// `(max_item_id + 1, max_user_id_in_partition + 1)`, or `(0, 0)` for a
/// partition without purchases.
///
/// # Errors
///
/// `ConfigurationError` when `alpha` is not a positive finite number.
pub fn build_interaction_matrix(table: &PartitionTable, alpha: f32) -> Result<InteractionMatrix> {
    if !alpha.is_finite() || alpha <= 0.0 {
        return Err(RecommenderError::config(
            format!("alpha must be a positive finite number, got {}", alpha),
            "VENUE_RECS_ALPHA",
        ));
    }

    let Some(max_user_id) = table.max_user_id() else {
        debug!(partition = %table.partition, "No purchases; building empty matrix");
        return Ok(InteractionMatrix::empty());
    };
    let n_items = table
        .records
        .iter()
        .map(|r| r.item_id + 1)
        .max()
        .unwrap_or(0)
        .max(table.items.len());

    let matrix = InteractionMatrix::from_triplets(
        n_items,
        max_user_id + 1,
        table
            .records
            .iter()
            .map(|r| (r.item_id, r.user_id, r.count as f32 * alpha)),
    )?;

    debug!(
        partition = %table.partition,
        items = matrix.n_items(),
        users = matrix.n_users(),
        nnz = matrix.nnz(),
        "Built interaction matrix"
    );

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, TransactionRow};

    #[test]
    fn test_from_triplets_sums_duplicates_and_drops_zeros() {
        let matrix = InteractionMatrix::from_triplets(
            3,
            2,
            vec![(0, 0, 40.0), (0, 1, 0.0), (2, 1, 40.0), (2, 1, 40.0)],
        )
        .unwrap();

        assert_eq!(matrix.shape(), (3, 2));
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.get(0, 0), 40.0);
        assert_eq!(matrix.get(0, 1), 0.0);
        assert_eq!(matrix.get(2, 1), 80.0);
        assert_eq!(matrix.get(1, 0), 0.0);
    }

    #[test]
    fn test_from_triplets_rejects_bad_cells() {
        let out_of_range = InteractionMatrix::from_triplets(2, 2, vec![(2, 0, 1.0)]);
        assert!(matches!(
            out_of_range,
            Err(RecommenderError::InvalidInput(_))
        ));

        let negative = InteractionMatrix::from_triplets(2, 2, vec![(0, 0, -1.0)]);
        assert!(matches!(negative, Err(RecommenderError::InvalidInput(_))));

        let nan = InteractionMatrix::from_triplets(2, 2, vec![(0, 0, f32::NAN)]);
        assert!(matches!(nan, Err(RecommenderError::InvalidInput(_))));
    }

    #[test]
    fn test_user_view_matches_item_view() {
        let matrix = InteractionMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 1.0), (1, 0, 2.0), (2, 2, 3.0), (1, 2, 4.0)],
        )
        .unwrap();

        assert_eq!(matrix.user_items(0), (&[0usize, 1][..], &[1.0f32, 2.0][..]));
        assert_eq!(matrix.user_items(2), (&[1usize, 2][..], &[4.0f32, 3.0][..]));
        assert!(!matrix.has_user(1));
        assert!(!matrix.has_user(7));

        let cells: Vec<_> = matrix.iter().collect();
        assert_eq!(
            cells,
            vec![(0, 0, 1.0), (1, 0, 2.0), (1, 2, 4.0), (2, 2, 3.0)]
        );
    }

    #[test]
    fn test_build_applies_alpha() {
        let rows = vec![
            TransactionRow::new("a", "Food", "Fries"),
            TransactionRow::new("a", "Food", "Fries"),
            TransactionRow::new("b", "Food", "Burger"),
            TransactionRow::new("b", "Retail", "Cap"),
            TransactionRow::new("c", "Wine", "Rose"),
        ];
        let aggregated = aggregate(&rows);
        let matrix = build_interaction_matrix(&aggregated.food, DEFAULT_ALPHA).unwrap();

        // users a=0, b=1 buy food; c=2 only drinks
        assert_eq!(matrix.shape(), (3, 2));
        let fries = aggregated.food.items.id_of("Fries").unwrap();
        assert_eq!(matrix.get(fries, 0), 80.0);
        assert_eq!(
            matrix.weight_sum(),
            f64::from(DEFAULT_ALPHA) * aggregated.food.total_count() as f64
        );
    }

    #[test]
    fn test_build_empty_partition() {
        let aggregated = aggregate(&[TransactionRow::new("a", "Food", "Fries")]);
        let matrix = build_interaction_matrix(&aggregated.drink, DEFAULT_ALPHA).unwrap();
        assert_eq!(matrix.shape(), (0, 0));
        assert!(matrix.is_empty());
        assert_eq!(matrix.nnz(), 0);
    }

    #[test]
    fn test_build_rejects_invalid_alpha() {
        let aggregated = aggregate(&[TransactionRow::new("a", "Food", "Fries")]);
        for alpha in [0.0, -1.0, f32::INFINITY] {
            assert!(matches!(
                build_interaction_matrix(&aggregated.food, alpha),
                Err(RecommenderError::ConfigurationError { .. })
            ));
        }
    }
}
