//! Ranked recommendations from a fitted factor model
//!
//! Scores every item in the partition against the user's latent vector,
//! masks what the user already bought in that same partition, and resolves
//! the surviving ids back to item names.

use crate::aggregate::IdMap;
use crate::matrix::InteractionMatrix;
use crate::matrix_factorization::FactorModel;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use venue_recs_core::{Partition, RecommenderError, Result};

/// One ranked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: usize,
    pub item_name: String,
    pub score: f32,
}

/// Read-only query handle over one partition's model, matrix and item names
#[derive(Debug, Clone, Copy)]
pub struct Recommender<'a> {
    partition: Partition,
    model: &'a FactorModel,
    matrix: &'a InteractionMatrix,
    items: &'a IdMap,
}

impl<'a> Recommender<'a> {
    /// # Errors
    ///
    /// `DimensionError` if the model was not fitted on a matrix of this shape.
    pub fn new(
        partition: Partition,
        model: &'a FactorModel,
        matrix: &'a InteractionMatrix,
        items: &'a IdMap,
    ) -> Result<Self> {
        if !matrix.is_empty()
            && (model.num_items() != matrix.n_items() || model.num_users() != matrix.n_users())
        {
            return Err(RecommenderError::DimensionError {
                rows: model.num_items(),
                cols: model.num_users(),
            });
        }

        Ok(Self {
            partition,
            model,
            matrix,
            items,
        })
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Top `top_n` items the user has not bought yet, best first
    ///
    /// Ties are broken by ascending item id. Fewer than `top_n` results are
    /// returned only when the partition has fewer unbought items.
    ///
    /// # Errors
    ///
    /// - `UnknownUser` if the user has no purchases in this partition
    /// - `UnknownItem` if a ranked item id has no name in the partition's map
    /// - `ConfigurationError` if `top_n` is 0
    pub fn recommend(&self, user_id: usize, top_n: usize) -> Result<Vec<Recommendation>> {
        if top_n == 0 {
            return Err(RecommenderError::config(
                "top_n must be greater than 0",
                "VENUE_RECS_TOP_N",
            ));
        }

        let user_vector = self.user_vector(user_id)?;
        let (purchased, _) = self.matrix.user_items(user_id);

        let mut scored: Vec<(usize, f32)> = self
            .model
            .item_factors()
            .outer_iter()
            .enumerate()
            .filter(|(item_id, _)| purchased.binary_search(item_id).is_err())
            .map(|(item_id, item_vector)| (item_id, user_vector.dot(&item_vector)))
            .collect();

        scored.sort_by(by_score_then_id);
        scored.truncate(top_n);

        self.resolve(scored)
    }

    /// Items whose latent vectors are closest (cosine) to `item_id`
    ///
    /// # Errors
    ///
    /// `UnknownItem` if the id is outside the partition.
    pub fn similar_items(&self, item_id: usize, n: usize) -> Result<Vec<Recommendation>> {
        let target = self
            .model
            .item_vector(item_id)
            .filter(|_| self.items.key_of(item_id).is_some())
            .ok_or(RecommenderError::UnknownItem {
                item_id,
                partition: self.partition,
            })?;

        let mut scored: Vec<(usize, f32)> = self
            .model
            .item_factors()
            .outer_iter()
            .enumerate()
            .filter(|(other, _)| *other != item_id)
            .map(|(other, vector)| (other, cosine_similarity(target, vector)))
            .collect();

        scored.sort_by(by_score_then_id);
        scored.truncate(n);

        self.resolve(scored)
    }

    fn user_vector(&self, user_id: usize) -> Result<ArrayView1<'a, f32>> {
        let unknown = || RecommenderError::UnknownUser {
            user: user_id.to_string(),
            partition: self.partition,
        };

        if !self.matrix.has_user(user_id) {
            return Err(unknown());
        }
        self.model.user_vector(user_id).ok_or_else(unknown)
    }

    fn resolve(&self, scored: Vec<(usize, f32)>) -> Result<Vec<Recommendation>> {
        scored
            .into_iter()
            .map(|(item_id, score)| {
                let item_name = self
                    .items
                    .key_of(item_id)
                    .ok_or(RecommenderError::UnknownItem {
                        item_id,
                        partition: self.partition,
                    })?;
                Ok(Recommendation {
                    item_id,
                    item_name: item_name.to_string(),
                    score,
                })
            })
            .collect()
    }
}

/// Descending score, ascending id on exact ties
///
/// `-0.0` and `0.0` count as the same score.
fn by_score_then_id(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    unsigned_zero(b.1)
        .total_cmp(&unsigned_zero(a.1))
        .then_with(|| a.0.cmp(&b.0))
}

fn unsigned_zero(score: f32) -> f32 {
    if score == 0.0 {
        0.0
    } else {
        score
    }
}

fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix_factorization::{AlsConfig, AlternatingLeastSquares};

    fn fit(matrix: &InteractionMatrix) -> FactorModel {
        AlternatingLeastSquares::new(AlsConfig {
            factors: 4,
            iterations: 10,
            ..AlsConfig::default()
        })
        .fit(matrix)
        .unwrap()
    }

    fn items(names: &[&str]) -> IdMap {
        IdMap::from_keys(names.iter().copied())
    }

    #[test]
    fn test_recommend_masks_purchased_items() {
        // user 0 bought item 0; user 1 bought item 2; nobody bought item 1
        let matrix =
            InteractionMatrix::from_triplets(3, 2, vec![(0, 0, 40.0), (0, 1, 0.0), (2, 1, 40.0)])
                .unwrap();
        let model = fit(&matrix);
        let names = items(&["a-burger", "b-fries", "c-pretzel"]);
        let recommender = Recommender::new(Partition::Food, &model, &matrix, &names).unwrap();

        let recs = recommender.recommend(1, 2).unwrap();

        assert_eq!(recs.len(), 2);
        let mut ids: Vec<usize> = recs.iter().map(|r| r.item_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
        assert!(recs[0].score >= recs[1].score);
        assert_eq!(recs.iter().find(|r| r.item_id == 1).unwrap().item_name, "b-fries");
    }

    #[test]
    fn test_recommend_clamps_top_n() {
        let matrix = InteractionMatrix::from_triplets(3, 1, vec![(0, 0, 40.0)]).unwrap();
        let model = fit(&matrix);
        let names = items(&["x", "y", "z"]);
        let recommender = Recommender::new(Partition::Drink, &model, &matrix, &names).unwrap();

        let recs = recommender.recommend(0, 10).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.item_id != 0));
    }

    #[test]
    fn test_recommend_unknown_user() {
        let matrix = InteractionMatrix::from_triplets(2, 3, vec![(0, 0, 40.0), (1, 2, 40.0)])
            .unwrap();
        let model = fit(&matrix);
        let names = items(&["x", "y"]);
        let recommender = Recommender::new(Partition::Food, &model, &matrix, &names).unwrap();

        // user 1 has an (empty) column, user 5 is out of range
        for user in [1, 5] {
            assert_eq!(
                recommender.recommend(user, 3).unwrap_err(),
                RecommenderError::UnknownUser {
                    user: user.to_string(),
                    partition: Partition::Food,
                }
            );
        }
    }

    #[test]
    fn test_recommend_reports_unmapped_item() {
        let matrix = InteractionMatrix::from_triplets(3, 1, vec![(0, 0, 40.0)]).unwrap();
        let model = fit(&matrix);
        let names = items(&["only-one"]);
        let recommender = Recommender::new(Partition::Food, &model, &matrix, &names).unwrap();

        assert!(matches!(
            recommender.recommend(0, 2),
            Err(RecommenderError::UnknownItem { .. })
        ));
    }

    #[test]
    fn test_recommend_rejects_zero_top_n() {
        let matrix = InteractionMatrix::from_triplets(2, 1, vec![(0, 0, 40.0)]).unwrap();
        let model = fit(&matrix);
        let names = items(&["x", "y"]);
        let recommender = Recommender::new(Partition::Food, &model, &matrix, &names).unwrap();

        assert!(matches!(
            recommender.recommend(0, 0),
            Err(RecommenderError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_new_rejects_mismatched_model() {
        let matrix = InteractionMatrix::from_triplets(2, 1, vec![(0, 0, 40.0)]).unwrap();
        let other = InteractionMatrix::from_triplets(3, 1, vec![(0, 0, 40.0)]).unwrap();
        let model = fit(&other);
        let names = items(&["x", "y"]);

        assert!(matches!(
            Recommender::new(Partition::Food, &model, &matrix, &names),
            Err(RecommenderError::DimensionError { .. })
        ));
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let mut scored = vec![(3, 0.5), (1, 0.5), (2, 0.9), (0, 0.1)];
        scored.sort_by(by_score_then_id);
        assert_eq!(scored, vec![(2, 0.9), (1, 0.5), (3, 0.5), (0, 0.1)]);

        let mut zeros = vec![(4, 0.0), (1, -0.0), (2, -0.25)];
        zeros.sort_by(by_score_then_id);
        let ids: Vec<usize> = zeros.iter().map(|&(id, _)| id).collect();
        assert_eq!(ids, vec![1, 4, 2]);
    }

    #[test]
    fn test_similar_items() {
        // items 0 and 1 share both buyers, item 2 has its own
        let matrix = InteractionMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 40.0), (1, 0, 40.0), (0, 1, 40.0), (1, 1, 40.0), (2, 2, 40.0)],
        )
        .unwrap();
        let model = fit(&matrix);
        let names = items(&["ale", "lager", "soda"]);
        let recommender = Recommender::new(Partition::Drink, &model, &matrix, &names).unwrap();

        let similar = recommender.similar_items(0, 2).unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].item_name, "lager");
        assert!(similar.iter().all(|r| r.item_id != 0));

        assert!(matches!(
            recommender.similar_items(9, 2),
            Err(RecommenderError::UnknownItem { item_id: 9, .. })
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        let a = ndarray::array![1.0f32, 0.0, 0.0];
        let b = ndarray::array![0.0f32, 1.0, 0.0];
        let zero = ndarray::array![0.0f32, 0.0, 0.0];

        assert!((cosine_similarity(a.view(), a.view()) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(a.view(), b.view()).abs() < 1e-6);
        assert_eq!(cosine_similarity(a.view(), zero.view()), 0.0);
    }
}
