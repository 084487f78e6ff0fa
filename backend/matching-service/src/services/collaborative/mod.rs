// ============================================
// Collaborative Filtering
// ============================================
//
// Recommends users from implicit feedback. Ratings are pivoted into a
// square interaction matrix indexed by every id seen as actor or target,
// so row i and column i refer to the same user.
//
// Methods:
// - user-based: similarity-weighted average over the top neighbours
// - item-based: column similarity propagated from the user's rated targets
// - matrix factorisation: NMF reconstruction of the user's row
// - hybrid: weighted blend of user-based and factorisation scores
//
// Unknown ids are cold-start users and get an empty list, not an error.

pub mod nmf;

use crate::error::{EngineError, Result};
use crate::models::{ImplicitRating, Recommendation, RecommendationSource};
use crate::utils::{
    by_score_desc, clamp_unit, cosine_similarity_matrix, cosine_similarity_row, row_norms,
};
use ndarray::{Array2, ArrayView1, Axis};
use nmf::Nmf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Blend weights for the hybrid method
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub user_based: f64,
    pub factorization: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            user_based: 0.7,
            factorization: 0.3,
        }
    }
}

impl HybridWeights {
    /// Weights from the user-based share; factorisation takes the rest
    pub fn from_user_based(user_based: f64) -> Self {
        Self {
            user_based,
            factorization: 1.0 - user_based,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollaborativeConfig {
    /// Neighbours must be strictly more similar than this
    pub min_similarity: f64,
    pub max_neighbors: usize,
    pub weights: HybridWeights,
    pub max_components: usize,
    pub nmf_iterations: usize,
    pub seed: u64,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.1,
            max_neighbors: 20,
            weights: HybridWeights::default(),
            max_components: 10,
            nmf_iterations: 200,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMethod {
    UserBased,
    ItemBased,
    MatrixFactorization,
    Hybrid,
}

impl RecommendationMethod {
    pub fn source(&self) -> RecommendationSource {
        match self {
            RecommendationMethod::UserBased => RecommendationSource::UserBased,
            RecommendationMethod::ItemBased => RecommendationSource::ItemBased,
            RecommendationMethod::MatrixFactorization => RecommendationSource::MatrixFactorization,
            RecommendationMethod::Hybrid => RecommendationSource::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollaborativeStats {
    pub n_users: usize,
    pub n_items: usize,
    pub sparsity: f64,
    pub avg_ratings_per_user: f64,
    pub nmf_components: usize,
}

/// Everything derived from one `fit`; replaced wholesale on refit
#[derive(Debug, Clone)]
struct FittedState {
    ids: Vec<Uuid>,
    index: HashMap<Uuid, usize>,
    matrix: Array2<f64>,
    norms: Vec<f64>,
    similarity: Array2<f64>,
    nmf: Nmf,
}

#[derive(Debug, Clone, Default)]
pub struct CollaborativeFilter {
    config: CollaborativeConfig,
    state: Option<FittedState>,
}

impl CollaborativeFilter {
    pub fn new(config: CollaborativeConfig) -> Self {
        Self { config, state: None }
    }

    pub fn config(&self) -> &CollaborativeConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Rebuild the matrix, the user similarity matrix and the factorisation
    ///
    /// Duplicate (user, target) rows are averaged. Self-ratings and
    /// non-finite ratings are dropped.
    pub fn fit(&mut self, ratings: &[ImplicitRating]) -> Result<()> {
        let usable: Vec<&ImplicitRating> = ratings
            .iter()
            .filter(|r| r.user_id != r.target_id && r.rating.is_finite())
            .collect();

        if usable.is_empty() {
            return Err(EngineError::EmptyData);
        }

        let mut ids = Vec::new();
        let mut index = HashMap::new();
        for rating in &usable {
            for id in [rating.user_id, rating.target_id] {
                index.entry(id).or_insert_with(|| {
                    ids.push(id);
                    ids.len() - 1
                });
            }
        }

        let mut cells: HashMap<(usize, usize), (f64, u32)> = HashMap::new();
        for rating in &usable {
            let cell = cells
                .entry((index[&rating.user_id], index[&rating.target_id]))
                .or_insert((0.0, 0));
            cell.0 += clamp_unit(rating.rating);
            cell.1 += 1;
        }

        let n = ids.len();
        let mut matrix = Array2::zeros((n, n));
        for (&(row, col), &(sum, count)) in &cells {
            matrix[[row, col]] = sum / f64::from(count);
        }

        let norms = row_norms(&matrix);
        let similarity = cosine_similarity_matrix(&matrix);
        let components = self.config.max_components.min(n);
        let nmf = Nmf::fit(&matrix, components, self.config.nmf_iterations, self.config.seed);

        info!(
            users = n,
            ratings = cells.len(),
            nmf_components = components,
            "Collaborative filter fitted"
        );

        self.state = Some(FittedState {
            ids,
            index,
            matrix,
            norms,
            similarity,
            nmf,
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.state.as_ref().ok_or(EngineError::NotFitted)
    }

    /// Dispatch to one of the recommendation methods
    pub fn recommend(
        &self,
        method: RecommendationMethod,
        user_id: Uuid,
        k: usize,
    ) -> Result<Vec<Recommendation>> {
        match method {
            RecommendationMethod::UserBased => self.user_based(user_id, k),
            RecommendationMethod::ItemBased => self.item_based(user_id, k),
            RecommendationMethod::MatrixFactorization => self.matrix_factorization(user_id, k),
            RecommendationMethod::Hybrid => self.hybrid(user_id, k),
        }
    }

    /// Similarity-weighted average rating from the user's nearest neighbours
    ///
    /// Only targets the user has not rated, and that some neighbour rated
    /// positively, are scored.
    pub fn user_based(&self, user_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let state = self.fitted()?;
        let user_idx = match state.index.get(&user_id) {
            Some(&idx) => idx,
            None => return Ok(Vec::new()),
        };

        let mut neighbours: Vec<(usize, f64)> = state
            .similarity
            .row(user_idx)
            .iter()
            .enumerate()
            .filter(|&(idx, &sim)| idx != user_idx && sim > self.config.min_similarity)
            .map(|(idx, &sim)| (idx, sim))
            .collect();
        neighbours.sort_by(|a, b| by_score_desc(a.1, b.1));
        neighbours.truncate(self.config.max_neighbors);

        let own_ratings = state.matrix.row(user_idx);
        let mut weighted: HashMap<usize, (f64, f64)> = HashMap::new();

        for &(neighbour_idx, sim) in &neighbours {
            for (target_idx, &rating) in state.matrix.row(neighbour_idx).iter().enumerate() {
                if rating > 0.0 && own_ratings[target_idx] == 0.0 && target_idx != user_idx {
                    let entry = weighted.entry(target_idx).or_insert((0.0, 0.0));
                    entry.0 += sim * rating;
                    entry.1 += sim;
                }
            }
        }

        let scored = weighted
            .into_iter()
            .filter(|(_, (_, total_sim))| *total_sim > 0.0)
            .map(|(idx, (sum, total_sim))| (idx, sum / total_sim))
            .collect();

        debug!(user_id = %user_id, neighbours = neighbours.len(), "User-based CF scored");
        Ok(Self::rank(state, scored, k, RecommendationSource::UserBased))
    }

    /// Propagate `similarity × rating` from each rated target to unrated ones
    ///
    /// Target similarity is the cosine similarity of matrix columns,
    /// computed only for the columns the user has rated.
    pub fn item_based(&self, user_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let state = self.fitted()?;
        let user_idx = match state.index.get(&user_id) {
            Some(&idx) => idx,
            None => return Ok(Vec::new()),
        };

        let columns = state.matrix.t().to_owned();
        let column_norms = row_norms(&columns);
        let own_ratings = state.matrix.row(user_idx);
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for (rated_idx, &rating) in own_ratings.iter().enumerate() {
            if rating <= 0.0 {
                continue;
            }

            let similarities = cosine_similarity_row(&columns, &column_norms, rated_idx);
            for (target_idx, &sim) in similarities.iter().enumerate() {
                if target_idx == rated_idx
                    || target_idx == user_idx
                    || sim <= 0.0
                    || own_ratings[target_idx] != 0.0
                {
                    continue;
                }
                *scores.entry(target_idx).or_insert(0.0) += sim * rating;
            }
        }

        Ok(Self::rank(
            state,
            scores.into_iter().collect(),
            k,
            RecommendationSource::ItemBased,
        ))
    }

    /// Predicted ratings from the factorisation for the user's unrated targets
    pub fn matrix_factorization(&self, user_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let state = self.fitted()?;
        let user_idx = match state.index.get(&user_id) {
            Some(&idx) => idx,
            None => return Ok(Vec::new()),
        };

        let predicted = state.nmf.predict_row(user_idx);
        let own_ratings = state.matrix.row(user_idx);
        let scored = predicted
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != user_idx && own_ratings[idx] == 0.0)
            .map(|(idx, &score)| (idx, score))
            .collect();

        Ok(Self::rank(
            state,
            scored,
            k,
            RecommendationSource::MatrixFactorization,
        ))
    }

    /// Weighted merge of user-based and factorisation scores by target id
    pub fn hybrid(&self, user_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let state = self.fitted()?;
        if !state.index.contains_key(&user_id) {
            return Ok(Vec::new());
        }

        let weights = self.config.weights;
        let mut combined: HashMap<Uuid, f64> = HashMap::new();

        for rec in self.user_based(user_id, k.saturating_mul(2))? {
            *combined.entry(rec.target_id).or_insert(0.0) += weights.user_based * rec.score;
        }
        for rec in self.matrix_factorization(user_id, k.saturating_mul(2))? {
            *combined.entry(rec.target_id).or_insert(0.0) += weights.factorization * rec.score;
        }

        let mut ranked: Vec<Recommendation> = combined
            .into_iter()
            .map(|(target_id, score)| Recommendation {
                target_id,
                score: clamp_unit(score),
                source: RecommendationSource::Hybrid,
                reason: None,
            })
            .collect();
        ranked.sort_by(|a, b| {
            by_score_desc(a.score, b.score).then_with(|| a.target_id.cmp(&b.target_id))
        });
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Patch one matrix cell and refresh that user's similarity row/column
    ///
    /// Returns `Ok(false)` when either id is outside the fitted index or the
    /// filter has not been fitted; new ids need a full `fit`. The
    /// factorisation is left as of the last fit.
    pub fn update_interaction(
        &mut self,
        user_id: Uuid,
        target_id: Uuid,
        rating: f64,
    ) -> Result<bool> {
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Ok(false),
        };

        let indices = (state.index.get(&user_id), state.index.get(&target_id));
        let (user_idx, target_idx) = match indices {
            (Some(&u), Some(&t)) if u != t => (u, t),
            _ => return Ok(false),
        };

        if !rating.is_finite() {
            return Err(EngineError::InvalidInput(format!("Non-finite rating: {}", rating)));
        }

        state.matrix[[user_idx, target_idx]] = clamp_unit(rating);
        let row = state.matrix.row(user_idx);
        state.norms[user_idx] = row.dot(&row).sqrt();

        let refreshed = cosine_similarity_row(&state.matrix, &state.norms, user_idx);
        for (idx, sim) in refreshed.into_iter().enumerate() {
            state.similarity[[user_idx, idx]] = sim;
            state.similarity[[idx, user_idx]] = sim;
        }

        debug!(user_id = %user_id, target_id = %target_id, rating, "Interaction matrix patched");
        Ok(true)
    }

    /// Counts are read from the current matrix, so patched cells show up;
    /// `nmf_components` describes the last fit
    pub fn stats(&self) -> Option<CollaborativeStats> {
        let state = self.state.as_ref()?;
        let nonzero = state.matrix.iter().filter(|&&v| v > 0.0).count();
        let cells = state.matrix.len();

        let ratings_per_actor: Vec<usize> = state
            .matrix
            .axis_iter(Axis(0))
            .map(rated)
            .filter(|&count| count > 0)
            .collect();
        let n_items = state
            .matrix
            .axis_iter(Axis(1))
            .filter(|column| rated(column.view()) > 0)
            .count();
        let avg_ratings_per_user = if ratings_per_actor.is_empty() {
            0.0
        } else {
            ratings_per_actor.iter().sum::<usize>() as f64 / ratings_per_actor.len() as f64
        };

        Some(CollaborativeStats {
            n_users: ratings_per_actor.len(),
            n_items,
            sparsity: if cells == 0 { 1.0 } else { 1.0 - nonzero as f64 / cells as f64 },
            avg_ratings_per_user,
            nmf_components: state.nmf.components(),
        })
    }

    /// Ids known to the fitted index, in index order
    pub fn known_ids(&self) -> &[Uuid] {
        self.state.as_ref().map(|s| s.ids.as_slice()).unwrap_or(&[])
    }

    /// Sort by raw score, keep `k`, then clamp
    fn rank(
        state: &FittedState,
        mut scored: Vec<(usize, f64)>,
        k: usize,
        source: RecommendationSource,
    ) -> Vec<Recommendation> {
        scored.sort_by(|a, b| by_score_desc(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| Recommendation {
                target_id: state.ids[idx],
                score: clamp_unit(score),
                source,
                reason: None,
            })
            .collect()
    }
}

/// Positive cells in one row or column
fn rated(lane: ArrayView1<f64>) -> usize {
    lane.iter().filter(|&&v| v > 0.0).count()
}
