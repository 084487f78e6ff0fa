// ============================================
// Regression Tree Ensembles
// ============================================
//
// CART regression trees (squared-error splits) stored as flat node
// arrays so a trained ensemble serializes as plain data.
//
// - RandomForest: bootstrap-sampled trees, prediction = mean of trees
// - GradientBoosting: squared-loss boosting on residuals with shrinkage

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Minimum impurity decrease for a split to be kept
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit a tree on the rows of `x` listed in `samples`
    ///
    /// Impurity decreases are accumulated into `importances` (one slot per
    /// column of `x`).
    pub fn fit(
        x: &Array2<f64>,
        y: &[f64],
        samples: Vec<usize>,
        params: &TreeParams,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, samples, 0, params, importances);
        tree
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        y: &[f64],
        samples: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        importances: &mut [f64],
    ) -> usize {
        let node_idx = self.nodes.len();
        let value = mean(y, &samples);
        self.nodes.push(Node::Leaf { value });

        if depth >= params.max_depth || samples.len() < params.min_samples_split {
            return node_idx;
        }

        let split = match best_split(x, y, &samples, params.min_samples_leaf) {
            Some(split) => split,
            None => return node_idx,
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        importances[split.feature] += split.gain;

        let left = self.grow(x, y, left_samples, depth + 1, params, importances);
        let right = self.grow(x, y, right_samples, depth + 1, params, importances);

        self.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }
}

fn mean(y: &[f64], samples: &[usize]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
}

/// Exhaustive search for the split with the largest SSE decrease
fn best_split(
    x: &Array2<f64>,
    y: &[f64],
    samples: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = samples.len();
    let total_sum: f64 = samples.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = samples.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut sorted = samples.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for k in 1..n {
            let prev = sorted[k - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];

            let lo = x[[prev, feature]];
            let hi = x[[sorted[k], feature]];
            if hi <= lo || k < min_samples_leaf || n - k < min_samples_leaf {
                continue;
            }

            let left_n = k as f64;
            let right_n = (n - k) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;

            let left_sse = left_sq - left_sum * left_sum / left_n;
            let right_sse = right_sq - right_sum * right_sum / right_n;
            let gain = parent_sse - left_sse - right_sse;

            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: lo + (hi - lo) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

/// Normalise accumulated impurity decreases to sum to 1
fn normalize(importances: &mut [f64]) {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|v| *v /= total);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        x: &Array2<f64>,
        y: &[f64],
        n_estimators: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n = x.nrows();
        let mut importances = vec![0.0; x.ncols()];
        let trees = (0..n_estimators.max(1))
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, bootstrap, params, &mut importances)
            })
            .collect();

        normalize(&mut importances);
        Self { trees, importances }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len() as f64
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    #[cfg(test)]
    fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn fit(
        x: &Array2<f64>,
        y: &[f64],
        n_estimators: usize,
        learning_rate: f64,
        params: &TreeParams,
    ) -> Self {
        let n = x.nrows();
        let init = mean(y, &(0..n).collect::<Vec<_>>());
        let mut current = vec![init; n];
        let mut importances = vec![0.0; x.ncols()];
        let mut trees = Vec::with_capacity(n_estimators);

        for _ in 0..n_estimators.max(1) {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree =
                RegressionTree::fit(x, &residuals, (0..n).collect(), params, &mut importances);

            for (i, value) in current.iter_mut().enumerate() {
                *value += learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        normalize(&mut importances);
        Self {
            init,
            learning_rate,
            trees,
            importances,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.init
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_row(row))
                .sum::<f64>()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}
