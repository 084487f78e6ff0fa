// Numeric helpers shared by the scorers and filters

use ndarray::{Array2, ArrayView1, Axis};
use std::cmp::Ordering;

/// Clamp a score to [0, 1]; NaN collapses to 0
pub fn clamp_unit(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Compute cosine similarity between two vectors
///
/// Formula: cos(A, B) = (A · B) / (||A|| × ||B||)
pub fn cosine_similarity(vec_a: ArrayView1<f64>, vec_b: ArrayView1<f64>) -> f64 {
    if vec_a.len() != vec_b.len() {
        return 0.0;
    }

    let dot_product = vec_a.dot(&vec_b);
    let norm_a = vec_a.dot(&vec_a).sqrt();
    let norm_b = vec_b.dot(&vec_b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Row norms of a matrix, used to avoid recomputing them per pair
pub fn row_norms(matrix: &Array2<f64>) -> Vec<f64> {
    matrix
        .axis_iter(Axis(0))
        .map(|row| row.dot(&row).sqrt())
        .collect()
}

/// Pairwise cosine similarity over the rows of `matrix`
///
/// Zero rows get similarity 0 with everything, including themselves.
pub fn cosine_similarity_matrix(matrix: &Array2<f64>) -> Array2<f64> {
    let norms = row_norms(matrix);
    let gram = matrix.dot(&matrix.t());
    let n = matrix.nrows();

    Array2::from_shape_fn((n, n), |(i, j)| {
        let denom = norms[i] * norms[j];
        if denom == 0.0 {
            0.0
        } else {
            gram[[i, j]] / denom
        }
    })
}

/// Cosine similarity of row `idx` against every row of `matrix`
pub fn cosine_similarity_row(matrix: &Array2<f64>, norms: &[f64], idx: usize) -> Vec<f64> {
    let row = matrix.row(idx);
    let norm = norms[idx];

    matrix
        .axis_iter(Axis(0))
        .zip(norms.iter())
        .map(|(other, &other_norm)| {
            let denom = norm * other_norm;
            if denom == 0.0 {
                0.0
            } else {
                row.dot(&other) / denom
            }
        })
        .collect()
}

/// Descending comparator for scores, NaN sorted as equal
pub fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert!((clamp_unit(0.42) - 0.42).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity() {
        let vec_a = Array1::from(vec![1.0, 2.0, 3.0]);
        let vec_b = Array1::from(vec![4.0, 5.0, 6.0]);

        let similarity = cosine_similarity(vec_a.view(), vec_b.view());
        assert!(similarity > 0.9); // Nearly collinear vectors
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let vec_a = Array1::from(vec![1.0, 0.0]);
        let vec_b = Array1::from(vec![0.0, 1.0]);

        assert_eq!(cosine_similarity(vec_a.view(), vec_b.view()), 0.0);
    }

    #[test]
    fn test_similarity_matrix_matches_row() {
        let matrix = array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 0.0]];
        let full = cosine_similarity_matrix(&matrix);
        let norms = row_norms(&matrix);
        let row = cosine_similarity_row(&matrix, &norms, 0);

        assert_eq!(full.shape(), &[3, 3]);
        for (j, value) in row.iter().enumerate() {
            assert!((full[[0, j]] - value).abs() < 1e-12);
        }
        assert!((full[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((full[[0, 1]] - 0.5).abs() < 1e-12);
        assert_eq!(full[[2, 2]], 0.0);
    }
}
