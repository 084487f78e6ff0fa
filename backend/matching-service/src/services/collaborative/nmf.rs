// Non-negative matrix factorisation, V ≈ W · H, fitted with the
// Lee-Seung multiplicative updates for the Frobenius objective.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Guards the update denominators against division by zero
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct Nmf {
    /// rows × components
    w: Array2<f64>,
    /// components × columns
    h: Array2<f64>,
}

impl Nmf {
    /// Factorise a non-negative matrix into `components` latent factors
    ///
    /// Factors start from seeded uniform noise scaled to the matrix mean,
    /// so the same input and seed always give the same factors.
    pub fn fit(v: &Array2<f64>, components: usize, max_iter: usize, seed: u64) -> Self {
        let (rows, cols) = v.dim();
        let components = components.max(1);
        let mut rng = StdRng::seed_from_u64(seed);

        let mean = if v.is_empty() { 0.0 } else { v.sum() / v.len() as f64 };
        let scale = (mean.max(0.0) / components as f64).sqrt().max(EPSILON);

        let mut w = Array2::from_shape_fn((rows, components), |_| scale * rng.gen::<f64>());
        let mut h = Array2::from_shape_fn((components, cols), |_| scale * rng.gen::<f64>());

        for _ in 0..max_iter {
            // H ← H ⊙ (Wᵀ V) / (Wᵀ W H)
            let numerator = w.t().dot(v);
            let denominator = w.t().dot(&w).dot(&h);
            h.zip_mut_with(&(numerator / (denominator + EPSILON)), |h, ratio| *h *= ratio);

            // W ← W ⊙ (V Hᵀ) / (W H Hᵀ)
            let numerator = v.dot(&h.t());
            let denominator = w.dot(&h.dot(&h.t()));
            w.zip_mut_with(&(numerator / (denominator + EPSILON)), |w, ratio| *w *= ratio);
        }

        Self { w, h }
    }

    pub fn components(&self) -> usize {
        self.h.nrows()
    }

    /// Reconstructed ratings for one row of the original matrix
    pub fn predict_row(&self, row: usize) -> Array1<f64> {
        self.w.row(row).dot(&self.h)
    }

    /// Frobenius norm of V - W·H
    #[cfg(test)]
    fn reconstruction_error(&self, v: &Array2<f64>) -> f64 {
        let diff = v - &self.w.dot(&self.h);
        diff.mapv(|x| x * x).sum().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_factors_stay_non_negative() {
        let v = array![[1.0, 0.0, 0.7], [0.0, 1.0, 0.0], [0.9, 0.0, 0.8]];
        let nmf = Nmf::fit(&v, 2, 200, 42);

        assert_eq!(nmf.components(), 2);
        for row in 0..3 {
            assert!(nmf.predict_row(row).iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn test_error_decreases_with_iterations() {
        let v = array![[1.0, 0.0, 0.7, 0.1], [0.0, 1.0, 0.0, 0.3], [0.9, 0.0, 0.8, 0.0]];
        let short = Nmf::fit(&v, 2, 1, 42);
        let long = Nmf::fit(&v, 2, 200, 42);

        assert!(long.reconstruction_error(&v) <= short.reconstruction_error(&v));
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let v = array![[1.0, 0.5], [0.2, 0.0]];
        let a = Nmf::fit(&v, 2, 50, 42);
        let b = Nmf::fit(&v, 2, 50, 42);
        assert_eq!(a.predict_row(0), b.predict_row(0));
    }
}
