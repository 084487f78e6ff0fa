use crate::error::{EngineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardisation: (x - mean) / std
///
/// Uses the population standard deviation; constant columns keep a scale
/// of 1 so they map to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(EngineError::EmptyData);
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(EngineError::EmptyData)?
            .to_vec();
        let scale = data
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > f64::EPSILON && s.is_finite() { s } else { 1.0 })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;

        let mut scaled = data.clone();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (*value - self.mean[j]) / self.scale[j];
            }
        }
        Ok(scaled)
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;

        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &value)| (value - self.mean[j]) / self.scale[j])
            .collect())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.mean.len() {
            return Err(EngineError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.mean.len(),
                width
            )));
        }
        Ok(())
    }
}
