//! Standardizing feature scaler

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization `(x - mean) / std`.
///
/// Fit once on the training split and reused verbatim for every later
/// transform. Constant features get a unit scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit mean and population standard deviation per column.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::Numerical(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::Numerical("scaler mean undefined".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > f64::EPSILON { s } else { 1.0 });

        if mean.iter().any(|m| !m.is_finite()) {
            return Err(PipelineError::Numerical(
                "non-finite feature values in training data".to_string(),
            ));
        }

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Transform a matrix of samples
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        Ok((x - &self.mean) / &self.scale)
    }

    /// Transform a single sample
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok((&row - &self.mean) / &self.scale)
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(PipelineError::SchemaMismatch(format!(
                "scaler fit on {} features, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();

        // column 0: mean 3, std sqrt(8/3)
        let std = (8.0f64 / 3.0).sqrt();
        assert!((scaled[[0, 0]] + 2.0 / std).abs() < 1e-12);
        assert!(scaled[[1, 0]].abs() < 1e-12);
        // constant column keeps unit scale
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transform_reuses_training_statistics() {
        let train = array![[0.0], [2.0]];
        let scaler = StandardScaler::fit(&train).unwrap();

        let row = array![4.0];
        let scaled = scaler.transform_row(row.view()).unwrap();
        assert!((scaled[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0]]).unwrap();
        let err = scaler.transform(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_empty_fit_fails() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(&x).is_err());
    }
}
