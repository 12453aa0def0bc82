//! Multinomial logistic regression trained by full-batch gradient descent

use crate::config::LogisticRegressionConfig;
use crate::error::{PipelineError, Result};
use crate::models::boosting::softmax_rows;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `n_features x n_classes`
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LogisticRegression {
    /// Minimize mean cross-entropy plus `||W||^2 / (2 * C * n)`.
    pub fn fit(
        x: &Array2<f64>,
        labels: &[usize],
        n_classes: usize,
        config: &LogisticRegressionConfig,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != labels.len() {
            return Err(PipelineError::Numerical(format!(
                "logistic regression needs matching non-empty inputs ({} rows, {} labels)",
                n,
                labels.len()
            )));
        }
        if config.c <= 0.0 {
            return Err(PipelineError::Numerical(
                "regularization strength C must be positive".to_string(),
            ));
        }

        let mut one_hot = Array2::<f64>::zeros((n, n_classes));
        for (i, &label) in labels.iter().enumerate() {
            one_hot[[i, label]] = 1.0;
        }

        let n_f = n as f64;
        let penalty = 1.0 / (config.c * n_f);
        let mut weights = Array2::<f64>::zeros((x.ncols(), n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);

        for _ in 0..config.max_iter {
            let logits = x.dot(&weights) + &bias;
            let residual = softmax_rows(&logits) - &one_hot;

            let grad_w = x.t().dot(&residual) / n_f + &weights * penalty;
            let grad_b = residual.sum_axis(Axis(0)) / n_f;

            weights.scaled_add(-config.learning_rate, &grad_w);
            bias.scaled_add(-config.learning_rate, &grad_b);
        }

        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(PipelineError::Numerical(
                "logistic regression diverged".to_string(),
            ));
        }

        Ok(Self { weights, bias })
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        softmax_rows(&(x.dot(&self.weights) + &self.bias))
    }

    pub fn n_features(&self) -> usize {
        self.weights.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_separates_classes() {
        let x = array![
            [-2.0, 0.0],
            [-1.8, 0.1],
            [-2.2, -0.1],
            [0.0, 2.0],
            [0.1, 1.8],
            [-0.1, 2.2],
            [2.0, 0.0],
            [1.8, -0.1],
            [2.2, 0.1]
        ];
        let y = [0, 0, 0, 1, 1, 1, 2, 2, 2];
        let model = LogisticRegression::fit(&x, &y, 3, &LogisticRegressionConfig::default()).unwrap();
        let proba = model.predict_proba(&x);

        for (i, row) in proba.rows().into_iter().enumerate() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            let best = (0..3).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap();
            assert_eq!(best, y[i]);
        }
    }

    #[test]
    fn test_untrained_weights_give_uniform_distribution() {
        let config = LogisticRegressionConfig {
            max_iter: 0,
            ..LogisticRegressionConfig::default()
        };
        let model = LogisticRegression::fit(&array![[1.0], [2.0]], &[0, 1], 3, &config).unwrap();
        let proba = model.predict_proba(&array![[5.0]]);
        for p in proba.row(0) {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_regularization_rejected() {
        let config = LogisticRegressionConfig {
            c: 0.0,
            ..LogisticRegressionConfig::default()
        };
        assert!(LogisticRegression::fit(&array![[1.0]], &[0], 3, &config).is_err());
    }
}
