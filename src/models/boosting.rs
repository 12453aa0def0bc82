//! Multi-class gradient boosting with softmax loss
//!
//! Each stage fits one regression tree per class on the negative gradient
//! `y_k - p_k`, then replaces the leaf values with a single Newton step:
//! `(K - 1) / K * sum(r) / sum(|r| * (1 - |r|))`.

use crate::config::GradientBoostingConfig;
use crate::error::{PipelineError, Result};
use crate::models::tree::{DecisionTree, Targets, TreeParams};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Log class priors used as the initial raw scores
    init: Vec<f64>,
    /// `stages[m][k]` is the tree for class `k` at stage `m`
    stages: Vec<Vec<DecisionTree>>,
    learning_rate: f64,
    n_classes: usize,
    n_features: usize,
}

impl GradientBoosting {
    pub fn fit(
        x: &Array2<f64>,
        labels: &[usize],
        n_classes: usize,
        config: &GradientBoostingConfig,
        seed: u64,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != labels.len() || n_classes < 2 {
            return Err(PipelineError::Numerical(format!(
                "gradient boosting needs matching non-empty inputs ({} rows, {} labels, {} classes)",
                n,
                labels.len(),
                n_classes
            )));
        }

        let mut counts = vec![0.0; n_classes];
        for &label in labels {
            counts[label] += 1.0;
        }
        let init: Vec<f64> = counts
            .iter()
            .map(|c| (c / n as f64).max(1e-12).ln())
            .collect();

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        let samples: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut raw = Array2::from_shape_fn((n, n_classes), |(_, k)| init[k]);
        let mut stages = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let proba = softmax_rows(&raw);
            let mut stage = Vec::with_capacity(n_classes);

            for k in 0..n_classes {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| indicator(labels[i] == k) - proba[[i, k]])
                    .collect();

                let mut tree =
                    DecisionTree::fit(x, Targets::Values(&residuals), &samples, &params, &mut rng);
                newton_leaf_update(&mut tree, x, &residuals, n_classes);

                for (i, row) in x.rows().into_iter().enumerate() {
                    raw[[i, k]] += config.learning_rate * tree.predict_row(row)[0];
                }
                stage.push(tree);
            }

            stages.push(stage);
        }

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Numerical(
                "gradient boosting diverged".to_string(),
            ));
        }

        Ok(Self {
            init,
            stages,
            learning_rate: config.learning_rate,
            n_classes,
            n_features: x.ncols(),
        })
    }

    fn raw_scores(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut scores = self.init.clone();
        for stage in &self.stages {
            for (k, tree) in stage.iter().enumerate() {
                scores[k] += self.learning_rate * tree.predict_row(row)[0];
            }
        }
        scores
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut raw = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, score) in self.raw_scores(row).into_iter().enumerate() {
                raw[[i, k]] = score;
            }
        }
        softmax_rows(&raw)
    }

    /// Mean impurity decrease per feature over every stage tree
    pub fn feature_importances(&self) -> Vec<f64> {
        let trees: Vec<&DecisionTree> = self.stages.iter().flatten().collect();
        let mut importances = vec![0.0; self.n_features];
        if trees.is_empty() {
            return importances;
        }
        for tree in &trees {
            for (acc, v) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn newton_leaf_update(tree: &mut DecisionTree, x: &Array2<f64>, residuals: &[f64], n_classes: usize) {
    let mut numerator = vec![0.0; tree.node_count()];
    let mut denominator = vec![0.0; tree.node_count()];

    for (i, row) in x.rows().into_iter().enumerate() {
        let leaf = tree.apply(row);
        let r = residuals[i];
        numerator[leaf] += r;
        denominator[leaf] += r.abs() * (1.0 - r.abs());
    }

    let factor = (n_classes as f64 - 1.0) / n_classes as f64;
    for leaf in 0..tree.node_count() {
        if numerator[leaf] == 0.0 && denominator[leaf] == 0.0 {
            continue;
        }
        let value = if denominator[leaf].abs() < 1e-150 {
            0.0
        } else {
            factor * numerator[leaf] / denominator[leaf]
        };
        tree.set_leaf_value(leaf, vec![value]);
    }
}

/// Row-wise softmax with max-subtraction for stability
pub(crate) fn softmax_rows(raw: &Array2<f64>) -> Array2<f64> {
    let mut out = raw.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for j in 0..8 {
                rows.push(class as f64 * 5.0 + j as f64 * 0.2);
                labels.push(class);
            }
        }
        (Array2::from_shape_vec((24, 1), rows).unwrap(), labels)
    }

    fn small_config() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 20,
            ..GradientBoostingConfig::default()
        }
    }

    #[test]
    fn test_softmax_rows_normalizes() {
        let p = softmax_rows(&array![[1000.0, 1000.0], [0.0, f64::ln(3.0)]]);
        assert!((p[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((p[[1, 1]] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_learns_classes() {
        let (x, y) = blobs();
        let model = GradientBoosting::fit(&x, &y, 3, &small_config(), 42).unwrap();
        let proba = model.predict_proba(&x);

        assert_eq!(model.n_stages(), 20);
        for (i, row) in proba.rows().into_iter().enumerate() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row[y[i]] > 0.5, "row {} predicted {:?}", i, row);
        }
    }

    #[test]
    fn test_zero_stages_returns_priors() {
        let (x, y) = blobs();
        let config = GradientBoostingConfig {
            n_estimators: 0,
            ..GradientBoostingConfig::default()
        };
        let model = GradientBoosting::fit(&x, &y, 3, &config, 1).unwrap();
        let proba = model.predict_proba(&x);

        for p in proba.row(0) {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, y) = blobs();
        assert!(GradientBoosting::fit(&x, &y, 1, &small_config(), 1).is_err());
    }
}
