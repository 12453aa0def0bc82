//! Random forest classifier (bagged Gini trees with per-split feature subsampling)

use crate::config::RandomForestConfig;
use crate::error::{PipelineError, Result};
use crate::models::tree::{DecisionTree, Targets, TreeParams};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    n_features: usize,
}

impl RandomForest {
    /// Fit `n_estimators` trees, each on a bootstrap sample of the rows.
    pub fn fit(
        x: &Array2<f64>,
        labels: &[usize],
        n_classes: usize,
        config: &RandomForestConfig,
        seed: u64,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != labels.len() {
            return Err(PipelineError::Numerical(format!(
                "random forest needs matching non-empty inputs ({} rows, {} labels)",
                n,
                labels.len()
            )));
        }

        let n_features = x.ncols();
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: 1,
            max_features: Some(((n_features as f64).sqrt().floor() as usize).max(1)),
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let targets = Targets::Classes { labels, n_classes };
        let trees = (0..config.n_estimators.max(1))
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(x, targets, &bootstrap, &params, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            n_classes,
            n_features,
        })
    }

    /// Mean of the per-tree leaf class distributions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        let weight = 1.0 / self.trees.len() as f64;

        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (k, p) in tree.predict_row(row).iter().enumerate() {
                    proba[[i, k]] += p * weight;
                }
            }
        }
        proba
    }

    /// Mean impurity decrease per feature, averaged over trees
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += v / self.trees.len() as f64;
            }
        }
        importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> (Array2<f64>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for j in 0..10 {
                let centre = class as f64 * 10.0;
                rows.push(centre + (j as f64) * 0.1);
                rows.push(-centre + (j % 3) as f64);
                labels.push(class);
            }
        }
        (Array2::from_shape_vec((30, 2), rows).unwrap(), labels)
    }

    fn small_config() -> RandomForestConfig {
        RandomForestConfig {
            n_estimators: 15,
            ..RandomForestConfig::default()
        }
    }

    #[test]
    fn test_forest_learns_separable_classes() {
        let (x, y) = three_blobs();
        let forest = RandomForest::fit(&x, &y, 3, &small_config(), 42).unwrap();
        let proba = forest.predict_proba(&x);

        assert_eq!(forest.n_trees(), 15);
        for (i, row) in proba.rows().into_iter().enumerate() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            let best = (0..3).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap();
            assert_eq!(best, y[i]);
        }
    }

    #[test]
    fn test_forest_is_reproducible_for_seed() {
        let (x, y) = three_blobs();
        let a = RandomForest::fit(&x, &y, 3, &small_config(), 7).unwrap();
        let b = RandomForest::fit(&x, &y, 3, &small_config(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (x, y) = three_blobs();
        let forest = RandomForest::fit(&x, &y, 3, &small_config(), 42).unwrap();
        let total: f64 = forest.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let (x, _) = three_blobs();
        assert!(RandomForest::fit(&x, &[0, 1], 3, &small_config(), 1).is_err());
    }
}
