//! Classifier abstraction over the candidate model families

use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::models::boosting::GradientBoosting;
use crate::models::forest::RandomForest;
use crate::models::logistic::LogisticRegression;
use crate::types::prediction::RiskLevel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trait for fitted classifiers
pub trait Classifier: Send + Sync {
    /// Predict class probabilities, one row per sample, columns in class-index order
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Impurity-based importances, if the model family has them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Predict class labels. Ties resolve to the lower class index.
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (k, &p) in row.iter().enumerate().skip(1) {
                    if p > row[best] {
                        best = k;
                    }
                }
                best
            })
            .collect())
    }
}

/// Candidate model families, in selection tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    RandomForest,
    GradientBoosting,
    LogisticRegression,
}

impl ModelType {
    /// Every candidate, in declared order
    pub const ALL: [ModelType; 3] = [
        ModelType::RandomForest,
        ModelType::GradientBoosting,
        ModelType::LogisticRegression,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::RandomForest => "random_forest",
            ModelType::GradientBoosting => "gradient_boosting",
            ModelType::LogisticRegression => "logistic_regression",
        }
    }

    /// Fit a fresh model of this family on scaled features
    pub fn fit(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        config: &TrainingConfig,
    ) -> Result<CandidateModel> {
        let n_classes = RiskLevel::CLASS_COUNT;
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(PipelineError::InvalidTrainingData(format!(
                "class index {} out of range",
                bad
            )));
        }

        let model = match self {
            ModelType::RandomForest => CandidateModel::RandomForest(RandomForest::fit(
                x,
                labels,
                n_classes,
                &config.random_forest,
                config.seed,
            )?),
            ModelType::GradientBoosting => CandidateModel::GradientBoosting(
                GradientBoosting::fit(x, labels, n_classes, &config.gradient_boosting, config.seed)?,
            ),
            ModelType::LogisticRegression => CandidateModel::LogisticRegression(
                LogisticRegression::fit(x, labels, n_classes, &config.logistic_regression)?,
            ),
        };
        Ok(model)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted candidate, serialized with its family tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", content = "model", rename_all = "snake_case")]
pub enum CandidateModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    LogisticRegression(LogisticRegression),
}

impl CandidateModel {
    pub fn n_features(&self) -> usize {
        match self {
            CandidateModel::RandomForest(m) => m.n_features(),
            CandidateModel::GradientBoosting(m) => m.n_features(),
            CandidateModel::LogisticRegression(m) => m.n_features(),
        }
    }
}

impl Classifier for CandidateModel {
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features() {
            return Err(PipelineError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                self.n_features(),
                features.ncols()
            )));
        }

        let proba = match self {
            CandidateModel::RandomForest(m) => m.predict_proba(features),
            CandidateModel::GradientBoosting(m) => m.predict_proba(features),
            CandidateModel::LogisticRegression(m) => m.predict_proba(features),
        };

        if proba.iter().any(|p| !p.is_finite()) {
            return Err(PipelineError::Numerical(format!(
                "{} produced non-finite probabilities",
                self.model_type()
            )));
        }
        Ok(proba)
    }

    fn model_type(&self) -> ModelType {
        match self {
            CandidateModel::RandomForest(_) => ModelType::RandomForest,
            CandidateModel::GradientBoosting(_) => ModelType::GradientBoosting,
            CandidateModel::LogisticRegression(_) => ModelType::LogisticRegression,
        }
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            CandidateModel::RandomForest(m) => Some(m.feature_importances()),
            CandidateModel::GradientBoosting(m) => Some(m.feature_importances()),
            CandidateModel::LogisticRegression(_) => None,
        }
    }
}
