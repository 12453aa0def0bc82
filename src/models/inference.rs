//! Risk scorer: feature extraction, scaling, classification and explanation

use crate::error::{PipelineError, Result};
use crate::explain::ExplanationEngine;
use crate::feature_extractor::FeatureExtractor;
use crate::models::artifact::TrainedModelArtifact;
use crate::models::loader::ArtifactStore;
use crate::types::prediction::PredictionResult;
use crate::types::record::StudentRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary of the loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// `trained` or `no_model`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

/// Scores student records against one immutable artifact.
///
/// The scorer holds no mutable state, so a single instance can be shared across
/// tasks behind an `Arc`.
pub struct RiskScorer {
    artifact: Option<Arc<TrainedModelArtifact>>,
    extractor: FeatureExtractor,
    explainer: ExplanationEngine,
}

impl RiskScorer {
    /// Create a scorer over an artifact, or an untrained scorer with `None`
    pub fn new(artifact: Option<Arc<TrainedModelArtifact>>) -> Self {
        Self {
            artifact,
            extractor: FeatureExtractor::new(),
            explainer: ExplanationEngine::new(),
        }
    }

    /// Create a scorer over the store's active artifact. A missing or unreadable
    /// bundle yields an untrained scorer.
    pub fn from_store(store: &ArtifactStore) -> Self {
        Self::new(store.load().map(Arc::new))
    }

    pub fn is_trained(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn artifact(&self) -> Option<&Arc<TrainedModelArtifact>> {
        self.artifact.as_ref()
    }

    /// Score a record. Never fails: an untrained scorer or an inference error
    /// yields an `unknown` result carrying the error.
    pub fn score(&self, record: &StudentRecord) -> PredictionResult {
        match self.try_score(record) {
            Ok(result) => result,
            Err(PipelineError::ModelNotTrained) => {
                debug!("Scoring requested before a model was trained");
                PredictionResult::failed(&PipelineError::ModelNotTrained)
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Scoring failed");
                PredictionResult::failed(&e)
            }
        }
    }

    /// Score a record, returning the failure instead of an `unknown` result
    pub fn try_score(&self, record: &StudentRecord) -> Result<PredictionResult> {
        let artifact = self.artifact.as_ref().ok_or(PipelineError::ModelNotTrained)?;

        let features = self.extractor.extract(record);
        let probabilities = artifact.predict_proba(&features)?;
        let result = PredictionResult::from_probabilities(probabilities);

        let (factors, recommendations) = self.explainer.explain(&features, result.risk_level);

        debug!(
            risk_level = %result.risk_level,
            confidence = result.confidence,
            factors = factors.len(),
            "Record scored"
        );

        Ok(result.with_explanation(factors, recommendations))
    }

    /// Score a batch of records, preserving order
    pub fn score_batch(&self, records: &[StudentRecord]) -> Vec<PredictionResult> {
        records.iter().map(|r| self.score(r)).collect()
    }

    /// Describe the loaded model
    pub fn model_info(&self) -> ModelInfo {
        match &self.artifact {
            Some(artifact) => {
                let metadata = artifact.metadata();
                ModelInfo {
                    status: "trained".to_string(),
                    model_type: Some(metadata.model_type.to_string()),
                    model_version: Some(metadata.model_version.clone()),
                    trained_at: Some(metadata.trained_at),
                    feature_count: artifact.schema().len(),
                    feature_names: artifact.schema().names().to_vec(),
                }
            }
            None => ModelInfo {
                status: "no_model".to_string(),
                model_type: None,
                model_version: None,
                trained_at: None,
                feature_count: 0,
                feature_names: Vec::new(),
            },
        }
    }

    /// Feature importances, most important first. `None` when untrained or when the
    /// model family has no importances.
    pub fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        self.artifact.as_ref()?.feature_importance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::error::ErrorKind;
    use crate::feature_extractor::FeatureSchema;
    use crate::models::classifier::ModelType;
    use crate::models::scaler::StandardScaler;
    use crate::types::prediction::RiskLevel;
    use ndarray::Array2;

    /// Artifact over the canonical schema trained on attendance alone:
    /// low attendance is high risk.
    fn attendance_artifact(model_type: ModelType) -> TrainedModelArtifact {
        let schema = FeatureSchema::canonical().clone();
        let width = schema.len();
        let attendance = [95.0, 92.0, 90.0, 88.0, 75.0, 72.0, 70.0, 68.0, 40.0, 35.0, 30.0, 25.0];
        let labels = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];

        let mut x = Array2::zeros((attendance.len(), width));
        for (i, &a) in attendance.iter().enumerate() {
            x[[i, 0]] = a;
            x[[i, 1]] = a / 10.0;
        }

        let scaler = StandardScaler::fit(&x).unwrap();
        let mut config = TrainingConfig::default();
        config.random_forest.n_estimators = 10;
        let model = model_type
            .fit(&scaler.transform(&x).unwrap(), &labels, &config)
            .unwrap();

        TrainedModelArtifact::new(model, scaler, schema, TrainedModelArtifact::fresh_metadata(model_type))
            .unwrap()
    }

    fn record(attendance: f64) -> StudentRecord {
        let mut record = StudentRecord::default();
        record.attendance.percentage = Some(attendance);
        record.grades.cgpa = Some(attendance / 10.0);
        record
    }

    #[test]
    fn test_untrained_scorer() {
        let scorer = RiskScorer::new(None);
        let result = scorer.score(&record(80.0));

        assert_eq!(result.risk_level, RiskLevel::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error_kind, Some(ErrorKind::ModelNotTrained));
        assert!(result.error.is_some());
        assert!(matches!(scorer.try_score(&record(80.0)), Err(PipelineError::ModelNotTrained)));
    }

    #[test]
    fn test_scores_and_explains() {
        let scorer = RiskScorer::new(Some(Arc::new(attendance_artifact(ModelType::RandomForest))));

        let low = scorer.score(&record(93.0));
        assert_eq!(low.risk_level, RiskLevel::Low);
        assert!(!low.is_error());

        let high = scorer.score(&record(28.0));
        assert_eq!(high.risk_level, RiskLevel::High);
        assert!(high.risk_factors.contains(&"Low attendance (< 60%)".to_string()));
        assert!(high
            .recommendations
            .contains(&"Immediate counseling session required".to_string()));

        let probabilities = high.probabilities.unwrap();
        assert!((probabilities.sum() - 1.0).abs() < 1e-6);
        assert_eq!(high.confidence, probabilities.high);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = RiskScorer::new(Some(Arc::new(attendance_artifact(ModelType::GradientBoosting))));
        let r = record(71.0);
        assert_eq!(scorer.score(&r), scorer.score(&r));
    }

    #[test]
    fn test_score_batch_preserves_order() {
        let scorer = RiskScorer::new(Some(Arc::new(attendance_artifact(ModelType::RandomForest))));
        let results = scorer.score_batch(&[record(93.0), record(28.0)]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].risk_level, RiskLevel::Low);
        assert_eq!(results[1].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_model_info() {
        assert_eq!(RiskScorer::new(None).model_info().status, "no_model");

        let scorer = RiskScorer::new(Some(Arc::new(attendance_artifact(ModelType::LogisticRegression))));
        let info = scorer.model_info();
        assert_eq!(info.status, "trained");
        assert_eq!(info.model_type.as_deref(), Some("logistic_regression"));
        assert_eq!(info.model_version.as_deref(), Some("1.0.0"));
        assert_eq!(info.feature_count, 13);
        assert_eq!(info.feature_names[0], "attendance_percentage");
        assert!(scorer.feature_importance().is_none());
    }

    #[test]
    fn test_feature_importance_for_forest() {
        let scorer = RiskScorer::new(Some(Arc::new(attendance_artifact(ModelType::RandomForest))));
        let importance = scorer.feature_importance().unwrap();

        assert_eq!(importance.len(), 13);
        assert!(["attendance_percentage", "current_cgpa"].contains(&importance[0].0.as_str()));
    }
}
