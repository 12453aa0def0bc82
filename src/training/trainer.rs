//! Model trainer: candidate comparison, selection and artifact publication
//!
//! One run extracts features and labels, makes a stratified hold-out split, fits
//! the scaler on the training side only, cross-validates every candidate family,
//! keeps the best by mean CV accuracy and publishes it through the artifact store.
//! A failed run never touches the active artifact.

use crate::config::TrainingConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::feature_extractor::{FeatureExtractor, FeatureSchema};
use crate::models::artifact::TrainedModelArtifact;
use crate::models::classifier::{CandidateModel, Classifier, ModelType};
use crate::models::loader::ArtifactStore;
use crate::models::scaler::StandardScaler;
use crate::training::evaluation::{
    accuracy, confusion_matrix, mean_std, roc_auc_ovr, ClassificationReport,
};
use crate::training::split::{stratified_k_fold, stratified_split};
use crate::types::prediction::RiskLevel;
use crate::types::record::LabeledRecord;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scores of one candidate family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub model_type: ModelType,
    /// Accuracy on the training split
    pub train_score: f64,
    /// Accuracy on the held-out split
    pub test_score: f64,
    pub cv_mean: f64,
    pub cv_std: f64,
}

/// Diagnostics of a successful training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_type: ModelType,
    pub model_version: String,
    pub bundle_id: Uuid,
    pub training_samples: usize,
    pub test_samples: usize,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub classification_report: ClassificationReport,
    /// `confusion_matrix[true][predicted]`, classes in low/medium/high order
    pub confusion_matrix: Vec<Vec<usize>>,
    pub model_comparison: Vec<CandidateResult>,
    pub trained_at: DateTime<Utc>,
}

/// Result of a training run, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TrainingOutcome {
    Success(TrainingReport),
    Error { kind: ErrorKind, message: String },
}

impl TrainingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TrainingOutcome::Success(_))
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        match self {
            TrainingOutcome::Success(report) => Some(report),
            TrainingOutcome::Error { .. } => None,
        }
    }
}

impl From<Result<TrainingReport>> for TrainingOutcome {
    fn from(result: Result<TrainingReport>) -> Self {
        match result {
            Ok(report) => TrainingOutcome::Success(report),
            Err(e) => TrainingOutcome::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Trains and publishes dropout-risk models.
///
/// At most one run is active per artifact store, across trainers and processes.
pub struct Trainer {
    config: TrainingConfig,
    extractor: FeatureExtractor,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on labelled records and publish the winner to `store`.
    ///
    /// Failures are reported in the outcome, never raised.
    pub fn train(&self, records: &[LabeledRecord], store: &ArtifactStore) -> TrainingOutcome {
        let outcome = TrainingOutcome::from(self.try_train(records, store));
        if let TrainingOutcome::Error { kind, message } = &outcome {
            warn!(kind = ?kind, error = %message, "Training failed; active model unchanged");
        }
        outcome
    }

    /// Train on labelled records, returning the failure as an error
    pub fn try_train(&self, records: &[LabeledRecord], store: &ArtifactStore) -> Result<TrainingReport> {
        let _training = store.try_lock_training()?;

        let started = Instant::now();
        let n_classes = RiskLevel::CLASS_COUNT;
        info!(records = records.len(), "Starting model training");

        let (x, labels) = self.prepare(records)?;
        check_class_counts(&labels)?;

        let split = stratified_split(&labels, n_classes, self.config.test_fraction, self.config.seed)?;
        let y_train = select_labels(&labels, &split.train);
        let y_test = select_labels(&labels, &split.test);

        let scaler = StandardScaler::fit(&x.select(Axis(0), &split.train))?;
        let x_train = scaler.transform(&x.select(Axis(0), &split.train))?;
        let x_test = scaler.transform(&x.select(Axis(0), &split.test))?;

        let folds = stratified_k_fold(&y_train, n_classes, self.config.cv_folds, self.config.seed)?;

        debug!(
            train = split.train.len(),
            test = split.test.len(),
            folds = folds.len(),
            "Data split"
        );

        let mut candidates: Vec<(CandidateModel, CandidateResult)> = Vec::with_capacity(ModelType::ALL.len());
        for model_type in ModelType::ALL {
            let mut cv_scores = Vec::with_capacity(folds.len());
            for fold in &folds {
                let model = model_type.fit(
                    &x_train.select(Axis(0), &fold.train),
                    &select_labels(&y_train, &fold.train),
                    &self.config,
                )?;
                let predicted = model.predict(&x_train.select(Axis(0), &fold.validation))?;
                cv_scores.push(accuracy(&select_labels(&y_train, &fold.validation), &predicted));
            }
            let (cv_mean, cv_std) = mean_std(&cv_scores);

            let model = model_type.fit(&x_train, &y_train, &self.config)?;
            let result = CandidateResult {
                model_type,
                train_score: accuracy(&y_train, &model.predict(&x_train)?),
                test_score: accuracy(&y_test, &model.predict(&x_test)?),
                cv_mean,
                cv_std,
            };

            info!(
                model = %model_type,
                train_score = result.train_score,
                test_score = result.test_score,
                cv_mean = result.cv_mean,
                cv_std = result.cv_std,
                "Candidate evaluated"
            );
            candidates.push((model, result));
        }

        let comparison: Vec<CandidateResult> = candidates.iter().map(|(_, r)| r.clone()).collect();
        let best = select_best(&comparison);
        let (model, _) = candidates.swap_remove(best);

        let proba = model.predict_proba(&x_test)?;
        let y_pred = model.predict(&x_test)?;
        let roc_auc = roc_auc_ovr(&y_test, &proba)?;
        let classification_report = ClassificationReport::new(&y_test, &y_pred);

        let metadata = TrainedModelArtifact::fresh_metadata(model.model_type());
        let artifact = TrainedModelArtifact::new(
            model,
            scaler,
            self.extractor.schema().clone(),
            metadata.clone(),
        )?;
        store.save(&artifact)?;

        let report = TrainingReport {
            model_type: metadata.model_type,
            model_version: metadata.model_version,
            bundle_id: metadata.bundle_id,
            training_samples: split.train.len(),
            test_samples: split.test.len(),
            accuracy: classification_report.accuracy,
            roc_auc,
            confusion_matrix: confusion_matrix(&y_test, &y_pred, n_classes),
            classification_report,
            model_comparison: comparison,
            trained_at: metadata.trained_at,
        };

        info!(
            model = %report.model_type,
            bundle_id = %report.bundle_id,
            accuracy = report.accuracy,
            roc_auc = report.roc_auc,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training complete"
        );

        Ok(report)
    }

    /// Feature matrix in canonical schema order and class-index labels
    fn prepare(&self, records: &[LabeledRecord]) -> Result<(Array2<f64>, Vec<usize>)> {
        if records.is_empty() {
            return Err(PipelineError::InvalidTrainingData(
                "no training records supplied".to_string(),
            ));
        }

        let schema: &FeatureSchema = self.extractor.schema();
        let mut x = Array2::zeros((records.len(), schema.len()));
        let mut labels = Vec::with_capacity(records.len());

        for (i, labeled) in records.iter().enumerate() {
            let raw = labeled.risk_indicators.calculated_risk.as_deref().ok_or_else(|| {
                PipelineError::InvalidTrainingData(format!("record {} has no risk label", i))
            })?;
            let class = RiskLevel::from_label(raw)
                .and_then(|level| level.class_index())
                .ok_or_else(|| {
                    PipelineError::InvalidTrainingData(format!(
                        "record {} has unrecognized risk label {:?}",
                        i, raw
                    ))
                })?;
            labels.push(class);

            let features = self.extractor.extract(&labeled.record);
            if let Some(name) = schema
                .names()
                .iter()
                .zip(features.values())
                .find(|(_, v)| !v.is_finite())
                .map(|(name, _)| name)
            {
                return Err(PipelineError::InvalidTrainingData(format!(
                    "record {} has a non-finite {}",
                    i, name
                )));
            }
            x.row_mut(i).assign(&ArrayView1::from(features.values()));
        }

        Ok((x, labels))
    }
}

fn select_labels(labels: &[usize], rows: &[usize]) -> Vec<usize> {
    rows.iter().map(|&i| labels[i]).collect()
}

fn check_class_counts(labels: &[usize]) -> Result<()> {
    let mut counts = [0usize; RiskLevel::CLASS_COUNT];
    for &label in labels {
        counts[label] += 1;
    }
    if let Some((class, &n)) = counts.iter().enumerate().find(|(_, &n)| n < 2) {
        return Err(PipelineError::InsufficientData(format!(
            "{} risk has {} record(s); every class needs at least 2 (counts low/medium/high = {:?})",
            RiskLevel::CLASSES[class],
            n,
            counts
        )));
    }
    Ok(())
}

/// Index of the highest mean CV score; ties go to the earliest candidate
fn select_best(results: &[CandidateResult]) -> usize {
    let mut best = 0;
    for (i, result) in results.iter().enumerate().skip(1) {
        if result.cv_mean > results[best].cv_mean {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradientBoostingConfig, LogisticRegressionConfig, RandomForestConfig};
    use crate::synthetic::RecordGenerator;
    use tempfile::TempDir;

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            random_forest: RandomForestConfig {
                n_estimators: 10,
                ..RandomForestConfig::default()
            },
            gradient_boosting: GradientBoostingConfig {
                n_estimators: 10,
                ..GradientBoostingConfig::default()
            },
            logistic_regression: LogisticRegressionConfig {
                max_iter: 200,
                ..LogisticRegressionConfig::default()
            },
            ..TrainingConfig::default()
        }
    }

    fn records(n: usize) -> Vec<LabeledRecord> {
        RecordGenerator::new(42).generate_mix(n, [0.4, 0.35, 0.25])
    }

    fn result(model_type: ModelType, cv_mean: f64) -> CandidateResult {
        CandidateResult {
            model_type,
            train_score: 1.0,
            test_score: 1.0,
            cv_mean,
            cv_std: 0.0,
        }
    }

    #[test]
    fn test_train_publishes_best_candidate() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let trainer = Trainer::new(fast_config());

        let outcome = trainer.train(&records(120), &store);
        let report = outcome.report().expect("training should succeed");

        assert_eq!(report.model_comparison.len(), 3);
        assert_eq!(report.training_samples + report.test_samples, 120);
        assert_eq!(report.model_version, "1.0.0");
        assert!(report.accuracy > 0.8, "accuracy {}", report.accuracy);
        assert!(report.roc_auc > 0.8, "roc_auc {}", report.roc_auc);
        assert_eq!(
            report.confusion_matrix.iter().flatten().sum::<usize>(),
            report.test_samples
        );

        let best_cv = report
            .model_comparison
            .iter()
            .map(|c| c.cv_mean)
            .fold(f64::MIN, f64::max);
        let chosen = report
            .model_comparison
            .iter()
            .find(|c| c.model_type == report.model_type)
            .unwrap();
        assert_eq!(chosen.cv_mean, best_cv);

        assert_eq!(store.active_bundle_id().unwrap(), Some(report.bundle_id));
        assert_eq!(store.load().unwrap().metadata().model_type, report.model_type);
    }

    #[test]
    fn test_select_best_prefers_first_on_tie() {
        let results = [
            result(ModelType::RandomForest, 0.9),
            result(ModelType::GradientBoosting, 0.9),
            result(ModelType::LogisticRegression, 0.85),
        ];
        assert_eq!(select_best(&results), 0);

        let results = [
            result(ModelType::RandomForest, 0.8),
            result(ModelType::GradientBoosting, 0.9),
            result(ModelType::LogisticRegression, 0.9),
        ];
        assert_eq!(select_best(&results), 1);
    }

    #[test]
    fn test_insufficient_data_keeps_prior_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let trainer = Trainer::new(fast_config());

        let first = trainer.train(&records(90), &store);
        let prior = store.active_bundle_id().unwrap();
        assert!(first.is_success());

        let tiny = RecordGenerator::new(1).generate_mix(3, [1.0, 1.0, 1.0]);
        match trainer.train(&tiny, &store) {
            TrainingOutcome::Error { kind, .. } => {
                assert_eq!(kind, ErrorKind::TrainingDataInsufficient)
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(store.active_bundle_id().unwrap(), prior);
    }

    #[test]
    fn test_too_few_for_cross_validation() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        // 3 per class: one goes to test, leaving 2 per class for 5 folds
        let records = RecordGenerator::new(5).generate_mix(9, [1.0, 1.0, 1.0]);

        let err = Trainer::new(fast_config()).try_train(&records, &store).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
        assert_eq!(store.active_bundle_id().unwrap(), None);
    }

    #[test]
    fn test_missing_or_unknown_label_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let trainer = Trainer::new(fast_config());

        let mut unlabeled = records(30);
        unlabeled[4].risk_indicators.calculated_risk = None;
        let err = trainer.try_train(&unlabeled, &store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrainingDataInvalid);

        let mut mislabeled = records(30);
        mislabeled[0].risk_indicators.calculated_risk = Some("critical".to_string());
        let err = trainer.try_train(&mislabeled, &store).unwrap_err();
        assert!(err.to_string().contains("critical"));

        assert_eq!(
            trainer.try_train(&[], &store).unwrap_err().kind(),
            ErrorKind::TrainingDataInvalid
        );
    }

    #[test]
    fn test_concurrent_training_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let trainer = Trainer::new(fast_config());

        // held by another trainer on the same directory
        let running = ArtifactStore::new(dir.path(), 3).try_lock_training().unwrap();
        let err = trainer.try_train(&records(60), &store).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingInProgress));
        assert_eq!(store.active_bundle_id().unwrap(), None);

        drop(running);
        assert!(trainer.try_train(&records(60), &store).is_ok());
    }

    #[test]
    fn test_training_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let trainer = Trainer::new(fast_config());
        let data = records(90);

        let a = trainer.try_train(&data, &store).unwrap();
        let b = trainer.try_train(&data, &store).unwrap();
        assert_eq!(a.model_comparison, b.model_comparison);
        assert_eq!(a.confusion_matrix, b.confusion_matrix);
        assert_ne!(a.bundle_id, b.bundle_id);
    }

    #[test]
    fn test_outcome_serialization() {
        let failed: Result<TrainingReport> = Err(PipelineError::InsufficientData("x".to_string()));
        let outcome = TrainingOutcome::from(failed);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "training_data_insufficient");
        assert!(json["message"].as_str().unwrap().contains("x"));
    }
}
