//! Trained model artifact: selected classifier, fitted scaler and feature schema

use crate::error::{PipelineError, Result};
use crate::feature_extractor::{FeatureSchema, FeatureVector};
use crate::models::classifier::{CandidateModel, Classifier, ModelType};
use crate::models::scaler::StandardScaler;
use crate::types::prediction::Probabilities;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic version stamped on every newly trained artifact
pub const MODEL_VERSION: &str = "1.0.0";

/// Tolerance for a probability row to count as a distribution
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Descriptive fields of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub bundle_id: Uuid,
    pub model_type: ModelType,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
}

/// Immutable bundle produced by a successful training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModelArtifact {
    model: CandidateModel,
    scaler: StandardScaler,
    schema: FeatureSchema,
    metadata: ArtifactMetadata,
}

impl TrainedModelArtifact {
    /// Assemble an artifact, checking that model, scaler and schema agree on width.
    pub fn new(
        model: CandidateModel,
        scaler: StandardScaler,
        schema: FeatureSchema,
        metadata: ArtifactMetadata,
    ) -> Result<Self> {
        let widths = [model.n_features(), scaler.n_features(), schema.len()];
        if widths.iter().any(|&w| w != widths[0]) {
            return Err(PipelineError::SchemaMismatch(format!(
                "model, scaler and schema widths disagree: {:?}",
                widths
            )));
        }
        if model.model_type() != metadata.model_type {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "metadata names {} but model is {}",
                metadata.model_type,
                model.model_type()
            )));
        }

        Ok(Self {
            model,
            scaler,
            schema,
            metadata,
        })
    }

    /// Create metadata for a freshly trained model
    pub fn fresh_metadata(model_type: ModelType) -> ArtifactMetadata {
        ArtifactMetadata {
            bundle_id: Uuid::new_v4(),
            model_type,
            model_version: MODEL_VERSION.to_string(),
            trained_at: Utc::now(),
        }
    }

    pub fn model(&self) -> &CandidateModel {
        &self.model
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Class distribution for one unscaled feature vector.
    ///
    /// Values are reordered into the recorded schema and scaled with the stored
    /// transform before reaching the model.
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<Probabilities> {
        let values = features.project(&self.schema)?;
        let row = Array2::from_shape_vec((1, values.len()), values)
            .map_err(|e| PipelineError::Numerical(format!("feature shape: {}", e)))?;
        let scaled = self.scaler.transform(&row)?;
        let proba = self.model.predict_proba(&scaled)?;

        let probabilities = Probabilities::from_slice(&proba.row(0).to_vec());
        if (probabilities.sum() - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(PipelineError::Numerical(format!(
                "probabilities sum to {} instead of 1",
                probabilities.sum()
            )));
        }
        Ok(probabilities)
    }

    /// Feature importances paired with names, most important first
    pub fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        let importances = self.model.feature_importances()?;
        let mut named: Vec<(String, f64)> = self
            .schema
            .names()
            .iter()
            .cloned()
            .zip(importances)
            .collect();
        named.sort_by(|a, b| b.1.total_cmp(&a.1));
        Some(named)
    }
}
