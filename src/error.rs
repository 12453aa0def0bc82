//! Error types for the dropout-risk pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification carried across component boundaries.
///
/// Callers branch on this rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelNotTrained,
    TrainingDataInsufficient,
    TrainingDataInvalid,
    ArtifactCorrupt,
    SchemaMismatch,
    TrainingInProgress,
    Numerical,
    Io,
    Serialization,
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No valid artifact is available for scoring
    #[error("Model not trained. Please train the model first.")]
    ModelNotTrained,

    /// Stratified split or cross-validation impossible
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    /// Training records that cannot be used (bad or missing labels)
    #[error("Invalid training data: {0}")]
    InvalidTrainingData(String),

    /// Artifact bundle missing, partial, or failing integrity checks
    #[error("Artifact corrupt or missing: {0}")]
    ArtifactCorrupt(String),

    /// Feature vector does not match the artifact's recorded schema
    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Another training run holds the trainer
    #[error("A training run is already in progress")]
    TrainingInProgress,

    /// Numerical failure inside a model or metric
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ModelNotTrained => ErrorKind::ModelNotTrained,
            PipelineError::InsufficientData(_) => ErrorKind::TrainingDataInsufficient,
            PipelineError::InvalidTrainingData(_) => ErrorKind::TrainingDataInvalid,
            PipelineError::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            PipelineError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            PipelineError::TrainingInProgress => ErrorKind::TrainingInProgress,
            PipelineError::Numerical(_) => ErrorKind::Numerical,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
