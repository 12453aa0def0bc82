//! Student Dropout-Risk Pipeline Library
//!
//! Turns loosely structured student records into a fixed feature vector, trains
//! and selects a three-class risk classifier, persists it as a versioned artifact
//! bundle and scores new records with rule-based explanations.

pub mod config;
pub mod error;
pub mod explain;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod synthetic;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError};
pub use explain::ExplanationEngine;
pub use feature_extractor::{FeatureExtractor, FeatureSchema, FeatureVector};
pub use models::{ArtifactStore, RiskScorer, TrainedModelArtifact};
pub use training::{Trainer, TrainingOutcome, TrainingReport};
pub use types::{LabeledRecord, PredictionResult, RiskLevel, StudentRecord};
