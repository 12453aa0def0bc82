//! Model families, artifacts, persistence and inference

pub mod artifact;
pub mod boosting;
pub mod classifier;
pub mod forest;
pub mod inference;
pub mod loader;
pub mod logistic;
pub mod scaler;
pub mod tree;

pub use artifact::{ArtifactMetadata, TrainedModelArtifact};
pub use classifier::{CandidateModel, Classifier, ModelType};
pub use inference::{ModelInfo, RiskScorer};
pub use loader::{ArtifactStore, StoreLock};
