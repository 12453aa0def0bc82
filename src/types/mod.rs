//! Type definitions for the dropout-risk pipeline

pub mod prediction;
pub mod record;

pub use prediction::{PredictionResult, Probabilities, RiskLevel};
pub use record::{LabeledRecord, StudentRecord};
