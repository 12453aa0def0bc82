//! Offline model training

pub mod evaluation;
pub mod split;
pub mod trainer;

pub use trainer::{CandidateResult, Trainer, TrainingOutcome, TrainingReport};
