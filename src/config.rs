//! Configuration management for the dropout-risk pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    pub training: TrainingConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

/// Artifact store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory holding model bundles and the active-bundle pointer
    pub dir: PathBuf,
    /// Number of bundles kept on disk, including the active one
    pub retain_versions: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            retain_versions: 3,
        }
    }
}

/// Model training configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of records held out for the final evaluation
    pub test_fraction: f64,
    /// Folds used for candidate cross-validation
    pub cv_folds: usize,
    /// Seed for every stochastic training step
    pub seed: u64,
    pub random_forest: RandomForestConfig,
    pub gradient_boosting: GradientBoostingConfig,
    pub logistic_regression: LogisticRegressionConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            cv_folds: 5,
            seed: 42,
            random_forest: RandomForestConfig::default(),
            gradient_boosting: GradientBoostingConfig::default(),
            logistic_regression: LogisticRegressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// Inverse L2 regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            learning_rate: 0.1,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Concurrent scoring tasks for batch scoring
    pub workers: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Default configuration file location
    pub const DEFAULT_PATH: &'static str = "config/config.toml";

    /// Load configuration from the default file, falling back to defaults if it is absent
    pub fn load() -> Result<Self> {
        let path = Path::new(Self::DEFAULT_PATH);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
