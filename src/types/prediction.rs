//! Risk level and prediction result data structures

use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dropout risk classification.
///
/// `Unknown` is only produced when no prediction could be made and sorts below
/// every assessed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Assessed levels in class-index order (low=0, medium=1, high=2)
    pub const CLASSES: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    /// Number of model output classes
    pub const CLASS_COUNT: usize = 3;

    /// Map a model class index to its risk level
    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::CLASSES.get(index).copied()
    }

    /// Class index used as the supervised target, `None` for `Unknown`
    pub fn class_index(&self) -> Option<usize> {
        match self {
            RiskLevel::Unknown => None,
            RiskLevel::Low => Some(0),
            RiskLevel::Medium => Some(1),
            RiskLevel::High => Some(2),
        }
    }

    /// Parse a training label. Only the three assessed levels are accepted.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability distribution over the three assessed levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Probabilities {
    /// Build from a class-ordered slice; missing classes count as 0.
    pub fn from_slice(values: &[f64]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        Self {
            low: at(0),
            medium: at(1),
            high: at(2),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.low, self.medium, self.high]
    }

    pub fn sum(&self) -> f64 {
        self.low + self.medium + self.high
    }

    /// Most probable class. Ties resolve to the lower class index.
    pub fn argmax(&self) -> (RiskLevel, f64) {
        let values = self.as_array();
        let mut best = 0;
        for (i, &p) in values.iter().enumerate().skip(1) {
            if p > values[best] {
                best = i;
            }
        }
        (RiskLevel::CLASSES[best], values[best])
    }
}

/// Outcome of scoring one student record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub risk_level: RiskLevel,
    /// Probability of the chosen class (0.0 - 1.0)
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Present only on untrained/failure states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl PredictionResult {
    /// Create a successful prediction from a class distribution
    pub fn from_probabilities(probabilities: Probabilities) -> Self {
        let (risk_level, confidence) = probabilities.argmax();
        Self {
            risk_level,
            confidence,
            probabilities: Some(probabilities),
            risk_factors: Vec::new(),
            recommendations: Vec::new(),
            error: None,
            error_kind: None,
        }
    }

    /// Create the `unknown` result reported when scoring fails
    pub fn failed(error: &PipelineError) -> Self {
        Self {
            risk_level: RiskLevel::Unknown,
            confidence: 0.0,
            probabilities: None,
            risk_factors: Vec::new(),
            recommendations: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    /// Attach explanation output to the result
    pub fn with_explanation(mut self, risk_factors: Vec<String>, recommendations: Vec<String>) -> Self {
        self.risk_factors = risk_factors;
        self.recommendations = recommendations;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::Unknown < RiskLevel::Low);
    }

    #[test]
    fn test_class_index_mapping() {
        for (i, level) in RiskLevel::CLASSES.iter().enumerate() {
            assert_eq!(level.class_index(), Some(i));
            assert_eq!(RiskLevel::from_class_index(i), Some(*level));
        }
        assert_eq!(RiskLevel::from_class_index(3), None);
        assert_eq!(RiskLevel::Unknown.class_index(), None);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(RiskLevel::from_label(" HIGH "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::from_label("medium"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::from_label("unknown"), None);
        assert_eq!(RiskLevel::from_label("severe"), None);
    }

    #[test]
    fn test_argmax_tie_prefers_lower_class() {
        let probs = Probabilities::from_slice(&[0.4, 0.4, 0.2]);
        assert_eq!(probs.argmax(), (RiskLevel::Low, 0.4));

        let probs = Probabilities::from_slice(&[0.1, 0.2, 0.7]);
        assert_eq!(probs.argmax().0, RiskLevel::High);
    }

    #[test]
    fn test_failed_result_serialization() {
        let result = PredictionResult::failed(&PipelineError::ModelNotTrained);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["risk_level"], "unknown");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["error_kind"], "model_not_trained");
        assert!(json.get("probabilities").is_none());
    }
}
