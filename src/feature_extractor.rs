//! Feature extraction for dropout-risk model training and inference.
//!
//! This module turns a loosely populated [`StudentRecord`] into a fixed-order
//! numeric feature vector. Missing data never fails extraction: every field falls
//! back to a neutral default (0 for numbers, the most benign category for
//! categorical fields).

use crate::error::{PipelineError, Result};
use crate::types::record::StudentRecord;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Canonical feature order. Persisted with every trained artifact.
const CANONICAL_FEATURES: [&str; 13] = [
    "attendance_percentage",
    "current_cgpa",
    "grade_trend",
    "avg_recent_score",
    "assignment_completion_rate",
    "fee_status",
    "outstanding_amount",
    "total_backlogs",
    "course_changes",
    "total_subject_attempts",
    "library_usage_hours",
    "extracurricular_count",
    "counseling_sessions",
];

static CANONICAL_SCHEMA: Lazy<FeatureSchema> = Lazy::new(|| {
    FeatureSchema::new(CANONICAL_FEATURES.iter().map(|s| s.to_string()).collect())
});

/// Grade trend encoding
pub mod grade_trend {
    pub const DECLINING: f64 = 0.0;
    pub const STABLE: f64 = 1.0;
    pub const IMPROVING: f64 = 2.0;

    /// Unrecognized or missing input encodes as stable.
    pub fn encode(trend: Option<&str>) -> f64 {
        match trend.map(|t| t.trim().to_lowercase()).as_deref() {
            Some("declining") => DECLINING,
            Some("improving") => IMPROVING,
            _ => STABLE,
        }
    }
}

/// Fee status encoding
pub mod fee_status {
    pub const OVERDUE: f64 = 0.0;
    pub const PENDING: f64 = 1.0;
    pub const PAID: f64 = 2.0;

    /// Unrecognized or missing input encodes as paid.
    pub fn encode(status: Option<&str>) -> f64 {
        match status.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("overdue") => OVERDUE,
            Some("pending") => PENDING,
            _ => PAID,
        }
    }
}

/// Ordered list of feature names bound to vector positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Arc<[String]>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: names.into(),
        }
    }

    /// The process-wide canonical schema produced by [`FeatureExtractor`].
    pub fn canonical() -> &'static FeatureSchema {
        &CANONICAL_SCHEMA
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Unscaled feature values paired with the schema that orders them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Pair values with a schema. Lengths must agree.
    pub fn new(schema: FeatureSchema, values: Vec<f64>) -> Result<Self> {
        if schema.len() != values.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "schema has {} features but {} values were supplied",
                schema.len(),
                values.len()
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by feature name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }

    /// Reorder values into `target`'s order.
    ///
    /// Fails if `target` names a feature this vector does not carry.
    pub fn project(&self, target: &FeatureSchema) -> Result<Vec<f64>> {
        if *target == self.schema {
            return Ok(self.values.clone());
        }

        target
            .names()
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    PipelineError::SchemaMismatch(format!(
                        "artifact expects feature '{}' which the extractor does not produce",
                        name
                    ))
                })
            })
            .collect()
    }
}

/// Feature extractor that transforms student records into model input features.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract features from a student record.
    ///
    /// Never fails: absent fields take their documented defaults.
    pub fn extract(&self, record: &StudentRecord) -> FeatureVector {
        let mut features = Vec::with_capacity(CANONICAL_FEATURES.len());

        // Attendance
        features.push(record.attendance.percentage.unwrap_or(0.0));

        // Grades
        features.push(record.grades.cgpa.unwrap_or(0.0));
        features.push(grade_trend::encode(record.grades.trend.as_deref()));

        // Assessments
        let scores = &record.assessments.recent_scores;
        let avg_recent_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        features.push(avg_recent_score);
        features.push(record.assessments.assignment_submissions.unwrap_or(0.0));

        // Financial
        features.push(fee_status::encode(record.financial.fee_status.as_deref()));
        features.push(record.financial.outstanding_amount.unwrap_or(0.0));

        // Academic history
        let history = &record.academic_history;
        features.push(history.backlogs.unwrap_or(0) as f64);
        features.push(history.course_changes.unwrap_or(0) as f64);
        let total_attempts: u64 = history.subject_attempts.values().map(|&a| a as u64).sum();
        features.push(total_attempts as f64);

        // Behavioral
        let behavioral = &record.behavioral;
        features.push(behavioral.library_usage.unwrap_or(0.0));
        features.push(behavioral.extracurricular_participation.len() as f64);
        features.push(behavioral.counseling_sessions.unwrap_or(0) as f64);

        FeatureVector {
            schema: self.schema().clone(),
            values: features,
        }
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        CANONICAL_FEATURES.len()
    }

    /// Get the schema this extractor produces.
    pub fn schema(&self) -> &'static FeatureSchema {
        FeatureSchema::canonical()
    }
}
