//! Student record data structures
//!
//! Records arrive from the surrounding student-management system. Every field is
//! optional; the feature extractor supplies the documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw student record to be analyzed for dropout risk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRecord {
    pub attendance: Attendance,
    pub grades: Grades,
    pub assessments: Assessments,
    pub financial: Financial,
    pub academic_history: AcademicHistory,
    pub behavioral: Behavioral,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attendance {
    /// Attendance percentage (0 - 100)
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grades {
    /// Cumulative grade point average (0 - 10)
    pub cgpa: Option<f64>,
    /// "declining", "stable" or "improving"
    pub trend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assessments {
    pub recent_scores: Vec<f64>,
    /// Assignment completion rate (0 - 100)
    pub assignment_submissions: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Financial {
    /// "overdue", "pending" or "paid"
    pub fee_status: Option<String>,
    pub outstanding_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcademicHistory {
    pub backlogs: Option<u32>,
    pub course_changes: Option<u32>,
    /// Attempts per subject
    pub subject_attempts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavioral {
    /// Library usage in hours
    pub library_usage: Option<f64>,
    pub extracurricular_participation: Vec<String>,
    pub counseling_sessions: Option<u32>,
}

/// Ground-truth risk annotation carried by training records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskIndicators {
    pub calculated_risk: Option<String>,
}

/// Student record with its supervised training label
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    #[serde(flatten)]
    pub record: StudentRecord,
    #[serde(default)]
    pub risk_indicators: RiskIndicators,
}

impl LabeledRecord {
    pub fn new(record: StudentRecord, calculated_risk: &str) -> Self {
        Self {
            record,
            risk_indicators: RiskIndicators {
                calculated_risk: Some(calculated_risk.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_deserializes() {
        let record: StudentRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record, StudentRecord::default());
    }

    #[test]
    fn test_partial_record_deserialization() {
        let json = r#"{
            "attendance": {"percentage": 72.5},
            "grades": {"trend": "Improving"},
            "academic_history": {"subject_attempts": {"math": 2, "physics": 1}},
            "behavioral": {"extracurricular_participation": ["chess", "drama"]}
        }"#;
        let record: StudentRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.attendance.percentage, Some(72.5));
        assert_eq!(record.grades.cgpa, None);
        assert_eq!(record.grades.trend.as_deref(), Some("Improving"));
        assert_eq!(record.academic_history.subject_attempts.len(), 2);
        assert_eq!(record.behavioral.extracurricular_participation.len(), 2);
        assert!(record.assessments.recent_scores.is_empty());
    }

    #[test]
    fn test_labeled_record_flattening() {
        let json = r#"{
            "attendance": {"percentage": 40},
            "risk_indicators": {"calculated_risk": "high"}
        }"#;
        let labeled: LabeledRecord = serde_json::from_str(json).unwrap();

        assert_eq!(labeled.record.attendance.percentage, Some(40.0));
        assert_eq!(labeled.risk_indicators.calculated_risk.as_deref(), Some("high"));
    }
}
