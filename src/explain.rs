//! Rule-based explanations for a risk prediction
//!
//! Risk factors come from fixed threshold checks on the *unscaled* feature values.
//! Recommendations combine a per-level baseline with keyword matches on the
//! triggered factors.

use crate::feature_extractor::{fee_status, grade_trend, FeatureVector};
use crate::types::prediction::RiskLevel;
use std::collections::HashSet;

pub const LOW_ATTENDANCE: &str = "Low attendance (< 60%)";
pub const LOW_CGPA: &str = "Low CGPA (< 6.0)";
pub const DECLINING_TREND: &str = "Declining grade trend";
pub const MULTIPLE_BACKLOGS: &str = "Multiple backlogs (> 3)";
pub const OVERDUE_FEES: &str = "Overdue fee payments";
pub const LOW_ASSIGNMENT_COMPLETION: &str = "Low assignment completion (< 50%)";

/// One threshold check: feature name, predicate on its raw value, factor text
struct FactorRule {
    feature: &'static str,
    triggered: fn(f64) -> bool,
    factor: &'static str,
}

const FACTOR_RULES: &[FactorRule] = &[
    FactorRule {
        feature: "attendance_percentage",
        triggered: |v| v < 60.0,
        factor: LOW_ATTENDANCE,
    },
    FactorRule {
        feature: "current_cgpa",
        triggered: |v| v < 6.0,
        factor: LOW_CGPA,
    },
    FactorRule {
        feature: "grade_trend",
        triggered: |v| v == grade_trend::DECLINING,
        factor: DECLINING_TREND,
    },
    FactorRule {
        feature: "total_backlogs",
        triggered: |v| v > 3.0,
        factor: MULTIPLE_BACKLOGS,
    },
    FactorRule {
        feature: "fee_status",
        triggered: |v| v == fee_status::OVERDUE,
        factor: OVERDUE_FEES,
    },
    FactorRule {
        feature: "assignment_completion_rate",
        triggered: |v| v < 50.0,
        factor: LOW_ASSIGNMENT_COMPLETION,
    },
];

const HIGH_RISK_BASELINE: &[&str] = &[
    "Immediate counseling session required",
    "Contact parents/guardians",
    "Consider academic support programs",
];

const MEDIUM_RISK_BASELINE: &[&str] = &["Schedule mentoring session", "Monitor progress closely"];

/// Keyword (lowercase) -> targeted recommendation. The first matching keyword wins.
const KEYWORD_RECOMMENDATIONS: &[(&[&str], &str)] = &[
    (&["attendance"], "Improve class attendance"),
    (&["cgpa", "grade"], "Academic tutoring recommended"),
    (&["backlogs"], "Focus on clearing backlogs"),
    (&["fee"], "Resolve fee payment issues"),
    (&["assignment"], "Improve assignment submission rate"),
];

/// Turns raw feature values and a risk level into factors and recommendations
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplanationEngine;

impl ExplanationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run every threshold check independently. A feature missing from the
    /// vector never triggers its check.
    pub fn identify_risk_factors(&self, features: &FeatureVector) -> Vec<String> {
        FACTOR_RULES
            .iter()
            .filter(|rule| {
                features
                    .get(rule.feature)
                    .map_or(false, |value| (rule.triggered)(value))
            })
            .map(|rule| rule.factor.to_string())
            .collect()
    }

    /// Baseline recommendations for `level` followed by keyword matches on the
    /// factors, without duplicates.
    pub fn recommendations(&self, level: RiskLevel, risk_factors: &[String]) -> Vec<String> {
        let baseline: &[&str] = match level {
            RiskLevel::High => HIGH_RISK_BASELINE,
            RiskLevel::Medium => MEDIUM_RISK_BASELINE,
            RiskLevel::Low | RiskLevel::Unknown => &[],
        };

        let targeted = risk_factors.iter().filter_map(|factor| {
            let factor = factor.to_lowercase();
            KEYWORD_RECOMMENDATIONS
                .iter()
                .find(|(keywords, _)| keywords.iter().any(|k| factor.contains(k)))
                .map(|(_, recommendation)| *recommendation)
        });

        let mut seen = HashSet::new();
        baseline
            .iter()
            .copied()
            .chain(targeted)
            .filter(|r| seen.insert(*r))
            .map(str::to_string)
            .collect()
    }

    /// Risk factors and recommendations for one prediction
    pub fn explain(&self, features: &FeatureVector, level: RiskLevel) -> (Vec<String>, Vec<String>) {
        let factors = self.identify_risk_factors(features);
        let recommendations = self.recommendations(level, &factors);
        (factors, recommendations)
    }
}
