//! Synthetic labelled student records
//!
//! Each risk level draws its fields from a distinct profile, so a model trained on
//! the output has real signal to find. Generation is fully determined by the seed.

use crate::types::prediction::RiskLevel;
use crate::types::record::{LabeledRecord, StudentRecord};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const SUBJECTS: &[&str] = &[
    "mathematics",
    "physics",
    "chemistry",
    "programming",
    "electronics",
    "mechanics",
];

const ACTIVITIES: &[&str] = &["sports", "music", "debate", "robotics", "drama", "volunteering"];

/// Seeded generator for labelled records
pub struct RecordGenerator {
    rng: StdRng,
}

impl RecordGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn one_decimal(&mut self, low: f64, high: f64) -> f64 {
        (self.rng.gen_range(low..high) * 10.0).round() / 10.0
    }

    fn choose<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices.choose(&mut self.rng).copied().unwrap_or_default()
    }

    /// Generate one record drawn from the profile of `level`.
    /// `RiskLevel::Unknown` is generated as low risk.
    pub fn generate(&mut self, level: RiskLevel) -> LabeledRecord {
        let mut record = StudentRecord::default();

        let (attendance, cgpa, scores, assignments) = match level {
            RiskLevel::High => ((30.0, 60.0), (3.5, 6.0), (30.0, 60.0), (20.0, 55.0)),
            RiskLevel::Medium => ((60.0, 80.0), (6.0, 7.5), (55.0, 75.0), (55.0, 85.0)),
            RiskLevel::Low | RiskLevel::Unknown => ((80.0, 100.0), (7.0, 9.8), (70.0, 95.0), (80.0, 100.0)),
        };

        record.attendance.percentage = Some(self.one_decimal(attendance.0, attendance.1));
        record.grades.cgpa = Some(self.one_decimal(cgpa.0, cgpa.1));
        record.grades.trend = Some(
            match level {
                RiskLevel::High => {
                    if self.rng.gen_bool(0.8) {
                        "declining"
                    } else {
                        "stable"
                    }
                }
                RiskLevel::Medium => self.choose(&["stable", "declining", "stable"]),
                _ => self.choose(&["improving", "stable"]),
            }
            .to_string(),
        );

        let n_scores = self.rng.gen_range(3..=5);
        record.assessments.recent_scores = (0..n_scores)
            .map(|_| self.one_decimal(scores.0, scores.1))
            .collect();
        record.assessments.assignment_submissions = Some(self.one_decimal(assignments.0, assignments.1));

        let fee_status = match level {
            RiskLevel::High => {
                if self.rng.gen_bool(0.7) {
                    "overdue"
                } else {
                    "pending"
                }
            }
            RiskLevel::Medium => self.choose(&["pending", "paid"]),
            _ => {
                if self.rng.gen_bool(0.9) {
                    "paid"
                } else {
                    "pending"
                }
            }
        };
        record.financial.outstanding_amount = Some(match fee_status {
            "overdue" => self.one_decimal(2000.0, 10000.0),
            "pending" => self.one_decimal(100.0, 2000.0),
            _ => 0.0,
        });
        record.financial.fee_status = Some(fee_status.to_string());

        let (backlogs, course_changes, max_attempts, counseling) = match level {
            RiskLevel::High => (3..=8, 1..=3, 3, 2..=6),
            RiskLevel::Medium => (1..=3, 0..=2, 2, 1..=3),
            _ => (0..=1, 0..=1, 1, 0..=1),
        };
        record.academic_history.backlogs = Some(self.rng.gen_range(backlogs));
        record.academic_history.course_changes = Some(self.rng.gen_range(course_changes));

        let n_subjects = self.rng.gen_range(4..=SUBJECTS.len());
        let subjects: Vec<&str> = SUBJECTS
            .choose_multiple(&mut self.rng, n_subjects)
            .copied()
            .collect();
        record.academic_history.subject_attempts = subjects
            .into_iter()
            .map(|s| (s.to_string(), self.rng.gen_range(1..=max_attempts)))
            .collect::<BTreeMap<_, _>>();

        let (library, activities) = match level {
            RiskLevel::High => ((0.0, 3.0), 0..=1),
            RiskLevel::Medium => ((2.0, 8.0), 0..=2),
            _ => ((5.0, 20.0), 1..=4),
        };
        record.behavioral.library_usage = Some(self.one_decimal(library.0, library.1));
        let n_activities = self.rng.gen_range(activities);
        record.behavioral.extracurricular_participation = ACTIVITIES
            .choose_multiple(&mut self.rng, n_activities)
            .map(|a| a.to_string())
            .collect();
        record.behavioral.counseling_sessions = Some(self.rng.gen_range(counseling));

        let label = match level {
            RiskLevel::Unknown => RiskLevel::Low,
            other => other,
        };
        LabeledRecord::new(record, label.as_str())
    }

    /// Generate `count` records with class shares `[low, medium, high]`.
    ///
    /// Counts are allocated by rounding, with the remainder going to the low class,
    /// and records are shuffled.
    pub fn generate_mix(&mut self, count: usize, mix: [f64; 3]) -> Vec<LabeledRecord> {
        let total: f64 = mix.iter().filter(|w| **w > 0.0).sum();
        let share = |w: f64| {
            if total > 0.0 && w > 0.0 {
                ((w / total) * count as f64).round() as usize
            } else {
                0
            }
        };
        let medium = share(mix[1]).min(count);
        let high = share(mix[2]).min(count - medium);
        let low = count - medium - high;

        let mut levels: Vec<RiskLevel> = [(RiskLevel::Low, low), (RiskLevel::Medium, medium), (RiskLevel::High, high)]
            .into_iter()
            .flat_map(|(level, n)| std::iter::repeat(level).take(n))
            .collect();
        levels.shuffle(&mut self.rng);

        levels.into_iter().map(|level| self.generate(level)).collect()
    }
}
