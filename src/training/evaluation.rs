//! Evaluation metrics for the selected model

use crate::error::{PipelineError, Result};
use crate::types::prediction::RiskLevel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of predictions equal to the true label
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// `matrix[true][predicted]` counts
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes && p < n_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}

/// Area under the ROC curve for one binary problem, via the rank-sum statistic
/// with average ranks for tied scores.
fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based; tied block shares the mean rank
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum += order[start..end]
            .iter()
            .filter(|&&i| positive[i])
            .count() as f64
            * mean_rank;
        start = end;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Macro-averaged one-vs-rest ROC-AUC.
///
/// Every class must appear in `y_true` and at least one other class must too.
pub fn roc_auc_ovr(y_true: &[usize], proba: &Array2<f64>) -> Result<f64> {
    let n_classes = proba.ncols();
    let mut total = 0.0;

    for class in 0..n_classes {
        let positive: Vec<bool> = y_true.iter().map(|&y| y == class).collect();
        let scores: Vec<f64> = proba.column(class).to_vec();
        total += binary_auc(&positive, &scores).ok_or_else(|| {
            PipelineError::Numerical(format!(
                "ROC-AUC undefined: class {} is absent from or fills the evaluation set",
                class
            ))
        })?;
    }

    Ok(total / n_classes as f64)
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class and averaged precision/recall/F1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn averaged(label: &str, classes: &[ClassMetrics], weight: impl Fn(&ClassMetrics) -> f64) -> ClassMetrics {
    let total_weight: f64 = classes.iter().map(&weight).sum();
    let mean = |metric: fn(&ClassMetrics) -> f64| {
        if total_weight > 0.0 {
            classes.iter().map(|c| metric(c) * weight(c)).sum::<f64>() / total_weight
        } else {
            0.0
        }
    };
    ClassMetrics {
        label: label.to_string(),
        precision: mean(|c| c.precision),
        recall: mean(|c| c.recall),
        f1_score: mean(|c| c.f1_score),
        support: classes.iter().map(|c| c.support).sum(),
    }
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Self {
        let n_classes = RiskLevel::CLASS_COUNT;
        let matrix = confusion_matrix(y_true, y_pred, n_classes);

        let classes: Vec<ClassMetrics> = (0..n_classes)
            .map(|k| {
                let tp = matrix[k][k];
                let predicted: usize = (0..n_classes).map(|t| matrix[t][k]).sum();
                let support: usize = matrix[k].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: RiskLevel::CLASSES[k].to_string(),
                    precision,
                    recall,
                    f1_score,
                    support,
                }
            })
            .collect();

        let macro_avg = averaged("macro avg", &classes, |_| 1.0);
        let weighted_avg = averaged("weighted avg", &classes, |c| c.support as f64);

        Self {
            accuracy: accuracy(y_true, y_pred),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for c in [&self.macro_avg, &self.weighted_avg] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        Ok(())
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
