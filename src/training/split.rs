//! Stratified hold-out split and stratified k-fold assignment

use crate::error::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Row indices of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

fn indices_by_class(labels: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut by_class = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }
    by_class
}

/// Split rows so that each class keeps its proportion in both parts.
///
/// Every class must have at least two members; each class sends
/// `round(n_c * test_fraction)` rows (clamped to `1..n_c`) to the test side.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidTrainingData(format!(
            "test fraction must lie in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = TrainTestSplit {
        train: Vec::new(),
        test: Vec::new(),
    };

    for (class, mut members) in indices_by_class(labels, n_classes).into_iter().enumerate() {
        if members.len() < 2 {
            return Err(PipelineError::InsufficientData(format!(
                "class {} has {} record(s); stratified splitting needs at least 2 per class",
                class,
                members.len()
            )));
        }

        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize)
            .clamp(1, members.len() - 1);
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

/// Assign rows to `k` folds, dealing each class round-robin after a seeded shuffle.
///
/// Fails when no class has at least `k` members.
pub fn stratified_k_fold(
    labels: &[usize],
    n_classes: usize,
    k: usize,
    seed: u64,
) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(PipelineError::InvalidTrainingData(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }

    let by_class = indices_by_class(labels, n_classes);
    let largest = by_class.iter().map(Vec::len).max().unwrap_or(0);
    if largest < k {
        return Err(PipelineError::InsufficientData(format!(
            "{}-fold cross-validation needs a class with at least {} training records, largest has {}",
            k, k, largest
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];
    for mut members in by_class {
        members.shuffle(&mut rng);
        for (position, row) in members.into_iter().enumerate() {
            fold_of[row] = position % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&row| fold_of[row] == fold);
            Fold { train, validation }
        })
        .collect())
}
