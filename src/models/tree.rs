//! CART decision tree shared by the tree-ensemble candidates
//!
//! Classification trees split on Gini impurity and store class distributions in
//! their leaves; regression trees split on squared error and store a single
//! value per leaf (the boosting candidate rewrites those values after fitting).

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// Training targets for a tree
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

impl Targets<'_> {
    fn n_outputs(&self) -> usize {
        match self {
            Targets::Classes { n_classes, .. } => *n_classes,
            Targets::Values(_) => 1,
        }
    }
}

/// Tree growth limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all of them
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Running sufficient statistics of the samples on one side of a split
#[derive(Debug, Clone)]
enum SideStats {
    Counts { counts: Vec<f64>, n: f64 },
    Moments { sum: f64, sum_sq: f64, n: f64 },
}

impl SideStats {
    fn empty(targets: &Targets<'_>) -> Self {
        match targets {
            Targets::Classes { n_classes, .. } => SideStats::Counts {
                counts: vec![0.0; *n_classes],
                n: 0.0,
            },
            Targets::Values(_) => SideStats::Moments {
                sum: 0.0,
                sum_sq: 0.0,
                n: 0.0,
            },
        }
    }

    fn of(targets: &Targets<'_>, samples: &[usize]) -> Self {
        let mut stats = Self::empty(targets);
        for &i in samples {
            stats.add(targets, i, 1.0);
        }
        stats
    }

    fn add(&mut self, targets: &Targets<'_>, sample: usize, sign: f64) {
        match (self, targets) {
            (SideStats::Counts { counts, n }, Targets::Classes { labels, .. }) => {
                counts[labels[sample]] += sign;
                *n += sign;
            }
            (SideStats::Moments { sum, sum_sq, n }, Targets::Values(values)) => {
                let v = values[sample];
                *sum += sign * v;
                *sum_sq += sign * v * v;
                *n += sign;
            }
            _ => unreachable!("side statistics built from the same targets"),
        }
    }

    fn impurity(&self) -> f64 {
        match self {
            SideStats::Counts { counts, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
            }
            SideStats::Moments { sum, sum_sq, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0)
            }
        }
    }

    fn leaf_value(&self) -> Vec<f64> {
        match self {
            SideStats::Counts { counts, n } => {
                if *n <= 0.0 {
                    let k = counts.len() as f64;
                    return vec![1.0 / k; counts.len()];
                }
                counts.iter().map(|c| c / n).collect()
            }
            SideStats::Moments { sum, n, .. } => {
                vec![if *n > 0.0 { sum / n } else { 0.0 }]
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    n_left: usize,
    weighted_impurity: f64,
}

/// Binary decision tree stored as a flat node arena (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    n_outputs: usize,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the given sample indices (duplicates allowed, e.g. bootstrap draws).
    pub fn fit(
        x: &Array2<f64>,
        targets: Targets<'_>,
        samples: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = DecisionTree {
            nodes: Vec::new(),
            n_features: x.ncols(),
            n_outputs: targets.n_outputs(),
            feature_importances: vec![0.0; x.ncols()],
        };

        tree.grow(x, &targets, samples, 0, params, rng);

        let total: f64 = tree.feature_importances.iter().sum();
        if total > 0.0 {
            tree.feature_importances.iter_mut().for_each(|v| *v /= total);
        }
        tree
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        targets: &Targets<'_>,
        samples: &[usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let node_index = self.nodes.len();
        let stats = SideStats::of(targets, samples);
        self.nodes.push(Node::Leaf {
            value: stats.leaf_value(),
        });

        let impurity = stats.impurity();
        if depth >= params.max_depth
            || samples.len() < params.min_samples_split.max(2)
            || impurity <= f64::EPSILON
        {
            return node_index;
        }

        let Some(split) = self.best_split(x, targets, samples, impurity, params, rng) else {
            return node_index;
        };

        let n = samples.len() as f64;
        self.feature_importances[split.feature] += n * impurity - n * split.weighted_impurity;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);
        debug_assert_eq!(left.len(), split.n_left);

        let left_index = self.grow(x, targets, &left, depth + 1, params, rng);
        let right_index = self.grow(x, targets, &right, depth + 1, params, rng);

        self.nodes[node_index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_index,
            right: right_index,
        };
        node_index
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        targets: &Targets<'_>,
        samples: &[usize],
        node_impurity: f64,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        // With a feature budget, visit features in random order and keep looking past
        // the budget until some valid split has been found.
        let (features, budget): (Vec<usize>, usize) = match params.max_features {
            Some(k) if k > 0 && k < n_features => {
                (index::sample(rng, n_features, n_features).into_vec(), k)
            }
            _ => ((0..n_features).collect(), n_features),
        };

        let n = samples.len();
        let min_leaf = params.min_samples_leaf.max(1);
        let total = SideStats::of(targets, samples);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = samples.to_vec();

        for (visited, feature) in features.into_iter().enumerate() {
            if visited >= budget && best.is_some() {
                break;
            }
            sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left = SideStats::empty(targets);
            let mut right = total.clone();

            for pos in 1..n {
                let moved = sorted[pos - 1];
                left.add(targets, moved, 1.0);
                right.add(targets, moved, -1.0);

                let prev = x[[moved, feature]];
                let next = x[[sorted[pos], feature]];
                if !(prev < next) || pos < min_leaf || n - pos < min_leaf {
                    continue;
                }

                let weighted = (pos as f64 * left.impurity()
                    + (n - pos) as f64 * right.impurity())
                    / n as f64;

                let improves = weighted < node_impurity - 1e-12;
                let better = best
                    .as_ref()
                    .map_or(true, |b| weighted < b.weighted_impurity);
                if improves && better {
                    let mut threshold = prev + (next - prev) / 2.0;
                    if threshold >= next {
                        threshold = prev;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        n_left: pos,
                        weighted_impurity: weighted,
                    });
                }
            }
        }

        best
    }

    fn leaf_index(&self, row: ArrayView1<f64>) -> usize {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { .. } => return index,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Leaf value reached by a sample
    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => unreachable!("leaf_index always stops at a leaf"),
        }
    }

    /// Node index of the leaf reached by a sample
    pub fn apply(&self, row: ArrayView1<f64>) -> usize {
        self.leaf_index(row)
    }

    /// Overwrite the value stored in a leaf. Ignored for split nodes.
    pub fn set_leaf_value(&mut self, node: usize, value: Vec<f64>) {
        if let Some(Node::Leaf { value: v }) = self.nodes.get_mut(node) {
            *v = value;
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
            }
        }
        depth_of(&self.nodes, 0)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}
