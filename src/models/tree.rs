//! CART regression tree used by the forest and boosting models.
//!
//! Splits minimize the summed squared error of the two children. The
//! reduction each split achieves is credited to its feature, which is
//! where the ensembles' impurity importances come from.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all of them.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
    importance: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl RegressionTree {
    /// Grow a tree on the rows named by `indices`. Repeated indices (a
    /// bootstrap sample) are weighted by their multiplicity.
    pub fn fit(
        rows: &[Vec<f64>],
        target: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut builder = Builder {
            rows,
            target,
            params,
            importance: vec![0.0; n_features],
            rng,
        };
        let root = builder.grow(indices.to_vec(), 0);
        let importance = builder.importance;
        Self { root, importance }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Unnormalized squared-error reduction per feature.
    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        depth(&self.root)
    }
}

struct Builder<'a, 'r> {
    rows: &'a [Vec<f64>],
    target: &'a [f64],
    params: &'a TreeParams,
    importance: Vec<f64>,
    rng: &'r mut ChaCha8Rng,
}

impl Builder<'_, '_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> Node {
        let n = indices.len();
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, q), &i| {
            let y = self.target[i];
            (s + y, q + y * y)
        });
        let mean = if n > 0 { sum / n as f64 } else { 0.0 };
        let sse = (sum_sq - sum * sum / n.max(1) as f64).max(0.0);
        let leaf_size = self.params.min_samples_leaf.max(1);

        if depth >= self.params.max_depth || n < 2 * leaf_size || sse <= 1e-12 * n as f64 {
            return Node::Leaf { value: mean };
        }

        match self.best_split(&indices, sse, leaf_size) {
            Some(split) => {
                self.importance[split.feature] += split.gain;
                let left = self.grow(split.left, depth + 1);
                let right = self.grow(split.right, depth + 1);
                Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => Node::Leaf { value: mean },
        }
    }

    fn best_split(&mut self, indices: &[usize], parent_sse: f64, leaf_size: usize) -> Option<Split> {
        let n_features = self.importance.len();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(m) = self.params.max_features.filter(|&m| m > 0 && m < n_features) {
            features.shuffle(&mut *self.rng);
            features.truncate(m);
            features.sort_unstable();
        }

        let n = indices.len();
        let mut best: Option<(usize, f64, f64, Vec<usize>, usize)> = None;

        for feature in features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let total: f64 = sorted.iter().map(|&i| self.target[i]).sum();
            let total_sq: f64 = sorted.iter().map(|&i| self.target[i] * self.target[i]).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 1..n {
                let y = self.target[sorted[k - 1]];
                left_sum += y;
                left_sq += y * y;
                if k < leaf_size || n - k < leaf_size {
                    continue;
                }
                let lo = self.rows[sorted[k - 1]][feature];
                let hi = self.rows[sorted[k]][feature];
                if lo >= hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / k as f64;
                let right_sse = right_sq - right_sum * right_sum / (n - k) as f64;
                let gain = parent_sse - left_sse - right_sse;
                if gain > best.as_ref().map_or(1e-12, |b| b.2) {
                    let mid = lo / 2.0 + hi / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some((feature, threshold, gain, sorted.clone(), k));
                }
            }
        }

        best.map(|(feature, threshold, gain, mut sorted, k)| {
            let right = sorted.split_off(k);
            Split {
                feature,
                threshold,
                gain,
                left: sorted,
                right,
            }
        })
    }
}
