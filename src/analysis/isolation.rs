//! Isolation forest scoring for a single series.
//!
//! Each tree isolates points by recursive random cuts between the
//! current minimum and maximum. Points that need few cuts are unusual.
//! A point's score is `2^(-E[h(x)] / c(ψ))`, where `ψ` is the subsample
//! size and `c` the expected path length of an unsuccessful binary
//! search. Scores lie in (0, 1]; values near 1 are anomalous and a
//! series with no spread scores 0.5 everywhere.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

pub const DEFAULT_TREES: usize = 100;
pub const DEFAULT_MAX_SAMPLES: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Cut { threshold: f64, left: Box<Node>, right: Box<Node> },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(sample: Vec<f64>, max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        Self { root: grow(sample, 0, max_depth, rng) }
    }

    fn path_length(&self, x: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path(*size),
                Node::Cut { threshold, left, right } => {
                    node = if x < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

fn grow(sample: Vec<f64>, depth: usize, max_depth: usize, rng: &mut ChaCha8Rng) -> Node {
    let size = sample.len();
    if depth >= max_depth || size <= 1 {
        return Node::Leaf { size };
    }
    let lo = sample.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = sample.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(lo < hi) {
        return Node::Leaf { size };
    }

    // Convex combination, so extreme endpoints cannot overflow.
    let u: f64 = rng.gen_range(0.0..1.0);
    let threshold = lo * (1.0 - u) + hi * u;
    let (left, right): (Vec<f64>, Vec<f64>) = sample.into_iter().partition(|x| *x < threshold);
    if left.is_empty() || right.is_empty() {
        return Node::Leaf { size };
    }

    Node::Cut {
        threshold,
        left: Box::new(grow(left, depth + 1, max_depth, rng)),
        right: Box::new(grow(right, depth + 1, max_depth, rng)),
    }
}

/// Expected path length of an unsuccessful search in a BST of `n` nodes.
pub fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationParams {
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

/// Anomaly score for every value, in input order.
pub fn scores(values: &[f64], params: &IsolationParams) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let psi = params.max_samples.clamp(1, n);
    let max_depth = (psi as f64).log2().ceil() as usize;
    let trees: Vec<IsolationTree> = (0..params.n_trees.max(1) as u64)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i));
            let sample = index::sample(&mut rng, n, psi)
                .into_iter()
                .map(|j| values[j])
                .collect();
            IsolationTree::grow(sample, max_depth, &mut rng)
        })
        .collect();

    let norm = average_path(psi);
    values
        .par_iter()
        .map(|&x| {
            if norm <= 0.0 {
                return 0.5;
            }
            let mean_path =
                trees.iter().map(|t| t.path_length(x)).sum::<f64>() / trees.len() as f64;
            2f64.powf(-mean_path / norm)
        })
        .collect()
}

/// Score cutoff that flags at most `ceil(n × contamination)` points: the
/// first score below that many top scores. Flags are strictly above it,
/// so ties with ordinary points are never flagged.
pub fn contamination_threshold(scores: &[f64], contamination: f64) -> f64 {
    if scores.is_empty() {
        return 1.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let k = (scores.len() as f64 * contamination).ceil() as usize;
    sorted[k.min(scores.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_path() {
        assert_eq!(average_path(1), 0.0);
        assert_eq!(average_path(2), 1.0);
        assert!(average_path(256) > average_path(16));
    }

    #[test]
    fn test_outlier_scores_higher_than_cluster() {
        let mut values: Vec<f64> = (0..200).map(|i| (i as f64 * 0.37).sin()).collect();
        values[120] = 40.0;
        let s = scores(&values, &IsolationParams::default());
        assert_eq!(s.len(), 200);
        let top = (0..s.len()).max_by(|&a, &b| s[a].total_cmp(&s[b]));
        assert_eq!(top, Some(120));
        assert!(s.iter().all(|v| *v > 0.0 && *v <= 1.0));
    }

    #[test]
    fn test_constant_series_scores_one_half() {
        let s = scores(&[2.0; 30], &IsolationParams::default());
        assert!(s.iter().all(|v| (v - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_scores_are_deterministic_for_a_seed() {
        let values: Vec<f64> = (0..80).map(|i| (i as f64 * 1.3).cos() * 3.0).collect();
        let params = IsolationParams::default();
        assert_eq!(scores(&values, &params), scores(&values, &params));
    }

    #[test]
    fn test_extreme_values_stay_finite() {
        let values = [1e308, -1e308, 0.0, 1.0, 2.0];
        let s = scores(&values, &IsolationParams::default());
        assert!(s.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_contamination_threshold_ignores_ties() {
        let s = [0.9, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5];
        let t = contamination_threshold(&s, 0.3);
        assert_eq!(t, 0.5);
        assert_eq!(s.iter().filter(|v| **v > t).count(), 1);
    }
}
