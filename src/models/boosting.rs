//! Gradient boosting with squared loss.
//!
//! Starts from the target mean; each round fits a shallow tree to the
//! current residuals and adds it with shrinkage `learning_rate`.

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tree::{RegressionTree, TreeParams};
use super::{FittedModel, Regressor, check_training_data, normalize_importance};
use crate::budget::Budget;
use crate::error::{ConfigurationError, Result};
use crate::request::{param_f64, param_u64, param_usize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn without replacement for each round.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub const NAMES: &'static [&'static str] = &[
        "n_estimators",
        "learning_rate",
        "max_depth",
        "min_samples_leaf",
        "subsample",
        "seed",
    ];

    /// Apply one hyperparameter. `Ok(false)` means the name is not ours.
    pub fn set(&mut self, name: &str, value: &Value) -> std::result::Result<bool, ConfigurationError> {
        match name {
            "n_estimators" => {
                self.n_estimators = param_usize(name, value)?;
                if self.n_estimators == 0 {
                    return Err(ConfigurationError::invalid(name, "must be at least 1"));
                }
            }
            "learning_rate" => {
                let lr = param_f64(name, value)?;
                if lr <= 0.0 || lr > 1.0 {
                    return Err(ConfigurationError::invalid(name, "must be in (0, 1]"));
                }
                self.learning_rate = lr;
            }
            "max_depth" => self.max_depth = param_usize(name, value)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize(name, value)?.max(1),
            "subsample" => {
                let s = param_f64(name, value)?;
                if s <= 0.0 || s > 1.0 {
                    return Err(ConfigurationError::invalid(name, "must be in (0, 1]"));
                }
                self.subsample = s;
            }
            "seed" | "random_state" => self.seed = param_u64(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

impl Regressor for BoostingParams {
    type Model = GradientBoosting;

    fn fit(&self, rows: &[Vec<f64>], target: &[f64], budget: &Budget) -> Result<GradientBoosting> {
        check_training_data(rows, target, 2 * self.min_samples_leaf.max(1))?;
        let n = rows.len();
        let init = target.iter().sum::<f64>() / n as f64;
        let tree_params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
        };
        let sample_size = ((n as f64 * self.subsample).round() as usize).clamp(1, n);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut prediction = vec![init; n];
        let mut trees = Vec::with_capacity(self.n_estimators);
        let mut importance = vec![0.0; rows[0].len()];
        let all: Vec<usize> = (0..n).collect();

        for _ in 0..self.n_estimators {
            budget.check("gradient_boosting")?;
            let residual: Vec<f64> = target.iter().zip(&prediction).map(|(y, p)| y - p).collect();
            let sample = if sample_size < n {
                let mut picked = index::sample(&mut rng, n, sample_size).into_vec();
                picked.sort_unstable();
                picked
            } else {
                all.clone()
            };

            let tree = RegressionTree::fit(rows, &residual, &sample, &tree_params, &mut rng);
            for (p, row) in prediction.iter_mut().zip(rows) {
                *p += self.learning_rate * tree.predict_row(row);
            }
            for (total, imp) in importance.iter_mut().zip(tree.importance()) {
                *total += imp;
            }
            trees.push(tree);
        }
        normalize_importance(&mut importance);

        Ok(GradientBoosting {
            init,
            learning_rate: self.learning_rate,
            trees,
            importance,
        })
    }
}

impl FittedModel for GradientBoosting {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_row(row))
                .sum::<f64>()
    }

    fn importance(&self) -> Vec<f64> {
        self.importance.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelFitError, PipelineError};

    fn data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 12) as f64, (i / 12) as f64]).collect();
        let target = rows.iter().map(|r| if r[0] < 6.0 { -2.0 } else { 2.0 }).collect();
        (rows, target)
    }

    #[test]
    fn test_boosting_fits_step_target() {
        let (rows, target) = data();
        let model = BoostingParams::default()
            .fit(&rows, &target, &Budget::unlimited())
            .unwrap();
        assert!((model.predict_row(&[1.0, 0.0]) + 2.0).abs() < 0.01);
        assert!((model.predict_row(&[9.0, 0.0]) - 2.0).abs() < 0.01);
        let imp = model.importance();
        assert!(imp[0] > 0.99);
    }

    #[test]
    fn test_subsampling_is_reproducible() {
        let (rows, target) = data();
        let params = BoostingParams {
            subsample: 0.5,
            n_estimators: 20,
            ..BoostingParams::default()
        };
        let a = params.fit(&rows, &target, &Budget::unlimited()).unwrap();
        let b = params.fit(&rows, &target, &Budget::unlimited()).unwrap();
        assert_eq!(a.predict(&rows), b.predict(&rows));
    }

    #[test]
    fn test_too_few_rows() {
        let rows = vec![vec![1.0]];
        let err = BoostingParams::default()
            .fit(&rows, &[1.0], &Budget::unlimited())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelFit(ModelFitError::InsufficientRows { .. })
        ));
    }

    #[test]
    fn test_learning_rate_bounds() {
        let mut p = BoostingParams::default();
        assert!(p.set("learning_rate", &Value::from(0.0)).is_err());
        assert!(p.set("learning_rate", &Value::from(0.3)).unwrap());
        assert_eq!(p.learning_rate, 0.3);
    }
}
