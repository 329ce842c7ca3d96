//! Bagged regression trees.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tree::{RegressionTree, TreeParams};
use super::{FittedModel, Regressor, check_training_data, normalize_importance};
use crate::budget::Budget;
use crate::error::{ConfigurationError, Result};
use crate::request::{param_u64, param_usize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
    /// Tree `i` bootstraps with `seed + i`.
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub const NAMES: &'static [&'static str] =
        &["n_trees", "max_depth", "min_samples_leaf", "max_features", "seed"];

    /// Apply one hyperparameter. `Ok(false)` means the name is not ours.
    pub fn set(&mut self, name: &str, value: &Value) -> std::result::Result<bool, ConfigurationError> {
        match name {
            "n_trees" | "n_estimators" => {
                self.n_trees = param_usize(name, value)?;
                if self.n_trees == 0 {
                    return Err(ConfigurationError::invalid(name, "must be at least 1"));
                }
            }
            "max_depth" => self.max_depth = param_usize(name, value)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize(name, value)?.max(1),
            "max_features" => {
                self.max_features = match value {
                    Value::Null => None,
                    v => Some(param_usize(name, v)?),
                }
            }
            "seed" | "random_state" => self.seed = param_u64(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

impl Regressor for ForestParams {
    type Model = RandomForest;

    fn fit(&self, rows: &[Vec<f64>], target: &[f64], budget: &Budget) -> Result<RandomForest> {
        check_training_data(rows, target, 2 * self.min_samples_leaf.max(1))?;
        let n = rows.len();
        let tree_params = self.tree_params();

        let trees = (0..self.n_trees)
            .into_par_iter()
            .map(|i| -> Result<RegressionTree> {
                budget.check("random_forest")?;
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                Ok(RegressionTree::fit(rows, target, &sample, &tree_params, &mut rng))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut importance = vec![0.0; rows[0].len()];
        for tree in &trees {
            for (total, imp) in importance.iter_mut().zip(tree.importance()) {
                *total += imp;
            }
        }
        normalize_importance(&mut importance);

        Ok(RandomForest { trees, importance })
    }
}

impl FittedModel for RandomForest {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        sum / self.trees.len() as f64
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
        let rows: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![i as f64 / 10.0, ((i * 7) % 13) as f64])
            .collect();
        let target = rows.iter().map(|r| 3.0 * r[0] + 1.0).collect();
        (rows, target)
    }

    fn small() -> ForestParams {
        ForestParams {
            n_trees: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_forest_learns_dominant_feature() {
        let (rows, target) = data();
        let model = small().fit(&rows, &target, &Budget::unlimited()).unwrap();
        let imp = model.importance();
        assert!(imp[0] > imp[1]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let pred = model.predict_row(&[4.0, 0.0]);
        assert!((pred - 13.0).abs() < 1.5, "prediction {}", pred);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (rows, target) = data();
        let a = small().fit(&rows, &target, &Budget::unlimited()).unwrap();
        let b = small().fit(&rows, &target, &Budget::unlimited()).unwrap();
        assert_eq!(a.predict(&rows), b.predict(&rows));
    }

    #[test]
    fn test_constant_target_is_degenerate() {
        let (rows, _) = data();
        let target = vec![2.0; rows.len()];
        let err = small().fit(&rows, &target, &Budget::unlimited()).unwrap_err();
        assert_eq!(err, PipelineError::ModelFit(ModelFitError::DegenerateTarget));
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut p = ForestParams::default();
        assert!(p.set("n_trees", &Value::from("many")).is_err());
        assert!(p.set("n_trees", &Value::from(0)).is_err());
        assert_eq!(p.set("colour", &Value::from(1)), Ok(false));
        assert_eq!(p.set("max_depth", &Value::from(4)), Ok(true));
        assert_eq!(p.max_depth, 4);
    }
}
