//! Regression models evaluated by the pipeline.
//!
//! Submodules:
//! - `registry`: canonical names, aliases and hyperparameter lists.
//! - `tree`: CART regression tree shared by the ensembles.
//! - `forest`: random forest.
//! - `boosting`: gradient boosting.
//! - `kernel`: RBF support vector regression.
//!
//! The variant set is closed. `ModelConfig` dispatches to the concrete
//! `Regressor` and `Fitted` wraps whatever it produced, so callers only
//! see the `FittedModel` contract.

pub mod boosting;
pub mod forest;
pub mod kernel;
pub mod registry;
pub mod tree;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::analysis::stats;
use crate::budget::Budget;
use crate::error::{ConfigurationError, ModelFitError, Result};
use crate::model::{Warning, WarningKind};

pub use boosting::{BoostingParams, GradientBoosting};
pub use forest::{ForestParams, RandomForest};
pub use kernel::{KernelSvr, SvrParams};

// ---------------------------------------------------------------------------
// Capability contract
// ---------------------------------------------------------------------------

/// A hyperparameter set that can be trained into a model.
pub trait Regressor {
    type Model: FittedModel;

    /// Train on row-major `rows` against `target`.
    ///
    /// Degenerate data fails with `ModelFitError`; running out of budget
    /// fails with `TimeoutError`.
    fn fit(&self, rows: &[Vec<f64>], target: &[f64], budget: &Budget) -> Result<Self::Model>;
}

pub trait FittedModel: Send + Sync {
    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// One non-negative weight per feature, summing to 1 unless every
    /// weight is 0.
    fn importance(&self) -> Vec<f64>;
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
    Svr,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        registry::entry_for(self).name
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A model variant with fully resolved hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
    Svr(SvrParams),
}

impl ModelConfig {
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::RandomForest => ModelConfig::RandomForest(ForestParams::default()),
            ModelKind::GradientBoosting => {
                ModelConfig::GradientBoosting(BoostingParams::default())
            }
            ModelKind::Svr => ModelConfig::Svr(SvrParams::default()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelConfig::RandomForest(_) => ModelKind::RandomForest,
            ModelConfig::GradientBoosting(_) => ModelKind::GradientBoosting,
            ModelConfig::Svr(_) => ModelKind::Svr,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Apply one hyperparameter; `Ok(false)` if this variant has no such
    /// parameter.
    pub fn set(&mut self, name: &str, value: &Value) -> std::result::Result<bool, ConfigurationError> {
        match self {
            ModelConfig::RandomForest(p) => p.set(name, value),
            ModelConfig::GradientBoosting(p) => p.set(name, value),
            ModelConfig::Svr(p) => p.set(name, value),
        }
    }

    pub fn fit(&self, rows: &[Vec<f64>], target: &[f64], budget: &Budget) -> Result<Fitted> {
        Ok(match self {
            ModelConfig::RandomForest(p) => Fitted::RandomForest(p.fit(rows, target, budget)?),
            ModelConfig::GradientBoosting(p) => {
                Fitted::GradientBoosting(p.fit(rows, target, budget)?)
            }
            ModelConfig::Svr(p) => Fitted::Svr(p.fit(rows, target, budget)?),
        })
    }
}

#[derive(Debug, Clone)]
pub enum Fitted {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Svr(KernelSvr),
}

impl FittedModel for Fitted {
    fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            Fitted::RandomForest(m) => m.predict_row(row),
            Fitted::GradientBoosting(m) => m.predict_row(row),
            Fitted::Svr(m) => m.predict_row(row),
        }
    }

    fn importance(&self) -> Vec<f64> {
        match self {
            Fitted::RandomForest(m) => m.importance(),
            Fitted::GradientBoosting(m) => m.importance(),
            Fitted::Svr(m) => m.importance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requested models
// ---------------------------------------------------------------------------

/// A model as named in a request, before its name and hyperparameters
/// are checked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelSpec {
    pub name: String,
    pub params: BTreeMap<String, Value>,
}

impl ModelSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Parse the `models` request parameter.
    ///
    /// Accepts `"rf,gb"`, `["rf", "svr"]` or
    /// `[{"name": "rf", "params": {"n_trees": 50}}]`, and mixes of the
    /// last two.
    pub fn parse_list(value: &Value) -> std::result::Result<Vec<ModelSpec>, ConfigurationError> {
        let specs: Vec<ModelSpec> = match value {
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ModelSpec::named)
                .collect(),
            Value::Array(items) => items
                .iter()
                .map(Self::parse_one)
                .collect::<std::result::Result<_, _>>()?,
            _ => {
                return Err(ConfigurationError::invalid(
                    "models",
                    "expected a string or an array of model names or objects",
                ));
            }
        };
        if specs.is_empty() {
            return Err(ConfigurationError::invalid("models", "at least one model is required"));
        }
        Ok(specs)
    }

    fn parse_one(value: &Value) -> std::result::Result<ModelSpec, ConfigurationError> {
        match value {
            Value::String(s) => Ok(ModelSpec::named(s.trim())),
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ConfigurationError::invalid("models", "model object needs a 'name'"))?;
                let params = match map.get("params") {
                    None | Some(Value::Null) => BTreeMap::new(),
                    Some(Value::Object(p)) => p.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    Some(_) => {
                        return Err(ConfigurationError::invalid(
                            "models",
                            format!("'params' of model '{}' must be an object", name),
                        ));
                    }
                };
                Ok(ModelSpec {
                    name: name.to_string(),
                    params,
                })
            }
            _ => Err(ConfigurationError::invalid(
                "models",
                "each model must be a name or an object",
            )),
        }
    }

    /// Look the name up in the registry and apply the hyperparameters.
    ///
    /// Unknown hyperparameters are reported as warnings; unknown model
    /// names and badly typed values are errors.
    pub fn resolve(&self) -> std::result::Result<(ModelConfig, Vec<Warning>), ConfigurationError> {
        let entry = registry::find_model(&self.name)
            .ok_or_else(|| ConfigurationError::UnknownModel(self.name.clone()))?;
        let mut config = ModelConfig::default_for(entry.kind);
        let mut warnings = Vec::new();
        for (name, value) in &self.params {
            if !config.set(name, value)? {
                warnings.push(Warning::new(
                    WarningKind::UnknownParameter,
                    format!(
                        "model '{}' has no hyperparameter '{}'; ignored",
                        entry.name, name
                    ),
                ));
            }
        }
        Ok((config, warnings))
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Reject training data no model can learn from.
pub fn check_training_data(
    rows: &[Vec<f64>],
    target: &[f64],
    min_rows: usize,
) -> std::result::Result<(), ModelFitError> {
    if rows.first().is_some_and(|r| r.is_empty()) {
        return Err(ModelFitError::NoFeatures);
    }
    let n = rows.len().min(target.len());
    if n < min_rows.max(1) {
        return Err(ModelFitError::InsufficientRows {
            required: min_rows.max(1),
            actual: n,
        });
    }
    if stats::std_dev(target).is_none_or(|sd| sd == 0.0 || !sd.is_finite()) {
        return Err(ModelFitError::DegenerateTarget);
    }
    Ok(())
}

/// Scale to sum 1; all-zero input stays zero.
pub(crate) fn normalize_importance(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
}
