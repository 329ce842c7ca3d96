//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! Features are standardized and the target centered before fitting, so
//! the model needs no separate bias term: the intercept is the target
//! mean. The dual is solved by cyclic coordinate descent with a
//! soft-threshold step, each weight clipped to `[-c, c]`.
//!
//! The solver holds the full `n × n` kernel matrix, so training sets
//! larger than `max_rows` are refused with `ModelFitError::TooManyRows`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FittedModel, Regressor, check_training_data, normalize_importance};
use crate::budget::Budget;
use crate::error::{ConfigurationError, ModelFitError, Result};
use crate::request::{param_f64, param_usize};

/// Rows used when estimating importance by mean substitution.
const IMPORTANCE_ROWS: usize = 200;

/// 3000 rows keep the kernel matrix near 72 MB per fit.
pub const DEFAULT_MAX_ROWS: usize = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvrParams {
    pub c: f64,
    pub epsilon: f64,
    /// RBF width; `None` means `1 / n_features`.
    pub gamma: Option<f64>,
    pub max_iter: usize,
    pub tol: f64,
    /// Largest training set accepted.
    pub max_rows: usize,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            gamma: None,
            max_iter: 200,
            tol: 1e-4,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl SvrParams {
    pub const NAMES: &'static [&'static str] = &["c", "epsilon", "gamma", "max_iter", "tol", "max_rows"];

    /// Apply one hyperparameter. `Ok(false)` means the name is not ours.
    pub fn set(&mut self, name: &str, value: &Value) -> std::result::Result<bool, ConfigurationError> {
        match name {
            "c" | "C" => self.c = positive(name, value)?,
            "epsilon" => {
                let e = param_f64(name, value)?;
                if e < 0.0 {
                    return Err(ConfigurationError::invalid(name, "must not be negative"));
                }
                self.epsilon = e;
            }
            "gamma" => {
                self.gamma = match value {
                    Value::Null => None,
                    Value::String(s) if s == "auto" || s == "scale" => None,
                    v => Some(positive(name, v)?),
                }
            }
            "max_iter" => self.max_iter = param_usize(name, value)?.max(1),
            "tol" => self.tol = positive(name, value)?,
            "max_rows" => self.max_rows = param_usize(name, value)?.max(2),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn positive(name: &str, value: &Value) -> std::result::Result<f64, ConfigurationError> {
    let v = param_f64(name, value)?;
    if v <= 0.0 {
        return Err(ConfigurationError::invalid(name, "must be positive"));
    }
    Ok(v)
}

#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    fn fit(rows: &[Vec<f64>]) -> Self {
        let p = rows[0].len();
        let n = rows.len() as f64;
        let mut mean = vec![0.0; p];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut scale = vec![0.0; p];
        for row in rows {
            for ((s, x), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (x - m) * (x - m) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }
        Self { mean, scale }
    }

    fn apply(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }
}

fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * d2).exp()
}

#[derive(Debug, Clone)]
pub struct KernelSvr {
    scaler: Scaler,
    gamma: f64,
    intercept: f64,
    support: Vec<(Vec<f64>, f64)>,
    importance: Vec<f64>,
    converged: bool,
}

impl KernelSvr {
    pub fn n_support(&self) -> usize {
        self.support.len()
    }

    /// Whether the last sweep moved every weight by less than `tol`.
    pub fn converged(&self) -> bool {
        self.converged
    }

    fn predict_scaled(&self, z: &[f64]) -> f64 {
        self.intercept
            + self
                .support
                .iter()
                .map(|(sv, beta)| beta * rbf(self.gamma, sv, z))
                .sum::<f64>()
    }
}

impl Regressor for SvrParams {
    type Model = KernelSvr;

    fn fit(&self, rows: &[Vec<f64>], target: &[f64], budget: &Budget) -> Result<KernelSvr> {
        check_training_data(rows, target, 2)?;
        let n = rows.len();
        if n > self.max_rows {
            return Err(ModelFitError::TooManyRows {
                limit: self.max_rows,
                actual: n,
            }
            .into());
        }
        let p = rows[0].len();
        let gamma = self.gamma.unwrap_or(1.0 / p as f64);

        let scaler = Scaler::fit(rows);
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.apply(r)).collect();
        let intercept = target.iter().sum::<f64>() / n as f64;
        let y: Vec<f64> = target.iter().map(|t| t - intercept).collect();

        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let k = rbf(gamma, &scaled[i], &scaled[j]);
                kernel[i * n + j] = k;
                kernel[j * n + i] = k;
            }
        }

        // f = K * beta, kept in sync with every coordinate step.
        let mut beta = vec![0.0; n];
        let mut f = vec![0.0; n];
        let mut converged = false;

        for _ in 0..self.max_iter {
            budget.check("svr")?;
            let mut max_step: f64 = 0.0;
            for i in 0..n {
                let kii = kernel[i * n + i];
                let g = f[i] - y[i];
                let z = beta[i] - g / kii;
                let shrunk = z.signum() * (z.abs() - self.epsilon / kii).max(0.0);
                let updated = shrunk.clamp(-self.c, self.c);
                let step = updated - beta[i];
                if step != 0.0 {
                    let col = &kernel[i * n..(i + 1) * n];
                    for (fj, kij) in f.iter_mut().zip(col) {
                        *fj += step * kij;
                    }
                    beta[i] = updated;
                }
                max_step = max_step.max(step.abs());
            }
            if beta.iter().chain(&f).any(|v| !v.is_finite()) {
                return Err(ModelFitError::DidNotConverge {
                    iterations: self.max_iter,
                }
                .into());
            }
            if max_step < self.tol {
                converged = true;
                break;
            }
        }

        let support: Vec<(Vec<f64>, f64)> = scaled
            .iter()
            .zip(&beta)
            .filter(|(_, b)| **b != 0.0)
            .map(|(row, b)| (row.clone(), *b))
            .collect();

        let mut model = KernelSvr {
            scaler,
            gamma,
            intercept,
            support,
            importance: vec![0.0; p],
            converged,
        };
        model.importance = substitution_importance(&model, &scaled);
        Ok(model)
    }
}

/// Mean absolute change in prediction when one standardized feature is
/// replaced by its mean (0).
fn substitution_importance(model: &KernelSvr, scaled: &[Vec<f64>]) -> Vec<f64> {
    let p = model.scaler.mean.len();
    let sample = &scaled[..scaled.len().min(IMPORTANCE_ROWS)];
    let base: Vec<f64> = sample.iter().map(|z| model.predict_scaled(z)).collect();
    let mut importance = vec![0.0; p];
    for (j, imp) in importance.iter_mut().enumerate() {
        let mut total = 0.0;
        for (z, b) in sample.iter().zip(&base) {
            let mut probe = z.clone();
            probe[j] = 0.0;
            total += (model.predict_scaled(&probe) - b).abs();
        }
        *imp = total / sample.len() as f64;
    }
    normalize_importance(&mut importance);
    importance
}

impl FittedModel for KernelSvr {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.predict_scaled(&self.scaler.apply(row))
    }

    fn importance(&self) -> Vec<f64> {
        self.importance.clone()
    }
}
