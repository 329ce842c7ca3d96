//! K-fold cross-validation of the registered models.
//!
//! Folds are contiguous and unshuffled: fold `i` is the `i`-th block of
//! rows and its training set is every other row. Fold sizes differ by at
//! most one. A fold whose training data cannot be fitted is recorded as
//! failed and left out of the aggregate; running out of budget aborts
//! the whole evaluation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::analysis::stats;
use crate::budget::Budget;
use crate::error::{ConfigurationError, PipelineError, Result};
use crate::features::FeatureMatrix;
use crate::logging::{self, Stage};
use crate::models::{FittedModel, ModelConfig};

pub const DEFAULT_FOLDS: usize = 5;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl Metrics {
    /// `None` for empty or mismatched input.
    ///
    /// A constant `actual` has no variance to explain: R² is 1 for a
    /// perfect prediction and 0 otherwise.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }
        let n = actual.len() as f64;
        let mut abs = 0.0;
        let mut ss_res = 0.0;
        for (a, p) in actual.iter().zip(predicted) {
            abs += (a - p).abs();
            ss_res += (a - p) * (a - p);
        }
        let mean = stats::mean(actual)?;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        let mse = ss_res / n;
        Some(Self {
            mae: abs / n,
            mse,
            rmse: mse.sqrt(),
            r2,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    /// Population standard deviation across completed folds.
    pub std_dev: f64,
}

impl MetricSummary {
    fn over(values: &[f64]) -> Self {
        Self {
            mean: stats::mean(values).unwrap_or(f64::NAN),
            std_dev: stats::std_dev(values).unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub mae: MetricSummary,
    pub mse: MetricSummary,
    pub rmse: MetricSummary,
    pub r2: MetricSummary,
    pub completed_folds: usize,
    pub failed_folds: usize,
}

// ---------------------------------------------------------------------------
// Fold results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FoldOutcome {
    Completed { metrics: Metrics },
    Failed { error_kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    #[serde(flatten)]
    pub outcome: FoldOutcome,
}

impl FoldResult {
    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            FoldOutcome::Completed { metrics } => Some(metrics),
            FoldOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model: String,
    pub config: ModelConfig,
    pub folds: Vec<FoldResult>,
    /// `None` when no fold completed.
    pub aggregate: Option<AggregateMetrics>,
    /// Mean importance over completed folds, keyed by feature name.
    pub feature_importance: BTreeMap<String, f64>,
}

impl ModelEvaluation {
    pub fn failed_folds(&self) -> usize {
        self.folds.iter().filter(|f| f.metrics().is_none()).count()
    }

    pub fn mean_r2(&self) -> Option<f64> {
        self.aggregate.as_ref().map(|a| a.r2.mean)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub folds: usize,
    pub evaluations: Vec<ModelEvaluation>,
    /// Highest mean R²; ties go to the earlier model.
    pub best_model: Option<String>,
}

impl ModelComparison {
    pub fn best(&self) -> Option<&ModelEvaluation> {
        let name = self.best_model.as_deref()?;
        self.evaluations.iter().find(|e| e.model == name)
    }
}

// ---------------------------------------------------------------------------
// Cross-validation
// ---------------------------------------------------------------------------

/// Contiguous fold ranges over `n_rows`.
pub fn fold_ranges(n_rows: usize, k: usize) -> std::result::Result<Vec<Range<usize>>, ConfigurationError> {
    if k < 2 {
        return Err(ConfigurationError::invalid("folds", "at least 2 folds are required"));
    }
    if k > n_rows {
        return Err(ConfigurationError::invalid(
            "folds",
            format!("{} folds need at least {} rows, only {} available", k, k, n_rows),
        ));
    }
    let base = n_rows / k;
    let extra = n_rows % k;
    let mut ranges = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    Ok(ranges)
}

/// Cross-validate one model on `matrix` against `target`.
pub fn evaluate(
    matrix: &FeatureMatrix,
    target: &[f64],
    model: &ModelConfig,
    k: usize,
    budget: &Budget,
) -> Result<ModelEvaluation> {
    if target.len() != matrix.n_rows() {
        return Err(ConfigurationError::invalid(
            "target",
            format!("{} targets for {} feature rows", target.len(), matrix.n_rows()),
        )
        .into());
    }
    let ranges = fold_ranges(matrix.n_rows(), k)?;
    let rows = matrix.rows();
    let name = model.name();

    let folds = ranges
        .into_par_iter()
        .enumerate()
        .map(|(i, test)| run_fold(i, test, &rows, target, model, budget))
        .collect::<Result<Vec<_>>>()?;

    let completed: Vec<&Metrics> = folds.iter().filter_map(|(f, _)| f.metrics()).collect();
    let failed = folds.len() - completed.len();
    logging::log_fold_summary(name, folds.len(), completed.len(), failed);

    let aggregate = (!completed.is_empty()).then(|| {
        let pick = |f: fn(&Metrics) -> f64| completed.iter().map(|m| f(m)).collect::<Vec<_>>();
        AggregateMetrics {
            mae: MetricSummary::over(&pick(|m| m.mae)),
            mse: MetricSummary::over(&pick(|m| m.mse)),
            rmse: MetricSummary::over(&pick(|m| m.rmse)),
            r2: MetricSummary::over(&pick(|m| m.r2)),
            completed_folds: completed.len(),
            failed_folds: failed,
        }
    });

    let mut feature_importance = BTreeMap::new();
    let importances: Vec<&Vec<f64>> = folds.iter().filter_map(|(_, imp)| imp.as_ref()).collect();
    if !importances.is_empty() {
        for (j, feature) in matrix.names().into_iter().enumerate() {
            let total: f64 = importances.iter().map(|imp| imp[j]).sum();
            feature_importance.insert(feature.to_string(), total / importances.len() as f64);
        }
    }

    Ok(ModelEvaluation {
        model: name.to_string(),
        config: model.clone(),
        folds: folds.into_iter().map(|(f, _)| f).collect(),
        aggregate,
        feature_importance,
    })
}

fn run_fold(
    fold: usize,
    test: Range<usize>,
    rows: &[Vec<f64>],
    target: &[f64],
    model: &ModelConfig,
    budget: &Budget,
) -> Result<(FoldResult, Option<Vec<f64>>)> {
    budget.check(&format!("{} fold {}", model.name(), fold))?;

    let mut train_rows = Vec::with_capacity(rows.len() - test.len());
    let mut train_target = Vec::with_capacity(rows.len() - test.len());
    for (i, (row, y)) in rows.iter().zip(target).enumerate() {
        if !test.contains(&i) {
            train_rows.push(row.clone());
            train_target.push(*y);
        }
    }

    let result = |outcome| FoldResult {
        fold,
        train_rows: train_rows.len(),
        test_rows: test.len(),
        outcome,
    };

    match model.fit(&train_rows, &train_target, budget) {
        Ok(fitted) => {
            let predicted = fitted.predict(&rows[test.clone()]);
            match Metrics::compute(&target[test.clone()], &predicted) {
                Some(metrics) => Ok((
                    result(FoldOutcome::Completed { metrics }),
                    Some(fitted.importance()),
                )),
                None => Ok((
                    result(FoldOutcome::Failed {
                        error_kind: "model_fit_error".to_string(),
                        message: "fold produced no predictions".to_string(),
                    }),
                    None,
                )),
            }
        }
        Err(PipelineError::ModelFit(err)) => {
            logging::log_fold_failure(model.name(), fold, &err);
            let failed = FoldOutcome::Failed {
                error_kind: PipelineError::ModelFit(err.clone()).kind().to_string(),
                message: err.to_string(),
            };
            Ok((result(failed), None))
        }
        Err(other) => Err(other),
    }
}

/// Cross-validate several models in parallel and name the best by mean R².
pub fn compare_models(
    matrix: &FeatureMatrix,
    target: &[f64],
    models: &[ModelConfig],
    k: usize,
    budget: &Budget,
) -> Result<ModelComparison> {
    let evaluations = models
        .par_iter()
        .map(|m| evaluate(matrix, target, m, k, budget))
        .collect::<Result<Vec<_>>>()?;

    let mut best: Option<(&str, f64)> = None;
    for evaluation in &evaluations {
        if let Some(r2) = evaluation.mean_r2().filter(|r| r.is_finite()) {
            if best.is_none_or(|(_, b)| r2 > b) {
                best = Some((evaluation.model.as_str(), r2));
            }
        }
    }
    if let Some((name, r2)) = best {
        logging::info(
            Stage::Evaluate,
            None,
            &format!("best model {} (mean R² {:.4})", name, r2),
        );
    }
    let best_model = best.map(|(name, _)| name.to_string());

    Ok(ModelComparison {
        folds: k,
        evaluations,
        best_model,
    })
}
