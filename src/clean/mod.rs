//! Cleaning: outlier handling followed by imputation.
//!
//! Submodules:
//! - `outliers`: IQR / z-score rules and the impute-or-drop action.
//! - `impute`: mean, median, forward-fill and linear interpolation.
//!
//! The output `CleanedSeries` guarantees that every value is finite.

pub mod impute;
pub mod outliers;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ImputationError;
use crate::logging::{self, Stage};
use crate::validate::ValidatedDataset;

pub use impute::ImputationPolicy;
pub use outliers::{OutlierAction, OutlierBounds, OutlierMethod, OutlierPolicy};

/// Name used for the single value column in errors and reports.
pub const VALUE_COLUMN: &str = "value";

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// What the cleaner did, kept for reproducibility in the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_points: usize,
    pub output_points: usize,
    /// Missing markers and non-finite values in the input.
    pub missing: usize,
    pub outliers: usize,
    pub dropped: usize,
    pub imputed: usize,
    pub outlier_bounds: Option<OutlierBounds>,
    pub outlier_policy: OutlierPolicy,
    pub imputation_policy: ImputationPolicy,
}

/// A gap-free, finite series derived from a validated dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    imputed: Vec<bool>,
}

impl CleanedSeries {
    /// Build a series from values that are already clean.
    ///
    /// Returns `None` if the lengths differ or any value is non-finite.
    pub fn from_finite(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Option<Self> {
        if timestamps.len() != values.len() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let imputed = vec![false; values.len()];
        Some(Self {
            timestamps,
            values,
            imputed,
        })
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `true` at positions whose value came from the imputation policy.
    pub fn imputed(&self) -> &[bool] {
        &self.imputed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same timestamps, new values. Used after normalization.
    pub fn with_values(&self, values: Vec<f64>) -> Option<Self> {
        let mut series = Self::from_finite(self.timestamps.clone(), values)?;
        series.imputed = self.imputed.clone();
        Some(series)
    }
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Apply the outlier policy, then resolve every missing or outlier slot
/// with the imputation policy.
pub fn clean(
    dataset: &ValidatedDataset<'_>,
    outlier_policy: &OutlierPolicy,
    imputation_policy: ImputationPolicy,
) -> Result<(CleanedSeries, CleaningReport), ImputationError> {
    let mut timestamps = dataset.timestamps();
    let mut values: Vec<Option<f64>> = dataset.points().iter().map(|p| p.finite_value()).collect();
    let missing = values.iter().filter(|v| v.is_none()).count();

    let known: Vec<f64> = values.iter().flatten().copied().collect();
    let bounds = outliers::bounds(&known, outlier_policy);
    let marks = outliers::mark(&values, bounds);
    let outlier_count = marks.iter().filter(|m| **m).count();

    let mut dropped = 0;
    match outlier_policy.action {
        OutlierAction::Impute => {
            for (slot, marked) in values.iter_mut().zip(&marks) {
                if *marked {
                    *slot = None;
                }
            }
        }
        OutlierAction::Drop => {
            let keep: Vec<bool> = marks.iter().map(|m| !m).collect();
            dropped = outlier_count;
            timestamps = retain_by(&timestamps, &keep);
            values = retain_by(&values, &keep);
        }
    }

    let imputed: Vec<bool> = values.iter().map(|v| v.is_none()).collect();
    let filled = impute::impute(&values, &timestamps, imputation_policy, VALUE_COLUMN)?;
    let imputed_count = imputed.iter().filter(|i| **i).count();

    logging::debug(
        Stage::Clean,
        Some(dataset.source()),
        &format!(
            "{} missing, {} outliers ({} dropped), {} imputed with {}",
            missing, outlier_count, dropped, imputed_count, imputation_policy
        ),
    );

    let report = CleaningReport {
        input_points: dataset.len(),
        output_points: filled.len(),
        missing,
        outliers: outlier_count,
        dropped,
        imputed: imputed_count,
        outlier_bounds: bounds,
        outlier_policy: outlier_policy.clone(),
        imputation_policy,
    };

    let series = CleanedSeries {
        timestamps,
        values: filled,
        imputed,
    };
    Ok((series, report))
}

fn retain_by<T: Clone>(items: &[T], keep: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(item, _)| item.clone())
        .collect()
}
