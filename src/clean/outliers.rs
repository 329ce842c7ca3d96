//! Outlier rules applied before imputation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierMethod {
    /// Outside `[Q1 - k·IQR, Q3 + k·IQR]`.
    Iqr,
    /// `|x - mean| / std_dev` above a threshold.
    ZScore,
    None,
}

impl FromStr for OutlierMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "z-score" | "zscore" | "z_score" => Ok(OutlierMethod::ZScore),
            "none" | "off" => Ok(OutlierMethod::None),
            other => Err(format!("unknown outlier method '{}'", other)),
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMethod::Iqr => write!(f, "iqr"),
            OutlierMethod::ZScore => write!(f, "z-score"),
            OutlierMethod::None => write!(f, "none"),
        }
    }
}

/// What happens to a point once it is marked as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierAction {
    /// Treat it as a missing slot and let the imputation policy fill it.
    Impute,
    /// Remove the point from the series.
    Drop,
}

impl FromStr for OutlierAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "impute" => Ok(OutlierAction::Impute),
            "drop" => Ok(OutlierAction::Drop),
            other => Err(format!("unknown outlier action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierPolicy {
    pub method: OutlierMethod,
    pub iqr_k: f64,
    pub zscore_threshold: f64,
    pub action: OutlierAction,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            method: OutlierMethod::Iqr,
            iqr_k: 1.5,
            zscore_threshold: 3.0,
            action: OutlierAction::Impute,
        }
    }
}

impl OutlierPolicy {
    pub fn disabled() -> Self {
        Self {
            method: OutlierMethod::None,
            ..Self::default()
        }
    }
}

/// Acceptance interval computed from the known values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Compute the acceptance interval for `known` under `policy`.
///
/// Returns `None` when the method is disabled or there is nothing to
/// compute bounds from.
pub fn bounds(known: &[f64], policy: &OutlierPolicy) -> Option<OutlierBounds> {
    match policy.method {
        OutlierMethod::None => None,
        OutlierMethod::Iqr => {
            let (q1, q3) = stats::quartiles(known)?;
            // Halved arithmetic keeps the fences finite near f64::MAX.
            let half_iqr = q3 * 0.5 - q1 * 0.5;
            let reach = policy.iqr_k * half_iqr * 2.0;
            Some(OutlierBounds {
                lower: q1 - reach,
                upper: q3 + reach,
            })
        }
        OutlierMethod::ZScore => {
            let mean = stats::mean(known)?;
            let sd = stats::std_dev(known)?;
            let reach = policy.zscore_threshold * sd;
            Some(OutlierBounds {
                lower: mean - reach,
                upper: mean + reach,
            })
        }
    }
}

/// Mark each known value outside the bounds. Missing slots are never
/// marked.
pub fn mark(values: &[Option<f64>], bounds: Option<OutlierBounds>) -> Vec<bool> {
    match bounds {
        None => vec![false; values.len()],
        Some(b) => values
            .iter()
            .map(|v| v.is_some_and(|x| !b.contains(x)))
            .collect(),
    }
}
