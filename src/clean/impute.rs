//! Imputation policies for missing and outlier-marked slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::stats;
use crate::error::ImputationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImputationPolicy {
    Mean,
    Median,
    /// Carry the last known value forward. Leading gaps take the first
    /// known value.
    ForwardFill,
    /// Interpolate on the time axis between the surrounding known values.
    /// Leading and trailing gaps take the nearest known value.
    LinearInterpolate,
}

impl FromStr for ImputationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(ImputationPolicy::Mean),
            "median" => Ok(ImputationPolicy::Median),
            "forward-fill" | "ffill" | "forward_fill" => Ok(ImputationPolicy::ForwardFill),
            "linear-interpolate" | "linear" | "interpolate" | "linear_interpolate" => {
                Ok(ImputationPolicy::LinearInterpolate)
            }
            other => Err(format!("unknown imputation policy '{}'", other)),
        }
    }
}

impl fmt::Display for ImputationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputationPolicy::Mean => write!(f, "mean"),
            ImputationPolicy::Median => write!(f, "median"),
            ImputationPolicy::ForwardFill => write!(f, "forward-fill"),
            ImputationPolicy::LinearInterpolate => write!(f, "linear-interpolate"),
        }
    }
}

/// Resolve every `None` slot in `values`.
///
/// `timestamps` must be the same length as `values` and strictly
/// increasing; it is only consulted by `LinearInterpolate`.
pub fn impute(
    values: &[Option<f64>],
    timestamps: &[DateTime<Utc>],
    policy: ImputationPolicy,
    column: &str,
) -> Result<Vec<f64>, ImputationError> {
    let known: Vec<f64> = values.iter().flatten().copied().collect();
    if known.is_empty() {
        return Err(ImputationError::UnimputableColumn {
            column: column.to_string(),
        });
    }

    let filled = match policy {
        ImputationPolicy::Mean => fill_constant(values, stats::mean(&known)),
        ImputationPolicy::Median => fill_constant(values, stats::median(&known)),
        ImputationPolicy::ForwardFill => forward_fill(values, known[0]),
        ImputationPolicy::LinearInterpolate => interpolate(values, timestamps),
    };

    match filled.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ImputationError::NonFiniteResult { index }),
        None => Ok(filled),
    }
}

fn fill_constant(values: &[Option<f64>], fill: Option<f64>) -> Vec<f64> {
    let fill = fill.unwrap_or(f64::NAN);
    values.iter().map(|v| v.unwrap_or(fill)).collect()
}

fn forward_fill(values: &[Option<f64>], first_known: f64) -> Vec<f64> {
    let mut last = first_known;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v {
                last = *x;
            }
            last
        })
        .collect()
}

fn interpolate(values: &[Option<f64>], timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    let anchors: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();

    let mut out = Vec::with_capacity(values.len());
    let mut next_anchor: usize = 0;
    for (i, v) in values.iter().enumerate() {
        if let Some(x) = v {
            out.push(*x);
            next_anchor += 1;
            continue;
        }
        let before = next_anchor.checked_sub(1).map(|a| anchors[a]);
        let after = anchors.get(next_anchor).copied();
        let filled = match (before, after) {
            (Some(b), Some(a)) => {
                let span = (timestamps[a] - timestamps[b]).num_milliseconds() as f64;
                let offset = (timestamps[i] - timestamps[b]).num_milliseconds() as f64;
                let t = if span > 0.0 { offset / span } else { 0.5 };
                let (vb, va) = (values[b].unwrap_or_default(), values[a].unwrap_or_default());
                // Convex combination, so huge endpoints cannot overflow.
                vb * (1.0 - t) + va * t
            }
            (Some(b), None) => values[b].unwrap_or_default(),
            (None, Some(a)) => values[a].unwrap_or_default(),
            (None, None) => f64::NAN,
        };
        out.push(filled);
    }
    out
}
