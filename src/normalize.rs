//! Rescaling of cleaned series.
//!
//! Every method keeps its fitted parameters so predictions made in the
//! normalized space can be mapped back with `denormalize`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysis::stats;
use crate::model::{Warning, WarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizeMethod {
    /// Map onto `[0, 1]`.
    MinMax,
    /// Zero mean, unit population variance.
    ZScore,
    /// Center on the median, scale by the IQR.
    Robust,
    /// Leave values untouched.
    None,
}

impl FromStr for NormalizeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min-max" | "minmax" | "min_max" => Ok(NormalizeMethod::MinMax),
            "z-score" | "zscore" | "z_score" | "standard" => Ok(NormalizeMethod::ZScore),
            "robust" => Ok(NormalizeMethod::Robust),
            "none" => Ok(NormalizeMethod::None),
            other => Err(format!("unknown normalization method '{}'", other)),
        }
    }
}

impl fmt::Display for NormalizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeMethod::MinMax => write!(f, "min-max"),
            NormalizeMethod::ZScore => write!(f, "z-score"),
            NormalizeMethod::Robust => write!(f, "robust"),
            NormalizeMethod::None => write!(f, "none"),
        }
    }
}

/// Fitted parameters, tagged by method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum ScalingParams {
    MinMax { min: f64, max: f64 },
    ZScore { mean: f64, std_dev: f64 },
    Robust { median: f64, iqr: f64 },
    Identity,
}

impl ScalingParams {
    /// Map one normalized value back to the original scale.
    ///
    /// For a constant series every normalized value maps back to the
    /// constant.
    pub fn denormalize_value(&self, x: f64) -> f64 {
        match *self {
            ScalingParams::MinMax { min, max } => {
                if max > min {
                    // Halved span keeps this finite across the full f64 range.
                    min + x * (max * 0.5 - min * 0.5) * 2.0
                } else {
                    min
                }
            }
            ScalingParams::ZScore { mean, std_dev } => mean + x * std_dev,
            ScalingParams::Robust { median, iqr } => median + x * iqr,
            ScalingParams::Identity => x,
        }
    }

    pub fn denormalize(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&x| self.denormalize_value(x)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub values: Vec<f64>,
    pub params: ScalingParams,
    /// The input had no spread; all outputs are 0.
    pub constant: bool,
}

impl NormalizedSeries {
    pub fn denormalize(&self, values: &[f64]) -> Vec<f64> {
        self.params.denormalize(values)
    }

    /// The `ConstantSeries` warning, if the input had no spread.
    pub fn warning(&self) -> Option<Warning> {
        self.constant.then(|| {
            Warning::new(
                WarningKind::ConstantSeries,
                "series has no spread; normalized values set to 0",
            )
        })
    }
}

/// Rescale `values` with `method`.
///
/// An empty input yields an empty output with identity parameters.
pub fn normalize(values: &[f64], method: NormalizeMethod) -> NormalizedSeries {
    if values.is_empty() {
        return NormalizedSeries {
            values: Vec::new(),
            params: ScalingParams::Identity,
            constant: false,
        };
    }

    match method {
        NormalizeMethod::None => NormalizedSeries {
            values: values.to_vec(),
            params: ScalingParams::Identity,
            constant: false,
        },
        NormalizeMethod::MinMax => {
            let min = stats::min(values).unwrap_or_default();
            let max = stats::max(values).unwrap_or_default();
            let params = ScalingParams::MinMax { min, max };
            if max <= min {
                return constant(values.len(), params);
            }
            let half_span = max * 0.5 - min * 0.5;
            let out = values
                .iter()
                .map(|&x| ((x * 0.5 - min * 0.5) / half_span).clamp(0.0, 1.0))
                .collect();
            NormalizedSeries {
                values: out,
                params,
                constant: false,
            }
        }
        NormalizeMethod::ZScore => {
            let mean = stats::mean(values).unwrap_or_default();
            let std_dev = stats::std_dev(values).unwrap_or_default();
            let params = ScalingParams::ZScore { mean, std_dev };
            if std_dev == 0.0 || !std_dev.is_finite() {
                return constant(values.len(), params);
            }
            let out = values
                .iter()
                .map(|&x| (x * 0.5 - mean * 0.5) / (std_dev * 0.5))
                .collect();
            NormalizedSeries {
                values: out,
                params,
                constant: false,
            }
        }
        NormalizeMethod::Robust => {
            let (q1, q3) = stats::quartiles(values).unwrap_or_default();
            let median = stats::median(values).unwrap_or_default();
            let iqr = q3 - q1;
            let params = ScalingParams::Robust { median, iqr };
            if iqr == 0.0 || !iqr.is_finite() {
                return constant(values.len(), params);
            }
            let out = values.iter().map(|&x| (x - median) / iqr).collect();
            NormalizedSeries {
                values: out,
                params,
                constant: false,
            }
        }
    }
}

fn constant(len: usize, params: ScalingParams) -> NormalizedSeries {
    NormalizedSeries {
        values: vec![0.0; len],
        params,
        constant: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<f64> {
        (0..50).map(|i| (i as f64 * 0.37).sin() * 12.0 + i as f64).collect()
    }

    #[test]
    fn test_min_max_range() {
        let out = normalize(&sample(), NormalizeMethod::MinMax);
        assert!(out.values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(out.values.iter().any(|v| *v == 0.0));
        assert!(out.values.iter().any(|v| (*v - 1.0).abs() < 1e-12));
        assert!(!out.constant);
    }

    #[test]
    fn test_z_score_moments() {
        let out = normalize(&sample(), NormalizeMethod::ZScore);
        let m = stats::mean(&out.values).unwrap();
        let var = stats::variance(&out.values).unwrap();
        assert!(m.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_yields_zeros_and_warning() {
        for method in [NormalizeMethod::MinMax, NormalizeMethod::ZScore, NormalizeMethod::Robust] {
            let out = normalize(&[4.0, 4.0, 4.0], method);
            assert_eq!(out.values, vec![0.0, 0.0, 0.0]);
            assert!(out.constant);
            assert_eq!(out.warning().unwrap().kind, WarningKind::ConstantSeries);
            assert_eq!(out.denormalize(&[0.0]), vec![4.0]);
        }
    }

    #[test]
    fn test_denormalize_inverts_each_method() {
        let input = sample();
        for method in [
            NormalizeMethod::MinMax,
            NormalizeMethod::ZScore,
            NormalizeMethod::Robust,
            NormalizeMethod::None,
        ] {
            let out = normalize(&input, method);
            let back = out.denormalize(&out.values);
            for (a, b) in input.iter().zip(&back) {
                assert!((a - b).abs() < 1e-9, "{} did not round-trip", method);
            }
        }
    }

    #[test]
    fn test_extreme_range_stays_in_unit_interval() {
        let out = normalize(&[-f64::MAX, 0.0, f64::MAX], NormalizeMethod::MinMax);
        assert_eq!(out.values, vec![0.0, 0.5, 1.0]);
    }
}
