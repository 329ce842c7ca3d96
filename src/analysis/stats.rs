//! Descriptive statistics shared by the cleaning, feature and analysis
//! stages.
//!
//! All helpers take plain slices of finite values. Means and variances
//! are computed incrementally in rescaled units so that magnitudes near
//! `f64::MAX` do not overflow, which `statrs` sums would. Extremes come
//! from `statrs`.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut m = 0.0;
    for (i, &v) in values.iter().enumerate() {
        let n = i as f64 + 1.0;
        m += v / n - m / n;
    }
    Some(m)
}

/// Population variance (ddof = 0).
pub fn variance(values: &[f64]) -> Option<f64> {
    let (scaled, half_scale) = scaled_second_moment(values)?;
    Some(scaled * half_scale * half_scale * 4.0)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let (scaled, half_scale) = scaled_second_moment(values)?;
    Some(scaled.sqrt() * half_scale * 2.0)
}

// Second moment of deviations expressed in units of the largest
// half-deviation, so neither the deviations nor their squares overflow.
fn scaled_second_moment(values: &[f64]) -> Option<(f64, f64)> {
    let m = mean(values)?;
    let half_scale = values
        .iter()
        .map(|v| (v * 0.5 - m * 0.5).abs())
        .fold(0.0, f64::max);
    if half_scale == 0.0 {
        return Some((0.0, 0.0));
    }
    let mut acc = 0.0;
    for (i, &v) in values.iter().enumerate() {
        let d = (v * 0.5 - m * 0.5) / half_scale;
        acc += (d * d - acc) / (i as f64 + 1.0);
    }
    Some((acc, half_scale))
}

pub fn min(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::min(values))
}

pub fn max(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::max(values))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Quantile with linear interpolation between order statistics
/// (the usual "type 7" definition).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(quantile_sorted(&sorted(values), q))
}

pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// First and third quartile.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let s = sorted(values);
    Some((quantile_sorted(&s, 0.25), quantile_sorted(&s, 0.75)))
}

/// Median absolute deviation around the median (unscaled).
pub fn mad(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Pearson correlation. Returns `None` when either side has zero
/// variance or the lengths differ.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va <= 0.0 || vb <= 0.0 {
        return None;
    }
    let r = cov / (va.sqrt() * vb.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Sample skewness (Fisher-Pearson, population moments).
pub fn skewness(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd == 0.0 {
        return Some(0.0);
    }
    let n = values.len() as f64;
    Some(values.iter().map(|v| ((v - m) / sd).powi(3)).sum::<f64>() / n)
}

/// Excess kurtosis (population moments, normal = 0).
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd == 0.0 {
        return Some(0.0);
    }
    let n = values.len() as f64;
    Some(values.iter().map(|v| ((v - m) / sd).powi(4)).sum::<f64>() / n - 3.0)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl SummaryStats {
    pub fn compute(values: &[f64]) -> Option<Self> {
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            std_dev: std_dev(values)?,
            min: min(values)?,
            max: max(values)?,
            median: median(values)?,
            skewness: skewness(values)?,
            kurtosis: kurtosis(values)?,
        })
    }
}
