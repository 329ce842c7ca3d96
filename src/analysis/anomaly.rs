//! Anomaly scoring.
//!
//! `rolling-mad` compares each point with the median of a centered
//! window, scaled by 1.4826 × MAD so the score reads like a z-score for
//! normal data. A window with no spread falls back to the whole-series
//! MAD, and a series with none falls back to a tiny scale relative to
//! the median, so a lone spike in flat data still scores high and every
//! score stays finite.
//!
//! `isolation-forest` scores points by how quickly random cuts isolate
//! them (see `isolation`). It flags the `contamination` share of points
//! with the highest scores instead of using `sensitivity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::isolation::{self, IsolationParams};
use super::stats;
use crate::clean::CleanedSeries;

/// Makes the MAD a consistent estimator of the standard deviation.
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyMethod {
    RollingMad,
    ZScore,
    IsolationForest,
}

impl FromStr for AnomalyMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling-mad" | "rolling_mad" | "mad" => Ok(AnomalyMethod::RollingMad),
            "z-score" | "zscore" | "z_score" => Ok(AnomalyMethod::ZScore),
            "isolation-forest" | "isolation_forest" | "iforest" => {
                Ok(AnomalyMethod::IsolationForest)
            }
            other => Err(format!("unknown anomaly method '{}'", other)),
        }
    }
}

impl fmt::Display for AnomalyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyMethod::RollingMad => write!(f, "rolling-mad"),
            AnomalyMethod::ZScore => write!(f, "z-score"),
            AnomalyMethod::IsolationForest => write!(f, "isolation-forest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub method: AnomalyMethod,
    /// Scores strictly above this are flagged.
    pub sensitivity: f64,
    pub window: usize,
    /// Expected share of anomalies, used by `isolation-forest`.
    pub contamination: f64,
    /// Run the outlier cleaner before detection.
    pub clean_outliers: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            method: AnomalyMethod::RollingMad,
            sensitivity: 3.0,
            window: 9,
            contamination: 0.1,
            clean_outliers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub score: f64,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub method: AnomalyMethod,
    pub sensitivity: f64,
    pub window: usize,
    /// Scores strictly above this were flagged.
    pub threshold: f64,
    pub flags: Vec<AnomalyFlag>,
    pub flagged_count: usize,
    pub flagged_percentage: f64,
}

impl AnomalyReport {
    pub fn flagged(&self) -> impl Iterator<Item = &AnomalyFlag> {
        self.flags.iter().filter(|f| f.flagged)
    }
}

/// Score every point of `series`. The report has one flag per point.
pub fn detect(series: &CleanedSeries, config: &AnomalyConfig) -> AnomalyReport {
    let values = series.values();
    let (scores, threshold) = match config.method {
        AnomalyMethod::RollingMad => (rolling_mad_scores(values, config.window), config.sensitivity),
        AnomalyMethod::ZScore => (z_scores(values), config.sensitivity),
        AnomalyMethod::IsolationForest => {
            let scores = isolation::scores(values, &IsolationParams::default());
            let threshold = isolation::contamination_threshold(&scores, config.contamination);
            (scores, threshold)
        }
    };

    let flags: Vec<AnomalyFlag> = scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| AnomalyFlag {
            index,
            timestamp: series.timestamps()[index],
            value: values[index],
            score,
            flagged: score > threshold,
        })
        .collect();

    let flagged_count = flags.iter().filter(|f| f.flagged).count();
    let flagged_percentage = if flags.is_empty() {
        0.0
    } else {
        100.0 * flagged_count as f64 / flags.len() as f64
    };

    AnomalyReport {
        method: config.method,
        sensitivity: config.sensitivity,
        window: config.window,
        threshold,
        flags,
        flagged_count,
        flagged_percentage,
    }
}

fn rolling_mad_scores(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let w = window.clamp(1, n);
    let half = w / 2;
    let global_median = stats::median(values).unwrap_or_default();
    let global_scale = MAD_SCALE * stats::mad(values).unwrap_or_default();

    (0..n)
        .map(|i| {
            // Shift the window inward at the edges so it keeps its length.
            let start = i.saturating_sub(half).min(n - w);
            let slice = &values[start..start + w];
            let median = stats::median(slice).unwrap_or(global_median);
            let mut scale = MAD_SCALE * stats::mad(slice).unwrap_or_default();
            if scale <= 0.0 {
                scale = global_scale;
            }
            if scale <= 0.0 {
                scale = 1e-9 * median.abs().max(1.0);
            }
            let score = (values[i] - median).abs() / scale;
            if score.is_finite() { score } else { f64::MAX }
        })
        .collect()
}

fn z_scores(values: &[f64]) -> Vec<f64> {
    let mean = stats::mean(values).unwrap_or_default();
    let sd = stats::std_dev(values).unwrap_or_default();
    values
        .iter()
        .map(|v| if sd > 0.0 { (v - mean).abs() / sd } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(values: Vec<f64>) -> CleanedSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let ts = (0..values.len())
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        CleanedSeries::from_finite(ts, values).unwrap()
    }

    #[test]
    fn test_spike_in_constant_series_is_the_only_flag() {
        let mut values = vec![10.0; 50];
        values[23] = 1000.0;
        let report = detect(&series(values), &AnomalyConfig::default());

        assert_eq!(report.flags.len(), 50);
        assert_eq!(report.flagged_count, 1);
        assert!(report.flags[23].flagged);
        assert!(report.flags.iter().all(|f| f.score.is_finite()));
        assert_eq!(report.flagged_percentage, 2.0);
    }

    #[test]
    fn test_spike_at_series_edge_is_flagged() {
        let mut values: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin()).collect();
        values[39] = 25.0;
        let report = detect(&series(values), &AnomalyConfig::default());
        assert!(report.flags[39].flagged);
        assert_eq!(report.flagged().next().map(|f| f.index), Some(39));
    }

    #[test]
    fn test_z_score_method() {
        let mut values = vec![5.0; 50];
        values[10] = 500.0;
        let config = AnomalyConfig {
            method: AnomalyMethod::ZScore,
            ..AnomalyConfig::default()
        };
        let report = detect(&series(values), &config);
        assert_eq!(report.flagged_count, 1);
        assert!(report.flags[10].flagged);
    }

    #[test]
    fn test_flat_series_has_no_anomalies() {
        let report = detect(&series(vec![3.0; 12]), &AnomalyConfig::default());
        assert_eq!(report.flagged_count, 0);
        assert!(report.flags.iter().all(|f| f.score == 0.0));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("MAD".parse::<AnomalyMethod>(), Ok(AnomalyMethod::RollingMad));
        assert_eq!("z-score".parse::<AnomalyMethod>(), Ok(AnomalyMethod::ZScore));
        assert_eq!(
            "isolation_forest".parse::<AnomalyMethod>(),
            Ok(AnomalyMethod::IsolationForest)
        );
        assert!("lof".parse::<AnomalyMethod>().is_err());
    }

    #[test]
    fn test_isolation_forest_gives_spike_the_top_score() {
        let mut values: Vec<f64> = (0..60).map(|i| 20.0 + (i as f64 * 0.45).sin()).collect();
        values[37] = 95.0;
        let config = AnomalyConfig {
            method: AnomalyMethod::IsolationForest,
            ..AnomalyConfig::default()
        };
        let report = detect(&series(values), &config);

        let top = report
            .flags
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|f| f.index);
        assert_eq!(top, Some(37));
        assert!(report.flags[37].flagged);
        // 10% contamination of 60 points flags at most 6.
        assert!(report.flagged_count >= 1 && report.flagged_count <= 6);
        assert_eq!(report.method, AnomalyMethod::IsolationForest);
    }

    #[test]
    fn test_isolation_forest_flags_nothing_in_flat_series() {
        let config = AnomalyConfig {
            method: AnomalyMethod::IsolationForest,
            ..AnomalyConfig::default()
        };
        let report = detect(&series(vec![7.0; 40]), &config);
        assert_eq!(report.flagged_count, 0);
    }
}
