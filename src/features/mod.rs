//! Feature engineering for model evaluation.
//!
//! Submodules:
//! - `temporal`: calendar, lag and trailing rolling-window columns.
//! - `prune`: constant-column removal and multicollinearity pruning.
//!
//! Columns are produced in a fixed construction order (`value`, calendar,
//! lags, rolling statistics, polynomial) which also decides which column
//! of a correlated pair is dropped.

pub mod prune;
pub mod temporal;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::clean::CleanedSeries;
use crate::logging::{self, Stage};
use crate::model::Warning;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with the leading rows that lack `max(lag)` history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LagEdgePolicy {
    Drop,
    /// Keep the rows; missing history holds the first observed value.
    Fill,
}

impl FromStr for LagEdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(LagEdgePolicy::Drop),
            "fill" => Ok(LagEdgePolicy::Fill),
            other => Err(format!("unknown lag edge policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub window_sizes: Vec<usize>,
    pub lags: Vec<usize>,
    pub lag_edge: LagEdgePolicy,
    pub correlation_threshold: f64,
    pub calendar: bool,
    /// Add `value_squared`.
    pub polynomial: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_sizes: vec![3, 7],
            lags: vec![1, 2, 3],
            lag_edge: LagEdgePolicy::Drop,
            correlation_threshold: 0.95,
            calendar: true,
            polynomial: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Feature matrix
// ---------------------------------------------------------------------------

/// Named, equal-length feature columns in construction order.
///
/// When produced by `build`, each row also carries the timestamp and the
/// series value it was derived from; `offset` is the number of leading
/// series rows removed by the lag edge policy.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<(String, Vec<f64>)>,
    n_rows: usize,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    offset: usize,
}

impl FeatureMatrix {
    /// Build a matrix from bare columns with no row metadata.
    ///
    /// Returns `None` if the columns differ in length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Option<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if columns.iter().any(|(_, c)| c.len() != n_rows) {
            return None;
        }
        Some(Self {
            columns,
            n_rows,
            timestamps: Vec::new(),
            values: Vec::new(),
            offset: 0,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_slice())
    }

    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|(_, c)| c[i]).collect()
    }

    /// Row-major copy of the matrix, the layout the models train on.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows).map(|i| self.row(i)).collect()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Series value at each row.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The first `n` rows, keeping column names and row metadata.
    pub fn head(&self, n: usize) -> FeatureMatrix {
        let n = n.min(self.n_rows);
        FeatureMatrix {
            columns: self
                .columns
                .iter()
                .map(|(name, c)| (name.clone(), c[..n].to_vec()))
                .collect(),
            n_rows: n,
            timestamps: self.timestamps.iter().take(n).copied().collect(),
            values: self.values.iter().take(n).copied().collect(),
            offset: self.offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Derive the feature matrix for `series`.
pub fn build(series: &CleanedSeries, config: &FeatureConfig) -> (FeatureMatrix, Vec<Warning>) {
    let values = series.values();
    let timestamps = series.timestamps();

    let mut lags = config.lags.clone();
    lags.sort_unstable();
    lags.dedup();
    lags.retain(|&l| l > 0);
    let mut windows = config.window_sizes.clone();
    windows.sort_unstable();
    windows.dedup();
    windows.retain(|&w| w > 1);

    let mut columns: Vec<(String, Vec<f64>)> = vec![("value".to_string(), values.to_vec())];
    if config.calendar {
        columns.extend(temporal::calendar_columns(timestamps));
    }
    for &lag in &lags {
        columns.push((format!("lag_{}", lag), temporal::lag_column(values, lag)));
    }
    for &window in &windows {
        columns.extend(temporal::rolling_columns(values, window));
    }
    if config.polynomial {
        columns.push((
            "value_squared".to_string(),
            values.iter().map(|v| v * v).collect(),
        ));
    }

    let offset = match config.lag_edge {
        LagEdgePolicy::Drop => lags.last().copied().unwrap_or(0).min(values.len()),
        LagEdgePolicy::Fill => 0,
    };
    if offset > 0 {
        for (_, column) in columns.iter_mut() {
            column.drain(..offset);
        }
    }

    let pruned = prune::prune(columns, config.correlation_threshold);
    for warning in &pruned.warnings {
        logging::debug(Stage::Features, None, &warning.message);
    }
    logging::debug(
        Stage::Features,
        None,
        &format!(
            "{} features over {} rows ({} leading rows dropped)",
            pruned.columns.len(),
            values.len() - offset,
            offset
        ),
    );

    let matrix = FeatureMatrix {
        columns: pruned.columns,
        n_rows: values.len() - offset,
        timestamps: timestamps[offset..].to_vec(),
        values: values[offset..].to_vec(),
        offset,
    };
    (matrix, pruned.warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WarningKind;
    use chrono::{Duration, TimeZone};

    fn series(n: usize) -> CleanedSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..n).map(|i| start + Duration::hours(6 * i as i64)).collect();
        let values = (0..n)
            .map(|i| (i as f64 * 0.9).sin() * 5.0 + (i as f64 * 0.13).cos() * 3.0)
            .collect();
        CleanedSeries::from_finite(ts, values).unwrap()
    }

    #[test]
    fn test_lag_rows_dropped_by_default() {
        let (matrix, _) = build(&series(40), &FeatureConfig::default());
        assert_eq!(matrix.offset(), 3);
        assert_eq!(matrix.n_rows(), 37);
        assert_eq!(matrix.timestamps().len(), 37);
        assert!(matrix.columns().iter().all(|(_, c)| c.len() == 37));
    }

    #[test]
    fn test_repeated_window_sizes_build_once() {
        let repeated = FeatureConfig {
            window_sizes: vec![3, 7, 3],
            ..FeatureConfig::default()
        };
        let ordered = FeatureConfig {
            window_sizes: vec![7, 3],
            ..FeatureConfig::default()
        };
        let (a, a_warnings) = build(&series(40), &repeated);
        let (b, b_warnings) = build(&series(40), &ordered);
        assert_eq!(a.names(), b.names());
        assert_eq!(a_warnings, b_warnings);
    }

    #[test]
    fn test_fill_policy_keeps_all_rows() {
        let config = FeatureConfig {
            lag_edge: LagEdgePolicy::Fill,
            ..FeatureConfig::default()
        };
        let (matrix, _) = build(&series(40), &config);
        assert_eq!(matrix.n_rows(), 40);
        assert_eq!(matrix.offset(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = series(60);
        let config = FeatureConfig {
            polynomial: true,
            ..FeatureConfig::default()
        };
        let (a, wa) = build(&s, &config);
        let (b, wb) = build(&s, &config);
        assert_eq!(a.names(), b.names());
        assert_eq!(a, b);
        assert_eq!(wa, wb);
    }

    #[test]
    fn test_no_surviving_pair_exceeds_threshold() {
        let config = FeatureConfig::default();
        let (matrix, _) = build(&series(80), &config);
        let cols = matrix.columns();
        for i in 0..cols.len() {
            for j in (i + 1)..cols.len() {
                if let Some(r) = crate::analysis::stats::pearson(&cols[i].1, &cols[j].1) {
                    assert!(r.abs() <= config.correlation_threshold);
                }
            }
        }
    }

    #[test]
    fn test_hourly_calendar_column_dropped_for_daily_data() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..20).map(|i| start + Duration::days(i)).collect();
        let values = (0..20).map(|i| (i as f64 * 1.7).sin()).collect();
        let series = CleanedSeries::from_finite(ts, values).unwrap();
        let (matrix, warnings) = build(&series, &FeatureConfig::default());
        assert!(matrix.column("hour").is_none());
        assert!(warnings.iter().any(|w| {
            w.kind == WarningKind::DroppedConstantFeature && w.message.contains("'hour'")
        }));
    }

    #[test]
    fn test_value_column_comes_first() {
        let (matrix, _) = build(&series(30), &FeatureConfig::default());
        assert_eq!(matrix.names()[0], "value");
    }

    #[test]
    fn test_head_keeps_names_and_row_metadata() {
        let (matrix, _) = build(&series(30), &FeatureConfig::default());
        let head = matrix.head(10);
        assert_eq!(head.n_rows(), 10);
        assert_eq!(head.names(), matrix.names());
        assert_eq!(head.row(9), matrix.row(9));
        assert_eq!(head.timestamps(), &matrix.timestamps()[..10]);
        assert_eq!(matrix.head(500).n_rows(), matrix.n_rows());
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let ragged = vec![("a".to_string(), vec![1.0, 2.0]), ("b".to_string(), vec![1.0])];
        assert!(FeatureMatrix::from_columns(ragged).is_none());
    }
}
