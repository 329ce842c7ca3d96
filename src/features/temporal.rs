//! Calendar, lag and rolling-window columns.
//!
//! Rolling windows are trailing: row `t` only sees rows `t-w+1 ..= t`.
//! The first `w-1` rows use the shorter history available.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::analysis::stats;

/// Calendar features in construction order.
pub fn calendar_columns(timestamps: &[DateTime<Utc>]) -> Vec<(String, Vec<f64>)> {
    let hour = timestamps.iter().map(|t| t.hour() as f64).collect();
    let day_of_week = timestamps
        .iter()
        .map(|t| t.weekday().num_days_from_monday() as f64)
        .collect();
    let day_of_month = timestamps.iter().map(|t| t.day() as f64).collect();
    let month = timestamps.iter().map(|t| t.month() as f64).collect();
    let is_weekend = timestamps
        .iter()
        .map(|t| {
            if t.weekday().num_days_from_monday() >= 5 {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    vec![
        ("hour".to_string(), hour),
        ("day_of_week".to_string(), day_of_week),
        ("day_of_month".to_string(), day_of_month),
        ("month".to_string(), month),
        ("is_weekend".to_string(), is_weekend),
    ]
}

/// `value[t - lag]`; rows without that much history hold the first
/// observed value (callers drop them under the default edge policy).
pub fn lag_column(values: &[f64], lag: usize) -> Vec<f64> {
    let first = values.first().copied().unwrap_or_default();
    (0..values.len())
        .map(|t| if t >= lag { values[t - lag] } else { first })
        .collect()
}

/// Rolling mean, std-dev, min and max over trailing windows of `window`.
pub fn rolling_columns(values: &[f64], window: usize) -> Vec<(String, Vec<f64>)> {
    let window = window.max(1);
    let n = values.len();
    let mut mean = Vec::with_capacity(n);
    let mut std = Vec::with_capacity(n);
    let mut min = Vec::with_capacity(n);
    let mut max = Vec::with_capacity(n);

    for t in 0..n {
        let start = (t + 1).saturating_sub(window);
        let slice = &values[start..=t];
        mean.push(stats::mean(slice).unwrap_or_default());
        std.push(stats::std_dev(slice).unwrap_or_default());
        min.push(stats::min(slice).unwrap_or_default());
        max.push(stats::max(slice).unwrap_or_default());
    }

    vec![
        (format!("rolling_mean_{}", window), mean),
        (format!("rolling_std_{}", window), std),
        (format!("rolling_min_{}", window), min),
        (format!("rolling_max_{}", window), max),
    ]
}
