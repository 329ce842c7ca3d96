//! Windowed linear trend detection.
//!
//! The series is split into non-overlapping windows of `window` points;
//! the last window keeps whatever is left. Each window gets an ordinary
//! least-squares slope against the observation index (0 at the window
//! start) and, with at least 3 points, a Student-t confidence interval
//! from the slope's standard error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt;

use crate::clean::CleanedSeries;

/// Points needed before a segment has residual degrees of freedom.
pub const MIN_POINTS_FOR_INTERVAL: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window: usize,
    pub confidence_level: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 30,
            confidence_level: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
    /// The interval spans zero, or there is no interval.
    Stable,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increasing => write!(f, "increasing"),
            Direction::Decreasing => write!(f, "decreasing"),
            Direction::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlopeInterval {
    Estimated {
        lower: f64,
        upper: f64,
        level: f64,
        standard_error: f64,
    },
    InsufficientData {
        points: usize,
        required: usize,
    },
}

impl SlopeInterval {
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            SlopeInterval::Estimated { lower, upper, .. } => Some((lower, upper)),
            SlopeInterval::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSegment {
    pub start_index: usize,
    /// Inclusive.
    pub end_index: usize,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub points: usize,
    pub slope: f64,
    pub intercept: f64,
    pub direction: Direction,
    pub confidence_interval: SlopeInterval,
}

/// Adjacent segments whose slope intervals do not overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub slope_before: f64,
    pub slope_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub window: usize,
    pub confidence_level: f64,
    /// One segment over the whole series.
    pub overall: TrendSegment,
    pub segments: Vec<TrendSegment>,
    pub change_points: Vec<ChangePoint>,
}

pub fn detect(series: &CleanedSeries, config: &TrendConfig) -> TrendReport {
    let values = series.values();
    let timestamps = series.timestamps();
    let window = config.window.max(1);
    let level = config.confidence_level;

    let overall = fit_segment(values, timestamps, 0, level);
    let segments: Vec<TrendSegment> = (0..values.len())
        .step_by(window)
        .map(|start| {
            let end = (start + window).min(values.len());
            fit_segment(&values[start..end], &timestamps[start..end], start, level)
        })
        .collect();

    let change_points = segments
        .windows(2)
        .filter_map(|pair| {
            let (a, b) = (pair[0].confidence_interval.bounds()?, pair[1].confidence_interval.bounds()?);
            let disjoint = a.1 < b.0 || b.1 < a.0;
            disjoint.then(|| ChangePoint {
                index: pair[1].start_index,
                timestamp: timestamps[pair[1].start_index],
                slope_before: pair[0].slope,
                slope_after: pair[1].slope,
            })
        })
        .collect();

    TrendReport {
        window,
        confidence_level: level,
        overall,
        segments,
        change_points,
    }
}

/// Least-squares fit of `values` against `0..n`.
pub fn fit_segment(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    start_index: usize,
    level: f64,
) -> TrendSegment {
    let n = values.len();
    let mut segment = TrendSegment {
        start_index,
        end_index: start_index + n.saturating_sub(1),
        start_timestamp: timestamps.first().copied(),
        end_timestamp: timestamps.last().copied(),
        points: n,
        slope: 0.0,
        intercept: values.first().copied().unwrap_or_default(),
        direction: Direction::Stable,
        confidence_interval: SlopeInterval::InsufficientData {
            points: n,
            required: MIN_POINTS_FOR_INTERVAL,
        },
    };
    if n < 2 {
        return segment;
    }

    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / nf;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    segment.slope = slope;
    segment.intercept = intercept;

    if n < MIN_POINTS_FOR_INTERVAL {
        return segment;
    }

    let ssr: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let r = y - (intercept + slope * i as f64);
            r * r
        })
        .sum();
    let dof = nf - 2.0;
    let standard_error = (ssr / dof / sxx).sqrt();
    let Some(t) = t_critical(level, dof) else {
        return segment;
    };
    let lower = slope - t * standard_error;
    let upper = slope + t * standard_error;

    segment.direction = if lower > 0.0 {
        Direction::Increasing
    } else if upper < 0.0 {
        Direction::Decreasing
    } else {
        Direction::Stable
    };
    segment.confidence_interval = SlopeInterval::Estimated {
        lower,
        upper,
        level,
        standard_error,
    };
    segment
}

/// Two-sided Student-t critical value.
fn t_critical(level: f64, dof: f64) -> Option<f64> {
    if !(level > 0.0 && level < 1.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    let t = dist.inverse_cdf(1.0 - (1.0 - level) / 2.0);
    t.is_finite().then_some(t)
}
