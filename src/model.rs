//! Core data types for the climate analysis pipeline.
//!
//! This module defines the shared input model imported by all other
//! modules: observations, datasets and the warnings attached to results.
//! Datasets are built and owned by the collector/storage side; the
//! pipeline only ever borrows them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Scalar value allowed in a data point's metadata map.
///
/// Deserialized untagged, so `{"station": "KPIA", "qc": true, "elev": 652}`
/// maps onto `Text`, `Bool` and `Integer` respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

pub type Metadata = BTreeMap<String, MetadataValue>;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// A single time-stamped observation.
///
/// `value: None` is the explicit missing marker. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    timestamp: DateTime<Utc>,
    value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
            metadata: None,
        }
    }

    pub fn missing(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: None,
            metadata: None,
        }
    }

    pub fn with_metadata(
        timestamp: DateTime<Utc>,
        value: Option<f64>,
        metadata: Metadata,
    ) -> Self {
        Self {
            timestamp,
            value,
            metadata: Some(metadata),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// The value if it is present and finite.
    pub fn finite_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

/// An ordered series of observations from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    source: String,
    #[serde(default)]
    description: String,
    points: Vec<DataPoint>,
}

impl Dataset {
    pub fn new(
        source: impl Into<String>,
        description: impl Into<String>,
        points: Vec<DataPoint>,
    ) -> Self {
        Self {
            source: source.into(),
            description: description.into(),
            points,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Normalization saw a constant series and emitted zeros.
    ConstantSeries,
    /// A feature column was dropped for exceeding the correlation threshold.
    DroppedCorrelatedFeature,
    /// A feature column had zero variance.
    DroppedConstantFeature,
    /// A request parameter or hyperparameter was not recognised.
    UnknownParameter,
    /// A cross-validation fold failed to fit.
    FoldFailed,
    /// Points were removed by the outlier `drop` action.
    DroppedOutliers,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::ConstantSeries => write!(f, "constant_series"),
            WarningKind::DroppedCorrelatedFeature => write!(f, "dropped_correlated_feature"),
            WarningKind::DroppedConstantFeature => write!(f, "dropped_constant_feature"),
            WarningKind::UnknownParameter => write!(f, "unknown_parameter"),
            WarningKind::FoldFailed => write!(f, "fold_failed"),
            WarningKind::DroppedOutliers => write!(f, "dropped_outliers"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
