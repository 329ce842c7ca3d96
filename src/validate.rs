//! Dataset validation.
//!
//! The validator is the boundary between caller-supplied data and the
//! rest of the pipeline: it checks size, timestamp ordering and metadata,
//! and hands back a sorted, borrowed view. The caller's dataset is never
//! modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{DataPoint, Dataset, MetadataValue};

/// Default minimum number of points an analysis needs.
pub const DEFAULT_MIN_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub min_points: usize,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            min_points: DEFAULT_MIN_POINTS,
        }
    }
}

/// Timestamp-ordered view over a validated dataset.
#[derive(Debug, Clone)]
pub struct ValidatedDataset<'a> {
    dataset: &'a Dataset,
    points: Vec<&'a DataPoint>,
}

impl<'a> ValidatedDataset<'a> {
    pub fn source(&self) -> &'a str {
        self.dataset.source()
    }

    pub fn description(&self) -> &'a str {
        self.dataset.description()
    }

    /// Points in strictly increasing timestamp order.
    pub fn points(&self) -> &[&'a DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp()).collect()
    }
}

/// Check that `dataset` is analyzable under `requirements`.
pub fn validate<'a>(
    dataset: &'a Dataset,
    requirements: &Requirements,
) -> Result<ValidatedDataset<'a>, ValidationError> {
    let required = requirements.min_points;
    if dataset.len() < required || dataset.is_empty() {
        return Err(ValidationError::InsufficientData {
            required,
            actual: dataset.len(),
        });
    }

    let mut points: Vec<&DataPoint> = dataset.points().iter().collect();
    points.sort_by_key(|p| p.timestamp());

    for pair in points.windows(2) {
        if pair[0].timestamp() == pair[1].timestamp() {
            return Err(ValidationError::DuplicateTimestamp {
                timestamp: pair[1].timestamp(),
            });
        }
    }

    for point in &points {
        check_metadata(point)?;
    }

    Ok(ValidatedDataset { dataset, points })
}

fn check_metadata(point: &DataPoint) -> Result<(), ValidationError> {
    let Some(metadata) = point.metadata() else {
        return Ok(());
    };
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err(ValidationError::InvalidMetadata {
                timestamp: point.timestamp(),
                key: key.clone(),
                reason: "metadata keys must be non-empty".to_string(),
            });
        }
        if let MetadataValue::Float(f) = value {
            if !f.is_finite() {
                return Err(ValidationError::InvalidMetadata {
                    timestamp: point.timestamp(),
                    key: key.clone(),
                    reason: format!("float metadata must be finite, got {}", f),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;
    use chrono::{Duration, TimeZone};

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    #[test]
    fn test_empty_dataset_is_insufficient() {
        let dataset = Dataset::new("test", "", vec![]);
        let err = validate(&dataset, &Requirements::default()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientData {
                required: 3,
                actual: 0
            }
        );
    }

    #[test]
    fn test_zero_min_points_still_rejects_empty() {
        let dataset = Dataset::new("test", "", vec![]);
        let reqs = Requirements { min_points: 0 };
        assert!(matches!(
            validate(&dataset, &reqs),
            Err(ValidationError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_unsorted_input_is_returned_sorted_without_mutation() {
        let dataset = Dataset::new(
            "test",
            "",
            vec![
                DataPoint::new(ts(2), 3.0),
                DataPoint::new(ts(0), 1.0),
                DataPoint::new(ts(1), 2.0),
            ],
        );
        let view = validate(&dataset, &Requirements::default()).unwrap();
        let values: Vec<_> = view.points().iter().map(|p| p.value().unwrap()).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        // original order untouched
        assert_eq!(dataset.points()[0].value(), Some(3.0));
    }

    #[test]
    fn test_duplicate_timestamps_are_rejected() {
        let dataset = Dataset::new(
            "test",
            "",
            vec![
                DataPoint::new(ts(0), 1.0),
                DataPoint::new(ts(1), 2.0),
                DataPoint::new(ts(1), 2.5),
            ],
        );
        let err = validate(&dataset, &Requirements::default()).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateTimestamp { timestamp: ts(1) });
    }

    #[test]
    fn test_non_finite_float_metadata_is_rejected() {
        let mut meta = Metadata::new();
        meta.insert("elevation".to_string(), MetadataValue::Float(f64::NAN));
        let dataset = Dataset::new(
            "test",
            "",
            vec![
                DataPoint::new(ts(0), 1.0),
                DataPoint::with_metadata(ts(1), Some(2.0), meta),
                DataPoint::new(ts(2), 3.0),
            ],
        );
        assert!(matches!(
            validate(&dataset, &Requirements::default()),
            Err(ValidationError::InvalidMetadata { key, .. }) if key == "elevation"
        ));
    }
}
