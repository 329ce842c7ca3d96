//! The assembled output of one pipeline run.
//!
//! Every section key is always present; a section is `completed`,
//! `failed` (with the error kind and message) or `not_requested`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::anomaly::AnomalyReport;
use crate::analysis::stats::SummaryStats;
use crate::analysis::trend::TrendReport;
use crate::clean::CleaningReport;
use crate::error::PipelineError;
use crate::evaluate::ModelComparison;
use crate::model::{Dataset, Warning};
use crate::normalize::ScalingParams;
use crate::request::{AnalysisParameters, AnalysisType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Completed { result: T },
    Failed { error_kind: String, message: String },
    NotRequested,
}

impl<T> Section<T> {
    pub fn failed(err: &PipelineError) -> Self {
        Section::Failed {
            error_kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Section::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Section::Failed { .. })
    }
}

/// Identifies the input without copying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub source: String,
    pub description: String,
    pub points: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Hex SHA-256 over timestamps and values.
    pub fingerprint: String,
}

impl DatasetDescriptor {
    pub fn describe(dataset: &Dataset, fingerprint: String) -> Self {
        let timestamps = dataset.points().iter().map(|p| p.timestamp());
        Self {
            source: dataset.source().to_string(),
            description: dataset.description().to_string(),
            points: dataset.len(),
            start: timestamps.clone().min(),
            end: timestamps.max(),
            fingerprint,
        }
    }
}

/// One-step-ahead prediction from the best model, in original units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub model: String,
    pub horizon: usize,
    /// Timestamp of the feature row the forecast was made from.
    pub based_on: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Feature columns that survived pruning, in construction order.
    pub features: Vec<String>,
    /// Rows with a known target.
    pub rows: usize,
    /// Leading series rows removed by the lag edge policy.
    pub offset: usize,
    pub horizon: usize,
    pub comparison: ModelComparison,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_type: AnalysisType,
    pub parameters: AnalysisParameters,
    pub created_at: DateTime<Utc>,
    pub dataset: DatasetDescriptor,
    pub cleaning: Option<CleaningReport>,
    pub normalization: Option<ScalingParams>,
    pub summary: Option<SummaryStats>,
    pub evaluation: Section<EvaluationReport>,
    pub anomalies: Section<AnomalyReport>,
    pub trend: Section<TrendReport>,
    pub warnings: Vec<Warning>,
}

impl AnalysisResult {
    /// Whether the requested section completed.
    pub fn succeeded(&self) -> bool {
        match self.analysis_type {
            AnalysisType::Trend => self.trend.completed().is_some(),
            AnalysisType::Anomaly => self.anomalies.completed().is_some(),
            AnalysisType::ModelEval => self.evaluation.completed().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutError;
    use crate::model::DataPoint;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_section_tags() {
        let done: Section<u32> = Section::Completed { result: 7 };
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"status": "completed", "result": 7})
        );
        let skipped: Section<u32> = Section::NotRequested;
        assert_eq!(
            serde_json::to_value(&skipped).unwrap(),
            json!({"status": "not_requested"})
        );
    }

    #[test]
    fn test_failed_section_carries_error_kind() {
        let err: PipelineError = TimeoutError {
            stage: "trend".into(),
            budget_ms: 5,
        }
        .into();
        let section: Section<u32> = Section::failed(&err);
        assert!(section.is_failed());
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_kind"], "timeout_error");
    }

    #[test]
    fn test_descriptor_spans_unsorted_points() {
        let t = |d| Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap();
        let dataset = Dataset::new(
            "station-7",
            "soil moisture",
            vec![DataPoint::new(t(3), 1.0), DataPoint::new(t(1), 2.0)],
        );
        let d = DatasetDescriptor::describe(&dataset, "ab".into());
        assert_eq!(d.points, 2);
        assert_eq!(d.start, Some(t(1)));
        assert_eq!(d.end, Some(t(3)));
    }
}
