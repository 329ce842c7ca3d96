//! Error taxonomy for the analysis pipeline.
//!
//! Only `ValidationError` and `ConfigurationError` abort a request. The
//! other kinds are recorded inside the `AnalysisResult` (failed fold,
//! failed section, warning) so the caller decides how to present them.

use chrono::{DateTime, Utc};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// The dataset itself cannot be analyzed. Not retryable without new input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("insufficient data: {required} points required, {actual} supplied")]
    InsufficientData { required: usize, actual: usize },

    #[error("duplicate timestamp {timestamp}")]
    DuplicateTimestamp { timestamp: DateTime<Utc> },

    #[error("invalid metadata key '{key}' at {timestamp}: {reason}")]
    InvalidMetadata {
        timestamp: DateTime<Utc>,
        key: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImputationError {
    /// Every slot of the column is missing, so no policy has anything to work from.
    #[error("column '{column}' has no known values to impute from")]
    UnimputableColumn { column: String },

    #[error("imputation produced a non-finite value at index {index}")]
    NonFiniteResult { index: usize },
}

// ---------------------------------------------------------------------------
// Request / configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("unknown analysis type '{0}' (expected trend, anomaly or model-eval)")]
    UnknownAnalysisType(String),

    #[error("unknown model variant '{0}'")]
    UnknownModel(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("failed to load configuration from {path}: {reason}")]
    ConfigFile { path: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Model fitting
// ---------------------------------------------------------------------------

/// A single fit failed. Recorded on the fold that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelFitError {
    #[error("degenerate training target: zero variance")]
    DegenerateTarget,

    #[error("insufficient training rows: {required} required, {actual} supplied")]
    InsufficientRows { required: usize, actual: usize },

    #[error("too many training rows: at most {limit} accepted, {actual} supplied")]
    TooManyRows { limit: usize, actual: usize },

    #[error("feature matrix has no columns")]
    NoFeatures,

    #[error("solver did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },

    /// Every fold of every compared model failed.
    #[error("no model completed a cross-validation fold")]
    NoCompletedFolds,
}

// ---------------------------------------------------------------------------
// Compute budget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compute budget of {budget_ms} ms exceeded during {stage}")]
pub struct TimeoutError {
    pub stage: String,
    pub budget_ms: u64,
}

// ---------------------------------------------------------------------------
// Unified error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("imputation error: {0}")]
    Imputation(#[from] ImputationError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("model fit error: {0}")]
    ModelFit(#[from] ModelFitError),

    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),
}

impl PipelineError {
    /// Whether the whole request must be rejected rather than recorded
    /// as a partial failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::Configuration(_)
        )
    }

    /// Stable machine-readable kind, used in failed result sections.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Imputation(_) => "imputation_error",
            PipelineError::Configuration(_) => "configuration_error",
            PipelineError::ModelFit(_) => "model_fit_error",
            PipelineError::Timeout(_) => "timeout_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
