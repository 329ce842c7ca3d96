//! Structured logging for the analysis pipeline.
//!
//! Every line carries the pipeline stage and, where known, the dataset
//! source it concerns. Backed by the `log` facade with an `env_logger`
//! sink writing to the console or to a log file.

use chrono::Utc;
use log::LevelFilter;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;

use crate::error::ModelFitError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Clean,
    Normalize,
    Features,
    Evaluate,
    Anomaly,
    Trend,
    Assemble,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "VALID"),
            Stage::Clean => write!(f, "CLEAN"),
            Stage::Normalize => write!(f, "NORM"),
            Stage::Features => write!(f, "FEAT"),
            Stage::Evaluate => write!(f, "EVAL"),
            Stage::Anomaly => write!(f, "ANOM"),
            Stage::Trend => write!(f, "TREND"),
            Stage::Assemble => write!(f, "ASSM"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the data in that fold cannot support a fit
    Expected,
    /// Unexpected failure - solver trouble or a bug
    Unexpected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

/// Degenerate folds are a property of the data; a solver that fails to
/// converge on healthy data is not.
pub fn classify_fit_failure(err: &ModelFitError) -> FailureType {
    match err {
        ModelFitError::DegenerateTarget
        | ModelFitError::InsufficientRows { .. }
        | ModelFitError::TooManyRows { .. }
        | ModelFitError::NoFeatures
        | ModelFitError::NoCompletedFolds => FailureType::Expected,
        ModelFitError::DidNotConverge { .. } => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Install the global logger.
///
/// With `log_file` set, entries are appended to that file instead of
/// stderr. Calling this twice is harmless: the second call reports the
/// existing logger and changes nothing.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), String> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(min_level.to_level_filter());

    builder.format(move |buf, record| {
        if console_timestamps {
            writeln!(
                buf,
                "{} {} {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.args()
            )
        } else {
            writeln!(buf, "   {} {}", record.level(), record.args())
        }
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open log file {}: {}", path, e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| format!("Logger already initialised: {}", e))
}

fn format_entry(stage: Stage, dataset: Option<&str>, message: &str) -> String {
    let dataset_part = dataset.map(|d| format!(" [{}]", d)).unwrap_or_default();
    format!("{}{}: {}", stage, dataset_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

pub fn info(stage: Stage, dataset: Option<&str>, message: &str) {
    log::info!("{}", format_entry(stage, dataset, message));
}

pub fn warn(stage: Stage, dataset: Option<&str>, message: &str) {
    log::warn!("{}", format_entry(stage, dataset, message));
}

pub fn error(stage: Stage, dataset: Option<&str>, message: &str) {
    log::error!("{}", format_entry(stage, dataset, message));
}

pub fn debug(stage: Stage, dataset: Option<&str>, message: &str) {
    log::debug!("{}", format_entry(stage, dataset, message));
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed cross-validation fold with automatic classification
pub fn log_fold_failure(model: &str, fold: usize, err: &ModelFitError) {
    let failure_type = classify_fit_failure(err);
    let message = format!("{} fold {} failed [{}]: {}", model, fold, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Stage::Evaluate, None, &message),
        FailureType::Unexpected => warn(Stage::Evaluate, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Evaluation Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one model's cross-validation run
pub fn log_fold_summary(model: &str, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "{} cross-validation: {}/{} folds successful, {} failed",
        model, successful, total, failed
    );

    if failed == 0 {
        info(Stage::Evaluate, None, &message);
    } else if successful == 0 {
        error(Stage::Evaluate, None, &message);
    } else {
        warn(Stage::Evaluate, None, &message);
    }
}
