//! Pipeline configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so an
//! empty file (or no file) gives the stock pipeline. Request parameters
//! override whatever is configured here.
//!
//! Environment overrides (a `.env` file is honoured):
//!   CLIMATE_PIPELINE_CONFIG: path of the TOML file to load
//!   CLIMATE_PIPELINE_LOG_LEVEL: replaces `logging.level`

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::analysis::anomaly::AnomalyConfig;
use crate::analysis::trend::TrendConfig;
use crate::clean::{ImputationPolicy, OutlierPolicy};
use crate::error::ConfigurationError;
use crate::evaluate::DEFAULT_FOLDS;
use crate::features::FeatureConfig;
use crate::logging::LogLevel;
use crate::models::registry;
use crate::normalize::NormalizeMethod;
use crate::validate::Requirements;

pub const CONFIG_PATH_VAR: &str = "CLIMATE_PIPELINE_CONFIG";
pub const LOG_LEVEL_VAR: &str = "CLIMATE_PIPELINE_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub imputation: ImputationPolicy,
    pub outliers: OutlierPolicy,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            imputation: ImputationPolicy::Mean,
            outliers: OutlierPolicy::default(),
        }
    }
}

/// Normalization applied before each kind of analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub trend: NormalizeMethod,
    pub anomaly: NormalizeMethod,
    pub model_eval: NormalizeMethod,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            trend: NormalizeMethod::None,
            anomaly: NormalizeMethod::None,
            model_eval: NormalizeMethod::ZScore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Registry names or aliases.
    pub models: Vec<String>,
    pub folds: usize,
    /// The target is the value this many steps after each feature row.
    pub horizon: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            models: registry::all_model_names()
                .into_iter()
                .map(String::from)
                .collect(),
            folds: DEFAULT_FOLDS,
            horizon: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append to this file instead of stderr.
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl LoggingConfig {
    pub fn log_level(&self) -> Result<LogLevel, ConfigurationError> {
        self.level
            .parse()
            .map_err(|e: String| ConfigurationError::invalid("logging.level", e))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Compute budget per request; unset means unlimited.
    pub timeout_ms: Option<u64>,
    pub validation: Requirements,
    pub cleaning: CleaningConfig,
    pub normalization: NormalizationConfig,
    pub features: FeatureConfig,
    pub evaluation: EvaluationConfig,
    pub anomaly: AnomalyConfig,
    pub trend: TrendConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn parse_config(text: &str) -> Result<PipelineConfig, ConfigurationError> {
    let config: PipelineConfig = toml::from_str(text).map_err(|e| ConfigurationError::ConfigFile {
        path: "<inline>".to_string(),
        reason: e.to_string(),
    })?;
    config.check()?;
    Ok(config)
}

/// Load and check a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigurationError> {
    let path = path.as_ref();
    let file_error = |reason: String| ConfigurationError::ConfigFile {
        path: path.display().to_string(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let config: PipelineConfig = toml::from_str(&text).map_err(|e| file_error(e.to_string()))?;
    config.check()?;
    Ok(config)
}

/// Resolve configuration from an explicit path, else the
/// `CLIMATE_PIPELINE_CONFIG` variable, else defaults; then apply the
/// log level override.
pub fn load_from_env(explicit: Option<&Path>) -> Result<PipelineConfig, ConfigurationError> {
    dotenv::dotenv().ok();
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => match env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => load_config(path.trim())?,
            _ => PipelineConfig::default(),
        },
    };
    if let Ok(level) = env::var(LOG_LEVEL_VAR) {
        if !level.trim().is_empty() {
            config.logging.level = level.trim().to_string();
        }
    }
    config.logging.log_level()?;
    Ok(config)
}

impl PipelineConfig {
    /// Range checks that serde cannot express.
    pub fn check(&self) -> Result<(), ConfigurationError> {
        if self.validation.min_points == 0 {
            return Err(ConfigurationError::invalid("validation.min_points", "must be at least 1"));
        }
        let outliers = &self.cleaning.outliers;
        if outliers.iqr_k <= 0.0 || outliers.zscore_threshold <= 0.0 {
            return Err(ConfigurationError::invalid(
                "cleaning.outliers",
                "iqr_k and zscore_threshold must be positive",
            ));
        }
        if self.evaluation.folds < 2 {
            return Err(ConfigurationError::invalid("evaluation.folds", "must be at least 2"));
        }
        if self.evaluation.horizon == 0 {
            return Err(ConfigurationError::invalid("evaluation.horizon", "must be at least 1"));
        }
        for name in &self.evaluation.models {
            if registry::find_model(name).is_none() {
                return Err(ConfigurationError::UnknownModel(name.clone()));
            }
        }
        let threshold = self.features.correlation_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigurationError::invalid(
                "features.correlation_threshold",
                "must be in (0, 1]",
            ));
        }
        if self.anomaly.sensitivity <= 0.0 || self.anomaly.window < 3 {
            return Err(ConfigurationError::invalid(
                "anomaly",
                "sensitivity must be positive and window at least 3",
            ));
        }
        if !(self.anomaly.contamination > 0.0 && self.anomaly.contamination <= 0.5) {
            return Err(ConfigurationError::invalid(
                "anomaly.contamination",
                "must be in (0, 0.5]",
            ));
        }
        if self.trend.window < 2 {
            return Err(ConfigurationError::invalid("trend.window", "must be at least 2"));
        }
        if !(self.trend.confidence_level > 0.0 && self.trend.confidence_level < 1.0) {
            return Err(ConfigurationError::invalid(
                "trend.confidence_level",
                "must be in (0, 1)",
            ));
        }
        self.logging.log_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::OutlierMethod;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.evaluation.models, vec!["random_forest", "gradient_boosting", "svr"]);
        assert_eq!(config.normalization.model_eval, NormalizeMethod::ZScore);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            timeout_ms = 5000

            [cleaning]
            imputation = "linear-interpolate"

            [cleaning.outliers]
            method = "z-score"

            [features]
            lags = [1, 24]
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout_ms, Some(5000));
        assert_eq!(config.cleaning.imputation, ImputationPolicy::LinearInterpolate);
        assert_eq!(config.cleaning.outliers.method, OutlierMethod::ZScore);
        assert_eq!(config.cleaning.outliers.iqr_k, 1.5);
        assert_eq!(config.features.lags, vec![1, 24]);
        assert_eq!(config.features.window_sizes, vec![3, 7]);
    }

    #[test]
    fn test_unknown_model_in_config_is_rejected() {
        let err = parse_config("[evaluation]\nmodels = [\"rf\", \"prophet\"]").unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownModel("prophet".into()));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(parse_config("[evaluation]\nfolds = 1").is_err());
        assert!(parse_config("[trend]\nconfidence_level = 1.5").is_err());
        assert!(parse_config("[anomaly]\ncontamination = 0.9").is_err());
        assert!(parse_config("[logging]\nlevel = \"loud\"").is_err());
    }

    #[test]
    fn test_malformed_toml_is_a_config_file_error() {
        let err = parse_config("[trend\nwindow = 3").unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFile { .. }));
    }
}
