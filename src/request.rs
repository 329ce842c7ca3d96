//! Analysis requests and parameter resolution.
//!
//! A request names an analysis type and carries a loose map of JSON
//! parameters. `resolve` merges it over the `PipelineConfig` into a fully
//! typed `AnalysisParameters`, which is also what the result records as
//! "parameters actually applied".
//!
//! Bad values are `ConfigurationError`s. Keys that are not recognised, or
//! that only apply to another analysis type, become `UnknownParameter`
//! warnings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::analysis::anomaly::AnomalyConfig;
use crate::analysis::trend::TrendConfig;
use crate::clean::{ImputationPolicy, OutlierPolicy};
use crate::config::PipelineConfig;
use crate::error::ConfigurationError;
use crate::features::FeatureConfig;
use crate::model::{Warning, WarningKind};
use crate::models::{ModelConfig, ModelSpec};
use crate::normalize::NormalizeMethod;
use crate::validate::Requirements;

type ParamResult<T> = Result<T, ConfigurationError>;

// ---------------------------------------------------------------------------
// Analysis types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisType {
    Trend,
    Anomaly,
    ModelEval,
}

/// Parameters every analysis type accepts.
const COMMON_KEYS: &[&str] = &[
    "min_points",
    "imputation",
    "outlier_method",
    "iqr_k",
    "zscore_threshold",
    "outlier_action",
    "normalization",
    "timeout_ms",
];

/// Common keys that configure the outlier cleaner.
const OUTLIER_KEYS: &[&str] = &["outlier_method", "iqr_k", "zscore_threshold", "outlier_action"];

const TREND_KEYS: &[&str] = &["window", "confidence_level"];

const ANOMALY_KEYS: &[&str] = &[
    "method",
    "sensitivity",
    "window",
    "contamination",
    "clean_outliers",
];

const MODEL_EVAL_KEYS: &[&str] = &[
    "models",
    "folds",
    "horizon",
    "window_sizes",
    "lags",
    "lag_edge",
    "correlation_threshold",
    "polynomial",
    "calendar",
];

impl AnalysisType {
    pub const ALL: [AnalysisType; 3] = [
        AnalysisType::Trend,
        AnalysisType::Anomaly,
        AnalysisType::ModelEval,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Trend => "trend",
            AnalysisType::Anomaly => "anomaly",
            AnalysisType::ModelEval => "model-eval",
        }
    }

    /// Request keys specific to this analysis type.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            AnalysisType::Trend => TREND_KEYS,
            AnalysisType::Anomaly => ANOMALY_KEYS,
            AnalysisType::ModelEval => MODEL_EVAL_KEYS,
        }
    }

    fn accepts(self, key: &str) -> bool {
        COMMON_KEYS.contains(&key) || self.keys().contains(&key)
    }
}

impl FromStr for AnalysisType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trend" => Ok(AnalysisType::Trend),
            "anomaly" => Ok(AnalysisType::Anomaly),
            "model-eval" | "model_eval" => Ok(AnalysisType::ModelEval),
            _ => Err(ConfigurationError::UnknownAnalysisType(s.to_string())),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "type")]
    pub analysis_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl AnalysisRequest {
    pub fn new(analysis_type: impl Into<String>) -> Self {
        Self {
            analysis_type: analysis_type.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Resolved parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParameters {
    pub models: Vec<ModelConfig>,
    pub folds: usize,
    pub horizon: usize,
    pub features: FeatureConfig,
}

/// Everything a run actually applies. Sections for other analysis types
/// are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    pub validation: Requirements,
    pub outlier_policy: OutlierPolicy,
    pub imputation: ImputationPolicy,
    pub normalization: NormalizeMethod,
    pub timeout_ms: Option<u64>,
    pub trend: Option<TrendConfig>,
    pub anomaly: Option<AnomalyConfig>,
    pub evaluation: Option<EvaluationParameters>,
}

impl AnalysisParameters {
    /// Stable JSON form, used as part of the cache key.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub analysis_type: AnalysisType,
    pub parameters: AnalysisParameters,
    pub warnings: Vec<Warning>,
}

/// Merge `request` over `config`.
pub fn resolve(request: &AnalysisRequest, config: &PipelineConfig) -> ParamResult<ResolvedRequest> {
    let analysis_type: AnalysisType = request.analysis_type.parse()?;
    let params = &request.parameters;
    let mut warnings = unrecognised_keys(analysis_type, params);

    let mut validation = config.validation.clone();
    if let Some(v) = params.get("min_points") {
        validation.min_points = at_least("min_points", v, 1)?;
    }

    let mut outlier_policy = config.cleaning.outliers.clone();
    if let Some(v) = params.get("outlier_method") {
        outlier_policy.method = param_parse("outlier_method", v)?;
    }
    if let Some(v) = params.get("iqr_k") {
        outlier_policy.iqr_k = positive("iqr_k", v)?;
    }
    if let Some(v) = params.get("zscore_threshold") {
        outlier_policy.zscore_threshold = positive("zscore_threshold", v)?;
    }
    if let Some(v) = params.get("outlier_action") {
        outlier_policy.action = param_parse("outlier_action", v)?;
    }

    let imputation = match params.get("imputation") {
        Some(v) => param_parse("imputation", v)?,
        None => config.cleaning.imputation,
    };

    let normalization = match params.get("normalization") {
        Some(v) => param_parse("normalization", v)?,
        None => match analysis_type {
            AnalysisType::Trend => config.normalization.trend,
            AnalysisType::Anomaly => config.normalization.anomaly,
            AnalysisType::ModelEval => config.normalization.model_eval,
        },
    };

    let timeout_ms = match params.get("timeout_ms") {
        Some(Value::Null) => None,
        Some(v) => Some(param_u64("timeout_ms", v)?),
        None => config.timeout_ms,
    };

    let mut parameters = AnalysisParameters {
        validation,
        outlier_policy,
        imputation,
        normalization,
        timeout_ms,
        trend: None,
        anomaly: None,
        evaluation: None,
    };

    match analysis_type {
        AnalysisType::Trend => parameters.trend = Some(trend_config(params, &config.trend)?),
        AnalysisType::Anomaly => {
            let anomaly = anomaly_config(params, &config.anomaly)?;
            if !anomaly.clean_outliers {
                parameters.outlier_policy = OutlierPolicy::disabled();
                for key in OUTLIER_KEYS.iter().filter(|k| params.contains_key(**k)) {
                    warnings.push(Warning::new(
                        WarningKind::UnknownParameter,
                        format!(
                            "parameter '{}' has no effect while clean_outliers is false; ignored",
                            key
                        ),
                    ));
                }
            }
            parameters.anomaly = Some(anomaly);
        }
        AnalysisType::ModelEval => {
            let (evaluation, model_warnings) = evaluation_parameters(params, config)?;
            warnings.extend(model_warnings);
            parameters.evaluation = Some(evaluation);
        }
    }

    Ok(ResolvedRequest {
        analysis_type,
        parameters,
        warnings,
    })
}

fn unrecognised_keys(analysis_type: AnalysisType, params: &Map<String, Value>) -> Vec<Warning> {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter(|key| !analysis_type.accepts(key))
        .map(|key| {
            let owner = AnalysisType::ALL.into_iter().find(|t| t.accepts(key));
            let message = match owner {
                Some(other) => format!(
                    "parameter '{}' applies to {} analysis, not {}; ignored",
                    key, other, analysis_type
                ),
                None => format!("unknown parameter '{}'; ignored", key),
            };
            Warning::new(WarningKind::UnknownParameter, message)
        })
        .collect()
}

fn trend_config(params: &Map<String, Value>, base: &TrendConfig) -> ParamResult<TrendConfig> {
    let mut trend = base.clone();
    if let Some(v) = params.get("window") {
        trend.window = at_least("window", v, 2)?;
    }
    if let Some(v) = params.get("confidence_level") {
        let level = param_f64("confidence_level", v)?;
        if !(level > 0.0 && level < 1.0) {
            return Err(ConfigurationError::invalid("confidence_level", "must be in (0, 1)"));
        }
        trend.confidence_level = level;
    }
    Ok(trend)
}

fn anomaly_config(params: &Map<String, Value>, base: &AnomalyConfig) -> ParamResult<AnomalyConfig> {
    let mut anomaly = base.clone();
    if let Some(v) = params.get("method") {
        anomaly.method = param_parse("method", v)?;
    }
    if let Some(v) = params.get("sensitivity") {
        anomaly.sensitivity = positive("sensitivity", v)?;
    }
    if let Some(v) = params.get("window") {
        anomaly.window = at_least("window", v, 3)?;
    }
    if let Some(v) = params.get("contamination") {
        let c = param_f64("contamination", v)?;
        if !(c > 0.0 && c <= 0.5) {
            return Err(ConfigurationError::invalid("contamination", "must be in (0, 0.5]"));
        }
        anomaly.contamination = c;
    }
    if let Some(v) = params.get("clean_outliers") {
        anomaly.clean_outliers = param_bool("clean_outliers", v)?;
    }
    Ok(anomaly)
}

fn evaluation_parameters(
    params: &Map<String, Value>,
    config: &PipelineConfig,
) -> ParamResult<(EvaluationParameters, Vec<Warning>)> {
    let specs = match params.get("models") {
        Some(v) => ModelSpec::parse_list(v)?,
        None => config
            .evaluation
            .models
            .iter()
            .map(ModelSpec::named)
            .collect(),
    };

    let mut models = Vec::with_capacity(specs.len());
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    for spec in &specs {
        let (model, model_warnings) = spec.resolve()?;
        if !seen.insert(model.kind()) {
            return Err(ConfigurationError::invalid(
                "models",
                format!("model '{}' is listed more than once", model.name()),
            ));
        }
        warnings.extend(model_warnings);
        models.push(model);
    }

    let folds = match params.get("folds") {
        Some(v) => at_least("folds", v, 2)?,
        None => config.evaluation.folds,
    };
    let horizon = match params.get("horizon") {
        Some(v) => at_least("horizon", v, 1)?,
        None => config.evaluation.horizon,
    };

    let mut features = config.features.clone();
    if let Some(v) = params.get("window_sizes") {
        features.window_sizes = param_usize_list("window_sizes", v, 2)?;
    }
    if let Some(v) = params.get("lags") {
        features.lags = param_usize_list("lags", v, 1)?;
    }
    if let Some(v) = params.get("lag_edge") {
        features.lag_edge = param_parse("lag_edge", v)?;
    }
    if let Some(v) = params.get("correlation_threshold") {
        let t = param_f64("correlation_threshold", v)?;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigurationError::invalid("correlation_threshold", "must be in (0, 1]"));
        }
        features.correlation_threshold = t;
    }
    if let Some(v) = params.get("polynomial") {
        features.polynomial = param_bool("polynomial", v)?;
    }
    if let Some(v) = params.get("calendar") {
        features.calendar = param_bool("calendar", v)?;
    }

    Ok((
        EvaluationParameters {
            models,
            folds,
            horizon,
            features,
        },
        warnings,
    ))
}

// ---------------------------------------------------------------------------
// Typed parameter readers, shared with the model hyperparameters
// ---------------------------------------------------------------------------

pub(crate) fn param_u64(name: &str, value: &Value) -> ParamResult<u64> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
        .ok_or_else(|| ConfigurationError::invalid(name, "expected a non-negative integer"))
}

pub(crate) fn param_usize(name: &str, value: &Value) -> ParamResult<usize> {
    usize::try_from(param_u64(name, value)?)
        .map_err(|_| ConfigurationError::invalid(name, "value is too large"))
}

pub(crate) fn param_f64(name: &str, value: &Value) -> ParamResult<f64> {
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| ConfigurationError::invalid(name, "expected a finite number"))
}

fn param_bool(name: &str, value: &Value) -> ParamResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ConfigurationError::invalid(name, "expected true or false"))
}

fn param_parse<T: FromStr<Err = String>>(name: &str, value: &Value) -> ParamResult<T> {
    let s = value
        .as_str()
        .ok_or_else(|| ConfigurationError::invalid(name, "expected a string"))?;
    s.parse().map_err(|e: String| ConfigurationError::invalid(name, e))
}

fn at_least(name: &str, value: &Value, min: usize) -> ParamResult<usize> {
    let v = param_usize(name, value)?;
    if v < min {
        return Err(ConfigurationError::invalid(name, format!("must be at least {}", min)));
    }
    Ok(v)
}

fn positive(name: &str, value: &Value) -> ParamResult<f64> {
    let v = param_f64(name, value)?;
    if v <= 0.0 {
        return Err(ConfigurationError::invalid(name, "must be positive"));
    }
    Ok(v)
}

/// A single integer or an array of them, each at least `min`.
/// Returned sorted and deduplicated.
fn param_usize_list(name: &str, value: &Value, min: usize) -> ParamResult<Vec<usize>> {
    let mut list = match value {
        Value::Array(items) => items
            .iter()
            .map(|v| at_least(name, v, min))
            .collect::<ParamResult<Vec<usize>>>()?,
        v => vec![at_least(name, v, min)?],
    };
    list.sort_unstable();
    list.dedup();
    Ok(list)
}
