//! Request orchestration.
//!
//! One run: resolve parameters → validate → clean → summarize → normalize
//! → the requested analysis → assemble. Validation and configuration
//! errors reject the request; any later error becomes a failed section
//! of an otherwise complete result.
//!
//! `Pipeline` only holds its configuration, so one instance can serve
//! concurrent runs.

use chrono::Utc;

use crate::analysis::stats::SummaryStats;
use crate::analysis::{anomaly, trend};
use crate::budget::Budget;
use crate::cache::{CacheKey, ResultCache, fingerprint};
use crate::clean::{self, CleanedSeries};
use crate::config::PipelineConfig;
use crate::error::{ConfigurationError, ImputationError, ModelFitError, PipelineError, Result};
use crate::evaluate::{self, FoldOutcome};
use crate::features;
use crate::logging::{self, Stage};
use crate::model::{Dataset, Warning, WarningKind};
use crate::models::FittedModel;
use crate::normalize::{self, ScalingParams};
use crate::request::{
    self, AnalysisParameters, AnalysisRequest, AnalysisType, EvaluationParameters, ResolvedRequest,
};
use crate::result::{AnalysisResult, DatasetDescriptor, EvaluationReport, Forecast, Section};
use crate::validate::{self, ValidatedDataset};

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one analysis over `dataset`.
    pub fn run(&self, dataset: &Dataset, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let resolved = request::resolve(request, &self.config)?;
        self.execute(dataset, resolved)
    }

    /// Like `run`, but answers from `cache` when the same dataset and
    /// resolved parameters were seen before. Results with a timed-out
    /// section are not stored.
    pub fn run_cached(
        &self,
        dataset: &Dataset,
        request: &AnalysisRequest,
        cache: &dyn ResultCache,
    ) -> Result<AnalysisResult> {
        let resolved = request::resolve(request, &self.config)?;
        let key = CacheKey::new(dataset, resolved.analysis_type, &resolved.parameters);
        if let Some(hit) = cache.get(&key) {
            logging::debug(
                Stage::System,
                Some(dataset.source()),
                &format!("cache hit for {} analysis", key.analysis_type),
            );
            return Ok(hit);
        }
        let result = self.execute(dataset, resolved)?;
        if !timed_out(&result) {
            cache.put(key, result.clone());
        }
        Ok(result)
    }

    fn execute(&self, dataset: &Dataset, resolved: ResolvedRequest) -> Result<AnalysisResult> {
        let ResolvedRequest {
            analysis_type,
            parameters,
            mut warnings,
        } = resolved;
        let source = dataset.source();
        let budget = Budget::new(parameters.timeout_ms);

        logging::info(
            Stage::Validate,
            Some(source),
            &format!("{} analysis over {} points", analysis_type, dataset.len()),
        );
        let validated = validate::validate(dataset, &parameters.validation)?;

        let mut result = AnalysisResult {
            analysis_type,
            parameters: parameters.clone(),
            created_at: Utc::now(),
            dataset: DatasetDescriptor::describe(dataset, fingerprint(dataset)),
            cleaning: None,
            normalization: None,
            summary: None,
            evaluation: Section::NotRequested,
            anomalies: Section::NotRequested,
            trend: Section::NotRequested,
            warnings: Vec::new(),
        };

        if let Err(err) = analyze(&validated, analysis_type, &parameters, &budget, &mut result, &mut warnings) {
            if err.is_fatal() {
                return Err(err);
            }
            logging::error(
                stage_for(analysis_type),
                Some(source),
                &format!("{} analysis failed: {}", analysis_type, err),
            );
            match analysis_type {
                AnalysisType::Trend => result.trend = Section::failed(&err),
                AnalysisType::Anomaly => result.anomalies = Section::failed(&err),
                AnalysisType::ModelEval => result.evaluation = Section::failed(&err),
            }
        }

        for warning in &warnings {
            logging::warn(Stage::Assemble, Some(source), &warning.to_string());
        }
        logging::info(
            Stage::Assemble,
            Some(source),
            &format!(
                "{} analysis {} with {} warnings",
                analysis_type,
                if result.succeeded() { "completed" } else { "failed" },
                warnings.len()
            ),
        );
        result.warnings = warnings;
        Ok(result)
    }
}

fn analyze(
    validated: &ValidatedDataset<'_>,
    analysis_type: AnalysisType,
    parameters: &AnalysisParameters,
    budget: &Budget,
    result: &mut AnalysisResult,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let source = validated.source();

    let (series, report) = clean::clean(validated, &parameters.outlier_policy, parameters.imputation)?;
    if report.dropped > 0 {
        warnings.push(Warning::new(
            WarningKind::DroppedOutliers,
            format!("{} outlier points removed from the series", report.dropped),
        ));
    }
    logging::info(
        Stage::Clean,
        Some(source),
        &format!(
            "{} points: {} missing, {} outliers, {} imputed",
            report.input_points, report.missing, report.outliers, report.imputed
        ),
    );
    result.cleaning = Some(report);
    result.summary = SummaryStats::compute(series.values());
    budget.check("clean")?;

    let normalized = normalize::normalize(series.values(), parameters.normalization);
    warnings.extend(normalized.warning());
    logging::debug(
        Stage::Normalize,
        Some(source),
        &format!("{} normalization, constant: {}", parameters.normalization, normalized.constant),
    );
    result.normalization = Some(normalized.params);
    let scaling = normalized.params;
    let series = match normalized.values.iter().position(|v| !v.is_finite()) {
        Some(index) => return Err(ImputationError::NonFiniteResult { index }.into()),
        None => series.with_values(normalized.values).unwrap_or(series),
    };
    budget.check("normalize")?;

    match analysis_type {
        AnalysisType::Trend => {
            let config = parameters.trend.clone().unwrap_or_default();
            let report = trend::detect(&series, &config);
            logging::info(
                Stage::Trend,
                Some(source),
                &format!(
                    "overall slope {:.4} ({}), {} segments, {} change points",
                    report.overall.slope,
                    report.overall.direction,
                    report.segments.len(),
                    report.change_points.len()
                ),
            );
            result.trend = Section::Completed { result: report };
        }
        AnalysisType::Anomaly => {
            let config = parameters.anomaly.clone().unwrap_or_default();
            let report = anomaly::detect(&series, &config);
            logging::info(
                Stage::Anomaly,
                Some(source),
                &format!(
                    "{} of {} points flagged ({:.1}%)",
                    report.flagged_count,
                    report.flags.len(),
                    report.flagged_percentage
                ),
            );
            result.anomalies = Section::Completed { result: report };
        }
        AnalysisType::ModelEval => {
            let evaluation = parameters.evaluation.as_ref().ok_or_else(|| {
                ConfigurationError::invalid("evaluation", "model-eval parameters were not resolved")
            })?;
            let report = evaluate_models(&series, evaluation, &scaling, budget, warnings)?;
            result.evaluation = Section::Completed { result: report };
        }
    }
    Ok(())
}

/// Build features, cross-validate every requested model, then refit the
/// best one on all training rows for a forecast.
fn evaluate_models(
    series: &CleanedSeries,
    evaluation: &EvaluationParameters,
    scaling: &ScalingParams,
    budget: &Budget,
    warnings: &mut Vec<Warning>,
) -> Result<EvaluationReport> {
    let (matrix, feature_warnings) = features::build(series, &evaluation.features);
    warnings.extend(feature_warnings);
    budget.check("features")?;

    // Row r predicts the series value `horizon` steps after it, so the
    // last `horizon` rows have no target.
    let horizon = evaluation.horizon.max(1);
    let training_rows = matrix.n_rows().saturating_sub(horizon);
    if training_rows < evaluation.folds {
        return Err(ModelFitError::InsufficientRows {
            required: evaluation.folds,
            actual: training_rows,
        }
        .into());
    }
    let values = series.values();
    let offset = matrix.offset();
    let target: Vec<f64> = (0..training_rows)
        .map(|r| values[offset + r + horizon])
        .collect();
    let training = matrix.head(training_rows);

    let comparison = evaluate::compare_models(
        &training,
        &target,
        &evaluation.models,
        evaluation.folds,
        budget,
    )?;
    for model in &comparison.evaluations {
        for fold in &model.folds {
            if let FoldOutcome::Failed { error_kind, message } = &fold.outcome {
                warnings.push(Warning::new(
                    WarningKind::FoldFailed,
                    format!("{} fold {} failed ({}): {}", model.model, fold.fold, error_kind, message),
                ));
            }
        }
    }

    let best = comparison
        .best()
        .ok_or(PipelineError::ModelFit(ModelFitError::NoCompletedFolds))?;
    let last = matrix.n_rows() - 1;
    let forecast = match best.config.fit(&training.rows(), &target, budget) {
        Ok(model) => Some(Forecast {
            model: best.model.clone(),
            horizon,
            based_on: matrix.timestamps()[last],
            value: scaling.denormalize_value(model.predict_row(&matrix.row(last))),
        }),
        Err(PipelineError::ModelFit(err)) => {
            logging::warn(
                Stage::Evaluate,
                None,
                &format!("refit of {} for the forecast failed: {}", best.model, err),
            );
            None
        }
        Err(other) => return Err(other),
    };

    Ok(EvaluationReport {
        features: matrix.names().into_iter().map(String::from).collect(),
        rows: training_rows,
        offset,
        horizon,
        forecast,
        comparison,
    })
}

fn stage_for(analysis_type: AnalysisType) -> Stage {
    match analysis_type {
        AnalysisType::Trend => Stage::Trend,
        AnalysisType::Anomaly => Stage::Anomaly,
        AnalysisType::ModelEval => Stage::Evaluate,
    }
}

fn timed_out(result: &AnalysisResult) -> bool {
    [
        section_error_kind(&result.trend),
        section_error_kind(&result.anomalies),
        section_error_kind(&result.evaluation),
    ]
    .contains(&Some("timeout_error"))
}

fn section_error_kind<T>(section: &Section<T>) -> Option<&str> {
    match section {
        Section::Failed { error_kind, .. } => Some(error_kind.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::DataPoint;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn dataset(values: Vec<Option<f64>>) -> Dataset {
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let ts = start + Duration::days(i as i64);
                match v {
                    Some(v) => DataPoint::new(ts, v),
                    None => DataPoint::missing(ts),
                }
            })
            .collect();
        Dataset::new("gauge-12", "daily mean temperature", points)
    }

    fn seasonal(n: usize) -> Dataset {
        dataset(
            (0..n)
                .map(|i| Some(15.0 + 8.0 * (i as f64 * 0.3).sin() + 0.05 * i as f64))
                .collect(),
        )
    }

    #[test]
    fn test_trend_run_fills_only_trend_section() {
        let result = Pipeline::default()
            .run(&seasonal(60), &AnalysisRequest::new("trend"))
            .unwrap();
        assert!(result.succeeded());
        assert!(result.trend.completed().is_some());
        assert_eq!(result.anomalies, Section::NotRequested);
        assert_eq!(result.evaluation, Section::NotRequested);
        assert_eq!(result.summary.as_ref().map(|s| s.count), Some(60));
        assert_eq!(result.normalization, Some(ScalingParams::Identity));
    }

    #[test]
    fn test_validation_errors_reject_the_request() {
        let err = Pipeline::default()
            .run(&dataset(vec![]), &AnalysisRequest::new("anomaly"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_configuration_errors_reject_the_request() {
        let err = Pipeline::default()
            .run(&seasonal(10), &AnalysisRequest::new("clustering"))
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::Configuration(ConfigurationError::UnknownAnalysisType("clustering".into()))
        );
    }

    #[test]
    fn test_unimputable_series_fails_the_section() {
        let result = Pipeline::default()
            .run(&dataset(vec![None, None, None, None]), &AnalysisRequest::new("trend"))
            .unwrap();
        assert!(!result.succeeded());
        match &result.trend {
            Section::Failed { error_kind, .. } => assert_eq!(error_kind, "imputation_error"),
            other => panic!("expected failed section, got {:?}", other),
        }
    }

    #[test]
    fn test_model_eval_too_short_fails_the_section() {
        let result = Pipeline::default()
            .run(&seasonal(6), &AnalysisRequest::new("model-eval"))
            .unwrap();
        match &result.evaluation {
            Section::Failed { error_kind, .. } => assert_eq!(error_kind, "model_fit_error"),
            other => panic!("expected failed section, got {:?}", other),
        }
    }

    #[test]
    fn test_model_eval_reports_forecast_in_original_units() {
        let request = AnalysisRequest::new("model-eval")
            .with_param("models", json!([{"name": "rf", "params": {"n_trees": 20}}]));
        let result = Pipeline::default().run(&seasonal(80), &request).unwrap();
        let report = result.evaluation.completed().unwrap();
        assert_eq!(report.comparison.best_model.as_deref(), Some("random_forest"));
        assert_eq!(report.rows, 80 - 3 - 1);
        let forecast = report.forecast.as_ref().unwrap();
        assert!(forecast.value > 0.0 && forecast.value < 30.0, "{}", forecast.value);
        assert!(report.features.iter().any(|f| f == "value"));
    }

    #[test]
    fn test_run_cached_reuses_results() {
        let cache = InMemoryCache::new();
        let pipeline = Pipeline::default();
        let data = seasonal(30);
        let request = AnalysisRequest::new("anomaly");
        let first = pipeline.run_cached(&data, &request, &cache).unwrap();
        let second = pipeline.run_cached(&data, &request, &cache).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(first.created_at, second.created_at);

        let other = request.clone().with_param("sensitivity", 2.0);
        pipeline.run_cached(&data, &other, &cache).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_exhausted_budget_fails_the_section_and_skips_the_cache() {
        let config = PipelineConfig {
            timeout_ms: Some(0),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config);
        let cache = InMemoryCache::new();
        let data = seasonal(80);

        let result = pipeline
            .run_cached(&data, &AnalysisRequest::new("model-eval"), &cache)
            .unwrap();
        match &result.evaluation {
            Section::Failed { error_kind, .. } => assert_eq!(error_kind, "timeout_error"),
            other => panic!("expected failed section, got {:?}", other),
        }
        assert!(!result.succeeded());
        assert!(cache.is_empty());
    }
}
