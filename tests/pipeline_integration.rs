//! End-to-end tests through the public API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use climate_pipeline::analysis::trend::Direction;
use climate_pipeline::budget::Budget;
use climate_pipeline::clean::{self, ImputationPolicy, OutlierPolicy};
use climate_pipeline::error::ValidationError;
use climate_pipeline::evaluate::{self, FoldOutcome};
use climate_pipeline::features::{self, FeatureConfig, FeatureMatrix};
use climate_pipeline::models::{BoostingParams, ModelConfig};
use climate_pipeline::normalize::{self, NormalizeMethod};
use climate_pipeline::validate::{self, Requirements};
use climate_pipeline::{
    AnalysisRequest, AnalysisType, DataPoint, Dataset, Pipeline, PipelineError, Section,
    WarningKind,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
}

fn hourly(values: &[Option<f64>]) -> Dataset {
    let points = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let ts = start() + Duration::hours(i as i64);
            match v {
                Some(v) => DataPoint::new(ts, *v),
                None => DataPoint::missing(ts),
            }
        })
        .collect();
    Dataset::new("station-a", "air temperature", points)
}

fn known(values: &[f64]) -> Dataset {
    hourly(&values.iter().map(|v| Some(*v)).collect::<Vec<_>>())
}

/// Deterministic, |noise(i)| < 0.01.
fn noise(i: usize) -> f64 {
    ((i * 29 % 13) as f64 / 13.0 - 0.5) * 0.019
}

// ---------------------------------------------------------------------------
// Validation and cleaning
// ---------------------------------------------------------------------------

#[test]
fn test_empty_dataset_is_insufficient_data() {
    let err = Pipeline::default()
        .run(&known(&[]), &AnalysisRequest::new("trend"))
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::Validation(ValidationError::InsufficientData {
            required: 3,
            actual: 0
        })
    );
}

#[test]
fn test_duplicate_timestamps_are_rejected() {
    let ts = start();
    let dataset = Dataset::new(
        "station-a",
        "",
        vec![
            DataPoint::new(ts, 1.0),
            DataPoint::new(ts + Duration::hours(1), 2.0),
            DataPoint::new(ts, 3.0),
        ],
    );
    let err = Pipeline::default()
        .run(&dataset, &AnalysisRequest::new("anomaly"))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::DuplicateTimestamp { .. })
    ));
}

#[test]
fn test_mean_imputation_fills_two_gaps() {
    let values = [
        Some(1.0),
        Some(2.0),
        None,
        Some(3.0),
        Some(4.0),
        Some(5.0),
        None,
        Some(6.0),
        Some(7.0),
        Some(8.0),
    ];
    let dataset = hourly(&values);
    let validated = validate::validate(&dataset, &Requirements::default()).unwrap();
    let (series, report) =
        clean::clean(&validated, &OutlierPolicy::default(), ImputationPolicy::Mean).unwrap();

    assert_eq!(series.len(), 10);
    assert!(series.values().iter().all(|v| v.is_finite()));
    assert_eq!(report.missing, 2);
    assert_eq!(report.imputed, 2);
    assert_eq!(series.values()[2], 4.5);
    assert_eq!(series.values()[6], 4.5);
    assert!(series.imputed()[2] && series.imputed()[6]);
}

#[test]
fn test_clean_output_is_always_finite() {
    let values = [
        Some(1.0),
        Some(f64::NAN),
        Some(f64::INFINITY),
        None,
        Some(1e308),
        Some(-1e308),
        Some(2.0),
        Some(3.0),
    ];
    let dataset = hourly(&values);
    let validated = validate::validate(&dataset, &Requirements::default()).unwrap();
    for policy in [
        ImputationPolicy::Mean,
        ImputationPolicy::Median,
        ImputationPolicy::ForwardFill,
        ImputationPolicy::LinearInterpolate,
    ] {
        for outliers in [OutlierPolicy::default(), OutlierPolicy::disabled()] {
            let (series, _) = clean::clean(&validated, &outliers, policy).unwrap();
            assert!(
                series.values().iter().all(|v| v.is_finite()),
                "{} produced {:?}",
                policy,
                series.values()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization and features
// ---------------------------------------------------------------------------

#[test]
fn test_normalization_ranges() {
    let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.4).sin() * 12.0 + 3.0).collect();

    let minmax = normalize::normalize(&values, NormalizeMethod::MinMax);
    assert!(minmax.values.iter().all(|v| (0.0..=1.0).contains(v)));

    let z = normalize::normalize(&values, NormalizeMethod::ZScore);
    let n = z.values.len() as f64;
    let mean = z.values.iter().sum::<f64>() / n;
    let var = z.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    assert!(mean.abs() < 1e-9);
    assert!((var - 1.0).abs() < 1e-9);

    let restored = z.denormalize(&z.values);
    for (a, b) in restored.iter().zip(&values) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_constant_series_normalizes_to_zero_with_warning() {
    let flat = normalize::normalize(&[4.0; 10], NormalizeMethod::MinMax);
    assert!(flat.values.iter().all(|v| *v == 0.0));
    assert_eq!(flat.warning().map(|w| w.kind), Some(WarningKind::ConstantSeries));
}

#[test]
fn test_feature_pruning_is_deterministic() {
    let dataset = known(&(0..120).map(|i| (i as f64 * 0.21).sin() * 4.0 + noise(i)).collect::<Vec<_>>());
    let validated = validate::validate(&dataset, &Requirements::default()).unwrap();
    let (series, _) =
        clean::clean(&validated, &OutlierPolicy::default(), ImputationPolicy::Mean).unwrap();
    let config = FeatureConfig {
        polynomial: true,
        ..FeatureConfig::default()
    };

    let (a, _) = features::build(&series, &config);
    let (b, _) = features::build(&series, &config);
    assert_eq!(a.names(), b.names());
    assert_eq!(a.names()[0], "value");
}

// ---------------------------------------------------------------------------
// Model evaluation
// ---------------------------------------------------------------------------

#[test]
fn test_five_folds_with_one_degenerate() {
    let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
    // Holding out rows 0..20 leaves a constant training target.
    let target: Vec<f64> = (0..100).map(|i| if i < 20 { i as f64 } else { 7.0 }).collect();
    let matrix = FeatureMatrix::from_columns(vec![("x".to_string(), x)]).unwrap();
    let model = ModelConfig::GradientBoosting(BoostingParams {
        n_estimators: 20,
        ..BoostingParams::default()
    });

    let eval = evaluate::evaluate(&matrix, &target, &model, 5, &Budget::unlimited()).unwrap();
    assert_eq!(eval.folds.len(), 5);
    assert_eq!(eval.failed_folds(), 1);
    assert!(matches!(eval.folds[0].outcome, FoldOutcome::Failed { .. }));
    let aggregate = eval.aggregate.unwrap();
    assert_eq!(aggregate.completed_folds, 4);
    assert_eq!(aggregate.failed_folds, 1);
}

#[test]
fn test_model_eval_run_compares_requested_models() {
    let values: Vec<f64> = (0..90)
        .map(|i| 10.0 + 5.0 * (i as f64 * 0.26).sin() + noise(i))
        .collect();
    let request = AnalysisRequest::new("model-eval")
        .with_param("models", json!([
            {"name": "rf", "params": {"n_trees": 15}},
            {"name": "gb", "params": {"n_estimators": 30}}
        ]))
        .with_param("folds", 3);
    let result = Pipeline::default().run(&known(&values), &request).unwrap();

    let report = result.evaluation.completed().expect("evaluation should complete");
    assert_eq!(report.comparison.folds, 3);
    assert_eq!(report.comparison.evaluations.len(), 2);
    assert!(report.comparison.best_model.is_some());
    for evaluation in &report.comparison.evaluations {
        let total: f64 = evaluation.feature_importance.values().sum();
        assert!((total - 1.0).abs() < 1e-6 || total == 0.0);
    }
    assert!(report.forecast.is_some());
}

// ---------------------------------------------------------------------------
// Anomaly and trend
// ---------------------------------------------------------------------------

#[test]
fn test_hundredfold_spike_is_flagged() {
    let mut values = vec![12.0; 50];
    values[31] = 1200.0;
    let result = Pipeline::default()
        .run(&known(&values), &AnalysisRequest::new("anomaly"))
        .unwrap();

    let report = result.anomalies.completed().unwrap();
    assert_eq!(report.flags.len(), 50);
    assert!(report.flags[31].flagged);
    assert_eq!(report.flagged_count, 1);
    assert_eq!(report.flags[31].value, 1200.0);
}

#[test]
fn test_linear_trend_slope_within_five_percent() {
    let values: Vec<f64> = (0..20).map(|t| 2.0 * t as f64 + noise(t)).collect();
    let result = Pipeline::default()
        .run(&known(&values), &AnalysisRequest::new("trend"))
        .unwrap();

    let report = result.trend.completed().unwrap();
    let slope = report.overall.slope;
    assert!((slope - 2.0).abs() < 0.1, "slope {}", slope);
    assert_eq!(report.overall.direction, Direction::Increasing);
}

// ---------------------------------------------------------------------------
// Result shape
// ---------------------------------------------------------------------------

#[test]
fn test_result_json_has_every_section() {
    let values: Vec<f64> = (0..30).map(|i| i as f64 % 7.0).collect();
    let result = Pipeline::default()
        .run(
            &known(&values),
            &AnalysisRequest::new("trend").with_param("mystery", 1),
        )
        .unwrap();
    assert_eq!(result.analysis_type, AnalysisType::Trend);

    let value = serde_json::to_value(&result).unwrap();
    for key in [
        "analysis_type",
        "parameters",
        "created_at",
        "dataset",
        "cleaning",
        "normalization",
        "summary",
        "evaluation",
        "anomalies",
        "trend",
        "warnings",
    ] {
        assert!(value.get(key).is_some(), "missing key {}", key);
    }
    assert_eq!(value["analysis_type"], "trend");
    assert_eq!(value["trend"]["status"], "completed");
    assert_eq!(value["anomalies"]["status"], "not_requested");
    assert_eq!(value["evaluation"]["status"], "not_requested");
    assert_eq!(value["warnings"][0]["kind"], "unknown_parameter");
    assert_eq!(value["dataset"]["points"], 30);
    assert_eq!(value["dataset"]["fingerprint"].as_str().map(str::len), Some(64));
}

#[test]
fn test_pipeline_is_shareable_across_threads() {
    let pipeline = Pipeline::default();
    let dataset = known(&(0..40).map(|i| (i as f64 * 0.5).cos()).collect::<Vec<_>>());
    std::thread::scope(|scope| {
        let handles: Vec<_> = ["trend", "anomaly", "trend"]
            .into_iter()
            .map(|kind| {
                let pipeline = &pipeline;
                let dataset = &dataset;
                scope.spawn(move || pipeline.run(dataset, &AnalysisRequest::new(kind)))
            })
            .collect();
        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            assert!(result.succeeded());
        }
    });
    assert!(matches!(
        Pipeline::default()
            .run(&dataset, &AnalysisRequest::new("trend"))
            .unwrap()
            .evaluation,
        Section::NotRequested
    ));
}
