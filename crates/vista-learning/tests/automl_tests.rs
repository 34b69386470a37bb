//! Integration tests for the AutoML engine.
//!
//! These tests exercise both backends through the public API and check that
//! they are interchangeable from the caller's point of view.

use polars::prelude::*;
use pretty_assertions::assert_eq;
use vista_learning::{
    AutoMl, AutoMlConfig, AutoMlOutcome, CancellationToken, LearningError, LinearBaseline,
    ModelBackend, ModelResult, ProblemType, TrainingSet,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn sales_frame(n: usize) -> DataFrame {
    let regions = ["North", "South", "East"];
    let region: Vec<&str> = (0..n).map(|i| regions[i % 3]).collect();
    let units: Vec<f64> = (0..n).map(|i| (10 + (i * 7) % 23) as f64).collect();
    let discount: Vec<f64> = (0..n).map(|i| ((i * 3) % 5) as f64 * 0.05).collect();
    let revenue: Vec<f64> = (0..n)
        .map(|i| {
            let base = match i % 3 {
                0 => 100.0,
                1 => 60.0,
                _ => 80.0,
            };
            base + units[i] * 4.0 - discount[i] * 50.0
        })
        .collect();
    df!(
        "region" => region,
        "units" => units,
        "discount" => discount,
        "revenue" => revenue
    )
    .unwrap()
}

fn churn_frame(n: usize) -> DataFrame {
    let tenure: Vec<f64> = (0..n).map(|i| (i % 48) as f64).collect();
    let spend: Vec<f64> = (0..n).map(|i| 20.0 + ((i * 11) % 30) as f64).collect();
    let churned: Vec<bool> = tenure.iter().map(|t| *t < 12.0).collect();
    df!("tenure" => tenure, "spend" => spend, "churned" => churned).unwrap()
}

fn metric_keys(result: &ModelResult) -> Vec<String> {
    let value = serde_json::to_value(&result.metrics).unwrap();
    let mut keys: Vec<String> = value
        .as_object()
        .unwrap()
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| k.clone())
        .collect();
    keys.sort();
    keys
}

fn trained(outcome: AutoMlOutcome) -> ModelResult {
    match outcome {
        AutoMlOutcome::Trained(result) => result,
        other => panic!("expected a trained model, got {other:?}"),
    }
}

/// A backend that always fails, to exercise the fallback path.
struct Broken;

impl ModelBackend for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn fit(&self, _data: &TrainingSet, _token: &CancellationToken) -> vista_learning::Result<ModelResult> {
        Err(LearningError::TrainingFailed("solver diverged".to_string()))
    }
}

// ============================================================================
// Backend Parity
// ============================================================================

#[test]
fn test_regression_backends_share_metric_keys() {
    let df = sales_frame(90);

    let baseline = AutoMl::new(AutoMlConfig::builder().prefer_advanced(false).build().unwrap())
        .unwrap();
    let base = trained(baseline.run(&df, Some("revenue"), &CancellationToken::new()).unwrap());
    assert_eq!(base.backend, "linear_baseline");
    assert_eq!(base.task_type, ProblemType::Regression);
    assert!(base.metrics.r2.unwrap() > 0.9);

    let default = AutoMl::new(AutoMlConfig::default()).unwrap();
    let other = trained(default.run(&df, Some("revenue"), &CancellationToken::new()).unwrap());
    assert_eq!(metric_keys(&base), metric_keys(&other));
    assert_eq!(
        metric_keys(&base),
        vec!["mae", "mse", "r2", "rmse", "test_score", "train_score"]
    );
}

#[test]
fn test_classification_backends_share_metric_keys() {
    let df = churn_frame(96);

    let baseline = AutoMl::new(AutoMlConfig::builder().prefer_advanced(false).build().unwrap())
        .unwrap();
    let base = trained(baseline.run(&df, Some("churned"), &CancellationToken::new()).unwrap());
    assert_eq!(base.task_type, ProblemType::Classification);
    assert_eq!(base.classes, vec!["false".to_string(), "true".to_string()]);

    let default = AutoMl::new(AutoMlConfig::default()).unwrap();
    let other = trained(default.run(&df, Some("churned"), &CancellationToken::new()).unwrap());
    assert_eq!(metric_keys(&base), metric_keys(&other));
    assert!(metric_keys(&base).contains(&"roc_auc".to_string()));
}

#[test]
fn test_importances_cover_source_columns() {
    let df = sales_frame(90);
    let engine = AutoMl::new(AutoMlConfig::builder().prefer_advanced(false).build().unwrap())
        .unwrap();
    let result = trained(engine.run(&df, Some("revenue"), &CancellationToken::new()).unwrap());

    let mut names: Vec<&str> = result
        .feature_importances
        .iter()
        .map(|f| f.feature.as_str())
        .collect();
    names.sort();
    assert_eq!(names, vec!["discount", "region", "units"]);
    assert_eq!(result.feature_importances[0].feature, "units");
}

// ============================================================================
// Skips, Errors and Fallback
// ============================================================================

#[test]
fn test_skip_without_target() {
    let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
    let outcome = engine
        .run(&sales_frame(30), None, &CancellationToken::new())
        .unwrap();
    assert!(outcome.model().is_none());
}

#[test]
fn test_skip_when_too_few_rows() {
    let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
    let outcome = engine
        .run(&sales_frame(8), Some("revenue"), &CancellationToken::new())
        .unwrap();
    assert!(matches!(outcome, AutoMlOutcome::Skipped { .. }));
}

#[test]
fn test_failing_backend_falls_back_to_baseline() {
    let config = AutoMlConfig::default();
    let engine = AutoMl::with_backend(config, Box::new(Broken)).unwrap();
    assert_eq!(engine.backend_name(), "broken");

    let result = trained(
        engine
            .run(&sales_frame(60), Some("revenue"), &CancellationToken::new())
            .unwrap(),
    );
    assert_eq!(result.backend, "linear_baseline");
    assert!(result.warnings.iter().any(|w| w.contains("solver diverged")));
}

#[test]
fn test_cancellation_is_not_swallowed() {
    let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let err = engine.run(&sales_frame(60), Some("revenue"), &token).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_baseline_backend_directly() {
    let config = AutoMlConfig::default();
    let data = TrainingSet::from_dataframe(&sales_frame(45), "revenue", &config).unwrap();
    let result = LinearBaseline::new(config)
        .fit(&data, &CancellationToken::new())
        .unwrap();
    assert_eq!(result.train_rows + result.test_rows, 45);
}
