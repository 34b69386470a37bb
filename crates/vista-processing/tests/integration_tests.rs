//! Integration tests for the analytics pipeline.
//!
//! These tests drive whole runs through the public API and check the
//! produced artifacts.

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use vista_processing::dashboard::DashboardInput;
use vista_processing::{
    CancellationToken, ChartKind, DashboardGenerator, InferredType, IssueKind, Pipeline,
    PipelineConfig, PipelineStage, RunStatus, Severity, Theme, ValidationThresholds,
};
use vista_learning::ProblemType;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn sales_config(output_dir: &TempDir) -> PipelineConfig {
    PipelineConfig::builder()
        .target_column("revenue")
        .time_column("date")
        .business_context("regional revenue")
        .output_dir(output_dir.path())
        .random_seed(7)
        .build()
        .unwrap()
}

fn in_memory() -> PipelineConfig {
    PipelineConfig::builder().save_to_disk(false).build().unwrap()
}

fn measurements_csv(rows: usize) -> String {
    let mut text = String::from("width,height,weight,label\n");
    for i in 0..rows {
        let width = 10.0 + i as f64 * 0.5;
        let height = 3.0 + ((i * 7) % 11) as f64;
        let weight = width * 2.0 + height + (i % 3) as f64;
        let label = ["small", "medium", "large"][i % 3];
        text.push_str(&format!("{},{},{},{}\n", width, height, weight, label));
    }
    text
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[test]
fn test_sales_happy_path() {
    let dir = TempDir::new().unwrap();
    let outcome = Pipeline::builder()
        .config(sales_config(&dir))
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    let type_of = |name: &str| {
        outcome
            .schemas
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.inferred_type)
    };
    assert_eq!(type_of("date"), Some(InferredType::Datetime));
    assert_eq!(type_of("region"), Some(InferredType::Categorical));
    assert_eq!(type_of("revenue"), Some(InferredType::Numeric));

    let model = outcome.analysis.model().expect("model should be trained");
    assert_eq!(model.task_type, ProblemType::Regression);
    assert_eq!(model.target, "revenue");
    let r2 = model.metrics.r2.expect("regression reports r2");
    assert!(r2 != 0.0, "r2 should be nonzero, got {}", r2);

    let spec = &outcome.dashboard.spec;
    assert!(spec.has_chart(ChartKind::TimeSeries));
    assert!(
        spec.charts_of(ChartKind::Bar)
            .any(|c| c.binding.columns == vec!["region".to_string()]),
        "expected a bar chart over region"
    );

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.current_stage, PipelineStage::Completed);
    assert_eq!(outcome.summary.status, RunStatus::Completed);
    assert!(outcome.analysis.patterns.trends.is_completed());
}

#[test]
fn test_sales_writes_output_bundle() {
    let dir = TempDir::new().unwrap();
    let outcome = Pipeline::builder()
        .config(sales_config(&dir))
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    for name in ["dashboard.html", "insights_report.md", "run_summary.json"] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    assert!(!dir.path().join("cleaned_data.csv").exists());
    assert_eq!(outcome.outputs.len(), 3);

    let html = std::fs::read_to_string(dir.path().join("dashboard.html")).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert_eq!(html, outcome.dashboard.html);

    let report = std::fs::read_to_string(dir.path().join("insights_report.md")).unwrap();
    assert!(report.contains("Key findings"));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("run_summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["run_id"], outcome.run.id.as_str());
    assert_eq!(summary["dataset"]["rows_before"], 60);
}

#[test]
fn test_csv_export_writes_cleaned_data() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::builder()
        .output_dir(dir.path())
        .export_formats(vec![vista_processing::ExportFormat::Csv])
        .build()
        .unwrap();
    let outcome = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    let written = std::fs::read_to_string(dir.path().join("cleaned_data.csv")).unwrap();
    assert!(written.starts_with("date,region,revenue"));
    assert_eq!(written.lines().count(), outcome.cleaned.height() + 1);
    assert!(!dir.path().join("run_summary.json").exists());
}

#[test]
fn test_missing_target_skips_automl() {
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    assert_eq!(outcome.analysis.model.status(), "skipped");
    assert_eq!(outcome.analysis.model.reason(), Some("no target provided"));
    assert_eq!(outcome.run.status, RunStatus::Completed);

    let automl = outcome.summary.section("automl").unwrap();
    assert_eq!(automl.status, "skipped");
    assert!(outcome.report_markdown.contains("no target provided"));
}

#[test]
fn test_sparse_target_is_not_imputed_before_training() {
    let mut text = String::from("x1,x2,y\n");
    for i in 0..40 {
        let y = if i % 4 == 0 { format!("{}", i * 3 + 1) } else { String::new() };
        text.push_str(&format!("{},{},{}\n", i, (i * 7) % 13, y));
    }
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .target_column("y")
        .build()
        .unwrap();
    let outcome = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run_bytes("sparse_target.csv", text.as_bytes())
        .unwrap();

    // 10 observed labels are too few to train on; the 30 gaps must not be
    // filled with the median and passed off as labels
    assert_eq!(outcome.cleaned.column("y").unwrap().null_count(), 30);
    assert_eq!(outcome.transformation.steps_for("y").count(), 0);
    assert_eq!(outcome.analysis.model.status(), "skipped");
    assert_eq!(
        outcome.analysis.model.reason(),
        Some("insufficient rows: 10 usable, at least 20 required")
    );
    assert_eq!(outcome.run.status, RunStatus::Completed);
}

#[test]
fn test_no_time_chart_without_time_column() {
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    assert!(!outcome.dashboard.spec.has_chart(ChartKind::TimeSeries));
    assert!(outcome.dashboard.errors.is_empty());
    assert_eq!(outcome.analysis.patterns.trends.status(), "skipped");
}

#[test]
fn test_strict_validation_fails_on_sparse_column() {
    let mut text = String::from("id,sparse\n");
    for i in 0..100 {
        if i < 3 {
            text.push_str(&format!("{},{}\n", i, i * 10));
        } else {
            text.push_str(&format!("{},\n", i));
        }
    }
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .strict_validation(true)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder().config(config).build().unwrap();

    let err = pipeline.run_bytes("sparse.csv", text.as_bytes()).unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert_eq!(err.stage(), Some(PipelineStage::Validate));

    let run = pipeline.registry().latest().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failed_stage(), Some(PipelineStage::Validate));
    assert_eq!(run.error.as_ref().map(|e| e.code.as_str()), Some("VALIDATION_ERROR"));
}

#[test]
fn test_lenient_validation_continues_on_sparse_column() {
    let mut text = String::from("id,sparse\n");
    for i in 0..100 {
        if i < 3 {
            text.push_str(&format!("{},{}\n", i, i * 10));
        } else {
            text.push_str(&format!("{},\n", i));
        }
    }
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("sparse.csv", text.as_bytes())
        .unwrap();

    let finding = outcome
        .validation
        .findings
        .iter()
        .find(|f| f.issue_kind == IssueKind::NullRateExceeded)
        .unwrap();
    assert_eq!(finding.column.as_deref(), Some("sparse"));
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(outcome.run.status, RunStatus::Completed);
}

#[test]
fn test_all_duplicate_rows() {
    let mut text = String::from("store,amount,channel\n");
    for _ in 0..1000 {
        text.push_str("s1,12.5,online\n");
    }
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("dupes.csv", text.as_bytes())
        .unwrap();

    assert_eq!(outcome.validation.duplicate_rows, 999);
    assert_eq!(outcome.transformation.rows_before, 1000);
    assert_eq!(outcome.transformation.rows_after, 1000);
    assert_eq!(outcome.cleaned.height(), 1000);
    assert!(outcome.analysis.statistics().is_some());
    assert_eq!(outcome.run.status, RunStatus::Completed);
}

#[test]
fn test_duplicates_removed_when_enabled() {
    let mut text = String::from("store,amount\n");
    for i in 0..50 {
        text.push_str(&format!("s{},{}\n", i % 5, (i % 5) * 10));
    }
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .remove_duplicates(true)
        .build()
        .unwrap();
    let outcome = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run_bytes("stores.csv", text.as_bytes())
        .unwrap();

    assert_eq!(outcome.validation.duplicate_rows, 45);
    assert_eq!(outcome.cleaned.height(), 5);
    assert_eq!(outcome.transformation.rows_after, 5);
}

// ============================================================================
// Output Properties
// ============================================================================

#[test]
fn test_correlation_matrix_is_symmetric() {
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("measurements.csv", measurements_csv(80).as_bytes())
        .unwrap();

    let matrix = &outcome.analysis.statistics().unwrap().correlations;
    assert_eq!(matrix.columns, vec!["width", "height", "weight"]);
    let n = matrix.columns.len();
    for i in 0..n {
        assert_eq!(matrix.values[i][i], Some(1.0));
        for j in 0..n {
            assert_eq!(matrix.values[i][j], matrix.values[j][i]);
        }
    }
    let width_weight = matrix.get("width", "weight").unwrap();
    assert!(width_weight > 0.9, "got {}", width_weight);
}

#[test]
fn test_insights_sorted_by_priority() {
    let dir = TempDir::new().unwrap();
    let outcome = Pipeline::builder()
        .config(sales_config(&dir))
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    assert!(!outcome.insights.is_empty());
    assert!(
        outcome
            .insights
            .windows(2)
            .all(|w| w[0].priority <= w[1].priority),
        "insights must be ordered highest priority first"
    );
    for a in &outcome.insights {
        for b in &outcome.insights {
            if a.evidence == b.evidence {
                assert_eq!(a.recommended_action, b.recommended_action);
            }
        }
    }
    assert_eq!(outcome.summary.insight_count, outcome.insights.len());
}

#[test]
fn test_dashboard_generation_is_idempotent() {
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("measurements.csv", measurements_csv(80).as_bytes())
        .unwrap();

    let input = DashboardInput {
        title: "Measurements",
        insights: &outcome.insights,
        analysis: &outcome.analysis,
        schemas: &outcome.schemas,
        sample: &outcome.cleaned,
        rows: outcome.cleaned.height(),
        completeness: outcome.transformation.completeness_after,
        time_column: None,
    };
    for compress in [false, true] {
        let generator = DashboardGenerator::new(Theme::Dark, compress);
        let first = generator.generate(&input).unwrap();
        let second = generator.generate(&input).unwrap();
        assert_eq!(first.html, second.html);
        assert_eq!(first.spec, second.spec);
    }
}

#[test]
fn test_schema_inference_is_deterministic() {
    let pipeline = Pipeline::builder().config(in_memory()).build().unwrap();
    let path = fixtures_path().join("sales.csv");
    let first = pipeline.run_file(&path).unwrap();
    let second = pipeline.run_file(&path).unwrap();
    assert_eq!(first.schemas, second.schemas);
    assert_eq!(pipeline.registry().len(), 2);
}

// ============================================================================
// Edge Cases
// ============================================================================

#[test]
fn test_semicolon_delimited_input() {
    let text = measurements_csv(40).replace(',', ";");
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("semicolons.csv", text.as_bytes())
        .unwrap();
    assert_eq!(outcome.cleaned.width(), 4);
    assert_eq!(outcome.cleaned.height(), 40);
}

#[test]
fn test_semicolon_input_reads_decimal_commas() {
    let mut text = String::from("region;price\n");
    for i in 0..30 {
        text.push_str(&format!("r{};{},5\n", i % 3, 1 + i % 4));
    }
    let outcome = Pipeline::builder()
        .config(in_memory())
        .build()
        .unwrap()
        .run_bytes("eu.csv", text.as_bytes())
        .unwrap();

    let price = outcome.schemas.iter().find(|s| s.name == "price").unwrap();
    assert_eq!(price.inferred_type, InferredType::Numeric);
    assert_eq!(price.coercion_loss, 0);
    let values: Vec<f64> = outcome
        .cleaned
        .column("price")
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(values.len(), 30);
    assert_eq!(&values[..4], &[1.5, 2.5, 3.5, 4.5]);
}

#[test]
fn test_header_only_input_fails_at_load() {
    let pipeline = Pipeline::builder().config(in_memory()).build().unwrap();
    let err = pipeline
        .run_bytes("header.csv", b"a,b,c\n")
        .unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Load));
    assert_eq!(
        pipeline.registry().latest().map(|r| r.status),
        Some(RunStatus::Failed)
    );
}

#[test]
fn test_missing_file_fails_at_load() {
    let pipeline = Pipeline::builder().config(in_memory()).build().unwrap();
    let err = pipeline.run_file(fixtures_path().join("absent.csv")).unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Load));
}

#[test]
fn test_sample_size_caps_rows() {
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .sample_size(25)
        .build()
        .unwrap();
    let outcome = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();
    assert_eq!(outcome.cleaned.height(), 25);
}

// ============================================================================
// Progress & Cancellation
// ============================================================================

#[test]
fn test_progress_callback_invoked() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    Pipeline::builder()
        .config(in_memory())
        .on_progress(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap()
        .run_file(fixtures_path().join("sales.csv"))
        .unwrap();

    // begin and end for eight stages plus the completion update
    assert!(counter.load(Ordering::SeqCst) >= 17);
}

#[test]
fn test_cancellation_mid_run() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let pipeline = Pipeline::builder()
        .config(in_memory())
        .cancellation_token(token)
        .on_progress(move |update| {
            if update.stage == PipelineStage::Transform {
                trigger.cancel();
            }
        })
        .build()
        .unwrap();

    let err = pipeline.run_file(fixtures_path().join("sales.csv")).unwrap_err();
    assert!(err.is_cancelled());
    let run = pipeline.registry().latest().unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.current_stage, PipelineStage::Cancelled);
}

#[test]
fn test_invalid_thresholds_rejected() {
    let result = PipelineConfig::builder()
        .validation(ValidationThresholds {
            max_null_rate: 0.99,
            null_rate_ceiling: 0.5,
            ..Default::default()
        })
        .build();
    assert!(result.is_err());
}
