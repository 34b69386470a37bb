//! Human-readable insights report (`insights_report.md`).

use super::summary::RunSummary;
use crate::error::{PipelineError, Result};
use crate::insights::Insight;
use crate::quality::Severity;
use std::fmt::{self, Write};
use vista_learning::{ImportanceMethod, ModelResult};

const TOP_IMPORTANCES: usize = 10;

/// Render the report for a summarized run.
pub fn render_markdown(summary: &RunSummary) -> Result<String> {
    let mut out = String::new();
    write_report(&mut out, summary)
        .map_err(|e| PipelineError::Internal(format!("cannot format report: {e}")))?;
    Ok(out)
}

fn write_report(out: &mut String, summary: &RunSummary) -> fmt::Result {
    writeln!(out, "# Insights report: {}", summary.input)?;
    writeln!(out)?;
    writeln!(out, "**Run:** `{}`", summary.run_id)?;
    writeln!(out, "**Started:** {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "**Duration:** {} ms", summary.duration_ms)?;
    if let Some(context) = &summary.config.business_context {
        writeln!(out, "**Business context:** {}", context)?;
    }

    write_findings(out, &summary.insights)?;
    write_quality(out, summary)?;
    write_validation(out, summary)?;
    write_transformation(out, summary)?;
    write_model(out, summary)?;
    write_skipped(out, summary)?;
    write_errors(out, summary)?;
    Ok(())
}

fn write_findings(out: &mut String, insights: &[Insight]) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "## Key findings")?;
    writeln!(out)?;
    if insights.is_empty() {
        writeln!(out, "No insights were generated.")?;
        return Ok(());
    }
    for (rank, insight) in insights.iter().enumerate() {
        writeln!(
            out,
            "{}. **[P{}] {}**: {}",
            rank + 1,
            insight.priority,
            insight.category.title(),
            insight.statement
        )?;
        writeln!(out, "   - Recommended action: {}", insight.recommended_action)?;
        writeln!(out, "   - Evidence: `{}`", insight.evidence)?;
    }
    Ok(())
}

fn write_quality(out: &mut String, summary: &RunSummary) -> fmt::Result {
    let shape = &summary.dataset;
    writeln!(out)?;
    writeln!(out, "## Data quality")?;
    writeln!(out)?;
    writeln!(out, "| Metric | Before | After |")?;
    writeln!(out, "|--------|--------|-------|")?;
    writeln!(out, "| Rows | {} | {} |", shape.rows_before, shape.rows_after)?;
    writeln!(out, "| Columns | {} | {} |", shape.columns, shape.columns)?;
    writeln!(
        out,
        "| Quality score | {:.1}% | {:.1}% |",
        shape.quality_before * 100.0,
        shape.quality_after * 100.0
    )?;
    writeln!(out)?;
    writeln!(out, "| Column | Type | Nulls | Distinct |")?;
    writeln!(out, "|--------|------|-------|----------|")?;
    for schema in &summary.schemas {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            schema.name, schema.inferred_type, schema.null_count, schema.cardinality
        )?;
    }
    Ok(())
}

fn write_validation(out: &mut String, summary: &RunSummary) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "## Validation findings")?;
    writeln!(out)?;
    if summary.validation.findings.is_empty() {
        writeln!(out, "No validation issues found.")?;
        return Ok(());
    }
    writeln!(out, "| Severity | Column | Issue | Count | Rate | Suggested action |")?;
    writeln!(out, "|----------|--------|-------|-------|------|------------------|")?;
    for finding in &summary.validation.findings {
        let severity = match finding.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        writeln!(
            out,
            "| {} | {} | {} | {} | {:.1}% | {} |",
            severity,
            finding.column.as_deref().unwrap_or("(dataset)"),
            finding.issue_kind.as_str(),
            finding.count,
            finding.rate * 100.0,
            finding.suggested_action
        )?;
    }
    Ok(())
}

fn write_transformation(out: &mut String, summary: &RunSummary) -> fmt::Result {
    let log = &summary.transformation;
    writeln!(out)?;
    writeln!(out, "## Transformation log")?;
    writeln!(out)?;
    if log.steps.is_empty() {
        writeln!(out, "No transformations were applied.")?;
    } else {
        writeln!(out, "| Column | Operation | Before | After | Detail |")?;
        writeln!(out, "|--------|-----------|--------|-------|--------|")?;
        for step in &log.steps {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                step.column.as_deref().unwrap_or("(dataset)"),
                step.operation.as_str(),
                step.before,
                step.after,
                step.detail
            )?;
        }
    }
    for skipped in &log.skipped {
        writeln!(
            out,
            "- Skipped `{}` on `{}`: {}",
            skipped.operation.as_str(),
            skipped.column,
            skipped.reason
        )?;
    }
    Ok(())
}

fn write_model(out: &mut String, summary: &RunSummary) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "## Model result")?;
    writeln!(out)?;
    let Some(model) = &summary.model else {
        let reason = summary
            .section("automl")
            .and_then(|s| s.reason.as_deref())
            .unwrap_or("no model was trained");
        writeln!(out, "AutoML did not run: {}.", reason)?;
        return Ok(());
    };

    writeln!(
        out,
        "Trained a {} model (`{}`, {} backend) to predict `{}` on {} rows, validated on {}.",
        model.task_type.as_str(),
        model.model_name,
        model.backend,
        model.target,
        model.train_rows,
        model.test_rows
    )?;
    writeln!(out)?;
    writeln!(out, "| Metric | Value |")?;
    writeln!(out, "|--------|-------|")?;
    for (name, value) in metric_rows(model) {
        writeln!(out, "| {} | {:.4} |", name, value)?;
    }

    if !model.feature_importances.is_empty() {
        let method = match model.importance_method {
            ImportanceMethod::Native => "native",
            ImportanceMethod::Permutation => "permutation",
        };
        writeln!(out)?;
        writeln!(out, "Feature importances ({}):", method)?;
        writeln!(out)?;
        for importance in model.feature_importances.iter().take(TOP_IMPORTANCES) {
            writeln!(out, "- `{}`: {:.3}", importance.feature, importance.importance)?;
        }
    }
    for warning in &model.warnings {
        writeln!(out, "- Note: {}", warning)?;
    }
    Ok(())
}

fn metric_rows(model: &ModelResult) -> Vec<(&'static str, f64)> {
    let m = &model.metrics;
    [
        ("test_score", m.test_score),
        ("train_score", m.train_score),
        ("accuracy", m.accuracy),
        ("precision", m.precision),
        ("recall", m.recall),
        ("f1_score", m.f1_score),
        ("roc_auc", m.roc_auc),
        ("r2", m.r2),
        ("rmse", m.rmse),
        ("mae", m.mae),
        ("mse", m.mse),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| (name, v)))
    .collect()
}

fn write_skipped(out: &mut String, summary: &RunSummary) -> fmt::Result {
    let incomplete: Vec<_> = summary.sections.iter().filter(|s| s.reason.is_some()).collect();
    if incomplete.is_empty() && summary.skipped_charts.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "## Skipped sections")?;
    writeln!(out)?;
    for section in incomplete {
        writeln!(
            out,
            "- `{}` {}: {}",
            section.section,
            section.status,
            section.reason.as_deref().unwrap_or_default()
        )?;
    }
    for chart in &summary.skipped_charts {
        writeln!(
            out,
            "- chart \"{}\" ({}) not rendered: {}",
            chart.title,
            chart.kind.as_str(),
            chart.reason
        )?;
    }
    Ok(())
}

fn write_errors(out: &mut String, summary: &RunSummary) -> fmt::Result {
    if summary.errors.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "## Recoverable errors")?;
    writeln!(out)?;
    for error in &summary.errors {
        writeln!(out, "- `{}`: {}", error.code, error.message)?;
    }
    Ok(())
}
