//! Machine-readable run summary (`run_summary.json`).

use crate::analysis::AnalysisResult;
use crate::cleaner::TransformationLog;
use crate::config::PipelineConfig;
use crate::dashboard::SkippedChart;
use crate::insights::Insight;
use crate::io::SourceInfo;
use crate::pipeline::{PipelineRun, PipelineStage, RunError, RunStatus, StageTiming};
use crate::profiler::ColumnSchema;
use crate::quality::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vista_learning::ModelResult;

/// Status of one analysis section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStatus {
    pub section: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Row and column counts plus the share of non-null cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns: usize,
    pub quality_before: f64,
    pub quality_after: f64,
}

/// Everything a machine consumer needs to know about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub input: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub config: PipelineConfig,
    pub source: Option<SourceInfo>,
    pub dataset: DatasetShape,
    pub schemas: Vec<ColumnSchema>,
    pub validation: ValidationReport,
    pub transformation: TransformationLog,
    pub stage_timings: Vec<StageTiming>,
    pub sections: Vec<SectionStatus>,
    pub model: Option<ModelResult>,
    pub insight_count: usize,
    pub insights: Vec<Insight>,
    pub skipped_charts: Vec<SkippedChart>,
    /// Recoverable errors, then the fatal one if the run failed.
    pub errors: Vec<RunError>,
    pub outputs: Vec<String>,
}

/// Inputs for [`RunSummary::build`].
pub struct SummaryParams<'a> {
    pub run: &'a PipelineRun,
    pub source: Option<&'a SourceInfo>,
    pub schemas: &'a [ColumnSchema],
    pub validation: &'a ValidationReport,
    pub transformation: &'a TransformationLog,
    pub analysis: &'a AnalysisResult,
    pub insights: &'a [Insight],
    pub skipped_charts: &'a [SkippedChart],
    pub recoverable_errors: &'a [RunError],
    pub outputs: &'a [String],
}

impl RunSummary {
    /// Summarize a run that reached `Finalize`. The status is `Completed`
    /// unless the run already recorded an error.
    pub fn build(params: SummaryParams<'_>) -> Self {
        let run = params.run;
        let sections = params
            .analysis
            .section_statuses()
            .into_iter()
            .map(|(section, status, reason)| SectionStatus {
                section: section.to_string(),
                status: status.to_string(),
                reason: reason.map(str::to_string),
            })
            .collect();

        let mut errors = params.recoverable_errors.to_vec();
        if let Some(fatal) = &run.error {
            errors.push(fatal.clone());
        }
        let status = match run.status {
            RunStatus::Running => RunStatus::Completed,
            other => other,
        };

        Self {
            run_id: run.id.clone(),
            input: run.input.clone(),
            status,
            failed_stage: run.failed_stage(),
            started_at: run.started_at,
            duration_ms: run.elapsed_ms,
            config: run.config.clone(),
            source: params.source.cloned(),
            dataset: DatasetShape {
                rows_before: params.transformation.rows_before,
                rows_after: params.transformation.rows_after,
                columns: params.schemas.len(),
                quality_before: params.transformation.completeness_before,
                quality_after: params.transformation.completeness_after,
            },
            schemas: params.schemas.to_vec(),
            validation: params.validation.clone(),
            transformation: params.transformation.clone(),
            stage_timings: run.stage_timings.clone(),
            sections,
            model: params.analysis.model().cloned(),
            insight_count: params.insights.len(),
            insights: params.insights.to_vec(),
            skipped_charts: params.skipped_charts.to_vec(),
            errors,
            outputs: params.outputs.to_vec(),
        }
    }

    pub fn section(&self, name: &str) -> Option<&SectionStatus> {
        self.sections.iter().find(|s| s.section == name)
    }
}
