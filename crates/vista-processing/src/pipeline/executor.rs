//! The pipeline orchestrator.
//!
//! [`Pipeline`] drives one run through
//! `Init → Load → Validate → Transform → Analyze → GenerateInsights →
//! GenerateDashboard → Finalize`. The run's state lives in a
//! [`PipelineRun`] passed explicitly through every stage, so a single
//! `Pipeline` can serve concurrent runs without sharing data between them.

use super::progress::{CancellationToken, PipelineStage, ProgressReporter, ProgressUpdate};
use super::run::{PipelineRun, RunError, RunRegistry};
use super::PipelineBuilder;
use crate::analysis::{AnalysisResult, Analyzer};
use crate::cleaner::{DataTransformer, TransformationLog};
use crate::config::{ExportFormat, PipelineConfig};
use crate::dashboard::{Dashboard, DashboardGenerator, DashboardInput, sample_rows};
use crate::error::{PipelineError, Result};
use crate::insights::{Insight, InsightGenerator};
use crate::io::{CsvLoader, ReadOptions, SourceInfo};
use crate::profiler::{ColumnSchema, SchemaInferer};
use crate::quality::{ValidationReport, Validator};
use crate::reporting::{ReportWriter, RunSummary, SummaryParams, render_markdown};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Values tried per parser during schema inference.
const INFERENCE_SAMPLE: usize = 100_000;

/// Everything a completed run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub run: PipelineRun,
    pub source: Option<SourceInfo>,
    pub schemas: Vec<ColumnSchema>,
    pub validation: ValidationReport,
    pub transformation: TransformationLog,
    pub analysis: AnalysisResult,
    pub insights: Vec<Insight>,
    pub dashboard: Dashboard,
    pub report_markdown: String,
    pub summary: RunSummary,
    pub cleaned: DataFrame,
    /// Errors recorded and skipped past, tagged with their stage.
    pub recoverable_errors: Vec<RunError>,
    /// Files written; empty when `save_to_disk` is off.
    pub outputs: Vec<PathBuf>,
}

enum Input<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
    Frame(DataFrame),
}

/// Mutable state of one run, threaded through the stages.
struct RunContext {
    run: PipelineRun,
    clock: Instant,
    stage_clock: Instant,
    source: Option<SourceInfo>,
    recoverable: Vec<RunError>,
}

impl RunContext {
    fn new(run: PipelineRun) -> Self {
        let now = Instant::now();
        Self {
            run,
            clock: now,
            stage_clock: now,
            source: None,
            recoverable: Vec::new(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn enter(&mut self, stage: PipelineStage) -> Result<()> {
        if self.run.current_stage != stage && !self.run.transition(stage) {
            return Err(PipelineError::Internal(format!(
                "illegal transition from {:?} to {:?}",
                self.run.current_stage, stage
            )));
        }
        self.stage_clock = Instant::now();
        self.run.elapsed_ms = self.elapsed_ms();
        Ok(())
    }

    fn leave(&mut self) {
        let stage = self.run.current_stage;
        self.run
            .record_timing(stage, self.stage_clock.elapsed().as_millis() as u64);
        self.run.progress = stage.base_progress() + stage.weight();
        self.run.elapsed_ms = self.elapsed_ms();
    }

    fn record(&mut self, error: &PipelineError) {
        warn!("Recoverable error: {}", error);
        let mut entry = RunError::from(error);
        entry.stage.get_or_insert(self.run.current_stage);
        self.recoverable.push(entry);
    }
}

/// The analytics pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use vista_processing::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .target_column("revenue")
///     .time_column("date")
///     .output_dir("out")
///     .build()?;
///
/// let outcome = Pipeline::builder()
///     .config(config)
///     .on_progress(|update| {
///         println!("[{:>3.0}%] {}", update.percent(), update.message);
///     })
///     .build()?
///     .run_file("sales.csv")?;
///
/// println!("{} insights", outcome.insights.len());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    reporters: Vec<Arc<dyn ProgressReporter>>,
    token: CancellationToken,
    registry: RunRegistry,
    analyzer: Analyzer,
    dashboard: DashboardGenerator,
}

// runs are typically driven from a worker thread
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub(super) fn from_parts(
        config: PipelineConfig,
        reporters: Vec<Arc<dyn ProgressReporter>>,
        token: CancellationToken,
        registry: RunRegistry,
        analyzer: Analyzer,
        dashboard: DashboardGenerator,
    ) -> Self {
        Self {
            config,
            reporters,
            token,
            registry,
            analyzer,
            dashboard,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run the pipeline on a delimited file.
    ///
    /// # Errors
    ///
    /// Fatal errors come back tagged with the stage they happened in (see
    /// [`PipelineError::stage`]); the run is left in the registry as
    /// `Failed` or `Cancelled`.
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<PipelineOutcome> {
        let path = path.as_ref();
        self.execute(path.display().to_string(), Input::Path(path))
    }

    /// Run the pipeline on delimited text held in memory.
    pub fn run_bytes(&self, name: &str, bytes: &[u8]) -> Result<PipelineOutcome> {
        self.execute(name.to_string(), Input::Bytes(bytes))
    }

    /// Run the pipeline on an already loaded frame. String columns are typed
    /// by inference like file input; typed columns keep their type.
    pub fn run_dataframe(&self, name: &str, df: DataFrame) -> Result<PipelineOutcome> {
        self.execute(name.to_string(), Input::Frame(df))
    }

    fn execute(&self, name: String, input: Input<'_>) -> Result<PipelineOutcome> {
        let mut ctx = RunContext::new(PipelineRun::new(name, self.config.clone()));
        self.registry.upsert(&ctx.run);
        info!("Starting run {} on {}", ctx.run.id, ctx.run.input);

        match self.execute_stages(&mut ctx, input) {
            Ok(outcome) => {
                self.report(&ctx, ProgressUpdate::complete("Pipeline completed successfully"));
                info!("Run {} completed in {} ms", outcome.run.id, outcome.run.elapsed_ms);
                Ok(outcome)
            }
            Err(e) => {
                let e = e.at_stage(ctx.run.current_stage);
                ctx.run.elapsed_ms = ctx.elapsed_ms();
                ctx.run.fail(&e);
                self.registry.upsert(&ctx.run);
                if e.is_cancelled() {
                    info!("Run {} cancelled", ctx.run.id);
                    self.report(&ctx, ProgressUpdate::cancelled());
                } else {
                    error!("Run {} failed: {}", ctx.run.id, e);
                    self.report(&ctx, ProgressUpdate::failed(e.to_string()));
                }
                Err(e)
            }
        }
    }

    fn execute_stages(&self, ctx: &mut RunContext, input: Input<'_>) -> Result<PipelineOutcome> {
        let config = &self.config;

        // Init
        self.begin(ctx, PipelineStage::Init, "Starting analytics pipeline...")?;
        debug!("Config: {:?}", config);
        self.end(ctx, "Pipeline initialized");

        // Load
        self.begin(ctx, PipelineStage::Load, "Loading data...")?;
        let raw = self.load(ctx, input)?;
        let separator = ctx
            .source
            .as_ref()
            .map(|source| source.delimiter.decimal_separator())
            .unwrap_or_default();
        let inferred = SchemaInferer::new(config.categorical_cardinality_ratio, Some(INFERENCE_SAMPLE))
            .decimal_separator(separator)
            .infer(&raw)?;
        drop(raw);
        let schemas = inferred.schemas;
        self.end(
            ctx,
            format!("Loaded {} rows x {} columns", inferred.frame.height(), schemas.len()),
        );

        // Validate
        self.begin(ctx, PipelineStage::Validate, "Validating data...")?;
        let validation = Validator::new(&config.validation).validate(&inferred.frame, &schemas)?;
        for finding in validation.errors() {
            warn!("Validation error: {}", finding.message);
        }
        if config.strict_validation && validation.has_errors() {
            return Err(PipelineError::Validation(validation.error_summary()));
        }
        self.end(ctx, format!("Found {} validation findings", validation.findings.len()));

        // Transform
        self.begin(ctx, PipelineStage::Transform, "Transforming data...")?;
        let (cleaned, transformation) =
            DataTransformer::new(config).transform(inferred.frame, &schemas, &validation, &self.token)?;
        for skipped in &transformation.skipped {
            ctx.record(&skipped.to_error());
        }
        self.end(
            ctx,
            format!("Applied {} transformations", transformation.steps.len()),
        );

        // Analyze
        self.begin(ctx, PipelineStage::Analyze, "Running statistics, patterns and AutoML...")?;
        let analysis = self.analyzer.analyze(&cleaned, &schemas, &self.token)?;
        for (section, status, reason) in analysis.incomplete_sections() {
            info!("Section {} {}: {}", section, status, reason);
        }
        for error in analysis.recoverable_errors() {
            ctx.record(&error);
        }
        self.end(ctx, "Analysis complete");

        // GenerateInsights
        self.begin(ctx, PipelineStage::GenerateInsights, "Generating insights...")?;
        let insights = InsightGenerator::new(config.business_context.as_deref())
            .generate(&analysis, &validation, &transformation);
        self.end(ctx, format!("Generated {} insights", insights.len()));

        // GenerateDashboard
        self.begin(ctx, PipelineStage::GenerateDashboard, "Rendering dashboard...")?;
        let sample = sample_rows(&cleaned, config.dashboard_sample_rows)?;
        let title = format!("Analytics dashboard: {}", ctx.run.input);
        let dashboard = self.dashboard.generate(&DashboardInput {
            title: &title,
            insights: &insights,
            analysis: &analysis,
            schemas: &schemas,
            sample: &sample,
            rows: cleaned.height(),
            completeness: transformation.completeness_after,
            time_column: config.time_column.as_deref(),
        })?;
        for error in &dashboard.errors {
            ctx.record(error);
        }
        self.end(
            ctx,
            format!("Rendered {} charts", dashboard.spec.charts.len()),
        );

        // Finalize
        self.begin(ctx, PipelineStage::Finalize, "Writing outputs...")?;
        let writer = ReportWriter::new(&config.output_dir);
        let formats: Vec<ExportFormat> = if config.save_to_disk {
            config.export_formats.clone()
        } else {
            Vec::new()
        };
        let planned = writer.planned_outputs(&formats);
        let planned_names: Vec<String> = planned.iter().map(|p| p.display().to_string()).collect();
        ctx.run.elapsed_ms = ctx.elapsed_ms();

        let summary = RunSummary::build(SummaryParams {
            run: &ctx.run,
            source: ctx.source.as_ref(),
            schemas: &schemas,
            validation: &validation,
            transformation: &transformation,
            analysis: &analysis,
            insights: &insights,
            skipped_charts: &dashboard.spec.skipped_charts,
            recoverable_errors: &ctx.recoverable,
            outputs: &planned_names,
        });
        let report_markdown = render_markdown(&summary)?;

        let mut outputs = Vec::with_capacity(formats.len());
        for format in &formats {
            self.check_cancelled()?;
            let path = match format {
                ExportFormat::Html => writer.write_text(*format, &dashboard.html)?,
                ExportFormat::Markdown => writer.write_text(*format, &report_markdown)?,
                ExportFormat::Csv => writer.write_dataset(&cleaned)?,
                // written last so a summary on disk always means a finished bundle
                ExportFormat::Json => continue,
            };
            outputs.push(path);
        }
        if formats.contains(&ExportFormat::Json) {
            outputs.push(writer.write_summary(&summary)?);
        }
        self.end(ctx, format!("Wrote {} files", outputs.len()));

        ctx.enter(PipelineStage::Completed)?;
        self.registry.upsert(&ctx.run);

        Ok(PipelineOutcome {
            run: ctx.run.clone(),
            source: ctx.source.clone(),
            schemas,
            validation,
            transformation,
            analysis,
            insights,
            dashboard,
            report_markdown,
            summary,
            cleaned,
            recoverable_errors: ctx.recoverable.clone(),
            outputs,
        })
    }

    fn load(&self, ctx: &mut RunContext, input: Input<'_>) -> Result<DataFrame> {
        let options = ReadOptions {
            chunk_size: self.config.chunk_size,
            sample_size: self.config.sample_size,
        };
        let loader = CsvLoader::new(options, &self.token);
        let clock = ctx.clock;
        let on_chunk = |chunk: usize, rows: usize| {
            let update = ProgressUpdate::with_items(
                PipelineStage::Load,
                "reading",
                rows,
                None,
                format!("Read {} rows ({} chunks)", rows, chunk + 1),
            )
            .elapsed(clock.elapsed().as_millis() as u64);
            self.broadcast(update);
        };

        let df = match input {
            Input::Path(path) => {
                let (df, source) = loader.read_path(path, &on_chunk)?;
                ctx.source = Some(source);
                df
            }
            Input::Bytes(bytes) => {
                let (df, source) = loader.read_bytes(bytes, &on_chunk)?;
                ctx.source = Some(source);
                df
            }
            Input::Frame(df) => match self.config.sample_size {
                Some(limit) if df.height() > limit => df.head(Some(limit)),
                _ => df,
            },
        };
        if df.width() == 0 || df.height() == 0 {
            return Err(PipelineError::DataRead(format!(
                "{} has no data rows",
                ctx.run.input
            )));
        }
        Ok(df)
    }

    /// Check the cancellation flag, move to `stage` and announce it.
    fn begin(&self, ctx: &mut RunContext, stage: PipelineStage, message: &str) -> Result<()> {
        self.check_cancelled()?;
        ctx.enter(stage)?;
        self.registry.upsert(&ctx.run);
        info!("{}", message);
        self.report(ctx, ProgressUpdate::new(stage, 0.0, message));
        Ok(())
    }

    fn end(&self, ctx: &mut RunContext, message: impl Into<String>) {
        ctx.leave();
        self.registry.upsert(&ctx.run);
        self.report(ctx, ProgressUpdate::new(ctx.run.current_stage, 1.0, message));
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn report(&self, ctx: &RunContext, update: ProgressUpdate) {
        self.broadcast(update.elapsed(ctx.elapsed_ms()));
    }

    fn broadcast(&self, update: ProgressUpdate) {
        for reporter in &self.reporters {
            reporter.report(update.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunStatus;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn csv() -> String {
        let mut text = String::from("day,group,amount,units\n");
        for i in 0..40 {
            let group = ["a", "b", "c"][i % 3];
            text.push_str(&format!(
                "2024-02-{:02},{},{}.5,{}\n",
                i % 28 + 1,
                group,
                100 + i * 3,
                i % 7
            ));
        }
        text
    }

    fn in_memory() -> PipelineConfig {
        PipelineConfig {
            save_to_disk: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_stages_emitted_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = stages.clone();
        let pipeline = Pipeline::builder()
            .config(in_memory())
            .on_progress(move |update| {
                let mut seen = seen.lock();
                if seen.last() != Some(&update.stage) {
                    seen.push(update.stage);
                }
            })
            .build()
            .unwrap();
        let outcome = pipeline.run_bytes("inline.csv", csv().as_bytes()).unwrap();

        let mut expected = PipelineStage::WORKING.to_vec();
        expected.push(PipelineStage::Completed);
        assert_eq!(*stages.lock(), expected);
        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(outcome.run.stage_timings.len(), PipelineStage::WORKING.len());
        assert!(outcome.outputs.is_empty());
        assert_eq!(
            pipeline.registry().latest().map(|r| r.status),
            Some(RunStatus::Completed)
        );
    }

    #[test]
    fn test_progress_is_monotonic() {
        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = progress.clone();
        Pipeline::builder()
            .config(in_memory())
            .on_progress(move |update| seen.lock().push(update.progress))
            .build()
            .unwrap()
            .run_bytes("inline.csv", csv().as_bytes())
            .unwrap();
        let progress = progress.lock();
        assert!(progress.windows(2).all(|w| w[0] <= w[1] + 1e-6));
        assert_eq!(progress.last().copied(), Some(1.0));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = Pipeline::builder()
            .config(in_memory())
            .cancellation_token(token)
            .build()
            .unwrap();
        let err = pipeline.run_bytes("inline.csv", csv().as_bytes()).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(
            pipeline.registry().latest().map(|r| r.status),
            Some(RunStatus::Cancelled)
        );
    }

    #[test]
    fn test_empty_input_fails_at_load() {
        let pipeline = Pipeline::builder().config(in_memory()).build().unwrap();
        let err = pipeline.run_bytes("empty.csv", b"").unwrap_err();
        assert_eq!(err.error_code(), "DATA_READ_ERROR");
        assert_eq!(err.stage(), Some(PipelineStage::Load));
        let run = pipeline.registry().latest().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failed_stage(), Some(PipelineStage::Load));
    }

    #[test]
    fn test_dataframe_input() {
        let df = df!(
            "x" => (0..30).map(|i| i as f64).collect::<Vec<_>>(),
            "y" => (0..30).map(|i| (i * 2) as f64 + 1.0).collect::<Vec<_>>()
        )
        .unwrap();
        let outcome = Pipeline::builder()
            .config(in_memory())
            .build()
            .unwrap()
            .run_dataframe("frame", df)
            .unwrap();
        assert!(outcome.source.is_none());
        assert_eq!(outcome.cleaned.height(), 30);
        assert_eq!(outcome.summary.insight_count, outcome.insights.len());
    }
}
