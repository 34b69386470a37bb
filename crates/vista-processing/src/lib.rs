//! CSV-in, dashboard-out analytics pipeline.
//!
//! # Overview
//!
//! A run takes one delimited file (or an in-memory frame) through:
//!
//! - **Load**: encoding/delimiter sniffing, chunked reading ([`io`]) and
//!   schema inference ([`profiler`])
//! - **Validate**: null rate, type mismatch, duplicate and outlier checks
//!   ([`quality`])
//! - **Transform**: imputation, outlier capping, optional deduplication
//!   ([`cleaner`])
//! - **Analyze**: descriptive statistics and correlations ([`statistics`]),
//!   clustering, anomalies and trends ([`patterns`]) and AutoML through
//!   `vista_learning`, run concurrently ([`analysis`])
//! - **GenerateInsights**: ranked, templated findings ([`insights`])
//! - **GenerateDashboard**: a self-contained HTML dashboard ([`dashboard`])
//! - **Finalize**: dashboard, insights report, run summary and optionally the
//!   cleaned data written to the output directory ([`reporting`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vista_processing::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .target_column("revenue")
//!     .time_column("date")
//!     .output_dir("reports")
//!     .build()?;
//!
//! let outcome = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:>3.0}%] {}", update.percent(), update.message);
//!     })
//!     .build()?
//!     .run_file("sales.csv")?;
//!
//! for insight in &outcome.insights {
//!     println!("[P{}] {}", insight.priority, insight.statement);
//! }
//! ```
//!
//! # Errors
//!
//! Fatal errors (unreadable input, strict validation failures) end the run
//! and come back tagged with their stage. Recoverable errors (one column's
//! cleaning, one analysis section, one chart) are recorded in the run summary
//! and the run continues. See [`error::PipelineError`].
//!
//! # Progress Reporting
//!
//! ```rust,ignore
//! use vista_processing::{Pipeline, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let token_for_cancel = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     token_for_cancel.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?
//!     .run_file("big.csv");
//!
//! match result {
//!     Ok(outcome) => println!("run {} done", outcome.run.id),
//!     Err(e) if e.is_cancelled() => println!("Cancelled by user"),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```

pub mod analysis;
pub mod cleaner;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod imputers;
pub mod insights;
pub mod io;
pub mod patterns;
pub mod pipeline;
pub mod profiler;
pub mod quality;
pub mod reporting;
pub mod statistics;
pub mod utils;

// Re-exports for convenient access
pub use analysis::{AnalysisResult, Analyzer, SectionOutcome};
pub use cleaner::{DataTransformer, TransformationLog};
pub use config::{
    CategoricalImputation, ConfigValidationError, CorrelationMethod, DatetimeFill, ExportFormat,
    NumericImputation, OutlierMethod, PipelineConfig, PipelineConfigBuilder, Theme,
    ValidationThresholds,
};
pub use dashboard::{ChartKind, ChartRegistry, ChartRenderer, Dashboard, DashboardGenerator, DashboardSpec};
pub use error::{PipelineError, Result, ResultExt};
pub use insights::{Insight, InsightCategory, InsightGenerator};
pub use io::{CsvLoader, ReadOptions, SourceInfo};
pub use patterns::{PatternDetector, PatternReport};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineOutcome,
    PipelineRun, PipelineStage, ProgressReporter, ProgressUpdate, RunError, RunRegistry,
    RunStatus, StageTiming,
};
pub use profiler::{ColumnSchema, InferredType, SchemaInferer};
pub use quality::{IssueKind, Severity, ValidationFinding, ValidationReport, Validator};
pub use reporting::{ReportWriter, RunSummary};
pub use statistics::{CorrelationMatrix, StatisticsEngine, StatisticsReport};

static_assertions::assert_impl_all!(CancellationToken: Send, Sync, Clone);
static_assertions::assert_impl_all!(PipelineError: Send, Sync);
