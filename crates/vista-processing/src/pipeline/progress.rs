//! Progress reporting and cancellation support for the analytics pipeline.
//!
//! The pipeline is a linear state machine over [`PipelineStage`]. Every stage
//! transition emits a [`ProgressUpdate`] to each subscribed
//! [`ProgressReporter`], synchronously on the thread running the pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use vista_processing::{Pipeline, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! // In another thread
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let run = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:>3.0}%] {}", update.percent(), update.message);
//!     })
//!     .build()?
//!     .run_file("sales.csv");
//! ```

use serde::{Deserialize, Serialize};

pub use vista_learning::CancellationToken;

/// Stages of the analytics pipeline.
///
/// The working stages run in declaration order. `Failed` and `Cancelled` are
/// reachable from any working stage; `Completed` only from `Finalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Configuration checked, run registered
    Init,
    /// Reading and decoding the input, inferring the schema
    Load,
    /// Checking nulls, types, duplicates and outliers
    Validate,
    /// Imputing, coercing and capping
    Transform,
    /// Statistics, patterns and AutoML
    Analyze,
    /// Ranking insights
    GenerateInsights,
    /// Rendering the HTML dashboard
    GenerateDashboard,
    /// Writing the output bundle
    Finalize,
    /// Run finished successfully
    Completed,
    /// Run was cancelled by the caller
    Cancelled,
    /// Run failed with an unrecoverable error
    Failed,
}

impl PipelineStage {
    /// Working stages in execution order.
    pub const WORKING: [PipelineStage; 8] = [
        Self::Init,
        Self::Load,
        Self::Validate,
        Self::Transform,
        Self::Analyze,
        Self::GenerateInsights,
        Self::GenerateDashboard,
        Self::Finalize,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Init => "Initializing",
            Self::Load => "Loading Data",
            Self::Validate => "Validating Data",
            Self::Transform => "Transforming Data",
            Self::Analyze => "Analyzing",
            Self::GenerateInsights => "Generating Insights",
            Self::GenerateDashboard => "Generating Dashboard",
            Self::Finalize => "Finalizing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    ///
    /// Weights sum to 1.0 over the working stages.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Init => 0.02,
            Self::Load => 0.13,
            Self::Validate => 0.10,
            Self::Transform => 0.15,
            Self::Analyze => 0.35,
            Self::GenerateInsights => 0.05,
            Self::GenerateDashboard => 0.12,
            Self::Finalize => 0.08,
            Self::Completed | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Init => 0.0,
            Self::Load => 0.02,
            Self::Validate => 0.15,
            Self::Transform => 0.25,
            Self::Analyze => 0.40,
            Self::GenerateInsights => 0.75,
            Self::GenerateDashboard => 0.80,
            Self::Finalize => 0.92,
            Self::Completed => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// The stage that follows on success, `None` for terminal stages.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            Self::Init => Some(Self::Load),
            Self::Load => Some(Self::Validate),
            Self::Validate => Some(Self::Transform),
            Self::Transform => Some(Self::Analyze),
            Self::Analyze => Some(Self::GenerateInsights),
            Self::GenerateInsights => Some(Self::GenerateDashboard),
            Self::GenerateDashboard => Some(Self::Finalize),
            Self::Finalize => Some(Self::Completed),
            Self::Completed | Self::Cancelled | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `target`.
    pub fn can_transition_to(&self, target: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(target, Self::Failed | Self::Cancelled) || self.next() == Some(target)
    }
}

/// One progress event. `progress` is overall, `stage_progress` is within `stage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// e.g. `"reading"` while chunks stream in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    pub progress: f32,

    pub stage_progress: f32,

    pub message: String,

    /// Milliseconds since the run started
    #[serde(default)]
    pub elapsed_ms: u64,

    /// Rows read so far during Load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Unknown while streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Update at `stage_progress` through `stage`, placed on the overall scale.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            elapsed_ms: 0,
            items_processed: None,
            items_total: None,
        }
    }

    pub fn with_sub_stage(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    /// Item-count update; without a total the stage is shown half done.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = match total {
            Some(total) if total > 0 => current as f32 / total as f32,
            _ => 0.5,
        };
        Self {
            items_processed: Some(current),
            items_total: total,
            ..Self::with_sub_stage(stage, sub_stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Completed, 1.0, message)
    }

    pub fn cancelled() -> Self {
        Self::new(PipelineStage::Cancelled, 0.0, "Pipeline cancelled by user")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, 0.0, message)
    }

    /// Stamp the update with the run's elapsed time.
    pub fn elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Overall progress as a percentage (0 - 100).
    pub fn percent(&self) -> f32 {
        self.progress * 100.0
    }
}

/// Trait for receiving progress updates from the pipeline.
///
/// Implementations must be `Send + Sync` so a pipeline can run on a worker
/// thread while reporting to its host. Updates are delivered synchronously;
/// implementations should be cheap and must not block.
///
/// # Example
///
/// ```rust,ignore
/// use vista_processing::{ProgressReporter, ProgressUpdate};
/// use std::sync::mpsc::Sender;
///
/// struct ChannelReporter(std::sync::Mutex<Sender<ProgressUpdate>>);
///
/// impl ProgressReporter for ChannelReporter {
///     fn report(&self, update: ProgressUpdate) {
///         self.0.lock().unwrap().send(update).ok();
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called at each stage transition and during long stages.
    fn report(&self, update: ProgressUpdate);
}

/// Adapts a closure to [`ProgressReporter`]; see `PipelineBuilder::on_progress`.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
