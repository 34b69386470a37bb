//! Pipeline module.
//!
//! This module provides the orchestrator, the per-run state it maintains and
//! the progress/cancellation plumbing it reports through.

mod builder;
mod executor;
pub mod progress;
mod run;

pub use builder::PipelineBuilder;
pub use executor::{Pipeline, PipelineOutcome};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
pub use run::{MAX_RUN_HISTORY, PipelineRun, RunError, RunRegistry, RunStatus, StageTiming};
