//! Per-run state.
//!
//! A [`PipelineRun`] is created when a run starts and updated by the
//! orchestrator at every stage transition. Runs are recorded in a
//! [`RunRegistry`] so a hosting process can look them up by id while (and
//! after) they execute. Nothing in a run is shared with other runs.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelineStage;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum number of runs kept in a registry, oldest removed first.
pub const MAX_RUN_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub duration_ms: u64,
}

/// Serializable form of a [`PipelineError`] as it appears in run summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    pub recoverable: bool,
}

impl From<&PipelineError> for RunError {
    fn from(error: &PipelineError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            stage: error.stage(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// State of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub input: String,
    pub config: PipelineConfig,
    pub current_stage: PipelineStage,
    /// Overall progress (0.0 - 1.0)
    pub progress: f32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub status: RunStatus,
    pub error: Option<RunError>,
    pub stage_timings: Vec<StageTiming>,
}

impl PipelineRun {
    pub fn new(input: impl Into<String>, config: PipelineConfig) -> Self {
        let started_at = Utc::now();
        Self {
            id: run_id(&started_at),
            input: input.into(),
            config,
            current_stage: PipelineStage::Init,
            progress: 0.0,
            started_at,
            elapsed_ms: 0,
            status: RunStatus::Running,
            error: None,
            stage_timings: Vec::new(),
        }
    }

    /// Move to `stage`. Illegal transitions are ignored and reported as
    /// `false`.
    pub fn transition(&mut self, stage: PipelineStage) -> bool {
        if !self.current_stage.can_transition_to(stage) {
            return false;
        }
        self.current_stage = stage;
        self.progress = stage.base_progress();
        self.status = match stage {
            PipelineStage::Completed => RunStatus::Completed,
            PipelineStage::Failed => RunStatus::Failed,
            PipelineStage::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Running,
        };
        true
    }

    pub fn record_timing(&mut self, stage: PipelineStage, duration_ms: u64) {
        self.stage_timings.push(StageTiming { stage, duration_ms });
    }

    pub fn fail(&mut self, error: &PipelineError) {
        self.error = Some(RunError::from(error));
        let terminal = if error.is_cancelled() {
            PipelineStage::Cancelled
        } else {
            PipelineStage::Failed
        };
        self.transition(terminal);
    }

    /// Stage the run failed in, taken from the recorded error.
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        self.error.as_ref().and_then(|e| e.stage)
    }

    pub fn is_finished(&self) -> bool {
        self.current_stage.is_terminal()
    }
}

/// `YYYYmmdd-HHMMSS-xxxxxx`: start time plus a random suffix.
fn run_id(started_at: &DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", started_at.format("%Y%m%d-%H%M%S"), suffix)
}

/// Shared, bounded history of runs.
///
/// Cloning is cheap; clones see the same runs.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<RwLock<Vec<PipelineRun>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the run with the same id.
    pub fn upsert(&self, run: &PipelineRun) {
        let mut runs = self.runs.write();
        if let Some(existing) = runs.iter_mut().find(|r| r.id == run.id) {
            *existing = run.clone();
            return;
        }
        runs.push(run.clone());
        if runs.len() > MAX_RUN_HISTORY {
            let excess = runs.len() - MAX_RUN_HISTORY;
            runs.drain(..excess);
        }
    }

    pub fn get(&self, id: &str) -> Option<PipelineRun> {
        self.runs.read().iter().find(|r| r.id == id).cloned()
    }

    /// Most recently started run.
    pub fn latest(&self) -> Option<PipelineRun> {
        self.runs.read().last().cloned()
    }

    /// All runs, oldest first.
    pub fn list(&self) -> Vec<PipelineRun> {
        self.runs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

static_assertions::assert_impl_all!(RunRegistry: Send, Sync);
