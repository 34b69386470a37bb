//! The Analyze stage: statistics, patterns and AutoML over one cleaned
//! snapshot.
//!
//! The three engines only read the frame, so [`Analyzer::analyze`] runs them
//! concurrently with `rayon::join` and merges their sections into one
//! [`AnalysisResult`] at the fan-in.

mod section;

pub use section::SectionOutcome;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::patterns::{PatternDetector, PatternRecord, PatternReport};
use crate::pipeline::CancellationToken;
use crate::profiler::ColumnSchema;
use crate::statistics::{StatisticsEngine, StatisticsReport};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vista_learning::{AutoMl, AutoMlOutcome, ModelResult};

/// Everything the Analyze stage produced. Each section is independently
/// completed, skipped or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub statistics: SectionOutcome<StatisticsReport>,
    pub patterns: PatternReport,
    pub model: SectionOutcome<ModelResult>,
}

impl AnalysisResult {
    pub fn statistics(&self) -> Option<&StatisticsReport> {
        self.statistics.completed()
    }

    pub fn model(&self) -> Option<&ModelResult> {
        self.model.completed()
    }

    pub fn pattern_records(&self) -> Vec<PatternRecord> {
        self.patterns.records()
    }

    /// `(section, outcome status, reason)` for all five sections in a fixed
    /// order. `reason` is `None` for completed sections.
    pub fn section_statuses(&self) -> [(&'static str, &'static str, Option<&str>); 5] {
        [
            ("statistics", self.statistics.status(), self.statistics.reason()),
            ("clustering", self.patterns.clustering.status(), self.patterns.clustering.reason()),
            ("anomalies", self.patterns.anomalies.status(), self.patterns.anomalies.reason()),
            ("trends", self.patterns.trends.status(), self.patterns.trends.reason()),
            ("automl", self.model.status(), self.model.reason()),
        ]
    }

    /// Sections that did not complete, with their reasons.
    pub fn incomplete_sections(&self) -> Vec<(&'static str, &'static str, String)> {
        self.section_statuses()
            .into_iter()
            .filter_map(|(name, status, reason)| reason.map(|r| (name, status, r.to_string())))
            .collect()
    }

    /// Failed sections as recoverable errors.
    pub fn recoverable_errors(&self) -> Vec<PipelineError> {
        self.incomplete_sections()
            .into_iter()
            .filter(|(_, status, _)| *status == "failed")
            .map(|(section, _, reason)| PipelineError::Analysis {
                section: section.to_string(),
                reason,
            })
            .collect()
    }
}

/// Runs the three analysis engines with settings taken from a
/// [`PipelineConfig`].
pub struct Analyzer {
    statistics: StatisticsEngine,
    patterns: PatternDetector,
    automl: AutoMl,
    target: Option<String>,
}

impl Analyzer {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::with_automl(config, AutoMl::new(config.automl_config())?))
    }

    /// Use a pre-built AutoML engine, e.g. one with an injected backend.
    pub fn with_automl(config: &PipelineConfig, automl: AutoMl) -> Self {
        Self {
            statistics: StatisticsEngine::new(config.correlation_method),
            patterns: PatternDetector {
                max_clusters: config.max_clusters,
                contamination: config.contamination,
                seed: config.random_seed,
                time_column: config.time_column.clone(),
            },
            automl,
            target: config.target_column.clone(),
        }
    }

    pub fn analyze(
        &self,
        df: &DataFrame,
        schemas: &[ColumnSchema],
        token: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let (statistics, (patterns, model)) = rayon::join(
            || self.statistics.compute(df, schemas),
            || {
                rayon::join(
                    || self.patterns.detect(df, schemas, token),
                    || self.automl.run(df, self.target.as_deref(), token),
                )
            },
        );
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let statistics = match statistics {
            Ok(report) => SectionOutcome::Completed(report),
            Err(e) => {
                warn!("Statistics failed: {}", e);
                SectionOutcome::failed(e.to_string())
            }
        };

        let patterns = match patterns {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Pattern detection failed: {}", e);
                let reason = e.to_string();
                PatternReport {
                    clustering: SectionOutcome::failed(reason.clone()),
                    anomalies: SectionOutcome::failed(reason.clone()),
                    trends: SectionOutcome::failed(reason),
                }
            }
        };

        let model = match model {
            Ok(AutoMlOutcome::Trained(result)) => SectionOutcome::Completed(result),
            Ok(AutoMlOutcome::Skipped { reason }) => {
                info!("AutoML skipped: {}", reason);
                SectionOutcome::skipped(reason)
            }
            Err(e) if e.is_cancelled() => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!("AutoML failed: {}", e);
                SectionOutcome::failed(e.to_string())
            }
        };

        let result = AnalysisResult {
            statistics,
            patterns,
            model,
        };
        info!(
            "Analysis finished: {} pattern records, {} incomplete sections",
            result.pattern_records().len(),
            result.incomplete_sections().len()
        );
        Ok(result)
    }
}
