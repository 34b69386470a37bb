//! Builder for [`Pipeline`].

use super::executor::Pipeline;
use super::progress::{CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate};
use super::run::RunRegistry;
use crate::analysis::Analyzer;
use crate::config::PipelineConfig;
use crate::dashboard::{ChartRegistry, DashboardGenerator};
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use vista_learning::AutoMl;

/// Builder for creating a [`Pipeline`] with custom configuration.
///
/// Strategies (AutoML backend, chart renderers) are chosen here, once, and
/// never probed again while a run executes.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    reporters: Vec<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
    registry: Option<RunRegistry>,
    automl: Option<AutoMl>,
    charts: Option<ChartRegistry>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Subscribe a progress reporter. May be called more than once.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Subscribe a closure to progress updates.
    ///
    /// This is a convenience method that wraps the closure in a
    /// [`ClosureProgressReporter`].
    pub fn on_progress<F>(self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter(Arc::new(ClosureProgressReporter::new(callback)))
    }

    /// Set a cancellation token shared with the caller.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Record runs in an existing registry instead of a private one.
    pub fn registry(mut self, registry: RunRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a pre-built AutoML engine, e.g. one with an injected backend.
    pub fn automl(mut self, automl: AutoMl) -> Self {
        self.automl = Some(automl);
        self
    }

    /// Replace the default chart renderers.
    pub fn chart_registry(mut self, charts: ChartRegistry) -> Self {
        self.charts = Some(charts);
        self
    }

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let analyzer = match self.automl {
            Some(automl) => Analyzer::with_automl(&config, automl),
            None => Analyzer::new(&config)?,
        };
        let dashboard = DashboardGenerator::with_registry(
            self.charts.unwrap_or_default(),
            config.theme,
            config.compress_payload,
        );

        Ok(Pipeline::from_parts(
            config,
            self.reporters,
            self.cancellation_token.unwrap_or_default(),
            self.registry.unwrap_or_default(),
            analyzer,
            dashboard,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationThresholds;

    #[test]
    fn test_build_default() {
        let pipeline = PipelineBuilder::default().build().unwrap();
        assert!(pipeline.registry().is_empty());
        assert!(!pipeline.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PipelineConfig {
            validation: ValidationThresholds {
                max_null_rate: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = PipelineBuilder::default().config(config).build().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_shared_token() {
        let token = CancellationToken::new();
        let pipeline = PipelineBuilder::default()
            .cancellation_token(token.clone())
            .build()
            .unwrap();
        token.cancel();
        assert!(pipeline.cancellation_token().is_cancelled());
    }
}
