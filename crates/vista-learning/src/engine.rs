//! The AutoML engine: target detection, fitting, and baseline fallback.

use crate::backend::{LinearBaseline, ModelBackend, select_backend};
use crate::cancellation::CancellationToken;
use crate::config::AutoMlConfig;
use crate::dataset::TrainingSet;
use crate::error::{LearningError, Result};
use crate::types::AutoMlOutcome;
use polars::prelude::DataFrame;
use tracing::{info, warn};

/// Trains one model per run on a cleaned dataset.
///
/// The backend is fixed at construction. If it fails for any reason other
/// than cancellation, the engine retries once with [`LinearBaseline`] and
/// records the failure as a warning on the result.
///
/// # Example
///
/// ```rust,ignore
/// use vista_learning::{AutoMl, AutoMlConfig, CancellationToken};
///
/// let engine = AutoMl::new(AutoMlConfig::default())?;
/// let outcome = engine.run(&df, Some("revenue"), &CancellationToken::new())?;
/// if let Some(model) = outcome.model() {
///     println!("{} r2={:?}", model.model_name, model.metrics.r2);
/// }
/// ```
pub struct AutoMl {
    config: AutoMlConfig,
    backend: Box<dyn ModelBackend>,
    baseline: LinearBaseline,
}

impl std::fmt::Debug for AutoMl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoMl")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl AutoMl {
    /// Validate `config` and pick the backend it prefers.
    pub fn new(config: AutoMlConfig) -> Result<Self> {
        config.validate()?;
        let backend = select_backend(&config);
        Ok(Self::assemble(config, backend))
    }

    /// Use a caller-supplied backend instead of the built-in selection.
    pub fn with_backend(config: AutoMlConfig, backend: Box<dyn ModelBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: AutoMlConfig, backend: Box<dyn ModelBackend>) -> Self {
        let baseline = LinearBaseline::new(config.clone());
        Self {
            config,
            backend,
            baseline,
        }
    }

    /// Name of the primary backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Engine configuration.
    pub fn config(&self) -> &AutoMlConfig {
        &self.config
    }

    /// Train on `df` against `target`.
    ///
    /// Returns [`AutoMlOutcome::Skipped`] when there is no target or too few
    /// usable rows. Other data problems (missing column, constant target, no
    /// usable features) are errors.
    pub fn run(
        &self,
        df: &DataFrame,
        target: Option<&str>,
        token: &CancellationToken,
    ) -> Result<AutoMlOutcome> {
        let Some(target) = target else {
            return Ok(AutoMlOutcome::Skipped {
                reason: "no target provided".to_string(),
            });
        };

        let data = match TrainingSet::from_dataframe(df, target, &self.config) {
            Ok(data) => data,
            Err(LearningError::InsufficientData { rows, required }) => {
                info!("Skipping model training: {} rows, {} required", rows, required);
                return Ok(AutoMlOutcome::Skipped {
                    reason: format!("insufficient rows: {rows} usable, at least {required} required"),
                });
            }
            Err(e) => return Err(e),
        };

        token.check()?;

        info!(
            "Training {} model for '{}' with {} ({} train / {} test rows)",
            data.task_type.as_str(),
            target,
            self.backend.name(),
            data.train_idx.len(),
            data.test_idx.len()
        );

        match self.backend.fit(&data, token) {
            Ok(result) => Ok(AutoMlOutcome::Trained(result)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) if self.backend.name() != self.baseline.name() => {
                warn!("{} failed ({}), falling back to {}", self.backend.name(), e, self.baseline.name());
                let mut result = self.baseline.fit(&data, token)?;
                result
                    .warnings
                    .push(format!("{} backend failed: {}", self.backend.name(), e));
                Ok(AutoMlOutcome::Trained(result))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v * 1.5 + 2.0).collect();
        df!("x" => x, "y" => y).unwrap()
    }

    #[test]
    fn test_no_target_is_skipped() {
        let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
        let outcome = engine.run(&frame(40), None, &CancellationToken::new()).unwrap();
        assert_eq!(
            outcome,
            AutoMlOutcome::Skipped {
                reason: "no target provided".to_string()
            }
        );
    }

    #[test]
    fn test_few_rows_is_skipped() {
        let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
        let outcome = engine
            .run(&frame(5), Some("y"), &CancellationToken::new())
            .unwrap();
        match outcome {
            AutoMlOutcome::Skipped { reason } => assert!(reason.starts_with("insufficient rows")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_target_is_error() {
        let engine = AutoMl::new(AutoMlConfig::default()).unwrap();
        let err = engine
            .run(&frame(40), Some("nope"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, LearningError::TargetNotFound(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AutoMlConfig {
            test_size: 1.5,
            ..AutoMlConfig::default()
        };
        assert!(AutoMl::new(config).is_err());
    }
}
