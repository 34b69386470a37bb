//! Data transformation: deduplication, outlier capping and imputation.
//!
//! [`DataTransformer`] applies the cleaning policy from
//! [`PipelineConfig`] guided by the validator's findings. Every operation is
//! recorded in a [`TransformationLog`] with before/after counts. A failure
//! on one column is logged as skipped and the remaining columns are still
//! processed.

mod outliers;

pub use outliers::cap_at_fence;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::imputers::{Filled, StatisticalImputer};
use crate::pipeline::CancellationToken;
use crate::profiler::{ColumnSchema, InferredType};
use crate::quality::ValidationReport;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Kind of cleaning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Unparseable values nulled during type inference.
    CoerceType,
    RemoveDuplicates,
    CapOutliers,
    ImputeNumeric,
    ImputeCategorical,
    ImputeBoolean,
    FillDatetime,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoerceType => "coerce_type",
            Self::RemoveDuplicates => "remove_duplicates",
            Self::CapOutliers => "cap_outliers",
            Self::ImputeNumeric => "impute_numeric",
            Self::ImputeCategorical => "impute_categorical",
            Self::ImputeBoolean => "impute_boolean",
            Self::FillDatetime => "fill_datetime",
        }
    }
}

/// One applied operation. `before`/`after` count the affected quantity:
/// nulls for fills, out-of-fence values for capping, rows for dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationStep {
    pub column: Option<String>,
    pub operation: Operation,
    pub before: usize,
    pub after: usize,
    pub detail: String,
}

/// A column operation that failed and was left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTransformation {
    pub column: String,
    pub operation: Operation,
    pub reason: String,
}

impl SkippedTransformation {
    pub fn to_error(&self) -> PipelineError {
        PipelineError::Transformation {
            column: self.column.clone(),
            reason: format!("{}: {}", self.operation.as_str(), self.reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationLog {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Share of non-null cells before cleaning.
    pub completeness_before: f64,
    pub completeness_after: f64,
    pub steps: Vec<TransformationStep>,
    pub skipped: Vec<SkippedTransformation>,
}

impl TransformationLog {
    pub fn steps_for<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a TransformationStep> {
        self.steps
            .iter()
            .filter(move |s| s.column.as_deref() == Some(column))
    }
}

/// Share of non-null cells in `df`; 1.0 for an empty frame.
pub fn completeness(df: &DataFrame) -> f64 {
    let cells = df.height() * df.width();
    if cells == 0 {
        return 1.0;
    }
    let nulls: usize = df.get_columns().iter().map(|c| c.null_count()).sum();
    1.0 - nulls as f64 / cells as f64
}

/// Applies the cleaning policy to a typed frame.
pub struct DataTransformer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DataTransformer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    pub fn transform(
        &self,
        mut df: DataFrame,
        schemas: &[ColumnSchema],
        report: &ValidationReport,
        token: &CancellationToken,
    ) -> Result<(DataFrame, TransformationLog)> {
        let mut log = TransformationLog {
            rows_before: df.height(),
            completeness_before: completeness(&df),
            ..Default::default()
        };

        for schema in schemas.iter().filter(|s| s.coercion_loss > 0) {
            log.steps.push(TransformationStep {
                column: Some(schema.name.clone()),
                operation: Operation::CoerceType,
                before: schema.coercion_loss,
                after: 0,
                detail: format!(
                    "{} values not parseable as {} set to null",
                    schema.coercion_loss, schema.inferred_type
                ),
            });
        }

        if self.config.remove_duplicates {
            let before = df.height();
            df = df.unique_stable::<&str, &str>(None, UniqueKeepStrategy::First, None)?;
            let removed = before - df.height();
            info!("Removed {} duplicate rows", removed);
            log.steps.push(TransformationStep {
                column: None,
                operation: Operation::RemoveDuplicates,
                before,
                after: df.height(),
                detail: format!("removed {} duplicate rows", removed),
            });
        }

        for schema in schemas {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            // Model labels stay as observed; AutoML drops rows without one.
            if self.config.target_column.as_deref() == Some(schema.name.as_str()) {
                debug!("Leaving target column '{}' uncleaned", schema.name);
                continue;
            }
            if self.config.cap_outliers
                && let Some(fence) = report.fence(&schema.name)
            {
                let result = df
                    .column(&schema.name)
                    .map_err(PipelineError::from)
                    .and_then(|c| {
                        cap_at_fence(c.as_materialized_series(), fence).map_err(PipelineError::from)
                    });
                match result {
                    Ok((capped, moved)) => {
                        df.replace(&schema.name, capped)?;
                        log.steps.push(TransformationStep {
                            column: Some(schema.name.clone()),
                            operation: Operation::CapOutliers,
                            before: moved,
                            after: 0,
                            detail: format!(
                                "capped {} values to [{:.4}, {:.4}]",
                                moved, fence.lower, fence.upper
                            ),
                        });
                    }
                    Err(e) => skip(&mut log, &schema.name, Operation::CapOutliers, e),
                }
            }

            self.impute_column(&mut df, schema, &mut log)?;
        }

        log.rows_after = df.height();
        log.completeness_after = completeness(&df);
        info!(
            "Transformation applied {} steps ({} skipped), completeness {:.3} -> {:.3}",
            log.steps.len(),
            log.skipped.len(),
            log.completeness_before,
            log.completeness_after
        );
        Ok((df, log))
    }

    fn impute_column(
        &self,
        df: &mut DataFrame,
        schema: &ColumnSchema,
        log: &mut TransformationLog,
    ) -> Result<()> {
        let series = df.column(&schema.name)?.as_materialized_series().clone();
        let nulls = series.null_count();
        if nulls == 0 {
            return Ok(());
        }

        let (operation, filled) = match schema.inferred_type {
            InferredType::Numeric => (
                Operation::ImputeNumeric,
                StatisticalImputer::fill_numeric(&series, self.config.numeric_imputation),
            ),
            InferredType::Categorical => (
                Operation::ImputeCategorical,
                StatisticalImputer::fill_categorical(&series, self.config.categorical_imputation),
            ),
            InferredType::Boolean => (
                Operation::ImputeBoolean,
                StatisticalImputer::fill_boolean(&series),
            ),
            InferredType::Datetime => (
                Operation::FillDatetime,
                StatisticalImputer::fill_datetime(&series, self.config.datetime_fill),
            ),
            InferredType::Text | InferredType::Unknown => return Ok(()),
        };

        match filled {
            Ok(Some(Filled {
                series: filled,
                description,
            })) => {
                let after = filled.null_count();
                df.replace(&schema.name, filled)?;
                debug!("Filled {} nulls in '{}' with {}", nulls - after, schema.name, description);
                log.steps.push(TransformationStep {
                    column: Some(schema.name.clone()),
                    operation,
                    before: nulls,
                    after,
                    detail: format!("filled {} nulls with {}", nulls - after, description),
                });
            }
            Ok(None) => {}
            Err(e) => skip(log, &schema.name, operation, PipelineError::from(e)),
        }
        Ok(())
    }
}

fn skip(log: &mut TransformationLog, column: &str, operation: Operation, error: PipelineError) {
    warn!("Skipping {} on '{}': {}", operation.as_str(), column, error);
    log.skipped.push(SkippedTransformation {
        column: column.to_string(),
        operation,
        reason: error.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoricalImputation;
    use crate::profiler::SchemaInferer;
    use crate::quality::Validator;
    use pretty_assertions::assert_eq;

    fn run(df: DataFrame, config: &PipelineConfig) -> (DataFrame, TransformationLog) {
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        let report = Validator::new(&config.validation)
            .validate(&inferred.frame, &inferred.schemas)
            .unwrap();
        DataTransformer::new(config)
            .transform(
                inferred.frame,
                &inferred.schemas,
                &report,
                &CancellationToken::new(),
            )
            .unwrap()
    }

    fn messy() -> DataFrame {
        df!(
            "amount" => &[Some("10"), None, Some("12"), Some("11"), Some("13"), Some("900"), Some("12"), Some("10")],
            "region" => &[Some("N"), Some("S"), None, Some("N"), Some("N"), Some("S"), Some("E"), Some("N")],
            "when" => &[Some("2024-01-01"), None, Some("2024-01-03"), Some("2024-01-04"),
                        Some("2024-01-05"), Some("2024-01-06"), Some("2024-01-07"), Some("2024-01-08")]
        )
        .unwrap()
    }

    #[test]
    fn test_default_policy() {
        let (df, log) = run(messy(), &PipelineConfig::default());
        assert_eq!(df.height(), 8);
        assert_eq!(df.column("amount").unwrap().null_count(), 0);
        assert_eq!(df.column("region").unwrap().null_count(), 0);
        // datetimes are left alone by default
        assert_eq!(df.column("when").unwrap().null_count(), 1);

        let ops: Vec<Operation> = log.steps.iter().map(|s| s.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::CapOutliers,
                Operation::ImputeNumeric,
                Operation::ImputeCategorical
            ]
        );
        let amount = df.column("amount").unwrap().as_materialized_series().clone();
        let max = amount.f64().unwrap().into_iter().flatten().fold(f64::MIN, f64::max);
        assert!(max < 900.0);
        assert!(log.completeness_after > log.completeness_before);
    }

    #[test]
    fn test_sentinel_and_no_capping() {
        let config = PipelineConfig {
            categorical_imputation: CategoricalImputation::Missing,
            cap_outliers: false,
            ..Default::default()
        };
        let (df, log) = run(messy(), &config);
        let region = df.column("region").unwrap().as_materialized_series().clone();
        assert_eq!(region.str().unwrap().get(2), Some("missing"));
        assert!(log.steps.iter().all(|s| s.operation != Operation::CapOutliers));
    }

    #[test]
    fn test_target_column_left_untouched() {
        let config = PipelineConfig {
            target_column: Some("amount".to_string()),
            ..Default::default()
        };
        let (df, log) = run(messy(), &config);
        let amount = df.column("amount").unwrap().as_materialized_series().clone();
        assert_eq!(amount.null_count(), 1);
        assert_eq!(amount.f64().unwrap().get(5), Some(900.0));
        assert_eq!(log.steps_for("amount").count(), 0);
        // other columns are still cleaned
        assert_eq!(df.column("region").unwrap().null_count(), 0);
    }

    #[test]
    fn test_duplicates_kept_unless_enabled() {
        let df = df!("a" => vec!["1"; 1000], "b" => vec!["x"; 1000]).unwrap();
        let (kept, log) = run(df.clone(), &PipelineConfig::default());
        assert_eq!(kept.height(), 1000);
        assert_eq!(log.rows_after, log.rows_before);

        let config = PipelineConfig {
            remove_duplicates: true,
            ..Default::default()
        };
        let (deduped, log) = run(df, &config);
        assert_eq!(deduped.height(), 1);
        assert_eq!(log.steps[0].operation, Operation::RemoveDuplicates);
        assert_eq!((log.steps[0].before, log.steps[0].after), (1000, 1));
    }

    #[test]
    fn test_cancelled_transform() {
        let config = PipelineConfig::default();
        let inferred = SchemaInferer::default().infer(&messy()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = DataTransformer::new(&config)
            .transform(
                inferred.frame,
                &inferred.schemas,
                &ValidationReport::default(),
                &token,
            )
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_completeness() {
        let df = df!("a" => &[Some(1.0), None], "b" => &[Some(1.0), Some(2.0)]).unwrap();
        assert_eq!(completeness(&df), 0.75);
    }
}
