//! Threshold checks over a typed dataset.

use crate::config::{OutlierMethod, ValidationThresholds};
use crate::error::Result;
use crate::profiler::ColumnSchema;
use crate::utils::{mean, numeric_values, quantile_sorted, round_to, sorted, std_dev};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Kind of problem a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    NullRateExceeded,
    TypeMismatch,
    DuplicateRows,
    OutlierCount,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NullRateExceeded => "null_rate_exceeded",
            Self::TypeMismatch => "type_mismatch",
            Self::DuplicateRows => "duplicate_rows",
            Self::OutlierCount => "outlier_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One validation finding. `column` is `None` for dataset-wide checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub column: Option<String>,
    pub issue_kind: IssueKind,
    pub severity: Severity,
    pub count: usize,
    /// `count` as a share of the rows (or non-null values) checked.
    pub rate: f64,
    pub message: String,
    pub suggested_action: String,
}

/// Bounds outside which values of a numeric column count as outliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFence {
    pub column: String,
    pub method: OutlierMethod,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub columns: usize,
    pub findings: Vec<ValidationFinding>,
    pub outlier_fences: Vec<OutlierFence>,
    pub duplicate_rows: usize,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn fence(&self, column: &str) -> Option<&OutlierFence> {
        self.outlier_fences.iter().find(|f| f.column == column)
    }

    pub fn findings_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(move |f| f.issue_kind == kind)
    }

    /// One line per error finding, for a strict-mode failure message.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|f| f.message.clone())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs the independent checks: null rate, type mismatch, duplicate rows,
/// outliers.
pub struct Validator<'a> {
    thresholds: &'a ValidationThresholds,
}

impl<'a> Validator<'a> {
    pub fn new(thresholds: &'a ValidationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn validate(&self, df: &DataFrame, schemas: &[ColumnSchema]) -> Result<ValidationReport> {
        let rows = df.height();
        let mut report = ValidationReport {
            rows,
            columns: df.width(),
            ..Default::default()
        };

        for schema in schemas {
            if let Some(finding) = self.check_nulls(schema, rows) {
                report.findings.push(finding);
            }
            if let Some(finding) = self.check_type_mismatch(schema, rows) {
                report.findings.push(finding);
            }
        }

        if self.thresholds.check_duplicates {
            let duplicates = count_duplicate_rows(df)?;
            report.duplicate_rows = duplicates;
            if duplicates > 0 {
                report.findings.push(self.duplicate_finding(duplicates, rows));
            }
        }

        for schema in schemas.iter().filter(|s| s.is_numeric()) {
            let series = df.column(&schema.name)?.as_materialized_series();
            let values = numeric_values(series)?;
            let Some(fence) = self.outlier_fence(&schema.name, &values) else {
                continue;
            };
            if fence.count > 0 {
                debug!(
                    "Column '{}': {} outliers outside [{}, {}]",
                    fence.column, fence.count, fence.lower, fence.upper
                );
                report.findings.push(outlier_finding(&fence, values.len()));
                report.outlier_fences.push(fence);
            }
        }

        info!(
            "Validation found {} errors and {} warnings",
            report.errors().count(),
            report.warnings().count()
        );
        Ok(report)
    }

    fn check_nulls(&self, schema: &ColumnSchema, rows: usize) -> Option<ValidationFinding> {
        if rows == 0 {
            return None;
        }
        let rate = schema.null_count as f64 / rows as f64;
        if rate <= self.thresholds.max_null_rate {
            return None;
        }
        let (severity, suggested_action) = if rate > self.thresholds.null_rate_ceiling {
            (Severity::Error, "drop the column or fix the upstream export")
        } else {
            (Severity::Warning, "impute missing values or collect more complete data")
        };
        Some(ValidationFinding {
            column: Some(schema.name.clone()),
            issue_kind: IssueKind::NullRateExceeded,
            severity,
            count: schema.null_count,
            rate,
            message: format!(
                "Column '{}' is {:.1}% null (limit {:.1}%)",
                schema.name,
                rate * 100.0,
                self.thresholds.max_null_rate * 100.0
            ),
            suggested_action: suggested_action.to_string(),
        })
    }

    fn check_type_mismatch(&self, schema: &ColumnSchema, rows: usize) -> Option<ValidationFinding> {
        if schema.coercion_loss == 0 {
            return None;
        }
        let checked = rows.saturating_sub(schema.null_count).max(1);
        let rate = schema.coercion_loss as f64 / checked as f64;
        let suggested_action = if rate > self.thresholds.max_type_mismatch_rate {
            "review the source format; the column may hold mixed types"
        } else {
            "unparseable values were set to null and will be imputed"
        };
        Some(ValidationFinding {
            column: Some(schema.name.clone()),
            issue_kind: IssueKind::TypeMismatch,
            severity: Severity::Warning,
            count: schema.coercion_loss,
            rate,
            message: format!(
                "Column '{}' has {} values that are not {}",
                schema.name, schema.coercion_loss, schema.inferred_type
            ),
            suggested_action: suggested_action.to_string(),
        })
    }

    fn duplicate_finding(&self, duplicates: usize, rows: usize) -> ValidationFinding {
        let rate = duplicates as f64 / rows.max(1) as f64;
        let severity = if rate > self.thresholds.max_duplicate_rate {
            Severity::Error
        } else {
            Severity::Warning
        };
        ValidationFinding {
            column: None,
            issue_kind: IssueKind::DuplicateRows,
            severity,
            count: duplicates,
            rate,
            message: format!(
                "{} of {} rows ({:.1}%) duplicate an earlier row",
                duplicates,
                rows,
                rate * 100.0
            ),
            suggested_action: "confirm whether repeated rows are legitimate before deduplicating"
                .to_string(),
        }
    }

    /// Fence for `values` under the configured method; `None` when the
    /// column has too few values or no spread.
    pub fn outlier_fence(&self, column: &str, values: &[f64]) -> Option<OutlierFence> {
        if values.len() < 4 {
            return None;
        }
        let method = self.thresholds.outlier_method;
        let (lower, upper) = match method {
            OutlierMethod::Iqr => {
                let ordered = sorted(values);
                let q1 = quantile_sorted(&ordered, 0.25)?;
                let q3 = quantile_sorted(&ordered, 0.75)?;
                let spread = (q3 - q1) * self.thresholds.iqr_multiplier;
                (q1 - spread, q3 + spread)
            }
            OutlierMethod::ZScore => {
                let m = mean(values)?;
                let sd = std_dev(values)?;
                if sd == 0.0 {
                    return None;
                }
                let spread = sd * self.thresholds.zscore_threshold;
                (m - spread, m + spread)
            }
        };
        let count = values.iter().filter(|v| **v < lower || **v > upper).count();
        Some(OutlierFence {
            column: column.to_string(),
            method,
            lower,
            upper,
            count,
        })
    }
}

fn outlier_finding(fence: &OutlierFence, checked: usize) -> ValidationFinding {
    let rate = fence.count as f64 / checked.max(1) as f64;
    ValidationFinding {
        column: Some(fence.column.clone()),
        issue_kind: IssueKind::OutlierCount,
        severity: Severity::Warning,
        count: fence.count,
        rate,
        message: format!(
            "Column '{}' has {} outliers outside [{}, {}]",
            fence.column,
            fence.count,
            round_to(fence.lower, 4),
            round_to(fence.upper, 4)
        ),
        suggested_action: "investigate the data collection process for these values".to_string(),
    }
}

/// Rows identical to an earlier row.
pub fn count_duplicate_rows(df: &DataFrame) -> PolarsResult<usize> {
    if df.height() == 0 {
        return Ok(0);
    }
    let unique = df.unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?;
    Ok(df.height() - unique.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::SchemaInferer;
    use pretty_assertions::assert_eq;

    fn validate(df: &DataFrame, thresholds: &ValidationThresholds) -> ValidationReport {
        let inferred = SchemaInferer::default().infer(df).unwrap();
        Validator::new(thresholds)
            .validate(&inferred.frame, &inferred.schemas)
            .unwrap()
    }

    #[test]
    fn test_identical_rows_count_all_but_one() {
        let df = df!(
            "a" => vec!["1"; 1000],
            "b" => vec!["x"; 1000]
        )
        .unwrap();
        let report = validate(&df, &ValidationThresholds::default());
        assert_eq!(report.duplicate_rows, 999);
        let finding = report.findings_of(IssueKind::DuplicateRows).next().unwrap();
        assert_eq!(finding.count, 999);
        assert_eq!(finding.severity, Severity::Error);
    }

    #[test]
    fn test_null_rate_severity() {
        let mut mostly_null: Vec<Option<&str>> = vec![None; 97];
        mostly_null.extend([Some("1"), Some("2"), Some("3")]);
        let mut half_null: Vec<Option<&str>> = vec![None; 60];
        half_null.extend(vec![Some("a"); 40]);
        let df = df!("sparse" => mostly_null, "patchy" => half_null).unwrap();

        let report = validate(&df, &ValidationThresholds::default());
        let nulls: Vec<(Option<String>, Severity)> = report
            .findings_of(IssueKind::NullRateExceeded)
            .map(|f| (f.column.clone(), f.severity))
            .collect();
        assert_eq!(
            nulls,
            vec![
                (Some("sparse".to_string()), Severity::Error),
                (Some("patchy".to_string()), Severity::Warning)
            ]
        );
        assert!(report.has_errors());
        assert!(report.error_summary().contains("97.0%"));
    }

    #[test]
    fn test_iqr_outliers() {
        let mut values: Vec<f64> = (1..=20).map(f64::from).collect();
        values.push(500.0);
        let df = df!("v" => values).unwrap();
        let report = validate(&df, &ValidationThresholds::default());
        let fence = report.fence("v").unwrap();
        assert_eq!(fence.count, 1);
        assert!(fence.upper < 500.0);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_zscore_outliers() {
        let mut values = vec![10.0; 50];
        values.extend([11.0, 9.0, 10.5, 9.5, 100.0]);
        let thresholds = ValidationThresholds {
            outlier_method: OutlierMethod::ZScore,
            ..Default::default()
        };
        let df = df!("v" => values).unwrap();
        let report = validate(&df, &thresholds);
        assert_eq!(report.fence("v").unwrap().count, 1);
    }

    #[test]
    fn test_type_mismatch_from_coercion() {
        let mut values: Vec<&str> = vec!["5"; 39];
        values.push("five");
        let df = df!("n" => values).unwrap();
        let report = validate(&df, &ValidationThresholds::default());
        let finding = report.findings_of(IssueKind::TypeMismatch).next().unwrap();
        assert_eq!(finding.count, 1);
        assert_eq!(finding.severity, Severity::Warning);
    }

    #[test]
    fn test_duplicate_check_can_be_disabled() {
        let df = df!("a" => vec!["1"; 10]).unwrap();
        let thresholds = ValidationThresholds {
            check_duplicates: false,
            ..Default::default()
        };
        let report = validate(&df, &thresholds);
        assert_eq!(report.duplicate_rows, 0);
        assert_eq!(report.findings_of(IssueKind::DuplicateRows).count(), 0);
    }
}
