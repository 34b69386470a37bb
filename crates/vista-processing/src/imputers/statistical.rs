//! Statistical fills for missing values.
//!
//! Each function returns the filled Series together with the value (or
//! strategy) used, or `None` when there is nothing to fill from.

use crate::config::{CategoricalImputation, DatetimeFill, NumericImputation};
use crate::utils::{mean, optional_values, quantile_sorted, sorted, string_mode};
use polars::prelude::*;

/// Sentinel category for [`CategoricalImputation::Missing`].
pub const MISSING_CATEGORY: &str = "missing";

/// A filled column and a short description of the fill.
#[derive(Debug)]
pub struct Filled {
    pub series: Series,
    pub description: String,
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Fill numeric nulls with the mean, median or zero.
    pub fn fill_numeric(series: &Series, strategy: NumericImputation) -> PolarsResult<Option<Filled>> {
        let values = optional_values(series)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let (fill, label) = match strategy {
            NumericImputation::Mean => (mean(&present), "mean"),
            NumericImputation::Median => (quantile_sorted(&sorted(&present), 0.5), "median"),
            NumericImputation::Zero => (Some(0.0), "zero"),
        };
        let Some(fill) = fill else {
            return Ok(None);
        };
        let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(fill)).collect();
        Ok(Some(Filled {
            series: Series::new(series.name().clone(), filled),
            description: format!("{} ({})", label, fill),
        }))
    }

    /// Fill categorical nulls with the mode or the `"missing"` sentinel.
    pub fn fill_categorical(
        series: &Series,
        strategy: CategoricalImputation,
    ) -> PolarsResult<Option<Filled>> {
        let (fill, label) = match strategy {
            CategoricalImputation::Mode => match string_mode(series) {
                Some(mode) => (mode, "mode"),
                None => return Ok(None),
            },
            CategoricalImputation::Missing => (MISSING_CATEGORY.to_string(), "sentinel"),
        };
        let as_text = series.cast(&DataType::String)?;
        let filled: Vec<&str> = as_text
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or(fill.as_str()))
            .collect();
        Ok(Some(Filled {
            series: Series::new(series.name().clone(), filled),
            description: format!("{} '{}'", label, fill),
        }))
    }

    /// Fill boolean nulls with the more frequent value (ties go to `false`).
    pub fn fill_boolean(series: &Series) -> PolarsResult<Option<Filled>> {
        let values: Vec<Option<bool>> = series.bool()?.into_iter().collect();
        let trues = values.iter().filter(|v| **v == Some(true)).count();
        let falses = values.iter().filter(|v| **v == Some(false)).count();
        if trues + falses == 0 {
            return Ok(None);
        }
        let fill = trues > falses;
        let filled: Vec<bool> = values.iter().map(|v| v.unwrap_or(fill)).collect();
        Ok(Some(Filled {
            series: Series::new(series.name().clone(), filled),
            description: format!("mode ({})", fill),
        }))
    }

    /// Forward or backward fill for datetimes. [`DatetimeFill::Leave`] is a
    /// no-op.
    pub fn fill_datetime(series: &Series, strategy: DatetimeFill) -> PolarsResult<Option<Filled>> {
        let (fill_strategy, label) = match strategy {
            DatetimeFill::Leave => return Ok(None),
            DatetimeFill::Forward => (FillNullStrategy::Forward(None), "forward fill"),
            DatetimeFill::Backward => (FillNullStrategy::Backward(None), "backward fill"),
        };
        Ok(Some(Filled {
            series: series.fill_null(fill_strategy)?,
            description: label.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_median() {
        let series = Series::new("x".into(), &[Some(1.0), None, Some(3.0), Some(10.0)]);
        let filled = StatisticalImputer::fill_numeric(&series, NumericImputation::Median)
            .unwrap()
            .unwrap();
        assert_eq!(filled.series.null_count(), 0);
        assert_eq!(filled.series.f64().unwrap().get(1), Some(3.0));
    }

    #[test]
    fn test_numeric_all_null_has_nothing_to_fill() {
        let series = Series::new("x".into(), &[None::<f64>, None]);
        assert!(
            StatisticalImputer::fill_numeric(&series, NumericImputation::Mean)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_categorical_strategies() {
        let series = Series::new("c".into(), &[Some("a"), None, Some("b"), Some("a")]);
        let mode = StatisticalImputer::fill_categorical(&series, CategoricalImputation::Mode)
            .unwrap()
            .unwrap();
        assert_eq!(mode.series.str().unwrap().get(1), Some("a"));
        let sentinel = StatisticalImputer::fill_categorical(&series, CategoricalImputation::Missing)
            .unwrap()
            .unwrap();
        assert_eq!(sentinel.series.str().unwrap().get(1), Some(MISSING_CATEGORY));
    }

    #[test]
    fn test_datetime_leave_and_forward() {
        let series = Series::new("d".into(), &[Some(1i64), None, Some(3)]);
        assert!(
            StatisticalImputer::fill_datetime(&series, DatetimeFill::Leave)
                .unwrap()
                .is_none()
        );
        let filled = StatisticalImputer::fill_datetime(&series, DatetimeFill::Forward)
            .unwrap()
            .unwrap();
        assert_eq!(filled.series.i64().unwrap().get(1), Some(1));
    }
}
