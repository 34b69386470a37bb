//! Per-column descriptive statistics.

use crate::profiler::{ColumnSchema, InferredType};
use crate::utils::{
    format_timestamp_ms, mean, numeric_values, quantile_sorted, sorted, std_dev,
    timestamp_values, value_counts,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Frequency rows kept per categorical column.
pub const MAX_FREQUENCIES: usize = 20;

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionShape {
    Constant,
    Symmetric,
    RightSkewed,
    LeftSkewed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: usize,
    pub null_count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub skewness: Option<f64>,
    /// Excess kurtosis (0 for a normal distribution).
    pub kurtosis: Option<f64>,
    pub shape: DistributionShape,
    pub heavy_tails: bool,
}

impl NumericStats {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Standard deviation relative to the mean, when both are meaningful.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        match self.std_dev {
            Some(sd) if self.mean.abs() > f64::EPSILON => Some(sd / self.mean.abs()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub value: String,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub count: usize,
    pub null_count: usize,
    pub cardinality: usize,
    pub mode: Option<String>,
    /// Most frequent first, at most [`MAX_FREQUENCIES`] entries.
    pub frequencies: Vec<Frequency>,
    /// Values in categories beyond the listed frequencies.
    pub other_count: usize,
}

impl CategoricalStats {
    pub fn mode_share(&self) -> f64 {
        self.frequencies.first().map(|f| f.share).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatetimeStats {
    pub count: usize,
    pub null_count: usize,
    pub min: String,
    pub max: String,
    pub span_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub count: usize,
    pub null_count: usize,
    pub distinct: usize,
    pub mean_length: f64,
}

/// Statistics appropriate to a column's inferred type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStatistics {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
    Datetime(DatetimeStats),
    Text(TextStats),
    /// No non-null values to describe.
    Empty { null_count: usize },
}

impl ColumnStatistics {
    pub fn as_numeric(&self) -> Option<&NumericStats> {
        match self {
            Self::Numeric(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&CategoricalStats> {
        match self {
            Self::Categorical(stats) => Some(stats),
            _ => None,
        }
    }
}

pub fn describe_column(series: &Series, schema: &ColumnSchema) -> PolarsResult<ColumnStatistics> {
    let null_count = series.null_count();
    if null_count == series.len() {
        return Ok(ColumnStatistics::Empty { null_count });
    }
    Ok(match schema.inferred_type {
        InferredType::Numeric => match describe_numeric(&numeric_values(series)?, null_count) {
            Some(stats) => ColumnStatistics::Numeric(stats),
            None => ColumnStatistics::Empty { null_count },
        },
        InferredType::Categorical | InferredType::Boolean => {
            ColumnStatistics::Categorical(describe_categorical(series, null_count)?)
        }
        InferredType::Datetime => {
            let stamps: Vec<i64> = timestamp_values(series)?.into_iter().flatten().collect();
            match (stamps.iter().min(), stamps.iter().max()) {
                (Some(&min), Some(&max)) => ColumnStatistics::Datetime(DatetimeStats {
                    count: stamps.len(),
                    null_count,
                    min: format_timestamp_ms(min),
                    max: format_timestamp_ms(max),
                    span_days: (max - min) as f64 / MS_PER_DAY,
                }),
                _ => ColumnStatistics::Empty { null_count },
            }
        }
        InferredType::Text => {
            let as_text = series.cast(&DataType::String)?;
            let lengths: Vec<f64> = as_text
                .str()?
                .into_iter()
                .flatten()
                .map(|s| s.chars().count() as f64)
                .collect();
            ColumnStatistics::Text(TextStats {
                count: lengths.len(),
                null_count,
                distinct: series.drop_nulls().n_unique()?,
                mean_length: mean(&lengths).unwrap_or(0.0),
            })
        }
        InferredType::Unknown => ColumnStatistics::Empty { null_count },
    })
}

/// Moments and quartiles of `values`; `None` when empty.
pub fn describe_numeric(values: &[f64], null_count: usize) -> Option<NumericStats> {
    let ordered = sorted(values);
    let m = mean(values)?;
    let n = values.len() as f64;

    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    let (skewness, kurtosis) = if values.len() >= 3 && m2 > 0.0 {
        let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
        let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
        (Some(m3 / m2.powf(1.5)), Some(m4 / (m2 * m2) - 3.0))
    } else {
        (None, None)
    };

    let shape = match skewness {
        _ if m2 == 0.0 => DistributionShape::Constant,
        Some(s) if s >= 0.5 => DistributionShape::RightSkewed,
        Some(s) if s <= -0.5 => DistributionShape::LeftSkewed,
        _ => DistributionShape::Symmetric,
    };

    Some(NumericStats {
        count: values.len(),
        null_count,
        mean: m,
        median: quantile_sorted(&ordered, 0.5)?,
        std_dev: std_dev(values),
        min: *ordered.first()?,
        max: *ordered.last()?,
        q1: quantile_sorted(&ordered, 0.25)?,
        q3: quantile_sorted(&ordered, 0.75)?,
        skewness,
        kurtosis,
        shape,
        heavy_tails: kurtosis.is_some_and(|k| k > 3.0),
    })
}

fn describe_categorical(series: &Series, null_count: usize) -> PolarsResult<CategoricalStats> {
    let counts = value_counts(series)?;
    let count: usize = counts.iter().map(|(_, c)| c).sum();
    let frequencies: Vec<Frequency> = counts
        .iter()
        .take(MAX_FREQUENCIES)
        .map(|(value, c)| Frequency {
            value: value.clone(),
            count: *c,
            share: *c as f64 / count.max(1) as f64,
        })
        .collect();
    let listed: usize = frequencies.iter().map(|f| f.count).sum();
    Ok(CategoricalStats {
        count,
        null_count,
        cardinality: counts.len(),
        mode: counts.first().map(|(v, _)| v.clone()),
        frequencies,
        other_count: count - listed,
    })
}
