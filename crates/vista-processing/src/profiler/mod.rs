//! Schema inference for freshly loaded data.
//!
//! [`SchemaInferer`] decides a type for each column, converts the column to
//! that type and records a [`ColumnSchema`]. The input frame is not
//! modified; a typed copy is returned alongside the schemas.

mod type_inference;

pub use type_inference::{InferredType, PARSE_THRESHOLD};

use crate::error::Result;
use crate::utils::{
    DecimalSeparator, collect_sample_values, format_number, format_timestamp_ms, numeric_values,
    timestamp_values,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use type_inference::{Coerced, Detection, coerce_strings, detect_native_type, detect_string_type};

/// Metadata inferred for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub inferred_type: InferredType,
    /// Numeric column whose values are all whole numbers.
    pub integer: bool,
    pub nullable: bool,
    /// Nulls present in the input, before coercion.
    pub null_count: usize,
    /// Non-null input values that could not be parsed as `inferred_type`.
    pub coercion_loss: usize,
    /// Distinct non-null values after coercion.
    pub cardinality: usize,
    pub min: Option<String>,
    pub max: Option<String>,
    pub sample_values: Vec<String>,
    /// chrono pattern used to parse a datetime column from text.
    pub datetime_format: Option<String>,
}

impl ColumnSchema {
    pub fn is_numeric(&self) -> bool {
        self.inferred_type == InferredType::Numeric
    }

    pub fn is_categorical(&self) -> bool {
        matches!(
            self.inferred_type,
            InferredType::Categorical | InferredType::Boolean
        )
    }
}

/// A typed copy of the input plus one schema per column, in column order.
#[derive(Debug, Clone)]
pub struct InferredFrame {
    pub frame: DataFrame,
    pub schemas: Vec<ColumnSchema>,
}

/// Infers column types and coerces string columns to them.
#[derive(Debug, Clone)]
pub struct SchemaInferer {
    cardinality_ratio: f64,
    sample_limit: Option<usize>,
    decimal_separator: DecimalSeparator,
}

impl Default for SchemaInferer {
    fn default() -> Self {
        Self {
            cardinality_ratio: 0.5,
            sample_limit: None,
            decimal_separator: DecimalSeparator::Point,
        }
    }
}

impl SchemaInferer {
    /// `cardinality_ratio`: distinct/non-null ratio at or below which a text
    /// column is categorical. `sample_limit`: at most this many values are
    /// tried per parser (evenly spaced through the column).
    pub fn new(cardinality_ratio: f64, sample_limit: Option<usize>) -> Self {
        Self {
            cardinality_ratio,
            sample_limit,
            ..Self::default()
        }
    }

    /// Separator used when parsing numbers held in string columns.
    pub fn decimal_separator(mut self, separator: DecimalSeparator) -> Self {
        self.decimal_separator = separator;
        self
    }

    pub fn infer(&self, df: &DataFrame) -> Result<InferredFrame> {
        let mut columns = Vec::with_capacity(df.width());
        let mut schemas = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let (coerced, detection) = self.infer_column(series)?;
            let schema = build_schema(series, &coerced, detection)?;
            debug!(
                "Column '{}' inferred as {} ({} coercion losses)",
                schema.name, schema.inferred_type, schema.coercion_loss
            );
            schemas.push(schema);
            columns.push(coerced.series.into_column());
        }

        Ok(InferredFrame {
            frame: DataFrame::new(columns)?,
            schemas,
        })
    }

    fn infer_column(&self, series: &Series) -> Result<(Coerced, Detection)> {
        if let Some(detection) = detect_native_type(series.dtype()) {
            let target = match detection {
                Detection::Integer | Detection::Float => DataType::Float64,
                Detection::Datetime(_) => DataType::Datetime(TimeUnit::Milliseconds, None),
                Detection::Boolean => DataType::Boolean,
                _ => DataType::String,
            };
            let converted = series.cast(&target)?;
            return Ok((
                Coerced {
                    series: converted,
                    loss: 0,
                },
                detection,
            ));
        }

        let as_text = series.cast(&DataType::String)?;
        let raw: Vec<Option<&str>> = as_text.str()?.into_iter().collect();
        let present: Vec<&str> = raw.iter().flatten().copied().collect();
        let sample = self.sample(&present);
        let detection = detect_string_type(
            &sample,
            &present,
            self.cardinality_ratio,
            self.decimal_separator,
        );
        Ok((
            coerce_strings(series.name(), &raw, detection, self.decimal_separator),
            detection,
        ))
    }

    fn sample<'a>(&self, present: &[&'a str]) -> Vec<&'a str> {
        match self.sample_limit {
            Some(limit) if limit > 0 && present.len() > limit => {
                let stride = present.len().div_ceil(limit);
                present.iter().step_by(stride).copied().collect()
            }
            _ => present.to_vec(),
        }
    }
}

fn build_schema(input: &Series, coerced: &Coerced, detection: Detection) -> Result<ColumnSchema> {
    let series = &coerced.series;
    let inferred_type = detection.inferred_type();
    let cardinality = series.drop_nulls().n_unique()?;

    let (min, max, integer) = match inferred_type {
        InferredType::Numeric => {
            let values = numeric_values(series)?;
            let integer = values.iter().all(|v| v.fract() == 0.0);
            let min = values.iter().copied().reduce(f64::min).map(format_number);
            let max = values.iter().copied().reduce(f64::max).map(format_number);
            (min, max, integer)
        }
        InferredType::Datetime => {
            let stamps: Vec<i64> = timestamp_values(series)?.into_iter().flatten().collect();
            let min = stamps.iter().min().map(|ms| format_timestamp_ms(*ms));
            let max = stamps.iter().max().map(|ms| format_timestamp_ms(*ms));
            (min, max, false)
        }
        _ => (None, None, false),
    };

    let datetime_format = match (detection, input.dtype()) {
        (Detection::Datetime(format), DataType::String) => Some(format.pattern.to_string()),
        _ => None,
    };

    Ok(ColumnSchema {
        name: input.name().to_string(),
        inferred_type,
        integer,
        nullable: input.null_count() > 0 || coerced.loss > 0,
        null_count: input.null_count(),
        coercion_loss: coerced.loss,
        cardinality,
        min,
        max,
        sample_values: collect_sample_values(input, 5),
        datetime_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sales() -> DataFrame {
        df!(
            "date" => &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"],
            "region" => &["North", "South", "North", "South"],
            "revenue" => &["100.5", "200", "150.25", "175"],
            "empty" => &[None::<&str>, None, None, None]
        )
        .unwrap()
    }

    #[test]
    fn test_infers_sales_columns() {
        let inferred = SchemaInferer::default().infer(&sales()).unwrap();
        let types: Vec<InferredType> = inferred.schemas.iter().map(|s| s.inferred_type).collect();
        assert_eq!(
            types,
            vec![
                InferredType::Datetime,
                InferredType::Categorical,
                InferredType::Numeric,
                InferredType::Unknown
            ]
        );
        let date = &inferred.schemas[0];
        assert_eq!(date.min.as_deref(), Some("2024-01-01"));
        assert_eq!(date.datetime_format.as_deref(), Some("%Y-%m-%d"));
        assert_eq!(inferred.schemas[1].cardinality, 2);
    }

    #[test]
    fn test_coercion_loss_recorded() {
        let df = df!("x" => &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10",
                               "11", "12", "13", "14", "15", "16", "17", "18", "19", "20",
                               "21", "22", "23", "24", "25", "26", "27", "28", "29", "bad"])
        .unwrap();
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        let schema = &inferred.schemas[0];
        assert_eq!(schema.inferred_type, InferredType::Numeric);
        assert!(schema.integer);
        assert_eq!(schema.coercion_loss, 1);
        assert!(schema.nullable);
        assert_eq!(inferred.frame.column("x").unwrap().null_count(), 1);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let inferer = SchemaInferer::new(0.5, Some(2));
        let first = inferer.infer(&sales()).unwrap().schemas;
        let second = inferer.infer(&sales()).unwrap().schemas;
        assert_eq!(first, second);
    }

    #[test]
    fn test_native_columns_pass_through() {
        let df = df!("n" => &[1i64, 2, 3], "b" => &[true, false, true]).unwrap();
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        assert_eq!(inferred.schemas[0].inferred_type, InferredType::Numeric);
        assert!(inferred.schemas[0].integer);
        assert_eq!(inferred.schemas[1].inferred_type, InferredType::Boolean);
        assert_eq!(
            inferred.frame.column("n").unwrap().dtype(),
            &DataType::Float64
        );
    }

    #[test]
    fn test_decimal_comma_columns() {
        let df = df!("price" => &["1,5", "2,75", "1.204,5", "3"]).unwrap();

        let as_point = SchemaInferer::default().infer(&df).unwrap();
        assert_ne!(as_point.schemas[0].inferred_type, InferredType::Numeric);

        let inferred = SchemaInferer::default()
            .decimal_separator(DecimalSeparator::Comma)
            .infer(&df)
            .unwrap();
        assert_eq!(inferred.schemas[0].inferred_type, InferredType::Numeric);
        let price = inferred.frame.column("price").unwrap().as_materialized_series().clone();
        let values: Vec<Option<f64>> = price.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1.5), Some(2.75), Some(1204.5), Some(3.0)]);
    }

    #[test]
    fn test_all_null_is_unknown() {
        let inferred = SchemaInferer::default().infer(&sales()).unwrap();
        let empty = &inferred.schemas[3];
        assert_eq!(empty.inferred_type, InferredType::Unknown);
        assert_eq!(empty.null_count, 4);
        assert_eq!(empty.cardinality, 0);
    }
}
