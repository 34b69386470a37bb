//! Column type detection and coercion.
//!
//! Detection tries types from most to least restrictive and accepts the
//! first one that parses at least [`PARSE_THRESHOLD`] of the sampled
//! non-null values: integer, float, datetime, boolean, then categorical or
//! text depending on cardinality.

use crate::utils::{
    DecimalSeparator, is_numeric_dtype, parse_boolean_string, parse_integer_string,
    parse_numeric_string,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Share of sampled values a parser must accept for its type to win.
pub const PARSE_THRESHOLD: f64 = 0.95;

/// Distinct-value count that is always categorical when values repeat.
const SMALL_CATEGORY_LIMIT: usize = 20;

// Cheap prefilter so free text never reaches the chrono parsers.
static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}([T ]\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?)?(Z|[+-]\d{2}:?\d{2})?$")
        .expect("Invalid regex: date shape")
});

/// Inferred semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredType {
    Numeric,
    Datetime,
    Boolean,
    Categorical,
    Text,
    /// Every value is null.
    Unknown,
}

impl InferredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Categorical => "categorical",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InferredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A datetime layout the detector knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateFormat {
    pub pattern: &'static str,
    kind: DateKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateKind {
    Date,
    DateTime,
    Rfc3339,
}

/// Tried in order; the first format reaching the threshold wins, so ISO
/// layouts come first and month-first precedes day-first.
pub(crate) const DATE_FORMATS: &[DateFormat] = &[
    DateFormat { pattern: "%Y-%m-%d", kind: DateKind::Date },
    DateFormat { pattern: "%Y-%m-%d %H:%M:%S", kind: DateKind::DateTime },
    DateFormat { pattern: "%Y-%m-%dT%H:%M:%S", kind: DateKind::DateTime },
    DateFormat { pattern: "%Y-%m-%dT%H:%M:%S%.f", kind: DateKind::DateTime },
    DateFormat { pattern: "%Y-%m-%d %H:%M", kind: DateKind::DateTime },
    DateFormat { pattern: "rfc3339", kind: DateKind::Rfc3339 },
    DateFormat { pattern: "%Y/%m/%d", kind: DateKind::Date },
    DateFormat { pattern: "%m/%d/%Y", kind: DateKind::Date },
    DateFormat { pattern: "%d/%m/%Y", kind: DateKind::Date },
    DateFormat { pattern: "%m/%d/%Y %H:%M", kind: DateKind::DateTime },
    DateFormat { pattern: "%d-%m-%Y", kind: DateKind::Date },
    DateFormat { pattern: "%d.%m.%Y", kind: DateKind::Date },
];

impl DateFormat {
    /// Parse to epoch milliseconds (UTC for zone-aware input).
    pub fn parse_ms(&self, value: &str) -> Option<i64> {
        if !DATE_SHAPE.is_match(value) {
            return None;
        }
        match self.kind {
            DateKind::Date => NaiveDate::parse_from_str(value, self.pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis()),
            DateKind::DateTime => NaiveDateTime::parse_from_str(value, self.pattern)
                .ok()
                .map(|dt| dt.and_utc().timestamp_millis()),
            DateKind::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

/// What detection decided for a string column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Detection {
    Integer,
    Float,
    Datetime(DateFormat),
    Boolean,
    Categorical,
    Text,
    Unknown,
}

impl Detection {
    pub fn inferred_type(&self) -> InferredType {
        match self {
            Self::Integer | Self::Float => InferredType::Numeric,
            Self::Datetime(_) => InferredType::Datetime,
            Self::Boolean => InferredType::Boolean,
            Self::Categorical => InferredType::Categorical,
            Self::Text => InferredType::Text,
            Self::Unknown => InferredType::Unknown,
        }
    }
}

fn passes(sample: &[&str], parses: impl Fn(&str) -> bool) -> bool {
    let hits = sample.iter().filter(|v| parses(v)).count();
    hits as f64 >= PARSE_THRESHOLD * sample.len() as f64
}

/// Pick a type for the non-null values of a string column.
///
/// `sample` is the bounded subset the parsers are tried on; `all` is every
/// non-null value, used only for the cardinality decision.
pub(crate) fn detect_string_type(
    sample: &[&str],
    all: &[&str],
    cardinality_ratio: f64,
    separator: DecimalSeparator,
) -> Detection {
    if sample.is_empty() {
        return Detection::Unknown;
    }
    if passes(sample, |v| parse_integer_string(v, separator).is_some()) {
        return Detection::Integer;
    }
    if passes(sample, |v| parse_numeric_string(v, separator).is_some()) {
        return Detection::Float;
    }
    if let Some(format) = DATE_FORMATS
        .iter()
        .find(|f| passes(sample, |v| f.parse_ms(v).is_some()))
    {
        return Detection::Datetime(*format);
    }
    if passes(sample, |v| parse_boolean_string(v).is_some()) {
        return Detection::Boolean;
    }

    let distinct: HashSet<&str> = all.iter().copied().collect();
    let repeats = distinct.len() < all.len();
    if distinct.len() as f64 <= cardinality_ratio * all.len() as f64
        || (repeats && distinct.len() <= SMALL_CATEGORY_LIMIT)
    {
        Detection::Categorical
    } else {
        Detection::Text
    }
}

/// Type of a column that already carries a non-string dtype.
pub(crate) fn detect_native_type(dtype: &DataType) -> Option<Detection> {
    match dtype {
        DataType::Boolean => Some(Detection::Boolean),
        DataType::Date | DataType::Datetime(_, _) => Some(Detection::Datetime(DATE_FORMATS[0])),
        DataType::Float32 | DataType::Float64 => Some(Detection::Float),
        dtype if is_numeric_dtype(dtype) => Some(Detection::Integer),
        DataType::Null => Some(Detection::Unknown),
        _ => None,
    }
}

/// Column coerced to its detected type plus the count of values that failed
/// to parse.
pub(crate) struct Coerced {
    pub series: Series,
    pub loss: usize,
}

/// Convert a string column according to `detection`. Unparseable values
/// become nulls.
pub(crate) fn coerce_strings(
    name: &str,
    raw: &[Option<&str>],
    detection: Detection,
    separator: DecimalSeparator,
) -> Coerced {
    let name: PlSmallStr = name.into();
    let mut loss = 0;
    let mut track = |present: bool, parsed: bool| {
        if present && !parsed {
            loss += 1;
        }
    };
    let series = match detection {
        Detection::Integer | Detection::Float => {
            let values: Vec<Option<f64>> = raw
                .iter()
                .map(|v| {
                    let parsed = v.and_then(|s| parse_numeric_string(s, separator));
                    track(v.is_some(), parsed.is_some());
                    parsed
                })
                .collect();
            Series::new(name, values)
        }
        Detection::Datetime(format) => {
            let values: Vec<Option<i64>> = raw
                .iter()
                .map(|v| {
                    let parsed = v.and_then(|s| format.parse_ms(s));
                    track(v.is_some(), parsed.is_some());
                    parsed
                })
                .collect();
            let millis = Series::new(name.clone(), values);
            match millis.cast(&DataType::Datetime(TimeUnit::Milliseconds, None)) {
                Ok(series) => series,
                Err(_) => millis,
            }
        }
        Detection::Boolean => {
            let values: Vec<Option<bool>> = raw
                .iter()
                .map(|v| {
                    let parsed = v.and_then(parse_boolean_string);
                    track(v.is_some(), parsed.is_some());
                    parsed
                })
                .collect();
            Series::new(name, values)
        }
        Detection::Categorical | Detection::Text | Detection::Unknown => {
            Series::new(name, raw.to_vec())
        }
    };
    Coerced { series, loss }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detect(values: &[&str]) -> Detection {
        detect_string_type(values, values, 0.5, DecimalSeparator::Point)
    }

    #[test]
    fn test_strictness_order() {
        assert_eq!(detect(&["1", "2", "3"]), Detection::Integer);
        assert_eq!(detect(&["1.5", "2", "$3,000.25"]), Detection::Float);
        assert_eq!(detect(&["yes", "no", "yes"]), Detection::Boolean);
        assert_eq!(detect(&["0", "1", "1"]), Detection::Integer);
        assert!(matches!(
            detect(&["2024-01-01", "2024-02-01"]),
            Detection::Datetime(f) if f.pattern == "%Y-%m-%d"
        ));
    }

    #[test]
    fn test_threshold_tolerates_few_bad_values() {
        let mut values: Vec<&str> = vec!["10"; 39];
        values.push("oops");
        assert_eq!(detect(&values), Detection::Integer);

        let mut values: Vec<&str> = vec!["10"; 18];
        values.extend(["bad", "worse"]);
        assert_ne!(detect(&values), Detection::Integer);
    }

    #[test]
    fn test_day_first_dates_fall_through() {
        let detected = detect(&["25/12/2023", "31/01/2024", "13/02/2024"]);
        assert!(matches!(detected, Detection::Datetime(f) if f.pattern == "%d/%m/%Y"));
    }

    #[test]
    fn test_decimal_commas() {
        let values = ["1,5", "2,25", "10,0", "3"];
        // read as grouped numbers these would be text, never 15 or 225
        assert_ne!(detect(&values), Detection::Float);
        assert_ne!(detect(&values), Detection::Integer);

        let detected = detect_string_type(&values, &values, 0.5, DecimalSeparator::Comma);
        assert_eq!(detected, Detection::Float);
        let raw: Vec<Option<&str>> = values.iter().copied().map(Some).collect();
        let coerced = coerce_strings("price", &raw, detected, DecimalSeparator::Comma);
        let parsed: Vec<Option<f64>> = coerced.series.f64().unwrap().into_iter().collect();
        assert_eq!(parsed, vec![Some(1.5), Some(2.25), Some(10.0), Some(3.0)]);
    }

    #[test]
    fn test_categorical_versus_text() {
        let regions = ["North", "South", "North", "East", "South", "North"];
        assert_eq!(detect(&regions), Detection::Categorical);
        let notes = ["first note", "second note", "third note", "fourth"];
        assert_eq!(detect(&notes), Detection::Text);
    }

    #[test]
    fn test_coercion_counts_losses() {
        let raw = [Some("1.5"), None, Some("abc"), Some("2")];
        let coerced = coerce_strings("x", &raw, Detection::Float, DecimalSeparator::Point);
        assert_eq!(coerced.loss, 1);
        assert_eq!(coerced.series.null_count(), 2);
        assert_eq!(coerced.series.dtype(), &DataType::Float64);
    }

    #[test]
    fn test_datetime_coercion() {
        let raw = [Some("2024-01-01"), Some("2024-01-02")];
        let coerced = coerce_strings(
            "d",
            &raw,
            Detection::Datetime(DATE_FORMATS[0]),
            DecimalSeparator::Point,
        );
        assert_eq!(coerced.loss, 0);
        assert!(matches!(coerced.series.dtype(), DataType::Datetime(TimeUnit::Milliseconds, _)));
    }

    #[test]
    fn test_rfc3339() {
        let format = DATE_FORMATS
            .iter()
            .find(|f| f.pattern == "rfc3339")
            .copied()
            .unwrap();
        assert_eq!(format.parse_ms("2024-01-01T00:00:00Z"), Some(1_704_067_200_000));
        assert_eq!(format.parse_ms("2024-01-01T02:00:00+02:00"), Some(1_704_067_200_000));
    }
}
