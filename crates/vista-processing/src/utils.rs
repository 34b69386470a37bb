//! Shared utilities for the analytics pipeline.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistency.

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Currency, percent and space characters stripped before numeric parsing.
pub const NUMERIC_FORMAT_CHARS: [char; 5] = ['$', '%', '€', '£', ' '];

/// Cell contents treated as missing when reading input.
pub const NULL_MARKERS: [&str; 8] = ["na", "n/a", "null", "none", "-", "#n/a", "nan", ""];

static COMMA_GROUPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("Invalid regex: comma grouping")
});

static DOT_GROUPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(\.\d{3})+(,\d+)?$").expect("Invalid regex: dot grouping")
});

static COMMA_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+,\d+$").expect("Invalid regex: comma decimal"));

/// Which character separates the fractional part in the input.
///
/// Semicolon-delimited files conventionally write `1,5` for one and a half
/// and may group thousands with dots (`1.234,5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalSeparator {
    #[default]
    Point,
    Comma,
}

/// Clean a string for numeric parsing.
///
/// Currency symbols, percent signs and spaces are dropped. Group separators
/// are only removed where they form whole groups of three digits, so with
/// [`DecimalSeparator::Point`] `"1,5"` is left alone and fails to parse
/// rather than turning into 15.
///
/// # Example
///
/// ```rust,ignore
/// use vista_processing::utils::{DecimalSeparator, clean_numeric_string};
///
/// assert_eq!(clean_numeric_string("$1,234.56", DecimalSeparator::Point), "1234.56");
/// assert_eq!(clean_numeric_string("1.234,5", DecimalSeparator::Comma), "1234.5");
/// ```
pub fn clean_numeric_string(s: &str, separator: DecimalSeparator) -> String {
    let stripped: String = s
        .trim()
        .chars()
        .filter(|c| !NUMERIC_FORMAT_CHARS.contains(c))
        .collect();
    match separator {
        DecimalSeparator::Point if COMMA_GROUPED.is_match(&stripped) => stripped.replace(',', ""),
        DecimalSeparator::Point => stripped,
        DecimalSeparator::Comma => {
            let ungrouped = if DOT_GROUPED.is_match(&stripped) {
                stripped.replace('.', "")
            } else {
                stripped
            };
            if COMMA_DECIMAL.is_match(&ungrouped) {
                ungrouped.replace(',', ".")
            } else {
                ungrouped
            }
        }
    }
}

/// Check if a cell is a missing-value marker.
pub fn is_null_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    NULL_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
///
/// Handles common formatting like currency symbols, percentages, and thousands separators.
pub fn parse_numeric_string(s: &str, separator: DecimalSeparator) -> Option<f64> {
    let cleaned = clean_numeric_string(s, separator);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a string as an integer, allowing the same formatting as
/// [`parse_numeric_string`] but no fractional part.
pub fn parse_integer_string(s: &str, separator: DecimalSeparator) -> Option<i64> {
    let cleaned = clean_numeric_string(s, separator);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// Common boolean true representations.
pub const BOOLEAN_TRUE_VALUES: [&str; 4] = ["true", "yes", "t", "y"];

/// Common boolean false representations.
pub const BOOLEAN_FALSE_VALUES: [&str; 4] = ["false", "no", "f", "n"];

/// Parse a boolean-looking string.
pub fn parse_boolean_string(s: &str) -> Option<bool> {
    let lower = s.trim().to_ascii_lowercase();
    if BOOLEAN_TRUE_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if BOOLEAN_FALSE_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Non-null, finite values of a numeric Series as f64, in row order.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

/// Numeric Series as `Option<f64>` per row, treating non-finite as null.
pub fn optional_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Linear-interpolated quantile of already sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sort a copy of `values` ascending.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1). `None` below two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Frequency table of a Series rendered as strings, most frequent first,
/// ties broken by value.
pub fn value_counts(series: &Series) -> PolarsResult<Vec<(String, usize)>> {
    let as_str = series.cast(&DataType::String)?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for val in as_str.str()?.into_iter().flatten() {
        *counts.entry(val.to_string()).or_insert(0) += 1;
    }
    let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ordered)
}

/// Calculate the mode (most frequent value) of a Series as a string.
pub fn string_mode(series: &Series) -> Option<String> {
    value_counts(series)
        .ok()
        .and_then(|counts| counts.into_iter().next().map(|(value, _)| value))
}

/// Collect up to `max_samples` distinct non-null values, in first-seen order.
pub fn collect_sample_values(series: &Series, max_samples: usize) -> Vec<String> {
    let Ok(as_str) = series.cast(&DataType::String) else {
        return Vec::new();
    };
    let Ok(chunked) = as_str.str() else {
        return Vec::new();
    };
    let mut samples: Vec<String> = Vec::with_capacity(max_samples);
    for val in chunked.into_iter().flatten() {
        if samples.len() >= max_samples {
            break;
        }
        if !samples.iter().any(|s| s == val) {
            samples.push(val.to_string());
        }
    }
    samples
}

/// Round for display in reports and insight statements.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Render a number for labels: integers without a fraction, others to four
/// significant decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", round_to(value, 4))
    }
}

// =============================================================================
// Datetime Utilities
// =============================================================================

/// Render epoch milliseconds as `YYYY-MM-DD`, adding the time of day when it
/// is not midnight.
pub fn format_timestamp_ms(ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => {
            let naive = dt.naive_utc();
            if naive.time() == chrono::NaiveTime::MIN {
                naive.format("%Y-%m-%d").to_string()
            } else {
                naive.format("%Y-%m-%d %H:%M:%S").to_string()
            }
        }
        None => ms.to_string(),
    }
}

/// Epoch milliseconds of a datetime Series, row by row.
pub fn timestamp_values(series: &Series) -> PolarsResult<Vec<Option<i64>>> {
    let cast = series
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .cast(&DataType::Int64)?;
    Ok(cast.i64()?.into_iter().collect())
}

// =============================================================================
// Tests
// =============================================================================
