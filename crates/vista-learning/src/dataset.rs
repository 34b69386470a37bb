//! Feature extraction and train/validation splitting.
//!
//! [`TrainingSet::from_dataframe`] turns a cleaned DataFrame into a dense
//! feature matrix plus an encoded target, then splits row indices 80/20
//! (stratified by class for classification).

use crate::config::{AutoMlConfig, ProblemType};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Encoded columns that came from one source column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGroup {
    /// Source column name.
    pub name: String,
    /// Indices into the encoded feature matrix.
    pub columns: Vec<usize>,
}

/// Dense training data with its split.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Encoded features, one row per usable input row.
    pub x: Array2<f64>,
    /// Encoded target (class index for classification).
    pub y: Array1<f64>,
    /// Encoded feature names (`region=North` for one-hot columns).
    pub feature_names: Vec<String>,
    /// Source-column groups over `feature_names`.
    pub groups: Vec<FeatureGroup>,
    /// Detected or forced task type.
    pub task_type: ProblemType,
    /// Target column name.
    pub target: String,
    /// Class labels in encoding order (empty for regression).
    pub classes: Vec<String>,
    /// Row indices used for fitting.
    pub train_idx: Vec<usize>,
    /// Row indices held out for validation.
    pub test_idx: Vec<usize>,
    /// Non-fatal preparation issues.
    pub warnings: Vec<String>,
}

struct EncodedTarget {
    values: Vec<Option<f64>>,
    task_type: ProblemType,
    classes: Vec<String>,
}

impl TrainingSet {
    /// Build features and target from `df`.
    ///
    /// Rows with a null target are dropped. Returns
    /// [`LearningError::InsufficientData`] when fewer than `config.min_rows`
    /// rows remain.
    pub fn from_dataframe(df: &DataFrame, target: &str, config: &AutoMlConfig) -> Result<Self> {
        let target_col = df
            .column(target)
            .map_err(|_| LearningError::TargetNotFound(target.to_string()))?;
        let encoded = encode_target(target_col.as_materialized_series(), config)?;

        let mut warnings = Vec::new();
        let mut kept: Vec<usize> = encoded
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|_| i))
            .collect();
        let dropped = df.height() - kept.len();
        if dropped > 0 {
            warnings.push(format!("Dropped {} rows with a null target", dropped));
        }
        if kept.len() < config.min_rows {
            return Err(LearningError::InsufficientData {
                rows: kept.len(),
                required: config.min_rows,
            });
        }
        if kept.len() > config.max_rows {
            let stride = kept.len().div_ceil(config.max_rows);
            kept = kept.into_iter().step_by(stride).collect();
            warnings.push(format!(
                "Subsampled to {} rows (every {}th row) for training",
                kept.len(),
                stride
            ));
        }

        let y: Array1<f64> = kept
            .iter()
            .map(|&i| encoded.values[i].unwrap_or_default())
            .collect();
        if is_constant(y.as_slice().unwrap_or(&[])) {
            return Err(LearningError::InvalidData(format!(
                "target '{}' has a single distinct value",
                target
            )));
        }

        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut feature_names = Vec::new();
        let mut groups = Vec::new();
        for column in df.get_columns() {
            let name = column.name().as_str();
            if name == target {
                continue;
            }
            let series = column.as_materialized_series();
            match encode_feature(series, &kept, config)? {
                EncodedFeature::Columns(encoded_cols) => {
                    let start = columns.len();
                    let mut indices = Vec::with_capacity(encoded_cols.len());
                    for (suffix, values) in encoded_cols {
                        indices.push(start + indices.len());
                        feature_names.push(match suffix {
                            Some(level) => format!("{}={}", name, level),
                            None => name.to_string(),
                        });
                        columns.push(values);
                    }
                    groups.push(FeatureGroup {
                        name: name.to_string(),
                        columns: indices,
                    });
                }
                EncodedFeature::Dropped(reason) => {
                    debug!("Dropping feature '{}': {}", name, reason);
                    warnings.push(format!("Dropped feature '{}': {}", name, reason));
                }
            }
        }

        if columns.is_empty() {
            return Err(LearningError::InvalidData(
                "no usable feature columns".to_string(),
            ));
        }

        let n_rows = kept.len();
        let x = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c][r]);
        let (train_idx, test_idx) = split_indices(&y, encoded.task_type, config);

        Ok(Self {
            x,
            y,
            feature_names,
            groups,
            task_type: encoded.task_type,
            target: target.to_string(),
            classes: encoded.classes,
            train_idx,
            test_idx,
            warnings,
        })
    }

    /// Feature rows at `idx`.
    pub fn rows(&self, idx: &[usize]) -> Array2<f64> {
        self.x.select(Axis(0), idx)
    }

    /// Target values at `idx`.
    pub fn targets(&self, idx: &[usize]) -> Vec<f64> {
        idx.iter().map(|&i| self.y[i]).collect()
    }

    /// Number of classes (0 for regression).
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(first) => values.iter().all(|v| (v - first).abs() < f64::EPSILON),
        None => true,
    }
}

fn encode_target(series: &Series, config: &AutoMlConfig) -> Result<EncodedTarget> {
    let dtype = series.dtype();
    let is_text = matches!(
        dtype,
        DataType::String | DataType::Boolean | DataType::Categorical(_, _)
    );
    if matches!(dtype, DataType::Datetime(_, _) | DataType::Date) {
        return Err(LearningError::InvalidData(format!(
            "datetime target '{}' is not supported",
            series.name()
        )));
    }

    if is_text {
        if config.problem_type == Some(ProblemType::Regression) {
            return Err(LearningError::InvalidData(format!(
                "regression requires a numeric target, '{}' is {}",
                series.name(),
                dtype
            )));
        }
        let labels = series.cast(&DataType::String)?;
        let labels = labels.str()?;
        let classes: Vec<String> = labels
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let values = labels
            .into_iter()
            .map(|v| v.and_then(|s| index.get(s)).map(|&i| i as f64))
            .collect();
        return Ok(EncodedTarget {
            values,
            task_type: ProblemType::Classification,
            classes,
        });
    }

    let numeric = series.cast(&DataType::Float64)?;
    let raw: Vec<Option<f64>> = numeric
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    let present: Vec<f64> = raw.iter().flatten().copied().collect();
    let all_integer = present.iter().all(|v| v.fract() == 0.0);
    let distinct: BTreeSet<i64> = if all_integer {
        present.iter().map(|v| *v as i64).collect()
    } else {
        BTreeSet::new()
    };
    let looks_categorical = all_integer
        && distinct.len() <= config.max_classes
        && distinct.len() * 2 <= present.len();

    let task_type = config.problem_type.unwrap_or(if looks_categorical {
        ProblemType::Classification
    } else {
        ProblemType::Regression
    });

    match task_type {
        ProblemType::Regression => Ok(EncodedTarget {
            values: raw,
            task_type,
            classes: Vec::new(),
        }),
        _ => {
            let distinct: Vec<String> = present
                .iter()
                .map(|v| format_label(*v))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let index: BTreeMap<String, usize> = distinct
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), i))
                .collect();
            let values = raw
                .iter()
                .map(|v| v.and_then(|x| index.get(&format_label(x))).map(|&i| i as f64))
                .collect();
            Ok(EncodedTarget {
                values,
                task_type,
                classes: distinct,
            })
        }
    }
}

fn format_label(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

enum EncodedFeature {
    Columns(Vec<(Option<String>, Vec<f64>)>),
    Dropped(String),
}

fn encode_feature(series: &Series, kept: &[usize], config: &AutoMlConfig) -> Result<EncodedFeature> {
    let dtype = series.dtype().clone();
    match dtype {
        DataType::Boolean => {
            let values = series.bool()?;
            let all: Vec<f64> = values
                .into_iter()
                .map(|v| if v.unwrap_or(false) { 1.0 } else { 0.0 })
                .collect();
            Ok(numeric_feature(pick(&all, kept)))
        }
        DataType::Datetime(_, _) | DataType::Date => {
            let millis = series
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                .cast(&DataType::Int64)?;
            let days: Vec<Option<f64>> = millis
                .i64()?
                .into_iter()
                .map(|v| v.map(|ms| ms as f64 / MS_PER_DAY))
                .collect();
            Ok(fill_with_mean(pick(&days, kept)))
        }
        DataType::String | DataType::Categorical(_, _) => {
            let strings = series.cast(&DataType::String)?;
            let strings = strings.str()?;
            let all: Vec<Option<&str>> = strings.into_iter().collect();
            let picked: Vec<Option<&str>> = kept.iter().map(|&i| all[i]).collect();
            let levels: BTreeSet<&str> = picked.iter().flatten().copied().collect();
            if levels.len() > config.max_one_hot_cardinality {
                return Ok(EncodedFeature::Dropped(format!(
                    "{} distinct values exceeds the one-hot limit of {}",
                    levels.len(),
                    config.max_one_hot_cardinality
                )));
            }
            if levels.len() < 2 {
                return Ok(EncodedFeature::Dropped("constant column".to_string()));
            }
            let columns = levels
                .iter()
                .map(|level| {
                    let values = picked
                        .iter()
                        .map(|v| if *v == Some(*level) { 1.0 } else { 0.0 })
                        .collect();
                    (Some(level.to_string()), values)
                })
                .collect();
            Ok(EncodedFeature::Columns(columns))
        }
        dtype if is_numeric_dtype(&dtype) => {
            let values = series.cast(&DataType::Float64)?;
            let all: Vec<Option<f64>> = values
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            Ok(fill_with_mean(pick(&all, kept)))
        }
        other => Ok(EncodedFeature::Dropped(format!("unsupported type {}", other))),
    }
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
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

fn pick<T: Clone>(values: &[T], kept: &[usize]) -> Vec<T> {
    kept.iter().map(|&i| values[i].clone()).collect()
}

fn numeric_feature(values: Vec<f64>) -> EncodedFeature {
    if is_constant(&values) {
        EncodedFeature::Dropped("constant column".to_string())
    } else {
        EncodedFeature::Columns(vec![(None, values)])
    }
}

fn fill_with_mean(values: Vec<Option<f64>>) -> EncodedFeature {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return EncodedFeature::Dropped("all values are null".to_string());
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    numeric_feature(values.into_iter().map(|v| v.unwrap_or(mean)).collect())
}

/// Seeded split. Classification is stratified: each class contributes
/// `round(n * test_size)` rows to validation, at least one when the class has
/// two or more rows.
fn split_indices(y: &Array1<f64>, task: ProblemType, config: &AutoMlConfig) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let n = y.len();
    let mut train = Vec::new();
    let mut test = Vec::new();

    if task == ProblemType::Classification {
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, v) in y.iter().enumerate() {
            by_class.entry(*v as i64).or_default().push(i);
        }
        for indices in by_class.values_mut() {
            indices.shuffle(&mut rng);
            let len = indices.len();
            let n_test = if len < 2 {
                0
            } else {
                ((len as f64 * config.test_size).round() as usize).clamp(1, len - 1)
            };
            test.extend_from_slice(&indices[..n_test]);
            train.extend_from_slice(&indices[n_test..]);
        }
    }

    if test.is_empty() {
        train.clear();
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let n_test = ((n as f64 * config.test_size).round() as usize).clamp(1, n.saturating_sub(2).max(1));
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn regression_frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let region: Vec<&str> = (0..n)
            .map(|i| if i % 2 == 0 { "North" } else { "South" })
            .collect();
        let y: Vec<f64> = (0..n).map(|i| 3.0 * i as f64 + 1.0).collect();
        df!("x" => x, "region" => region, "y" => y).unwrap()
    }

    #[test]
    fn test_regression_detection_and_one_hot() {
        let df = regression_frame(30);
        let set = TrainingSet::from_dataframe(&df, "y", &AutoMlConfig::default()).unwrap();

        assert_eq!(set.task_type, ProblemType::Regression);
        assert_eq!(
            set.feature_names,
            vec!["x".to_string(), "region=North".to_string(), "region=South".to_string()]
        );
        assert_eq!(set.groups.len(), 2);
        assert_eq!(set.groups[1].columns, vec![1, 2]);
        assert_eq!(set.train_idx.len() + set.test_idx.len(), 30);
        assert_eq!(set.test_idx.len(), 6);
    }

    #[test]
    fn test_string_target_is_classification() {
        let n = 40;
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let label: Vec<&str> = (0..n).map(|i| if i < 20 { "no" } else { "yes" }).collect();
        let df = df!("x" => x, "label" => label).unwrap();

        let set = TrainingSet::from_dataframe(&df, "label", &AutoMlConfig::default()).unwrap();
        assert_eq!(set.task_type, ProblemType::Classification);
        assert_eq!(set.classes, vec!["no".to_string(), "yes".to_string()]);

        // Stratified: 4 of each class held out
        let held_out: Vec<f64> = set.targets(&set.test_idx);
        assert_eq!(held_out.iter().filter(|v| **v == 0.0).count(), 4);
        assert_eq!(held_out.iter().filter(|v| **v == 1.0).count(), 4);
    }

    #[test]
    fn test_insufficient_rows() {
        let df = regression_frame(10);
        let err = TrainingSet::from_dataframe(&df, "y", &AutoMlConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LearningError::InsufficientData {
                rows: 10,
                required: 20
            }
        ));
    }

    #[test]
    fn test_null_targets_dropped_with_warning() {
        let x: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let y: Vec<Option<f64>> = (0..25)
            .map(|i| if i < 3 { None } else { Some(i as f64 * 1.5) })
            .collect();
        let df = df!("x" => x, "y" => y).unwrap();

        let set = TrainingSet::from_dataframe(&df, "y", &AutoMlConfig::default()).unwrap();
        assert_eq!(set.y.len(), 22);
        assert!(set.warnings.iter().any(|w| w.contains("null target")));
    }

    #[test]
    fn test_missing_target_column() {
        let df = regression_frame(25);
        let err = TrainingSet::from_dataframe(&df, "nope", &AutoMlConfig::default()).unwrap_err();
        assert!(matches!(err, LearningError::TargetNotFound(_)));
    }

    #[test]
    fn test_split_is_deterministic() {
        let df = regression_frame(50);
        let a = TrainingSet::from_dataframe(&df, "y", &AutoMlConfig::default()).unwrap();
        let b = TrainingSet::from_dataframe(&df, "y", &AutoMlConfig::default()).unwrap();
        assert_eq!(a.test_idx, b.test_idx);
    }
}
