//! Pattern detection: clustering, anomaly scoring and trends.
//!
//! The three sub-analyses are independent. Each ends in its own
//! [`SectionOutcome`]; missing inputs give `Skipped` with a reason and a
//! failure in one never prevents the others from running. Only
//! cancellation aborts the whole detector.

mod anomaly;
mod clustering;
mod trend;

pub use anomaly::{AnomalyRecord, AnomalyResult, IsolationForest, average_path_length};
pub use clustering::{ClusterSummary, ClusteringResult, FeatureValue, KMeansClusterer, elbow};
pub use trend::{
    MIN_POINTS, SEASONALITY_THRESHOLD, Seasonality, SeriesTrend, TimePoint, TrendDirection,
    TrendResult, autocorrelation, detect_trends, moving_average, student_t_two_sided,
};

use crate::analysis::SectionOutcome;
use crate::error::{PipelineError, Result};
use crate::pipeline::CancellationToken;
use crate::profiler::{ColumnSchema, InferredType};
use crate::utils::{optional_values, timestamp_values};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// Feature Matrix
// =============================================================================

/// Complete rows of the numeric columns that vary, plus the per-feature
/// mean and standard deviation used for standardizing.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    /// Frame row index of each matrix row.
    pub rows: Vec<usize>,
    /// Height of the frame the matrix was taken from.
    pub frame_rows: usize,
    pub data: Array2<f64>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from row-aligned columns. Columns without variance are dropped,
    /// then rows with a null in any remaining column.
    pub fn from_columns(columns: Vec<(String, Vec<Option<f64>>)>) -> Self {
        let frame_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let varying: Vec<(String, Vec<Option<f64>>)> = columns
            .into_iter()
            .filter(|(_, values)| {
                let mut present = values.iter().flatten();
                match present.next() {
                    Some(first) => present.any(|v| v != first),
                    None => false,
                }
            })
            .collect();

        let rows: Vec<usize> = (0..frame_rows)
            .filter(|&r| varying.iter().all(|(_, values)| values[r].is_some()))
            .collect();

        let mut data = Array2::zeros((rows.len(), varying.len()));
        for (j, (_, values)) in varying.iter().enumerate() {
            for (i, &r) in rows.iter().enumerate() {
                data[[i, j]] = values[r].unwrap_or_default();
            }
        }

        let mut means = Vec::with_capacity(varying.len());
        let mut scales = Vec::with_capacity(varying.len());
        for column in data.columns() {
            let n = column.len().max(1) as f64;
            let mean = column.sum() / n;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            means.push(mean);
            scales.push(if var > 0.0 { var.sqrt() } else { 1.0 });
        }

        Self {
            names: varying.into_iter().map(|(name, _)| name).collect(),
            rows,
            frame_rows,
            data,
            means,
            scales,
        }
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Zero mean, unit variance per feature.
    pub fn standardized(&self) -> Array2<f64> {
        let mut z = self.data.clone();
        for (j, mut column) in z.columns_mut().into_iter().enumerate() {
            let (mean, scale) = (self.means[j], self.scales[j]);
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        z
    }
}

// =============================================================================
// Detector
// =============================================================================

/// One pattern found, flattened for insight generation and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternRecord {
    Cluster {
        id: usize,
        size: usize,
        share: f64,
        defining_feature: String,
        defining_offset: f64,
    },
    Anomaly {
        row: usize,
        score: f64,
    },
    Trend {
        column: String,
        direction: TrendDirection,
        slope_per_day: f64,
        p_value: f64,
    },
    Seasonality {
        column: String,
        period: usize,
        autocorrelation: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub clustering: SectionOutcome<ClusteringResult>,
    pub anomalies: SectionOutcome<AnomalyResult>,
    pub trends: SectionOutcome<TrendResult>,
}

impl PatternReport {
    /// Every completed finding as a flat list: clusters, anomalies, then
    /// trends with their seasons.
    pub fn records(&self) -> Vec<PatternRecord> {
        let mut records = Vec::new();
        if let Some(clustering) = self.clustering.completed() {
            records.extend(clustering.clusters.iter().map(|c| PatternRecord::Cluster {
                id: c.id,
                size: c.size,
                share: c.share,
                defining_feature: c.defining_feature.clone(),
                defining_offset: c.defining_offset,
            }));
        }
        if let Some(anomalies) = self.anomalies.completed() {
            records.extend(anomalies.top.iter().map(|a| PatternRecord::Anomaly {
                row: a.row,
                score: a.score,
            }));
        }
        if let Some(trends) = self.trends.completed() {
            for series in &trends.series {
                records.push(PatternRecord::Trend {
                    column: series.column.clone(),
                    direction: series.direction,
                    slope_per_day: series.slope_per_day,
                    p_value: series.p_value,
                });
                if let Some(season) = &series.seasonality {
                    records.push(PatternRecord::Seasonality {
                        column: series.column.clone(),
                        period: season.period,
                        autocorrelation: season.autocorrelation,
                    });
                }
            }
        }
        records
    }
}

#[derive(Debug, Clone)]
pub struct PatternDetector {
    pub max_clusters: usize,
    pub contamination: f64,
    pub seed: u64,
    pub time_column: Option<String>,
}

impl PatternDetector {
    pub fn detect(
        &self,
        df: &DataFrame,
        schemas: &[ColumnSchema],
        token: &CancellationToken,
    ) -> Result<PatternReport> {
        let mut numeric = Vec::new();
        for schema in schemas.iter().filter(|s| s.is_numeric()) {
            let series = df.column(&schema.name)?.as_materialized_series();
            numeric.push((schema.name.clone(), optional_values(series)?));
        }

        let matrix = FeatureMatrix::from_columns(numeric.clone());
        debug!(
            "Feature matrix: {} rows x {} features",
            matrix.n_rows(),
            matrix.n_features()
        );

        let (clustering, anomalies) = if matrix.n_features() == 0 {
            let reason = "no numeric columns with variance";
            (SectionOutcome::skipped(reason), SectionOutcome::skipped(reason))
        } else {
            let clusterer = KMeansClusterer {
                max_clusters: self.max_clusters,
                seed: self.seed,
            };
            let forest = IsolationForest {
                contamination: self.contamination,
                seed: self.seed,
            };
            (
                section("clustering", clusterer.cluster(&matrix, token))?,
                section("anomalies", forest.detect(&matrix, token))?,
            )
        };

        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let trends = self.trends(df, schemas, &numeric)?;

        Ok(PatternReport {
            clustering,
            anomalies,
            trends,
        })
    }

    fn trends(
        &self,
        df: &DataFrame,
        schemas: &[ColumnSchema],
        numeric: &[(String, Vec<Option<f64>>)],
    ) -> Result<SectionOutcome<TrendResult>> {
        let Some(time_column) = self.time_column.as_deref() else {
            return Ok(SectionOutcome::skipped("no time column provided"));
        };
        let Some(schema) = schemas.iter().find(|s| s.name == time_column) else {
            return Ok(SectionOutcome::skipped(format!(
                "time column '{time_column}' not found"
            )));
        };
        if schema.inferred_type != InferredType::Datetime {
            return Ok(SectionOutcome::skipped(format!(
                "time column '{}' is {}, not datetime",
                time_column, schema.inferred_type
            )));
        }
        if numeric.is_empty() {
            return Ok(SectionOutcome::skipped("no numeric columns to trend"));
        }
        let stamps = timestamp_values(df.column(time_column)?.as_materialized_series())?;
        section("trends", detect_trends(time_column, &stamps, numeric))
    }
}

/// Analysis errors become a skipped section, other recoverable failures a
/// failed one. Cancellation propagates.
fn section<T>(name: &str, result: Result<T>) -> Result<SectionOutcome<T>> {
    match result {
        Ok(value) => Ok(SectionOutcome::Completed(value)),
        Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
        Err(PipelineError::Analysis { reason, .. }) => {
            debug!("Pattern section '{}' skipped: {}", name, reason);
            Ok(SectionOutcome::skipped(reason))
        }
        Err(e) => {
            warn!("Pattern section '{}' failed: {}", name, e);
            Ok(SectionOutcome::failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::SchemaInferer;
    use pretty_assertions::assert_eq;

    fn detector(time_column: Option<&str>) -> PatternDetector {
        PatternDetector {
            max_clusters: 6,
            contamination: 0.05,
            seed: 42,
            time_column: time_column.map(str::to_string),
        }
    }

    fn daily_sales() -> DataFrame {
        let dates: Vec<String> = (1..=28).map(|d| format!("2024-02-{d:02}")).collect();
        let units: Vec<String> = (1..=28).map(|d| (d * 3 + d % 4).to_string()).collect();
        let price: Vec<String> = (1..=28).map(|d| format!("{}.5", 10 + d % 5)).collect();
        df!("date" => dates, "units" => units, "price" => price).unwrap()
    }

    #[test]
    fn test_feature_matrix_drops_constant_and_incomplete() {
        let matrix = FeatureMatrix::from_columns(vec![
            ("a".to_string(), vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            ("flat".to_string(), vec![Some(5.0), Some(5.0), Some(5.0), Some(5.0)]),
        ]);
        assert_eq!(matrix.names, vec!["a".to_string()]);
        assert_eq!(matrix.rows, vec![0, 1, 3]);
        assert_eq!(matrix.frame_rows, 4);
        let z = matrix.standardized();
        assert!(z.column(0).sum().abs() < 1e-9);
    }

    #[test]
    fn test_sections_are_independent() {
        let inferred = SchemaInferer::default().infer(&daily_sales()).unwrap();
        let report = detector(None)
            .detect(&inferred.frame, &inferred.schemas, &CancellationToken::new())
            .unwrap();
        assert!(report.clustering.is_completed());
        assert!(report.anomalies.is_completed());
        assert_eq!(report.trends.reason(), Some("no time column provided"));
    }

    #[test]
    fn test_trend_on_time_column() {
        let inferred = SchemaInferer::default().infer(&daily_sales()).unwrap();
        let report = detector(Some("date"))
            .detect(&inferred.frame, &inferred.schemas, &CancellationToken::new())
            .unwrap();
        let trends = report.trends.completed().unwrap();
        let units = trends.series.iter().find(|s| s.column == "units").unwrap();
        assert_eq!(units.direction, TrendDirection::Increasing);
        assert!(report
            .records()
            .iter()
            .any(|r| matches!(r, PatternRecord::Trend { column, .. } if column == "units")));
    }

    #[test]
    fn test_constant_data_is_skipped() {
        let df = df!("a" => vec![1.0; 50], "b" => vec![2.0; 50]).unwrap();
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        let report = detector(Some("missing"))
            .detect(&inferred.frame, &inferred.schemas, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.clustering.status(), "skipped");
        assert_eq!(report.anomalies.status(), "skipped");
        assert_eq!(report.trends.reason(), Some("time column 'missing' not found"));
    }
}
