//! Descriptive statistics and correlations for a cleaned dataset.
//!
//! Deterministic: the same frame and schemas always give the same result.

mod correlation;
mod descriptive;

pub use correlation::{CorrelationMatrix, CorrelationPair, KENDALL_MAX_ROWS, pearson, ranks};
pub use descriptive::{
    CategoricalStats, ColumnStatistics, DatetimeStats, DistributionShape, Frequency,
    MAX_FREQUENCIES, NumericStats, TextStats, describe_numeric,
};

use crate::config::CorrelationMethod;
use crate::error::Result;
use crate::profiler::ColumnSchema;
use crate::utils::optional_values;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Output of the statistics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub columns: BTreeMap<String, ColumnStatistics>,
    pub correlations: CorrelationMatrix,
}

impl StatisticsReport {
    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.get(name)
    }

    pub fn numeric(&self, name: &str) -> Option<&NumericStats> {
        self.columns.get(name).and_then(ColumnStatistics::as_numeric)
    }
}

pub struct StatisticsEngine {
    method: CorrelationMethod,
}

impl StatisticsEngine {
    pub fn new(method: CorrelationMethod) -> Self {
        Self { method }
    }

    pub fn compute(&self, df: &DataFrame, schemas: &[ColumnSchema]) -> Result<StatisticsReport> {
        let described: Vec<(String, ColumnStatistics)> = schemas
            .par_iter()
            .map(|schema| -> Result<(String, ColumnStatistics)> {
                let series = df.column(&schema.name)?.as_materialized_series();
                let stats = descriptive::describe_column(series, schema)?;
                Ok((schema.name.clone(), stats))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut numeric = Vec::new();
        for schema in schemas.iter().filter(|s| s.is_numeric()) {
            let series = df.column(&schema.name)?.as_materialized_series();
            numeric.push((schema.name.clone(), optional_values(series)?));
        }
        debug!(
            "Computing {} correlations over {} numeric columns",
            self.method.as_str(),
            numeric.len()
        );
        let correlations = CorrelationMatrix::compute(self.method, &numeric);

        Ok(StatisticsReport {
            columns: described.into_iter().collect(),
            correlations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::SchemaInferer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_engine_over_mixed_frame() {
        let df = df!(
            "units" => &["1", "2", "3", "4", "5", "6"],
            "revenue" => &["10.5", "19.0", "31.2", "39.9", "52.1", "60.0"],
            "region" => &["N", "S", "N", "S", "N", "S"],
            "day" => &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05", "2024-01-06"]
        )
        .unwrap();
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        let report = StatisticsEngine::new(CorrelationMethod::Pearson)
            .compute(&inferred.frame, &inferred.schemas)
            .unwrap();

        assert_eq!(report.columns.len(), 4);
        assert_eq!(report.numeric("units").unwrap().mean, 3.5);
        assert!(matches!(report.column("region"), Some(ColumnStatistics::Categorical(_))));
        match report.column("day") {
            Some(ColumnStatistics::Datetime(stats)) => assert_eq!(stats.span_days, 5.0),
            other => panic!("expected datetime stats, got {other:?}"),
        }
        assert_eq!(report.correlations.columns, vec!["units", "revenue"]);
        assert!(report.correlations.get("units", "revenue").unwrap() > 0.99);
    }

    #[test]
    fn test_deterministic() {
        let df = df!("a" => &[1.0, 5.0, 2.0, 8.0], "b" => &[3.0, 1.0, 4.0, 1.5]).unwrap();
        let inferred = SchemaInferer::default().infer(&df).unwrap();
        let engine = StatisticsEngine::new(CorrelationMethod::Spearman);
        let first = engine.compute(&inferred.frame, &inferred.schemas).unwrap();
        let second = engine.compute(&inferred.frame, &inferred.schemas).unwrap();
        assert_eq!(first, second);
    }
}
