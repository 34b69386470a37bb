//! Dashboard generation.
//!
//! [`DashboardGenerator::build_spec`] plans KPI cards, charts, tables and
//! filters from the analysis and a bounded sample of the cleaned data;
//! [`DashboardGenerator::generate`] also renders the spec into one
//! self-contained HTML document. Every chart is optional: a chart without
//! data is never planned, and a chart that fails to render is dropped with a
//! note on the dashboard.
//!
//! Generation is deterministic. Chart ids are positional, maps are ordered,
//! and no wall-clock value is embedded, so identical inputs give
//! byte-identical HTML.

mod charts;
mod html;

pub use charts::{ChartData, ChartKind, ChartRegistry, ChartRenderer, ChartRequest};
pub use html::{decode_payload, encode_payload};

use crate::analysis::AnalysisResult;
use crate::config::Theme;
use crate::error::{PipelineError, Result};
use crate::insights::Insight;
use crate::profiler::{ColumnSchema, InferredType};
use crate::utils::{format_number, format_timestamp_ms, optional_values, round_to, timestamp_values, value_counts};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const MAX_TIME_SERIES: usize = 3;
const MAX_BAR_CHARTS: usize = 3;
const MAX_PIE_CATEGORIES: usize = 6;
const MAX_HISTOGRAMS: usize = 4;
const MAX_BOX_GROUPS: usize = 6;
const MAX_FILTER_OPTIONS: usize = 50;

// =============================================================================
// Spec
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiCard {
    pub id: String,
    pub label: String,
    pub value: String,
    pub detail: Option<String>,
}

/// What a chart is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBinding {
    pub source: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    pub binding: DataBinding,
    /// Plotly `{data, layout}`.
    pub figure: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub id: String,
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Dropdown narrowing a table to one value of a categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub options: Vec<String>,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedChart {
    pub title: String,
    pub kind: ChartKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub title: String,
    pub theme: Theme,
    pub kpi_cards: Vec<KpiCard>,
    pub charts: Vec<ChartSpec>,
    pub tables: Vec<TableSpec>,
    pub filters: Vec<FilterSpec>,
    pub insights: Vec<Insight>,
    pub skipped_charts: Vec<SkippedChart>,
}

impl DashboardSpec {
    pub fn charts_of(&self, kind: ChartKind) -> impl Iterator<Item = &ChartSpec> {
        self.charts.iter().filter(move |c| c.kind == kind)
    }

    pub fn has_chart(&self, kind: ChartKind) -> bool {
        self.charts_of(kind).next().is_some()
    }
}

/// What the generator reads. `sample` is the bounded slice of the cleaned
/// data; `rows` is the full row count.
#[derive(Debug, Clone, Copy)]
pub struct DashboardInput<'a> {
    pub title: &'a str,
    pub insights: &'a [Insight],
    pub analysis: &'a AnalysisResult,
    pub schemas: &'a [ColumnSchema],
    pub sample: &'a DataFrame,
    pub rows: usize,
    pub completeness: f64,
    pub time_column: Option<&'a str>,
}

/// A rendered dashboard plus the chart errors that were dropped from it.
#[derive(Debug)]
pub struct Dashboard {
    pub spec: DashboardSpec,
    pub html: String,
    pub errors: Vec<PipelineError>,
}

/// Evenly spaced rows, at most `limit`, in original order.
pub fn sample_rows(df: &DataFrame, limit: usize) -> Result<DataFrame> {
    if df.height() <= limit {
        return Ok(df.clone());
    }
    if limit == 0 {
        return Ok(df.head(Some(0)));
    }
    let stride = df.height().div_ceil(limit);
    let picked: Vec<IdxSize> = (0..df.height()).step_by(stride).map(|i| i as IdxSize).collect();
    Ok(df.take(&IdxCa::from_vec("idx".into(), picked))?)
}

// =============================================================================
// Generator
// =============================================================================

pub struct DashboardGenerator {
    registry: ChartRegistry,
    theme: Theme,
    compress: bool,
}

impl DashboardGenerator {
    pub fn new(theme: Theme, compress: bool) -> Self {
        Self::with_registry(ChartRegistry::with_defaults(), theme, compress)
    }

    pub fn with_registry(registry: ChartRegistry, theme: Theme, compress: bool) -> Self {
        Self {
            registry,
            theme,
            compress,
        }
    }

    pub fn generate(&self, input: &DashboardInput<'_>) -> Result<Dashboard> {
        let (spec, errors) = self.build_spec(input)?;
        let html = html::render(&spec, self.compress)?;
        Ok(Dashboard { spec, html, errors })
    }

    /// Plan and render the charts. Returns the spec and the recoverable
    /// errors of charts that were dropped.
    pub fn build_spec(&self, input: &DashboardInput<'_>) -> Result<(DashboardSpec, Vec<PipelineError>)> {
        let requests = self.plan_charts(input)?;
        let mut charts = Vec::new();
        let mut skipped_charts = Vec::new();
        let mut errors = Vec::new();
        for request in requests {
            match self.registry.render(&request) {
                Ok(figure) => {
                    let id = format!("chart-{:02}-{}", charts.len() + 1, request.kind.as_str());
                    debug!("Rendered {} '{}'", id, request.title);
                    charts.push(ChartSpec {
                        id,
                        kind: request.kind,
                        title: request.title,
                        binding: DataBinding {
                            source: request.source,
                            columns: request.columns,
                        },
                        figure,
                    });
                }
                Err(e) => {
                    warn!("Chart '{}' omitted: {}", request.title, e);
                    skipped_charts.push(SkippedChart {
                        title: request.title,
                        kind: request.kind,
                        reason: e.to_string(),
                    });
                    errors.push(e);
                }
            }
        }

        let spec = DashboardSpec {
            title: input.title.to_string(),
            theme: self.theme,
            kpi_cards: kpi_cards(input),
            charts,
            tables: tables(input)?,
            filters: filters(input)?,
            insights: input.insights.to_vec(),
            skipped_charts,
        };
        Ok((spec, errors))
    }

    fn plan_charts(&self, input: &DashboardInput<'_>) -> Result<Vec<ChartRequest>> {
        let present = |s: &&ColumnSchema| input.sample.column(&s.name).is_ok();
        let numeric: Vec<&ColumnSchema> = input.schemas.iter().filter(|s| s.is_numeric()).filter(present).collect();
        let categorical: Vec<&ColumnSchema> =
            input.schemas.iter().filter(|s| s.is_categorical()).filter(present).collect();

        let mut requests = Vec::new();
        requests.push(
            ChartRequest::new(
                ChartKind::Gauge,
                "Data quality",
                "transformation.completeness_after",
                ChartData::Indicator {
                    value: round_to(input.completeness * 100.0, 1),
                    min: 0.0,
                    max: 100.0,
                },
            ),
        );
        if let Some(model) = input.analysis.model()
            && let Some(score) = model.primary_score()
        {
            requests.push(
                ChartRequest::new(
                    ChartKind::Gauge,
                    format!("{} score for {}", model.model_name, model.target),
                    "model.metrics.test_score",
                    ChartData::Indicator {
                        value: round_to(score, 4),
                        min: score.min(0.0).floor(),
                        max: 1.0,
                    },
                )
                .columns(&[model.target.as_str()]),
            );
        }

        requests.extend(time_series(input, &numeric)?);

        for schema in categorical.iter().take(MAX_BAR_CHARTS) {
            let (labels, values) = category_counts(input, schema)?;
            requests.push(
                ChartRequest::new(
                    ChartKind::Bar,
                    format!("Rows by {}", schema.name),
                    format!("statistics.columns.{}", schema.name),
                    ChartData::Categories { labels, values },
                )
                .columns(&[schema.name.as_str()])
                .axes(schema.name.clone(), "rows"),
            );
        }
        if let Some(schema) = categorical
            .iter()
            .find(|s| (2..=MAX_PIE_CATEGORIES).contains(&s.cardinality))
        {
            let (labels, values) = category_counts(input, schema)?;
            requests.push(
                ChartRequest::new(
                    ChartKind::Pie,
                    format!("Share of {}", schema.name),
                    format!("statistics.columns.{}", schema.name),
                    ChartData::Categories { labels, values },
                )
                .columns(&[schema.name.as_str()]),
            );
        }

        if let Some(model) = input.analysis.model()
            && !model.feature_importances.is_empty()
        {
            let (labels, values) = model
                .feature_importances
                .iter()
                .take(10)
                .map(|f| (f.feature.clone(), round_to(f.importance, 4)))
                .unzip();
            requests.push(
                ChartRequest::new(
                    ChartKind::Bar,
                    format!("Drivers of {}", model.target),
                    "model.feature_importances",
                    ChartData::Categories { labels, values },
                )
                .columns(&[model.target.as_str()])
                .axes("feature", "importance"),
            );
        }

        if let Some((x, y)) = scatter_pair(input, &numeric) {
            let xs = optional_values(input.sample.column(&x)?.as_materialized_series())?;
            let ys = optional_values(input.sample.column(&y)?.as_materialized_series())?;
            let (px, py): (Vec<f64>, Vec<f64>) = xs
                .iter()
                .zip(&ys)
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .unzip();
            requests.push(
                ChartRequest::new(
                    ChartKind::Scatter,
                    format!("{y} vs {x}"),
                    "sample",
                    ChartData::Points { x: px, y: py },
                )
                .columns(&[x.as_str(), y.as_str()])
                .axes(x.clone(), y.clone()),
            );
        }

        if let Some(stats) = input.analysis.statistics()
            && stats.correlations.columns.len() >= 2
        {
            let labels = stats.correlations.columns.clone();
            let columns: Vec<&str> = labels.iter().map(String::as_str).collect();
            let z = stats
                .correlations
                .values
                .iter()
                .map(|row| row.iter().map(|v| v.map(|r| round_to(r, 4))).collect())
                .collect();
            requests.push(
                ChartRequest::new(
                    ChartKind::Heatmap,
                    format!("{} correlations", stats.correlations.method.as_str()),
                    "statistics.correlations",
                    ChartData::Matrix { labels: labels.clone(), z },
                )
                .columns(&columns),
            );
        }

        for schema in numeric.iter().take(MAX_HISTOGRAMS) {
            let values: Vec<f64> = optional_values(input.sample.column(&schema.name)?.as_materialized_series())?
                .into_iter()
                .flatten()
                .collect();
            requests.push(
                ChartRequest::new(
                    ChartKind::Histogram,
                    format!("Distribution of {}", schema.name),
                    "sample",
                    ChartData::Values(values),
                )
                .columns(&[schema.name.as_str()])
                .axes(schema.name.clone(), "rows"),
            );
        }

        if !numeric.is_empty() {
            let mut groups = Vec::new();
            for schema in numeric.iter().take(MAX_BOX_GROUPS) {
                let values: Vec<f64> = optional_values(input.sample.column(&schema.name)?.as_materialized_series())?
                    .into_iter()
                    .flatten()
                    .collect();
                groups.push((schema.name.clone(), values));
            }
            let names: Vec<String> = groups.iter().map(|(name, _)| name.clone()).collect();
            let columns: Vec<&str> = names.iter().map(String::as_str).collect();
            requests.push(
                ChartRequest::new(ChartKind::BoxPlot, "Spread of numeric columns", "sample", ChartData::Groups(groups))
                    .columns(&columns),
            );
        }

        Ok(requests)
    }
}

/// Line charts over the time column: trend timelines when the trend section
/// completed, otherwise per-timestamp sums over the sample.
fn time_series(input: &DashboardInput<'_>, numeric: &[&ColumnSchema]) -> Result<Vec<ChartRequest>> {
    let Some(time_column) = input.time_column else {
        return Ok(Vec::new());
    };
    let is_datetime = input
        .schemas
        .iter()
        .any(|s| s.name == time_column && s.inferred_type == InferredType::Datetime);
    if !is_datetime {
        return Ok(Vec::new());
    }

    if let Some(trends) = input.analysis.patterns.trends.completed() {
        return Ok(trends
            .series
            .iter()
            .take(MAX_TIME_SERIES)
            .map(|series| {
                let x = series.timeline.iter().map(|p| format_timestamp_ms(p.timestamp_ms)).collect();
                let y = series.timeline.iter().map(|p| round_to(p.value, 4)).collect();
                let smoothed = series.timeline.iter().map(|p| round_to(p.smoothed, 4)).collect();
                ChartRequest::new(
                    ChartKind::TimeSeries,
                    format!("{} over {}", series.column, time_column),
                    format!("patterns.trends.{}", series.column),
                    ChartData::Timeline {
                        x,
                        y,
                        smoothed: Some(smoothed),
                    },
                )
                .columns(&[series.column.as_str(), time_column])
                .axes(time_column, series.column.clone())
            })
            .collect());
    }

    let stamps = timestamp_values(input.sample.column(time_column)?.as_materialized_series())?;
    let mut requests = Vec::new();
    for schema in numeric.iter().take(MAX_TIME_SERIES) {
        let values = optional_values(input.sample.column(&schema.name)?.as_materialized_series())?;
        let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
        for (t, v) in stamps.iter().zip(&values) {
            if let (Some(t), Some(v)) = (t, v) {
                *buckets.entry(*t).or_insert(0.0) += v;
            }
        }
        requests.push(
            ChartRequest::new(
                ChartKind::TimeSeries,
                format!("{} over {}", schema.name, time_column),
                "sample",
                ChartData::Timeline {
                    x: buckets.keys().map(|t| format_timestamp_ms(*t)).collect(),
                    y: buckets.values().map(|v| round_to(*v, 4)).collect(),
                    smoothed: None,
                },
            )
            .columns(&[schema.name.as_str(), time_column])
            .axes(time_column, schema.name.clone()),
        );
    }
    Ok(requests)
}

/// Category frequencies from the statistics section, or counted over the
/// sample when statistics are unavailable.
fn category_counts(input: &DashboardInput<'_>, schema: &ColumnSchema) -> Result<(Vec<String>, Vec<f64>)> {
    if let Some(stats) = input
        .analysis
        .statistics()
        .and_then(|s| s.column(&schema.name))
        .and_then(|c| c.as_categorical())
    {
        return Ok(stats
            .frequencies
            .iter()
            .map(|f| (f.value.clone(), f.count as f64))
            .unzip());
    }
    let counts = value_counts(input.sample.column(&schema.name)?.as_materialized_series())?;
    Ok(counts.into_iter().take(20).map(|(v, c)| (v, c as f64)).unzip())
}

/// The most strongly correlated pair, else the first two numeric columns.
fn scatter_pair(input: &DashboardInput<'_>, numeric: &[&ColumnSchema]) -> Option<(String, String)> {
    let strongest = input
        .analysis
        .statistics()
        .and_then(|s| s.correlations.pairs().into_iter().next())
        .filter(|p| input.sample.column(&p.left).is_ok() && input.sample.column(&p.right).is_ok())
        .map(|p| (p.left, p.right));
    strongest.or_else(|| match numeric {
        [first, second, ..] => Some((first.name.clone(), second.name.clone())),
        _ => None,
    })
}

fn kpi_cards(input: &DashboardInput<'_>) -> Vec<KpiCard> {
    let mut cards = vec![
        KpiCard {
            id: "kpi-rows".to_string(),
            label: "Rows".to_string(),
            value: input.rows.to_string(),
            detail: Some(format!("{} shown in the sample", input.sample.height())),
        },
        KpiCard {
            id: "kpi-columns".to_string(),
            label: "Columns".to_string(),
            value: input.schemas.len().to_string(),
            detail: None,
        },
        KpiCard {
            id: "kpi-quality".to_string(),
            label: "Data quality".to_string(),
            value: format!("{}%", round_to(input.completeness * 100.0, 1)),
            detail: Some("non-null cells after cleaning".to_string()),
        },
        KpiCard {
            id: "kpi-insights".to_string(),
            label: "Insights".to_string(),
            value: input.insights.len().to_string(),
            detail: Some(format!(
                "{} high priority",
                input.insights.iter().filter(|i| i.priority == 1).count()
            )),
        },
    ];
    if let Some(model) = input.analysis.model()
        && let Some(score) = model.primary_score()
    {
        cards.push(KpiCard {
            id: "kpi-model".to_string(),
            label: format!("Model ({})", model.task_type.as_str()),
            value: format_number(round_to(score, 3)),
            detail: Some(format!("{} on {}", model.model_name, model.target)),
        });
    }
    if let Some(anomalies) = input.analysis.patterns.anomalies.completed() {
        cards.push(KpiCard {
            id: "kpi-anomalies".to_string(),
            label: "Anomalies".to_string(),
            value: anomalies.flagged_count.to_string(),
            detail: Some(format!("of {} scored rows", anomalies.scored_rows)),
        });
    }
    if let Some(clustering) = input.analysis.patterns.clustering.completed() {
        cards.push(KpiCard {
            id: "kpi-segments".to_string(),
            label: "Segments".to_string(),
            value: clustering.k.to_string(),
            detail: None,
        });
    }
    cards
}

/// Sample values as display strings; nulls become empty cells.
fn display_values(sample: &DataFrame, schema: &ColumnSchema) -> Result<Vec<String>> {
    let series = sample.column(&schema.name)?.as_materialized_series();
    let values = match schema.inferred_type {
        InferredType::Datetime => timestamp_values(series)?
            .into_iter()
            .map(|v| v.map(format_timestamp_ms).unwrap_or_default())
            .collect(),
        InferredType::Numeric => optional_values(series)?
            .into_iter()
            .map(|v| v.map(format_number).unwrap_or_default())
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect(),
    };
    Ok(values)
}

fn tables(input: &DashboardInput<'_>) -> Result<Vec<TableSpec>> {
    let shown: Vec<&ColumnSchema> = input
        .schemas
        .iter()
        .filter(|s| input.sample.column(&s.name).is_ok())
        .collect();
    let mut cells = Vec::with_capacity(shown.len());
    for schema in &shown {
        cells.push(display_values(input.sample, schema)?);
    }
    let rows = (0..input.sample.height())
        .map(|r| cells.iter().map(|column| column[r].clone()).collect())
        .collect();
    let sample = TableSpec {
        id: "table-sample".to_string(),
        title: "Data sample".to_string(),
        columns: shown.iter().map(|s| s.name.clone()).collect(),
        rows,
    };

    let columns = TableSpec {
        id: "table-columns".to_string(),
        title: "Columns".to_string(),
        columns: ["column", "type", "nulls", "distinct", "min", "max"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rows: input
            .schemas
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.inferred_type.to_string(),
                    s.null_count.to_string(),
                    s.cardinality.to_string(),
                    s.min.clone().unwrap_or_default(),
                    s.max.clone().unwrap_or_default(),
                ]
            })
            .collect(),
    };
    Ok(vec![sample, columns])
}

fn filters(input: &DashboardInput<'_>) -> Result<Vec<FilterSpec>> {
    let mut filters = Vec::new();
    for schema in input.schemas.iter().filter(|s| s.is_categorical()) {
        if input.sample.column(&schema.name).is_err() {
            continue;
        }
        let options: BTreeSet<String> = display_values(input.sample, schema)?
            .into_iter()
            .filter(|v| !v.is_empty())
            .collect();
        if options.len() < 2 || options.len() > MAX_FILTER_OPTIONS {
            continue;
        }
        filters.push(FilterSpec {
            column: schema.name.clone(),
            options: options.into_iter().collect(),
            table: "table-sample".to_string(),
        });
    }
    Ok(filters)
}
