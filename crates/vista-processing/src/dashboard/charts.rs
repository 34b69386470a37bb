//! Chart kinds, their data bindings and the renderer registry.
//!
//! A [`ChartRequest`] says what to draw; a [`ChartRenderer`] turns it into a
//! Plotly figure (`{data, layout}` JSON). The [`ChartRegistry`] maps each
//! [`ChartKind`] to one renderer, so adding a kind never touches dispatch.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Scatter,
    Bar,
    Pie,
    TimeSeries,
    Heatmap,
    Gauge,
    Histogram,
    BoxPlot,
}

impl ChartKind {
    pub const ALL: [ChartKind; 8] = [
        Self::Scatter,
        Self::Bar,
        Self::Pie,
        Self::TimeSeries,
        Self::Heatmap,
        Self::Gauge,
        Self::Histogram,
        Self::BoxPlot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::TimeSeries => "time_series",
            Self::Heatmap => "heatmap",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::BoxPlot => "box_plot",
        }
    }
}

/// The values a chart is drawn from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Points {
        x: Vec<f64>,
        y: Vec<f64>,
    },
    Categories {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Timeline {
        x: Vec<String>,
        y: Vec<f64>,
        smoothed: Option<Vec<f64>>,
    },
    Matrix {
        labels: Vec<String>,
        z: Vec<Vec<Option<f64>>>,
    },
    Indicator {
        value: f64,
        min: f64,
        max: f64,
    },
    Values(Vec<f64>),
    Groups(Vec<(String, Vec<f64>)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub title: String,
    /// Dataset columns the chart is bound to.
    pub columns: Vec<String>,
    /// Where the values come from, e.g. `sample`, `statistics.correlations`.
    pub source: String,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub data: ChartData,
}

impl ChartRequest {
    pub fn new(kind: ChartKind, title: impl Into<String>, source: impl Into<String>, data: ChartData) -> Self {
        Self {
            kind,
            title: title.into(),
            columns: Vec::new(),
            source: source.into(),
            x_label: None,
            y_label: None,
            data,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn axes(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = Some(x.into());
        self.y_label = Some(y.into());
        self
    }
}

/// Turns one kind of [`ChartRequest`] into a Plotly figure.
pub trait ChartRenderer: Send + Sync {
    fn kind(&self) -> ChartKind;

    /// `{"data": [...], "layout": {...}}`. Errors with
    /// [`PipelineError::Dashboard`] when the data cannot be drawn as this
    /// kind.
    fn render(&self, request: &ChartRequest) -> Result<Value>;
}

fn unsupported(request: &ChartRequest, reason: &str) -> PipelineError {
    PipelineError::Dashboard {
        chart: request.title.clone(),
        reason: reason.to_string(),
    }
}

fn layout(request: &ChartRequest) -> Value {
    let mut layout = json!({ "title": { "text": request.title } });
    if let Some(x) = &request.x_label {
        layout["xaxis"] = json!({ "title": { "text": x } });
    }
    if let Some(y) = &request.y_label {
        layout["yaxis"] = json!({ "title": { "text": y } });
    }
    layout
}

fn figure(request: &ChartRequest, traces: Vec<Value>) -> Value {
    json!({ "data": traces, "layout": layout(request) })
}

// =============================================================================
// Renderers
// =============================================================================

struct ScatterRenderer;

impl ChartRenderer for ScatterRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Scatter
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Points { x, y } if !x.is_empty() && x.len() == y.len() => Ok(figure(
                request,
                vec![json!({ "type": "scatter", "mode": "markers", "x": x, "y": y })],
            )),
            ChartData::Points { .. } => Err(unsupported(request, "no paired points")),
            _ => Err(unsupported(request, "scatter needs paired points")),
        }
    }
}

struct BarRenderer;

impl ChartRenderer for BarRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Bar
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Categories { labels, values } if !labels.is_empty() => Ok(figure(
                request,
                vec![json!({ "type": "bar", "x": labels, "y": values })],
            )),
            _ => Err(unsupported(request, "bar needs at least one category")),
        }
    }
}

struct PieRenderer;

impl ChartRenderer for PieRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Pie
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Categories { labels, values }
                if !labels.is_empty() && values.iter().all(|v| *v >= 0.0) =>
            {
                Ok(figure(
                    request,
                    vec![json!({ "type": "pie", "labels": labels, "values": values, "hole": 0.35 })],
                ))
            }
            _ => Err(unsupported(request, "pie needs non-negative category values")),
        }
    }
}

struct TimeSeriesRenderer;

impl ChartRenderer for TimeSeriesRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::TimeSeries
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        let ChartData::Timeline { x, y, smoothed } = &request.data else {
            return Err(unsupported(request, "time series needs a timeline"));
        };
        if x.len() < 2 {
            return Err(unsupported(request, "fewer than two time points"));
        }
        let name = request.columns.first().cloned().unwrap_or_default();
        let mut traces = vec![json!({
            "type": "scatter", "mode": "lines+markers", "name": name, "x": x, "y": y
        })];
        if let Some(smoothed) = smoothed {
            traces.push(json!({
                "type": "scatter", "mode": "lines", "name": "moving average",
                "x": x, "y": smoothed, "line": { "dash": "dot" }
            }));
        }
        let mut fig = figure(request, traces);
        fig["layout"]["xaxis"]["type"] = json!("date");
        Ok(fig)
    }
}

struct HeatmapRenderer;

impl ChartRenderer for HeatmapRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Heatmap
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Matrix { labels, z } if labels.len() >= 2 && z.len() == labels.len() => Ok(figure(
                request,
                vec![json!({
                    "type": "heatmap", "x": labels, "y": labels, "z": z,
                    "zmin": -1.0, "zmax": 1.0, "colorscale": "RdBu"
                })],
            )),
            _ => Err(unsupported(request, "heatmap needs a square matrix of at least two columns")),
        }
    }
}

struct GaugeRenderer;

impl ChartRenderer for GaugeRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Gauge
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Indicator { value, min, max } if value.is_finite() && min < max => Ok(figure(
                request,
                vec![json!({
                    "type": "indicator", "mode": "gauge+number", "value": value,
                    "gauge": { "axis": { "range": [min, max] } }
                })],
            )),
            _ => Err(unsupported(request, "gauge needs a finite value inside a range")),
        }
    }
}

struct HistogramRenderer;

impl ChartRenderer for HistogramRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::Histogram
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        match &request.data {
            ChartData::Values(values) if !values.is_empty() => Ok(figure(
                request,
                vec![json!({ "type": "histogram", "x": values })],
            )),
            _ => Err(unsupported(request, "histogram needs values")),
        }
    }
}

struct BoxPlotRenderer;

impl ChartRenderer for BoxPlotRenderer {
    fn kind(&self) -> ChartKind {
        ChartKind::BoxPlot
    }

    fn render(&self, request: &ChartRequest) -> Result<Value> {
        let ChartData::Groups(groups) = &request.data else {
            return Err(unsupported(request, "box plot needs value groups"));
        };
        let traces: Vec<Value> = groups
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| json!({ "type": "box", "name": name, "y": values }))
            .collect();
        if traces.is_empty() {
            return Err(unsupported(request, "every group is empty"));
        }
        Ok(figure(request, traces))
    }
}

// =============================================================================
// Registry
// =============================================================================

pub struct ChartRegistry {
    renderers: HashMap<ChartKind, Box<dyn ChartRenderer>>,
}

impl Default for ChartRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ChartRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// A registry with a renderer for every [`ChartKind`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ScatterRenderer));
        registry.register(Box::new(BarRenderer));
        registry.register(Box::new(PieRenderer));
        registry.register(Box::new(TimeSeriesRenderer));
        registry.register(Box::new(HeatmapRenderer));
        registry.register(Box::new(GaugeRenderer));
        registry.register(Box::new(HistogramRenderer));
        registry.register(Box::new(BoxPlotRenderer));
        registry
    }

    /// Add or replace the renderer for its kind.
    pub fn register(&mut self, renderer: Box<dyn ChartRenderer>) {
        self.renderers.insert(renderer.kind(), renderer);
    }

    pub fn supports(&self, kind: ChartKind) -> bool {
        self.renderers.contains_key(&kind)
    }

    pub fn render(&self, request: &ChartRequest) -> Result<Value> {
        let renderer = self.renderers.get(&request.kind).ok_or_else(|| PipelineError::Dashboard {
            chart: request.title.clone(),
            reason: format!("no renderer registered for {}", request.kind.as_str()),
        })?;
        renderer.render(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_kind_registered() {
        let registry = ChartRegistry::with_defaults();
        assert!(ChartKind::ALL.iter().all(|k| registry.supports(*k)));
    }

    #[test]
    fn test_bar_figure() {
        let request = ChartRequest::new(
            ChartKind::Bar,
            "Rows by region",
            "statistics.columns.region",
            ChartData::Categories {
                labels: vec!["North".to_string(), "South".to_string()],
                values: vec![3.0, 2.0],
            },
        )
        .columns(&["region"]);
        let fig = ChartRegistry::default().render(&request).unwrap();
        assert_eq!(fig["data"][0]["type"], "bar");
        assert_eq!(fig["data"][0]["x"][1], "South");
        assert_eq!(fig["layout"]["title"]["text"], "Rows by region");
    }

    #[test]
    fn test_mismatched_data_is_dashboard_error() {
        let request = ChartRequest::new(ChartKind::Heatmap, "Broken", "test", ChartData::Values(vec![1.0]));
        let err = ChartRegistry::default().render(&request).unwrap_err();
        assert_eq!(err.error_code(), "DASHBOARD_ERROR");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_renderer() {
        let request = ChartRequest::new(
            ChartKind::Gauge,
            "Score",
            "model",
            ChartData::Indicator {
                value: 0.5,
                min: 0.0,
                max: 1.0,
            },
        );
        assert!(ChartRegistry::empty().render(&request).is_err());
    }

    #[test]
    fn test_time_series_has_smoothing_trace() {
        let request = ChartRequest::new(
            ChartKind::TimeSeries,
            "revenue over date",
            "patterns.trends.revenue",
            ChartData::Timeline {
                x: vec!["2024-01-01".to_string(), "2024-01-02".to_string()],
                y: vec![1.0, 2.0],
                smoothed: Some(vec![1.5, 1.5]),
            },
        );
        let fig = ChartRegistry::default().render(&request).unwrap();
        assert_eq!(fig["data"].as_array().unwrap().len(), 2);
        assert_eq!(fig["layout"]["xaxis"]["type"], "date");
    }
}
