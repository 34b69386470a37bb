//! Trend and seasonality over a time column.
//!
//! Rows are summed per distinct timestamp, then each numeric column gets an
//! OLS fit against elapsed days with a two-sided t-test on the slope, a
//! centred moving average, and an autocorrelation scan of the detrended
//! residuals for a seasonal period.

use crate::error::{PipelineError, Result};
use crate::utils::format_timestamp_ms;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;

/// Distinct time points needed before a trend is fitted.
pub const MIN_POINTS: usize = 8;

/// Residual autocorrelation above which a lag counts as a season.
pub const SEASONALITY_THRESHOLD: f64 = 0.5;

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

const MAX_LAG: usize = 52;
const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    /// Slope not significant at [`SIGNIFICANCE_LEVEL`].
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// Period in time points.
    pub period: usize,
    pub period_days: f64,
    pub autocorrelation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp_ms: i64,
    pub value: f64,
    pub smoothed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTrend {
    pub column: String,
    pub slope_per_day: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub direction: TrendDirection,
    /// The smoothed series never reverses direction.
    pub monotonic: bool,
    /// Fitted change over the whole span relative to the mean level.
    pub relative_change: Option<f64>,
    pub seasonality: Option<Seasonality>,
    #[serde(skip)]
    pub timeline: Vec<TimePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub time_column: String,
    pub points: usize,
    pub start: String,
    pub end: String,
    pub moving_average_window: usize,
    pub series: Vec<SeriesTrend>,
}

/// Analyze `columns` (row-aligned with `timestamps`) over time.
pub fn detect_trends(
    time_column: &str,
    timestamps: &[Option<i64>],
    columns: &[(String, Vec<Option<f64>>)],
) -> Result<TrendResult> {
    let distinct: BTreeMap<i64, ()> = timestamps.iter().flatten().map(|t| (*t, ())).collect();
    if distinct.len() < MIN_POINTS {
        return Err(PipelineError::Analysis {
            section: "trends".to_string(),
            reason: format!(
                "'{}' has {} distinct time points, at least {} required",
                time_column,
                distinct.len(),
                MIN_POINTS
            ),
        });
    }
    let (Some(&start), Some(&end)) = (distinct.keys().next(), distinct.keys().next_back()) else {
        return Err(PipelineError::Internal("empty timeline".to_string()));
    };

    let window = (distinct.len() / 10).clamp(3, 7);
    let series = columns
        .iter()
        .filter_map(|(name, values)| {
            let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
            for (t, v) in timestamps.iter().zip(values) {
                if let (Some(t), Some(v)) = (t, v) {
                    *buckets.entry(*t).or_insert(0.0) += v;
                }
            }
            (buckets.len() >= MIN_POINTS).then(|| fit_series(name, &buckets, window))
        })
        .collect();

    Ok(TrendResult {
        time_column: time_column.to_string(),
        points: distinct.len(),
        start: format_timestamp_ms(start),
        end: format_timestamp_ms(end),
        moving_average_window: window,
        series,
    })
}

fn fit_series(name: &str, buckets: &BTreeMap<i64, f64>, window: usize) -> SeriesTrend {
    let origin = buckets.keys().next().copied().unwrap_or_default();
    let xs: Vec<f64> = buckets.keys().map(|t| (t - origin) as f64 / MS_PER_DAY).collect();
    let ys: Vec<f64> = buckets.values().copied().collect();
    let fit = ols(&xs, &ys);

    let direction = match fit.p_value {
        p if p < SIGNIFICANCE_LEVEL && fit.slope > 0.0 => TrendDirection::Increasing,
        p if p < SIGNIFICANCE_LEVEL && fit.slope < 0.0 => TrendDirection::Decreasing,
        _ => TrendDirection::Flat,
    };

    let smoothed = moving_average(&ys, window);
    let rising = smoothed.windows(2).all(|w| w[1] >= w[0]);
    let falling = smoothed.windows(2).all(|w| w[1] <= w[0]);
    let monotonic = direction != TrendDirection::Flat && (rising || falling);

    let mean_level = ys.iter().sum::<f64>() / ys.len() as f64;
    let span = xs.last().copied().unwrap_or_default();
    let relative_change = (mean_level.abs() > f64::EPSILON).then(|| fit.slope * span / mean_level.abs());

    let residuals: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| y - (fit.intercept + fit.slope * x))
        .collect();
    let spacing = median_spacing(&xs);
    let seasonality = seasonal_period(&residuals).map(|(period, acf)| Seasonality {
        period,
        period_days: period as f64 * spacing,
        autocorrelation: acf,
    });

    SeriesTrend {
        column: name.to_string(),
        slope_per_day: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
        t_statistic: fit.t_statistic,
        p_value: fit.p_value,
        direction,
        monotonic,
        relative_change,
        seasonality,
        timeline: buckets
            .iter()
            .zip(&smoothed)
            .map(|((t, v), s)| TimePoint {
                timestamp_ms: *t,
                value: *v,
                smoothed: *s,
            })
            .collect(),
    }
}

struct LinearFit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
    t_statistic: f64,
    p_value: f64,
}

fn ols(xs: &[f64], ys: &[f64]) -> LinearFit {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let syy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = my - slope * mx;
    let sse: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - intercept - slope * x).powi(2))
        .sum();
    let r_squared = if syy > 0.0 { 1.0 - sse / syy } else { 0.0 };

    let dof = n - 2.0;
    let (t_statistic, p_value) = if sxx == 0.0 || syy == 0.0 {
        (0.0, 1.0)
    } else if sse <= f64::EPSILON * syy {
        (f64::INFINITY.copysign(slope), 0.0)
    } else {
        let se = (sse / dof / sxx).sqrt();
        let t = slope / se;
        (t, student_t_two_sided(t, dof))
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
        t_statistic,
        p_value,
    }
}

/// Centred moving average; windows shrink at the edges.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Sample autocorrelation of `values` at `lag`.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag >= n {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom == 0.0 {
        return 0.0;
    }
    let num: f64 = (0..n - lag).map(|t| (values[t] - m) * (values[t + lag] - m)).sum();
    num / denom
}

/// Smallest lag (>= 2, at least two full cycles) whose autocorrelation
/// clears the threshold and is a local peak.
fn seasonal_period(residuals: &[f64]) -> Option<(usize, f64)> {
    let max_lag = (residuals.len() / 2).min(MAX_LAG);
    if max_lag < 2 {
        return None;
    }
    let acf: Vec<f64> = (0..=max_lag + 1).map(|lag| autocorrelation(residuals, lag)).collect();
    (2..=max_lag)
        .find(|&lag| acf[lag] > SEASONALITY_THRESHOLD && acf[lag] >= acf[lag - 1] && acf[lag] >= acf[lag + 1])
        .map(|lag| (lag, acf[lag]))
}

fn median_spacing(xs: &[f64]) -> f64 {
    let mut gaps: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.sort_by(f64::total_cmp);
    gaps[gaps.len() / 2]
}

/// Two-sided p-value for `t` with `dof` degrees of freedom.
///
/// Non-finite `t` gives 0; an invalid `dof` gives 1.
pub fn student_t_two_sided(t: f64, dof: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    StudentsT::new(0.0, 1.0, dof)
        .map(|dist| (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
        .unwrap_or(1.0)
}
