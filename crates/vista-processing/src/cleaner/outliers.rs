//! Outlier capping at validator fences.

use crate::quality::OutlierFence;
use polars::prelude::*;

/// Clamp values of `series` into `[fence.lower, fence.upper]`.
///
/// Returns the capped column and how many values moved. Rows are never
/// removed, so the column stays aligned with the rest of the frame.
pub fn cap_at_fence(series: &Series, fence: &OutlierFence) -> PolarsResult<(Series, usize)> {
    let float_series = series.cast(&DataType::Float64)?;
    let values = float_series.f64()?;

    let outside = values
        .into_iter()
        .filter(|v| v.is_some_and(|val| val < fence.lower || val > fence.upper))
        .count();
    let capped = values.apply(|v| v.map(|val| val.clamp(fence.lower, fence.upper)));

    Ok((capped.into_series(), outside))
}
