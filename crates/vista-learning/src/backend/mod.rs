//! Pluggable model backends.
//!
//! A [`ModelBackend`] fits a model on a prepared [`TrainingSet`] and returns a
//! [`ModelResult`]. Two implementations ship with the crate:
//!
//! - [`RandomForestBackend`] (feature `ensemble`, on by default): bagged CART
//!   trees with impurity-based importances.
//! - [`LinearBaseline`]: least squares / logistic regression with permutation
//!   importances. Always available.
//!
//! The backend is chosen once, when the [`AutoMl`](crate::AutoMl) engine is
//! constructed. Both produce identical metric keys, so nothing downstream
//! depends on which one ran.

mod linear;

#[cfg(feature = "ensemble")]
mod forest;

pub use linear::LinearBaseline;

#[cfg(feature = "ensemble")]
pub use forest::RandomForestBackend;

use crate::cancellation::CancellationToken;
use crate::config::{AutoMlConfig, ProblemType};
use crate::dataset::TrainingSet;
use crate::error::Result;
use crate::importance;
use crate::metrics;
use crate::types::{ImportanceMethod, ModelResult};
use ndarray::Array2;
use std::time::Instant;

/// Capability interface for model fitting.
///
/// Implementations must be `Send + Sync`: the engine runs inside the
/// analysis fan-out on a worker thread.
pub trait ModelBackend: Send + Sync {
    /// Stable backend identifier used in reports.
    fn name(&self) -> &'static str;

    /// Fit on `data.train_idx`, evaluate on `data.test_idx`.
    fn fit(&self, data: &TrainingSet, token: &CancellationToken) -> Result<ModelResult>;
}

/// A fitted model, as seen by the shared evaluation code.
pub trait Predictor: Send + Sync {
    /// Regression values, or class indices for classification.
    fn predict(&self, x: &Array2<f64>) -> Vec<f64>;

    /// Class-1 probabilities for binary classification.
    fn positive_scores(&self, _x: &Array2<f64>) -> Option<Vec<f64>> {
        None
    }

    /// Importance per encoded column, when the model has its own notion.
    fn native_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Pick the backend for `config`: the ensemble when compiled in and
/// preferred, else the linear baseline.
pub fn select_backend(config: &AutoMlConfig) -> Box<dyn ModelBackend> {
    #[cfg(feature = "ensemble")]
    {
        if config.prefer_advanced {
            return Box::new(RandomForestBackend::new(config.clone()));
        }
    }
    Box::new(LinearBaseline::new(config.clone()))
}

/// Score a fitted model and assemble the backend-agnostic result.
pub(crate) fn evaluate(
    backend: &str,
    model_name: &str,
    model: &dyn Predictor,
    data: &TrainingSet,
    config: &AutoMlConfig,
    started: Instant,
) -> ModelResult {
    let x_train = data.rows(&data.train_idx);
    let y_train = data.targets(&data.train_idx);
    let x_test = data.rows(&data.test_idx);
    let y_test = data.targets(&data.test_idx);

    let pred_train = model.predict(&x_train);
    let pred_test = model.predict(&x_test);
    let scores = if data.task_type == ProblemType::Classification && data.n_classes() == 2 {
        model.positive_scores(&x_test)
    } else {
        None
    };

    let metrics = metrics::evaluate(
        data.task_type,
        &y_train,
        &pred_train,
        &y_test,
        &pred_test,
        scores.as_deref(),
    );

    let (raw, importance_method) = match model.native_importances() {
        Some(native) => (
            importance::fold_groups(&native, &data.groups),
            ImportanceMethod::Native,
        ),
        None => (
            importance::permutation_importance(
                model,
                &x_test,
                &y_test,
                &data.groups,
                data.task_type,
                config.permutation_repeats,
                config.random_seed,
            ),
            ImportanceMethod::Permutation,
        ),
    };

    ModelResult {
        backend: backend.to_string(),
        model_name: model_name.to_string(),
        task_type: data.task_type,
        target: data.target.clone(),
        metrics,
        feature_importances: importance::rank(&data.groups, &raw),
        importance_method,
        classes: data.classes.clone(),
        train_rows: data.train_idx.len(),
        test_rows: data.test_idx.len(),
        n_features: data.feature_names.len(),
        training_time_seconds: started.elapsed().as_secs_f64(),
        warnings: data.warnings.clone(),
    }
}

/// Column means and standard deviations (zero std becomes 1.0).
pub(crate) fn standardization(x: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
    let n = x.nrows().max(1) as f64;
    let mut means = Vec::with_capacity(x.ncols());
    let mut stds = Vec::with_capacity(x.ncols());
    for column in x.columns() {
        let mean = column.sum() / n;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        means.push(mean);
        stds.push(if var > 0.0 { var.sqrt() } else { 1.0 });
    }
    (means, stds)
}

pub(crate) fn standardize(x: &Array2<f64>, means: &[f64], stds: &[f64]) -> Array2<f64> {
    let mut out = x.clone();
    for (j, mut column) in out.columns_mut().into_iter().enumerate() {
        column.mapv_inplace(|v| (v - means[j]) / stds[j]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_zero_variance_column() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let (means, stds) = standardization(&x);
        assert_eq!(means, vec![2.0, 5.0]);
        assert_eq!(stds[1], 1.0);

        let z = standardize(&x, &means, &stds);
        assert!((z[[0, 0]] + z[[2, 0]]).abs() < 1e-12);
        assert_eq!(z[[1, 1]], 0.0);
    }

    #[test]
    fn test_select_backend_respects_preference() {
        let config = AutoMlConfig::builder().prefer_advanced(false).build().unwrap();
        assert_eq!(select_backend(&config).name(), "linear_baseline");
    }

    #[cfg(feature = "ensemble")]
    #[test]
    fn test_select_backend_prefers_ensemble() {
        assert_eq!(select_backend(&AutoMlConfig::default()).name(), "random_forest");
    }
}
