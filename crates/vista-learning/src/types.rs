//! Common types returned by the AutoML engine.
//!
//! - [`AutoMlOutcome`]: what [`AutoMl::run`](crate::AutoMl::run) produced
//! - [`ModelResult`]: a trained model's evaluation, independent of backend
//! - [`Metrics`]: evaluation metrics (classification or regression)
//! - [`FeatureImportance`]: one ranked feature

use crate::config::ProblemType;
use serde::{Deserialize, Serialize};

/// Result of an AutoML run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutoMlOutcome {
    /// A model was trained and evaluated.
    Trained(ModelResult),
    /// Training was not attempted, with the reason.
    Skipped {
        /// Human-readable explanation (e.g. `"no target provided"`).
        reason: String,
    },
}

impl AutoMlOutcome {
    /// The model result, if one was trained.
    pub fn model(&self) -> Option<&ModelResult> {
        match self {
            Self::Trained(result) => Some(result),
            Self::Skipped { .. } => None,
        }
    }
}

/// Evaluation of a trained model.
///
/// Every backend produces this exact structure, so consumers never need to
/// know which backend ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ModelResult {
    /// Backend that produced the model (`"random_forest"`, `"linear_baseline"`).
    pub backend: String,

    /// Concrete algorithm (e.g. `"random_forest_regressor"`, `"logistic_regression"`).
    pub model_name: String,

    /// Detected or forced task type.
    pub task_type: ProblemType,

    /// Target column name.
    pub target: String,

    /// Metrics on the validation split (and train score).
    pub metrics: Metrics,

    /// Importance per source column, sorted descending, normalized to sum 1.0
    /// when any importance is positive.
    pub feature_importances: Vec<FeatureImportance>,

    /// How the importances were obtained.
    pub importance_method: ImportanceMethod,

    /// Class labels in encoding order (classification only).
    pub classes: Vec<String>,

    /// Rows used for fitting.
    pub train_rows: usize,

    /// Rows held out for validation.
    pub test_rows: usize,

    /// Encoded feature count after one-hot expansion.
    pub n_features: usize,

    /// Wall-clock fit + evaluation time.
    pub training_time_seconds: f64,

    /// Non-fatal issues (dropped columns, null targets, fallback used).
    pub warnings: Vec<String>,
}

impl ModelResult {
    /// The headline score: R² for regression, accuracy for classification.
    pub fn primary_score(&self) -> Option<f64> {
        self.metrics.test_score
    }
}

/// One feature's importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Source column name (one-hot groups are folded back into their column).
    pub feature: String,
    /// Normalized importance.
    pub importance: f64,
}

/// Source of feature importances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceMethod {
    /// The model's own mechanism (impurity decrease for trees).
    Native,
    /// Drop in validation score when a feature is shuffled.
    Permutation,
}

/// Metrics from model evaluation.
///
/// All keys are always present; only the fields relevant to the task type are
/// populated.
///
/// # Classification Metrics
/// `accuracy`, weighted `precision` / `recall` / `f1_score`, and `roc_auc`
/// for binary problems.
///
/// # Regression Metrics
/// `mse`, `rmse`, `mae`, `r2`.
///
/// # Common Metrics
/// `test_score` and `train_score` (accuracy or R²).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Metrics {
    /// Score on the validation split.
    pub test_score: Option<f64>,
    /// Score on the training split.
    pub train_score: Option<f64>,

    /// Fraction of correct predictions.
    pub accuracy: Option<f64>,
    /// Support-weighted precision.
    pub precision: Option<f64>,
    /// Support-weighted recall.
    pub recall: Option<f64>,
    /// Support-weighted F1.
    pub f1_score: Option<f64>,
    /// Area under the ROC curve (binary only).
    pub roc_auc: Option<f64>,

    /// Mean squared error.
    pub mse: Option<f64>,
    /// Root mean squared error.
    pub rmse: Option<f64>,
    /// Mean absolute error.
    pub mae: Option<f64>,
    /// Coefficient of determination.
    pub r2: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_keys_always_serialized() {
        let json = serde_json::to_value(Metrics::default()).unwrap();
        let object = json.as_object().unwrap();
        for key in [
            "test_score",
            "train_score",
            "accuracy",
            "precision",
            "recall",
            "f1_score",
            "roc_auc",
            "mse",
            "rmse",
            "mae",
            "r2",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
    }

    #[test]
    fn test_skipped_outcome_serialization() {
        let outcome = AutoMlOutcome::Skipped {
            reason: "no target provided".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"status":"skipped","reason":"no target provided"}"#);
        assert!(outcome.model().is_none());
    }
}
