//! Linear baseline: ridge-stabilized least squares for regression,
//! one-vs-rest logistic regression for classification.

use super::{ModelBackend, Predictor, evaluate, standardization, standardize};
use crate::cancellation::CancellationToken;
use crate::config::{AutoMlConfig, ProblemType};
use crate::dataset::TrainingSet;
use crate::error::{LearningError, Result};
use crate::types::ModelResult;
use ndarray::{Array1, Array2};
use std::time::Instant;
use tracing::debug;

const RIDGE_LAMBDA: f64 = 1e-3;
const LOGISTIC_ITERATIONS: usize = 400;
const LOGISTIC_LEARNING_RATE: f64 = 0.5;

/// Always-available backend.
#[derive(Debug, Clone)]
pub struct LinearBaseline {
    config: AutoMlConfig,
}

impl LinearBaseline {
    pub fn new(config: AutoMlConfig) -> Self {
        Self { config }
    }
}

impl ModelBackend for LinearBaseline {
    fn name(&self) -> &'static str {
        "linear_baseline"
    }

    fn fit(&self, data: &TrainingSet, token: &CancellationToken) -> Result<ModelResult> {
        let started = Instant::now();
        let x_train = data.rows(&data.train_idx);
        let y_train = data.targets(&data.train_idx);
        let (means, stds) = standardization(&x_train);
        let z = standardize(&x_train, &means, &stds);

        match data.task_type {
            ProblemType::Regression => {
                let model = fit_least_squares(&z, &y_train, means, stds)?;
                debug!("Fitted least squares on {} rows", z.nrows());
                Ok(evaluate(self.name(), "linear_regression", &model, data, &self.config, started))
            }
            _ => {
                let model = fit_logistic(&z, &y_train, data.n_classes(), means, stds, token)?;
                debug!("Fitted logistic regression on {} rows", z.nrows());
                Ok(evaluate(self.name(), "logistic_regression", &model, data, &self.config, started))
            }
        }
    }
}

struct LinearModel {
    means: Vec<f64>,
    stds: Vec<f64>,
    weights: Array1<f64>,
    intercept: f64,
}

impl Predictor for LinearModel {
    fn predict(&self, x: &Array2<f64>) -> Vec<f64> {
        let z = standardize(x, &self.means, &self.stds);
        (z.dot(&self.weights) + self.intercept).to_vec()
    }
}

fn fit_least_squares(z: &Array2<f64>, y: &[f64], means: Vec<f64>, stds: Vec<f64>) -> Result<LinearModel> {
    let n = y.len().max(1) as f64;
    let y_mean = y.iter().sum::<f64>() / n;
    let centered: Array1<f64> = y.iter().map(|v| v - y_mean).collect();

    let mut gram = z.t().dot(z);
    for i in 0..gram.nrows() {
        gram[[i, i]] += RIDGE_LAMBDA * n;
    }
    let rhs = z.t().dot(&centered);
    let weights = solve(gram, rhs).ok_or_else(|| {
        LearningError::TrainingFailed("normal equations are singular".to_string())
    })?;

    Ok(LinearModel {
        means,
        stds,
        weights,
        intercept: y_mean,
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

struct LogisticModel {
    means: Vec<f64>,
    stds: Vec<f64>,
    // One (weights, intercept) per class; a single model for binary problems.
    models: Vec<(Array1<f64>, f64)>,
}

impl LogisticModel {
    fn probabilities(&self, x: &Array2<f64>) -> Vec<Vec<f64>> {
        let z = standardize(x, &self.means, &self.stds);
        self.models
            .iter()
            .map(|(w, b)| (z.dot(w) + *b).mapv(sigmoid).to_vec())
            .collect()
    }
}

impl Predictor for LogisticModel {
    fn predict(&self, x: &Array2<f64>) -> Vec<f64> {
        let probs = self.probabilities(x);
        if probs.len() == 1 {
            return probs[0].iter().map(|p| if *p >= 0.5 { 1.0 } else { 0.0 }).collect();
        }
        (0..x.nrows())
            .map(|row| {
                let mut best = 0;
                for class in 1..probs.len() {
                    if probs[class][row] > probs[best][row] {
                        best = class;
                    }
                }
                best as f64
            })
            .collect()
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Option<Vec<f64>> {
        let mut probs = self.probabilities(x);
        (probs.len() == 1).then(|| probs.remove(0))
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn fit_logistic(
    z: &Array2<f64>,
    y: &[f64],
    n_classes: usize,
    means: Vec<f64>,
    stds: Vec<f64>,
    token: &CancellationToken,
) -> Result<LogisticModel> {
    let targets: Vec<usize> = if n_classes == 2 { vec![1] } else { (0..n_classes).collect() };
    let n = y.len().max(1) as f64;
    let mut models = Vec::with_capacity(targets.len());

    for class in targets {
        token.check()?;
        let labels: Array1<f64> = y
            .iter()
            .map(|v| if (*v as usize) == class { 1.0 } else { 0.0 })
            .collect();
        let mut w = Array1::zeros(z.ncols());
        let mut b = 0.0;
        for _ in 0..LOGISTIC_ITERATIONS {
            let residual = (z.dot(&w) + b).mapv(sigmoid) - &labels;
            let grad_w = z.t().dot(&residual) / n + &w * RIDGE_LAMBDA;
            let grad_b = residual.sum() / n;
            w = w - grad_w * LOGISTIC_LEARNING_RATE;
            b -= grad_b * LOGISTIC_LEARNING_RATE;
        }
        models.push((w, b));
    }

    Ok(LogisticModel { means, stds, models })
}
