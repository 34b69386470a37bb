//! Random forest backend: bagged CART trees grown in parallel.

use super::{ModelBackend, Predictor, evaluate};
use crate::cancellation::CancellationToken;
use crate::config::{AutoMlConfig, ProblemType};
use crate::dataset::TrainingSet;
use crate::error::{LearningError, Result};
use crate::types::ModelResult;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Ensemble backend, compiled in with the `ensemble` feature.
#[derive(Debug, Clone)]
pub struct RandomForestBackend {
    config: AutoMlConfig,
}

impl RandomForestBackend {
    pub fn new(config: AutoMlConfig) -> Self {
        Self { config }
    }
}

impl ModelBackend for RandomForestBackend {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&self, data: &TrainingSet, token: &CancellationToken) -> Result<ModelResult> {
        let started = Instant::now();
        let x = data.rows(&data.train_idx);
        let y = data.targets(&data.train_idx);
        if x.nrows() < 2 {
            return Err(LearningError::InsufficientData {
                rows: x.nrows(),
                required: 2,
            });
        }

        let n_outputs = match data.task_type {
            ProblemType::Regression => 1,
            _ => data.n_classes().max(2),
        };
        let p = x.ncols();
        let max_features = match data.task_type {
            ProblemType::Regression => (p / 3).max(1),
            _ => ((p as f64).sqrt().round() as usize).max(1),
        };
        let params = TreeParams {
            task: data.task_type,
            n_outputs,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            max_features: max_features.min(p),
        };

        let grown: Vec<Option<(Node, Vec<f64>)>> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| {
                if token.is_cancelled() {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(self.config.random_seed.wrapping_add(t as u64));
                let n = x.nrows();
                let mut sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x: &x,
                    y: &y,
                    params: &params,
                    importances: vec![0.0; p],
                    rng,
                };
                let root = builder.grow(&mut sample, 0);
                Some((root, builder.importances))
            })
            .collect();

        token.check()?;

        let mut trees = Vec::with_capacity(grown.len());
        let mut importances = vec![0.0; p];
        for (root, tree_importances) in grown.into_iter().flatten() {
            let total: f64 = tree_importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
                    *acc += v / total;
                }
            }
            trees.push(root);
        }
        if trees.is_empty() {
            return Err(LearningError::TrainingFailed("no trees were grown".to_string()));
        }
        let n_trees = trees.len() as f64;
        importances.iter_mut().for_each(|v| *v /= n_trees);
        debug!("Grew {} trees on {} rows x {} features", trees.len(), x.nrows(), p);

        let model = ForestModel {
            trees,
            task: data.task_type,
            n_outputs,
            importances,
        };
        let model_name = match data.task_type {
            ProblemType::Regression => "random_forest_regressor",
            _ => "random_forest_classifier",
        };
        Ok(evaluate(self.name(), model_name, &model, data, &self.config, started))
    }
}

// =============================================================================
// Trees
// =============================================================================

enum Node {
    Leaf {
        /// Mean target for regression, class proportions for classification.
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn leaf_for(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct TreeParams {
    task: ProblemType,
    n_outputs: usize,
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [f64],
    params: &'a TreeParams,
    importances: Vec<f64>,
    rng: StdRng,
}

struct Split {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, idx: &mut [usize], depth: usize) -> Node {
        let impurity = self.impurity(idx);
        if depth >= self.params.max_depth
            || idx.len() < self.params.min_samples_split
            || impurity <= MIN_IMPURITY_DECREASE
        {
            return self.leaf(idx);
        }

        let Some(split) = self.best_split(idx, impurity) else {
            return self.leaf(idx);
        };
        self.importances[split.feature] += split.decrease;

        let mut boundary = 0;
        for i in 0..idx.len() {
            if self.x[[idx[i], split.feature]] <= split.threshold {
                idx.swap(i, boundary);
                boundary += 1;
            }
        }
        let (left, right) = idx.split_at_mut(boundary);
        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn leaf(&self, idx: &[usize]) -> Node {
        let n = idx.len().max(1) as f64;
        let value = match self.params.task {
            ProblemType::Regression => vec![idx.iter().map(|&i| self.y[i]).sum::<f64>() / n],
            _ => {
                let mut counts = vec![0.0; self.params.n_outputs];
                for &i in idx {
                    counts[self.y[i] as usize] += 1.0;
                }
                counts.iter().map(|c| c / n).collect()
            }
        };
        Node::Leaf { value }
    }

    /// Sum of squared errors, or n * gini.
    fn impurity(&self, idx: &[usize]) -> f64 {
        match self.params.task {
            ProblemType::Regression => {
                let (sum, sum_sq) = idx.iter().fold((0.0, 0.0), |(s, q), &i| {
                    (s + self.y[i], q + self.y[i] * self.y[i])
                });
                (sum_sq - sum * sum / idx.len().max(1) as f64).max(0.0)
            }
            _ => {
                let mut counts = vec![0.0; self.params.n_outputs];
                for &i in idx {
                    counts[self.y[i] as usize] += 1.0;
                }
                weighted_gini(&counts, idx.len() as f64)
            }
        }
    }

    fn best_split(&mut self, idx: &[usize], parent: f64) -> Option<Split> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);
        features.truncate(self.params.max_features);

        let mut best: Option<Split> = None;
        let mut sorted = idx.to_vec();
        for feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let candidate = match self.params.task {
                ProblemType::Regression => self.sweep_regression(&sorted, feature, parent),
                _ => self.sweep_classification(&sorted, feature, parent),
            };
            if let Some(candidate) = candidate {
                if best.as_ref().is_none_or(|b| candidate.decrease > b.decrease) {
                    best = Some(candidate);
                }
            }
        }
        best.filter(|s| s.decrease > MIN_IMPURITY_DECREASE)
    }

    fn sweep_regression(&self, sorted: &[usize], feature: usize, parent: f64) -> Option<Split> {
        let n = sorted.len();
        let (total, total_sq) = sorted.iter().fold((0.0, 0.0), |(s, q), &i| {
            (s + self.y[i], q + self.y[i] * self.y[i])
        });
        let (mut left, mut left_sq) = (0.0, 0.0);
        let mut best: Option<Split> = None;

        for k in 0..n - 1 {
            let v = self.y[sorted[k]];
            left += v;
            left_sq += v * v;
            let here = self.x[[sorted[k], feature]];
            let next = self.x[[sorted[k + 1], feature]];
            if here == next {
                continue;
            }
            let n_left = (k + 1) as f64;
            let n_right = (n - k - 1) as f64;
            let sse_left = left_sq - left * left / n_left;
            let right = total - left;
            let sse_right = (total_sq - left_sq) - right * right / n_right;
            let decrease = parent - sse_left - sse_right;
            if best.as_ref().is_none_or(|b| decrease > b.decrease) {
                best = Some(Split {
                    feature,
                    threshold: (here + next) / 2.0,
                    decrease,
                });
            }
        }
        best
    }

    fn sweep_classification(&self, sorted: &[usize], feature: usize, parent: f64) -> Option<Split> {
        let n = sorted.len();
        let mut right_counts = vec![0.0; self.params.n_outputs];
        for &i in sorted {
            right_counts[self.y[i] as usize] += 1.0;
        }
        let mut left_counts = vec![0.0; self.params.n_outputs];
        let mut best: Option<Split> = None;

        for k in 0..n - 1 {
            let class = self.y[sorted[k]] as usize;
            left_counts[class] += 1.0;
            right_counts[class] -= 1.0;
            let here = self.x[[sorted[k], feature]];
            let next = self.x[[sorted[k + 1], feature]];
            if here == next {
                continue;
            }
            let n_left = (k + 1) as f64;
            let decrease = parent
                - weighted_gini(&left_counts, n_left)
                - weighted_gini(&right_counts, n as f64 - n_left);
            if best.as_ref().is_none_or(|b| decrease > b.decrease) {
                best = Some(Split {
                    feature,
                    threshold: (here + next) / 2.0,
                    decrease,
                });
            }
        }
        best
    }
}

fn weighted_gini(counts: &[f64], n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    n - counts.iter().map(|c| c * c).sum::<f64>() / n
}

// =============================================================================
// Fitted forest
// =============================================================================

struct ForestModel {
    trees: Vec<Node>,
    task: ProblemType,
    n_outputs: usize,
    importances: Vec<f64>,
}

impl ForestModel {
    fn averaged(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.leaf_for(row)) {
                *a += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }
}

impl Predictor for ForestModel {
    fn predict(&self, x: &Array2<f64>) -> Vec<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let out = self.averaged(row);
                match self.task {
                    ProblemType::Regression => out[0],
                    _ => {
                        let mut best = 0;
                        for class in 1..out.len() {
                            if out[class] > out[best] {
                                best = class;
                            }
                        }
                        best as f64
                    }
                }
            })
            .collect()
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Option<Vec<f64>> {
        (self.task == ProblemType::Classification && self.n_outputs == 2)
            .then(|| x.rows().into_iter().map(|row| self.averaged(row)[1]).collect())
    }

    fn native_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}
