//! Isolation-forest anomaly scoring.
//!
//! Scores follow Liu et al.: `s(x) = 2^(-E[h(x)] / c(psi))` where `h` is the
//! path length to isolate `x` and `c` the expected path length of an
//! unsuccessful BST search over `psi` points. Scores near 1 are anomalous.

use super::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::pipeline::CancellationToken;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const N_TREES: usize = 100;
pub const SUBSAMPLE: usize = 256;

/// Anomalies listed individually in the result.
const TOP_ANOMALIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Row index in the cleaned frame.
    pub row: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub features: Vec<String>,
    pub contamination: f64,
    /// Score at or above which a row is flagged.
    pub threshold: f64,
    pub flagged_count: usize,
    pub scored_rows: usize,
    /// Highest-scoring flagged rows, most anomalous first.
    pub top: Vec<AnomalyRecord>,
    /// Score of each frame row; `None` for rows with missing features.
    #[serde(skip)]
    pub scores: Vec<Option<f64>>,
    #[serde(skip)]
    pub flags: Vec<bool>,
}

impl AnomalyResult {
    pub fn flagged_rate(&self) -> f64 {
        self.flagged_count as f64 / self.scored_rows.max(1) as f64
    }
}

enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + 0.577_215_664_901_532_9;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

pub struct IsolationForest {
    pub contamination: f64,
    pub seed: u64,
}

impl IsolationForest {
    pub fn detect(&self, matrix: &FeatureMatrix, token: &CancellationToken) -> Result<AnomalyResult> {
        let data = &matrix.data;
        let n = data.nrows();
        if n < 2 {
            return Err(PipelineError::Analysis {
                section: "anomalies".to_string(),
                reason: "at least two complete rows are needed".to_string(),
            });
        }
        let psi = SUBSAMPLE.min(n);
        let height_limit = (psi as f64).log2().ceil() as usize;

        let trees: Vec<Option<Node>> = (0..N_TREES)
            .into_par_iter()
            .map(|t| {
                if token.is_cancelled() {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let rows = sample(&mut rng, n, psi).into_vec();
                Some(grow(data, rows, 0, height_limit, &mut rng))
            })
            .collect();
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let trees: Vec<Node> = trees.into_iter().flatten().collect();

        let normalizer = average_path_length(psi);
        let row_scores: Vec<f64> = data
            .outer_iter()
            .map(|row| {
                let mean_path = trees.iter().map(|tree| path_length(tree, &row, 0)).sum::<f64>()
                    / trees.len() as f64;
                if normalizer > 0.0 {
                    2f64.powf(-mean_path / normalizer)
                } else {
                    0.5
                }
            })
            .collect();

        let flagged_count = ((self.contamination * n as f64).round() as usize).min(n);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| row_scores[b].total_cmp(&row_scores[a]).then(a.cmp(&b)));
        let flagged_positions = &order[..flagged_count];
        let threshold = flagged_positions
            .last()
            .map(|&p| row_scores[p])
            .unwrap_or(1.0);

        let mut scores = vec![None; matrix.frame_rows];
        let mut flags = vec![false; matrix.frame_rows];
        for (position, &row) in matrix.rows.iter().enumerate() {
            scores[row] = Some(row_scores[position]);
        }
        for &position in flagged_positions {
            flags[matrix.rows[position]] = true;
        }

        Ok(AnomalyResult {
            features: matrix.names.clone(),
            contamination: self.contamination,
            threshold,
            flagged_count,
            scored_rows: n,
            top: flagged_positions
                .iter()
                .take(TOP_ANOMALIES)
                .map(|&p| AnomalyRecord {
                    row: matrix.rows[p],
                    score: row_scores[p],
                })
                .collect(),
            scores,
            flags,
        })
    }
}

fn grow(data: &Array2<f64>, rows: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }
    // features that still vary within this node and whose span fits in an f64
    let ranges: Vec<(usize, f64, f64)> = (0..data.ncols())
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[[r, f]]), hi.max(data[[r, f]]))
            });
            (hi > lo && (hi - lo).is_finite()).then_some((f, lo, hi))
        })
        .collect();
    if ranges.is_empty() {
        return Node::Leaf { size: rows.len() };
    }
    let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[[r, feature]] < threshold);
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, limit, rng)),
        right: Box::new(grow(data, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &ArrayView1<f64>, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}
