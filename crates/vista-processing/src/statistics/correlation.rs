//! Pairwise correlation over numeric columns.
//!
//! Nulls are dropped per pair, so a sparse column only costs the rows it is
//! missing from that pair. A column with zero variance has no correlation
//! with anything, including itself.

use crate::config::CorrelationMethod;
use serde::{Deserialize, Serialize};

/// Pairs with fewer complete rows than this are left empty.
pub const MIN_PAIRED_ROWS: usize = 3;

/// Kendall is quadratic; longer inputs are subsampled evenly to this size.
pub const KENDALL_MAX_ROWS: usize = 5_000;

/// Symmetric correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub columns: Vec<String>,
    /// `values[i][j]`; `None` where the coefficient is undefined.
    pub values: Vec<Vec<Option<f64>>>,
}

/// One off-diagonal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
}

impl CorrelationMatrix {
    /// Compute the matrix for named columns of row-aligned values.
    pub fn compute(method: CorrelationMethod, columns: &[(String, Vec<Option<f64>>)]) -> Self {
        let n = columns.len();
        let mut values = vec![vec![None; n]; n];

        for i in 0..n {
            values[i][i] = has_variance(&columns[i].1).then_some(1.0);
            for j in (i + 1)..n {
                let (xs, ys) = paired(&columns[i].1, &columns[j].1);
                let r = if xs.len() < MIN_PAIRED_ROWS {
                    None
                } else {
                    match method {
                        CorrelationMethod::Pearson => pearson(&xs, &ys),
                        CorrelationMethod::Spearman => pearson(&ranks(&xs), &ranks(&ys)),
                        CorrelationMethod::Kendall => kendall_tau_b(&xs, &ys),
                    }
                };
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        Self {
            method,
            columns: columns.iter().map(|(name, _)| name.clone()).collect(),
            values,
        }
    }

    pub fn get(&self, left: &str, right: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == left)?;
        let j = self.columns.iter().position(|c| c == right)?;
        self.values[i][j]
    }

    /// Defined upper-triangle pairs, strongest first (ties keep column order).
    pub fn pairs(&self) -> Vec<CorrelationPair> {
        let mut pairs = Vec::new();
        for i in 0..self.columns.len() {
            for j in (i + 1)..self.columns.len() {
                if let Some(r) = self.values[i][j] {
                    pairs.push(CorrelationPair {
                        left: self.columns[i].clone(),
                        right: self.columns[j].clone(),
                        coefficient: r,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn has_variance(values: &[Option<f64>]) -> bool {
    let mut present = values.iter().flatten();
    match present.next() {
        Some(first) => present.any(|v| v != first),
        None => false,
    }
}

fn paired(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Fractional ranks (1-based, ties get the average rank).
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut out = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            out[idx] = rank;
        }
        start = end + 1;
    }
    out
}

/// Kendall's tau-b, which corrects for ties on either side.
pub fn kendall_tau_b(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let stride = xs.len().div_ceil(KENDALL_MAX_ROWS).max(1);
    let xs: Vec<f64> = xs.iter().step_by(stride).copied().collect();
    let ys: Vec<f64> = ys.iter().step_by(stride).copied().collect();

    let (mut concordant, mut discordant) = (0i64, 0i64);
    let (mut ties_x, mut ties_y) = (0i64, 0i64);
    for i in 0..xs.len() {
        for j in (i + 1)..xs.len() {
            let dx = xs[i].total_cmp(&xs[j]) as i64;
            let dy = ys[i].total_cmp(&ys[j]) as i64;
            match (dx, dy) {
                (0, 0) => {}
                (0, _) => ties_x += 1,
                (_, 0) => ties_y += 1,
                _ if dx == dy => concordant += 1,
                _ => discordant += 1,
            }
        }
    }
    let n1 = (concordant + discordant + ties_x) as f64;
    let n2 = (concordant + discordant + ties_y) as f64;
    if n1 == 0.0 || n2 == 0.0 {
        return None;
    }
    Some((concordant - discordant) as f64 / (n1 * n2).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(name: &str, values: &[f64]) -> (String, Vec<Option<f64>>) {
        (name.to_string(), values.iter().map(|v| Some(*v)).collect())
    }

    fn sample() -> Vec<(String, Vec<Option<f64>>)> {
        vec![
            column("a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            column("b", &[2.1, 3.9, 6.2, 8.1, 9.8, 12.5]),
            column("c", &[5.0, 1.0, 4.0, 2.0, 6.0, 3.0]),
            column("flat", &[1.0; 6]),
        ]
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let matrix = CorrelationMatrix::compute(method, &sample());
            for i in 0..3 {
                assert_eq!(matrix.values[i][i], Some(1.0));
                for j in 0..4 {
                    assert_eq!(matrix.values[i][j], matrix.values[j][i]);
                }
            }
            assert_eq!(matrix.values[3][3], None);
            assert_eq!(matrix.get("a", "flat"), None);
        }
    }

    #[test]
    fn test_rank_methods_on_monotonic_data() {
        let spearman = CorrelationMatrix::compute(CorrelationMethod::Spearman, &sample());
        let kendall = CorrelationMatrix::compute(CorrelationMethod::Kendall, &sample());
        assert!((spearman.get("a", "b").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(kendall.get("a", "b"), Some(1.0));
        assert!(CorrelationMatrix::compute(CorrelationMethod::Pearson, &sample())
            .get("a", "b")
            .unwrap()
            > 0.99);
    }

    #[test]
    fn test_nulls_dropped_pairwise() {
        let columns = vec![
            ("x".to_string(), vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]),
            ("y".to_string(), vec![Some(2.0), Some(4.0), Some(100.0), Some(8.0), Some(10.0)]),
        ];
        let matrix = CorrelationMatrix::compute(CorrelationMethod::Pearson, &columns);
        assert!((matrix.get("x", "y").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pairs_sorted_by_strength() {
        let matrix = CorrelationMatrix::compute(CorrelationMethod::Pearson, &sample());
        let pairs = matrix.pairs();
        assert_eq!((pairs[0].left.as_str(), pairs[0].right.as_str()), ("a", "b"));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_ranks_average_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }
}
