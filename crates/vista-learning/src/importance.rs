//! Feature importance: native folding and permutation fallback.

use crate::backend::Predictor;
use crate::config::ProblemType;
use crate::dataset::FeatureGroup;
use crate::metrics::primary_score;
use crate::types::FeatureImportance;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Sum per-encoded-column importances into their source columns.
pub fn fold_groups(per_column: &[f64], groups: &[FeatureGroup]) -> Vec<f64> {
    groups
        .iter()
        .map(|g| g.columns.iter().map(|&c| per_column.get(c).copied().unwrap_or(0.0)).sum())
        .collect()
}

/// Mean drop in validation score when a group's columns are shuffled
/// together, clamped at zero. One-hot columns move as a unit so a row never
/// ends up with two active levels.
pub fn permutation_importance(
    model: &dyn Predictor,
    x: &Array2<f64>,
    y: &[f64],
    groups: &[FeatureGroup],
    task: ProblemType,
    repeats: usize,
    seed: u64,
) -> Vec<f64> {
    let baseline = primary_score(task, y, &model.predict(x));
    let mut rng = StdRng::seed_from_u64(seed);
    let n = x.nrows();

    groups
        .iter()
        .map(|group| {
            let mut total_drop = 0.0;
            for _ in 0..repeats {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                let mut shuffled = x.clone();
                for &col in &group.columns {
                    for (row, &src) in order.iter().enumerate() {
                        shuffled[[row, col]] = x[[src, col]];
                    }
                }
                let score = primary_score(task, y, &model.predict(&shuffled));
                total_drop += baseline - score;
            }
            (total_drop / repeats.max(1) as f64).max(0.0)
        })
        .collect()
}

/// Normalize to sum 1.0 (when anything is positive) and sort descending,
/// breaking ties by name.
pub fn rank(groups: &[FeatureGroup], values: &[f64]) -> Vec<FeatureImportance> {
    let total: f64 = values.iter().filter(|v| v.is_finite()).sum();
    let mut ranked: Vec<FeatureImportance> = groups
        .iter()
        .zip(values)
        .map(|(group, value)| FeatureImportance {
            feature: group.name.clone(),
            importance: if total > 0.0 && value.is_finite() {
                value / total
            } else {
                0.0
            },
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstColumn;

    impl Predictor for FirstColumn {
        fn predict(&self, x: &Array2<f64>) -> Vec<f64> {
            x.column(0).to_vec()
        }
    }

    fn groups() -> Vec<FeatureGroup> {
        vec![
            FeatureGroup {
                name: "signal".to_string(),
                columns: vec![0],
            },
            FeatureGroup {
                name: "noise".to_string(),
                columns: vec![1, 2],
            },
        ]
    }

    #[test]
    fn test_fold_groups() {
        assert_eq!(fold_groups(&[0.5, 0.2, 0.3], &groups()), vec![0.5, 0.5]);
    }

    #[test]
    fn test_permutation_importance_finds_signal() {
        let n = 40;
        let x = Array2::from_shape_fn((n, 3), |(r, c)| match c {
            0 => r as f64,
            _ => ((r * 7 + c) % 5) as f64,
        });
        let y: Vec<f64> = (0..n).map(|r| r as f64).collect();

        let values =
            permutation_importance(&FirstColumn, &x, &y, &groups(), ProblemType::Regression, 3, 42);
        assert!(values[0] > 0.5);
        assert_eq!(values[1], 0.0);
    }

    #[test]
    fn test_rank_normalizes_and_sorts() {
        let ranked = rank(&groups(), &[1.0, 3.0]);
        assert_eq!(ranked[0].feature, "noise");
        assert!((ranked[0].importance - 0.75).abs() < 1e-12);
        assert!((ranked.iter().map(|f| f.importance).sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
