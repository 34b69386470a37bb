//! Evaluation metrics shared by every backend.

use crate::config::ProblemType;
use crate::types::Metrics;
use std::collections::BTreeSet;

/// Coefficient of determination. A constant target scores 0.0 unless the
/// predictions are exact.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Fraction of exact label matches.
pub fn accuracy_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(y, p)| (*y - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// The score used for model comparison and permutation importance.
pub fn primary_score(task: ProblemType, y_true: &[f64], y_pred: &[f64]) -> f64 {
    match task {
        ProblemType::Regression => r2_score(y_true, y_pred),
        _ => accuracy_score(y_true, y_pred),
    }
}

/// Build the full metric set for one fitted model.
///
/// `positive_scores` are class-1 probabilities on the validation split and
/// only apply to binary classification.
pub fn evaluate(
    task: ProblemType,
    y_train: &[f64],
    pred_train: &[f64],
    y_test: &[f64],
    pred_test: &[f64],
    positive_scores: Option<&[f64]>,
) -> Metrics {
    let mut metrics = Metrics {
        train_score: Some(primary_score(task, y_train, pred_train)),
        test_score: Some(primary_score(task, y_test, pred_test)),
        ..Metrics::default()
    };

    match task {
        ProblemType::Regression => {
            let n = y_test.len().max(1) as f64;
            let mse = y_test
                .iter()
                .zip(pred_test)
                .map(|(y, p)| (y - p).powi(2))
                .sum::<f64>()
                / n;
            let mae = y_test
                .iter()
                .zip(pred_test)
                .map(|(y, p)| (y - p).abs())
                .sum::<f64>()
                / n;
            metrics.mse = Some(mse);
            metrics.rmse = Some(mse.sqrt());
            metrics.mae = Some(mae);
            metrics.r2 = metrics.test_score;
        }
        _ => {
            let (precision, recall, f1) = weighted_prf(y_test, pred_test);
            metrics.accuracy = metrics.test_score;
            metrics.precision = Some(precision);
            metrics.recall = Some(recall);
            metrics.f1_score = Some(f1);
            metrics.roc_auc = positive_scores.and_then(|scores| roc_auc(y_test, scores));
        }
    }
    metrics
}

/// Support-weighted precision, recall and F1 over the classes in `y_true`.
fn weighted_prf(y_true: &[f64], y_pred: &[f64]) -> (f64, f64, f64) {
    let classes: BTreeSet<i64> = y_true.iter().map(|v| *v as i64).collect();
    let total = y_true.len() as f64;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for class in classes {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (y, p) in y_true.iter().zip(y_pred) {
            let (y, p) = (*y as i64, p.round() as i64);
            match (y == class, p == class) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                _ => {}
            }
        }
        let support = tp + fn_;
        let p = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let r = if support > 0.0 { tp / support } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        let weight = support / total;
        precision += p * weight;
        recall += r * weight;
        f1 += f * weight;
    }
    (precision, recall, f1)
}

/// Rank-based ROC AUC (Mann-Whitney U) with average ranks for ties.
/// `None` when only one class is present.
pub fn roc_auc(y_true: &[f64], scores: &[f64]) -> Option<f64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }

    let positives = y_true.iter().filter(|y| **y >= 0.5).count() as f64;
    let negatives = y_true.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return None;
    }
    let rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y >= 0.5)
        .map(|(_, r)| r)
        .sum();
    Some((rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_r2_perfect_and_mean() {
        let y = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert!((r2_score(&y, &[2.5, 2.5, 2.5, 2.5])).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy_score(&[0.0, 1.0, 1.0, 0.0], &[0.0, 1.0, 0.0, 0.0]), 0.75);
    }

    #[test]
    fn test_roc_auc_perfect_separation() {
        let auc = roc_auc(&[0.0, 0.0, 1.0, 1.0], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!((auc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class_is_none() {
        assert!(roc_auc(&[1.0, 1.0], &[0.3, 0.4]).is_none());
    }

    #[test]
    fn test_regression_metrics_keys() {
        let metrics = evaluate(
            ProblemType::Regression,
            &[1.0, 2.0],
            &[1.0, 2.0],
            &[3.0, 5.0],
            &[2.0, 5.0],
            None,
        );
        assert_eq!(metrics.mse, Some(0.5));
        assert_eq!(metrics.mae, Some(0.5));
        assert!(metrics.accuracy.is_none());
        assert_eq!(metrics.r2, metrics.test_score);
    }

    #[test]
    fn test_classification_metrics_keys() {
        let metrics = evaluate(
            ProblemType::Classification,
            &[0.0, 1.0],
            &[0.0, 1.0],
            &[0.0, 1.0, 1.0, 0.0],
            &[0.0, 1.0, 1.0, 1.0],
            Some(&[0.2, 0.9, 0.7, 0.6]),
        );
        assert_eq!(metrics.accuracy, Some(0.75));
        assert!(metrics.f1_score.is_some());
        assert_eq!(metrics.roc_auc, Some(1.0));
        assert!(metrics.rmse.is_none());
    }
}
