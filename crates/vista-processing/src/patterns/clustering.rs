//! K-means clustering with elbow-based choice of k.

use super::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::pipeline::CancellationToken;
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rows used to fit centroids; the rest are only assigned.
pub const MAX_FIT_ROWS: usize = 5_000;

const MAX_ITERATIONS: usize = 100;
const RESTARTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub feature: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub size: usize,
    pub share: f64,
    /// Centroid in the original units of each feature.
    pub centroid: Vec<FeatureValue>,
    /// Feature whose standardized centroid is furthest from the overall mean.
    pub defining_feature: String,
    /// That feature's standardized offset; positive means above average.
    pub defining_offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub k: usize,
    pub features: Vec<String>,
    /// Within-cluster sum of squares for each candidate k.
    pub inertia_by_k: Vec<(usize, f64)>,
    pub clusters: Vec<ClusterSummary>,
    /// Cluster of each frame row; `None` for rows with missing features.
    #[serde(skip)]
    pub labels: Vec<Option<usize>>,
}

struct Fit {
    centroids: Array2<f64>,
    inertia: f64,
}

pub struct KMeansClusterer {
    pub max_clusters: usize,
    pub seed: u64,
}

impl KMeansClusterer {
    pub fn cluster(&self, matrix: &FeatureMatrix, token: &CancellationToken) -> Result<ClusteringResult> {
        let z = matrix.standardized();
        let fit_rows = stride_sample(&z, MAX_FIT_ROWS);
        let max_k = self.max_clusters.min(fit_rows.nrows().saturating_sub(1));
        if max_k < 2 {
            return Err(PipelineError::Analysis {
                section: "clustering".to_string(),
                reason: format!("{} rows are too few to form clusters", fit_rows.nrows()),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut fits = Vec::new();
        for k in 2..=max_k {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let best = (0..RESTARTS)
                .map(|_| lloyd(&fit_rows, k, &mut rng))
                .min_by(|a, b| a.inertia.total_cmp(&b.inertia))
                .ok_or_else(|| PipelineError::Internal("no k-means restarts".to_string()))?;
            debug!("k={} inertia={:.4}", k, best.inertia);
            fits.push((k, best));
        }

        let inertia_by_k: Vec<(usize, f64)> = fits.iter().map(|(k, f)| (*k, f.inertia)).collect();
        let k = elbow(&inertia_by_k);
        let centroids = fits
            .into_iter()
            .find(|(candidate, _)| *candidate == k)
            .map(|(_, fit)| fit.centroids)
            .ok_or_else(|| PipelineError::Internal(format!("no fit for k={k}")))?;

        let assignments: Vec<usize> = z.outer_iter().map(|row| nearest(&row, &centroids).0).collect();
        let mut labels = vec![None; matrix.frame_rows];
        for (position, &row) in matrix.rows.iter().enumerate() {
            labels[row] = Some(assignments[position]);
        }

        Ok(ClusteringResult {
            k,
            features: matrix.names.clone(),
            inertia_by_k,
            clusters: summarize(matrix, &centroids, &assignments),
            labels,
        })
    }
}

/// Elbow of a decreasing inertia curve: the candidate furthest from the
/// chord joining the first and last points, after scaling both axes to
/// `[0, 1]`. Ties go to the smaller k.
pub fn elbow(curve: &[(usize, f64)]) -> usize {
    let (Some(&(k0, i0)), Some(&(k1, i1))) = (curve.first(), curve.last()) else {
        return 2;
    };
    if curve.len() < 3 || i0 == i1 {
        return k0;
    }
    let span_k = (k1 - k0) as f64;
    let span_i = i0 - i1;
    let mut best = (k0, 0.0);
    for &(k, inertia) in curve {
        let x = (k - k0) as f64 / span_k;
        let y = (i0 - inertia) / span_i;
        // distance from (x, y) to the line y = x, up to a constant factor
        let distance = y - x;
        if distance > best.1 + 1e-12 {
            best = (k, distance);
        }
    }
    best.0
}

fn stride_sample(data: &Array2<f64>, limit: usize) -> Array2<f64> {
    if data.nrows() <= limit {
        return data.clone();
    }
    let stride = data.nrows().div_ceil(limit);
    let picked: Vec<usize> = (0..data.nrows()).step_by(stride).collect();
    data.select(Axis(0), &picked)
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(row: &ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .outer_iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared_distance(row, &centroid)))
        .fold((0, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
}

/// k-means++ seeding.
fn seed_centroids(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut closest: Vec<f64> = data
        .outer_iter()
        .map(|row| squared_distance(&row, &data.row(chosen[0])))
        .collect();
    while chosen.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            closest
                .iter()
                .position(|d| {
                    target -= d;
                    target < 0.0
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        chosen.push(next);
        for (i, row) in data.outer_iter().enumerate() {
            closest[i] = closest[i].min(squared_distance(&row, &data.row(next)));
        }
    }
    data.select(Axis(0), &chosen)
}

fn lloyd(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Fit {
    let mut centroids = seed_centroids(data, k, rng);
    let mut labels = vec![usize::MAX; data.nrows()];
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, row) in data.outer_iter().enumerate() {
            let (c, _) = nearest(&row, &centroids);
            if labels[i] != c {
                labels[i] = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (row, &c) in data.outer_iter().zip(&labels) {
            let mut target = sums.row_mut(c);
            target += &row;
            counts[c] += 1;
        }
        for (c, count) in counts.iter().enumerate() {
            if *count > 0 {
                let mean = &sums.row(c) / *count as f64;
                centroids.row_mut(c).assign(&mean);
            }
        }
    }
    let inertia = data
        .outer_iter()
        .zip(&labels)
        .map(|(row, &c)| squared_distance(&row, &centroids.row(c)))
        .sum();
    Fit { centroids, inertia }
}

fn summarize(matrix: &FeatureMatrix, centroids: &Array2<f64>, assignments: &[usize]) -> Vec<ClusterSummary> {
    let total = assignments.len().max(1);
    centroids
        .outer_iter()
        .enumerate()
        .map(|(id, centroid)| {
            let size = assignments.iter().filter(|&&c| c == id).count();
            let (defining, offset) = centroid
                .iter()
                .enumerate()
                .fold((0, 0.0f64), |best, (f, z)| if z.abs() > best.1.abs() { (f, *z) } else { best });
            ClusterSummary {
                id,
                size,
                share: size as f64 / total as f64,
                centroid: matrix
                    .names
                    .iter()
                    .enumerate()
                    .map(|(f, name)| FeatureValue {
                        feature: name.clone(),
                        value: centroid[f] * matrix.scales[f] + matrix.means[f],
                    })
                    .collect(),
                defining_feature: matrix.names[defining].clone(),
                defining_offset: offset,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blobs() -> FeatureMatrix {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.1;
            for (cx, cy) in [(0.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
                x.push(Some(cx + jitter));
                y.push(Some(cy - jitter));
            }
        }
        FeatureMatrix::from_columns(vec![("x".to_string(), x), ("y".to_string(), y)])
    }

    #[test]
    fn test_finds_three_blobs() {
        let clusterer = KMeansClusterer {
            max_clusters: 8,
            seed: 42,
        };
        let result = clusterer.cluster(&blobs(), &CancellationToken::new()).unwrap();
        assert_eq!(result.k, 3);
        let mut sizes: Vec<usize> = result.clusters.iter().map(|c| c.size).collect();
        sizes.sort();
        assert_eq!(sizes, vec![30, 30, 30]);
        assert_eq!(result.labels.iter().filter(|l| l.is_some()).count(), 90);
    }

    #[test]
    fn test_elbow_prefers_smaller_k_on_ties() {
        assert_eq!(elbow(&[(2, 100.0), (3, 20.0), (4, 15.0), (5, 12.0)]), 3);
        // a straight line has no elbow; every candidate ties at zero
        assert_eq!(elbow(&[(2, 30.0), (3, 20.0), (4, 10.0)]), 2);
        assert_eq!(elbow(&[(2, 5.0)]), 2);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let clusterer = KMeansClusterer {
            max_clusters: 5,
            seed: 7,
        };
        let token = CancellationToken::new();
        let a = clusterer.cluster(&blobs(), &token).unwrap();
        let b = clusterer.cluster(&blobs(), &token).unwrap();
        assert_eq!(a.inertia_by_k, b.inertia_by_k);
        assert_eq!(a.labels, b.labels);
    }
}
