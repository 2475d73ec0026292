//! Partition quality metrics and `k` selection rules.

use ndarray::{Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index, SeedableRng};

use super::SweepEntry;

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

pub fn cluster_sizes(labels: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0; k];
    for label in labels {
        if let Some(size) = sizes.get_mut(*label) {
            *size += 1;
        }
    }
    sizes
}

/// Sorted indices of at most `max` points, drawn with `seed`.
pub fn sample_indices(n: usize, max: usize, seed: u64) -> Vec<usize> {
    if max == 0 || n <= max {
        return (0..n).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, n, max).into_vec();
    picked.sort_unstable();
    picked
}

/// Mean silhouette of the `sample` points, measured against the whole data set.
///
/// Points alone in their cluster score 0.
pub fn silhouette(data: &Array2<f64>, labels: &[usize], k: usize, sample: &[usize]) -> f64 {
    if k < 2 || sample.is_empty() {
        return 0.0;
    }
    let sizes = cluster_sizes(labels, k);
    let total: f64 = sample
        .iter()
        .map(|&i| {
            let own = labels[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let mut sums = vec![0.0; k];
            for (j, &label) in labels.iter().enumerate() {
                if j != i {
                    sums[label] += euclidean(data.row(i), data.row(j));
                }
            }
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|c| *c != own && sizes[*c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);
            if !b.is_finite() {
                return 0.0;
            }
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();
    total / sample.len() as f64
}

/// Member mean per cluster, one row per label.
pub fn centroids(data: &Array2<f64>, labels: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let sizes = cluster_sizes(labels, k);
    for (row, &label) in labels.iter().enumerate() {
        let mut target = sums.row_mut(label);
        target += &data.row(row);
    }
    for (label, size) in sizes.iter().enumerate() {
        if *size > 0 {
            sums.row_mut(label).mapv_inplace(|v| v / *size as f64);
        }
    }
    sums
}

/// Sum of squared distances to the assigned centroid.
pub fn inertia(data: &Array2<f64>, labels: &[usize], k: usize) -> f64 {
    let centres = centroids(data, labels, k);
    labels
        .iter()
        .enumerate()
        .map(|(row, &label)| euclidean(data.row(row), centres.row(label)).powi(2))
        .sum()
}

/// Relabel clusters 0.. in order of their first member.
pub fn renumber(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|label| match mapping.iter().find(|(old, _)| old == label) {
            Some((_, new)) => *new,
            None => {
                let new = mapping.len();
                mapping.push((*label, new));
                new
            }
        })
        .collect()
}

pub fn best_by_silhouette(sweep: &[SweepEntry]) -> Option<usize> {
    sweep
        .iter()
        .filter(|e| !e.rejected)
        .filter_map(|e| e.silhouette.map(|s| (e.k, s)))
        .fold(None, |best: Option<(usize, f64)>, (k, s)| match best {
            Some((_, best_s)) if best_s >= s => best,
            _ => Some((k, s)),
        })
        .map(|(k, _)| k)
}

/// First accepted `k` whose successor improves inertia by less than
/// `threshold` (relative). Falls back to the largest accepted `k`.
pub fn elbow(sweep: &[SweepEntry], threshold: f64) -> Option<usize> {
    let accepted: Vec<(usize, f64)> = sweep
        .iter()
        .filter(|e| !e.rejected)
        .filter_map(|e| e.inertia.map(|i| (e.k, i)))
        .collect();
    for pair in accepted.windows(2) {
        let (k, current) = pair[0];
        let (_, next) = pair[1];
        let gain = if current > 0.0 {
            (current - next) / current
        } else {
            0.0
        };
        if gain < threshold {
            return Some(k);
        }
    }
    accepted.last().map(|(k, _)| *k)
}
