//! Neighbourhood-graph projection in the style of UMAP.
//!
//! Steps: exact k-nearest neighbours, per-point bandwidth calibration, fuzzy
//! union of the directed graph, then stochastic layout optimisation with
//! negative sampling. All randomness comes from one `StdRng` seeded with
//! [`ClusterParams::seed`].

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use super::{ClusterError, ClusterParams, Reducer};

const BANDWIDTH_ITERATIONS: usize = 64;
const BANDWIDTH_TOLERANCE: f64 = 1e-5;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct UmapReducer;

impl Reducer for UmapReducer {
    fn reduce(&self, data: &Array2<f64>, params: &ClusterParams) -> Result<Array2<f64>, ClusterError> {
        let n = data.nrows();
        let dim = params.n_components;
        if n < 3 {
            return Ok(Array2::zeros((n, dim)));
        }
        let k = params.n_neighbors.clamp(2, n - 1);
        let neighbours = nearest_neighbours(data, k);
        let graph = fuzzy_graph(&neighbours, k);
        let (a, b) = fit_curve(params.spread, params.min_dist);
        Ok(optimise_layout(n, &graph, a, b, params))
    }
}

fn distance(data: &Array2<f64>, i: usize, j: usize) -> f64 {
    data.row(i)
        .iter()
        .zip(data.row(j).iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `k` nearest neighbours of every row, ties broken by index.
fn nearest_neighbours(data: &Array2<f64>, k: usize) -> Vec<Vec<(usize, f64)>> {
    let n = data.nrows();
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<(usize, f64)> = (0..n)
                .filter(|j| *j != i)
                .map(|j| (j, distance(data, i, j)))
                .collect();
            row.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            row.truncate(k);
            row
        })
        .collect()
}

/// Distance to the nearest distinct neighbour and the bandwidth that makes
/// the neighbour weights sum to `log2(k)`.
fn calibrate(row: &[(usize, f64)], k: usize) -> (f64, f64) {
    let rho = row
        .iter()
        .map(|(_, d)| *d)
        .find(|d| *d > 0.0)
        .unwrap_or(0.0);
    let target = (k as f64).log2();
    let (mut lo, mut hi, mut sigma) = (0.0, f64::INFINITY, 1.0);
    for _ in 0..BANDWIDTH_ITERATIONS {
        let total: f64 = row
            .iter()
            .map(|(_, d)| (-(d - rho).max(0.0) / sigma).exp())
            .sum();
        if (total - target).abs() < BANDWIDTH_TOLERANCE {
            break;
        }
        if total > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_finite() { (lo + hi) / 2.0 } else { sigma * 2.0 };
        }
    }
    let mean = row.iter().map(|(_, d)| *d).sum::<f64>() / row.len().max(1) as f64;
    (rho, sigma.max(1e-3 * mean).max(f64::EPSILON))
}

/// Symmetric edge list `(i, j, weight)` with `i < j`, sorted.
fn fuzzy_graph(neighbours: &[Vec<(usize, f64)>], k: usize) -> Vec<(usize, usize, f64)> {
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, row) in neighbours.iter().enumerate() {
        let (rho, sigma) = calibrate(row, k);
        for (j, d) in row {
            let weight = (-(d - rho).max(0.0) / sigma).exp();
            directed.insert((i, *j), weight);
        }
    }
    let mut merged: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        if merged.contains_key(&(lo, hi)) {
            continue;
        }
        let reverse = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let weight = w + reverse - w * reverse;
        if weight > 0.0 {
            merged.insert((lo, hi), weight);
        }
    }
    merged.into_iter().map(|((i, j), w)| (i, j, w)).collect()
}

/// Fit `1 / (1 + a d^(2b))` to the target membership curve by grid search.
pub fn fit_curve(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (1..=300).map(|i| i as f64 * spread * 3.0 / 300.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|x| {
            if *x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();
    let error = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(x, y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
            .sum()
    };

    let mut best = (1.0, 1.0, f64::INFINITY);
    for ai in 1..=100 {
        for bi in 0..=85 {
            let (a, b) = (ai as f64 * 0.05, 0.3 + bi as f64 * 0.02);
            let e = error(a, b);
            if e < best.2 {
                best = (a, b, e);
            }
        }
    }
    // Refine around the coarse optimum.
    let (a0, b0) = (best.0, best.1);
    for ai in -25..=25 {
        for bi in -10..=10 {
            let (a, b) = (a0 + ai as f64 * 0.002, b0 + bi as f64 * 0.002);
            if a <= 0.0 || b <= 0.0 {
                continue;
            }
            let e = error(a, b);
            if e < best.2 {
                best = (a, b, e);
            }
        }
    }
    (best.0, best.1)
}

fn clip(value: f64) -> f64 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn squared_distance(embedding: &Array2<f64>, i: usize, j: usize) -> f64 {
    embedding
        .row(i)
        .iter()
        .zip(embedding.row(j).iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}

fn optimise_layout(
    n: usize,
    graph: &[(usize, usize, f64)],
    a: f64,
    b: f64,
    params: &ClusterParams,
) -> Array2<f64> {
    let dim = params.n_components;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut embedding =
        Array2::from_shape_fn((n, dim), |_| rng.gen_range(-INIT_RANGE..INIT_RANGE));
    if graph.is_empty() || params.n_epochs == 0 {
        return embedding;
    }

    let max_weight = graph.iter().map(|e| e.2).fold(0.0, f64::max);
    let epochs_per_sample: Vec<f64> = graph.iter().map(|e| max_weight / e.2).collect();
    let mut next_sample = epochs_per_sample.clone();
    let n_epochs = params.n_epochs as f64;

    for epoch in 0..params.n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f64 / n_epochs);
        let clock = (epoch + 1) as f64;
        for (edge, &(i, j, _)) in graph.iter().enumerate() {
            if next_sample[edge] > clock {
                continue;
            }

            let d2 = squared_distance(&embedding, i, j);
            if d2 > 0.0 {
                let coefficient = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
                for d in 0..dim {
                    let grad = clip(coefficient * (embedding[[i, d]] - embedding[[j, d]]));
                    embedding[[i, d]] += grad * alpha;
                    embedding[[j, d]] -= grad * alpha;
                }
            }
            next_sample[edge] += epochs_per_sample[edge];

            for _ in 0..params.negative_sample_rate {
                let other = rng.gen_range(0..n);
                if other == i {
                    continue;
                }
                let d2 = squared_distance(&embedding, i, other);
                let coefficient = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let grad = if coefficient > 0.0 {
                        clip(coefficient * (embedding[[i, d]] - embedding[[other, d]]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[[i, d]] += grad * alpha;
                }
            }
        }
    }
    embedding
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Array2<f64> {
        Array2::from_shape_fn((20, 6), |(i, d)| {
            let base = if i < 10 { 0.0 } else { 5.0 };
            base + ((i * 7 + d * 3) % 5) as f64 * 0.05
        })
    }

    fn params() -> ClusterParams {
        ClusterParams {
            n_neighbors: 5,
            n_components: 2,
            n_epochs: 100,
            ..Default::default()
        }
    }

    #[test]
    fn curve_fit_matches_reference_values() {
        let (a, b) = fit_curve(1.0, 0.1);
        // umap-learn gives a ~ 1.58, b ~ 0.90 for these inputs.
        assert!((a - 1.58).abs() < 0.15, "a = {a}");
        assert!((b - 0.90).abs() < 0.06, "b = {b}");
    }

    #[test]
    fn projection_is_seeded() {
        let data = two_groups();
        let first = UmapReducer.reduce(&data, &params()).unwrap();
        let second = UmapReducer.reduce(&data, &params()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dim(), (20, 2));
        assert!(first.iter().all(|v| v.is_finite()));

        let other_seed = ClusterParams { seed: 7, ..params() };
        assert_ne!(UmapReducer.reduce(&data, &other_seed).unwrap(), first);
    }

    #[test]
    fn groups_stay_closer_to_themselves() {
        let projected = UmapReducer.reduce(&two_groups(), &params()).unwrap();
        let (mut within, mut n_within, mut across, mut n_across) = (0.0, 0, 0.0, 0);
        for i in 0..20 {
            for j in (i + 1)..20 {
                let d = squared_distance(&projected, i, j).sqrt();
                if (i < 10) == (j < 10) {
                    within += d;
                    n_within += 1;
                } else {
                    across += d;
                    n_across += 1;
                }
            }
        }
        assert!(within / (n_within as f64) < across / (n_across as f64));
    }

    #[test]
    fn tiny_inputs_collapse_to_origin() {
        let data = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = UmapReducer.reduce(&data, &params()).unwrap();
        assert_eq!(out, Array2::<f64>::zeros((2, 2)));
    }

    #[test]
    fn fuzzy_graph_is_symmetric_and_bounded() {
        let data = two_groups();
        let graph = fuzzy_graph(&nearest_neighbours(&data, 4), 4);
        assert!(graph.iter().all(|(i, j, w)| i < j && *w > 0.0 && *w <= 1.0));
    }
}
