//! k-means partitioning through linfa.

use linfa::{
    traits::{Fit, Predict},
    DatasetBase,
};
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

use super::{ClusterParams, Partitioner};

/// Seeded k-means with several restarts; the best-inertia restart wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KMeansPartitioner;

impl Partitioner for KMeansPartitioner {
    fn partition(&self, data: &Array2<f64>, k: usize, params: &ClusterParams) -> Option<Vec<usize>> {
        if k == 0 || k > data.nrows() {
            return None;
        }
        let rng = StdRng::seed_from_u64(params.seed.wrapping_add(k as u64));
        let dataset = DatasetBase::from(data.clone());
        let model = match KMeans::params_with_rng(k, rng)
            .n_runs(params.kmeans_runs.max(1))
            .max_n_iterations(params.kmeans_max_iterations)
            .tolerance(params.kmeans_tolerance)
            .fit(&dataset)
        {
            Ok(model) => model,
            Err(err) => {
                debug!(k, error = %err, "k-means fit failed");
                return None;
            }
        };
        let labels: Array1<usize> = model.predict(data);
        Some(labels.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn two_groups_split_cleanly() {
        let data = array![[0.0, 0.0], [0.2, 0.1], [9.0, 9.0], [9.1, 8.9], [0.1, 0.2]];
        let labels = KMeansPartitioner
            .partition(&data, 2, &ClusterParams::default())
            .unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn k_larger_than_data_is_unusable() {
        let data = array![[0.0], [1.0]];
        assert!(KMeansPartitioner
            .partition(&data, 3, &ClusterParams::default())
            .is_none());
    }
}
