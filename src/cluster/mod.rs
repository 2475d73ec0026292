//! Dimensionality reduction and centroid clustering over document embeddings.
//!
//! The engine projects embeddings with a [`Reducer`], sweeps `k` with a
//! [`Partitioner`], and keeps the partition chosen by [`KSelection`]. Every
//! random choice is driven by the seed in [`ClusterParams`], so a fixed seed
//! and parameter set reproduce the same clusters.

pub mod kmeans;
pub mod quality;
pub mod umap;

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use kmeans::KMeansPartitioner;
pub use umap::UmapReducer;

/// Minimum number of embedded documents worth clustering.
pub const MIN_POINTS: usize = 3;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// No usable partition exists; clustering is omitted for the run.
    #[error("degenerate clustering: {0}")]
    Degenerate(String),
    #[error("embedding of `{id}` has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid cluster parameters: {0}")]
    InvalidParams(String),
}

/// Rule used to pick `k` from the sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KSelection {
    /// Highest mean silhouette; ties go to the smaller `k`.
    #[default]
    Silhouette,
    /// First `k` after which inertia stops improving by `elbow_threshold`.
    Elbow,
}

impl fmt::Display for KSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silhouette => f.write_str("silhouette"),
            Self::Elbow => f.write_str("elbow"),
        }
    }
}

impl FromStr for KSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silhouette" => Ok(Self::Silhouette),
            "elbow" | "inertia" => Ok(Self::Elbow),
            other => Err(format!("unknown k selection `{other}` (expected silhouette or elbow)")),
        }
    }
}

/// Parameters of one clustering run; recorded verbatim in the run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub seed: u64,
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub n_components: usize,
    pub n_epochs: usize,
    pub learning_rate: f64,
    pub negative_sample_rate: usize,
    pub k_min: usize,
    pub k_max: usize,
    pub selection: KSelection,
    pub elbow_threshold: f64,
    pub silhouette_sample: usize,
    pub kmeans_runs: usize,
    pub kmeans_max_iterations: u64,
    pub kmeans_tolerance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_components: 5,
            n_epochs: 200,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            k_min: 2,
            k_max: 12,
            selection: KSelection::Silhouette,
            elbow_threshold: 0.1,
            silhouette_sample: 2000,
            kmeans_runs: 10,
            kmeans_max_iterations: 300,
            kmeans_tolerance: 1e-4,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.k_min > self.k_max {
            return Err(ClusterError::InvalidParams(format!(
                "k_min {} exceeds k_max {}",
                self.k_min, self.k_max
            )));
        }
        if self.n_components == 0 {
            return Err(ClusterError::InvalidParams("n_components must be positive".into()));
        }
        if !(self.min_dist >= 0.0 && self.spread > 0.0 && self.min_dist <= self.spread) {
            return Err(ClusterError::InvalidParams(format!(
                "min_dist {} must lie in [0, spread {}]",
                self.min_dist, self.spread
            )));
        }
        Ok(())
    }
}

/// Projection of an embedding matrix into a low-dimensional space.
pub trait Reducer {
    fn reduce(&self, data: &Array2<f64>, params: &ClusterParams) -> Result<Array2<f64>, ClusterError>;
}

/// Hard assignment of every row of `data` to one of `k` groups.
///
/// Returning `None` marks `k` as unusable for this data.
pub trait Partitioner {
    fn partition(&self, data: &Array2<f64>, k: usize, params: &ClusterParams) -> Option<Vec<usize>>;
}

/// A group of documents with its centroid in the reduced space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub centroid: Vec<f64>,
    pub member_ids: BTreeSet<String>,
}

/// One `k` tried during the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub k: usize,
    pub silhouette: Option<f64>,
    pub inertia: Option<f64>,
    pub rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub centroid: Vec<f64>,
    pub size: usize,
}

/// Everything needed to reproduce or audit a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRunMetadata {
    pub encoder: String,
    pub params: ClusterParams,
    pub chosen_k: usize,
    pub sweep: Vec<SweepEntry>,
    pub clusters: Vec<ClusterSummary>,
    pub n_points: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful run: clusters plus per-point assignments in input order.
#[derive(Debug, Clone)]
pub struct ClusterRun {
    pub clusters: Vec<Cluster>,
    pub assignments: Vec<(String, usize)>,
    pub metadata: ClusterRunMetadata,
}

impl ClusterRun {
    pub fn cluster_of(&self, id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, cluster)| *cluster)
    }

    /// Document id to cluster, for bulk lookups.
    pub fn assignment_index(&self) -> HashMap<&str, usize> {
        self.assignments
            .iter()
            .map(|(id, cluster)| (id.as_str(), *cluster))
            .collect()
    }
}

/// Reducer plus partitioner, driven by one parameter set.
pub struct ClusterEngine<R, P> {
    reducer: R,
    partitioner: P,
    params: ClusterParams,
}

impl ClusterEngine<UmapReducer, KMeansPartitioner> {
    /// UMAP-style projection followed by k-means.
    pub fn standard(params: ClusterParams) -> Self {
        Self::new(UmapReducer, KMeansPartitioner, params)
    }
}

impl<R: Reducer, P: Partitioner> ClusterEngine<R, P> {
    pub fn new(reducer: R, partitioner: P, params: ClusterParams) -> Self {
        Self {
            reducer,
            partitioner,
            params,
        }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Cluster `points` (document id, embedding). Only documents with an
    /// embedding may be passed in.
    pub fn run(&self, points: &[(String, Vec<f32>)], encoder: &str) -> Result<ClusterRun, ClusterError> {
        self.params.validate()?;
        let n = points.len();
        if n < MIN_POINTS {
            return Err(ClusterError::Degenerate(format!(
                "{n} embedded documents, need at least {MIN_POINTS}"
            )));
        }

        let data = embedding_matrix(points)?;
        let reduced = self.reducer.reduce(&data, &self.params)?;
        debug!(
            rows = reduced.nrows(),
            components = reduced.ncols(),
            "reduced embeddings"
        );

        let k_lo = self.params.k_min.max(2);
        let k_hi = self.params.k_max.min(n - 1);
        if k_lo > k_hi {
            return Err(ClusterError::Degenerate(format!(
                "no k in [{}, {}] is valid for {n} documents",
                self.params.k_min, self.params.k_max
            )));
        }

        let sample = quality::sample_indices(n, self.params.silhouette_sample, self.params.seed);
        let mut sweep = Vec::new();
        let mut accepted: Vec<(usize, Vec<usize>)> = Vec::new();
        for k in k_lo..=k_hi {
            let labels = self
                .partitioner
                .partition(&reduced, k, &self.params)
                .filter(|labels| labels.len() == n && quality::cluster_sizes(labels, k).iter().all(|s| *s > 0));
            match labels {
                Some(labels) => {
                    let silhouette = quality::silhouette(&reduced, &labels, k, &sample);
                    let inertia = quality::inertia(&reduced, &labels, k);
                    debug!(k, silhouette, inertia, "accepted k");
                    sweep.push(SweepEntry {
                        k,
                        silhouette: Some(silhouette),
                        inertia: Some(inertia),
                        rejected: false,
                    });
                    accepted.push((k, labels));
                }
                None => {
                    debug!(k, "rejected k with an empty cluster");
                    sweep.push(SweepEntry {
                        k,
                        silhouette: None,
                        inertia: None,
                        rejected: true,
                    });
                }
            }
        }

        let chosen_k = match self.params.selection {
            KSelection::Silhouette => quality::best_by_silhouette(&sweep),
            KSelection::Elbow => quality::elbow(&sweep, self.params.elbow_threshold),
        }
        .ok_or_else(|| {
            ClusterError::Degenerate(format!(
                "every k in [{k_lo}, {k_hi}] produced an empty cluster"
            ))
        })?;
        let Some((_, labels)) = accepted.into_iter().find(|(k, _)| *k == chosen_k) else {
            return Err(ClusterError::Degenerate(format!("k = {chosen_k} has no partition")));
        };

        let labels = quality::renumber(&labels);
        let centroids = quality::centroids(&reduced, &labels, chosen_k);
        let mut clusters: Vec<Cluster> = (0..chosen_k)
            .map(|id| Cluster {
                id,
                centroid: centroids.row(id).to_vec(),
                member_ids: BTreeSet::new(),
            })
            .collect();
        let assignments: Vec<(String, usize)> = points
            .iter()
            .zip(&labels)
            .map(|((id, _), cluster)| {
                clusters[*cluster].member_ids.insert(id.clone());
                (id.clone(), *cluster)
            })
            .collect();

        let metadata = ClusterRunMetadata {
            encoder: encoder.to_string(),
            params: self.params.clone(),
            chosen_k,
            sweep,
            clusters: clusters
                .iter()
                .map(|c| ClusterSummary {
                    id: c.id,
                    centroid: c.centroid.clone(),
                    size: c.member_ids.len(),
                })
                .collect(),
            n_points: n,
            created_at: Utc::now(),
        };
        let rejected = metadata.sweep.iter().filter(|e| e.rejected).count();
        if rejected > 0 {
            warn!(rejected, "some k values produced empty clusters");
        }
        info!(
            documents = n,
            chosen_k,
            selection = %self.params.selection,
            seed = self.params.seed,
            "clustering finished"
        );
        Ok(ClusterRun {
            clusters,
            assignments,
            metadata,
        })
    }
}

fn embedding_matrix(points: &[(String, Vec<f32>)]) -> Result<Array2<f64>, ClusterError> {
    let dim = points.first().map(|(_, v)| v.len()).unwrap_or_default();
    let mut data = Array2::<f64>::zeros((points.len(), dim));
    for (row, (id, vector)) in points.iter().enumerate() {
        if vector.len() != dim {
            return Err(ClusterError::DimensionMismatch {
                id: id.clone(),
                expected: dim,
                got: vector.len(),
            });
        }
        for (col, value) in vector.iter().enumerate() {
            data[[row, col]] = f64::from(*value);
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well separated blobs in 4 dimensions.
    fn blobs(per_blob: usize) -> Vec<(String, Vec<f32>)> {
        let centres = [[0.0f32, 0.0, 0.0, 0.0], [8.0, 8.0, 0.0, 0.0], [0.0, 8.0, 8.0, 8.0]];
        let mut points = Vec::new();
        for (b, centre) in centres.iter().enumerate() {
            for i in 0..per_blob {
                let jitter = (i as f32 * 0.37).sin() * 0.3;
                let v: Vec<f32> = centre
                    .iter()
                    .enumerate()
                    .map(|(d, c)| c + jitter * if d % 2 == 0 { 1.0 } else { -1.0 })
                    .collect();
                points.push((format!("doc-{b}-{i}"), v));
            }
        }
        points
    }

    fn params() -> ClusterParams {
        ClusterParams {
            n_neighbors: 5,
            n_components: 2,
            n_epochs: 60,
            k_max: 5,
            ..Default::default()
        }
    }

    /// Identity projection so partitioning can be tested in isolation.
    struct Passthrough;

    impl Reducer for Passthrough {
        fn reduce(&self, data: &Array2<f64>, _: &ClusterParams) -> Result<Array2<f64>, ClusterError> {
            Ok(data.clone())
        }
    }

    /// Puts every point in cluster 0, so any k >= 2 leaves empty clusters.
    struct Lumper;

    impl Partitioner for Lumper {
        fn partition(&self, data: &Array2<f64>, _: usize, _: &ClusterParams) -> Option<Vec<usize>> {
            Some(vec![0; data.nrows()])
        }
    }

    #[test]
    fn separated_blobs_are_recovered() {
        let engine = ClusterEngine::new(Passthrough, KMeansPartitioner, params());
        let run = engine.run(&blobs(6), "test").unwrap();
        assert_eq!(run.metadata.chosen_k, 3);
        for cluster in &run.clusters {
            assert_eq!(cluster.member_ids.len(), 6);
            let blob: BTreeSet<_> = cluster
                .member_ids
                .iter()
                .map(|id| id.split('-').nth(1).unwrap().to_string())
                .collect();
            assert_eq!(blob.len(), 1);
        }
        // Renumbered by first member.
        assert_eq!(run.cluster_of("doc-0-0"), Some(0));
        assert_eq!(run.cluster_of("doc-1-0"), Some(1));
        let index = run.assignment_index();
        assert_eq!(index.len(), 18);
        assert!(run
            .assignments
            .iter()
            .all(|(id, cluster)| index.get(id.as_str()) == Some(cluster)));
    }

    #[test]
    fn no_cluster_is_empty() {
        let run = ClusterEngine::standard(params()).run(&blobs(8), "test").unwrap();
        assert!(run.clusters.iter().all(|c| !c.member_ids.is_empty()));
        assert_eq!(
            run.metadata.clusters.iter().map(|c| c.size).sum::<usize>(),
            24
        );
        assert_eq!(run.assignments.len(), 24);
    }

    #[test]
    fn fixed_seed_reproduces_the_run() {
        let points = blobs(7);
        let first = ClusterEngine::standard(params()).run(&points, "test").unwrap();
        let second = ClusterEngine::standard(params()).run(&points, "test").unwrap();
        assert_eq!(first.assignments, second.assignments);
        assert_eq!(first.clusters, second.clusters);
        assert_eq!(first.metadata.sweep, second.metadata.sweep);
    }

    #[test]
    fn empty_partitions_are_rejected_and_degenerate_sweeps_fail() {
        let engine = ClusterEngine::new(Passthrough, Lumper, params());
        match engine.run(&blobs(3), "test") {
            Err(ClusterError::Degenerate(_)) => {}
            other => panic!("expected degenerate clustering, got {other:?}"),
        }
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let points = blobs(1).into_iter().take(2).collect::<Vec<_>>();
        assert!(matches!(
            ClusterEngine::standard(params()).run(&points, "test"),
            Err(ClusterError::Degenerate(_))
        ));
    }

    #[test]
    fn mixed_dimensions_are_refused() {
        let mut points = blobs(2);
        points[3].1.push(1.0);
        assert!(matches!(
            ClusterEngine::standard(params()).run(&points, "test"),
            Err(ClusterError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn selection_names_parse() {
        assert_eq!("Elbow".parse::<KSelection>().unwrap(), KSelection::Elbow);
        assert!("gap".parse::<KSelection>().is_err());
    }
}
