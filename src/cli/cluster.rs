//! CLI entry-point for clustering labeled documents and writing joined records.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{instrument, warn};

use crate::{
    cli::embed::load_labeled,
    cluster::{ClusterEngine, ClusterParams, ClusterRunMetadata, KSelection},
    config::Settings,
    data::{cache::JsonlCache, corpus::Corpus, export},
    nlp::embeddings::load_encoder,
    pipeline::{self, join_all},
};

/// Overrides for the clustering parameters in the environment.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct ClusterArgs {
    /// Random seed for projection, k-means and silhouette sampling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Neighbourhood size of the projection graph.
    #[arg(long)]
    pub n_neighbors: Option<usize>,
    /// Minimum distance between projected points.
    #[arg(long)]
    pub min_dist: Option<f64>,
    /// Dimensions of the projected space.
    #[arg(long)]
    pub n_components: Option<usize>,
    /// Smallest k in the sweep.
    #[arg(long)]
    pub k_min: Option<usize>,
    /// Largest k in the sweep.
    #[arg(long)]
    pub k_max: Option<usize>,
    /// Rule used to pick k (`silhouette` or `elbow`).
    #[arg(long)]
    pub selection: Option<KSelection>,
}

impl ClusterArgs {
    pub fn apply(&self, base: &ClusterParams) -> ClusterParams {
        ClusterParams {
            seed: self.seed.unwrap_or(base.seed),
            n_neighbors: self.n_neighbors.unwrap_or(base.n_neighbors),
            min_dist: self.min_dist.unwrap_or(base.min_dist),
            n_components: self.n_components.unwrap_or(base.n_components),
            k_min: self.k_min.unwrap_or(base.k_min),
            k_max: self.k_max.unwrap_or(base.k_max),
            selection: self.selection.unwrap_or(base.selection),
            ..base.clone()
        }
    }
}

#[instrument(skip(settings))]
pub async fn run(args: ClusterArgs, settings: Settings) -> Result<()> {
    let params = args.apply(&settings.cluster);
    params.validate().context("invalid cluster parameters")?;
    let corpus = load_labeled(&settings)?;
    if corpus.is_empty() {
        warn!("labeled.jsonl missing or empty; run label first");
        return Ok(());
    }
    let encoder = load_encoder(&settings)?;
    let mut cache = JsonlCache::open(&settings.join_data("cache"), encoder.identity())?;
    let (embedded, _) =
        pipeline::embed_corpus(corpus, encoder.as_ref(), &mut cache, settings.embed_batch_size)
            .context("embedding corpus")?;
    let engine = ClusterEngine::standard(params);
    let (clustered, outcome) = pipeline::cluster_corpus(embedded, &engine, encoder.identity())
        .context("clustering corpus")?;
    persist(&settings, &clustered, outcome.map(|run| run.metadata))
}

/// Write joined records and, when clustering succeeded, its metadata.
pub fn persist(
    settings: &Settings,
    corpus: &Corpus,
    metadata: Option<ClusterRunMetadata>,
) -> Result<()> {
    let records = join_all(corpus.documents());
    export::write_records(&settings.outputs_dir, &records)?;
    match metadata {
        Some(metadata) => export::write_cluster_metadata(&settings.outputs_dir, &metadata)?,
        None => export::remove_cluster_metadata(&settings.outputs_dir)?,
    }
    Ok(())
}
