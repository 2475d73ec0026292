//! CLI entry-point for the full pipeline: label, embed, cluster, join.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use crate::{
    cli::{cluster::{persist, ClusterArgs}, label::load_lexicon},
    cluster::ClusterEngine,
    config::Settings,
    data::{cache::JsonlCache, corpus, export},
    nlp::{embeddings::load_encoder, heuristics::RuleSet},
    pipeline::Pipeline,
};

/// Args for the `run` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Directory of per-query JSONL files (defaults to `<DATA_DIR>/raw`).
    #[arg(long)]
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let params = args.cluster.apply(&settings.cluster);
    params.validate().context("invalid cluster parameters")?;
    let input = args.input.clone().unwrap_or_else(|| settings.join_data("raw"));
    let (corpus, _) = corpus::load_corpus(&input)
        .with_context(|| format!("loading corpus from {}", input.display()))?;
    if corpus.is_empty() {
        warn!(path = %input.display(), "no documents to process");
        return Ok(());
    }

    let lexicon = load_lexicon(&settings)?;
    let encoder = load_encoder(&settings)?;
    let engine = ClusterEngine::standard(params);
    let mut cache = JsonlCache::open(&settings.join_data("cache"), encoder.identity())?;

    let pipeline = Pipeline {
        lexicon: &lexicon,
        rules: RuleSet::builtin(),
        encoder: encoder.as_ref(),
        engine: &engine,
        batch_size: settings.embed_batch_size,
    };
    let output = pipeline.run(corpus, &mut cache).context("running pipeline")?;

    export::write_jsonl(&settings.join_data(export::LABELED_FILE), output.corpus.documents())?;
    persist(&settings, &output.corpus, output.cluster.map(|run| run.metadata))?;
    info!(
        records = output.records.len(),
        degraded = output.degradations.total(),
        "run complete"
    );
    Ok(())
}
