//! CLI entry-point for filling the embedding cache.

use anyhow::{Context, Result};
use tracing::{instrument, warn};

use crate::{
    config::Settings,
    data::{cache::JsonlCache, corpus::Corpus, export},
    nlp::embeddings::load_encoder,
    pipeline,
};

#[instrument(skip(settings))]
pub async fn run(settings: Settings) -> Result<()> {
    let corpus = load_labeled(&settings)?;
    if corpus.is_empty() {
        warn!("labeled.jsonl missing or empty; run label first");
        return Ok(());
    }
    let encoder = load_encoder(&settings)?;
    let mut cache = JsonlCache::open(&settings.join_data("cache"), encoder.identity())?;
    pipeline::embed_corpus(corpus, encoder.as_ref(), &mut cache, settings.embed_batch_size)
        .context("embedding corpus")?;
    Ok(())
}

pub fn load_labeled(settings: &Settings) -> Result<Corpus> {
    let documents = export::read_jsonl(&settings.join_data(export::LABELED_FILE))?;
    Ok(Corpus::new(documents))
}
