//! CLI entry-point for rule-based labeling and method extraction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use crate::{
    config::Settings,
    data::{corpus, export},
    nlp::{heuristics::RuleSet, lexicon::Lexicon},
    pipeline::Labeler,
};

/// Args for the `label` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Directory of per-query JSONL files (defaults to `<DATA_DIR>/raw`).
    #[arg(long)]
    pub input: Option<PathBuf>,
}

pub fn load_lexicon(settings: &Settings) -> Result<Lexicon> {
    Lexicon::load(settings.dictionary_dir.as_deref()).context("loading dictionaries")
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let input = args.input.unwrap_or_else(|| settings.join_data("raw"));
    let (corpus, report) = corpus::load_corpus(&input)
        .with_context(|| format!("loading corpus from {}", input.display()))?;
    if corpus.is_empty() {
        warn!(path = %input.display(), "no documents to label");
        return Ok(());
    }
    info!(
        documents = corpus.len(),
        duplicates_removed = report.duplicates_removed,
        "corpus ready"
    );

    let lexicon = load_lexicon(&settings)?;
    let labeled = Labeler::new(&lexicon, RuleSet::builtin()).label_corpus(corpus);
    export::write_jsonl(&settings.join_data(export::LABELED_FILE), labeled.documents())?;
    Ok(())
}
