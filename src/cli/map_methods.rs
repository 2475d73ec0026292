//! CLI entry-point for mapping extracted methods onto an ML-method vocabulary.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::{instrument, warn};

use crate::{config::Settings, data::export, ontology};

/// Args for the `map-methods` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// CSV with `ml_method` (URI) and `label` columns.
    #[arg(long)]
    pub vocabulary: PathBuf,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let records = export::read_records(&settings.outputs_dir)?;
    if records.is_empty() {
        warn!("records.jsonl missing or empty; run cluster or run first");
        return Ok(());
    }
    let vocabulary = ontology::Vocabulary::from_csv(&args.vocabulary)?;
    let report = ontology::map_methods(
        records.iter().flat_map(|r| r.methods.iter().map(String::as_str)),
        &vocabulary,
    );
    ontology::write_report(&settings.outputs_dir, &report)
}
