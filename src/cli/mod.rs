//! Command-line interface wiring for ml-lifecycle-mapper.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

pub mod cluster;
pub mod embed;
pub mod label;
pub mod map_methods;
pub mod run;
pub mod serve;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Label and cluster ML-in-product-development abstracts",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Label(args) => label::run(args, settings).await,
            Commands::Embed => embed::run(settings).await,
            Commands::Cluster(args) => cluster::run(args, settings).await,
            Commands::Run(args) => run::run(args, settings).await,
            Commands::MapMethods(args) => map_methods::run(args, settings).await,
            Commands::Serve(args) => serve::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply dictionaries and cue rules, resolve labels, extract methods.
    Label(label::Args),
    /// Embed labeled documents into the on-disk cache.
    Embed,
    /// Project, cluster and write joined records.
    Cluster(cluster::ClusterArgs),
    /// Label, embed, cluster and export in one pass.
    Run(run::Args),
    /// Map extracted methods onto an ML-method vocabulary.
    MapMethods(map_methods::Args),
    /// Serve joined records and cluster metadata as JSON.
    Serve(serve::Args),
}
