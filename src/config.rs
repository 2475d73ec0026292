//! Runtime configuration utilities for ml-lifecycle-mapper.

use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use serde::Deserialize;

use crate::cluster::{ClusterParams, KSelection};

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root folder for raw corpus files, intermediate artefacts and caches.
    pub data_dir: PathBuf,
    /// Root folder for joined records and run metadata.
    pub outputs_dir: PathBuf,
    /// Folder holding `<dimension>.txt` and `methods.txt`; built-ins when unset.
    pub dictionary_dir: Option<PathBuf>,
    /// Encoder backend name (`hashing` or `fastembed`).
    pub encoder: String,
    /// Output width of the hashing encoder.
    pub hashing_dim: usize,
    /// Documents per encoder call.
    pub embed_batch_size: usize,
    /// Reducer and partitioner parameters recorded with every run.
    pub cluster: ClusterParams,
}

impl Settings {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let outputs_dir = env::var("OUTPUTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./outputs"));
        let dictionary_dir = env::var("DICTIONARY_DIR").ok().map(PathBuf::from);
        let encoder = env::var("ENCODER").unwrap_or_else(|_| "hashing".to_string());

        let defaults = ClusterParams::default();
        let k_selection = match env::var("K_SELECTION") {
            Ok(raw) => KSelection::from_str(&raw)
                .map_err(|err| anyhow::anyhow!(err))
                .context("parsing K_SELECTION")?,
            Err(_) => defaults.selection,
        };
        let cluster = ClusterParams {
            seed: env_or("CLUSTER_SEED", defaults.seed),
            n_neighbors: env_or("UMAP_N_NEIGHBORS", defaults.n_neighbors),
            min_dist: env_or("UMAP_MIN_DIST", defaults.min_dist),
            n_components: env_or("UMAP_N_COMPONENTS", defaults.n_components),
            n_epochs: env_or("UMAP_N_EPOCHS", defaults.n_epochs),
            k_min: env_or("K_MIN", defaults.k_min),
            k_max: env_or("K_MAX", defaults.k_max),
            selection: k_selection,
            silhouette_sample: env_or("SILHOUETTE_SAMPLE", defaults.silhouette_sample),
            ..defaults
        };

        std::fs::create_dir_all(&data_dir).context("creating data dir")?;
        std::fs::create_dir_all(&outputs_dir).context("creating outputs dir")?;

        Ok(Self {
            data_dir,
            outputs_dir,
            dictionary_dir,
            encoder,
            hashing_dim: env_or("HASHING_DIM", 256),
            embed_batch_size: env_or("EMBED_BATCH_SIZE", 64),
            cluster,
        })
    }

    /// Settings rooted at an explicit directory, used by tests and embedding callers.
    pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            outputs_dir: root.join("outputs"),
            dictionary_dir: None,
            encoder: "hashing".to_string(),
            hashing_dim: 256,
            embed_batch_size: 64,
            cluster: ClusterParams::default(),
        }
    }

    /// Convenience helper for derived path segments.
    pub fn join_data<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.data_dir.join(path)
    }

    /// Convenience helper for derived output path segments.
    pub fn join_output<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.outputs_dir.join(path)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
