//! Persisted artefacts: labeled documents, joined records and cluster metadata.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, ParquetWriter, SerWriter, Series};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::{cluster::ClusterRunMetadata, pipeline::JoinedRecord};

pub const LABELED_FILE: &str = "clean/labeled.jsonl";
pub const RECORDS_JSONL: &str = "records.jsonl";
pub const RECORDS_CSV: &str = "records.csv";
pub const RECORDS_PARQUET: &str = "records.parquet";
pub const CLUSTER_RUN_FILE: &str = "cluster_run.json";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = items.len(), "wrote jsonl");
    Ok(())
}

/// Read a JSONL artefact; a missing file yields no rows.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        warn!(path = %path.display(), "artefact missing");
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid row", path.display(), idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn records_frame(records: &[JoinedRecord]) -> Result<DataFrame> {
    let joined = |values: &[String]| values.join(";");
    let df = DataFrame::new(vec![
        Series::new(
            "id".into(),
            records.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "title".into(),
            records.iter().map(|r| r.title.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "year".into(),
            records.iter().map(|r| r.year).collect::<Vec<_>>(),
        ),
        Series::new(
            "query_id".into(),
            records.iter().map(|r| r.query_id.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "paradigm".into(),
            records.iter().map(|r| r.paradigm.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "paradigm_confidence".into(),
            records.iter().map(|r| r.paradigm_confidence).collect::<Vec<_>>(),
        ),
        Series::new(
            "paradigm_sources".into(),
            records
                .iter()
                .map(|r| joined(&r.paradigm_sources))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "lifecycle_phase".into(),
            records
                .iter()
                .map(|r| r.lifecycle_phase.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "lifecycle_phase_confidence".into(),
            records
                .iter()
                .map(|r| r.lifecycle_phase_confidence)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "lifecycle_phase_sources".into(),
            records
                .iter()
                .map(|r| joined(&r.lifecycle_phase_sources))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "application_context".into(),
            records
                .iter()
                .map(|r| r.application_context.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "application_context_confidence".into(),
            records
                .iter()
                .map(|r| r.application_context_confidence)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "application_context_sources".into(),
            records
                .iter()
                .map(|r| joined(&r.application_context_sources))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "cluster_id".into(),
            records
                .iter()
                .map(|r| r.cluster_id.map(|c| c as i64))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "has_embedding".into(),
            records.iter().map(|r| r.has_embedding).collect::<Vec<_>>(),
        ),
        Series::new(
            "methods".into(),
            records
                .iter()
                .map(|r| joined(&r.methods))
                .collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// Write joined records as JSONL, CSV and Parquet under `dir`.
pub fn write_records(dir: &Path, records: &[JoinedRecord]) -> Result<()> {
    write_jsonl(&dir.join(RECORDS_JSONL), records)?;
    if records.is_empty() {
        warn!("no records; skipping tabular exports");
        return Ok(());
    }

    let mut df = records_frame(records)?;
    let csv_path = dir.join(RECORDS_CSV);
    let mut file = File::create(&csv_path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    info!(path = %csv_path.display(), rows = df.height(), "wrote records csv");

    let parquet_path = dir.join(RECORDS_PARQUET);
    let file = File::create(&parquet_path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    info!(path = %parquet_path.display(), rows = df.height(), "wrote records parquet");
    Ok(())
}

pub fn read_records(dir: &Path) -> Result<Vec<JoinedRecord>> {
    read_jsonl(&dir.join(RECORDS_JSONL))
}

pub fn write_cluster_metadata(dir: &Path, metadata: &ClusterRunMetadata) -> Result<()> {
    let path = dir.join(CLUSTER_RUN_FILE);
    ensure_parent(&path)?;
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), metadata)?;
    info!(path = %path.display(), k = metadata.chosen_k, "wrote cluster metadata");
    Ok(())
}

pub fn read_cluster_metadata(dir: &Path) -> Result<Option<ClusterRunMetadata>> {
    let path = dir.join(CLUSTER_RUN_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let metadata = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(metadata))
}

/// Drop a stale metadata file when a run produced no clustering.
pub fn remove_cluster_metadata(dir: &Path) -> Result<()> {
    let path = dir.join(CLUSTER_RUN_FILE);
    if path.exists() {
        std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}
