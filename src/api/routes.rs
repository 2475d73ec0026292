//! HTTP route handlers for Axum.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    api::types::{ClustersDto, RecordPage},
    config::Settings,
    data::export,
    nlp::labels::Dimension,
    pipeline::JoinedRecord,
};

use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

const PAGE_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub paradigm: Option<String>,
    pub phase: Option<String>,
    pub context: Option<String>,
    pub cluster: Option<usize>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    fn matches(&self, record: &JoinedRecord) -> bool {
        let label_ok = |dimension: Dimension, wanted: &Option<String>| match wanted {
            None => true,
            Some(w) if w.eq_ignore_ascii_case("unclassified") => record.label(dimension).is_none(),
            Some(w) => record
                .label(dimension)
                .is_some_and(|label| label.eq_ignore_ascii_case(w)),
        };
        label_ok(Dimension::Paradigm, &self.paradigm)
            && label_ok(Dimension::LifecyclePhase, &self.phase)
            && label_ok(Dimension::ApplicationContext, &self.context)
            && self.cluster.map_or(true, |c| record.cluster_id == Some(c))
    }
}

pub async fn list_records(
    states: State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<RecordPage<JoinedRecord>> {
    let mut records = load_records(&states.settings)?;
    records.retain(|r| query.matches(r));
    let total = records.len();
    records.truncate(query.limit.unwrap_or(PAGE_LIMIT).min(PAGE_LIMIT));
    Ok(Json(RecordPage { total, records }))
}

pub async fn get_record(
    Path(id): Path<String>,
    states: State<AppState>,
) -> ApiResult<JoinedRecord> {
    load_records(&states.settings)?
        .into_iter()
        .find(|r| r.id == id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("record `{id}` not found")))
}

pub async fn list_clusters(states: State<AppState>) -> ApiResult<ClustersDto> {
    let metadata = export::read_cluster_metadata(&states.settings.outputs_dir)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| {
            warn!("cluster_run.json missing; run cluster first");
            (StatusCode::NOT_FOUND, "no clustering available".to_string())
        })?;
    Ok(Json(ClustersDto {
        encoder: metadata.encoder,
        chosen_k: metadata.chosen_k,
        n_points: metadata.n_points,
        params: metadata.params,
        sweep: metadata.sweep,
        clusters: metadata.clusters,
    }))
}

fn load_records(settings: &Settings) -> Result<Vec<JoinedRecord>, (StatusCode, String)> {
    export::read_records(&settings.outputs_dir)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
