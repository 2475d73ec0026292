//! Shared DTOs for JSON responses.

use serde::Serialize;

use crate::cluster::{ClusterParams, ClusterSummary, SweepEntry};

#[derive(Debug, Clone, Serialize)]
pub struct RecordPage<T> {
    pub total: usize,
    pub records: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClustersDto {
    pub encoder: String,
    pub chosen_k: usize,
    pub n_points: usize,
    pub params: ClusterParams,
    pub sweep: Vec<SweepEntry>,
    pub clusters: Vec<ClusterSummary>,
}
