//! Flattens an enriched document into the record handed to consumers.

use serde::{Deserialize, Serialize};

use crate::{
    data::corpus::Document,
    nlp::labels::{Dimension, LabelResult},
};

/// One row per document. Unclassified dimensions are `null` with confidence 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub query_id: Option<String>,
    pub paradigm: Option<String>,
    pub paradigm_confidence: f64,
    pub paradigm_sources: Vec<String>,
    pub lifecycle_phase: Option<String>,
    pub lifecycle_phase_confidence: f64,
    pub lifecycle_phase_sources: Vec<String>,
    pub application_context: Option<String>,
    pub application_context_confidence: f64,
    pub application_context_sources: Vec<String>,
    pub cluster_id: Option<usize>,
    pub has_embedding: bool,
    pub methods: Vec<String>,
}

impl JoinedRecord {
    pub fn label(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Paradigm => self.paradigm.as_deref(),
            Dimension::LifecyclePhase => self.lifecycle_phase.as_deref(),
            Dimension::ApplicationContext => self.application_context.as_deref(),
        }
    }
}

fn parts(result: &LabelResult) -> (Option<String>, f64, Vec<String>) {
    (
        result.label().map(str::to_string),
        result.confidence,
        result.sources.iter().map(ToString::to_string).collect(),
    )
}

/// Pure combination of what the stages already computed.
pub fn join(doc: &Document) -> JoinedRecord {
    let (paradigm, paradigm_confidence, paradigm_sources) = parts(&doc.label(Dimension::Paradigm));
    let (lifecycle_phase, lifecycle_phase_confidence, lifecycle_phase_sources) =
        parts(&doc.label(Dimension::LifecyclePhase));
    let (application_context, application_context_confidence, application_context_sources) =
        parts(&doc.label(Dimension::ApplicationContext));
    JoinedRecord {
        id: doc.id.clone(),
        title: doc.title.clone(),
        year: doc.year,
        query_id: doc.query_id.clone(),
        paradigm,
        paradigm_confidence,
        paradigm_sources,
        lifecycle_phase,
        lifecycle_phase_confidence,
        lifecycle_phase_sources,
        application_context,
        application_context_confidence,
        application_context_sources,
        // A cluster without an embedding cannot be real.
        cluster_id: doc.embedding.as_ref().and(doc.cluster_id),
        has_embedding: doc.embedding.is_some(),
        methods: doc.extracted_methods.iter().cloned().collect(),
    }
}

pub fn join_all(documents: &[Document]) -> Vec<JoinedRecord> {
    documents.iter().map(join).collect()
}
