//! Pipeline stages: rule labeling, embedding, clustering and the final join.
//!
//! Data only moves forward. Each stage takes documents by value and returns
//! enriched copies; none of them drops a document.

pub mod joiner;

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cluster::{ClusterEngine, ClusterError, ClusterRun, Partitioner, Reducer},
    data::{
        cache::{CacheError, EmbeddingCache},
        corpus::{Corpus, Document},
    },
    nlp::{
        embeddings::{EmbeddingGenerator, EmbeddingStats, Encoder},
        heuristics::RuleSet,
        labels::{Dimension, LabelResult, Signal, SourceKind},
        lexicon::Lexicon,
        normalize::normalize,
        weak::Aggregator,
    },
};

pub use joiner::{join, join_all, JoinedRecord};

/// Per-document or per-run condition that lowers output quality without failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    MissingText,
    EncodingFailure,
    DegenerateClustering,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DegradationCounts {
    pub missing_text: usize,
    pub encoding_failure: usize,
    pub degenerate_clustering: usize,
}

impl DegradationCounts {
    pub fn record(&mut self, degradation: Degradation) {
        match degradation {
            Degradation::MissingText => self.missing_text += 1,
            Degradation::EncodingFailure => self.encoding_failure += 1,
            Degradation::DegenerateClustering => self.degenerate_clustering += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_text + self.encoding_failure + self.degenerate_clustering
    }
}

/// Rule-based labeling: dictionary hits, cue rules and author keywords,
/// aggregated per dimension, plus method extraction.
pub struct Labeler<'a> {
    lexicon: &'a Lexicon,
    rules: &'a RuleSet,
    aggregator: Aggregator,
}

impl<'a> Labeler<'a> {
    pub fn new(lexicon: &'a Lexicon, rules: &'a RuleSet) -> Self {
        Self {
            lexicon,
            rules,
            aggregator: Aggregator::from_lexicon(lexicon),
        }
    }

    /// Every raw vote for `doc`, across all dimensions.
    pub fn signals(&self, doc: &Document) -> Vec<Signal> {
        if doc.normalized_text.is_empty() {
            return Vec::new();
        }
        let keywords: Vec<_> = doc.author_keywords.iter().map(|k| normalize(k)).collect();
        let mut signals = Vec::new();
        for dimension in Dimension::ALL {
            let Some(dictionary) = self.lexicon.dimension(dimension) else {
                continue;
            };
            for (label, hit) in dictionary.match_text(&doc.normalized_text).iter() {
                signals.push(Signal::new(dimension, label, SourceKind::Dictionary, &hit.surface));
            }
            for keyword in &keywords {
                for (label, hit) in dictionary.match_text(keyword).iter() {
                    signals.push(Signal::new(
                        dimension,
                        label,
                        SourceKind::AuthorKeyword,
                        &hit.surface,
                    ));
                }
            }
        }
        signals.extend(self.rules.signals(&doc.normalized_text));
        signals
    }

    pub fn label_document(&self, doc: Document) -> Document {
        if doc.normalized_text.is_empty() {
            debug!(doc_id = %doc.id, "missing text; all dimensions unclassified");
        }
        let signals = self.signals(&doc);
        let labels = Dimension::ALL
            .iter()
            .map(|dimension| (*dimension, self.aggregator.resolve(*dimension, &signals)))
            .collect();
        let extracted_methods: BTreeSet<String> = self
            .lexicon
            .methods()
            .match_text(&doc.normalized_text)
            .canonical_terms();
        Document {
            labels,
            extracted_methods,
            ..doc
        }
    }

    /// Label every document in parallel; output order equals input order.
    pub fn label_corpus(&self, corpus: Corpus) -> Corpus {
        let documents: Vec<Document> = corpus
            .into_documents()
            .into_par_iter()
            .map(|doc| self.label_document(doc))
            .collect();
        let classified = |dimension: Dimension| {
            documents
                .iter()
                .filter(|d| d.labels.get(&dimension).is_some_and(LabelResult::is_classified))
                .count()
        };
        info!(
            documents = documents.len(),
            paradigm = classified(Dimension::Paradigm),
            lifecycle_phase = classified(Dimension::LifecyclePhase),
            application_context = classified(Dimension::ApplicationContext),
            with_methods = documents.iter().filter(|d| !d.extracted_methods.is_empty()).count(),
            "rule labeling finished"
        );
        Corpus::new(documents)
    }
}

/// Attach embeddings, reusing `cache` wherever possible.
pub fn embed_corpus<C: EmbeddingCache + ?Sized>(
    corpus: Corpus,
    encoder: &dyn Encoder,
    cache: &mut C,
    batch_size: usize,
) -> Result<(Corpus, EmbeddingStats), CacheError> {
    let (documents, stats) =
        EmbeddingGenerator::new(encoder, cache, batch_size).embed(corpus.into_documents())?;
    Ok((Corpus::new(documents), stats))
}

/// Cluster the embedded documents.
///
/// A degenerate input leaves every document unclustered and yields `None`.
/// Any other clustering error is returned to the caller.
pub fn cluster_corpus<R: Reducer, P: Partitioner>(
    corpus: Corpus,
    engine: &ClusterEngine<R, P>,
    encoder_id: &str,
) -> Result<(Corpus, Option<ClusterRun>), ClusterError> {
    let points: Vec<(String, Vec<f32>)> = corpus
        .iter()
        .filter_map(|d| d.embedding.as_ref().map(|e| (d.id.clone(), e.clone())))
        .collect();
    let skipped = corpus.len() - points.len();
    if skipped > 0 {
        debug!(skipped, "documents without embedding excluded from clustering");
    }

    match engine.run(&points, encoder_id) {
        Ok(run) => {
            let index = run.assignment_index();
            let documents = corpus
                .into_documents()
                .into_iter()
                .map(|doc| {
                    let cluster = doc
                        .embedding
                        .as_ref()
                        .and_then(|_| index.get(doc.id.as_str()).copied());
                    doc.with_cluster(cluster)
                })
                .collect();
            Ok((Corpus::new(documents), Some(run)))
        }
        Err(ClusterError::Degenerate(reason)) => {
            warn!(%reason, "clustering omitted for this run");
            let documents = corpus
                .into_documents()
                .into_iter()
                .map(|doc| doc.with_cluster(None))
                .collect();
            Ok((Corpus::new(documents), None))
        }
        Err(err) => Err(err),
    }
}

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("clustering failed")]
    Cluster(#[from] ClusterError),
}

/// Result of a complete run. `cluster` is `None` when clustering was degenerate.
pub struct PipelineOutput {
    pub corpus: Corpus,
    pub records: Vec<JoinedRecord>,
    pub embedding: EmbeddingStats,
    pub degradations: DegradationCounts,
    pub cluster: Option<ClusterRun>,
}

/// Everything needed for a full run.
pub struct Pipeline<'a, R, P> {
    pub lexicon: &'a Lexicon,
    pub rules: &'a RuleSet,
    pub encoder: &'a dyn Encoder,
    pub engine: &'a ClusterEngine<R, P>,
    pub batch_size: usize,
}

impl<R: Reducer, P: Partitioner> Pipeline<'_, R, P> {
    /// Label, embed, cluster and join.
    ///
    /// Invalid cluster parameters are rejected before any document is
    /// touched. Cache write failures and non-degenerate clustering errors
    /// abort; everything else is counted as a degradation.
    pub fn run<C: EmbeddingCache + ?Sized>(
        &self,
        corpus: Corpus,
        cache: &mut C,
    ) -> Result<PipelineOutput, PipelineError> {
        self.engine.params().validate()?;
        let labeled = Labeler::new(self.lexicon, self.rules).label_corpus(corpus);
        let (embedded, embedding) = embed_corpus(labeled, self.encoder, cache, self.batch_size)?;
        let (clustered, cluster) = cluster_corpus(embedded, self.engine, self.encoder.identity())?;

        let mut degradations = DegradationCounts::default();
        for _ in 0..embedding.missing_text {
            degradations.record(Degradation::MissingText);
        }
        for _ in 0..embedding.encoding_failures {
            degradations.record(Degradation::EncodingFailure);
        }
        if cluster.is_none() {
            degradations.record(Degradation::DegenerateClustering);
        }

        let records = join_all(clustered.documents());
        info!(
            records = records.len(),
            clustered = records.iter().filter(|r| r.cluster_id.is_some()).count(),
            missing_text = degradations.missing_text,
            encoding_failures = degradations.encoding_failure,
            degenerate_clustering = degradations.degenerate_clustering,
            "pipeline finished"
        );
        Ok(PipelineOutput {
            corpus: clustered,
            records,
            embedding,
            degradations,
            cluster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::ClusterParams,
        data::cache::MemoryCache,
        nlp::embeddings::HashingEncoder,
    };

    fn lexicon() -> Lexicon {
        Lexicon::builtin().unwrap()
    }

    #[test]
    fn dictionary_cue_and_keyword_sources_corroborate() {
        let lexicon = lexicon();
        let labeler = Labeler::new(&lexicon, RuleSet::builtin());
        let mut doc = Document::new(
            "d",
            "A supervised learning model trained on labeled data for defect detection.",
        );
        doc.author_keywords = vec!["Supervised Learning".into(), "quality control".into()];
        let doc = labeler.label_document(doc);

        let paradigm = doc.label(Dimension::Paradigm);
        assert_eq!(paradigm.label(), Some("supervised"));
        assert_eq!(paradigm.confidence, 0.875);
        let context = doc.label(Dimension::ApplicationContext);
        assert_eq!(context.label(), Some("quality_assurance"));
    }

    #[test]
    fn labeling_is_parallel_but_order_preserving() {
        let lexicon = lexicon();
        let labeler = Labeler::new(&lexicon, RuleSet::builtin());
        let corpus: Corpus = (0..50)
            .map(|i| Document::new(format!("doc-{i:02}"), "reinforcement learning for assembly"))
            .collect();
        let labeled = labeler.label_corpus(corpus);
        let ids: Vec<_> = labeled.iter().map(|d| d.id.clone()).collect();
        let expected: Vec<_> = (0..50).map(|i| format!("doc-{i:02}")).collect();
        assert_eq!(ids, expected);
        assert!(labeled
            .iter()
            .all(|d| d.label(Dimension::Paradigm).label() == Some("reinforcement")));
    }

    #[test]
    fn documents_without_embedding_never_get_a_cluster() {
        let lexicon = lexicon();
        let encoder = HashingEncoder::new(32);
        let engine = ClusterEngine::standard(ClusterParams {
            n_neighbors: 3,
            n_components: 2,
            n_epochs: 30,
            k_max: 3,
            ..Default::default()
        });
        let mut docs: Vec<Document> = [
            "neural network for product design",
            "neural network for product design review",
            "supply chain demand forecasting",
            "supply chain demand forecasting with lstm",
            "predictive maintenance of machine tools",
            "predictive maintenance of cutting tools",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(format!("d{i}"), *text))
        .collect();
        docs.push(Document::new("empty", "   "));

        let pipeline = Pipeline {
            lexicon: &lexicon,
            rules: RuleSet::builtin(),
            encoder: &encoder,
            engine: &engine,
            batch_size: 4,
        };
        let out = pipeline
            .run(Corpus::new(docs), &mut MemoryCache::new())
            .unwrap();
        assert!(out.cluster.is_some());
        assert_eq!(out.degradations.missing_text, 1);
        let empty = out.records.iter().find(|r| r.id == "empty").unwrap();
        assert!(!empty.has_embedding);
        assert_eq!(empty.cluster_id, None);
        assert!(out
            .records
            .iter()
            .filter(|r| r.id != "empty")
            .all(|r| r.cluster_id.is_some()));
    }

    #[test]
    fn degenerate_clustering_leaves_records_unclustered() {
        let lexicon = lexicon();
        let encoder = HashingEncoder::new(16);
        let engine = ClusterEngine::standard(ClusterParams::default());
        let pipeline = Pipeline {
            lexicon: &lexicon,
            rules: RuleSet::builtin(),
            encoder: &encoder,
            engine: &engine,
            batch_size: 8,
        };
        let corpus = Corpus::new(vec![
            Document::new("a", "unsupervised clustering of reviews"),
            Document::new("b", "reinforcement learning for scheduling"),
        ]);
        let out = pipeline.run(corpus, &mut MemoryCache::new()).unwrap();
        assert!(out.cluster.is_none());
        assert_eq!(out.degradations.degenerate_clustering, 1);
        assert!(out.records.iter().all(|r| r.cluster_id.is_none()));
        assert!(out.records.iter().all(|r| r.has_embedding));
    }

    #[test]
    fn invalid_cluster_parameters_abort_before_labeling() {
        let lexicon = lexicon();
        let encoder = HashingEncoder::new(16);
        let engine = ClusterEngine::standard(ClusterParams {
            k_min: 6,
            k_max: 3,
            ..Default::default()
        });
        let pipeline = Pipeline {
            lexicon: &lexicon,
            rules: RuleSet::builtin(),
            encoder: &encoder,
            engine: &engine,
            batch_size: 8,
        };
        let corpus: Corpus = (0..6)
            .map(|i| Document::new(format!("d{i}"), "supervised learning for design"))
            .collect();
        let mut cache = MemoryCache::new();
        let err = pipeline.run(corpus, &mut cache).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Cluster(ClusterError::InvalidParams(_))
        ));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn dimension_mismatch_is_an_error_not_a_degradation() {
        let engine = ClusterEngine::standard(ClusterParams::default());
        let corpus = Corpus::new(vec![
            Document::new("a", "x").with_embedding(Some(vec![1.0, 0.0])),
            Document::new("b", "y").with_embedding(Some(vec![0.0, 1.0])),
            Document::new("c", "z").with_embedding(Some(vec![1.0, 1.0, 0.0])),
        ]);
        assert!(matches!(
            cluster_corpus(corpus, &engine, "test"),
            Err(ClusterError::DimensionMismatch { .. })
        ));
    }
}
