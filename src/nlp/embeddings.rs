//! Embedding generation: encoder backends, batching and cache reuse.

use anyhow::Result;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

#[cfg(feature = "embeddings")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::{
    config::Settings,
    data::{
        cache::{CacheError, CacheKey, EmbeddingCache},
        corpus::Document,
    },
};

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder received empty text")]
    EmptyInput,
    #[error("encoder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("encoder backend failed: {0}")]
    Backend(String),
}

/// Batch text encoder treated as an opaque capability.
pub trait Encoder: Send + Sync {
    /// Identity used in cache keys; must change whenever outputs would.
    fn identity(&self) -> &str;
    fn dimension(&self) -> usize;
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Signed feature hashing of unigrams and bigrams, L2-normalised.
///
/// Needs no model download and is fully deterministic, which makes it the
/// default backend and the reference encoder in tests.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    identity: String,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(2);
        Self {
            dimension,
            identity: format!("hashing-v2:{dimension}"),
        }
    }

    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(EncoderError::EmptyInput);
        }
        let mut vector = vec![0f32; self.dimension];
        let mut add = |feature: &str| {
            let hash = feature_hash(feature);
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        };
        for token in &tokens {
            add(token);
        }
        for pair in tokens.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]));
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

impl Encoder for HashingEncoder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        texts.iter().map(|t| self.encode_one(t)).collect()
    }
}

/// First eight bytes of the SHA-256 digest, big-endian.
fn feature_hash(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    digest[..8]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// MiniLM sentence embeddings through fastembed.
#[cfg(feature = "embeddings")]
pub struct FastEmbedEncoder {
    model: std::sync::Mutex<TextEmbedding>,
    identity: String,
    dimension: usize,
}

#[cfg(feature = "embeddings")]
impl FastEmbedEncoder {
    pub fn try_new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
            identity: "fastembed:all-minilm-l6-v2".to_string(),
            dimension: 384,
        })
    }
}

#[cfg(feature = "embeddings")]
impl Encoder for FastEmbedEncoder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EncoderError::EmptyInput);
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| EncoderError::Backend("encoder mutex poisoned".to_string()))?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|err| EncoderError::Backend(err.to_string()))
    }
}

/// Build the encoder named in settings; an unknown or unavailable backend is fatal.
pub fn load_encoder(settings: &Settings) -> Result<Box<dyn Encoder>> {
    match settings.encoder.as_str() {
        "hashing" => Ok(Box::new(HashingEncoder::new(settings.hashing_dim))),
        #[cfg(feature = "embeddings")]
        "fastembed" => Ok(Box::new(FastEmbedEncoder::try_new()?)),
        #[cfg(not(feature = "embeddings"))]
        "fastembed" => anyhow::bail!("encoder `fastembed` requires the `embeddings` feature"),
        other => anyhow::bail!("unknown encoder `{other}` (expected `hashing` or `fastembed`)"),
    }
}

/// Counters reported at the end of the embedding stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EmbeddingStats {
    pub requested: usize,
    pub cache_hits: usize,
    pub encoded: usize,
    pub missing_text: usize,
    pub encoding_failures: usize,
}

/// Batches documents through an encoder and an explicit cache.
pub struct EmbeddingGenerator<'a, C: EmbeddingCache + ?Sized> {
    encoder: &'a dyn Encoder,
    cache: &'a mut C,
    batch_size: usize,
}

impl<'a, C: EmbeddingCache + ?Sized> EmbeddingGenerator<'a, C> {
    pub fn new(encoder: &'a dyn Encoder, cache: &'a mut C, batch_size: usize) -> Self {
        Self {
            encoder,
            cache,
            batch_size: batch_size.max(1),
        }
    }

    /// Attach embeddings to `documents`. Per-document failures leave the
    /// embedding absent; only cache write failures abort.
    pub fn embed(
        &mut self,
        documents: Vec<Document>,
    ) -> Result<(Vec<Document>, EmbeddingStats), CacheError> {
        let encoder_id = self.encoder.identity().to_string();
        let dimension = self.encoder.dimension();
        let mut stats = EmbeddingStats {
            requested: documents.len(),
            ..Default::default()
        };
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; documents.len()];
        let mut pending = Vec::new();

        for (idx, doc) in documents.iter().enumerate() {
            if doc.normalized_text.is_empty() {
                stats.missing_text += 1;
                debug!(doc_id = %doc.id, "missing text; embedding absent");
                continue;
            }
            let key = CacheKey::new(doc.id.as_str(), encoder_id.as_str());
            match self.cache.get(&key).and_then(|v| valid_vector(v, dimension)) {
                Some(vector) => {
                    stats.cache_hits += 1;
                    vectors[idx] = Some(vector);
                }
                _ => pending.push(idx),
            }
        }

        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk
                .iter()
                .map(|idx| documents[*idx].normalized_text.as_str())
                .collect();
            let outcomes: Vec<Option<Vec<f32>>> = match self.encoder.encode_batch(&texts) {
                Ok(batch) if batch.len() == texts.len() => batch
                    .into_iter()
                    .map(|v| valid_vector(v, dimension))
                    .collect(),
                Ok(batch) => {
                    debug!(expected = texts.len(), got = batch.len(), "batch size mismatch; retrying singly");
                    self.encode_singly(&texts, dimension)
                }
                Err(err) => {
                    debug!(error = %err, size = texts.len(), "batch failed; retrying singly");
                    self.encode_singly(&texts, dimension)
                }
            };

            for (idx, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Some(vector) => {
                        let key = CacheKey::new(documents[*idx].id.as_str(), encoder_id.as_str());
                        self.cache.put(key, vector.clone())?;
                        stats.encoded += 1;
                        vectors[*idx] = Some(vector);
                    }
                    None => {
                        stats.encoding_failures += 1;
                        debug!(doc_id = %documents[*idx].id, "encoding failed; embedding absent");
                    }
                }
            }
        }

        info!(
            encoder = %encoder_id,
            requested = stats.requested,
            cache_hits = stats.cache_hits,
            encoded = stats.encoded,
            missing_text = stats.missing_text,
            encoding_failures = stats.encoding_failures,
            "embedding stage finished"
        );

        let documents = documents
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| doc.with_embedding(vector))
            .collect();
        Ok((documents, stats))
    }

    fn encode_singly(&self, texts: &[&str], dimension: usize) -> Vec<Option<Vec<f32>>> {
        texts
            .iter()
            .map(|text| match self.encoder.encode_batch(&[text]) {
                Ok(mut batch) if batch.len() == 1 => batch.pop().and_then(|v| valid_vector(v, dimension)),
                _ => None,
            })
            .collect()
    }
}

fn valid_vector(vector: Vec<f32>, dimension: usize) -> Option<Vec<f32>> {
    (vector.len() == dimension && vector.iter().all(|v| v.is_finite())).then_some(vector)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::data::cache::MemoryCache;

    /// Fails any batch containing the word `poison`.
    struct PickyEncoder {
        inner: HashingEncoder,
        calls: AtomicUsize,
    }

    impl Encoder for PickyEncoder {
        fn identity(&self) -> &str {
            "picky"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(EncoderError::Backend("rejected".into()));
            }
            self.inner.encode_batch(texts)
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", "Random forests for tool wear."),
            Document::new("b", ""),
            Document::new("c", "A poison pill abstract."),
            Document::new("d", "Clustering of customer reviews."),
        ]
    }

    #[test]
    fn hashing_encoder_is_deterministic_and_normalised() {
        let encoder = HashingEncoder::new(32);
        let a = encoder.encode_batch(&["neural network model"]).unwrap();
        let b = encoder.encode_batch(&["neural network model"]).unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(matches!(
            encoder.encode_batch(&[""]),
            Err(EncoderError::EmptyInput)
        ));
    }

    #[test]
    fn failures_are_isolated_per_document() {
        let encoder = PickyEncoder {
            inner: HashingEncoder::new(16),
            calls: AtomicUsize::new(0),
        };
        let mut cache = MemoryCache::new();
        let (out, stats) = EmbeddingGenerator::new(&encoder, &mut cache, 8)
            .embed(docs())
            .unwrap();
        assert!(out[0].embedding.is_some());
        assert!(out[1].embedding.is_none());
        assert!(out[2].embedding.is_none());
        assert!(out[3].embedding.is_some());
        assert_eq!(stats.missing_text, 1);
        assert_eq!(stats.encoding_failures, 1);
        assert_eq!(stats.encoded, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn second_run_is_served_from_cache() {
        let encoder = PickyEncoder {
            inner: HashingEncoder::new(16),
            calls: AtomicUsize::new(0),
        };
        let mut cache = MemoryCache::new();
        let (first, _) = EmbeddingGenerator::new(&encoder, &mut cache, 2)
            .embed(docs())
            .unwrap();
        let calls_after_first = encoder.calls.load(Ordering::SeqCst);

        let (second, stats) = EmbeddingGenerator::new(&encoder, &mut cache, 2)
            .embed(docs())
            .unwrap();
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.encoded, 0);
        // Only the poisoned document is retried.
        assert_eq!(encoder.calls.load(Ordering::SeqCst), calls_after_first + 2);
        assert_eq!(first[0].embedding, second[0].embedding);
    }

    #[test]
    fn non_finite_cached_vectors_are_re_encoded() {
        let encoder = HashingEncoder::new(16);
        let mut cache = MemoryCache::new();
        let mut poisoned = vec![0.0f32; 16];
        poisoned[3] = f32::NAN;
        cache
            .put(CacheKey::new("a", encoder.identity()), poisoned)
            .unwrap();

        let docs = vec![Document::new("a", "Neural networks for tool wear.")];
        let (out, stats) = EmbeddingGenerator::new(&encoder, &mut cache, 4)
            .embed(docs)
            .unwrap();
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.encoded, 1);
        let vector = out[0].embedding.as_ref().unwrap();
        assert!(vector.iter().all(|v| v.is_finite()));
        let cached = cache.get(&CacheKey::new("a", encoder.identity())).unwrap();
        assert_eq!(&cached, vector);
    }

    #[test]
    fn feature_hash_is_stable() {
        assert_eq!(feature_hash("neural"), feature_hash("neural"));
        assert_ne!(feature_hash("neural"), feature_hash("network"));
    }
}
