//! Embedding cache keyed by document identity and encoder identity.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("opening embedding cache {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing embedding cache {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialising cache entry")]
    Encode(#[from] serde_json::Error),
}

/// Cache key: a vector is only valid for the encoder that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub doc_id: String,
    pub encoder: String,
}

impl CacheKey {
    pub fn new(doc_id: impl Into<String>, encoder: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            encoder: encoder.into(),
        }
    }
}

/// Key-value store handed to the embedding generator.
pub trait EmbeddingCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<f32>>;
    /// Store a vector; writing the same key twice is allowed and harmless.
    fn put(&mut self, key: CacheKey, vector: Vec<f32>) -> Result<(), CacheError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local cache, used by tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<CacheKey, Vec<f32>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, vector: Vec<f32>) -> Result<(), CacheError> {
        self.entries.insert(key, vector);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Serialize, Deserialize)]
struct CacheLine {
    doc_id: String,
    encoder: String,
    vector: Vec<f32>,
}

/// Append-only JSONL file per encoder; every write is flushed so an aborted
/// run keeps what it computed.
pub struct JsonlCache {
    path: PathBuf,
    entries: HashMap<CacheKey, Vec<f32>>,
    writer: BufWriter<File>,
}

impl JsonlCache {
    /// Open (or create) the cache file for `encoder` inside `dir`.
    pub fn open(dir: &Path, encoder: &str) -> Result<Self, CacheError> {
        let path = dir.join(cache_file_name(encoder));
        std::fs::create_dir_all(dir).map_err(|source| CacheError::Open {
            path: path.clone(),
            source,
        })?;

        let mut entries = HashMap::new();
        let mut needs_newline = false;
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| CacheError::Open {
                path: path.clone(),
                source,
            })?;
            needs_newline = !content.is_empty() && !content.ends_with('\n');
            let mut skipped = 0usize;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                // A torn last line from an aborted write is skipped, not fatal.
                match serde_json::from_str::<CacheLine>(line) {
                    Ok(entry) => {
                        entries.insert(CacheKey::new(entry.doc_id, entry.encoder), entry.vector);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "ignored unreadable cache lines");
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CacheError::Open {
                path: path.clone(),
                source,
            })?;
        let mut writer = BufWriter::new(file);
        if needs_newline {
            let write_err = |source| CacheError::Write {
                path: path.clone(),
                source,
            };
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        info!(path = %path.display(), entries = entries.len(), "opened embedding cache");
        Ok(Self {
            path,
            entries,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EmbeddingCache for JsonlCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, vector: Vec<f32>) -> Result<(), CacheError> {
        let line = serde_json::to_string(&CacheLine {
            doc_id: key.doc_id.clone(),
            encoder: key.encoder.clone(),
            vector: vector.clone(),
        })?;
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        self.writer.write_all(line.as_bytes()).map_err(write_err)?;
        self.writer.write_all(b"\n").map_err(write_err)?;
        self.writer.flush().map_err(write_err)?;
        self.entries.insert(key, vector);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Stable file name for an encoder identity (which may contain `/` or `:`).
fn cache_file_name(encoder: &str) -> String {
    let digest = Sha256::digest(encoder.as_bytes());
    format!("embeddings-{}.jsonl", &hex::encode(digest)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_encoder() {
        let mut cache = MemoryCache::new();
        cache
            .put(CacheKey::new("doc-1", "hashing-v1:8"), vec![1.0, 0.0])
            .unwrap();
        assert!(cache.get(&CacheKey::new("doc-1", "hashing-v1:8")).is_some());
        assert!(cache.get(&CacheKey::new("doc-1", "fastembed:x")).is_none());
    }

    #[test]
    fn jsonl_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = JsonlCache::open(dir.path(), "enc/a:1").unwrap();
            cache.put(CacheKey::new("a", "enc/a:1"), vec![0.5, 0.25]).unwrap();
            cache.put(CacheKey::new("a", "enc/a:1"), vec![0.75, 0.25]).unwrap();
            cache.put(CacheKey::new("b", "enc/a:1"), vec![1.0, 0.0]).unwrap();
        }
        let reopened = JsonlCache::open(dir.path(), "enc/a:1").unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get(&CacheKey::new("a", "enc/a:1")),
            Some(vec![0.75, 0.25])
        );
    }

    #[test]
    fn torn_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut cache = JsonlCache::open(dir.path(), "enc").unwrap();
            cache.put(CacheKey::new("a", "enc"), vec![1.0]).unwrap();
            cache.path().to_path_buf()
        };
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"doc_id\":\"b\",\"enc").unwrap();
        let mut reopened = JsonlCache::open(dir.path(), "enc").unwrap();
        assert_eq!(reopened.len(), 1);
        reopened.put(CacheKey::new("c", "enc"), vec![2.0]).unwrap();
        drop(reopened);
        let again = JsonlCache::open(dir.path(), "enc").unwrap();
        assert_eq!(again.len(), 2);
    }
}
