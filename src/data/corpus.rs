//! Corpus model and loader for retrieval output (one JSONL file per query).

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::nlp::{
    labels::{Dimension, LabelResult},
    normalize::{normalize, Normalized},
};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("reading corpus file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walking corpus directory {path}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One abstract and everything derived from it.
///
/// `id` never changes after construction; the other derived fields are
/// filled in by pipeline stages and may be recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub raw_text: String,
    pub normalized_text: Normalized,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub author_keywords: Vec<String>,
    /// Lives in the embedding cache, not in labeled artefacts.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub labels: BTreeMap<Dimension, LabelResult>,
    #[serde(default)]
    pub cluster_id: Option<usize>,
    #[serde(default)]
    pub extracted_methods: BTreeSet<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            id: id.into(),
            normalized_text: normalize(&raw_text),
            raw_text,
            title: None,
            year: None,
            query_id: None,
            author_keywords: Vec::new(),
            embedding: None,
            labels: BTreeMap::new(),
            cluster_id: None,
            extracted_methods: BTreeSet::new(),
        }
    }

    pub fn with_embedding(self, embedding: Option<Vec<f32>>) -> Self {
        Self { embedding, ..self }
    }

    pub fn with_cluster(self, cluster_id: Option<usize>) -> Self {
        Self { cluster_id, ..self }
    }

    /// Resolved label for `dimension`; unlabeled dimensions read as unclassified.
    pub fn label(&self, dimension: Dimension) -> LabelResult {
        self.labels.get(&dimension).cloned().unwrap_or_default()
    }
}

/// Ordered documents of one run. Order is retrieval order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl FromIterator<Document> for Corpus {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// What the loader dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub files: usize,
    pub records: usize,
    pub missing_identity: usize,
    /// Lines that were not a valid record.
    pub skipped_malformed: usize,
    pub duplicates_removed: usize,
    /// Distinct document ids per query before deduplication.
    pub query_sizes: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    doi: Option<String>,
    eid: Option<String>,
    id: Option<Value>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_: Option<Value>,
    description: Option<String>,
    authkeywords: Option<Value>,
    #[serde(rename = "coverDate")]
    cover_date: Option<String>,
    year: Option<Value>,
    query_id: Option<String>,
}

/// Lowercase a DOI and strip resolver prefixes so the same work matches
/// across queries.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lowered.strip_prefix(prefix))
        .unwrap_or(&lowered)
        .trim();
    (!stripped.is_empty()).then(|| stripped.to_string())
}

/// Abstracts arrive as a string, a list of paragraphs or an object with a text field.
fn abstract_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(abstract_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        Value::Object(map) => ["text", "value", "#text", "content"]
            .iter()
            .find_map(|key| map.get(*key).and_then(abstract_text)),
        _ => None,
    }
}

fn keywords(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(s) => s.split('|').map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn year_of(record: &RawRecord) -> Option<i32> {
    let explicit = match &record.year {
        Some(Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    explicit.or_else(|| {
        record
            .cover_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    })
}

impl RawRecord {
    fn identity(&self) -> Option<String> {
        self.doi
            .as_deref()
            .and_then(normalize_doi)
            .or_else(|| {
                self.eid
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| match &self.id {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
    }

    fn into_document(self, id: String, query_id: String) -> Document {
        let text = self
            .abstract_
            .as_ref()
            .and_then(abstract_text)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.description.clone())
            .unwrap_or_default();
        let mut doc = Document::new(id, text);
        doc.year = year_of(&self);
        doc.title = self.title;
        doc.author_keywords = self.authkeywords.as_ref().map(keywords).unwrap_or_default();
        doc.query_id = Some(query_id);
        doc
    }
}

/// Parse one JSONL file; the query id defaults to the file stem.
fn read_query_file(path: &Path, report: &mut LoadReport) -> Result<Vec<Document>, CorpusError> {
    let file = File::open(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut docs = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(error) => {
                report.skipped_malformed += 1;
                warn!(path = %path.display(), line = idx + 1, %error, "malformed record skipped");
                continue;
            }
        };
        report.records += 1;
        let Some(id) = record.identity() else {
            report.missing_identity += 1;
            warn!(path = %path.display(), line = idx + 1, "record without doi/eid/id skipped");
            continue;
        };
        let query_id = record.query_id.clone().unwrap_or_else(|| stem.clone());
        docs.push(record.into_document(id, query_id));
    }
    Ok(docs)
}

/// Load every `*.jsonl` below `dir` (sorted by path) into one corpus.
///
/// A document found by several queries is kept in the query that returned
/// the fewest distinct documents, ties broken by query name. Lines that do
/// not parse are skipped and counted. Within one query the first
/// occurrence wins.
pub fn load_corpus(dir: &Path) -> Result<(Corpus, LoadReport), CorpusError> {
    let mut report = LoadReport::default();
    if !dir.exists() {
        warn!(path = %dir.display(), "corpus directory missing");
        return Ok((Corpus::default(), report));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| CorpusError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("jsonl")
        {
            files.push(entry.into_path());
        }
    }

    let mut loaded = Vec::new();
    for path in &files {
        let docs = read_query_file(path, &mut report)?;
        debug!(path = %path.display(), documents = docs.len(), "read query file");
        loaded.extend(docs);
    }
    report.files = files.len();

    let mut members: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for doc in &loaded {
        if let Some(query) = &doc.query_id {
            members.entry(query.as_str()).or_default().insert(doc.id.as_str());
        }
    }
    report.query_sizes = members
        .into_iter()
        .map(|(query, ids)| (query.to_string(), ids.len()))
        .collect();

    let (documents, removed) = dedup_keep_smallest(loaded, &report.query_sizes);
    report.duplicates_removed = removed;
    info!(
        files = report.files,
        records = report.records,
        documents = documents.len(),
        duplicates_removed = removed,
        missing_identity = report.missing_identity,
        skipped_malformed = report.skipped_malformed,
        "corpus loaded"
    );
    Ok((Corpus::new(documents), report))
}

fn dedup_keep_smallest(
    documents: Vec<Document>,
    query_sizes: &BTreeMap<String, usize>,
) -> (Vec<Document>, usize) {
    let rank = |doc: &Document| {
        let query = doc.query_id.clone().unwrap_or_default();
        (query_sizes.get(&query).copied().unwrap_or(usize::MAX), query)
    };

    let mut keeper: HashMap<&str, (usize, (usize, String))> = HashMap::new();
    for (idx, doc) in documents.iter().enumerate() {
        let candidate = rank(doc);
        match keeper.get(doc.id.as_str()) {
            Some((_, best)) if *best <= candidate => {}
            _ => {
                keeper.insert(doc.id.as_str(), (idx, candidate));
            }
        }
    }
    let keep: BTreeSet<usize> = keeper.values().map(|(idx, _)| *idx).collect();
    let removed = documents.len() - keep.len();
    let kept = documents
        .into_iter()
        .enumerate()
        .filter_map(|(idx, doc)| keep.contains(&idx).then_some(doc))
        .collect();
    (kept, removed)
}
