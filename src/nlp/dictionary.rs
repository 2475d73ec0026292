//! Phrase dictionaries and the longest-match lookup engine.
//!
//! A dictionary file groups surface forms under `[canonical]` headers:
//!
//! ```text
//! # comment
//! [random forest]
//! random forests
//! rf classifier
//! ```
//!
//! The canonical term is always one of its own surface forms. For dimension
//! dictionaries the section order doubles as the tie-break precedence.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::PathBuf,
};

use serde::Serialize;
use thiserror::Error;

use crate::nlp::{
    labels::Dimension,
    normalize::{normalize, Normalized},
};

/// Load-time dictionary failures. All of them are fatal for a run.
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("{dictionary}: surface form `{surface}` is claimed by both `{first}` and `{second}`")]
    AmbiguousEntry {
        dictionary: String,
        surface: String,
        first: String,
        second: String,
    },
    #[error("{dictionary}:{line}: surface form `{raw}` appears before any [section]")]
    OrphanSurfaceForm {
        dictionary: String,
        line: usize,
        raw: String,
    },
    #[error("{dictionary}:{line}: `{raw}` normalises to an empty surface form")]
    EmptySurfaceForm {
        dictionary: String,
        line: usize,
        raw: String,
    },
    #[error("{dictionary}:{line}: malformed section header `{raw}`")]
    MalformedHeader {
        dictionary: String,
        line: usize,
        raw: String,
    },
    #[error("{dictionary}: section `{canonical}` is declared twice")]
    DuplicateSection {
        dictionary: String,
        canonical: String,
    },
    #[error("reading dictionary {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a dictionary entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "dimension")]
pub enum EntryTag {
    Label(Dimension),
    Method,
}

/// One concept and the normalised phrases that express it.
#[derive(Debug, Clone, Serialize)]
pub struct DictionaryEntry {
    pub canonical: String,
    pub surface_forms: BTreeSet<String>,
    pub tag: EntryTag,
}

/// Matched span in token offsets (`end` exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub canonical: String,
    pub surface: String,
    pub start: usize,
    pub end: usize,
}

/// Per-canonical summary of the spans found in one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchHit {
    /// Surface form of the first occurrence.
    pub surface: String,
    pub count: usize,
}

/// Deterministic, canonical-ordered match summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchSet {
    hits: BTreeMap<String, MatchHit>,
}

impl MatchSet {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.hits.contains_key(canonical)
    }

    pub fn get(&self, canonical: &str) -> Option<&MatchHit> {
        self.hits.get(canonical)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatchHit)> {
        self.hits.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn canonical_terms(&self) -> BTreeSet<String> {
        self.hits.keys().cloned().collect()
    }
}

/// Read-only phrase dictionary with a surface-form index.
#[derive(Debug, Clone)]
pub struct Dictionary {
    name: String,
    entries: Vec<DictionaryEntry>,
    index: HashMap<String, usize>,
    max_tokens: usize,
}

impl Dictionary {
    /// Parse the grouped plain-text format described in the module docs.
    pub fn parse(name: &str, tag: EntryTag, source: &str) -> Result<Self, LexiconError> {
        let mut groups: Vec<(String, Vec<(usize, String)>)> = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix('[') {
                let canonical = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| LexiconError::MalformedHeader {
                        dictionary: name.to_string(),
                        line: line_no,
                        raw: trimmed.to_string(),
                    })?;
                groups.push((canonical.to_string(), vec![(line_no, canonical.to_string())]));
                continue;
            }
            match groups.last_mut() {
                Some((_, forms)) => forms.push((line_no, trimmed.to_string())),
                None => {
                    return Err(LexiconError::OrphanSurfaceForm {
                        dictionary: name.to_string(),
                        line: line_no,
                        raw: trimmed.to_string(),
                    })
                }
            }
        }

        let mut entries = Vec::with_capacity(groups.len());
        for (canonical, forms) in groups {
            let mut surface_forms = BTreeSet::new();
            for (line, raw) in forms {
                match normalize(&raw) {
                    Normalized::Text(text) => {
                        surface_forms.insert(text);
                    }
                    Normalized::Empty => {
                        return Err(LexiconError::EmptySurfaceForm {
                            dictionary: name.to_string(),
                            line,
                            raw,
                        })
                    }
                }
            }
            entries.push(DictionaryEntry {
                canonical,
                surface_forms,
                tag,
            });
        }
        Self::from_entries(name, entries)
    }

    /// Build the index, rejecting surface forms shared across entries.
    pub fn from_entries(name: &str, entries: Vec<DictionaryEntry>) -> Result<Self, LexiconError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen_canonical = BTreeSet::new();
        let mut max_tokens = 0;
        for (idx, entry) in entries.iter().enumerate() {
            if !seen_canonical.insert(entry.canonical.clone()) {
                return Err(LexiconError::DuplicateSection {
                    dictionary: name.to_string(),
                    canonical: entry.canonical.clone(),
                });
            }
            for surface in &entry.surface_forms {
                if let Some(&other) = index.get(surface) {
                    return Err(LexiconError::AmbiguousEntry {
                        dictionary: name.to_string(),
                        surface: surface.clone(),
                        first: entries[other].canonical.clone(),
                        second: entry.canonical.clone(),
                    });
                }
                max_tokens = max_tokens.max(surface.split(' ').count());
                index.insert(surface.clone(), idx);
            }
        }
        Ok(Self {
            name: name.to_string(),
            entries,
            index,
            max_tokens,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    /// Canonical terms in declaration order.
    pub fn canonical_terms(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.canonical.clone()).collect()
    }

    /// All non-overlapping spans, longest surface form first, ordered by position.
    pub fn find_spans(&self, text: &Normalized) -> Vec<Match> {
        let tokens = text.tokens();
        if tokens.is_empty() || self.max_tokens == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        for start in 0..tokens.len() {
            let longest = self.max_tokens.min(tokens.len() - start);
            for len in 1..=longest {
                let key = tokens[start..start + len].join(" ");
                if let Some(&entry) = self.index.get(&key) {
                    candidates.push((start, len, entry));
                }
            }
        }
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut taken = vec![false; tokens.len()];
        let mut accepted = Vec::new();
        for (start, len, entry) in candidates {
            let end = start + len;
            if taken[start..end].iter().any(|t| *t) {
                continue;
            }
            taken[start..end].iter_mut().for_each(|t| *t = true);
            accepted.push(Match {
                canonical: self.entries[entry].canonical.clone(),
                surface: tokens[start..end].join(" "),
                start,
                end,
            });
        }
        accepted.sort_by_key(|m| m.start);
        accepted
    }

    /// Canonical terms found in `text`, each reported once with its hit count.
    pub fn match_text(&self, text: &Normalized) -> MatchSet {
        let mut hits: BTreeMap<String, MatchHit> = BTreeMap::new();
        for found in self.find_spans(text) {
            hits.entry(found.canonical)
                .and_modify(|hit| hit.count += 1)
                .or_insert(MatchHit {
                    surface: found.surface,
                    count: 1,
                });
        }
        MatchSet { hits }
    }
}
