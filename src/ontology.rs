//! Mapping of extracted method names onto an external ML-method vocabulary.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::info;

use crate::nlp::normalize::normalize;

/// Lowest Jaro-Winkler similarity accepted as a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 0.92;

/// IRI prefix for extracted method names in the SKOS export.
pub const METHOD_NAMESPACE: &str = "urn:ml-lifecycle-mapper:method:";

const MAPPING_HEADER: [&str; 4] = ["method", "ontology_uri", "ontology_label", "score"];

#[derive(Debug, Clone, Deserialize)]
struct VocabularyRow {
    ml_method: String,
    label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    pub uri: String,
    pub label: String,
}

/// Vocabulary keyed by normalised label; the first row wins for a repeated label.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    concepts: IndexMap<String, Concept>,
}

impl Vocabulary {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening vocabulary {}", path.display()))?;
        let mut concepts = Vec::new();
        for row in reader.deserialize::<VocabularyRow>() {
            let row = row.with_context(|| format!("reading vocabulary {}", path.display()))?;
            concepts.push(Concept {
                uri: row.ml_method,
                label: row.label,
            });
        }
        Ok(Self::new(concepts))
    }

    pub fn new(concepts: Vec<Concept>) -> Self {
        let mut map = IndexMap::new();
        for concept in concepts {
            let key = normalize(&concept.label);
            if key.is_empty() {
                continue;
            }
            map.entry(key.as_str().to_string()).or_insert(concept);
        }
        Self { concepts: map }
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Exact match on the normalised label, else the most similar label
    /// above [`FUZZY_THRESHOLD`]. Earlier vocabulary rows win score ties.
    pub fn lookup(&self, method: &str) -> Option<(&Concept, f64)> {
        let key = normalize(method);
        if key.is_empty() {
            return None;
        }
        if let Some(concept) = self.concepts.get(key.as_str()) {
            return Some((concept, 1.0));
        }
        self.concepts
            .iter()
            .map(|(label, concept)| (concept, jaro_winkler(key.as_str(), label)))
            .filter(|(_, score)| *score >= FUZZY_THRESHOLD)
            .fold(None, |best: Option<(&Concept, f64)>, (concept, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((concept, score)),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMapping {
    pub method: String,
    pub ontology_uri: String,
    pub ontology_label: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingReport {
    pub mapped: Vec<MethodMapping>,
    pub unmapped: Vec<String>,
}

pub fn map_methods<'a>(
    methods: impl IntoIterator<Item = &'a str>,
    vocabulary: &Vocabulary,
) -> MappingReport {
    let distinct: BTreeSet<&str> = methods.into_iter().collect();
    let mut report = MappingReport::default();
    for method in distinct {
        match vocabulary.lookup(method) {
            Some((concept, score)) => report.mapped.push(MethodMapping {
                method: method.to_string(),
                ontology_uri: concept.uri.clone(),
                ontology_label: concept.label.clone(),
                score,
            }),
            None => report.unmapped.push(method.to_string()),
        }
    }
    info!(
        mapped = report.mapped.len(),
        unmapped = report.unmapped.len(),
        vocabulary = vocabulary.len(),
        "method mapping finished"
    );
    report
}

/// IRI for an extracted method: the namespace plus a hyphenated slug.
pub fn method_iri(method: &str) -> String {
    let slug = method
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!("{METHOD_NAMESPACE}{slug}")
}

/// Write `method_mapping.csv`, `method_mapping.ttl` and
/// `unmapped_methods.csv` into `dir`. Headers are written even when empty.
pub fn write_report(dir: &Path, report: &MappingReport) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mapped_path = dir.join("method_mapping.csv");
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&mapped_path)?;
    writer.write_record(MAPPING_HEADER)?;
    for row in &report.mapped {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let ttl_path = dir.join("method_mapping.ttl");
    write_skos(&ttl_path, &report.mapped)?;

    let unmapped_path = dir.join("unmapped_methods.csv");
    let mut writer = csv::Writer::from_path(&unmapped_path)?;
    writer.write_record(["method"])?;
    for method in &report.unmapped {
        writer.write_record([method.as_str()])?;
    }
    writer.flush()?;
    info!(
        mapped = %mapped_path.display(),
        skos = %ttl_path.display(),
        unmapped = %unmapped_path.display(),
        "wrote method mapping"
    );
    Ok(())
}

/// One `skos:exactMatch` triple per mapped method, in Turtle.
fn write_skos(path: &Path, mapped: &[MethodMapping]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "@prefix skos: <http://www.w3.org/2004/02/skos/core#> .")?;
    writeln!(out)?;
    for row in mapped {
        writeln!(
            out,
            "<{}> skos:exactMatch <{}> .",
            method_iri(&row.method),
            row.ontology_uri
        )?;
    }
    out.flush()?;
    Ok(())
}
