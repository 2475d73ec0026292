//! Label vocabulary: dimensions, signal provenance and resolved label results.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Independent axis of classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Paradigm,
    LifecyclePhase,
    ApplicationContext,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Dimension::Paradigm,
        Dimension::LifecyclePhase,
        Dimension::ApplicationContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paradigm => "paradigm",
            Self::LifecyclePhase => "lifecycle_phase",
            Self::ApplicationContext => "application_context",
        }
    }

    /// File name of the dimension dictionary inside the dictionary directory.
    pub fn dictionary_file(&self) -> String {
        format!("{}.txt", self.as_str())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "paradigm" => Ok(Self::Paradigm),
            "lifecycle_phase" | "phase" | "plc_phase" => Ok(Self::LifecyclePhase),
            "application_context" | "context" => Ok(Self::ApplicationContext),
            other => Err(format!("unknown dimension `{other}`")),
        }
    }
}

/// Kind of evidence behind a signal. Each kind counts once per label value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Dimension dictionary hit in the abstract.
    Dictionary,
    /// Heuristic regex cue in the abstract.
    CueRule,
    /// Dimension dictionary hit in the author keyword field.
    AuthorKeyword,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::CueRule => "cue_rule",
            Self::AuthorKeyword => "author_keyword",
        }
    }
}

/// One raw vote for a label value in a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub dimension: Dimension,
    pub label: String,
    pub source: SourceKind,
    pub raw_match: String,
}

impl Signal {
    pub fn new(
        dimension: Dimension,
        label: impl Into<String>,
        source: SourceKind,
        raw_match: impl Into<String>,
    ) -> Self {
        Self {
            dimension,
            label: label.into(),
            source,
            raw_match: raw_match.into(),
        }
    }
}

/// Resolved value of a dimension. Serialises as the label or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum LabelValue {
    #[default]
    Unclassified,
    Label(String),
}

impl From<Option<String>> for LabelValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unclassified, Self::Label)
    }
}

impl From<LabelValue> for Option<String> {
    fn from(value: LabelValue) -> Self {
        match value {
            LabelValue::Unclassified => None,
            LabelValue::Label(label) => Some(label),
        }
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => f.write_str("UNCLASSIFIED"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Provenance entry of a resolved label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub kind: SourceKind,
    pub raw_match: String,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.raw_match)
    }
}

/// Aggregated outcome for one dimension of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub value: LabelValue,
    pub confidence: f64,
    pub sources: Vec<Provenance>,
}

impl LabelResult {
    pub fn unclassified() -> Self {
        Self {
            value: LabelValue::Unclassified,
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match &self.value {
            LabelValue::Unclassified => None,
            LabelValue::Label(label) => Some(label.as_str()),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.label().is_some()
    }
}

impl Default for LabelResult {
    fn default() -> Self {
        Self::unclassified()
    }
}
