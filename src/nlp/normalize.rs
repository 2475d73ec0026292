//! Canonical text form shared by every matching stage.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Publisher boilerplate appended to abstracts (`© 2021 Elsevier B.V. ...`).
///
/// Only markers that cannot survive normalisation are used, otherwise a
/// second pass could strip text the first pass kept.
static COPYRIGHT_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(©|\([cC]\)\s*\d{4}).*$").expect("valid regex"));

/// Normalised abstract text, or the explicit marker for absent text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Normalized {
    #[default]
    Empty,
    Text(String),
}

impl Normalized {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Text(text) => text.as_str(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Space separated words of the normalised text.
    pub fn tokens(&self) -> Vec<&str> {
        self.as_str().split(' ').filter(|t| !t.is_empty()).collect()
    }
}

impl From<String> for Normalized {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

impl From<Normalized> for String {
    fn from(value: Normalized) -> Self {
        match value {
            Normalized::Empty => String::new(),
            Normalized::Text(text) => text,
        }
    }
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, strip copyright tails and punctuation, collapse whitespace.
pub fn normalize(raw: &str) -> Normalized {
    let body = COPYRIGHT_TAIL.replace(raw, "");
    let mut out = String::with_capacity(body.len());
    let mut pending_space = false;
    for ch in body.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    Normalized::from(out)
}

/// Variant of [`normalize`] for optional record fields.
pub fn normalize_opt(raw: Option<&str>) -> Normalized {
    raw.map(normalize).unwrap_or_default()
}
