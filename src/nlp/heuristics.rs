//! Regex cue rules: indirect evidence for a label, independent of dictionary hits.
//!
//! Patterns run against normalised text, so they only see lowercase words
//! separated by single spaces.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::nlp::{
    labels::{Dimension, Signal, SourceKind},
    normalize::Normalized,
};

const CUE_PATTERNS: &[(Dimension, &str, &str)] = &[
    (
        Dimension::Paradigm,
        "supervised",
        r"\b(labell?ed|annotated) (training )?(data|dataset|datasets|samples|examples|images)\b",
    ),
    (
        Dimension::Paradigm,
        "supervised",
        r"\btrain(ed|ing)? (an? )?(classifier|classification model|regression model|predictive model)\b",
    ),
    (Dimension::Paradigm, "supervised", r"\bground truth labels?\b"),
    (
        Dimension::Paradigm,
        "unsupervised",
        r"\bunlabell?ed (data|dataset|datasets|samples)\b",
    ),
    (
        Dimension::Paradigm,
        "unsupervised",
        r"\b(clustering|cluster analysis|dimensionality reduction)\b",
    ),
    (
        Dimension::Paradigm,
        "reinforcement",
        r"\breward (function|signal|shaping)s?\b",
    ),
    (
        Dimension::Paradigm,
        "reinforcement",
        r"\b(markov decision process(es)?|policy (gradient|network|optimi[sz]ation))\b",
    ),
    (
        Dimension::Paradigm,
        "semi_supervised",
        r"\b(small|limited|few) (amount|number|set)s? of labell?ed\b",
    ),
    (Dimension::Paradigm, "semi_supervised", r"\bpseudo labels?\b"),
    (
        Dimension::LifecyclePhase,
        "planning",
        r"\b(requirements?|specifications?) (of|for) (the )?(new )?products?\b",
    ),
    (
        Dimension::LifecyclePhase,
        "development_production",
        r"\b(manufactur\w+|fabricat\w+|shop floor)\b",
    ),
    (Dimension::LifecyclePhase, "optimization", r"\boptimi[sz]\w*\b"),
    (
        Dimension::LifecyclePhase,
        "use_reuse",
        r"\b(in service|field data|end of life|disassembl\w+|after sales)\b",
    ),
    (Dimension::ApplicationContext, "product_design", r"\bdesigners?\b"),
    (
        Dimension::ApplicationContext,
        "manufacturing_process",
        r"\b(process parameters?|machine tools?|cutting tools?)\b",
    ),
    (
        Dimension::ApplicationContext,
        "quality_assurance",
        r"\b(defects?|defective|inspection)\b",
    ),
    (
        Dimension::ApplicationContext,
        "maintenance_service",
        r"\b(failures?|faults?|tool wear)\b",
    ),
    (
        Dimension::ApplicationContext,
        "supply_chain",
        r"\b(suppliers?|inventory|warehouses?)\b",
    ),
    (
        Dimension::ApplicationContext,
        "customer_market",
        r"\b(customers?|consumers?)\b",
    ),
];

static BUILTIN: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new(
        CUE_PATTERNS
            .iter()
            .map(|(dimension, label, pattern)| {
                CueRule::new(*dimension, *label, Regex::new(pattern).expect("valid regex"))
            })
            .collect(),
    )
});

/// One heuristic: a pattern that votes for `label` in `dimension`.
#[derive(Debug, Clone)]
pub struct CueRule {
    pub dimension: Dimension,
    pub label: String,
    pattern: Regex,
}

impl CueRule {
    pub fn new(dimension: Dimension, label: impl Into<String>, pattern: Regex) -> Self {
        Self {
            dimension,
            label: label.into(),
            pattern,
        }
    }
}

/// Ordered collection of cue rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CueRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CueRule>) -> Self {
        Self { rules }
    }

    /// Rules shipped with the binary.
    pub fn builtin() -> &'static RuleSet {
        &BUILTIN
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One signal per firing rule, carrying the first matched text.
    pub fn signals(&self, text: &Normalized) -> Vec<Signal> {
        if text.is_empty() {
            return Vec::new();
        }
        self.rules
            .iter()
            .filter_map(|rule| {
                rule.pattern.find(text.as_str()).map(|found| {
                    Signal::new(
                        rule.dimension,
                        rule.label.clone(),
                        SourceKind::CueRule,
                        found.as_str(),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::normalize::normalize;

    #[test]
    fn builtin_rules_compile() {
        assert_eq!(RuleSet::builtin().len(), CUE_PATTERNS.len());
    }

    #[test]
    fn cues_fire_on_normalised_text() {
        let text = normalize("Operators annotated training images; the reward-function was shaped.");
        let signals = RuleSet::builtin().signals(&text);
        assert!(signals
            .iter()
            .any(|s| s.label == "supervised" && s.raw_match == "annotated training images"));
        assert!(signals
            .iter()
            .any(|s| s.label == "reinforcement" && s.raw_match == "reward function"));
        assert!(signals.iter().all(|s| s.source == SourceKind::CueRule));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(RuleSet::builtin().signals(&Normalized::Empty).is_empty());
    }
}
