//! Weak-supervision aggregation of noisy label signals.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

use crate::nlp::{
    labels::{Dimension, LabelResult, LabelValue, Provenance, Signal, SourceKind},
    lexicon::Lexicon,
};

/// Probability that a single independent source is right.
pub const SOURCE_RELIABILITY: f64 = 0.5;

/// Confidence after `corroboration` independent sources agree: `1 - (1 - p)^n`.
pub fn confidence_for(corroboration: usize) -> f64 {
    if corroboration == 0 {
        return 0.0;
    }
    let exponent = i32::try_from(corroboration).unwrap_or(i32::MAX);
    (1.0 - (1.0 - SOURCE_RELIABILITY).powi(exponent)).min(1.0)
}

/// Resolves signals into one label per dimension with fixed tie-break tables.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    precedence: BTreeMap<Dimension, Vec<String>>,
}

impl Aggregator {
    pub fn new(precedence: BTreeMap<Dimension, Vec<String>>) -> Self {
        Self { precedence }
    }

    /// Precedence taken from the section order of each dimension dictionary.
    pub fn from_lexicon(lexicon: &Lexicon) -> Self {
        let precedence = Dimension::ALL
            .iter()
            .map(|dim| (*dim, lexicon.precedence(*dim)))
            .collect();
        Self::new(precedence)
    }

    fn rank(&self, dimension: Dimension, label: &str) -> usize {
        self.precedence
            .get(&dimension)
            .and_then(|order| order.iter().position(|l| l == label))
            .unwrap_or(usize::MAX)
    }

    /// Resolve `signals` for `dimension`; signals of other dimensions are ignored.
    ///
    /// The winner has the most distinct source kinds; ties go to the label
    /// listed first in the precedence table, then to the alphabetically first.
    pub fn resolve(&self, dimension: Dimension, signals: &[Signal]) -> LabelResult {
        let mut groups: BTreeMap<&str, BTreeSet<(SourceKind, &str)>> = BTreeMap::new();
        for signal in signals.iter().filter(|s| s.dimension == dimension) {
            groups
                .entry(signal.label.as_str())
                .or_default()
                .insert((signal.source, signal.raw_match.as_str()));
        }

        let winner = groups
            .iter()
            .map(|(label, evidence)| {
                let kinds: BTreeSet<SourceKind> = evidence.iter().map(|(kind, _)| *kind).collect();
                (*label, kinds.len(), evidence)
            })
            .min_by_key(|(label, corroboration, _)| {
                (Reverse(*corroboration), self.rank(dimension, label), *label)
            });

        match winner {
            None => LabelResult::unclassified(),
            Some((label, corroboration, evidence)) => LabelResult {
                value: LabelValue::Label(label.to_string()),
                confidence: confidence_for(corroboration),
                sources: evidence
                    .iter()
                    .map(|(kind, raw)| Provenance {
                        kind: *kind,
                        raw_match: (*raw).to_string(),
                    })
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn aggregator() -> Aggregator {
        let mut precedence = BTreeMap::new();
        precedence.insert(
            Dimension::Paradigm,
            vec![
                "supervised".to_string(),
                "unsupervised".to_string(),
                "reinforcement".to_string(),
            ],
        );
        Aggregator::new(precedence)
    }

    fn sig(label: &str, source: SourceKind, raw: &str) -> Signal {
        Signal::new(Dimension::Paradigm, label, source, raw)
    }

    #[test]
    fn no_signals_is_unclassified() {
        let result = aggregator().resolve(Dimension::Paradigm, &[]);
        assert_eq!(result, LabelResult::unclassified());
    }

    #[test]
    fn repeated_hits_of_one_kind_count_once() {
        let signals = vec![
            sig("unsupervised", SourceKind::Dictionary, "unsupervised learning"),
            sig("unsupervised", SourceKind::Dictionary, "unsupervised approach"),
            sig("supervised", SourceKind::Dictionary, "supervised learning"),
            sig("supervised", SourceKind::CueRule, "labeled data"),
        ];
        let result = aggregator().resolve(Dimension::Paradigm, &signals);
        assert_eq!(result.label(), Some("supervised"));
        assert_eq!(result.confidence, confidence_for(2));
        assert_eq!(result.sources.len(), 2);
    }

    #[test]
    fn ties_follow_precedence_not_alphabet() {
        let signals = vec![
            sig("reinforcement", SourceKind::Dictionary, "reinforcement learning"),
            sig("unsupervised", SourceKind::CueRule, "clustering"),
        ];
        let result = aggregator().resolve(Dimension::Paradigm, &signals);
        assert_eq!(result.label(), Some("unsupervised"));
    }

    #[test]
    fn unknown_labels_rank_after_known_ones() {
        let signals = vec![
            sig("active", SourceKind::Dictionary, "active learning"),
            sig("reinforcement", SourceKind::Dictionary, "reinforcement learning"),
        ];
        let result = aggregator().resolve(Dimension::Paradigm, &signals);
        assert_eq!(result.label(), Some("reinforcement"));
    }

    #[test]
    fn other_dimensions_are_ignored() {
        let signals = vec![Signal::new(
            Dimension::LifecyclePhase,
            "planning",
            SourceKind::Dictionary,
            "product planning",
        )];
        assert!(!aggregator().resolve(Dimension::Paradigm, &signals).is_classified());
    }

    #[test]
    fn confidence_curve_is_capped_and_increasing() {
        assert_eq!(confidence_for(0), 0.0);
        assert_eq!(confidence_for(1), 0.5);
        assert_eq!(confidence_for(2), 0.75);
        assert!(confidence_for(usize::MAX) <= 1.0);
    }

    fn arb_signal() -> impl Strategy<Value = Signal> {
        (
            prop_oneof![
                Just("supervised"),
                Just("unsupervised"),
                Just("reinforcement"),
                Just("zeta")
            ],
            prop_oneof![
                Just(SourceKind::Dictionary),
                Just(SourceKind::CueRule),
                Just(SourceKind::AuthorKeyword)
            ],
            "[a-z]{1,6}",
        )
            .prop_map(|(label, source, raw)| sig(label, source, &raw))
    }

    proptest! {
        #[test]
        fn insertion_order_does_not_matter(
            signals in prop::collection::vec(arb_signal(), 0..12),
            rotate in 0usize..12,
        ) {
            let agg = aggregator();
            let expected = agg.resolve(Dimension::Paradigm, &signals);
            let mut reversed = signals.clone();
            reversed.reverse();
            prop_assert_eq!(&agg.resolve(Dimension::Paradigm, &reversed), &expected);
            let mut rotated = signals.clone();
            if !rotated.is_empty() {
                let by = rotate % rotated.len();
                rotated.rotate_left(by);
            }
            prop_assert_eq!(&agg.resolve(Dimension::Paradigm, &rotated), &expected);
        }

        #[test]
        fn corroboration_never_lowers_confidence(
            signals in prop::collection::vec(arb_signal(), 1..10),
            extra_kind in prop_oneof![
                Just(SourceKind::Dictionary),
                Just(SourceKind::CueRule),
                Just(SourceKind::AuthorKeyword)
            ],
        ) {
            let agg = aggregator();
            let before = agg.resolve(Dimension::Paradigm, &signals);
            let label = before.label().map(str::to_string);
            prop_assume!(label.is_some());
            let mut more = signals.clone();
            more.push(sig(label.as_deref().unwrap_or_default(), extra_kind, "extra"));
            let after = agg.resolve(Dimension::Paradigm, &more);
            prop_assert_eq!(after.label(), before.label());
            prop_assert!(after.confidence >= before.confidence);
        }
    }
}
