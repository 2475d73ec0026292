//! Text processing: normalisation, dictionaries, cue rules, weak supervision and embeddings.

pub mod dictionary;
pub mod embeddings;
pub mod heuristics;
pub mod labels;
pub mod lexicon;
pub mod normalize;
pub mod weak;
