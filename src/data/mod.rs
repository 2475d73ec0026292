//! Corpus ingestion, embedding cache and exported artefacts.

pub mod cache;
pub mod corpus;
pub mod export;
