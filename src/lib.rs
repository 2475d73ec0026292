//! Labeling and clustering toolkit for machine-learning-in-product-development abstracts.

pub mod api;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod data;
pub mod logging;
pub mod nlp;
pub mod ontology;
pub mod pipeline;
