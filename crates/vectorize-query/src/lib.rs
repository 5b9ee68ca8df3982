//! Query routing config and the multi-collection fan-out client.
//!
//! The config builder scans resume checkpoints to learn which models
//! live in which collections; the client fans requests across those
//! collections in parallel and merges results by distance.

pub mod client;
pub mod config;
pub mod error;

pub use client::MultiCollectionQueryClient;
pub use config::{build_query_config, ModelCollections, QueryConfig, QueryConfigMetadata};
pub use error::QueryError;
