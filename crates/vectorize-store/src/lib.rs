//! Abstract vector store client and the in-memory backend.
//!
//! The [`VectorStore`] trait is the pipeline's only seam to the vector
//! database. The indexer, drop apply, and the query client are written
//! against it; [`InMemoryStore`] implements it for local runs and tests.

pub mod client;
pub mod error;
pub mod filter;
pub mod memory;

pub use client::{GetRequest, GetResponse, QueryResponse, VectorStore};
pub use error::StoreError;
pub use filter::Filter;
pub use memory::InMemoryStore;
