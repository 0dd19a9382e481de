#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! Incremental vector indexing and retrieval.
//!
//! Chunks flow through [`ingest::ChunkIngestor`] (exact-duplicate filter),
//! the embedder, and into a [`store::VectorStore`], which keeps the vector
//! index, metadata and fingerprint set aligned. [`persist`] saves and loads
//! that triple as one unit; [`search::RetrievalEngine`] answers queries.

pub mod context;
pub mod fingerprint;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod persist;
pub mod search;
pub mod store;

pub use context::{format_context_grouped, ContextOptions};
pub use fingerprint::{Fingerprint, FingerprintSet};
pub use index::params::IvfParams;
pub use index::{IndexSpec, Neighbor, VectorIndex};
pub use metadata::{MetadataStore, Record};
pub use search::{RetrievalEngine, SearchResult};
pub use store::{IngestReport, StoreSummary, VectorStore};
