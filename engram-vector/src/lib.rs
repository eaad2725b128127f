//! # engram-vector
//!
//! Process-wide vector store for memory records: cosine search over an
//! in-memory map, a per-user secondary index, and atomic JSON
//! persistence coalesced through a single-flight save queue.

mod persistence;
mod store;

pub use store::{CleanupOptions, CleanupReport, SearchHit, SearchQuery, VectorStore};
