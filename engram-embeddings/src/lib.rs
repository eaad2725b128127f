//! # engram-embeddings
//!
//! Embedding generation for the memory core: pluggable backends (remote
//! OpenAI-compatible, local HTTP server, deterministic hash fallback), a
//! TTL+capacity-bounded result cache, retry with exponential backoff, and
//! graceful degradation to the fallback on any terminal failure.

mod cache;
mod provider;
mod service;

pub mod providers;

pub use cache::EmbeddingCache;
pub use provider::{EmbeddingProvider, EmbeddingResult};
pub use service::EmbeddingService;
