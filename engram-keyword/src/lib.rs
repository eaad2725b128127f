//! # engram-keyword
//!
//! Keyword index over the same memory ids as the vector store. Backed by
//! an embedded SQLite FTS5 table (with a plain-table LIKE fallback), with
//! per-user write serialization and a per-call timeout that interrupts
//! the running statement.

mod index;
mod normalize;

pub use index::{KeywordHit, KeywordIndex, KeywordSearchOptions};
pub use normalize::normalize_text;
