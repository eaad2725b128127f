//! # engram-conflict
//!
//! Detects contradictions between an incoming memory and the records it
//! may clash with: semantic, factual, temporal, preference, and
//! duplicate detectors, credibility scoring to break ties, and suggested
//! resolutions for the subset that can be auto-resolved.

mod credibility;
mod detector;
mod resolver;
mod text;

pub use credibility::credibility;
pub use detector::ConflictDetector;
pub use resolver::suggest_resolution;
pub use text::{content_words, jaccard_similarity};
