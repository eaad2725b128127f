//! Rule-based entity and relation extraction, with optional LLM
//! augmentation. Pattern tables are plain values, not a hierarchy: each
//! row carries its regex, the produced type, a base confidence, and the
//! capture-to-name functions.

mod entities;
mod relations;

pub use entities::{EntityExtractor, EntityPattern, ExtractedEntity};
pub use relations::{resolve_endpoint, ExtractedRelation, RelationExtractor, RelationPattern};
