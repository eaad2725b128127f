/// Engram system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimensionality (D).
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Blend weight of the dense-vector channel in hybrid search.
pub const VECTOR_BLEND_WEIGHT: f64 = 0.7;

/// Blend weight of the keyword channel in hybrid search.
pub const KEYWORD_BLEND_WEIGHT: f64 = 0.3;

/// Time-decay window for hybrid rerank and conflict freshness (days).
pub const TIME_DECAY_HALF_LIFE_DAYS: f64 = 7.0;

/// Default minimum cosine similarity for vector search candidates.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

/// Default result limit for queries.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Records fetched when distilling memories for prompt injection.
pub const DISTILL_RETRIEVE_LIMIT: usize = 50;

/// Candidates compared per record during conflict detection when
/// embeddings are available (top-K cosine pre-filter).
pub const CONFLICT_PREFILTER_TOP_K: usize = 10;

/// Maximum BFS depth for graph path queries.
pub const DEFAULT_MAX_PATH_DEPTH: usize = 3;

/// Default radius for subgraph extraction.
pub const DEFAULT_SUBGRAPH_RADIUS: usize = 2;

/// Minimum confidence for an extracted entity to survive filtering.
pub const ENTITY_CONFIDENCE_THRESHOLD: f64 = 0.5;
