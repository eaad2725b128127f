//! Default tuning values shared by the config structs.

pub const DEFAULT_DATA_DIR: &str = "./data";

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EMBEDDING_MAX_RETRIES: u32 = 3;
pub const DEFAULT_EMBEDDING_CACHE_TTL_MS: u64 = 86_400_000;
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: u64 = 5_000;

pub const DEFAULT_TOKEN_BUDGET: usize = 100_000;

pub const DEFAULT_COMPRESSION_TOKEN_THRESHOLD_PERCENT: f64 = 0.8;
pub const DEFAULT_COMPRESSION_COUNT_LIMIT: usize = 1_000;
pub const DEFAULT_COMPRESSION_AGE_DAYS: i64 = 30;
pub const DEFAULT_COMPRESSION_REDUNDANCY_THRESHOLD: f64 = 0.3;

pub const DEFAULT_LIFECYCLE_INTERVAL_MS: u64 = 86_400_000;
pub const DEFAULT_MAX_MEMORIES_PER_USER: usize = 2_000;
