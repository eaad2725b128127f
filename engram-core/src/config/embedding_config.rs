use serde::{Deserialize, Serialize};

use super::defaults;
use crate::constants::DEFAULT_EMBEDDING_DIMENSIONS;

/// Which embedding backend to use. An absent or unknown
/// `EMBEDDING_PROVIDER` forces `Simple`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    OpenAi,
    /// No native embedding endpoint exists; the service degrades to the
    /// deterministic fallback and says so once at construction.
    Anthropic,
    Local,
    Simple,
}

impl EmbeddingProviderKind {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            "local" => Self::Local,
            _ => Self::Simple,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Local => "local",
            Self::Simple => "simple",
        }
    }
}

/// Embedding subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    /// Target dimensionality D; results are coerced to this.
    pub dimensions: usize,
    /// Per-request timeout for remote backends.
    pub timeout_ms: u64,
    /// Retry attempts for transient remote failures.
    pub max_retries: u32,
    /// Cache entry time-to-live.
    pub cache_ttl_ms: u64,
    /// Cache capacity (entries), LRU-bounded.
    pub cache_capacity: u64,
    /// API key for remote providers.
    pub api_key: Option<String>,
    /// Endpoint override (remote) or local server URL.
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Simple,
            model: defaults::DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout_ms: defaults::DEFAULT_EMBEDDING_TIMEOUT_MS,
            max_retries: defaults::DEFAULT_EMBEDDING_MAX_RETRIES,
            cache_ttl_ms: defaults::DEFAULT_EMBEDDING_CACHE_TTL_MS,
            cache_capacity: defaults::DEFAULT_EMBEDDING_CACHE_CAPACITY,
            api_key: None,
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    pub(crate) fn apply_env(&mut self) {
        if let Some(p) = super::env_string("EMBEDDING_PROVIDER") {
            self.provider = EmbeddingProviderKind::parse(&p);
        }
        if let Some(m) = super::env_string("EMBEDDING_MODEL") {
            self.model = m;
        }
        if let Some(d) = super::env_parse("EMBEDDING_DIMENSIONS") {
            self.dimensions = d;
        }
        if let Some(t) = super::env_parse("EMBEDDING_TIMEOUT") {
            self.timeout_ms = t;
        }
        if let Some(r) = super::env_parse("EMBEDDING_MAX_RETRIES") {
            self.max_retries = r;
        }
        if let Some(t) = super::env_parse("EMBEDDING_CACHE_TTL") {
            self.cache_ttl_ms = t;
        }
        if let Some(k) = super::env_string("EMBEDDING_API_KEY") {
            self.api_key = Some(k);
        }
        if let Some(e) = super::env_string("EMBEDDING_ENDPOINT") {
            self.endpoint = Some(e);
        }
    }
}
