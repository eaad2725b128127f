use async_trait::async_trait;

use engram_core::errors::EngramResult;

/// Result of an embedding request.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// Unit-norm vector of the service's configured dimension.
    pub embedding: Vec<f32>,
    /// Model that produced the vector; `"<model>-fallback"` when the
    /// deterministic fallback stood in for a failed backend.
    pub model: String,
    /// Whether this came from the cache.
    pub cached: bool,
}

/// A pluggable embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>>;

    /// Embed a batch. Backends with a native batch endpoint override
    /// this; the default loops.
    async fn embed_batch(&self, texts: &[String]) -> EngramResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Native output dimensionality of the backend.
    fn dimensions(&self) -> usize;

    /// Model identifier used in cache keys and result metadata.
    fn model_id(&self) -> &str;

    /// Provider identifier used in cache keys.
    fn provider_id(&self) -> &str;

    /// Whether the backend is currently usable. A provider may flip this
    /// off after exhausting retries.
    fn is_available(&self) -> bool {
        true
    }
}
