//! EmbeddingService — the main entry point for engram-embeddings.
//!
//! Coordinates cache lookup, the configured backend, dimension coercion,
//! and degradation to the deterministic fallback on terminal failure.

use std::time::Duration;

use tracing::{debug, warn};

use engram_core::config::EmbeddingConfig;
use engram_core::errors::EngramResult;

use crate::cache::EmbeddingCache;
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use crate::providers::{self, SimpleProvider};

/// The embedding service.
///
/// Never fails on text input: any terminal backend failure degrades to
/// the deterministic fallback, and the result's `model` says so.
pub struct EmbeddingService {
    primary: Box<dyn EmbeddingProvider>,
    fallback: SimpleProvider,
    cache: EmbeddingCache,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        let primary = providers::create_provider(&config);
        let fallback = SimpleProvider::new(config.dimensions);
        let cache = EmbeddingCache::new(
            config.cache_capacity,
            Duration::from_millis(config.cache_ttl_ms),
        );

        debug!(
            provider = primary.provider_id(),
            model = primary.model_id(),
            dims = config.dimensions,
            "embedding service initialized"
        );

        Self {
            primary,
            fallback,
            cache,
            config,
        }
    }

    /// Wire an explicit backend (tests, dependency injection).
    pub fn with_provider(config: EmbeddingConfig, primary: Box<dyn EmbeddingProvider>) -> Self {
        let fallback = SimpleProvider::new(config.dimensions);
        let cache = EmbeddingCache::new(
            config.cache_capacity,
            Duration::from_millis(config.cache_ttl_ms),
        );
        Self {
            primary,
            fallback,
            cache,
            config,
        }
    }

    /// Target dimensionality D.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Embed one text. `skip_cache` bypasses both lookup and insertion.
    pub async fn embed_text(&self, text: &str, skip_cache: bool) -> EngramResult<EmbeddingResult> {
        if text.is_empty() {
            // Callers treat empty text as an embedding-free record.
            return Ok(EmbeddingResult {
                embedding: vec![0.0; self.config.dimensions],
                model: self.primary.model_id().to_string(),
                cached: false,
            });
        }

        let key = EmbeddingCache::key(
            self.primary.provider_id(),
            self.primary.model_id(),
            text.as_bytes(),
        );

        if !skip_cache {
            if let Some(entry) = self.cache.get(&key) {
                debug!(counter = "memory.embedding.cache_hit", "embedding cache hit");
                return Ok(EmbeddingResult {
                    embedding: entry.embedding,
                    model: entry.model,
                    cached: true,
                });
            }
        }

        let (embedding, model) = match self.primary.embed(text).await {
            Ok(vec) => (
                self.coerce(vec),
                self.primary.model_id().to_string(),
            ),
            Err(e) => {
                warn!(error = %e, provider = self.primary.provider_id(), "degrading to fallback embedding");
                (
                    self.fallback.text_vector(text),
                    format!("{}-fallback", self.primary.model_id()),
                )
            }
        };

        if !skip_cache {
            self.cache.insert(key, embedding.clone(), model.clone());
        }

        Ok(EmbeddingResult {
            embedding,
            model,
            cached: false,
        })
    }

    /// Embed a batch, preferring the backend's batch endpoint for the
    /// cache misses. Order matches the input.
    pub async fn embed_batch(&self, texts: &[String]) -> EngramResult<Vec<EmbeddingResult>> {
        let mut results: Vec<Option<EmbeddingResult>> = vec![None; texts.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.is_empty() {
                results[i] = Some(EmbeddingResult {
                    embedding: vec![0.0; self.config.dimensions],
                    model: self.primary.model_id().to_string(),
                    cached: false,
                });
                continue;
            }
            let key = EmbeddingCache::key(
                self.primary.provider_id(),
                self.primary.model_id(),
                text.as_bytes(),
            );
            if let Some(entry) = self.cache.get(&key) {
                results[i] = Some(EmbeddingResult {
                    embedding: entry.embedding,
                    model: entry.model,
                    cached: true,
                });
            } else {
                miss_indices.push(i);
                miss_texts.push(text.clone());
            }
        }

        if !miss_texts.is_empty() {
            match self.primary.embed_batch(&miss_texts).await {
                Ok(vectors) => {
                    for (slot, vec) in miss_indices.iter().zip(vectors) {
                        let embedding = self.coerce(vec);
                        let model = self.primary.model_id().to_string();
                        let key = EmbeddingCache::key(
                            self.primary.provider_id(),
                            self.primary.model_id(),
                            texts[*slot].as_bytes(),
                        );
                        self.cache.insert(key, embedding.clone(), model.clone());
                        results[*slot] = Some(EmbeddingResult {
                            embedding,
                            model,
                            cached: false,
                        });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "batch embedding failed; degrading batch to fallback");
                    for slot in &miss_indices {
                        let embedding = self.fallback.text_vector(&texts[*slot]);
                        results[*slot] = Some(EmbeddingResult {
                            embedding,
                            model: format!("{}-fallback", self.primary.model_id()),
                            cached: false,
                        });
                    }
                }
            }
        }

        // Every slot was filled above.
        Ok(results.into_iter().flatten().collect())
    }

    /// Embed an image blob. Remote image models are not wired; the
    /// deterministic byte fallback serves every request, and results are
    /// cached under the same keying scheme.
    pub async fn embed_image(&self, bytes: &[u8]) -> EngramResult<EmbeddingResult> {
        let key = EmbeddingCache::key("simple", "simple-image", bytes);
        if let Some(entry) = self.cache.get(&key) {
            return Ok(EmbeddingResult {
                embedding: entry.embedding,
                model: entry.model,
                cached: true,
            });
        }

        let embedding = self.fallback.image_vector(bytes);
        self.cache
            .insert(key, embedding.clone(), "simple-image".to_string());
        Ok(EmbeddingResult {
            embedding,
            model: "simple-image".to_string(),
            cached: false,
        })
    }

    /// Coerce a backend vector to D by truncation or zero-padding, then
    /// re-normalize. Mismatches are logged.
    fn coerce(&self, mut vec: Vec<f32>) -> Vec<f32> {
        let d = self.config.dimensions;
        if vec.len() != d {
            warn!(
                expected = d,
                actual = vec.len(),
                "embedding dimension mismatch; coercing"
            );
            vec.resize(d, 0.0);
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}
