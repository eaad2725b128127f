//! OpenAI-compatible remote backend with retry, exponential backoff, and
//! an availability latch that trips after retries are exhausted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use engram_core::config::EmbeddingConfig;
use engram_core::errors::{EmbeddingError, EngramResult};

use crate::provider::EmbeddingProvider;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Backoff for attempt `n` (1-based): 1s, 2s, 4s, … capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let millis = 1_000u64.saturating_mul(1u64 << (attempt - 1).min(16));
    Duration::from_millis(millis.min(10_000))
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Remote embedding backend speaking the OpenAI embeddings API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    max_retries: u32,
    available: AtomicBool,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            available: AtomicBool::new(true),
        }
    }

    async fn send_request(&self, texts: &[String]) -> EngramResult<Vec<Vec<f32>>> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .timeout(self.timeout)
            .send();

        let response = request.await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout {
                    millis: self.timeout.as_millis() as u64,
                }
            } else {
                EmbeddingError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RequestFailed {
                reason: format!("API returned {status}: {body}"),
            }
            .into());
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            EmbeddingError::RequestFailed {
                reason: format!("JSON parse error: {e}"),
            }
        })?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Issue a request with retry. Transient failures back off
    /// exponentially; exhausting retries trips the availability latch.
    async fn request_with_retry(&self, texts: &[String]) -> EngramResult<Vec<Vec<f32>>> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(EmbeddingError::ProviderUnavailable {
                provider: self.provider_id().to_string(),
            }
            .into());
        }

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            match self.send_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    warn!(attempt, error = %e, "embedding request failed");
                    last_err = Some(e);
                }
            }
        }

        self.available.store(false, Ordering::Relaxed);
        Err(last_err.unwrap_or_else(|| {
            EmbeddingError::RequestFailed {
                reason: "all retries exhausted".to_string(),
            }
            .into()
        }))
    }

    /// Reset availability after a config change or health check.
    pub fn reset_availability(&self) {
        self.available.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let batch = [text.to_string()];
        let mut out = self.request_with_retry(&batch).await?;
        out.pop().ok_or_else(|| {
            EmbeddingError::RequestFailed {
                reason: "empty response".to_string(),
            }
            .into()
        })
    }

    /// Native batch endpoint: one request for the whole slice.
    async fn embed_batch(&self, texts: &[String]) -> EngramResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_with_retry(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider_id(&self) -> &str {
        "openai"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}
