//! Local embedding server backend (Ollama-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use engram_core::config::EmbeddingConfig;
use engram_core::errors::{EmbeddingError, EngramResult};

use crate::provider::EmbeddingProvider;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

#[derive(Serialize)]
struct LocalEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LocalEmbedResponse {
    embedding: Vec<f32>,
}

/// Backend for a locally hosted embedding model behind an HTTP API.
/// No batch endpoint; batches loop over single requests.
pub struct LocalProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/embeddings", base.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&LocalEmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
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
            return Err(EmbeddingError::RequestFailed {
                reason: format!("local server returned {}", response.status()),
            }
            .into());
        }

        let parsed: LocalEmbedResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::RequestFailed {
                    reason: format!("JSON parse error: {e}"),
                })?;

        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider_id(&self) -> &str {
        "local"
    }
}
