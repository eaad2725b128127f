use async_trait::async_trait;

use engram_core::errors::EngramResult;

/// Text-completion interface consumed for optional LLM-augmented
/// extraction. Implemented by the platform's LLM client, outside this
/// crate; implementations are expected to enforce their own timeouts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> EngramResult<String>;
}
