//! Backend implementations and provider selection.

mod local;
mod openai;
mod simple;

pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use simple::SimpleProvider;

use tracing::warn;

use engram_core::config::{EmbeddingConfig, EmbeddingProviderKind};

use crate::provider::EmbeddingProvider;

/// Build the configured primary backend.
///
/// `anthropic` has no native embedding endpoint, so selecting it yields
/// the deterministic fallback directly; the degradation is logged once
/// here so operators can see it.
pub fn create_provider(config: &EmbeddingConfig) -> Box<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => Box::new(OpenAiProvider::new(config)),
        EmbeddingProviderKind::Local => Box::new(LocalProvider::new(config)),
        EmbeddingProviderKind::Anthropic => {
            warn!(
                provider = "anthropic",
                "no native embedding endpoint; using deterministic fallback"
            );
            Box::new(SimpleProvider::new(config.dimensions))
        }
        EmbeddingProviderKind::Simple => Box::new(SimpleProvider::new(config.dimensions)),
    }
}
