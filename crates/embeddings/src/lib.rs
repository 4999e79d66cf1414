//! # PulseBot Embeddings
//!
//! Embedding providers behind the [`EmbeddingProvider`] contract. Vectors
//! are opaque fixed-length `f32` arrays; dimensionality is auto-discovered
//! from the first embedding when not configured.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbeddings;
pub use openai::OpenAiEmbeddings;

use std::sync::Arc;

use pulsebot_config::Config;
use pulsebot_core::EmbeddingProvider;
use tracing::warn;

/// Build the configured embedding provider, or `None` when memory is
/// disabled or the provider cannot be constructed (memory then degrades to
/// unavailable, it never blocks startup).
pub fn create_embedding_provider(config: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    if !config.memory.enabled {
        return None;
    }

    match config.memory.embedding_provider.as_str() {
        "openai" => match config.embedding_api_key() {
            Some(api_key) if !api_key.is_empty() => Some(Arc::new(OpenAiEmbeddings::new(
                api_key,
                &config.memory.embedding_model,
                config.memory.embedding_dimensions,
                config.memory.embedding_timeout_seconds,
            ))),
            _ => {
                warn!("OpenAI embedding provider configured but no API key available");
                None
            }
        },
        "ollama" => Some(Arc::new(OllamaEmbeddings::new(
            config.embedding_host(),
            &config.memory.embedding_model,
            config.memory.embedding_dimensions,
            config.memory.embedding_timeout_seconds,
        ))),
        other => {
            warn!(provider = other, "Unknown embedding provider");
            None
        }
    }
}
