//! EmbeddingProvider trait — the abstraction over embedding backends.
//!
//! Callers treat vectors as opaque fixed-length arrays of `f32`. All vectors
//! within one deployment share a single dimensionality; mixing dimensions is
//! a configuration error detected by the memory manager.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// The embedding contract every backend implements.
///
/// Implementations: OpenAI, Ollama.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// A human-readable provider name (e.g. "openai", "ollama").
    fn provider_name(&self) -> &str;

    /// The configured embedding model.
    fn model(&self) -> &str;

    /// Vector dimensionality, once known. `None` until auto-discovered from
    /// the first embedding when not configured explicitly.
    fn dimensions(&self) -> Option<usize>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts, one vector per input.
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError>;
}
