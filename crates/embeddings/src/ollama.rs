//! Ollama embedding provider — local inference over HTTP.
//!
//! Calls `/api/embeddings` per text; batch requests iterate since the
//! endpoint takes one prompt at a time.

use async_trait::async_trait;
use pulsebot_core::error::EmbeddingError;
use pulsebot_core::EmbeddingProvider;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

pub struct OllamaEmbeddings {
    host: String,
    model: String,
    configured_dimensions: Option<usize>,
    discovered_dimensions: OnceLock<usize>,
    timeout_seconds: u64,
    client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(
        host: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout_seconds: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            configured_dimensions: dimensions,
            discovered_dimensions: OnceLock::new(),
            timeout_seconds,
            client,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.configured_dimensions
            .or_else(|| self.discovered_dimensions.get().copied())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.host);

        debug!(model = %self.model, "Requesting Ollama embedding");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": text,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout_seconds)
                } else {
                    EmbeddingError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status_code: status,
                message,
            });
        }

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(EmbeddingError::Decode("empty embedding returned".into()));
        }

        let _ = self.discovered_dimensions.set(parsed.embedding.len());
        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_host() {
        let provider = OllamaEmbeddings::new("http://localhost:11434/", "all-minilm", None, 30);
        assert_eq!(provider.host, "http://localhost:11434");
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.dimensions(), None);
    }

    #[test]
    fn response_parsing() {
        let parsed: OllamaEmbeddingResponse =
            serde_json::from_str(r#"{"embedding": [0.5, -0.25, 1.0]}"#).unwrap();
        assert_eq!(parsed.embedding.len(), 3);
    }
}
