//! OpenAI embedding provider.
//!
//! Calls `/v1/embeddings` with bearer auth. Batch requests send all inputs
//! in one call.

use async_trait::async_trait;
use pulsebot_core::error::EmbeddingError;
use pulsebot_core::EmbeddingProvider;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiEmbeddings {
    api_key: String,
    base_url: String,
    model: String,
    /// Dimensions from config; discovery fills the cell on first use.
    configured_dimensions: Option<usize>,
    discovered_dimensions: OnceLock<usize>,
    timeout_seconds: u64,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout_seconds: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: model.into(),
            configured_dimensions: dimensions,
            discovered_dimensions: OnceLock::new(),
            timeout_seconds,
            client,
        }
    }

    /// Custom base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        if let Some(dims) = self.configured_dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        debug!(model = %self.model, inputs = inputs.len(), "Requesting embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?;

        let mut data = parsed.data;
        // The API may reorder; index restores input order.
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        if let Some(first) = vectors.first() {
            let _ = self.discovered_dimensions.set(first.len());
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.configured_dimensions
            .or_else(|| self.discovered_dimensions.get().copied())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.request(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Decode("empty embeddings response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}
