//! Ollama provider — local inference over the `/api/chat` endpoint.
//!
//! No authentication; tool calls come back as structured objects without
//! call ids, so ids are generated here.

use async_trait::async_trait;
use pulsebot_core::error::ProviderError;
use pulsebot_core::provider::{
    ChatMessage, ChatRequest, ChatResponse, LlmProvider, Role, ToolCallRequest, Usage,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct OllamaProvider {
    host: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    fn to_api_messages(request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut result = Vec::new();

        if let Some(system) = &request.system {
            result.push(serde_json::json!({"role": "system", "content": system}));
        }

        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            result.push(serde_json::json!({"role": role, "content": msg.content}));
        }

        result
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.host);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request),
            "stream": false,
            "options": {"temperature": request.temperature},
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        debug!(model = %self.model, "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(format!("no response after {REQUEST_TIMEOUT_SECS}s"))
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status,
                message,
            });
        }

        let api_resp: OllamaChatResponse =
            response.json().await.map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse Ollama response: {e}"),
            })?;

        let tool_calls = api_resp
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                // Ollama does not assign call ids; generate stable ones here.
                id: format!("ollama_{}", Uuid::new_v4()),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            content: api_resp.message.content,
            tool_calls,
            usage: Usage {
                input_tokens: api_resp.prompt_eval_count.unwrap_or(0),
                output_tokens: api_resp.eval_count.unwrap_or(0),
            },
            model: self.model.clone(),
            stop_reason: api_resp.done_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    arguments: serde_json::Value,
}
