//! OpenAI-compatible provider implementation.
//!
//! Works against any `/v1/chat/completions` endpoint with bearer auth:
//! OpenAI itself and OpenAI-compatible gateways (NVIDIA's endpoint, for
//! example, differs only in base URL).

use async_trait::async_trait;
use pulsebot_core::error::ProviderError;
use pulsebot_core::provider::{
    ChatMessage, ChatRequest, ChatResponse, LlmProvider, Role, ToolCallRequest, Usage,
};
use pulsebot_core::skill::ToolDefinition;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert to wire messages. The system prompt travels as the first
    /// message with role `system`.
    fn to_api_messages(request: &ChatRequest) -> Vec<ApiMessage> {
        let mut result = Vec::new();

        if let Some(system) = &request.system {
            result.push(ApiMessage {
                role: "system".into(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            match msg.role {
                Role::System => result.push(ApiMessage {
                    role: "system".into(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                Role::User => result.push(ApiMessage {
                    role: "user".into(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                Role::Assistant => {
                    let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                        msg.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                kind: "function".into(),
                                function: ApiFunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect()
                    });
                    result.push(ApiMessage {
                        role: "assistant".into(),
                        content: (!msg.content.is_empty()).then(|| msg.content.clone()),
                        tool_calls,
                        tool_call_id: None,
                    });
                }
                Role::Tool => result.push(ApiMessage {
                    role: "tool".into(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: msg.tool_call_id.clone(),
                }),
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
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
            .collect()
    }

    fn to_chat_response(resp: CompletionResponse) -> Result<ChatResponse, ProviderError> {
        let choice = resp.choices.into_iter().next().ok_or(ProviderError::Api {
            status_code: 200,
            message: "response contained no choices".into(),
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                // Arguments arrive as a JSON-encoded string.
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: Usage {
                input_tokens: resp.usage.prompt_tokens,
                output_tokens: resp.usage.completion_tokens,
            },
            model: resp.model,
            stop_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request),
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(format!(
                "Invalid {} API key",
                self.name
            )));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Chat completion error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: CompletionResponse =
            response.json().await.map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse completion response: {e}"),
            })?;

        Self::to_chat_response(api_resp)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = OpenAiCompatProvider::new("openai", "sk-test", "gpt-4o");
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn nvidia_style_base_url() {
        let provider = OpenAiCompatProvider::new("nvidia", "nvapi-test", "moonshotai/kimi-k2.5")
            .with_base_url("https://integrate.api.nvidia.com/");
        assert_eq!(provider.base_url, "https://integrate.api.nvidia.com");
        assert_eq!(provider.provider_name(), "nvidia");
    }

    #[test]
    fn system_goes_first() {
        let request =
            ChatRequest::new(vec![ChatMessage::user("hi")]).with_system("you are terse");
        let api = OpenAiCompatProvider::to_api_messages(&request);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content.as_deref(), Some("you are terse"));
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments_as_string() {
        let request = ChatRequest::new(vec![ChatMessage::assistant_tool_calls(
            "",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({"query": "cats"}),
            }],
        )]);
        let api = OpenAiCompatProvider::to_api_messages(&request);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "web_search");
        assert!(calls[0].function.arguments.contains("\"query\""));
        // No content field when the assistant message is empty.
        assert!(api[0].content.is_none());
    }

    #[test]
    fn parse_text_response() {
        let raw = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"content": "hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(raw).unwrap();
        let chat = OpenAiCompatProvider::to_chat_response(resp).unwrap();
        assert_eq!(chat.content, "hi there");
        assert_eq!(chat.usage.total_tokens(), 7);
        assert!(chat.tool_calls.is_empty());
    }

    #[test]
    fn parse_tool_call_response() {
        let raw = r#"{
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "run_command", "arguments": "{\"command\":\"ls\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 12}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(raw).unwrap();
        let chat = OpenAiCompatProvider::to_chat_response(resp).unwrap();
        assert!(chat.content.is_empty());
        assert_eq!(chat.tool_calls[0].name, "run_command");
        assert_eq!(chat.tool_calls[0].arguments["command"], "ls");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let raw = r#"{"model": "gpt-4o", "choices": [], "usage": {"prompt_tokens": 1, "completion_tokens": 0}}"#;
        let resp: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(OpenAiCompatProvider::to_chat_response(resp).is_err());
    }
}
