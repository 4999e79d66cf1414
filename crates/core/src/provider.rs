//! LlmProvider trait — the abstraction over chat-completion backends.
//!
//! A provider knows how to send a conversation (messages + system prompt +
//! tool catalog) to an LLM and return content, tool-call requests, and token
//! usage. The agent loop calls [`LlmProvider::chat`] without knowing which
//! backend is configured — pure polymorphism.
//!
//! Implementations: Anthropic native, OpenAI-compatible, Ollama.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::skill::ToolDefinition;

/// The role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of the LLM-facing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    pub content: String,

    /// Tool calls requested by the assistant (if any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message carrying tool-call requests.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the provider's tool-call id).
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Arguments as a JSON value.
    pub arguments: serde_json::Value,
}

/// A chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,

    /// System prompt, sent however the backend expects it.
    pub system: Option<String>,

    /// Tool catalog offered to the model.
    pub tools: Vec<ToolDefinition>,

    pub temperature: f32,

    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system: None,
            tools: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text; empty when the model only requested tools.
    pub content: String,

    /// Tool calls the model wants executed, in declaration order.
    pub tool_calls: Vec<ToolCallRequest>,

    pub usage: Usage,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    /// Why generation stopped, when the backend reports it.
    pub stop_reason: Option<String>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The chat-completion contract every LLM backend implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A human-readable provider name (e.g. "anthropic", "ollama").
    fn provider_name(&self) -> &str;

    /// The configured model identifier.
    fn model(&self) -> &str;

    /// Send a request and get a complete response.
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total() {
        let usage = Usage {
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(usage.total_tokens(), 150);
    }

    #[test]
    fn chat_message_constructors() {
        let msg = ChatMessage::tool_result("call_1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));

        let msg = ChatMessage::assistant_tool_calls(
            "",
            vec![ToolCallRequest {
                id: "t1".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({"query": "cats"}),
            }],
        );
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "web_search");
    }

    #[test]
    fn request_builder() {
        let req = ChatRequest::new(vec![ChatMessage::user("hello")])
            .with_system("be nice")
            .with_tools(vec![]);
        assert_eq!(req.system.as_deref(), Some("be nice"));
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn role_serialization_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }
}
