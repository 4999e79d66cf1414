//! Message-log row types and routing targets.
//!
//! A [`MessageRecord`] is one row of the `messages` stream — the single
//! communication channel between channels, the agent loop, and scheduled
//! producers. Everything a UI renders and everything the agent consumes is
//! one of these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of a message-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserInput,
    AgentResponse,
    /// Tool invocation status event, rendered live by UIs.
    ToolCall,
    ToolResult,
    Error,
    Heartbeat,
    ScheduledTask,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInput => "user_input",
            Self::AgentResponse => "agent_response",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::ScheduledTask => "scheduled_task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_input" => Some(Self::UserInput),
            "agent_response" => Some(Self::AgentResponse),
            "tool_call" => Some(Self::ToolCall),
            "tool_result" => Some(Self::ToolResult),
            "error" => Some(Self::Error),
            "heartbeat" => Some(Self::Heartbeat),
            "scheduled_task" => Some(Self::ScheduledTask),
            _ => None,
        }
    }

    /// The message types a conversation history exposes to the LLM.
    pub fn llm_visible() -> [MessageType; 4] {
        [
            Self::UserInput,
            Self::AgentResponse,
            Self::ToolCall,
            Self::ToolResult,
        ]
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message-log row is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The agent loop's inbox.
    Agent,
    /// A specific front-end channel (`channel:<name>`).
    Channel(String),
    /// Every consumer.
    Broadcast,
}

impl Target {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(Self::Agent),
            "broadcast" => Some(Self::Broadcast),
            other => other.strip_prefix("channel:").map(|n| Self::Channel(n.to_string())),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => f.write_str("agent"),
            Self::Channel(name) => write!(f, "channel:{name}"),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// One row of the `messages` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique row ID.
    pub id: String,

    /// Event time (UTC, millisecond resolution). Orders the conversation;
    /// ties within the same millisecond break by `id`.
    pub timestamp: DateTime<Utc>,

    /// Free-form origin tag (`cli`, `webchat`, `agent`, `system`, …).
    pub source: String,

    /// Destination tag: `agent`, `channel:<name>`, or `broadcast`.
    pub target: String,

    /// Groups a conversation.
    pub session_id: String,

    pub message_type: MessageType,

    /// Structured payload serialized as JSON text.
    pub content: String,

    #[serde(default)]
    pub user_id: String,

    /// Channel-specific data, serialized as JSON text.
    #[serde(default)]
    pub channel_metadata: String,

    /// -1 low, 0 normal, 1 high, 2 urgent.
    #[serde(default)]
    pub priority: i8,
}

impl MessageRecord {
    fn base(
        source: impl Into<String>,
        target: impl Into<String>,
        session_id: impl Into<String>,
        message_type: MessageType,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.into(),
            target: target.into(),
            session_id: session_id.into(),
            message_type,
            content: content.to_string(),
            user_id: String::new(),
            channel_metadata: String::new(),
            priority: 0,
        }
    }

    /// A user message addressed to the agent.
    pub fn user_input(
        source: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::base(
            source,
            Target::Agent.to_string(),
            session_id,
            MessageType::UserInput,
            serde_json::json!({ "text": text.into() }),
        )
    }

    /// The agent's final response, routed back to the originating channel.
    pub fn agent_response(
        channel: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::base(
            "agent",
            Target::Channel(channel.into()).to_string(),
            session_id,
            MessageType::AgentResponse,
            serde_json::json!({ "text": text.into() }),
        )
    }

    /// An error surfaced to the originating channel.
    pub fn error(
        channel: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut record = Self::base(
            "agent",
            Target::Channel(channel.into()).to_string(),
            session_id,
            MessageType::Error,
            serde_json::json!({ "message": message.into() }),
        );
        record.priority = 2;
        record
    }

    /// A status row the agent emits toward a channel (tool-call progress,
    /// tool results).
    pub fn channel_status(
        channel: impl Into<String>,
        session_id: impl Into<String>,
        message_type: MessageType,
        content: serde_json::Value,
    ) -> Self {
        Self::base(
            "agent",
            Target::Channel(channel.into()).to_string(),
            session_id,
            message_type,
            content,
        )
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_priority(mut self, priority: i8) -> Self {
        self.priority = priority;
        self
    }

    /// Parse the content payload. Raw non-JSON text degrades to `{"text": …}`.
    pub fn content_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.content)
            .unwrap_or_else(|_| serde_json::json!({ "text": self.content }))
    }

    /// The `text` field of the content payload, if any.
    pub fn text(&self) -> String {
        self.content_json()
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn target_parsed(&self) -> Option<Target> {
        Target::parse(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_routes_to_agent() {
        let msg = MessageRecord::user_input("cli", "s1", "hello");
        assert_eq!(msg.target, "agent");
        assert_eq!(msg.message_type, MessageType::UserInput);
        assert_eq!(msg.text(), "hello");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn agent_response_routes_to_channel() {
        let msg = MessageRecord::agent_response("cli", "s1", "hi there");
        assert_eq!(msg.target, "channel:cli");
        assert_eq!(msg.source, "agent");
        assert_eq!(msg.text(), "hi there");
    }

    #[test]
    fn error_is_urgent() {
        let msg = MessageRecord::error("webchat", "s1", "boom");
        assert_eq!(msg.priority, 2);
        assert_eq!(msg.content_json()["message"], "boom");
    }

    #[test]
    fn target_roundtrip() {
        assert_eq!(Target::parse("agent"), Some(Target::Agent));
        assert_eq!(
            Target::parse("channel:telegram"),
            Some(Target::Channel("telegram".into()))
        );
        assert_eq!(Target::parse("broadcast"), Some(Target::Broadcast));
        assert_eq!(Target::parse("nonsense"), None);
        assert_eq!(Target::Channel("cli".into()).to_string(), "channel:cli");
    }

    #[test]
    fn message_type_roundtrip() {
        for t in [
            MessageType::UserInput,
            MessageType::AgentResponse,
            MessageType::ToolCall,
            MessageType::ToolResult,
            MessageType::Error,
            MessageType::Heartbeat,
            MessageType::ScheduledTask,
        ] {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::parse("bogus"), None);
    }

    #[test]
    fn raw_text_content_degrades_gracefully() {
        let mut msg = MessageRecord::user_input("cli", "s1", "x");
        msg.content = "not json at all".into();
        assert_eq!(msg.text(), "not json at all");
    }
}
