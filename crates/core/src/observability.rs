//! Observability-log row types: one record per LLM call and per tool
//! invocation.
//!
//! These rows are best-effort telemetry; the agent loop never fails a turn
//! over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of an LLM provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmCallStatus {
    Success,
    Error,
    RateLimited,
    Timeout,
}

impl LlmCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
        }
    }
}

/// One row of the `llm_logs` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmLogRecord {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub session_id: String,

    pub model: String,

    pub provider: String,

    pub input_tokens: u32,

    pub output_tokens: u32,

    /// Always `input_tokens + output_tokens`.
    pub total_tokens: u32,

    /// Estimated cost in USD, never negative.
    pub estimated_cost: f64,

    pub latency_ms: u64,

    #[serde(default)]
    pub time_to_first_token_ms: u64,

    /// SHA-256 of the exact system prompt text (bucketing, not content).
    pub system_prompt_hash: String,

    /// First 200 chars of the latest user message.
    pub user_message_preview: String,

    /// First 200 chars of the assistant response.
    pub assistant_response_preview: String,

    /// Names of tools the model requested this call.
    #[serde(default)]
    pub tools_called: Vec<String>,

    pub tool_call_count: u32,

    pub status: LlmCallStatus,

    #[serde(default)]
    pub error_message: String,
}

impl LlmLogRecord {
    /// Start a record with generated id/timestamp; callers fill the rest.
    pub fn new(session_id: impl Into<String>, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            model: model.into(),
            provider: provider.into(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            estimated_cost: 0.0,
            latency_ms: 0,
            time_to_first_token_ms: 0,
            system_prompt_hash: String::new(),
            user_message_preview: String::new(),
            assistant_response_preview: String::new(),
            tools_called: Vec::new(),
            tool_call_count: 0,
            status: LlmCallStatus::Success,
            error_message: String::new(),
        }
    }
}

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Started,
    Success,
    Error,
}

impl ToolCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One row of the `tool_logs` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLogRecord {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub session_id: String,

    /// Id of the LLM-log row whose response requested this call.
    pub llm_request_id: String,

    pub tool_name: String,

    pub skill_name: String,

    /// Serialized tool arguments.
    pub arguments: String,

    pub status: ToolCallStatus,

    /// First 500 chars of the result.
    pub result_preview: String,

    #[serde(default)]
    pub error_message: String,

    pub duration_ms: u64,
}

impl ToolLogRecord {
    pub fn new(session_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            llm_request_id: String::new(),
            tool_name: tool_name.into(),
            skill_name: String::new(),
            arguments: String::new(),
            status: ToolCallStatus::Success,
            result_preview: String::new(),
            error_message: String::new(),
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_log_defaults() {
        let record = LlmLogRecord::new("s1", "claude-sonnet-4-20250514", "anthropic");
        assert_eq!(record.total_tokens, 0);
        assert_eq!(record.status, LlmCallStatus::Success);
        assert!(!record.id.is_empty());
    }

    #[test]
    fn status_labels() {
        assert_eq!(LlmCallStatus::RateLimited.as_str(), "rate_limited");
        assert_eq!(ToolCallStatus::Started.as_str(), "started");
    }
}
