//! Skill trait — the abstraction over agent capabilities.
//!
//! A skill bundles one or more tools behind a single `execute` entry point.
//! Coded skills (shell, file operations, web search) implement behavior
//! directly; instruction skills are filesystem packages surfaced through the
//! bridge skill's `load_skill` / `read_skill_file` tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name, unique across all loaded skills.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// The result of a tool execution.
///
/// Failures are data, not exceptions: a failed tool call carries
/// `success = false` and an error message, and the turn continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    /// Structured output (null on failure).
    pub output: serde_json::Value,

    /// Error message, present when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// Render the result as text for the LLM conversation.
    pub fn as_llm_text(&self) -> String {
        if self.success {
            match &self.output {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown"))
        }
    }
}

/// The capability contract every skill implements.
#[async_trait]
pub trait Skill: Send + Sync {
    /// The stable skill name (e.g. "shell", "file_ops").
    fn name(&self) -> &str;

    /// A description of what this skill provides.
    fn description(&self) -> &str;

    /// The tools this skill exposes.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute one of this skill's tools. Unknown tool names return a failed
    /// result rather than panicking; the registry routes by name so this is
    /// a defect guard, not a user-facing path.
    async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_has_no_error() {
        let result = ToolResult::ok(serde_json::json!({"answer": 42}));
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.output["answer"], 42);
    }

    #[test]
    fn fail_result_carries_message() {
        let result = ToolResult::fail("it broke");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("it broke"));
        assert!(result.output.is_null());
    }

    #[test]
    fn llm_text_rendering() {
        assert_eq!(ToolResult::ok("plain").as_llm_text(), "plain");
        assert_eq!(
            ToolResult::ok(serde_json::json!({"k": 1})).as_llm_text(),
            "{\"k\":1}"
        );
        assert_eq!(ToolResult::fail("nope").as_llm_text(), "Error: nope");
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" }
                },
                "required": ["command"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("run_command"));
        assert!(json.contains("required"));
    }
}
