//! Context builder: conversation history + relevant memories + system
//! prompt, assembled once per turn.

use std::sync::Arc;

use pulsebot_core::event::{EventRecord, Severity};
use pulsebot_core::memory::MemoryHit;
use pulsebot_core::message::{MessageRecord, MessageType};
use pulsebot_core::provider::{ChatMessage, ToolCallRequest};
use pulsebot_core::skill::ToolDefinition;
use pulsebot_core::StreamStore;
use pulsebot_memory::MemoryManager;
use tracing::{debug, warn};

use crate::prompts::{build_system_prompt, SystemPromptParams};

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Assembled context, ready for the provider.
pub struct Context {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub memories: Vec<MemoryHit>,
    pub session_id: String,
    pub channel: String,
}

impl Context {
    /// Record an assistant message carrying tool-call requests.
    pub fn push_assistant_tool_calls(&mut self, content: &str, calls: Vec<ToolCallRequest>) {
        self.messages
            .push(ChatMessage::assistant_tool_calls(content, calls));
    }

    /// Record a tool result so the next iteration sees it.
    pub fn push_tool_result(&mut self, tool_call_id: &str, content: &str) {
        self.messages
            .push(ChatMessage::tool_result(tool_call_id, content));
    }
}

pub struct ContextBuilder {
    store: Arc<dyn StreamStore>,
    memory: Option<Arc<MemoryManager>>,
    agent_name: String,
    custom_identity: String,
    custom_instructions: String,
    model_info: String,
    skills_index: String,
    history_limit: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn StreamStore>, agent_name: impl Into<String>) -> Self {
        Self {
            store,
            memory: None,
            agent_name: agent_name.into(),
            custom_identity: String::new(),
            custom_instructions: String::new(),
            model_info: String::new(),
            skills_index: String::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_memory(mut self, memory: Arc<MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_identity(
        mut self,
        custom_identity: impl Into<String>,
        custom_instructions: impl Into<String>,
    ) -> Self {
        self.custom_identity = custom_identity.into();
        self.custom_instructions = custom_instructions.into();
        self
    }

    pub fn with_model_info(mut self, model_info: impl Into<String>) -> Self {
        self.model_info = model_info.into();
        self
    }

    pub fn with_skills_index(mut self, skills_index: impl Into<String>) -> Self {
        self.skills_index = skills_index.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Build the context for one turn.
    ///
    /// `current_message_id` excludes the triggering row from the fetched
    /// history (it is re-appended as the final user message), so a turn sees
    /// itself exactly once regardless of read timing.
    pub async fn build(
        &self,
        session_id: &str,
        user_message: &str,
        current_message_id: &str,
        include_memory: bool,
        memory_limit: usize,
        user_name: &str,
        channel: &str,
        tools: &[ToolDefinition],
    ) -> Context {
        let history = match self
            .store
            .session_messages(session_id, &MessageType::llm_visible(), self.history_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, session_id, "Failed to fetch history, starting fresh");
                Vec::new()
            }
        };

        let memories = if include_memory && !user_message.is_empty() {
            self.relevant_memories(user_message, memory_limit).await
        } else {
            Vec::new()
        };

        let system_prompt = build_system_prompt(&SystemPromptParams {
            agent_name: &self.agent_name,
            custom_identity: &self.custom_identity,
            custom_instructions: &self.custom_instructions,
            model_info: &self.model_info,
            user_name,
            session_id,
            channel_name: channel,
            tools,
            memories: &memories,
            skills_index: &self.skills_index,
        });

        let mut messages = format_history(&history, current_message_id);
        if !user_message.is_empty() {
            messages.push(ChatMessage::user(user_message));
        }

        debug!(
            session_id,
            history = history.len(),
            memories = memories.len(),
            tools = tools.len(),
            "Built context"
        );

        Context {
            system_prompt,
            messages,
            memories,
            session_id: session_id.to_string(),
            channel: channel.to_string(),
        }
    }

    async fn relevant_memories(&self, query: &str, limit: usize) -> Vec<MemoryHit> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        if !memory.is_available() {
            return Vec::new();
        }

        match memory.search(query, limit, 0.0, None, None).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Memory search failed, continuing without memories");
                let event = EventRecord::new(
                    "memory_unavailable",
                    "context_builder",
                    Severity::Warning,
                    serde_json::json!({"error": e.to_string()}),
                );
                if let Err(e) = self.store.append_event(event).await {
                    warn!(error = %e, "Failed to record memory warning event");
                }
                Vec::new()
            }
        }
    }
}

/// Map log rows to LLM conversation messages. `tool_call` rows are UI
/// status events and are skipped.
fn format_history(history: &[MessageRecord], current_message_id: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    for row in history {
        if row.id == current_message_id {
            continue;
        }
        match row.message_type {
            MessageType::UserInput => messages.push(ChatMessage::user(row.text())),
            MessageType::AgentResponse => messages.push(ChatMessage::assistant(row.text())),
            MessageType::ToolResult => {
                let content = row.content_json();
                let tool_call_id = content
                    .get("tool_call_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&row.id)
                    .to_string();
                let text = content
                    .get("output")
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| row.content.clone());
                messages.push(ChatMessage::tool_result(tool_call_id, text));
            }
            _ => {}
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsebot_core::provider::Role;
    use pulsebot_core::StreamStore;
    use pulsebot_stream::InMemoryStore;

    #[tokio::test]
    async fn history_maps_to_roles() {
        let store = Arc::new(InMemoryStore::new());
        store
            .append_message(MessageRecord::user_input("cli", "s1", "first question"))
            .await
            .unwrap();
        store
            .append_message(MessageRecord::agent_response("cli", "s1", "first answer"))
            .await
            .unwrap();

        let current = MessageRecord::user_input("cli", "s1", "second question");
        store.append_message(current.clone()).await.unwrap();

        let builder = ContextBuilder::new(store, "PulseBot");
        let context = builder
            .build("s1", "second question", &current.id, false, 10, "User", "cli", &[])
            .await;

        assert_eq!(context.messages.len(), 3);
        assert_eq!(context.messages[0].role, Role::User);
        assert_eq!(context.messages[0].content, "first question");
        assert_eq!(context.messages[1].role, Role::Assistant);
        // Current message appears exactly once, at the end.
        assert_eq!(context.messages[2].content, "second question");
    }

    #[tokio::test]
    async fn tool_call_rows_skipped_tool_results_mapped() {
        let store = Arc::new(InMemoryStore::new());

        let mut status_row = MessageRecord::user_input("cli", "s1", "");
        status_row.message_type = MessageType::ToolCall;
        status_row.content = serde_json::json!({"tool_name": "web_search", "status": "started"})
            .to_string();
        store.append_message(status_row).await.unwrap();

        let mut result_row = MessageRecord::user_input("cli", "s1", "");
        result_row.message_type = MessageType::ToolResult;
        result_row.content = serde_json::json!({
            "tool_call_id": "t1",
            "output": "three results",
            "success": true
        })
        .to_string();
        store.append_message(result_row).await.unwrap();

        let builder = ContextBuilder::new(store, "PulseBot");
        let context = builder
            .build("s1", "", "none", false, 10, "User", "cli", &[])
            .await;

        assert_eq!(context.messages.len(), 1);
        assert_eq!(context.messages[0].role, Role::Tool);
        assert_eq!(context.messages[0].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(context.messages[0].content, "three results");
    }

    #[tokio::test]
    async fn system_prompt_reflects_tools() {
        let store = Arc::new(InMemoryStore::new());
        let builder = ContextBuilder::new(store, "PulseBot")
            .with_model_info("Model: test")
            .with_skills_index("## Available Skills\n- **guide**: help");

        let tools = vec![ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({}),
        }];
        let context = builder
            .build("s1", "hi", "none", false, 10, "User", "cli", &tools)
            .await;

        assert!(context.system_prompt.contains("run_command"));
        assert!(context.system_prompt.contains("Available Skills"));
        assert!(context.system_prompt.contains("Model: test"));
    }

    #[tokio::test]
    async fn empty_user_message_skips_memory_and_user_entry() {
        let store = Arc::new(InMemoryStore::new());
        let builder = ContextBuilder::new(store, "PulseBot");
        let context = builder
            .build("s1", "", "none", true, 10, "User", "cli", &[])
            .await;
        assert!(context.messages.is_empty());
        assert!(context.memories.is_empty());
    }
}
