//! The agent reason/act loop.
//!
//! One long-lived task per agent identity tails the message log for inbox
//! rows and runs the bounded per-turn cycle: build context → call the LLM →
//! dispatch tool calls sequentially → emit the final response → extract
//! memories. Everything observable about a turn lands on the logs.

use std::sync::Arc;
use std::time::Instant;

use pulsebot_config::AgentConfig;
use pulsebot_core::error::{Error, ProviderError};
use pulsebot_core::event::{EventRecord, Severity};
use pulsebot_core::memory::MemoryCategory;
use pulsebot_core::message::{MessageRecord, MessageType};
use pulsebot_core::observability::{LlmCallStatus, LlmLogRecord, ToolCallStatus, ToolLogRecord};
use pulsebot_core::provider::{ChatMessage, ChatRequest, ChatResponse, ToolCallRequest};
use pulsebot_core::skill::ToolResult;
use pulsebot_core::stream::{SeekTo, TailFilter};
use pulsebot_core::{LlmProvider, StreamStore};
use pulsebot_memory::MemoryManager;
use pulsebot_providers::PricingTable;
use pulsebot_skills::SkillRegistry;
use tracing::{debug, error, info, warn};

use crate::context::{Context, ContextBuilder};
use crate::extract::parse_extraction;
use crate::observability::{
    sha256_hex, truncate, ObservabilityWriter, MESSAGE_PREVIEW_MAX, RESULT_PREVIEW_MAX,
};
use crate::prompts::memory_extraction_prompt;

const EMPTY_RESPONSE_FALLBACK: &str = "I'm not sure how to respond to that.";

const TRUNCATION_RESPONSE: &str = "I wasn't able to complete this task within the allowed \
     number of steps. Please try breaking your request into smaller parts.";

/// How many recent messages feed memory extraction.
const EXTRACTION_WINDOW: usize = 5;

/// Backoff before re-opening a lost tail.
const RECONNECT_DELAY_SECS: u64 = 2;

pub struct AgentLoop {
    store: Arc<dyn StreamStore>,
    provider: Arc<dyn LlmProvider>,
    skills: Arc<SkillRegistry>,
    memory: Option<Arc<MemoryManager>>,
    context_builder: ContextBuilder,
    observability: ObservabilityWriter,
    pricing: PricingTable,
    temperature: f32,
    max_tokens: u32,
    max_iterations: u32,
    memory_limit: usize,
}

impl AgentLoop {
    pub fn new(
        store: Arc<dyn StreamStore>,
        provider: Arc<dyn LlmProvider>,
        skills: Arc<SkillRegistry>,
        memory: Option<Arc<MemoryManager>>,
        config: &AgentConfig,
    ) -> Self {
        let model_info = format!(
            "Model: {}\nProvider: {}",
            provider.model(),
            provider.provider_name()
        );

        let mut context_builder = ContextBuilder::new(store.clone(), config.name.clone())
            .with_identity(
                config.custom_identity.clone(),
                config.custom_instructions.clone(),
            )
            .with_model_info(model_info)
            .with_skills_index(skills.skills_index());
        if let Some(memory) = &memory {
            context_builder = context_builder.with_memory(memory.clone());
        }

        Self {
            observability: ObservabilityWriter::new(store.clone()),
            store,
            provider,
            skills,
            memory,
            context_builder,
            pricing: PricingTable::with_defaults(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations,
            memory_limit: 10,
        }
    }

    /// Tail the inbox until `shutdown` fires. A lost tail is re-opened at
    /// `latest` after a short backoff; the in-flight turn always drains
    /// before shutdown takes effect.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("Agent loop starting");

        loop {
            let mut tail = match self
                .store
                .tail_messages(TailFilter::agent_inbox(), SeekTo::Latest)
                .await
            {
                Ok(tail) => tail,
                Err(e) => {
                    error!(error = %e, "Failed to open inbox tail, retrying");
                    self.observability
                        .log_event(EventRecord::new(
                            "tail_open_failed",
                            "agent",
                            Severity::Error,
                            serde_json::json!({"error": e.to_string()}),
                        ))
                        .await;
                    tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Agent loop shutting down");
                        return;
                    }
                    item = tail.recv() => match item {
                        Some(Ok(message)) => self.process_message(&message).await,
                        Some(Err(e)) => {
                            warn!(error = %e, "Inbox tail lost, reconnecting");
                            self.observability
                                .log_event(EventRecord::new(
                                    "stream_reconnect",
                                    "agent",
                                    Severity::Error,
                                    serde_json::json!({"error": e.to_string()}),
                                ))
                                .await;
                            break;
                        }
                        None => break,
                    }
                }
            }

            if *shutdown.borrow() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        }
    }

    /// Process one inbox row. Any error inside the turn is caught here,
    /// logged to the event stream, and surfaced to the originating channel;
    /// the loop continues.
    pub async fn process_message(&self, message: &MessageRecord) {
        let session_id = message.session_id.clone();
        debug!(
            session_id,
            message_type = %message.message_type,
            "Processing inbox message"
        );

        if let Err(e) = self.run_turn(message).await {
            error!(error = %e, session_id = %session_id, "Turn failed");

            self.observability
                .log_event(EventRecord::new(
                    "turn_failed",
                    "agent",
                    Severity::Error,
                    serde_json::json!({
                        "session_id": session_id,
                        "error": e.to_string(),
                    }),
                ))
                .await;

            let channel = channel_of(message);
            let error_row = MessageRecord::error(
                channel,
                &message.session_id,
                format!("Sorry, an error occurred while processing your request: {e}"),
            );
            if let Err(e) = self.store.append_message(error_row).await {
                error!(error = %e, "Failed to surface turn error to channel");
            }
        }
    }

    async fn run_turn(&self, message: &MessageRecord) -> Result<(), Error> {
        let session_id = &message.session_id;
        let channel = channel_of(message);
        let user_text = message.text();
        let user_name = if message.user_id.is_empty() {
            "User"
        } else {
            message.user_id.as_str()
        };

        let tools = self.skills.definitions();
        let mut context = self
            .context_builder
            .build(
                session_id,
                &user_text,
                &message.id,
                true,
                self.memory_limit,
                user_name,
                &channel,
                &tools,
            )
            .await;

        // Heartbeats and scheduled tasks carry structured content with no
        // `text` field; providers still need at least one message.
        if context.messages.is_empty() {
            context.messages.push(ChatMessage::user(message.content.clone()));
        }

        for iteration in 1..=self.max_iterations {
            debug!(session_id = %session_id, iteration, "Reason/act iteration");

            let request = ChatRequest {
                messages: context.messages.clone(),
                system: Some(context.system_prompt.clone()),
                tools: tools.clone(),
                temperature: self.temperature,
                max_tokens: Some(self.max_tokens),
            };

            let started = Instant::now();
            let result = self.provider.chat(request).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.log_failed_llm_call(session_id, &context, &user_text, latency_ms, &e)
                        .await;
                    self.store
                        .append_message(MessageRecord::error(
                            &channel,
                            session_id,
                            format!("The model request failed: {e}"),
                        ))
                        .await?;
                    return Ok(());
                }
            };

            let llm_request_id = self
                .log_llm_call(session_id, &context, &user_text, latency_ms, &response)
                .await;

            if !response.has_tool_calls() {
                let text = if response.content.is_empty() {
                    warn!(session_id = %session_id, "LLM returned empty response content");
                    EMPTY_RESPONSE_FALLBACK.to_string()
                } else {
                    response.content.clone()
                };

                self.store
                    .append_message(
                        MessageRecord::agent_response(&channel, session_id, &text)
                            .with_user_id(&message.user_id),
                    )
                    .await?;
                info!(session_id = %session_id, iterations = iteration, "Turn complete");

                self.extract_memories(session_id, &context).await;
                return Ok(());
            }

            // Tool calls run sequentially, in declaration order; the next
            // LLM call only happens after every result is appended.
            context.push_assistant_tool_calls(&response.content, response.tool_calls.clone());

            for call in &response.tool_calls {
                self.store
                    .append_message(tool_call_message(&channel, session_id, call))
                    .await?;

                let started = Instant::now();
                let result = self.skills.execute(&call.name, call.arguments.clone()).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                self.log_tool_call(session_id, &llm_request_id, call, &result, duration_ms)
                    .await;

                self.store
                    .append_message(tool_result_message(
                        &channel,
                        session_id,
                        call,
                        &result,
                        duration_ms,
                    ))
                    .await?;

                context.push_tool_result(&call.id, &result.as_llm_text());
            }
        }

        warn!(
            session_id = %session_id,
            iterations = self.max_iterations,
            "Iteration cap reached without convergence"
        );
        self.store
            .append_message(MessageRecord::agent_response(
                &channel,
                session_id,
                TRUNCATION_RESPONSE,
            ))
            .await?;
        self.observability
            .log_event(
                EventRecord::new(
                    "iteration_cap_reached",
                    "agent",
                    Severity::Warning,
                    serde_json::json!({
                        "session_id": session_id,
                        "iterations": self.max_iterations,
                    }),
                )
                .with_tags(vec!["agent".into()]),
            )
            .await;
        Ok(())
    }

    fn base_llm_record(
        &self,
        session_id: &str,
        context: &Context,
        user_text: &str,
        latency_ms: u64,
    ) -> LlmLogRecord {
        let mut record = LlmLogRecord::new(
            session_id,
            self.provider.model(),
            self.provider.provider_name(),
        );
        record.latency_ms = latency_ms;
        record.system_prompt_hash = sha256_hex(&context.system_prompt);
        record.user_message_preview = truncate(user_text, MESSAGE_PREVIEW_MAX);
        record
    }

    async fn log_llm_call(
        &self,
        session_id: &str,
        context: &Context,
        user_text: &str,
        latency_ms: u64,
        response: &ChatResponse,
    ) -> String {
        let mut record = self.base_llm_record(session_id, context, user_text, latency_ms);
        record.input_tokens = response.usage.input_tokens;
        record.output_tokens = response.usage.output_tokens;
        record.total_tokens = response.usage.total_tokens();
        record.estimated_cost = self.pricing.compute_cost(
            self.provider.model(),
            response.usage.input_tokens,
            response.usage.output_tokens,
        );
        record.assistant_response_preview = truncate(&response.content, MESSAGE_PREVIEW_MAX);
        record.tools_called = response.tool_calls.iter().map(|c| c.name.clone()).collect();
        record.tool_call_count = response.tool_calls.len() as u32;
        record.status = LlmCallStatus::Success;

        self.observability.log_llm_call(record).await
    }

    async fn log_failed_llm_call(
        &self,
        session_id: &str,
        context: &Context,
        user_text: &str,
        latency_ms: u64,
        error: &ProviderError,
    ) {
        let mut record = self.base_llm_record(session_id, context, user_text, latency_ms);
        record.status = match error {
            ProviderError::Timeout(_) => LlmCallStatus::Timeout,
            ProviderError::RateLimited { .. } => LlmCallStatus::RateLimited,
            _ => LlmCallStatus::Error,
        };
        record.error_message = error.to_string();
        self.observability.log_llm_call(record).await;

        self.observability
            .log_event(EventRecord::new(
                "llm_call_failed",
                "agent",
                Severity::Error,
                serde_json::json!({
                    "session_id": session_id,
                    "status": record_status(error),
                    "error": error.to_string(),
                }),
            ))
            .await;
    }

    async fn log_tool_call(
        &self,
        session_id: &str,
        llm_request_id: &str,
        call: &ToolCallRequest,
        result: &ToolResult,
        duration_ms: u64,
    ) {
        let mut record = ToolLogRecord::new(session_id, &call.name);
        record.llm_request_id = llm_request_id.to_string();
        record.skill_name = self
            .skills
            .skill_for_tool(&call.name)
            .unwrap_or_default()
            .to_string();
        record.arguments = call.arguments.to_string();
        record.status = if result.success {
            ToolCallStatus::Success
        } else {
            ToolCallStatus::Error
        };
        record.result_preview = truncate(&result.as_llm_text(), RESULT_PREVIEW_MAX);
        record.error_message = result.error.clone().unwrap_or_default();
        record.duration_ms = duration_ms;

        self.observability.log_tool_call(record).await;
    }

    /// After a successful final response, ask the LLM to extract memories
    /// from the recent conversation. Failures are swallowed and logged.
    async fn extract_memories(&self, session_id: &str, context: &Context) {
        let Some(memory) = &self.memory else {
            return;
        };
        if !memory.is_available() {
            debug!("Memory features not available, skipping extraction");
            return;
        }

        let recent: Vec<&ChatMessage> = context
            .messages
            .iter()
            .rev()
            .take(EXTRACTION_WINDOW)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let conversation = serde_json::to_string_pretty(&recent).unwrap_or_default();

        let request = ChatRequest::new(vec![ChatMessage::user(format!(
            "{}\n\nConversation:\n{}",
            memory_extraction_prompt(),
            conversation
        ))])
        .with_system("You are a memory extraction assistant. Be concise. Return only valid JSON.");

        let response = match self.provider.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Memory extraction call failed");
                return;
            }
        };

        let entries = parse_extraction(&response.content);
        if entries.is_empty() {
            debug!(session_id = %session_id, "No memories extracted");
            return;
        }

        let mut stored = 0usize;
        for entry in &entries {
            match memory
                .store(
                    &entry.content,
                    entry.memory_type,
                    MemoryCategory::General,
                    entry.importance,
                    session_id,
                    true,
                )
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!(error = %e, "Failed to store extracted memory"),
            }
        }
        info!(session_id = %session_id, stored, total = entries.len(), "Memory extraction complete");
    }
}

fn record_status(error: &ProviderError) -> &'static str {
    match error {
        ProviderError::Timeout(_) => "timeout",
        ProviderError::RateLimited { .. } => "rate_limited",
        _ => "error",
    }
}

fn channel_of(message: &MessageRecord) -> String {
    if message.source.is_empty() {
        "webchat".to_string()
    } else {
        message.source.clone()
    }
}

/// The `started` status event UIs render while a tool runs.
fn tool_call_message(channel: &str, session_id: &str, call: &ToolCallRequest) -> MessageRecord {
    MessageRecord::channel_status(
        channel,
        session_id,
        MessageType::ToolCall,
        serde_json::json!({
            "tool_call_id": call.id,
            "tool_name": call.name,
            "args_summary": summarize_arguments(&call.arguments),
            "status": "started",
        }),
    )
}

/// The completed result, carrying the terminal status for the same call id.
fn tool_result_message(
    channel: &str,
    session_id: &str,
    call: &ToolCallRequest,
    result: &ToolResult,
    duration_ms: u64,
) -> MessageRecord {
    let mut content = serde_json::json!({
        "tool_call_id": call.id,
        "tool_name": call.name,
        "status": if result.success { "success" } else { "error" },
        "success": result.success,
        "duration_ms": duration_ms,
        "output": truncate(&result.as_llm_text(), RESULT_PREVIEW_MAX),
    });
    if let Some(error) = &result.error {
        content["error"] = serde_json::json!(error);
    }

    MessageRecord::channel_status(channel, session_id, MessageType::ToolResult, content)
}

/// Compress tool arguments into a short human-readable label.
fn summarize_arguments(arguments: &serde_json::Value) -> String {
    let Some(map) = arguments.as_object() else {
        return String::new();
    };

    for key in ["command", "query", "path", "url", "file_path", "content"] {
        if let Some(value) = map.get(key).and_then(|v| v.as_str()) {
            return format!("{key}: {}", truncate(value, 60));
        }
    }

    map.iter()
        .next()
        .map(|(key, value)| format!("{key}: {}", truncate(&value.to_string(), 50)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulsebot_core::provider::Usage;
    use pulsebot_core::skill::{Skill, ToolDefinition};
    use pulsebot_stream::InMemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays a script of responses, then repeats its
    /// fallback forever.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
        fallback: Option<ChatResponse>,
    }

    fn text_response(content: &str, input: u32, output: u32) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            tool_calls: vec![],
            usage: Usage {
                input_tokens: input,
                output_tokens: output,
            },
            model: "mock-model".into(),
            stop_reason: Some("end_turn".into()),
        }
    }

    fn tool_response(id: &str, name: &str, arguments: serde_json::Value) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            model: "mock-model".into(),
            stop_reason: Some("tool_use".into()),
        }
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ChatResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
            }
        }

        fn with_fallback(mut self, fallback: ChatResponse) -> Self {
            self.fallback = Some(fallback);
            self
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock-model"
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            match &self.fallback {
                Some(fallback) => Ok(fallback.clone()),
                None => Ok(text_response("done", 1, 1)),
            }
        }
    }

    /// Minimal web_search stand-in returning three results.
    struct FakeSearchSkill;

    #[async_trait]
    impl Skill for FakeSearchSkill {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "Search the web"
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "web_search".into(),
                description: "Search the web".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "count": {"type": "integer"}
                    },
                    "required": ["query"]
                }),
            }]
        }
        async fn execute(&self, _tool_name: &str, _arguments: serde_json::Value) -> ToolResult {
            ToolResult::ok(serde_json::json!({
                "results": [
                    {"title": "One", "url": "https://one.example", "description": "first"},
                    {"title": "Two", "url": "https://two.example", "description": "second"},
                    {"title": "Three", "url": "https://three.example", "description": "third"}
                ]
            }))
        }
    }

    /// Tool used by the iteration-cap scenario.
    struct BusySkill;

    #[async_trait]
    impl Skill for BusySkill {
        fn name(&self) -> &str {
            "busy"
        }
        fn description(&self) -> &str {
            "Always has more work"
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "busy_tool".into(),
                description: "Does one step".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }]
        }
        async fn execute(&self, _tool_name: &str, _arguments: serde_json::Value) -> ToolResult {
            ToolResult::ok("step done")
        }
    }

    fn agent_with(
        store: Arc<InMemoryStore>,
        provider: ScriptedProvider,
        registry: SkillRegistry,
    ) -> AgentLoop {
        AgentLoop::new(
            store,
            Arc::new(provider),
            Arc::new(registry),
            None,
            &AgentConfig::default(),
        )
    }

    #[tokio::test]
    async fn happy_path_single_response() {
        // One user message, one response, one LLM-log row, no tools.
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![Ok(text_response("hi there", 5, 2))]);
        let agent = agent_with(store.clone(), provider, SkillRegistry::new());

        let input = MessageRecord::user_input("webchat", "s1", "hello");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let responses = store.messages_of_type(MessageType::AgentResponse);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].session_id, "s1");
        assert_eq!(responses[0].text(), "hi there");
        assert_eq!(responses[0].target, "channel:webchat");

        let llm_logs = store.llm_logs();
        assert_eq!(llm_logs.len(), 1);
        assert_eq!(llm_logs[0].tool_call_count, 0);
        assert_eq!(llm_logs[0].input_tokens, 5);
        assert_eq!(llm_logs[0].output_tokens, 2);
        assert_eq!(llm_logs[0].total_tokens, 7);
        assert!(llm_logs[0].estimated_cost >= 0.0);
        assert_eq!(llm_logs[0].system_prompt_hash.len(), 64);

        assert!(store.messages_of_type(MessageType::ToolCall).is_empty());
    }

    #[tokio::test]
    async fn one_tool_call_cycle() {
        // One tool round-trip, then the final response.
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response(
                "t1",
                "web_search",
                serde_json::json!({"query": "cats", "count": 3}),
            )),
            Ok(text_response("Here are three results about cats.", 20, 12)),
        ]);
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(FakeSearchSkill)).unwrap();
        let agent = agent_with(store.clone(), provider, registry);

        let input = MessageRecord::user_input("webchat", "s2", "search for cats");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let tool_calls = store.messages_of_type(MessageType::ToolCall);
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].content_json()["status"], "started");
        assert_eq!(tool_calls[0].content_json()["tool_call_id"], "t1");

        let tool_results = store.messages_of_type(MessageType::ToolResult);
        assert_eq!(tool_results.len(), 1);
        let result_content = tool_results[0].content_json();
        assert_eq!(result_content["success"], true);
        assert_eq!(result_content["tool_call_id"], "t1");

        let responses = store.messages_of_type(MessageType::AgentResponse);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].text().contains("three results"));

        let llm_logs = store.llm_logs();
        assert_eq!(llm_logs.len(), 2);
        assert_eq!(llm_logs[0].tool_call_count, 1);
        assert_eq!(llm_logs[0].tools_called, vec!["web_search"]);
        assert_eq!(llm_logs[1].tool_call_count, 0);

        let tool_logs = store.tool_logs();
        assert_eq!(tool_logs.len(), 1);
        assert_eq!(tool_logs[0].status, ToolCallStatus::Success);
        assert_eq!(tool_logs[0].llm_request_id, llm_logs[0].id);
        assert_eq!(tool_logs[0].skill_name, "web_search");
    }

    #[tokio::test]
    async fn blocked_shell_command_is_refused() {
        // `rm -rf /` produces a failed tool result naming the block-list,
        // then a normal explanatory response.
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response(
                "t1",
                "run_command",
                serde_json::json!({"command": "rm -rf /"}),
            )),
            Ok(text_response("I can't run that command.", 15, 8)),
        ]);
        let mut registry = SkillRegistry::new();
        registry
            .register(Arc::new(pulsebot_skills::ShellSkill::new(30, 10_000)))
            .unwrap();
        let agent = agent_with(store.clone(), provider, registry);

        let input = MessageRecord::user_input("cli", "s3", "run rm -rf /");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let tool_results = store.messages_of_type(MessageType::ToolResult);
        assert_eq!(tool_results.len(), 1);
        let content = tool_results[0].content_json();
        assert_eq!(content["success"], false);
        assert!(content["error"].as_str().unwrap().contains("block-list"));

        let responses = store.messages_of_type(MessageType::AgentResponse);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].text().contains("can't run"));

        let tool_logs = store.tool_logs();
        assert_eq!(tool_logs[0].status, ToolCallStatus::Error);
    }

    #[tokio::test]
    async fn iteration_cap_truncates_turn() {
        // The model always wants another tool call; after ten
        // iterations the turn truncates.
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![]).with_fallback(tool_response(
            "loop",
            "busy_tool",
            serde_json::json!({}),
        ));
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(BusySkill)).unwrap();
        let agent = agent_with(store.clone(), provider, registry);

        let input = MessageRecord::user_input("webchat", "s5", "do everything");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        assert_eq!(store.llm_logs().len(), 10);
        assert_eq!(store.messages_of_type(MessageType::ToolCall).len(), 10);
        assert_eq!(store.messages_of_type(MessageType::ToolResult).len(), 10);

        let responses = store.messages_of_type(MessageType::AgentResponse);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].text().contains("allowed"));

        let warnings: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].event_type, "iteration_cap_reached");
    }

    #[tokio::test]
    async fn provider_timeout_ends_turn_with_error() {
        let store = Arc::new(InMemoryStore::new());
        let provider =
            ScriptedProvider::new(vec![Err(ProviderError::Timeout("no response".into()))]);
        let agent = agent_with(store.clone(), provider, SkillRegistry::new());

        let input = MessageRecord::user_input("cli", "s6", "hello?");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let llm_logs = store.llm_logs();
        assert_eq!(llm_logs.len(), 1);
        assert_eq!(llm_logs[0].status, LlmCallStatus::Timeout);
        assert!(!llm_logs[0].error_message.is_empty());

        let errors = store.messages_of_type(MessageType::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].target, "channel:cli");

        assert!(store.messages_of_type(MessageType::AgentResponse).is_empty());
    }

    #[tokio::test]
    async fn rate_limit_logged_with_its_own_status() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        })]);
        let agent = agent_with(store.clone(), provider, SkillRegistry::new());

        let input = MessageRecord::user_input("cli", "s7", "hi");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        assert_eq!(store.llm_logs()[0].status, LlmCallStatus::RateLimited);
    }

    #[tokio::test]
    async fn unknown_tool_fails_and_turn_recovers() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("t1", "nonexistent_tool", serde_json::json!({}))),
            Ok(text_response("That tool doesn't exist.", 5, 5)),
        ]);
        let agent = agent_with(store.clone(), provider, SkillRegistry::new());

        let input = MessageRecord::user_input("cli", "s8", "use the magic tool");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let tool_results = store.messages_of_type(MessageType::ToolResult);
        assert_eq!(tool_results.len(), 1);
        let content = tool_results[0].content_json();
        assert_eq!(content["success"], false);
        assert!(content["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool: nonexistent_tool"));

        assert_eq!(store.messages_of_type(MessageType::AgentResponse).len(), 1);
    }

    #[tokio::test]
    async fn empty_final_content_gets_fallback() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![Ok(text_response("", 3, 0))]);
        let agent = agent_with(store.clone(), provider, SkillRegistry::new());

        let input = MessageRecord::user_input("cli", "s9", "…");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let responses = store.messages_of_type(MessageType::AgentResponse);
        assert_eq!(responses[0].text(), EMPTY_RESPONSE_FALLBACK);
    }

    #[tokio::test]
    async fn extraction_stores_memories() {
        use pulsebot_core::error::EmbeddingError;
        use pulsebot_core::EmbeddingProvider;

        struct FixedEmbeddings;

        #[async_trait]
        impl EmbeddingProvider for FixedEmbeddings {
            fn provider_name(&self) -> &str {
                "mock"
            }
            fn model(&self) -> &str {
                "mock-embed"
            }
            fn dimensions(&self) -> Option<usize> {
                Some(3)
            }
            async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
                let mut v = vec![0.0f32; 3];
                for (i, b) in text.bytes().enumerate() {
                    v[i % 3] += b as f32;
                }
                Ok(v)
            }
            async fn embed_batch(
                &self,
                texts: &[String],
            ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
                let mut out = Vec::new();
                for t in texts {
                    out.push(self.embed(t).await?);
                }
                Ok(out)
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let memory = Arc::new(MemoryManager::new(
            store.clone(),
            Some(Arc::new(FixedEmbeddings)),
            0.95,
        ));

        let provider = ScriptedProvider::new(vec![
            Ok(text_response("Nice to meet you, John!", 10, 6)),
            Ok(text_response(
                r#"[{"type": "fact", "content": "User's name is John Smith", "importance": 0.9}]"#,
                8,
                20,
            )),
        ]);

        let agent = AgentLoop::new(
            store.clone(),
            Arc::new(provider),
            Arc::new(SkillRegistry::new()),
            Some(memory),
            &AgentConfig::default(),
        );

        let input = MessageRecord::user_input("cli", "s10", "Hi, I'm John Smith");
        store.append_message(input.clone()).await.unwrap();
        agent.process_message(&input).await;

        let rows = store.memory_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "User's name is John Smith");
        assert_eq!(rows[0].source_session_id, "s10");
        // Extraction's sub-call is not an observability row; only the main
        // call is logged.
        assert_eq!(store.llm_logs().len(), 1);
    }

    #[tokio::test]
    async fn tail_driven_run_processes_input() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ScriptedProvider::new(vec![Ok(text_response("tailed reply", 4, 2))]);
        let agent = Arc::new(agent_with(store.clone(), provider, SkillRegistry::new()));

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let run_agent = agent.clone();
        let handle = tokio::spawn(async move { run_agent.run(shutdown_rx).await });

        // Give the tail a moment to attach, then feed the inbox.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        store
            .append_message(MessageRecord::user_input("cli", "s11", "are you there?"))
            .await
            .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if !store.messages_of_type(MessageType::AgentResponse).is_empty() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "no response before deadline");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
    }

    #[test]
    fn argument_summaries() {
        assert_eq!(
            summarize_arguments(&serde_json::json!({"command": "ls -la"})),
            "command: ls -la"
        );
        assert_eq!(
            summarize_arguments(&serde_json::json!({"query": "cats"})),
            "query: cats"
        );
        assert_eq!(summarize_arguments(&serde_json::json!({})), "");
        assert!(summarize_arguments(&serde_json::json!({"other": 3})).starts_with("other"));
    }
}
