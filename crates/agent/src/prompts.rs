//! System prompt assembly and the memory-extraction instruction.

use chrono::Utc;
use pulsebot_core::memory::MemoryHit;
use pulsebot_core::skill::ToolDefinition;

pub struct SystemPromptParams<'a> {
    pub agent_name: &'a str,
    pub custom_identity: &'a str,
    pub custom_instructions: &'a str,
    pub model_info: &'a str,
    pub user_name: &'a str,
    pub session_id: &'a str,
    pub channel_name: &'a str,
    pub tools: &'a [ToolDefinition],
    pub memories: &'a [MemoryHit],
    pub skills_index: &'a str,
}

/// Assemble the per-turn system prompt. Deterministic given the registry
/// state; rebuilt once per turn.
pub fn build_system_prompt(params: &SystemPromptParams<'_>) -> String {
    let identity = if params.custom_identity.is_empty() {
        "I am a helpful, friendly AI assistant."
    } else {
        params.custom_identity
    };

    let tools_list = if params.tools.is_empty() {
        "No tools are currently available.".to_string()
    } else {
        params
            .tools
            .iter()
            .map(|t| format!("- **{}**: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let memories = if params.memories.is_empty() {
        "No relevant memories found.".to_string()
    } else {
        params
            .memories
            .iter()
            .map(|hit| format!("- [{}] {}", hit.record.memory_type, hit.record.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let session_short = if params.session_id.is_empty() {
        "new"
    } else {
        &params.session_id[..params.session_id.len().min(8)]
    };

    let model_section = if params.model_info.is_empty() {
        String::new()
    } else {
        format!("\n## Model Configuration\n{}\n", params.model_info)
    };

    let skills_section = if params.skills_index.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", params.skills_index)
    };

    format!(
        "You are {agent_name}, a helpful AI assistant.\n\
         \n\
         ## Core Identity\n\
         {identity}\n\
         \n\
         ## Current Context\n\
         - Current time: {now}\n\
         - User: {user}\n\
         - Session: {session}\n\
         - Channel: {channel}\n\
         {model_section}\
         \n\
         ## Available Tools\n\
         {tools_list}\n\
         {skills_section}\
         \n\
         ## Relevant Memories\n\
         {memories}\n\
         \n\
         ## Guidelines\n\
         - Use tools when they help answer questions or complete tasks.\n\
         - If a tool fails, explain the error and try an alternative approach.\n\
         - Be concise but thorough; use markdown formatting when helpful.\n\
         - Confirm before taking irreversible actions.\n\
         \n\
         {custom_instructions}",
        agent_name = params.agent_name,
        identity = identity,
        now = Utc::now().to_rfc3339(),
        user = params.user_name,
        session = session_short,
        channel = params.channel_name,
        model_section = model_section,
        tools_list = tools_list,
        skills_section = skills_section,
        memories = memories,
        custom_instructions = params.custom_instructions,
    )
    .trim_end()
    .to_string()
}

/// The fixed instruction for post-turn memory extraction. The model must
/// answer with a bare JSON array.
pub fn memory_extraction_prompt() -> &'static str {
    "Review this conversation and extract any important facts, preferences, \
     or information worth remembering about the user.\n\
     \n\
     CRITICAL: Return ONLY a valid JSON array in this exact format:\n\
     [{\"type\": \"fact|preference|conversation_summary\", \"content\": \"...\", \"importance\": 0.0-1.0}]\n\
     \n\
     If nothing is worth remembering, return an empty array: []\n\
     \n\
     Be selective - only extract genuinely useful information like:\n\
     - User personal information (name, contact details, role, company)\n\
     - User preferences (communication style, interests, favorite tools)\n\
     - Important facts (projects they're working on, technical expertise)\n\
     - Scheduled reminders or commitments\n\
     \n\
     Do NOT extract greetings, transient information, or questions the user \
     asked (unless they reveal preferences).\n\
     \n\
     IMPORTANT: Respond with ONLY the JSON array. No other text, no \
     explanations, no markdown formatting."
}
