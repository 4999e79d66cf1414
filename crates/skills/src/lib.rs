//! # PulseBot Skills
//!
//! The skill registry and tool executor: a uniform contract for coded
//! capabilities and filesystem-discovered instruction packages.
//!
//! Dispatch is an explicit mapping from tool name to the owning skill — no
//! per-call reflection. Tool names are unique across all loaded skills;
//! loading fails on a collision.

pub mod args;
pub mod bridge;
pub mod file_ops;
pub mod manifest;
pub mod shell;
pub mod web_search;

pub use bridge::BridgeSkill;
pub use file_ops::FileOpsSkill;
pub use manifest::{discover_skills, SkillManifest};
pub use shell::ShellSkill;
pub use web_search::WebSearchSkill;

use std::collections::HashMap;
use std::sync::Arc;

use pulsebot_config::Config;
use pulsebot_core::error::SkillError;
use pulsebot_core::skill::{Skill, ToolDefinition, ToolResult};
use tracing::{info, warn};

/// Executor-level backstop on any single tool invocation.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    tool_to_skill: HashMap<String, String>,
    tool_definitions: HashMap<String, ToolDefinition>,
    instruction_skills: Vec<SkillManifest>,
    tool_timeout_secs: u64,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            tool_to_skill: HashMap::new(),
            tool_definitions: HashMap::new(),
            instruction_skills: Vec::new(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// Register a skill and its tools. Fails on a tool-name collision.
    pub fn register(&mut self, skill: Arc<dyn Skill>) -> Result<(), SkillError> {
        let skill_name = skill.name().to_string();

        for tool in skill.tools() {
            if let Some(owner) = self.tool_to_skill.get(&tool.name) {
                return Err(SkillError::Collision {
                    tool_name: tool.name.clone(),
                    first: owner.clone(),
                    second: skill_name.clone(),
                });
            }
            self.tool_to_skill.insert(tool.name.clone(), skill_name.clone());
            self.tool_definitions.insert(tool.name.clone(), tool);
        }

        info!(
            skill = %skill_name,
            tools = ?skill.tools().iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            "Loaded skill"
        );
        self.skills.insert(skill_name, skill);
        Ok(())
    }

    /// Build the registry from configuration: builtin skills, then
    /// instruction-skill discovery and the bridge.
    pub fn from_config(config: &Config) -> Result<Self, SkillError> {
        let mut registry = Self::new().with_tool_timeout(config.skills.shell_timeout_seconds.max(
            DEFAULT_TOOL_TIMEOUT_SECS,
        ));

        for name in &config.skills.builtin {
            if config.skills.disabled_skills.contains(name) {
                continue;
            }
            match name.as_str() {
                "shell" => registry.register(Arc::new(ShellSkill::new(
                    config.skills.shell_timeout_seconds,
                    config.skills.shell_max_output,
                )))?,
                "file_ops" => registry.register(Arc::new(FileOpsSkill::new(
                    config.skills.file_base_path.clone(),
                    config.skills.allowed_extensions.clone(),
                )))?,
                "web_search" => {
                    let skill = match config.search.provider.as_str() {
                        "searxng" => WebSearchSkill::searxng(&config.search.url),
                        _ => WebSearchSkill::brave(
                            config.search.api_key.clone().unwrap_or_default(),
                        ),
                    };
                    registry.register(Arc::new(skill))?
                }
                other => warn!(skill = other, "Unknown builtin skill, skipping"),
            }
        }

        // Instruction skills plus the bridge, when any are discovered.
        if !config.skills.skill_dirs.is_empty() {
            let mut discovered = discover_skills(&config.skills.skill_dirs);
            discovered.retain(|m| !config.skills.disabled_skills.contains(&m.name));

            if !discovered.is_empty() {
                info!(
                    count = discovered.len(),
                    skills = ?discovered.iter().map(|m| m.name.clone()).collect::<Vec<_>>(),
                    "Discovered instruction skills"
                );
                registry.register(Arc::new(BridgeSkill::new(discovered.clone())))?;
                registry.instruction_skills = discovered;
            }
        }

        Ok(registry)
    }

    /// All tool definitions, sorted by name for deterministic prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tool_definitions.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tool_to_skill.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tool_to_skill.contains_key(tool_name)
    }

    /// The skill owning a tool.
    pub fn skill_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.tool_to_skill.get(tool_name).map(String::as_str)
    }

    pub fn instruction_skills(&self) -> &[SkillManifest] {
        &self.instruction_skills
    }

    /// Compact instruction-skill index for the system prompt; empty when
    /// none are discovered.
    pub fn skills_index(&self) -> String {
        if self.instruction_skills.is_empty() {
            return String::new();
        }

        let mut lines = vec![
            "## Available Skills".to_string(),
            "To use a skill, call the `load_skill` tool with the skill name to get its full instructions.\n".to_string(),
        ];
        for manifest in &self.instruction_skills {
            lines.push(format!("- **{}**: {}", manifest.name, manifest.description));
        }
        lines.join("\n")
    }

    /// Dispatch a tool call. Failures come back as data — an unknown tool,
    /// invalid arguments, a timeout, and a skill error all produce a failed
    /// [`ToolResult`]; the turn continues.
    pub async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult {
        let Some(skill_name) = self.tool_to_skill.get(tool_name) else {
            return ToolResult::fail(format!("unknown tool: {tool_name}"));
        };

        if let Some(definition) = self.tool_definitions.get(tool_name) {
            if let Err(reason) = args::validate_arguments(&definition.parameters, &arguments) {
                return ToolResult::fail(format!("invalid arguments: {reason}"));
            }
        }

        let Some(skill) = self.skills.get(skill_name) else {
            return ToolResult::fail(format!("unknown tool: {tool_name}"));
        };

        match tokio::time::timeout(
            std::time::Duration::from_secs(self.tool_timeout_secs),
            skill.execute(tool_name, arguments),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => ToolResult::fail(format!(
                "tool '{tool_name}' timed out after {}s",
                self.tool_timeout_secs
            )),
        }
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoSkill;

    #[async_trait]
    impl Skill for EchoSkill {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".into(),
                description: "Echo text".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }]
        }
        async fn execute(&self, _tool_name: &str, arguments: serde_json::Value) -> ToolResult {
            ToolResult::ok(arguments["text"].clone())
        }
    }

    struct SlowSkill;

    #[async_trait]
    impl Skill for SlowSkill {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "sleep_forever".into(),
                description: "Never returns".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }]
        }
        async fn execute(&self, _tool_name: &str, _arguments: serde_json::Value) -> ToolResult {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            ToolResult::ok("never")
        }
    }

    /// A second skill claiming the `echo` tool name.
    struct ImposterSkill;

    #[async_trait]
    impl Skill for ImposterSkill {
        fn name(&self) -> &str {
            "imposter"
        }
        fn description(&self) -> &str {
            "Also claims echo"
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".into(),
                description: "Conflicting echo".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }
        async fn execute(&self, _tool_name: &str, _arguments: serde_json::Value) -> ToolResult {
            ToolResult::ok("imposter")
        }
    }

    #[tokio::test]
    async fn register_and_execute() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill)).unwrap();

        assert!(registry.has_tool("echo"));
        assert_eq!(registry.skill_for_tool("echo"), Some("echo"));

        let result = registry
            .execute("echo", serde_json::json!({"text": "hello"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn unknown_tool_fails_as_data() {
        let registry = SkillRegistry::new();
        let result = registry.execute("nonexistent", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown tool: nonexistent"));
    }

    #[tokio::test]
    async fn invalid_arguments_block_dispatch() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill)).unwrap();

        let result = registry.execute("echo", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("invalid arguments"));

        let result = registry.execute("echo", serde_json::json!({"text": 9})).await;
        assert!(!result.success);
    }

    #[test]
    fn collision_fails_loading() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill)).unwrap();
        let err = registry.register(Arc::new(ImposterSkill)).unwrap_err();
        assert!(matches!(err, SkillError::Collision { .. }));
        assert!(err.to_string().contains("echo"));
    }

    #[tokio::test]
    async fn executor_timeout_fails_the_call() {
        let mut registry = SkillRegistry::new().with_tool_timeout(1);
        registry.register(Arc::new(SlowSkill)).unwrap();

        let result = registry
            .execute("sleep_forever", serde_json::json!({}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(SlowSkill)).unwrap();
        registry.register(Arc::new(EchoSkill)).unwrap();

        let defs = registry.definitions();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "sleep_forever");
    }

    #[test]
    fn from_config_loads_builtins() {
        let config = Config::default();
        let registry = SkillRegistry::from_config(&config).unwrap();
        for tool in ["run_command", "read_file", "write_file", "list_directory", "web_search"] {
            assert!(registry.has_tool(tool), "missing {tool}");
        }
        // No instruction skills configured → no bridge.
        assert!(!registry.has_tool("load_skill"));
        assert!(registry.skills_index().is_empty());
    }

    #[test]
    fn disabled_skills_are_skipped() {
        let mut config = Config::default();
        config.skills.disabled_skills = vec!["shell".into()];
        let registry = SkillRegistry::from_config(&config).unwrap();
        assert!(!registry.has_tool("run_command"));
        assert!(registry.has_tool("web_search"));
    }

    #[test]
    fn discovery_registers_bridge() {
        // One valid instruction skill → bridge tools appear.
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("timeplus-sql-guide");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            "---\nname: timeplus-sql-guide\ndescription: Streaming SQL help\n---\nGuide body\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.skills.skill_dirs = vec![tmp.path().to_string_lossy().to_string()];
        let registry = SkillRegistry::from_config(&config).unwrap();

        assert!(registry.has_tool("load_skill"));
        assert!(registry.has_tool("read_skill_file"));
        assert!(registry.skills_index().contains("timeplus-sql-guide"));
        assert_eq!(registry.instruction_skills().len(), 1);
    }
}
