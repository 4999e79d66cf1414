//! Bridge skill: exposes discovered instruction-skill packages to the LLM.
//!
//! Two tools: `load_skill` returns a package's full instructions,
//! `read_skill_file` returns one file from its `scripts/` or `references/`
//! subtree. Path validation runs before any filesystem access and rejects
//! absolute paths and any `..` component.

use async_trait::async_trait;
use pulsebot_core::skill::{Skill, ToolDefinition, ToolResult};
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::RwLock;
use tracing::warn;

use crate::manifest::{load_content, SkillContent, SkillManifest};

pub struct BridgeSkill {
    registry: HashMap<String, SkillManifest>,
    content_cache: RwLock<HashMap<String, SkillContent>>,
}

impl BridgeSkill {
    pub fn new(manifests: Vec<SkillManifest>) -> Self {
        Self {
            registry: manifests
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
            content_cache: RwLock::new(HashMap::new()),
        }
    }

    fn content_for(&self, manifest: &SkillManifest) -> Result<SkillContent, String> {
        if let Some(cached) = self.content_cache.read().unwrap().get(&manifest.name) {
            return Ok(cached.clone());
        }
        let content = load_content(manifest)
            .map_err(|e| format!("Failed to load skill '{}': {e}", manifest.name))?;
        self.content_cache
            .write()
            .unwrap()
            .insert(manifest.name.clone(), content.clone());
        Ok(content)
    }

    fn available_names(&self) -> String {
        let mut names: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        names.sort();
        names.join(", ")
    }

    async fn load_skill(&self, skill_name: &str) -> ToolResult {
        let Some(manifest) = self.registry.get(skill_name) else {
            return ToolResult::fail(format!(
                "Skill '{skill_name}' not found. Available skills: {}",
                self.available_names()
            ));
        };

        match self.content_for(manifest) {
            Ok(content) => ToolResult::ok(format_instructions(manifest, &content)),
            Err(e) => {
                warn!(skill = skill_name, error = %e, "Failed to load skill content");
                ToolResult::fail(e)
            }
        }
    }

    async fn read_skill_file(&self, skill_name: &str, file_path: &str) -> ToolResult {
        // Validate before any filesystem access.
        if let Err(reason) = validate_skill_path(file_path) {
            return ToolResult::fail(reason);
        }

        let Some(manifest) = self.registry.get(skill_name) else {
            return ToolResult::fail(format!("Skill '{skill_name}' not found."));
        };

        let relative = Path::new(file_path);
        let candidates: Vec<std::path::PathBuf> = match relative.components().next() {
            Some(Component::Normal(first))
                if first == "scripts" || first == "references" =>
            {
                vec![manifest.path.join(relative)]
            }
            // A bare file name is searched in both subtrees.
            _ => vec![
                manifest.path.join("scripts").join(relative),
                manifest.path.join("references").join(relative),
            ],
        };

        for candidate in &candidates {
            if candidate.is_file() {
                return match std::fs::read_to_string(candidate) {
                    Ok(content) => ToolResult::ok(content),
                    Err(e) => ToolResult::fail(format!("Failed to read file: {e}")),
                };
            }
        }

        let content = match self.content_for(manifest) {
            Ok(content) => content,
            Err(e) => return ToolResult::fail(e),
        };
        let mut available = content.scripts.clone();
        available.extend(content.references.clone());
        ToolResult::fail(format!(
            "File '{file_path}' not found in skill '{skill_name}'. Available files: {available:?}"
        ))
    }
}

/// Reject absolute paths and any `..` component. Only `scripts/` and
/// `references/` are reachable, enforced by the caller's join strategy.
fn validate_skill_path(file_path: &str) -> Result<(), String> {
    if file_path.is_empty() {
        return Err("file_path is required".into());
    }

    let path = Path::new(file_path);
    if path.is_absolute() {
        return Err(format!("invalid file_path '{file_path}': absolute paths are not allowed"));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(format!(
                    "invalid file_path '{file_path}': '..' components are not allowed"
                ));
            }
            Component::Normal(part) => {
                if part.to_string_lossy().contains("..") {
                    return Err(format!(
                        "invalid file_path '{file_path}': '..' components are not allowed"
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn format_instructions(manifest: &SkillManifest, content: &SkillContent) -> String {
    let mut parts = vec![format!("# Skill: {}\n", manifest.name)];
    parts.push(content.instructions.clone());

    if !content.references.is_empty() {
        parts.push("\n## Available References".into());
        for name in &content.references {
            parts.push(format!("- {name}"));
        }
    }
    if !content.scripts.is_empty() {
        parts.push("\n## Available Scripts".into());
        for name in &content.scripts {
            parts.push(format!("- {name}"));
        }
        parts.push("\nUse the read_skill_file tool to read any script or reference file.".into());
    }

    parts.join("\n")
}

#[async_trait]
impl Skill for BridgeSkill {
    fn name(&self) -> &str {
        "skill_bridge"
    }

    fn description(&self) -> &str {
        "Load and read instruction-skill packages"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "load_skill".into(),
                description: "Load the full instructions for a skill by name. Call this when a task matches a skill from the skill index.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "skill_name": {
                            "type": "string",
                            "description": "Name of the skill to load"
                        }
                    },
                    "required": ["skill_name"]
                }),
            },
            ToolDefinition {
                name: "read_skill_file".into(),
                description: "Read a file from a skill package's scripts/ or references/ directory.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "skill_name": {
                            "type": "string",
                            "description": "Name of the skill"
                        },
                        "file_path": {
                            "type": "string",
                            "description": "File to read (from scripts/ or references/)"
                        }
                    },
                    "required": ["skill_name", "file_path"]
                }),
            },
        ]
    }

    async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult {
        let skill_name = arguments["skill_name"].as_str().unwrap_or_default();
        match tool_name {
            "load_skill" => self.load_skill(skill_name).await,
            "read_skill_file" => {
                let file_path = arguments["file_path"].as_str().unwrap_or_default();
                self.read_skill_file(skill_name, file_path).await
            }
            other => ToolResult::fail(format!("unknown tool: {other}")),
        }
    }
}
