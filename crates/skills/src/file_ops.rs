//! File operations skill: read, write, and list under a configured base
//! path.
//!
//! Path confinement is lexical: the candidate path is joined to the base and
//! normalized component-wise; anything that ends up outside the base is
//! rejected before any filesystem access.

use async_trait::async_trait;
use pulsebot_core::skill::{Skill, ToolDefinition, ToolResult};
use std::path::{Component, Path, PathBuf};

pub struct FileOpsSkill {
    base_path: PathBuf,
    /// Extension allow-list enforced on writes. Empty = all extensions.
    allowed_extensions: Vec<String>,
}

impl FileOpsSkill {
    pub fn new(base_path: impl Into<PathBuf>, allowed_extensions: Vec<String>) -> Self {
        let base: PathBuf = base_path.into();
        // Canonicalize when possible so confinement checks use the real base.
        let base_path = base.canonicalize().unwrap_or_else(|_| normalize(&base));
        Self {
            base_path,
            allowed_extensions,
        }
    }

    /// Resolve a user-supplied path against the base, rejecting escapes.
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        if raw.is_empty() {
            return Err("path is required".into());
        }

        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_path.join(candidate)
        };

        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.base_path) {
            return Err(format!("path '{raw}' escapes the base directory"));
        }
        Ok(normalized)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.allowed_extensions.iter().any(|a| a == ext))
            .unwrap_or(false)
    }

    async fn read_file(&self, args: &serde_json::Value) -> ToolResult {
        let raw = args["path"].as_str().unwrap_or_default();
        let path = match self.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolResult::ok(serde_json::json!({"path": raw, "content": content})),
            Err(e) => ToolResult::fail(format!("Failed to read file: {e}")),
        }
    }

    async fn write_file(&self, args: &serde_json::Value) -> ToolResult {
        let raw = args["path"].as_str().unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();
        let append = args["append"].as_bool().unwrap_or(false);

        let path = match self.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };

        if !self.extension_allowed(&path) {
            return ToolResult::fail(format!("File extension not allowed for '{raw}'"));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::fail(format!("Failed to create parent directory: {e}"));
            }
        }

        let result = if append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&path, content).await
        };

        match result {
            Ok(()) => ToolResult::ok(serde_json::json!({
                "path": raw,
                "bytes_written": content.len(),
            })),
            Err(e) => ToolResult::fail(format!("Failed to write file: {e}")),
        }
    }

    async fn list_directory(&self, args: &serde_json::Value) -> ToolResult {
        let raw = args["path"].as_str().unwrap_or(".");
        let path = match self.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };

        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) => return ToolResult::fail(format!("Failed to list directory: {e}")),
        };

        let mut items = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let size = if is_dir {
                serde_json::Value::Null
            } else {
                entry
                    .metadata()
                    .await
                    .map(|m| serde_json::json!(m.len()))
                    .unwrap_or(serde_json::Value::Null)
            };
            items.push(serde_json::json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if is_dir { "directory" } else { "file" },
                "size": size,
            }));
        }

        ToolResult::ok(serde_json::json!({"path": raw, "items": items}))
    }
}

/// Lexical normalization: resolve `.` and `..` without touching the
/// filesystem. `..` past the root is clamped, which keeps escapes visible to
/// the prefix check.
fn normalize(path: &Path) -> PathBuf {
    let mut stack: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => prefix.push(std::path::MAIN_SEPARATOR_STR),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop();
            }
            Component::Normal(part) => stack.push(part.to_os_string()),
        }
    }

    let mut result = prefix;
    for part in stack {
        result.push(part);
    }
    result
}

#[async_trait]
impl Skill for FileOpsSkill {
    fn name(&self) -> &str {
        "file_ops"
    }

    fn description(&self) -> &str {
        "Read, write, and list files"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "read_file".into(),
                description: "Read the contents of a file".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file (relative to the base path)"
                        }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "write_file".into(),
                description: "Write content to a file (creates it if missing)".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file (relative to the base path)"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write"
                        },
                        "append": {
                            "type": "boolean",
                            "description": "Append instead of overwriting",
                            "default": false
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
            ToolDefinition {
                name: "list_directory".into(),
                description: "List files and directories in a path".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory path (relative to the base path)",
                            "default": "."
                        }
                    }
                }),
            },
        ]
    }

    async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult {
        match tool_name {
            "read_file" => self.read_file(&arguments).await,
            "write_file" => self.write_file(&arguments).await,
            "list_directory" => self.list_directory(&arguments).await,
            other => ToolResult::fail(format!("unknown tool: {other}")),
        }
    }
}
