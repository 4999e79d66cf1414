//! Shell command execution skill.
//!
//! Safety model: a block-list on the command's first token plus a scan for
//! dangerous composition patterns. Plugin sandboxing beyond this is out of
//! scope.

use async_trait::async_trait;
use pulsebot_core::skill::{Skill, ToolDefinition, ToolResult};
use tokio::process::Command;
use tracing::warn;

/// Commands blocked by their base name.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "mv", "dd", "mkfs", "fdisk", "shutdown", "reboot", "halt", "init", "sudo",
    "su", "chmod", "chown", "format", "del", "erase",
];

/// Composition patterns that smuggle blocked commands past the first-token
/// check.
const DANGEROUS_PATTERNS: &[&str] = &[
    "| rm", "| sudo", "; rm", "; sudo", "&& rm", "&& sudo", "$(rm", "$(sudo", "`rm", "`sudo",
    "> /dev/", "| dd",
];

pub struct ShellSkill {
    timeout_seconds: u64,
    max_output_length: usize,
    working_directory: Option<String>,
}

impl ShellSkill {
    pub fn new(timeout_seconds: u64, max_output_length: usize) -> Self {
        Self {
            timeout_seconds,
            max_output_length,
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Returns an error message when the command is not allowed to run.
    fn validate_command(command: &str) -> Option<String> {
        let first = command.split_whitespace().next()?;
        let base = first.rsplit('/').next().unwrap_or(first).to_lowercase();

        if BLOCKED_COMMANDS.contains(&base.as_str()) {
            return Some(format!("Command '{base}' is on the block-list"));
        }

        let lowered = command.to_lowercase();
        for pattern in DANGEROUS_PATTERNS {
            if lowered.contains(pattern) {
                return Some(format!("Command contains blocked pattern: {pattern}"));
            }
        }

        None
    }

    fn truncate(&self, s: String) -> String {
        if s.len() <= self.max_output_length {
            return s;
        }
        let mut cut = self.max_output_length;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n... (output truncated)", &s[..cut])
    }
}

#[async_trait]
impl Skill for ShellSkill {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute shell commands"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command and return its output. Use for tasks like listing files, checking system info, or running scripts.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        }]
    }

    async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult {
        if tool_name != "run_command" {
            return ToolResult::fail(format!("unknown tool: {tool_name}"));
        }

        let command = arguments["command"].as_str().unwrap_or_default();
        if command.is_empty() {
            return ToolResult::fail("Command is required");
        }

        if let Some(reason) = Self::validate_command(command) {
            return ToolResult::fail(reason);
        }

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let run = async {
            cmd.output()
                .await
                .map_err(|e| format!("Command execution failed: {e}"))
        };

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_seconds),
            run,
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::fail(e),
            Err(_) => {
                return ToolResult::fail(format!(
                    "Command timed out after {}s",
                    self.timeout_seconds
                ))
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = self.truncate(String::from_utf8_lossy(&output.stdout).to_string());
        let stderr = self.truncate(String::from_utf8_lossy(&output.stderr).to_string());

        if exit_code != 0 {
            let preview: String = command.chars().take(50).collect();
            warn!(command = %preview, exit_code, "Command returned non-zero exit code");
        }

        ToolResult::ok(serde_json::json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_commands_rejected() {
        for cmd in ["rm -rf /", "sudo apt install x", "mv a b", "/bin/rm file"] {
            assert!(
                ShellSkill::validate_command(cmd).is_some(),
                "{cmd} should be blocked"
            );
        }
    }

    #[test]
    fn dangerous_patterns_rejected() {
        for cmd in ["ls | rm -", "echo hi; sudo reboot", "cat x > /dev/sda"] {
            assert!(
                ShellSkill::validate_command(cmd).is_some(),
                "{cmd} should be blocked"
            );
        }
    }

    #[test]
    fn ordinary_commands_allowed() {
        for cmd in ["ls -la", "echo hello", "git status", "grep -r foo src"] {
            assert!(
                ShellSkill::validate_command(cmd).is_none(),
                "{cmd} should be allowed"
            );
        }
    }

    #[tokio::test]
    async fn blocked_command_fails_without_spawning() {
        // `rm -rf /` is refused with an error naming the block-list.
        let skill = ShellSkill::new(30, 10_000);
        let result = skill
            .execute("run_command", serde_json::json!({"command": "rm -rf /"}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("block-list"));
    }

    #[tokio::test]
    async fn echo_runs_and_captures_output() {
        let skill = ShellSkill::new(30, 10_000);
        let result = skill
            .execute("run_command", serde_json::json!({"command": "echo hello"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["exit_code"], 0);
        assert!(result.output["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_failed() {
        let skill = ShellSkill::new(30, 10_000);
        let result = skill
            .execute("run_command", serde_json::json!({"command": "false"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["exit_code"], 1);
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let skill = ShellSkill::new(1, 10_000);
        let result = skill
            .execute("run_command", serde_json::json!({"command": "sleep 5"}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn output_truncated_at_limit() {
        let skill = ShellSkill::new(30, 50);
        let result = skill
            .execute(
                "run_command",
                serde_json::json!({"command": "yes x | head -100"}),
            )
            .await;
        assert!(result.success);
        let stdout = result.output["stdout"].as_str().unwrap();
        assert!(stdout.contains("truncated"));
        assert!(stdout.len() < 200);
    }

    #[tokio::test]
    async fn empty_command_fails() {
        let skill = ShellSkill::new(30, 10_000);
        let result = skill.execute("run_command", serde_json::json!({})).await;
        assert!(!result.success);
    }
}
