//! Shell tool — execute system commands.
//!
//! Owner-only. Supports command allowlisting and an internal timeout; the
//! agent loop does not cancel tools, so the child is killed here when the
//! timeout passes.

use apexclaw_core::tool::{Executor, ToolArgs, ToolDef, ToolHandler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_CHARS: usize = 16_000;

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    /// The registry entry: secure, and allowed to outlive the run deadline.
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "shell",
            "Execute a shell command and return stdout/stderr. Use this for running programs, checking files, git operations, etc.",
            Executor::Pure(Arc::new(self)),
        )
        .arg("command", "The shell command to execute")
        .optional_arg(
            "timeout_secs",
            "Seconds before the command is killed (default 60, max 600)",
        )
        .with_secure(true)
        .with_blocks_context(true)
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true; // No allowlist = all commands allowed
        }

        // Extract the base command (first word)
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();

        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl ToolHandler for ShellTool {
    async fn call(&self, args: ToolArgs) -> String {
        let Some(command) = args.get("command").map(|c| c.trim()).filter(|c| !c.is_empty()) else {
            return "Error: missing 'command' argument".into();
        };

        if !self.is_command_allowed(command) {
            return format!(
                "Error: command '{}' is not in the allowlist",
                command.split_whitespace().next().unwrap_or("")
            );
        }

        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|t| t.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return format!("Error: failed to start command: {e}"),
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return format!("Error: command timed out after {timeout_secs}s");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let result_text = if output.status.success() {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let trimmed = result_text.trim();
        if trimmed.is_empty() {
            return "(no output)".into();
        }
        truncate(trimmed, MAX_OUTPUT_CHARS)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[output truncated]", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &str) -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert("command".into(), command.into());
        args
    }

    #[test]
    fn allowlist_check() {
        let tool = ShellTool::new(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("cat file.txt"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
        assert!(!tool.is_command_allowed("sudo something"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let tool = ShellTool::new(vec![]);
        assert!(tool.is_command_allowed("anything goes"));
    }

    #[test]
    fn definition_is_secure_and_blocking() {
        let def = ShellTool::new(vec![]).definition();
        assert_eq!(def.name, "shell");
        assert!(def.secure);
        assert!(def.blocks_context);
        assert!(def.args.iter().any(|a| a.name == "command" && a.required));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo() {
        let tool = ShellTool::new(vec![]);
        let result = tool.call(args("echo hello")).await;
        assert_eq!(result, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let tool = ShellTool::new(vec![]);
        let result = tool.call(args("exit 3")).await;
        assert!(result.starts_with("[exit code: 3]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_command() {
        let tool = ShellTool::new(vec![]);
        let mut a = args("sleep 5");
        a.insert("timeout_secs".into(), "1".into());
        let result = tool.call(a).await;
        assert_eq!(result, "Error: command timed out after 1s");
    }

    #[tokio::test]
    async fn blocked_command() {
        let tool = ShellTool::new(vec!["ls".into()]);
        let result = tool.call(args("rm -rf /")).await;
        assert_eq!(result, "Error: command 'rm' is not in the allowlist");
    }

    #[tokio::test]
    async fn missing_command() {
        let tool = ShellTool::new(vec![]);
        assert!(tool.call(ToolArgs::new()).await.starts_with("Error:"));
    }
}
