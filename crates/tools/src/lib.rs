//! Built-in tool implementations for ApexClaw.
//!
//! Tools give the agent the ability to interact with the world: run shell
//! commands, read files and check the clock. Scheduling tools live in the
//! runtime crate because they need the scheduler and the caller's context.

pub mod datetime;
pub mod file_read;
pub mod shell;

use apexclaw_core::tool::ToolRegistry;
use chrono::FixedOffset;

pub use datetime::DateTimeTool;
pub use file_read::FileReadTool;
pub use shell::ShellTool;

/// Register the built-in tools into `registry`.
///
/// Security defaults:
/// - Shell and file read are owner-only
/// - File read: sensitive paths (~/.ssh, /etc/shadow, etc.) are blocked
/// - An empty `shell_allowlist` allows every command
pub fn register_builtin(registry: &ToolRegistry, utc_offset: FixedOffset, shell_allowlist: Vec<String>) {
    registry.register(DateTimeTool::new(utc_offset).definition());
    registry.register(ShellTool::new(shell_allowlist).definition());
    registry.register(FileReadTool::new().definition());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tools_registered() {
        let registry = ToolRegistry::new();
        register_builtin(&registry, FixedOffset::east_opt(0).unwrap(), vec![]);
        assert_eq!(registry.names(), vec!["datetime", "file_read", "shell"]);

        let secure: Vec<_> = registry
            .list()
            .into_iter()
            .filter(|t| t.secure)
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(secure, vec!["file_read", "shell"]);
    }
}
