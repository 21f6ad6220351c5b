//! File read tool — read file contents with path validation.

use apexclaw_core::tool::{Executor, ToolArgs, ToolDef, ToolHandler};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const MAX_BYTES: usize = 64 * 1024;

pub struct FileReadTool {
    /// Allowed root directories. Empty = allow all.
    pub allowed_roots: Vec<PathBuf>,
    /// Forbidden path prefixes.
    pub forbidden_paths: Vec<PathBuf>,
}

impl FileReadTool {
    /// Create a file read tool with the default forbidden paths.
    pub fn new() -> Self {
        let mut forbidden: Vec<PathBuf> = ["/etc/shadow", "/etc/sudoers", "/proc", "/sys"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            for dir in [".ssh", ".gnupg", ".aws"] {
                forbidden.push(home.join(dir));
            }
        }
        Self {
            allowed_roots: Vec::new(),
            forbidden_paths: forbidden,
        }
    }

    /// Create a file read tool with path restrictions.
    pub fn with_restrictions(allowed_roots: Vec<PathBuf>, forbidden_paths: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots,
            forbidden_paths,
        }
    }

    /// The registry entry. Owner-only.
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "file_read",
            "Read the contents of a file at the given path.",
            Executor::Pure(Arc::new(self)),
        )
        .arg("path", "The file path to read")
        .with_secure(true)
    }

    fn validate(&self, path: &Path) -> Result<(), String> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err("path must not contain '..'".into());
        }
        if self.forbidden_paths.iter().any(|f| path.starts_with(f)) {
            return Err(format!("access to {} is forbidden", path.display()));
        }
        if !self.allowed_roots.is_empty() && !self.allowed_roots.iter().any(|r| path.starts_with(r)) {
            return Err(format!("{} is outside the allowed directories", path.display()));
        }
        Ok(())
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn call(&self, args: ToolArgs) -> String {
        let Some(path) = args.get("path").map(|p| p.trim()).filter(|p| !p.is_empty()) else {
            return "Error: missing 'path' argument".into();
        };
        let path = Path::new(path);

        if let Err(reason) = self.validate(path) {
            return format!("Error: {reason}");
        }

        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.len() > MAX_BYTES => {
                let head = String::from_utf8_lossy(&bytes[..MAX_BYTES]);
                format!("{head}\n[truncated: {} of {} bytes shown]", MAX_BYTES, bytes.len())
            }
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("Error: failed to read file: {e}"),
        }
    }
}
