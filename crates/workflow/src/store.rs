//! Durable task file: a pretty-printed JSON array of `ScheduledTask`.
//!
//! Writes go to a dotted temp file next to the target and are renamed over
//! it, so a crash mid-write leaves the previous file intact. A missing or
//! unparsable file loads as an empty task set.

use apexclaw_core::error::StoreError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::task::ScheduledTask;

#[derive(Debug, Clone)]
pub struct HeartbeatStore {
    path: PathBuf,
}

impl HeartbeatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all tasks. Never fails: problems are logged and yield `[]`.
    pub fn load(&self) -> Vec<ScheduledTask> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No task file yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read task file");
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str(&content) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Task file is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the file's contents with `tasks`.
    pub fn save(&self, tasks: &[ScheduledTask]) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(tasks).map_err(|e| StoreError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
            }
        }

        let tmp_path = self.temp_path();
        let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| self.io_error(&tmp_path, e))?;
        tmp_file
            .write_all(json.as_bytes())
            .and_then(|()| tmp_file.sync_all())
            .map_err(|e| self.io_error(&tmp_path, e))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;
        debug!(path = %self.path.display(), count = tasks.len(), "Tasks persisted");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "heartbeat.json".into());
        self.path.with_file_name(format!(".{file_name}.tmp"))
    }

    fn io_error(&self, path: &Path, e: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn task(label: &str) -> ScheduledTask {
        ScheduledTask::new(label, "say pong", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .with_chat(100, 7)
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeartbeatStore::new(dir.path().join("heartbeat.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeartbeatStore::new(dir.path().join("nested/dir/heartbeat.json"));

        let tasks = vec![task("a"), task("b").with_repeat("daily")];
        store.save(&tasks).unwrap();

        assert_eq!(store.load(), tasks);
        // Pretty-printed and no temp file left behind.
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  {"));
        assert!(!dir.path().join("nested/dir/.heartbeat.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat.json");
        fs::write(&path, "[{not json").unwrap();
        assert!(HeartbeatStore::new(&path).load().is_empty());
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeartbeatStore::new(dir.path().join("heartbeat.json"));
        store.save(&[task("a"), task("b")]).unwrap();
        store.save(&[task("c")]).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "c");
    }
}
