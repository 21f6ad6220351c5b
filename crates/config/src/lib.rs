//! Configuration loading, validation, and management for ApexClaw.
//!
//! Loads configuration from `~/.apexclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.apexclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sender id allowed to run secure tools
    #[serde(default)]
    pub owner_id: String,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Heartbeat scheduler settings
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("owner_id", &self.owner_id)
            .field("agent", &self.agent)
            .field("heartbeat", &self.heartbeat)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// LLM calls allowed per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// History ceiling, system message included
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Upper bound for `set_deep_work`
    #[serde(default = "default_deep_work_ceiling")]
    pub deep_work_ceiling: u32,

    /// Deadline for an interactive run
    #[serde(default = "default_interactive_timeout")]
    pub interactive_timeout_secs: u64,

    /// Deadline installed after a context-blocking tool outlives the run's
    #[serde(default = "default_blocks_context_grace")]
    pub blocks_context_grace_secs: u64,

    /// Offset of the local clock stamped onto user messages (330 = +05:30)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_history() -> usize {
    60
}
fn default_deep_work_ceiling() -> u32 {
    50
}
fn default_interactive_timeout() -> u64 {
    12 * 60
}
fn default_blocks_context_grace() -> u64 {
    90
}
fn default_utc_offset_minutes() -> i32 {
    330
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_history: default_max_history(),
            deep_work_ceiling: default_deep_work_ceiling(),
            interactive_timeout_secs: default_interactive_timeout(),
            blocks_context_grace_secs: default_blocks_context_grace(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between scans of the task set
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Deadline for one fired task
    #[serde(default = "default_fire_timeout")]
    pub fire_timeout_secs: u64,

    /// Task file; defaults to `~/.apexclaw/heartbeat.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_tick_secs() -> u64 {
    15
}
fn default_fire_timeout() -> u64 {
    3 * 60
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_tick_secs(),
            fire_timeout_secs: default_fire_timeout(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Base commands the shell tool may run; empty allows all
    #[serde(default)]
    pub shell_allowlist: Vec<String>,
}

impl HeartbeatConfig {
    /// The configured task file, or the default under the config dir.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("heartbeat.json"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.apexclaw/config.toml).
    ///
    /// Also checks environment variables:
    /// - `APEXCLAW_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `APEXCLAW_MODEL`
    /// - `APEXCLAW_OWNER_ID`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("APEXCLAW_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("APEXCLAW_MODEL") {
            config.default_model = model;
        }

        if let Ok(owner) = std::env::var("APEXCLAW_OWNER_ID") {
            config.owner_id = owner;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".apexclaw")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.max_history < 2 {
            return Err(ConfigError::ValidationError(
                "agent.max_history must be at least 2".into(),
            ));
        }

        if self.agent.deep_work_ceiling > 50 {
            return Err(ConfigError::ValidationError(
                "agent.deep_work_ceiling must not exceed 50".into(),
            ));
        }

        if self.heartbeat.tick_secs == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat.tick_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            owner_id: String::new(),
            agent: AgentConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
