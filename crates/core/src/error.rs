//! Error types for the ApexClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ApexClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model transport errors ---
    #[error("model: {0}")]
    Model(#[from] ProviderError),

    // --- Messaging errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Scheduler errors ---
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    // --- Durable storage errors ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Whether this error is the model call running past its deadline.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Error::Model(e) if e.is_deadline())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_deadline(&self) -> bool {
        matches!(self, ProviderError::DeadlineExceeded)
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message delivery failed to {chat_id}: {reason}")]
    DeliveryFailed { chat_id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool \"{0}\"")]
    NotFound(String),

    #[error("Tool \"{tool_name}\" panicked: {reason}")]
    Panicked { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task label must not be empty")]
    EmptyLabel,

    #[error("run_at {0} is not a valid RFC3339 timestamp")]
    InvalidRunAt(String),

    #[error("run_at {0} is not in the future")]
    RunAtInPast(String),

    #[error("repeat {0} is too long an interval")]
    IntervalOutOfRange(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to encode tasks: {0}")]
    Encode(String),
}
