//! LLM client trait — the abstraction over the remote model service.
//!
//! The agent loop only needs plain-text completions: the tool protocol is
//! carried in the reply text itself, so a client is just "history in,
//! reply out", optionally with files attached to the newest user turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::run_context::RunContext;

/// A file sent alongside the user message on the first iteration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Original file name (informational)
    pub name: String,

    /// MIME type, e.g. `image/png`
    pub mime_type: String,

    /// Raw file bytes
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl FileAttachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// The client the agent session talks to.
///
/// The session races every call against its `RunContext`, so
/// implementations do not need to enforce the deadline themselves; the
/// context is passed through for clients that want to observe cancellation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send the conversation and return the model's reply text.
    async fn send(
        &self,
        ctx: &RunContext,
        model_id: &str,
        history: &[Message],
    ) -> Result<String, ProviderError>;

    /// Send the conversation with files attached to the latest user turn.
    ///
    /// Default implementation ignores the files.
    async fn send_with_files(
        &self,
        ctx: &RunContext,
        model_id: &str,
        history: &[Message],
        files: &[FileAttachment],
    ) -> Result<String, ProviderError> {
        if !files.is_empty() {
            tracing::debug!(
                client = %self.name(),
                count = files.len(),
                "Client does not support attachments, sending text only"
            );
        }
        self.send(ctx, model_id, history).await
    }
}
