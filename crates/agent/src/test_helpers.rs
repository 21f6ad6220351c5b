//! Shared test helpers for session tests.

use apexclaw_core::error::ProviderError;
use apexclaw_core::message::Message;
use apexclaw_core::provider::{FileAttachment, LlmClient};
use apexclaw_core::run_context::RunContext;
use std::sync::Mutex;

/// A client that returns a sequence of scripted replies.
///
/// Each call returns the next reply in the queue. In repeating mode the
/// single reply is returned forever. Panics if the script runs out.
pub struct ScriptedClient {
    replies: Vec<Result<String, ProviderError>>,
    repeat: bool,
    call_count: Mutex<usize>,
    file_counts: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn from_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies,
            repeat: false,
            call_count: Mutex::new(0),
            file_counts: Mutex::new(Vec::new()),
        }
    }

    /// A client that answers every call with `reply`.
    pub fn repeating(reply: &str) -> Self {
        Self {
            repeat: true,
            ..Self::new([reply])
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Number of files attached to each call, in call order.
    pub fn file_counts(&self) -> Vec<usize> {
        self.file_counts.lock().unwrap().clone()
    }

    fn next(&self, files: usize) -> Result<String, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        self.file_counts.lock().unwrap().push(files);

        let index = if self.repeat { 0 } else { *count };
        if index >= self.replies.len() {
            panic!(
                "ScriptedClient: no more replies (call #{}, have {})",
                *count,
                self.replies.len()
            );
        }

        *count += 1;
        self.replies[index].clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        _ctx: &RunContext,
        _model_id: &str,
        _history: &[Message],
    ) -> Result<String, ProviderError> {
        self.next(0)
    }

    async fn send_with_files(
        &self,
        _ctx: &RunContext,
        _model_id: &str,
        _history: &[Message],
        files: &[FileAttachment],
    ) -> Result<String, ProviderError> {
        self.next(files.len())
    }
}
