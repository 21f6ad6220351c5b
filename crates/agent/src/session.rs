//! The agent session: per-conversation history and the bounded tool loop.
//!
//! A run appends the user's message, then alternates model calls with tool
//! executions until the model answers without a tool call or the iteration
//! budget is spent. Runs on one session are serialized; history appends take
//! a short lock each, so `reset` and `history_len` can observe a run midway.

use apexclaw_config::AppConfig;
use apexclaw_core::error::{Error, ToolError};
use apexclaw_core::message::Message;
use apexclaw_core::provider::{FileAttachment, LlmClient};
use apexclaw_core::run_context::RunContext;
use apexclaw_core::tool::ToolRegistry;
use chrono::{FixedOffset, Offset, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::markers::StreamMarker;
use crate::parser::{self, ParsedToolCall};
use crate::prompt;

/// Prefix of the reply returned when the iteration budget runs out.
pub const MAX_ITERATIONS_PREFIX: &str = "[MAX_ITERATIONS]";

/// Reply returned when the iteration budget runs out.
pub const MAX_ITERATIONS_REPLY: &str = "[MAX_ITERATIONS] Max iterations reached.";

/// Callback receiving the final reply and out-of-band markers.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Knobs an `AgentSession` reads on every run.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// LLM calls allowed per run
    pub max_iterations: u32,

    /// History ceiling, system message included
    pub max_history: usize,

    /// Sender allowed to run secure tools
    pub owner_id: String,

    /// Upper bound for `set_deep_work`
    pub deep_work_ceiling: u32,

    /// Deadline installed when a context-blocking tool finds the run expired
    pub blocks_context_grace: Duration,

    /// Offset used for the `[Current time: ...]` stamp
    pub utc_offset: FixedOffset,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let utc_offset = FixedOffset::east_opt(config.agent.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Self {
            max_iterations: config.agent.max_iterations,
            max_history: config.agent.max_history,
            owner_id: config.owner_id.clone(),
            deep_work_ceiling: config.agent.deep_work_ceiling,
            blocks_context_grace: Duration::from_secs(config.agent.blocks_context_grace_secs),
            utc_offset,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }
}

#[derive(Debug, Default)]
struct DeepWork {
    budget: Option<u32>,
    plan: String,
}

/// One conversation with the model.
pub struct AgentSession {
    model_id: String,
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    settings: SessionSettings,

    history: Mutex<Vec<Message>>,

    /// Held for the whole of a run
    run_lock: tokio::sync::Mutex<()>,

    /// Set while a streaming run is in progress
    stream_callback: Mutex<Option<ChunkCallback>>,

    deep_work: Mutex<DeepWork>,
}

impl AgentSession {
    pub fn new(
        client: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        model_id: impl Into<String>,
        settings: SessionSettings,
    ) -> Self {
        let system = Message::system(prompt::build(&tools));
        Self {
            model_id: model_id.into(),
            client,
            tools,
            settings,
            history: Mutex::new(vec![system]),
            run_lock: tokio::sync::Mutex::new(()),
            stream_callback: Mutex::new(None),
            deep_work: Mutex::new(DeepWork::default()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Run to completion without streaming.
    pub async fn run(
        &self,
        ctx: &RunContext,
        sender_id: &str,
        user_text: &str,
    ) -> Result<String, Error> {
        self.run_inner(ctx, sender_id, user_text, &[], None).await
    }

    /// Run to completion, passing the final reply (and tool-phase markers)
    /// to `on_chunk`.
    pub async fn run_stream(
        &self,
        ctx: &RunContext,
        sender_id: &str,
        user_text: &str,
        on_chunk: ChunkCallback,
    ) -> Result<String, Error> {
        self.run_inner(ctx, sender_id, user_text, &[], Some(on_chunk))
            .await
    }

    /// Like `run_stream`, with `files` attached to the first model call.
    pub async fn run_stream_with_files(
        &self,
        ctx: &RunContext,
        sender_id: &str,
        user_text: &str,
        files: &[FileAttachment],
        on_chunk: ChunkCallback,
    ) -> Result<String, Error> {
        self.run_inner(ctx, sender_id, user_text, files, Some(on_chunk))
            .await
    }

    /// Replace history with a freshly built system prompt.
    pub fn reset(&self) {
        let system = Message::system(prompt::build(&self.tools));
        *self.lock_history() = vec![system];
        debug!(model = %self.model_id, "Session history reset");
    }

    pub fn history_len(&self) -> usize {
        self.lock_history().len()
    }

    /// A copy of the current history.
    pub fn history(&self) -> Vec<Message> {
        self.lock_history().clone()
    }

    /// Raise the iteration budget for the current run (or the next one when
    /// idle) to `max_steps`, capped at the configured ceiling. Returns the
    /// notice handed back to the model.
    pub fn set_deep_work(&self, max_steps: u32, plan: &str) -> String {
        let budget = max_steps
            .min(self.settings.deep_work_ceiling)
            .max(self.settings.max_iterations);

        let mut deep_work = self.deep_work.lock().unwrap_or_else(PoisonError::into_inner);
        deep_work.budget = Some(budget);
        deep_work.plan = plan.trim().to_string();

        info!(budget, "Deep work activated");
        if deep_work.plan.is_empty() {
            format!("Deep work mode active: up to {budget} steps for this task.")
        } else {
            format!(
                "Deep work mode active: up to {budget} steps for this task.\nPlan: {}",
                deep_work.plan
            )
        }
    }

    /// The iteration budget the next loop check will use.
    pub fn iteration_budget(&self) -> u32 {
        self.deep_work
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .budget
            .unwrap_or(self.settings.max_iterations)
    }

    /// Push a chunk to the active stream callback, if any.
    pub fn emit(&self, chunk: &str) {
        let callback = self
            .stream_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(chunk);
        }
    }

    #[cfg(test)]
    pub(crate) fn stream_callback_slot(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<ChunkCallback>> {
        self.stream_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_inner(
        &self,
        ctx: &RunContext,
        sender_id: &str,
        user_text: &str,
        files: &[FileAttachment],
        on_chunk: Option<ChunkCallback>,
    ) -> Result<String, Error> {
        let _run = self.run_lock.lock().await;
        *self
            .stream_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = on_chunk;

        let result = self.drive(ctx, sender_id, user_text, files).await;

        *self
            .stream_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self.deep_work.lock().unwrap_or_else(PoisonError::into_inner) = DeepWork::default();
        self.trim_history();

        result
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        sender_id: &str,
        user_text: &str,
        files: &[FileAttachment],
    ) -> Result<String, Error> {
        self.push(Message::user(self.timestamped(user_text)));

        let mut ctx = ctx.clone();
        let mut iteration = 0u32;

        while iteration < self.iteration_budget() {
            iteration += 1;
            let snapshot = self.history();

            debug!(iteration, model = %self.model_id, messages = snapshot.len(), "Calling model");

            let sent = if iteration == 1 && !files.is_empty() {
                ctx.run(
                    self.client
                        .send_with_files(&ctx, &self.model_id, &snapshot, files),
                )
                .await
            } else {
                ctx.run(self.client.send(&ctx, &self.model_id, &snapshot))
                    .await
            };

            let reply = match sent {
                Ok(reply) => reply,
                Err(e) if e.is_deadline() => {
                    warn!(iteration, "Model call hit the run deadline");
                    let reply = format!("[Timeout at iteration {iteration}]");
                    self.emit(&reply);
                    return Ok(reply);
                }
                Err(e) => return Err(Error::Model(e)),
            };

            let Some(call) = parser::parse_tool_call(&reply) else {
                let cleaned = parser::clean_reply(&reply);
                self.push(Message::assistant(cleaned.clone()));
                if !cleaned.is_empty() {
                    self.emit(&cleaned);
                }
                debug!(iteration, "Final reply produced");
                return Ok(cleaned);
            };

            self.push(Message::assistant(reply));
            self.emit(&StreamMarker::ToolCall(call.name.clone()).to_string());

            let (result, blocks_context) = self.invoke_tool(&call, sender_id).await;

            self.emit(&StreamMarker::ToolResult(call.name.clone()).to_string());
            self.push(Message::user(tool_result_message(&call.name, &result)));

            if blocks_context && ctx.is_expired() {
                info!(
                    tool = %call.name,
                    grace_secs = self.settings.blocks_context_grace.as_secs(),
                    "Run deadline passed during a blocking tool, renewing"
                );
                ctx = ctx.renewed(self.settings.blocks_context_grace);
            }
        }

        warn!(iterations = iteration, "Iteration budget exhausted");
        self.emit(MAX_ITERATIONS_REPLY);
        Ok(MAX_ITERATIONS_REPLY.to_string())
    }

    /// Resolve, authorize and execute one tool call. Returns the result text
    /// and whether the tool blocks the run context.
    async fn invoke_tool(&self, call: &ParsedToolCall, sender_id: &str) -> (String, bool) {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested unknown tool");
            let available = self.tools.names().join(", ");
            return (
                format!(
                    "Error: {}. Available tools: {available}",
                    ToolError::NotFound(call.name.clone())
                ),
                false,
            );
        };

        if tool.secure && !self.is_owner(sender_id) {
            warn!(tool = %call.name, sender = %sender_id, "Secure tool denied");
            return (
                format!(
                    "Access denied: tool \"{}\" is restricted to the bot owner.",
                    call.name
                ),
                false,
            );
        }

        debug!(tool = %call.name, args = %call.args_json(), "Executing tool");

        let outcome = AssertUnwindSafe(tool.execute(call.args.clone(), sender_id))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let err = ToolError::Panicked {
                    tool_name: call.name.clone(),
                    reason: panic_message(panic.as_ref()),
                };
                error!(tool = %call.name, error = %err, "Tool panicked");
                format!("Error: {err}")
            }
        };

        (result, tool.blocks_context)
    }

    fn is_owner(&self, sender_id: &str) -> bool {
        !self.settings.owner_id.is_empty() && sender_id == self.settings.owner_id
    }

    fn timestamped(&self, text: &str) -> String {
        let now = Utc::now().with_timezone(&self.settings.utc_offset);
        format!(
            "[Current time: {}]\n{text}",
            now.format("%Y-%m-%d %H:%M:%S %:z")
        )
    }

    fn push(&self, message: Message) {
        self.lock_history().push(message);
    }

    /// Keep the system message and the newest `max_history - 1` entries.
    fn trim_history(&self) {
        let max = self.settings.max_history.max(2);
        let mut history = self.lock_history();
        if history.len() > max {
            let excess = history.len() - max;
            history.drain(1..1 + excess);
            debug!(dropped = excess, "History trimmed");
        }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether a tool result reports a failure.
pub fn is_error_result(result: &str) -> bool {
    result.starts_with("Error:")
        || result.starts_with("{\"error\"")
        || result.contains("unknown tool")
}

/// The synthetic user message carrying a tool result back to the model.
pub fn tool_result_message(name: &str, result: &str) -> String {
    if is_error_result(result) {
        format!(
            "[Tool result: {name}]\n{result}\n\nThat approach failed. Try a different method or correct the arguments and retry."
        )
    } else {
        format!("[Tool result: {name}]\n{result}\n\nPlease continue.")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
