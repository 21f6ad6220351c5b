//! The `Runtime`: one value owning the tool registry, sessions, per-sender
//! contexts, live progress and the heartbeat scheduler.

use apexclaw_agent::{
    ChunkCallback, ProgressSink, SessionFactory, SessionRegistry, SessionSettings, StreamMarker,
    is_control_chunk,
};
use apexclaw_config::AppConfig;
use apexclaw_core::context::{ContextMap, ContextStore};
use apexclaw_core::error::Error;
use apexclaw_core::messaging::MessagingOps;
use apexclaw_core::provider::LlmClient;
use apexclaw_core::run_context::RunContext;
use apexclaw_core::tool::ToolRegistry;
use apexclaw_workflow::{
    HeartbeatScheduler, HeartbeatStore, ScheduledTask, SchedulerSettings, TaskRunner,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inbound::{DispatchOutcome, InboundMessage};
use crate::tools;

pub struct Runtime {
    tools: Arc<ToolRegistry>,
    contexts: Arc<ContextStore>,
    sessions: Arc<SessionRegistry>,
    progress: Arc<ProgressSink>,
    scheduler: Arc<HeartbeatScheduler>,
    messaging: Arc<dyn MessagingOps>,
    owner_id: String,
    interactive_timeout: Duration,
    heartbeat_enabled: bool,
}

impl Runtime {
    /// Wire everything from `config`. All tools are registered before the
    /// first session exists, so every system prompt lists the full set.
    pub fn new(
        config: &AppConfig,
        client: Arc<dyn LlmClient>,
        messaging: Arc<dyn MessagingOps>,
    ) -> Arc<Self> {
        let settings = SessionSettings::from_config(config);

        let tool_registry = Arc::new(ToolRegistry::new());
        apexclaw_tools::register_builtin(
            &tool_registry,
            settings.utc_offset,
            config.tools.shell_allowlist.clone(),
        );

        let contexts = Arc::new(ContextStore::new());
        let scheduler = Arc::new(HeartbeatScheduler::load(
            HeartbeatStore::new(config.heartbeat.resolved_path()),
            SchedulerSettings::from_config(&config.heartbeat),
        ));

        let utc_offset = settings.utc_offset;
        let factory = SessionFactory::new(
            client,
            tool_registry.clone(),
            config.default_model.clone(),
            settings,
        );
        let sessions = Arc::new(SessionRegistry::new(factory));
        let progress = Arc::new(ProgressSink::new(
            Arc::downgrade(&sessions),
            contexts.clone(),
            messaging.clone(),
        ));

        tools::register(
            &tool_registry,
            &scheduler,
            &contexts,
            Arc::downgrade(&sessions),
            &progress,
            utc_offset,
        );
        info!(
            tools = tool_registry.len(),
            tasks = scheduler.len(),
            model = %config.default_model,
            "Runtime ready"
        );

        Arc::new(Self {
            tools: tool_registry,
            contexts,
            sessions,
            progress,
            scheduler,
            messaging,
            owner_id: config.owner_id.clone(),
            interactive_timeout: Duration::from_secs(config.agent.interactive_timeout_secs),
            heartbeat_enabled: config.heartbeat.enabled,
        })
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn contexts(&self) -> &Arc<ContextStore> {
        &self.contexts
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn progress(&self) -> &Arc<ProgressSink> {
        &self.progress
    }

    pub fn scheduler(&self) -> &Arc<HeartbeatScheduler> {
        &self.scheduler
    }

    /// Run one inbound message under the interactive deadline.
    pub async fn dispatch(&self, inbound: InboundMessage) -> Result<DispatchOutcome, Error> {
        let ctx = RunContext::with_timeout(self.interactive_timeout);
        self.dispatch_with(&ctx, inbound).await
    }

    /// Run one inbound message through the sender's session and deliver the
    /// reply. The sender's live progress message is removed afterwards,
    /// whatever the outcome.
    pub async fn dispatch_with(
        &self,
        ctx: &RunContext,
        inbound: InboundMessage,
    ) -> Result<DispatchOutcome, Error> {
        let sender_id = inbound.sender_id.clone();
        self.contexts
            .set(sender_id.clone(), inbound.context(&self.owner_id));
        let session = self.sessions.get_or_create(&sender_id);
        debug!(sender = %sender_id, telegram_id = inbound.telegram_id, "Dispatching message");

        let buffer = Arc::new(Mutex::new(String::new()));
        let on_chunk: ChunkCallback = {
            let buffer = buffer.clone();
            let sender_id = sender_id.clone();
            Arc::new(move |chunk: &str| {
                if is_control_chunk(chunk) {
                    if let Some(StreamMarker::ToolCall(name)) = StreamMarker::parse(chunk) {
                        debug!(sender = %sender_id, tool = %name, "Tool phase started");
                    }
                    return;
                }
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_str(chunk);
            })
        };

        let result = session
            .run_stream_with_files(ctx, &sender_id, &inbound.text, &inbound.files, on_chunk)
            .await;

        let outcome = match result {
            Ok(reply) => {
                let streamed =
                    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
                let outcome = match DispatchOutcome::from_reply(&reply) {
                    DispatchOutcome::Reply(_) if !streamed.is_empty() => {
                        DispatchOutcome::Reply(streamed)
                    }
                    outcome => outcome,
                };
                self.deliver(&inbound, &outcome).await.map(|()| outcome)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.progress.clear(&sender_id).await {
            warn!(sender = %sender_id, error = %e, "Failed to clear progress message");
        }
        if let Err(e) = &outcome {
            warn!(sender = %sender_id, error = %e, "Dispatch failed");
        }
        outcome
    }

    async fn deliver(
        &self,
        inbound: &InboundMessage,
        outcome: &DispatchOutcome,
    ) -> Result<(), Error> {
        let Some(text) = outcome.render() else {
            debug!(sender = %inbound.sender_id, "Empty reply, nothing to deliver");
            return Ok(());
        };
        self.messaging
            .deliver(inbound.telegram_id, inbound.reply_to(), &text)
            .await?;
        Ok(())
    }

    /// Drop the session's history back to its system prompt.
    pub fn reset_session(&self, key: &str) -> bool {
        match self.sessions.get(key) {
            Some(session) => {
                session.reset();
                true
            }
            None => false,
        }
    }

    /// Forget the session entirely; the next message starts a new one.
    pub fn delete_session(&self, key: &str) -> bool {
        self.contexts.remove(key);
        self.sessions.delete(key)
    }

    /// Start the heartbeat tick loop, unless disabled in config.
    pub fn start_scheduler(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.heartbeat_enabled {
            info!("Heartbeat scheduler disabled");
            return None;
        }
        let runner: Arc<dyn TaskRunner> = self.clone();
        Some(
            self.scheduler
                .clone()
                .start(runner, self.messaging.clone(), shutdown),
        )
    }
}

/// A fired task runs in a fresh session registered under its run key until
/// `finish_task`. Secure tools answer only when the owner scheduled it.
#[async_trait]
impl TaskRunner for Runtime {
    async fn run_task(
        &self,
        run_key: &str,
        task: &ScheduledTask,
        ctx: &RunContext,
    ) -> Result<String, Error> {
        self.contexts.set(
            run_key,
            ContextMap {
                telegram_id: task.telegram_id,
                sender_id: task.owner_id.clone(),
                owner_id: self.owner_id.clone(),
                message_id: task.message_id,
                group_id: (task.group_id != 0).then_some(task.group_id),
                chat_type: "heartbeat".into(),
                ..ContextMap::default()
            },
        );

        let by_owner = !self.owner_id.is_empty() && task.owner_id == self.owner_id;
        let session = Arc::new(
            self.sessions
                .factory()
                .create_with_owner(if by_owner { run_key } else { "" }),
        );
        self.sessions.insert(run_key, session.clone());

        debug!(label = %task.label, run = %run_key, sender = %task.owner_id, "Running scheduled prompt");
        session.run(ctx, run_key, &task.prompt).await
    }

    async fn finish_task(&self, run_key: &str, task: &ScheduledTask) {
        if let Err(e) = self.progress.clear(run_key).await {
            warn!(label = %task.label, run = %run_key, error = %e, "Failed to clear progress message");
        }
        self.sessions.delete(run_key);
        self.contexts.remove(run_key);
    }
}
