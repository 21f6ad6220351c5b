//! Tools that need the runtime: scheduling, deep work and live progress.

use apexclaw_agent::{ProgressSink, SessionRegistry};
use apexclaw_core::context::{ContextMap, ContextStore};
use apexclaw_core::error::ToolError;
use apexclaw_core::tool::{ContextualToolHandler, Executor, ToolArgs, ToolDef, ToolRegistry};
use apexclaw_workflow::{HeartbeatScheduler, ScheduledTask};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Register the runtime-backed tools into `registry`.
pub fn register(
    registry: &ToolRegistry,
    scheduler: &Arc<HeartbeatScheduler>,
    contexts: &Arc<ContextStore>,
    sessions: Weak<SessionRegistry>,
    progress: &Arc<ProgressSink>,
    utc_offset: FixedOffset,
) {
    registry.register(
        ScheduleTaskTool {
            scheduler: scheduler.clone(),
            contexts: contexts.clone(),
            utc_offset,
        }
        .definition(),
    );
    registry.register(
        CancelTaskTool {
            scheduler: scheduler.clone(),
            contexts: contexts.clone(),
        }
        .definition(),
    );
    registry.register(
        ListTasksTool {
            scheduler: scheduler.clone(),
            contexts: contexts.clone(),
        }
        .definition(),
    );
    registry.register(DeepWorkTool { sessions }.definition());
    registry.register(
        ReportProgressTool {
            progress: progress.clone(),
        }
        .definition(),
    );
}

/// Schedule a prompt to be replayed later, optionally on repeat.
pub struct ScheduleTaskTool {
    scheduler: Arc<HeartbeatScheduler>,
    contexts: Arc<ContextStore>,
    utc_offset: FixedOffset,
}

impl ScheduleTaskTool {
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "schedule_task",
            "Schedule a prompt to run later. The reply is sent to this chat. Reusing a label replaces that task.",
            Executor::Contextual(Arc::new(self)),
        )
        .arg("label", "Short unique name for the task")
        .arg("prompt", "What to do when the task fires, written as an instruction to yourself")
        .optional_arg("run_at", "RFC3339 time of the first run, e.g. 2026-03-01T09:00:00+05:30")
        .optional_arg("in_minutes", "Run this many minutes from now (instead of run_at)")
        .optional_arg(
            "repeat",
            "once (default), minutely, hourly, daily, weekly or every_N_minutes/hours/days",
        )
    }

    fn schedule(&self, args: &ToolArgs, sender_id: &str, now: DateTime<Utc>) -> String {
        let label = args.get("label").map(|s| s.trim()).unwrap_or_default();
        let Some(prompt) = args.get("prompt").map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return invalid_args("missing 'prompt'");
        };

        let run_at = match resolve_run_at(args, now) {
            Ok(run_at) => run_at,
            Err(message) => return format!("Error: {message}"),
        };

        let context = self.contexts.get(sender_id).unwrap_or_default();
        let owner = caller(&context, sender_id);
        let repeat = args.get("repeat").map(|s| s.trim()).unwrap_or_default();
        let task = ScheduledTask::new(label, prompt, run_at)
            .with_repeat(repeat)
            .with_owner(owner)
            .with_chat(context.telegram_id, context.message_id)
            .with_group(context.group_id.unwrap_or_default());

        match self.scheduler.schedule_at(task, now) {
            Ok(task) => {
                info!(
                    label = %task.label,
                    run_at = %task.run_at,
                    sender = %owner,
                    "Task scheduled via tool"
                );
                let local = run_at
                    .with_timezone(&self.utc_offset)
                    .format("%Y-%m-%d %H:%M %:z");
                let cadence = if task.is_recurring() {
                    format!("repeats {}", task.repeat)
                } else {
                    "once".to_string()
                };
                format!("Scheduled \"{}\" for {local} ({cadence}).", task.label)
            }
            Err(e) => format!("Error: {e}"),
        }
    }
}

fn resolve_run_at(args: &ToolArgs, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    if let Some(minutes) = args.get("in_minutes").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        return match minutes.parse::<i64>() {
            Ok(m) if m > 0 => Ok(now + TimeDelta::minutes(m)),
            _ => Err(format!("in_minutes must be a positive whole number, got \"{minutes}\"")),
        };
    }

    let Some(run_at) = args.get("run_at").map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Err("provide run_at or in_minutes".into());
    };
    DateTime::parse_from_rfc3339(run_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            format!("run_at \"{run_at}\" is not an RFC3339 timestamp like 2026-03-01T09:00:00+05:30")
        })
}

#[async_trait]
impl ContextualToolHandler for ScheduleTaskTool {
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String {
        self.schedule(&args, sender_id, Utc::now())
    }
}

fn invalid_args(reason: &str) -> String {
    format!("Error: {}", ToolError::InvalidArguments(reason.into()))
}

/// The sender a run acts for. Scheduled runs carry the scheduling sender
/// in their context.
fn caller<'a>(context: &'a ContextMap, sender_id: &'a str) -> &'a str {
    if context.sender_id.is_empty() {
        sender_id
    } else {
        &context.sender_id
    }
}

/// Which tasks `sender_id` may see and cancel: all of them for the owner,
/// otherwise only their own.
fn task_scope(contexts: &ContextStore, sender_id: &str) -> Option<String> {
    let context = contexts.get(sender_id).unwrap_or_default();
    if context.is_owner() {
        None
    } else {
        Some(caller(&context, sender_id).to_string())
    }
}

pub struct CancelTaskTool {
    scheduler: Arc<HeartbeatScheduler>,
    contexts: Arc<ContextStore>,
}

impl CancelTaskTool {
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "cancel_task",
            "Cancel one of your scheduled tasks by label or id.",
            Executor::Contextual(Arc::new(self)),
        )
        .arg("label", "Label or id of the task to cancel")
    }
}

#[async_trait]
impl ContextualToolHandler for CancelTaskTool {
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String {
        let Some(label) = args.get("label").map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return invalid_args("missing 'label'");
        };
        let scope = task_scope(&self.contexts, sender_id);
        if self.scheduler.cancel_for(label, scope.as_deref()) {
            format!("Cancelled \"{label}\".")
        } else {
            format!("Error: no scheduled task named \"{label}\".")
        }
    }
}

pub struct ListTasksTool {
    scheduler: Arc<HeartbeatScheduler>,
    contexts: Arc<ContextStore>,
}

impl ListTasksTool {
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "list_tasks",
            "List your scheduled tasks with their next run time.",
            Executor::Contextual(Arc::new(self)),
        )
    }
}

#[async_trait]
impl ContextualToolHandler for ListTasksTool {
    async fn call(&self, _args: ToolArgs, sender_id: &str) -> String {
        let scope = task_scope(&self.contexts, sender_id);
        self.scheduler.list_for(scope.as_deref())
    }
}

/// Raise the caller's iteration budget for the current task.
pub struct DeepWorkTool {
    /// Weak: sessions own the registry that owns this tool.
    sessions: Weak<SessionRegistry>,
}

impl DeepWorkTool {
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "deep_work",
            "Request more steps for a long multi-step task. Call this first, with a short plan.",
            Executor::Contextual(Arc::new(self)),
        )
        .arg("max_steps", "How many steps the task needs (capped by the server)")
        .optional_arg("plan", "One-line plan of the steps")
    }
}

#[async_trait]
impl ContextualToolHandler for DeepWorkTool {
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String {
        let Some(max_steps) = args
            .get("max_steps")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
        else {
            return invalid_args("max_steps must be a positive whole number");
        };

        let Some(session) = self.sessions.upgrade().and_then(|s| s.get(sender_id)) else {
            return "Error: deep work is only available in a chat session".into();
        };

        let plan = args.get("plan").map(String::as_str).unwrap_or_default();
        session.set_deep_work(max_steps, plan)
    }
}

/// Let the model surface status during long tool-heavy turns.
pub struct ReportProgressTool {
    progress: Arc<ProgressSink>,
}

impl ReportProgressTool {
    pub fn definition(self) -> ToolDef {
        ToolDef::new(
            "report_progress",
            "Show the user a live status line while you work through a long task.",
            Executor::Contextual(Arc::new(self)),
        )
        .arg("percent", "Completion from 0 to 100")
        .arg("message", "What you are doing now")
        .optional_arg("state", "Short state label, e.g. searching")
        .optional_arg("detail", "Extra detail, e.g. the current file")
    }
}

#[async_trait]
impl ContextualToolHandler for ReportProgressTool {
    async fn call(&self, args: ToolArgs, sender_id: &str) -> String {
        let percent = args
            .get("percent")
            .and_then(|s| s.trim().trim_end_matches('%').parse::<u8>().ok())
            .unwrap_or(0);
        let message = args.get("message").map(String::as_str).unwrap_or_default();
        let state = args.get("state").map(String::as_str).unwrap_or_default();
        let detail = args.get("detail").map(String::as_str).unwrap_or_default();

        match self
            .progress
            .send_progress(sender_id, percent, message, state, detail)
            .await
        {
            Ok(message_id) => {
                debug!(sender = %sender_id, percent, ?message_id, "Progress reported");
                "Progress shown to the user.".into()
            }
            Err(e) => format!("Error: could not show progress: {e}"),
        }
    }
}
