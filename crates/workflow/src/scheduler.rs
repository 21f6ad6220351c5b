//! The heartbeat scheduler.
//!
//! Holds the live task set behind a mutex, mirrors every mutation to the
//! `HeartbeatStore`, and on each tick moves due tasks into a batch that is
//! fired on concurrent workers. One-shot tasks are dropped once fired;
//! recurring tasks are re-armed at the next boundary after "now".

use apexclaw_config::HeartbeatConfig;
use apexclaw_core::error::{Error, ScheduleError};
use apexclaw_core::messaging::MessagingOps;
use apexclaw_core::run_context::RunContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::recurrence::{Recurrence, next_run};
use crate::store::HeartbeatStore;
use crate::task::{ScheduledTask, format_time};

/// Runs a fired task's prompt and returns the reply to deliver.
///
/// Each firing gets its own `run_key`, distinct from every sender id and
/// from other firings of the same task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(
        &self,
        run_key: &str,
        task: &ScheduledTask,
        ctx: &RunContext,
    ) -> Result<String, Error>;

    /// Called once per firing after the reply was delivered or dropped.
    async fn finish_task(&self, _run_key: &str, _task: &ScheduledTask) {}
}

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

fn run_key(task: &ScheduledTask) -> String {
    let name = if task.id.is_empty() { &task.label } else { &task.id };
    format!("heartbeat:{name}#{}", NEXT_RUN.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Time between scans of the task set
    pub tick: Duration,

    /// Deadline for one fired task
    pub fire_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self {
            tick: Duration::from_secs(config.tick_secs),
            fire_timeout: Duration::from_secs(config.fire_timeout_secs),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

pub struct HeartbeatScheduler {
    store: HeartbeatStore,
    settings: SchedulerSettings,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl HeartbeatScheduler {
    /// Load the task file, dropping one-shot tasks that are already due.
    pub fn load(store: HeartbeatStore, settings: SchedulerSettings) -> Self {
        Self::load_at(store, settings, Utc::now())
    }

    pub fn load_at(store: HeartbeatStore, settings: SchedulerSettings, now: DateTime<Utc>) -> Self {
        let loaded = store.load();
        let total = loaded.len();

        let tasks: Vec<ScheduledTask> = loaded
            .into_iter()
            .filter(|task| match task.run_at_time() {
                Ok(run_at) if run_at <= now && !task.is_recurring() => {
                    info!(label = %task.label, run_at = %task.run_at, "Dropping stale one-shot task");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!(label = %task.label, error = %e, "Dropping task with unparsable run_at");
                    false
                }
            })
            .collect();

        let dropped = total - tasks.len();
        info!(path = %store.path().display(), loaded = tasks.len(), dropped, "Heartbeat tasks loaded");

        let scheduler = Self {
            store,
            settings,
            tasks: Mutex::new(tasks),
        };
        if dropped > 0 {
            scheduler.persist(&scheduler.tasks());
        }
        scheduler
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Add a task, or replace the task with the same label.
    pub fn schedule(&self, task: ScheduledTask) -> Result<ScheduledTask, ScheduleError> {
        self.schedule_at(task, Utc::now())
    }

    pub fn schedule_at(
        &self,
        mut task: ScheduledTask,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask, ScheduleError> {
        task.label = task.label.trim().to_string();
        if task.label.is_empty() {
            return Err(ScheduleError::EmptyLabel);
        }
        let run_at = task.run_at_time()?;
        match task.recurrence() {
            Recurrence::Once if run_at <= now => {
                return Err(ScheduleError::RunAtInPast(task.run_at));
            }
            Recurrence::Every(interval) => {
                if next_run(run_at, run_at.max(now), interval).is_none() {
                    return Err(ScheduleError::IntervalOutOfRange(task.repeat));
                }
            }
            Recurrence::Once => {}
        }
        task.run_at = format_time(run_at);
        task.normalize(now);

        let mut tasks = self.lock_tasks();
        match tasks.iter_mut().find(|t| t.label == task.label) {
            Some(existing) => {
                info!(label = %task.label, run_at = %task.run_at, "Replacing scheduled task");
                *existing = task.clone();
            }
            None => {
                info!(label = %task.label, run_at = %task.run_at, repeat = %task.repeat, "Scheduling task");
                tasks.push(task.clone());
            }
        }
        self.persist(&tasks);
        Ok(task)
    }

    /// Remove the first task whose label or id matches. Returns whether one
    /// was removed.
    pub fn cancel(&self, label_or_id: &str) -> bool {
        self.cancel_for(label_or_id, None)
    }

    /// Like `cancel`, but only considers tasks owned by `owner_id` when set.
    pub fn cancel_for(&self, label_or_id: &str, owner_id: Option<&str>) -> bool {
        let key = label_or_id.trim();
        let mut tasks = self.lock_tasks();
        let Some(index) = tasks
            .iter()
            .position(|t| (t.label == key || t.id == key) && owned_by(t, owner_id))
        else {
            return false;
        };
        let removed = tasks.remove(index);
        info!(label = %removed.label, "Cancelled scheduled task");
        self.persist(&tasks);
        true
    }

    /// A snapshot of the live task set.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.lock_tasks().clone()
    }

    pub fn get(&self, label: &str) -> Option<ScheduledTask> {
        self.lock_tasks().iter().find(|t| t.label == label).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable listing of the live tasks.
    pub fn list(&self) -> String {
        self.list_for(None)
    }

    /// Listing restricted to tasks owned by `owner_id` when set.
    pub fn list_for(&self, owner_id: Option<&str>) -> String {
        let tasks = self.lock_tasks();
        let visible: Vec<&ScheduledTask> =
            tasks.iter().filter(|t| owned_by(t, owner_id)).collect();
        if visible.is_empty() {
            return "No scheduled tasks.".into();
        }

        let mut out = format!("Scheduled tasks ({}):\n", visible.len());
        out.push_str("LABEL | NEXT RUN | REPEAT | PROMPT\n");
        for task in visible {
            let repeat = if task.repeat.trim().is_empty() {
                "once"
            } else {
                task.repeat.trim()
            };
            out.push_str(&format!(
                "{} | {} | {} | {}\n",
                task.label,
                task.run_at,
                repeat,
                preview(&task.prompt, 60)
            ));
        }
        out
    }

    /// Take every task due at `now` out of the pending set. Recurring tasks
    /// are re-armed; one-shot tasks are removed. Persists once if anything
    /// changed.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut tasks = self.lock_tasks();
        let mut due = Vec::new();
        let mut changed = false;

        tasks.retain_mut(|task| {
            let run_at = match task.run_at_time() {
                Ok(t) => t,
                Err(e) => {
                    warn!(label = %task.label, error = %e, "Dropping task with unparsable run_at");
                    changed = true;
                    return false;
                }
            };
            if run_at > now {
                return true;
            }

            changed = true;
            due.push(task.clone());
            match task.recurrence() {
                Recurrence::Every(interval) => match next_run(run_at, now, interval) {
                    Some(next) => {
                        task.run_at = format_time(next);
                        debug!(label = %task.label, next = %task.run_at, "Recurring task re-armed");
                        true
                    }
                    None => {
                        warn!(
                            label = %task.label,
                            repeat = %task.repeat,
                            "Next run out of range, dropping task"
                        );
                        false
                    }
                },
                Recurrence::Once => false,
            }
        });

        if changed {
            self.persist(&tasks);
        }
        due
    }

    /// Tick at `now` and fire each due task on its own worker.
    pub fn run_due(
        &self,
        now: DateTime<Utc>,
        runner: &Arc<dyn TaskRunner>,
        messaging: &Arc<dyn MessagingOps>,
    ) -> Vec<JoinHandle<()>> {
        self.tick_at(now)
            .into_iter()
            .map(|task| {
                tokio::spawn(fire(
                    task,
                    runner.clone(),
                    messaging.clone(),
                    self.settings.fire_timeout,
                ))
            })
            .collect()
    }

    /// Start the background tick loop. It stops when `shutdown` is
    /// cancelled; workers already fired run to completion.
    pub fn start(
        self: Arc<Self>,
        runner: Arc<dyn TaskRunner>,
        messaging: Arc<dyn MessagingOps>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(tick_secs = self.settings.tick.as_secs(), "Heartbeat scheduler started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Heartbeat scheduler stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let fired = self.run_due(Utc::now(), &runner, &messaging);
                        if !fired.is_empty() {
                            debug!(count = fired.len(), "Heartbeat tick fired tasks");
                        }
                    }
                }
            }
        })
    }

    fn persist(&self, tasks: &[ScheduledTask]) {
        if let Err(e) = self.store.save(tasks) {
            error!(error = %e, "Failed to persist scheduled tasks");
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one fired task and deliver its reply. Never fails: problems are
/// logged.
pub async fn fire(
    task: ScheduledTask,
    runner: Arc<dyn TaskRunner>,
    messaging: Arc<dyn MessagingOps>,
    timeout: Duration,
) {
    let run_key = run_key(&task);
    info!(
        label = %task.label,
        run = %run_key,
        telegram_id = task.telegram_id,
        "Firing scheduled task"
    );
    let ctx = RunContext::with_timeout(timeout);

    match runner.run_task(&run_key, &task, &ctx).await {
        Ok(reply) if reply.trim().is_empty() => {
            warn!(label = %task.label, "Scheduled task produced an empty reply, dropping");
        }
        Ok(reply) => {
            let reply_to = (task.message_id != 0).then_some(task.message_id);
            if let Err(e) = messaging.deliver(task.telegram_id, reply_to, &reply).await {
                warn!(label = %task.label, error = %e, "Failed to deliver scheduled reply");
            }
        }
        Err(e) => warn!(label = %task.label, error = %e, "Scheduled task failed"),
    }

    runner.finish_task(&run_key, &task).await;
}

fn owned_by(task: &ScheduledTask, owner_id: Option<&str>) -> bool {
    owner_id.is_none_or(|owner| task.owner_id == owner)
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}
