//! Heartbeat scheduler: durable one-shot and recurring prompts.
//!
//! Tasks are kept in memory and mirrored to a JSON file
//! (`~/.apexclaw/heartbeat.json` by default). A background loop scans them
//! every tick; each due task is replayed through a `TaskRunner` (a fresh
//! agent session) on its own worker and the reply is delivered through
//! `MessagingOps`.

pub mod recurrence;
pub mod scheduler;
pub mod store;
pub mod task;

pub use recurrence::{Recurrence, next_run};
pub use scheduler::{HeartbeatScheduler, SchedulerSettings, TaskRunner, fire};
pub use store::HeartbeatStore;
pub use task::{ScheduledTask, format_time};
