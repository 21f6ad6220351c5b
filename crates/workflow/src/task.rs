//! The persisted scheduled-task record.

use apexclaw_core::error::ScheduleError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::recurrence::Recurrence;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A prompt to replay through a fresh agent session at `run_at`.
///
/// Field names and string timestamps match the on-disk JSON verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    #[serde(default)]
    pub id: String,

    /// De-duplication key; scheduling an existing label replaces the task
    pub label: String,

    /// Instruction handed to the agent when the task fires
    pub prompt: String,

    /// RFC3339 timestamp of the next firing
    pub run_at: String,

    /// "" or "once", "minutely", "hourly", "daily", "weekly", "every_N_unit"
    #[serde(default)]
    pub repeat: String,

    /// Sender the task runs as
    #[serde(default)]
    pub owner_id: String,

    /// Chat the reply is delivered to
    #[serde(default)]
    pub telegram_id: i64,

    /// Message the reply answers; 0 for none
    #[serde(default)]
    pub message_id: i64,

    #[serde(default)]
    pub group_id: i64,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub scheduled_at: String,
}

impl ScheduledTask {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>, run_at: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            prompt: prompt.into(),
            run_at: format_time(run_at),
            repeat: String::new(),
            owner_id: String::new(),
            telegram_id: 0,
            message_id: 0,
            group_id: 0,
            created_at: String::new(),
            scheduled_at: String::new(),
        }
    }

    pub fn with_repeat(mut self, repeat: impl Into<String>) -> Self {
        self.repeat = repeat.into();
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    /// Deliver to `telegram_id`, replying to `message_id` when non-zero.
    pub fn with_chat(mut self, telegram_id: i64, message_id: i64) -> Self {
        self.telegram_id = telegram_id;
        self.message_id = message_id;
        self
    }

    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = group_id;
        self
    }

    /// Parsed `run_at`.
    pub fn run_at_time(&self) -> Result<DateTime<Utc>, ScheduleError> {
        DateTime::parse_from_rfc3339(self.run_at.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ScheduleError::InvalidRunAt(self.run_at.clone()))
    }

    pub fn recurrence(&self) -> Recurrence {
        Recurrence::parse(&self.repeat)
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence().is_recurring()
    }

    /// Fill in `id`, `created_at` and `scheduled_at` when empty.
    pub(crate) fn normalize(&mut self, now: DateTime<Utc>) {
        if self.id.is_empty() {
            let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            self.id = format!("hb_{:x}_{seq}", now.timestamp_millis());
        }
        if self.created_at.is_empty() {
            self.created_at = format_time(now);
        }
        if self.scheduled_at.is_empty() {
            self.scheduled_at = format_time(now);
        }
    }
}

/// RFC3339 with second precision, as stored on disk.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
