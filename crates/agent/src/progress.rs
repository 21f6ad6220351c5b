//! Live progress: one editable status message per sender.
//!
//! Long-running tools report progress through `ProgressSink::send_progress`.
//! Each report is pushed to the sender's stream callback as a progress
//! sentinel and, when the sender has a chat context, shown in a single
//! status message that is sent once and then edited in place. The
//! dispatcher calls `clear` when the run's reply has been delivered.
//!
//! Per-sender state:
//!
//! ```text
//! Idle ──send──▶ Sending ──ok──▶ Live(id) ──edit──▶ Live(id)
//!  ▲                │                 │
//!  └────failed──────┘                 └──clear──▶ (deleted) Idle
//! ```

use apexclaw_core::context::ContextStore;
use apexclaw_core::error::ChannelError;
use apexclaw_core::messaging::MessagingOps;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

use crate::markers::{ProgressUpdate, StreamMarker};
use crate::registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Idle,
    /// First send in flight; further reports are dropped until it lands
    Sending,
    Live(i64),
}

pub struct ProgressSink {
    sessions: Weak<SessionRegistry>,
    contexts: Arc<ContextStore>,
    messaging: Arc<dyn MessagingOps>,
    states: Mutex<HashMap<String, ProgressState>>,
}

impl ProgressSink {
    /// `sessions` is held weakly: tools own the sink and sessions own the
    /// tools.
    pub fn new(
        sessions: Weak<SessionRegistry>,
        contexts: Arc<ContextStore>,
        messaging: Arc<dyn MessagingOps>,
    ) -> Self {
        Self {
            sessions,
            contexts,
            messaging,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, sender_id: &str) -> ProgressState {
        self.lock_states()
            .get(sender_id)
            .copied()
            .unwrap_or(ProgressState::Idle)
    }

    /// Report progress for `sender_id`. Returns the id of the status
    /// message when one was sent or edited.
    pub async fn send_progress(
        &self,
        sender_id: &str,
        percent: u8,
        message: &str,
        state: &str,
        detail: &str,
    ) -> Result<Option<i64>, ChannelError> {
        let update = ProgressUpdate::new(percent, message, state, detail);

        if let Some(session) = self.sessions.upgrade().and_then(|s| s.get(sender_id)) {
            session.emit(&StreamMarker::Progress(update.clone()).to_string());
        }

        let Some(chat_id) = self
            .contexts
            .get(sender_id)
            .map(|c| c.telegram_id)
            .filter(|id| *id != 0)
        else {
            return Ok(None);
        };
        let text = render(&update);

        let current = {
            let mut states = self.lock_states();
            let current = states
                .get(sender_id)
                .copied()
                .unwrap_or(ProgressState::Idle);
            if current == ProgressState::Idle {
                states.insert(sender_id.to_string(), ProgressState::Sending);
            }
            current
        };

        match current {
            ProgressState::Sending => {
                debug!(sender = %sender_id, "Progress send in flight, skipping update");
                Ok(None)
            }
            ProgressState::Live(message_id) => {
                self.messaging
                    .edit_message(chat_id, message_id, &text)
                    .await?;
                Ok(Some(message_id))
            }
            ProgressState::Idle => self.first_send(sender_id, chat_id, &text).await,
        }
    }

    async fn first_send(
        &self,
        sender_id: &str,
        chat_id: i64,
        text: &str,
    ) -> Result<Option<i64>, ChannelError> {
        let message_id = match self.messaging.send_message(chat_id, text).await {
            Ok(id) => id,
            Err(e) => {
                self.lock_states().remove(sender_id);
                warn!(sender = %sender_id, error = %e, "Failed to send progress message");
                return Err(e);
            }
        };

        let still_sending = {
            let mut states = self.lock_states();
            let sending = states.get(sender_id) == Some(&ProgressState::Sending);
            if sending {
                states.insert(sender_id.to_string(), ProgressState::Live(message_id));
            }
            sending
        };

        if !still_sending {
            // Cleared while the send was in flight.
            self.messaging.delete_message(chat_id, message_id).await?;
            return Ok(None);
        }

        self.contexts.update(sender_id, |c| {
            c.progress_message_id = i32::try_from(message_id).ok();
        });
        Ok(Some(message_id))
    }

    /// Delete the sender's status message, if any, and return to idle.
    pub async fn clear(&self, sender_id: &str) -> Result<(), ChannelError> {
        let previous = self.lock_states().remove(sender_id);
        self.contexts
            .update(sender_id, |c| c.progress_message_id = None);

        let Some(ProgressState::Live(message_id)) = previous else {
            return Ok(());
        };
        let Some(chat_id) = self.contexts.get(sender_id).map(|c| c.telegram_id) else {
            return Ok(());
        };
        self.messaging.delete_message(chat_id, message_id).await
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render(update: &ProgressUpdate) -> String {
    const WIDTH: usize = 10;
    let filled = usize::from(update.percent) * WIDTH / 100;
    let bar = format!("{}{}", "▰".repeat(filled), "▱".repeat(WIDTH - filled));

    let mut text = format!("{bar} {}%\n<b>{}</b>", update.percent, escape_html(&update.message));
    if !update.state.is_empty() {
        text.push_str(&format!("\n<i>{}</i>", escape_html(&update.state)));
    }
    if !update.detail.is_empty() {
        text.push_str(&format!("\n<code>{}</code>", escape_html(&update.detail)));
    }
    text
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
