//! Inbound chat events and the outcome of dispatching one.

use apexclaw_agent::MAX_ITERATIONS_PREFIX;
use apexclaw_core::context::ContextMap;
use apexclaw_core::provider::FileAttachment;

const TIMEOUT_PREFIX: &str = "[Timeout";

/// One message from a chat transport.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub sender_id: String,
    pub telegram_id: i64,
    pub message_id: i64,
    pub chat_type: String,
    pub text: String,
    pub files: Vec<FileAttachment>,
    pub reply_to_msg_id: Option<i64>,
    pub replied_to_user_id: Option<String>,
    pub group_id: Option<i64>,
    pub file_path: Option<String>,
    pub callback_data: Option<String>,
}

impl InboundMessage {
    /// A private-chat text message.
    pub fn new(sender_id: impl Into<String>, telegram_id: i64, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            telegram_id,
            chat_type: "private".into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self.chat_type = "group".into();
        self
    }

    pub fn with_files(mut self, files: Vec<FileAttachment>) -> Self {
        self.files = files;
        self
    }

    /// The per-sender context tools read during the run.
    pub fn context(&self, owner_id: &str) -> ContextMap {
        ContextMap {
            telegram_id: self.telegram_id,
            sender_id: self.sender_id.clone(),
            owner_id: owner_id.to_string(),
            message_id: self.message_id,
            reply_to_msg_id: self.reply_to_msg_id,
            replied_to_user_id: self.replied_to_user_id.clone(),
            group_id: self.group_id,
            chat_type: self.chat_type.clone(),
            file_path: self.file_path.clone(),
            callback_data: self.callback_data.clone(),
            progress_message_id: None,
        }
    }

    /// Message id to reply to, if any.
    pub fn reply_to(&self) -> Option<i64> {
        (self.message_id != 0).then_some(self.message_id)
    }
}

/// How a dispatched run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A normal reply
    Reply(String),
    /// The iteration budget ran out
    BudgetExhausted,
    /// The run's deadline passed
    Timeout(String),
    /// The model produced nothing to show
    Empty,
}

impl DispatchOutcome {
    pub fn from_reply(reply: &str) -> Self {
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            DispatchOutcome::Empty
        } else if trimmed.starts_with(MAX_ITERATIONS_PREFIX) {
            DispatchOutcome::BudgetExhausted
        } else if trimmed.starts_with(TIMEOUT_PREFIX) {
            DispatchOutcome::Timeout(trimmed.to_string())
        } else {
            DispatchOutcome::Reply(reply.to_string())
        }
    }

    /// The text to deliver, or `None` when there is nothing to send.
    pub fn render(&self) -> Option<String> {
        match self {
            DispatchOutcome::Reply(text) => Some(text.clone()),
            DispatchOutcome::BudgetExhausted => Some(
                "⚠️ <i>I ran out of steps before finishing. Ask me to continue, or ask for deep work on bigger tasks.</i>"
                    .into(),
            ),
            DispatchOutcome::Timeout(marker) => {
                Some(format!("⏱️ <i>That took too long and was stopped.</i> <code>{marker}</code>"))
            }
            DispatchOutcome::Empty => None,
        }
    }
}
