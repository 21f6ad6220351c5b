//! Per-sender conversational side-channel shared with tools.
//!
//! The dispatcher writes a `ContextMap` for the sender just before each
//! session invocation; tools read it while they execute (which chat to reply
//! in, which message was replied to, which file came with the message).
//! An entry is overwritten by the next invocation for the same sender.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMap {
    /// Chat the invocation came from
    pub telegram_id: i64,

    pub sender_id: String,

    /// The configured owner identity
    pub owner_id: String,

    /// The inbound message being answered
    pub message_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_msg_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied_to_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,

    /// "private", "group", "supergroup", "web", ...
    pub chat_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_message_id: Option<i32>,
}

impl ContextMap {
    pub fn is_owner(&self) -> bool {
        !self.owner_id.is_empty() && self.sender_id == self.owner_id
    }
}

/// Exclusive-lock map of sender id → current `ContextMap`.
#[derive(Default)]
pub struct ContextStore {
    entries: Mutex<HashMap<String, ContextMap>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the context for `sender_id`, replacing any previous one.
    pub fn set(&self, sender_id: impl Into<String>, context: ContextMap) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sender_id.into(), context);
    }

    /// A snapshot of the sender's current context.
    pub fn get(&self, sender_id: &str) -> Option<ContextMap> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sender_id)
            .cloned()
    }

    /// Mutate the sender's context in place. Returns false when absent.
    pub fn update<F>(&self, sender_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ContextMap),
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(sender_id) {
            Some(ctx) => {
                f(ctx);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, sender_id: &str) -> Option<ContextMap> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(sender: &str, chat: i64) -> ContextMap {
        ContextMap {
            telegram_id: chat,
            sender_id: sender.into(),
            owner_id: "1".into(),
            chat_type: "private".into(),
            ..ContextMap::default()
        }
    }

    #[test]
    fn set_overwrites_previous_invocation() {
        let store = ContextStore::new();
        store.set("7", ctx("7", 100));
        store.set("7", ctx("7", 200));
        assert_eq!(store.get("7").unwrap().telegram_id, 200);
    }

    #[test]
    fn update_mutates_existing_entry_only() {
        let store = ContextStore::new();
        assert!(!store.update("7", |c| c.progress_message_id = Some(5)));

        store.set("7", ctx("7", 100));
        assert!(store.update("7", |c| c.progress_message_id = Some(5)));
        assert_eq!(store.get("7").unwrap().progress_message_id, Some(5));
    }

    #[test]
    fn owner_check() {
        assert!(ctx("1", 1).is_owner());
        assert!(!ctx("2", 1).is_owner());
        let mut no_owner = ctx("", 1);
        no_owner.owner_id.clear();
        assert!(!no_owner.is_owner());
    }

    #[test]
    fn remove_returns_entry() {
        let store = ContextStore::new();
        store.set("7", ctx("7", 100));
        assert!(store.remove("7").is_some());
        assert!(store.get("7").is_none());
    }
}
