//! Messaging operations — the seam between the core and the chat transport.
//!
//! The dispatcher implements this trait; the scheduler uses it to deliver
//! replies, the progress sink to maintain its live status message, and tools
//! to talk back to the user. The transport wiring is injected at startup.

use async_trait::async_trait;

use crate::error::ChannelError;

#[async_trait]
pub trait MessagingOps: Send + Sync {
    /// Deliver an HTML-formatted reply to a chat, optionally as a reply to
    /// `reply_to`.
    async fn deliver(
        &self,
        telegram_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), ChannelError>;

    /// Send a new message and return its id.
    async fn send_message(&self, telegram_id: i64, text: &str) -> Result<i64, ChannelError>;

    /// Replace the text of a previously sent message.
    async fn edit_message(
        &self,
        telegram_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError>;

    async fn delete_message(&self, telegram_id: i64, message_id: i64) -> Result<(), ChannelError>;
}

/// A transport that accepts everything and sends nothing.
///
/// Used when no chat transport is attached (tests, one-shot CLI runs).
#[derive(Debug, Default)]
pub struct NullMessaging;

#[async_trait]
impl MessagingOps for NullMessaging {
    async fn deliver(
        &self,
        telegram_id: i64,
        _reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), ChannelError> {
        tracing::debug!(telegram_id, len = text.len(), "Dropping delivery (no transport)");
        Ok(())
    }

    async fn send_message(&self, _telegram_id: i64, _text: &str) -> Result<i64, ChannelError> {
        Ok(0)
    }

    async fn edit_message(
        &self,
        _telegram_id: i64,
        _message_id: i64,
        _text: &str,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn delete_message(&self, _telegram_id: i64, _message_id: i64) -> Result<(), ChannelError> {
        Ok(())
    }
}
