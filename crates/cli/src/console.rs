//! Terminal transport: replies and status lines go to stdout/stderr.

use apexclaw_core::error::ChannelError;
use apexclaw_core::messaging::MessagingOps;
use async_trait::async_trait;
use regex_lite::Regex;
use std::io::Write;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};

static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").ok());

/// Render the assistant's Telegram-style HTML as plain text.
pub fn to_plain(html: &str) -> String {
    let stripped = match TAG.as_ref() {
        Some(re) => re.replace_all(html, "").into_owned(),
        None => html.to_string(),
    };
    stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

fn write_reply(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    writeln!(out)?;
    for line in to_plain(text).lines() {
        writeln!(out, "  Assistant > {line}")?;
    }
    writeln!(out)?;
    out.flush()
}

#[derive(Debug, Default)]
pub struct ConsoleMessaging {
    next_id: AtomicI64,
}

impl ConsoleMessaging {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagingOps for ConsoleMessaging {
    async fn deliver(
        &self,
        telegram_id: i64,
        _reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), ChannelError> {
        tracing::debug!(telegram_id, len = text.len(), "Delivering reply");
        write_reply(&mut std::io::stdout().lock(), text).map_err(|e| {
            ChannelError::DeliveryFailed {
                chat_id: telegram_id,
                reason: e.to_string(),
            }
        })
    }

    async fn send_message(&self, _telegram_id: i64, text: &str) -> Result<i64, ChannelError> {
        eprintln!("  [status] {}", to_plain(text).replace('\n', " "));
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn edit_message(
        &self,
        _telegram_id: i64,
        _message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError> {
        eprintln!("  [status] {}", to_plain(text).replace('\n', " "));
        Ok(())
    }

    async fn delete_message(
        &self,
        _telegram_id: i64,
        _message_id: i64,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}
