//! Outbound notification capability.
//!
//! The core only needs "send this text to that channel"; the concrete
//! transport is a collaborator. Delivery failures are surfaced as values so
//! callers can decide to log-and-continue, which every caller in this crate
//! does: a lost message must never fail a grant or abort a sweep.

use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Where a notification goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRef {
    /// The operator's channel.
    Admin,
    /// A linked subscriber chat.
    Chat(i64),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: ChannelRef, text: &str) -> Result<()>;

    /// Notification carrying a join button for the given invite link.
    /// Default: transports without button support send plain text with the
    /// link appended.
    async fn notify_with_join_button(
        &self,
        channel: ChannelRef,
        text: &str,
        invite_link: &str,
    ) -> Result<()> {
        self.notify(channel, &format!("{text}\n{invite_link}")).await
    }
}

/// Telegram bot API sink. Without a token or an admin chat id it degrades
/// to logging the message, matching the local-development posture of the
/// service it replaces.
pub struct TelegramNotifier {
    client: reqwest::Client,
    send_url: Option<String>,
    admin_chat_id: Option<i64>,
}

const SEND_TIMEOUT: Duration = Duration::from_secs(8);

impl TelegramNotifier {
    pub fn new(bot_token: Option<&str>, admin_chat_id: Option<i64>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| Error::Notify(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            send_url: bot_token.map(|t| format!("https://api.telegram.org/bot{t}/sendMessage")),
            admin_chat_id,
        })
    }

    fn chat_id(&self, channel: ChannelRef) -> Option<i64> {
        match channel {
            ChannelRef::Chat(id) => Some(id),
            ChannelRef::Admin => self.admin_chat_id,
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<()> {
        let url = self
            .send_url
            .as_ref()
            .ok_or_else(|| Error::Notify("no bot token configured".to_string()))?;
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Notify(format!(
                "send message returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, channel: ChannelRef, text: &str) -> Result<()> {
        let Some(chat_id) = self.chat_id(channel) else {
            tracing::info!(?channel, %text, "notification sink unconfigured, dropping");
            return Ok(());
        };
        if self.send_url.is_none() {
            tracing::info!(chat_id, %text, "notification sink unconfigured, dropping");
            return Ok(());
        }
        self.post(json!({ "chat_id": chat_id, "text": text })).await
    }

    async fn notify_with_join_button(
        &self,
        channel: ChannelRef,
        text: &str,
        invite_link: &str,
    ) -> Result<()> {
        let Some(chat_id) = self.chat_id(channel) else {
            tracing::info!(?channel, %text, "notification sink unconfigured, dropping");
            return Ok(());
        };
        if self.send_url.is_none() {
            tracing::info!(chat_id, %text, "notification sink unconfigured, dropping");
            return Ok(());
        }
        self.post(json!({
            "chat_id": chat_id,
            "text": text,
            "reply_markup": {
                "inline_keyboard": [[{ "text": "Join Group", "url": invite_link }]]
            }
        }))
        .await
    }
}
