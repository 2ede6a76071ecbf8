//! Telegram Bot API sender.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Messages go out in HTML parse mode with link previews disabled.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Notifier;
use crate::retry::{with_backoff, RetryPolicy};

const API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects longer message texts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    http: Client,
    token: SecretString,
    chat_id: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(token: SecretString, chat_id: String, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            token,
            chat_id,
            retry,
        })
    }

    /// Fit a message into the API limit. Cuts at the last line break
    /// before the limit so no HTML tag or entity is split; a single
    /// overlong line is cut at a char boundary.
    pub fn truncate(text: &str) -> &str {
        let Some((limit, _)) = text.char_indices().nth(MAX_MESSAGE_CHARS) else {
            return text;
        };
        match text[..limit].rfind('\n') {
            Some(newline) if newline > 0 => &text[..newline],
            _ => &text[..limit],
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.token.expose_secret());
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            // The URL embeds the token; keep it out of error chains
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = resp.status();
        let parsed: TelegramResponse = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to parse Telegram response (HTTP {status})"))?;

        if !parsed.ok {
            anyhow::bail!(
                "Telegram API error {status}: {}",
                parsed.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let text = Self::truncate(text);
        with_backoff(&self.retry, "telegram sendMessage", || self.post(text)).await?;
        debug!(chars = text.chars().count(), "Telegram message delivered");
        Ok(())
    }
}
