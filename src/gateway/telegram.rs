//! Telegram gateway — Bot API over plain HTTP, long-polled for updates.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::{MessagingGateway, OutboundMessage};
use crate::model::Platform;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// getUpdates long-poll window in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// HTTP client timeout. Must sit above the long-poll window so a quiet
/// getUpdates call is not treated as a failure.
const CLIENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(POLL_TIMEOUT_SECS + 15);

/// One inbound Telegram update, reduced to what the dispatcher needs.
#[derive(Debug, Clone)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub chat_id: String,
    pub external_user_id: String,
    pub display_name: String,
    pub text: Option<String>,
    pub voice_file_id: Option<String>,
}

pub struct TelegramGateway {
    bot_token: String,
    client: reqwest::Client,
    /// Per-request timeout for ordinary API calls. getUpdates and file
    /// downloads stay on the wider client timeout instead.
    request_timeout: std::time::Duration,
}

impl TelegramGateway {
    pub fn new(bot_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            bot_token,
            client,
            request_timeout: std::time::Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn send_err(reason: impl std::fmt::Display) -> GatewayError {
        GatewayError::SendFailed {
            platform: "telegram".to_string(),
            reason: reason.to_string(),
        }
    }

    fn fetch_err(reason: impl std::fmt::Display) -> GatewayError {
        GatewayError::FetchFailed {
            platform: "telegram".to_string(),
            reason: reason.to_string(),
        }
    }

    /// Send text, trying Markdown first with a plain-text fallback, and
    /// splitting anything over Telegram's length limit.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), GatewayError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_text_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_text_chunk(&self, chat_id: &str, text: &str) -> Result<(), GatewayError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .timeout(self.request_timeout)
            .json(&markdown_body)
            .send()
            .await
            .map_err(Self::send_err)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .timeout(self.request_timeout)
            .json(&plain_body)
            .send()
            .await
            .map_err(Self::send_err)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(Self::send_err(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }
        Ok(())
    }

    /// Send a voice message by URL (Telegram fetches it).
    async fn send_voice_url(&self, chat_id: &str, url: &str) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "voice": url,
        });
        let resp = self
            .client
            .post(self.api_url("sendVoice"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::send_err)?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_err(format!("sendVoice failed: {err}")));
        }
        debug!(chat_id = %chat_id, "Telegram voice sent");
        Ok(())
    }

    /// Verify the bot token against getMe.
    pub async fn health_check(&self) -> Result<(), GatewayError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(Self::fetch_err)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::fetch_err(format!("getMe returned {}", resp.status())))
        }
    }

    /// One long-poll cycle against getUpdates. Returns parsed updates;
    /// callers advance `offset` past the highest `update_id` themselves.
    pub async fn poll_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>, GatewayError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"]
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .map_err(Self::fetch_err)?;

        let data: Value = resp.json().await.map_err(Self::fetch_err)?;

        let mut updates = Vec::new();
        if let Some(results) = data.get("result").and_then(Value::as_array) {
            for update in results {
                if let Some(parsed) = parse_update(update) {
                    updates.push(parsed);
                }
            }
        }
        Ok(updates)
    }

    /// Download a file (e.g. a voice note) by its Telegram file id.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, GatewayError> {
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({"file_id": file_id}))
            .send()
            .await
            .map_err(Self::fetch_err)?;

        let data: Value = resp.json().await.map_err(Self::fetch_err)?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| Self::fetch_err("getFile returned no file_path"))?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        );
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::fetch_err)?
            .bytes()
            .await
            .map_err(Self::fetch_err)?;

        info!(file_id = %file_id, bytes = bytes.len(), "Telegram file downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(
        &self,
        platform: Platform,
        chat_id: &str,
        message: OutboundMessage,
    ) -> Result<(), GatewayError> {
        if platform != Platform::Telegram {
            return Err(Self::send_err(format!(
                "wrong platform for telegram gateway: {platform}"
            )));
        }

        self.send_text(chat_id, &message.text).await?;
        if let Some(url) = &message.audio_url {
            self.send_voice_url(chat_id, url).await?;
        }
        Ok(())
    }
}

/// Parse one getUpdates entry into a [`TelegramUpdate`]. Returns `None`
/// for updates that carry neither text nor voice.
fn parse_update(update: &Value) -> Option<TelegramUpdate> {
    let update_id = update.get("update_id").and_then(Value::as_i64)?;
    let message = update.get("message")?;

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();

    let from = message.get("from")?;
    let external_user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let display_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .or_else(|| from.get("username").and_then(Value::as_str))
        .unwrap_or("friend")
        .to_string();

    let text = message
        .get("text")
        .and_then(Value::as_str)
        .map(String::from);
    let voice_file_id = message
        .get("voice")
        .and_then(|v| v.get("file_id"))
        .and_then(Value::as_str)
        .map(String::from);

    if text.is_none() && voice_file_id.is_none() {
        return None;
    }

    Some(TelegramUpdate {
        update_id,
        chat_id,
        external_user_id,
        display_name,
        text,
        voice_file_id,
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let chunk = &remaining[..max_len];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(max_len);
        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { max_len } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
