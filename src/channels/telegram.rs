use super::traits::{Channel, ChannelMessage, ParseMode, SendMessage};
use crate::gate::{ChannelRef, LookupError, MembershipLookup, MembershipStatus};
use crate::session::UserId;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects `sendMessage` text above this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const LONG_POLL_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Telegram channel — long-polls the Bot API for updates
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the channel at a different Bot API server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// POST a Bot API method and return its `result`, failing on `"ok": false`.
    async fn call(&self, method: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {method} request failed"))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {method} returned non-JSON (HTTP {status})"))?;

        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            anyhow::bail!("Telegram {method} failed (HTTP {status}): {description}");
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Register `url` as the webhook target for this bot.
    pub async fn set_webhook(&self, url: &str) -> anyhow::Result<()> {
        self.call(
            "setWebhook",
            &serde_json::json!({
                "url": url,
                "allowed_updates": ["message"]
            }),
        )
        .await?;
        tracing::info!("Telegram webhook registered");
        Ok(())
    }

    /// Remove any webhook so `getUpdates` is accepted again.
    pub async fn delete_webhook(&self) -> anyhow::Result<()> {
        self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    /// The bot's own username, as reported by `getMe`.
    pub async fn get_me(&self) -> anyhow::Result<String> {
        let me = self.call("getMe", &serde_json::json!({})).await?;
        me.get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Telegram getMe returned no username")
    }
}

/// Extract an inbound text message from a Telegram `Update` object.
///
/// Returns `None` for anything that is not a text message with a sender.
pub fn parse_update(update: &Value) -> Option<ChannelMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;

    let sender = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(sender);

    let id = message
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|mid| format!("{chat_id}:{mid}"))
        .unwrap_or_default();
    let timestamp = message
        .get("date")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        });

    Some(ChannelMessage {
        id,
        sender: sender.to_string(),
        reply_target: chat_id.to_string(),
        content: text.to_string(),
        channel: "telegram".to_string(),
        timestamp,
    })
}

/// Split `text` into pieces of at most `max_chars` characters, in order.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn chat_id_value(raw: &str) -> Value {
    raw.parse::<i64>()
        .map_or_else(|_| Value::String(raw.to_string()), Value::from)
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &SendMessage) -> anyhow::Result<()> {
        for chunk in split_message(&message.content, MAX_MESSAGE_CHARS) {
            let mut body = serde_json::json!({
                "chat_id": chat_id_value(&message.recipient),
                "text": chunk,
            });
            if message.parse_mode == ParseMode::Html {
                body["parse_mode"] = Value::from("HTML");
                body["disable_web_page_preview"] = Value::Bool(true);
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": LONG_POLL_SECS,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {}", e.without_url());
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {}", e.without_url());
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            if data.get("ok").and_then(Value::as_bool) == Some(false) {
                let description = data
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                tracing::warn!("Telegram getUpdates rejected: {description}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }

            let Some(results) = data.get("result").and_then(Value::as_array) else {
                continue;
            };

            for update in results {
                // Advance offset past this update
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = parse_update(update) else {
                    continue;
                };

                if tx.send(msg).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn start_typing(&self, recipient: &str) -> anyhow::Result<()> {
        self.call(
            "sendChatAction",
            &serde_json::json!({
                "chat_id": chat_id_value(recipient),
                "action": "typing"
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipLookup for TelegramChannel {
    async fn membership_status(
        &self,
        channel: &ChannelRef,
        user_id: &UserId,
    ) -> Result<MembershipStatus, LookupError> {
        let body = serde_json::json!({
            "chat_id": chat_id_value(channel.chat_id()),
            "user_id": chat_id_value(user_id.as_str()),
        });

        let resp = self
            .client
            .post(self.api_url("getChatMember"))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.without_url().to_string()))?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| {
            if status.is_success() {
                LookupError::Malformed(e.without_url().to_string())
            } else {
                LookupError::Request(format!("HTTP {status}"))
            }
        })?;

        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description")
                .to_string();
            return Err(LookupError::Api { description });
        }

        data.get("result")
            .and_then(|r| r.get("status"))
            .and_then(Value::as_str)
            .map(MembershipStatus::from)
            .ok_or_else(|| LookupError::Malformed("result.status missing".into()))
    }
}
