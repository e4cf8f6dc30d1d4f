//! Message router — one inbound message in, one reply out.
//!
//! Subscribed users get a completion; everyone else gets the subscribe
//! notice and their message is dropped.

use crate::channels::{Channel, ChannelMessage, ParseMode, SendMessage};
use crate::completion::CompletionClient;
use crate::gate::{ChannelRef, GateDecision, SubscriptionGate};
use crate::session::UserId;

/// A reply ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub text: String,
    pub parse_mode: ParseMode,
}

impl OutboundReply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Plain,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
        }
    }
}

/// The notice sent to users who are not subscribed to `channel`.
pub fn subscription_notice(channel: &ChannelRef) -> String {
    let title = escape_html(channel.title());
    let target = match channel.link() {
        Some(link) => format!("<a href=\"{}\">{title}</a>", escape_html(link)),
        None => format!("<b>{title}</b>"),
    };
    format!("⚠ To use the bot, please subscribe to the channel: {target}")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub struct MessageRouter {
    gate: SubscriptionGate,
    completion: CompletionClient,
}

impl MessageRouter {
    pub fn new(gate: SubscriptionGate, completion: CompletionClient) -> Self {
        Self { gate, completion }
    }

    pub fn gate(&self) -> &SubscriptionGate {
        &self.gate
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    /// Decide the reply for `text` from `user_id`. Never fails.
    pub async fn handle(&self, user_id: &UserId, text: &str) -> OutboundReply {
        self.route(user_id, text, None).await
    }

    /// Route a channel message and send the reply back to where it came from.
    ///
    /// Shows a typing indicator while a completion is in flight. Only the
    /// final send can fail.
    pub async fn dispatch(&self, channel: &dyn Channel, msg: &ChannelMessage) -> anyhow::Result<()> {
        let user_id = UserId::from(msg.sender.as_str());
        tracing::info!(
            channel = %msg.channel,
            user_id = %user_id,
            chars = msg.content.chars().count(),
            "message.received"
        );

        let reply = self
            .route(&user_id, &msg.content, Some((channel, msg.reply_target.as_str())))
            .await;

        channel
            .send(&SendMessage::new(reply.text, msg.reply_target.as_str()).with_parse_mode(reply.parse_mode))
            .await
    }

    async fn route(
        &self,
        user_id: &UserId,
        text: &str,
        typing: Option<(&dyn Channel, &str)>,
    ) -> OutboundReply {
        match self.gate.check(user_id).await {
            GateDecision::Allowed(_) => {
                if let Some((channel, recipient)) = typing {
                    if let Err(e) = channel.start_typing(recipient).await {
                        tracing::debug!("Failed to send typing indicator: {e}");
                    }
                }
                let outcome = self.completion.complete(user_id, text).await;
                OutboundReply::plain(outcome.into_reply_text())
            }
            GateDecision::NotSubscribed(_) | GateDecision::LookupFailed(_) => {
                OutboundReply::html(subscription_notice(self.gate.channel()))
            }
        }
    }
}
