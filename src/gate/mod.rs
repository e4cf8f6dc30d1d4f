//! Subscription gate — decides whether a user may talk to the bot by asking
//! the messaging platform whether they belong to a configured channel.
//!
//! The gate fails closed: any lookup error or unrecognised status denies.

use crate::session::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ── Channel reference ────────────────────────────────────────────

/// The channel users must be subscribed to, resolved once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    chat_id: String,
    link: Option<String>,
    title: String,
}

impl ChannelRef {
    /// Parse a channel reference. Accepts `https://t.me/name`, `t.me/name`,
    /// `@name`, `name`, or a numeric chat id such as `-1001234567890`.
    pub fn parse(raw: &str, title: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("channel reference is empty");
        }

        if raw.parse::<i64>().is_ok() {
            return Ok(Self {
                chat_id: raw.to_string(),
                link: None,
                title: title.to_string(),
            });
        }

        let lower = raw.to_ascii_lowercase();
        let is_link = lower.starts_with("http://")
            || lower.starts_with("https://")
            || lower.starts_with("t.me/")
            || lower.starts_with("telegram.me/");

        let (name, link) = if is_link {
            let path = raw.split(['?', '#']).next().unwrap_or_default();
            let name = path
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_start_matches('@');
            let link = if lower.starts_with("http") {
                raw.to_string()
            } else {
                format!("https://{raw}")
            };
            (name, link)
        } else {
            let name = raw.trim_start_matches('@');
            (name, format!("https://t.me/{name}"))
        };

        if name.starts_with('+') || lower.contains("/joinchat/") {
            anyhow::bail!(
                "channel reference '{raw}' is a private invite link; use the channel's @username or numeric id"
            );
        }
        if !is_valid_username(name) {
            anyhow::bail!("channel reference '{raw}' does not contain a usable channel username");
        }

        Ok(Self {
            chat_id: format!("@{name}"),
            link: Some(link),
            title: title.to_string(),
        })
    }

    /// Identifier to pass to the Bot API (`@name` or a numeric id).
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Public link to the channel, when one exists.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Membership ───────────────────────────────────────────────────

/// A user's membership status relative to a channel, in Bot API vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Other(String),
}

impl MembershipStatus {
    /// Only creators, administrators and members get through the gate.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creator => "creator",
            Self::Administrator => "administrator",
            Self::Member => "member",
            Self::Restricted => "restricted",
            Self::Left => "left",
            Self::Kicked => "kicked",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for MembershipStatus {
    fn from(s: &str) -> Self {
        match s {
            "creator" => Self::Creator,
            "administrator" => Self::Administrator,
            "member" => Self::Member,
            "restricted" => Self::Restricted,
            "left" => Self::Left,
            "kicked" => Self::Kicked,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MembershipStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MembershipStatus> for String {
    fn from(status: MembershipStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a membership lookup failed.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("membership lookup request failed: {0}")]
    Request(String),
    #[error("membership lookup rejected: {description}")]
    Api { description: String },
    #[error("membership lookup returned an unexpected payload: {0}")]
    Malformed(String),
}

/// Answers "what is this user's status in that channel?"
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn membership_status(
        &self,
        channel: &ChannelRef,
        user_id: &UserId,
    ) -> Result<MembershipStatus, LookupError>;
}

// ── Gate ─────────────────────────────────────────────────────────

/// Outcome of one gate check. Computed fresh per message, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed(MembershipStatus),
    NotSubscribed(MembershipStatus),
    LookupFailed(String),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

pub struct SubscriptionGate {
    lookup: Arc<dyn MembershipLookup>,
    channel: ChannelRef,
}

impl SubscriptionGate {
    pub fn new(lookup: Arc<dyn MembershipLookup>, channel: ChannelRef) -> Self {
        Self { lookup, channel }
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// Look up `user_id` and classify the result. Never returns an error.
    pub async fn check(&self, user_id: &UserId) -> GateDecision {
        match self.lookup.membership_status(&self.channel, user_id).await {
            Ok(status) if status.is_subscribed() => GateDecision::Allowed(status),
            Ok(status) => {
                tracing::info!(
                    user_id = %user_id,
                    status = %status,
                    channel = %self.channel.chat_id(),
                    "gate.denied"
                );
                GateDecision::NotSubscribed(status)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    channel = %self.channel.chat_id(),
                    "Subscription check failed, denying: {e}"
                );
                GateDecision::LookupFailed(e.to_string())
            }
        }
    }

    pub async fn is_authorized(&self, user_id: &UserId) -> bool {
        self.check(user_id).await.is_allowed()
    }
}
