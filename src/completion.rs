//! Completion client — turns a user's prompt plus their recent history into
//! one chat completion call and records the exchange.
//!
//! Failures never escape as errors. They become a user-facing notice, and
//! unlike successful replies they are not written back into history, so a
//! transient outage does not leak error text into later prompts.

use crate::providers::{ChatMessage, Provider, ProviderError};
use crate::session::{HistoryStore, Turn, UserId};
use std::sync::Arc;
use std::time::Instant;

pub const TIMEOUT_NOTICE: &str =
    "⚠ The AI service took too long to respond. Please try again in a moment.";
pub const MALFORMED_NOTICE: &str = "⚠ The AI service returned an unexpected response.";

/// Classified completion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFailure {
    Timeout,
    RequestFailure(String),
    MalformedResponse(String),
}

impl CompletionFailure {
    /// Text shown to the user in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => TIMEOUT_NOTICE.to_string(),
            Self::RequestFailure(detail) => format!("⚠ Request error: {detail}"),
            Self::MalformedResponse(_) => MALFORMED_NOTICE.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RequestFailure(_) => "request_failure",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<ProviderError> for CompletionFailure {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout => Self::Timeout,
            ProviderError::Request(detail) => Self::RequestFailure(detail),
            ProviderError::Status { status, .. } => {
                Self::RequestFailure(format!("the AI service answered with HTTP {status}"))
            }
            ProviderError::MalformedResponse(detail) => Self::MalformedResponse(detail),
        }
    }
}

/// Result of one completion. Both variants are valid replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Reply(String),
    Failed(CompletionFailure),
}

impl CompletionOutcome {
    /// The text to send back to the user.
    pub fn into_reply_text(self) -> String {
        match self {
            Self::Reply(text) => text,
            Self::Failed(failure) => failure.user_message(),
        }
    }
}

pub struct CompletionClient {
    provider: Arc<dyn Provider>,
    history: Arc<HistoryStore>,
    model: String,
    temperature: f64,
}

impl CompletionClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        history: Arc<HistoryStore>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            provider,
            history,
            model: model.into(),
            temperature,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Record `prompt`, ask the backend with the trimmed history, and record
    /// the reply on success.
    pub async fn complete(&self, user_id: &UserId, prompt: &str) -> CompletionOutcome {
        self.history.append(user_id, Turn::user(prompt));

        let messages: Vec<ChatMessage> = self
            .history
            .turns(user_id)
            .iter()
            .map(|turn| ChatMessage::new(turn.role().as_str(), turn.content()))
            .collect();

        tracing::debug!(
            provider = %self.provider.name(),
            model = %self.model,
            messages_count = messages.len(),
            "llm.request"
        );
        let started = Instant::now();

        match self
            .provider
            .chat_with_history(&messages, &self.model, self.temperature)
            .await
        {
            Ok(reply) => {
                let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(user_id = %user_id, duration_ms = ms, "llm.response");
                self.history.append(user_id, Turn::assistant(reply.clone()));
                CompletionOutcome::Reply(reply)
            }
            Err(e) => {
                let failure = CompletionFailure::from(e);
                tracing::warn!(
                    user_id = %user_id,
                    provider = %self.provider.name(),
                    kind = failure.kind(),
                    "Completion failed: {failure:?}"
                );
                CompletionOutcome::Failed(failure)
            }
        }
    }
}
