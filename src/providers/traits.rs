use async_trait::async_trait;
use serde::Serialize;

/// One message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Failure talking to a completion backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request did not finish within the configured bound.
    #[error("request timed out")]
    Timeout,
    /// Connection, DNS, TLS or other transport-level failure.
    #[error("request failed: {0}")]
    Request(String),
    /// The backend answered with a non-2xx status.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },
    /// A response arrived but lacked the fields we need.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // A refused or timed-out connect is a transport failure, not a slow backend.
        if e.is_connect() {
            Self::Request(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// A chat completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Send the full ordered conversation and return the first choice's text.
    async fn chat_with_history(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> Result<String, ProviderError>;

    /// Warm up the HTTP connection pool (TLS handshake, DNS).
    /// Default implementation is a no-op.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_role_and_content() {
        let json = serde_json::to_string(&ChatMessage::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }

    #[test]
    fn provider_error_display_includes_status() {
        let err = ProviderError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "API error (503): overloaded");
    }

    #[tokio::test]
    async fn connect_failure_is_a_request_error_even_with_connect_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let err = client.get(url).send().await.unwrap_err();
        assert!(err.is_connect());

        let mapped = ProviderError::from(err);
        assert!(matches!(mapped, ProviderError::Request(_)), "got {mapped:?}");
    }
}
