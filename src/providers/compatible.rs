//! Generic OpenAI-compatible provider.
//! DeepSeek, OpenAI, Groq, Mistral and most hosted LLM APIs accept the same
//! `/v1/chat/completions` request, so one implementation covers all of them.

use crate::providers::traits::{ChatMessage, Provider, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Reasoning models may put their whole answer in `reasoning_content`.
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl ResponseMessage {
    fn effective_content(self) -> Option<String> {
        match self.content {
            Some(c) if !c.is_empty() => Some(c),
            _ => self.reasoning_content.filter(|c| !c.is_empty()),
        }
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10).min(timeout))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn with_auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key)
    }

    async fn send_chat(&self, request: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let req = self.with_auth_headers(self.client.post(self.chat_completions_url()).json(request));
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let body = response.text().await?;
        parse_first_choice(&body)
    }
}

/// Extract the first choice's message text from a chat completions body.
fn parse_first_choice(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;

    choice
        .message
        .and_then(ResponseMessage::effective_content)
        .ok_or_else(|| ProviderError::MalformedResponse("first choice has no content".into()))
}

fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_with_history(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model,
            messages,
            temperature,
        };

        // The client timeout bounds each phase; this bounds the whole exchange.
        match tokio::time::timeout(self.timeout, self.send_chat(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    async fn warmup(&self) -> anyhow::Result<()> {
        self.with_auth_headers(self.client.get(format!("{}/v1/models", self.base_url)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider(url: &str) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("DeepSeek", url, "sk-test", Duration::from_secs(60))
    }

    #[test]
    fn strips_trailing_slash() {
        let p = make_provider("https://api.deepseek.com/");
        assert_eq!(p.base_url, "https://api.deepseek.com");
        assert_eq!(
            p.chat_completions_url(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_serializes_model_messages_temperature() {
        let messages = vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi")];
        let req = ChatRequest {
            model: "deepseek-chat",
            messages: &messages,
            temperature: 0.4,
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["temperature"], 0.4);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["messages"][1]["role"], "assistant");
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"A"}},{"message":{"content":"B"}}]}"#;
        assert_eq!(parse_first_choice(body).unwrap(), "A");
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_first_choice(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn missing_choices_is_malformed() {
        let err = parse_first_choice(r#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn missing_message_is_malformed() {
        let err = parse_first_choice(r#"{"choices":[{}]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_first_choice("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn reasoning_content_used_when_content_empty() {
        let body = r#"{"choices":[{"message":{"content":"","reasoning_content":"Thinking"}}]}"#;
        assert_eq!(parse_first_choice(body).unwrap(), "Thinking");
    }

    #[test]
    fn reasoning_content_ignored_when_content_present() {
        let body = r#"{"choices":[{"message":{"content":"Hello","reasoning_content":"Ignored"}}]}"#;
        assert_eq!(parse_first_choice(body).unwrap(), "Hello");
    }

    #[test]
    fn unicode_content_survives() {
        let body = r#"{"choices":[{"message":{"content":"Привет Ω"}}]}"#;
        assert_eq!(parse_first_choice(body).unwrap(), "Привет \u{03A9}");
    }

    #[test]
    fn truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 2), "hé…");
        assert_eq!(truncate_for_log("short", 10), "short");
    }

    #[test]
    fn api_key_is_sent_as_bearer_token() {
        let p = make_provider("https://api.deepseek.com");
        let req = p
            .with_auth_headers(p.client.post(p.chat_completions_url()))
            .build()
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer sk-test");
        assert_eq!(p.name(), "DeepSeek");
    }
}
