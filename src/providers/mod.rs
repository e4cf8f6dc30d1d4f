pub mod compatible;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use traits::{ChatMessage, Provider, ProviderError};

use crate::config::CompletionConfig;
use std::time::Duration;

/// Factory: build the completion backend from config.
pub fn create_provider(config: &CompletionConfig) -> anyhow::Result<Box<dyn Provider>> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Completion API key not set. Set DEEPSEEK_API_KEY."))?;

    if config.base_url.trim().is_empty() {
        anyhow::bail!("Completion base URL is empty. Set COMPLETION_BASE_URL.");
    }

    Ok(Box::new(OpenAiCompatibleProvider::new(
        &provider_display_name(&config.base_url),
        &config.base_url,
        api_key,
        Duration::from_secs(config.timeout_secs.max(1)),
    )))
}

fn provider_display_name(base_url: &str) -> String {
    let host = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    match host {
        "api.deepseek.com" => "DeepSeek".to_string(),
        "api.openai.com" => "OpenAI".to_string(),
        "" => "Custom".to_string(),
        other => other.to_string(),
    }
}
