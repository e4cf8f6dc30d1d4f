use crate::gate::ChannelRef;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

// ── Telegram ─────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Channel users must be subscribed to: `https://t.me/name`, `@name`,
    /// `name`, or a numeric chat id
    #[serde(default)]
    pub channel: Option<String>,
    /// Link text shown in the subscription notice
    #[serde(default = "default_channel_title")]
    pub channel_title: String,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_channel_title() -> String {
    "our channel".into()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: None,
            channel_title: default_channel_title(),
            api_base: default_telegram_api_base(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_deref().map(mask_secret))
            .field("channel", &self.channel)
            .field("channel_title", &self.channel_title)
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ── Completion API ───────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint root; `/v1/chat/completions` is appended
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_completion_temperature")]
    pub temperature: f64,
    /// Upper bound on a single completion call
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_completion_base_url() -> String {
    "https://api.deepseek.com".into()
}

fn default_completion_model() -> String {
    "deepseek-chat".into()
}

fn default_completion_temperature() -> f64 {
    0.4
}

fn default_completion_timeout_secs() -> u64 {
    60
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            temperature: default_completion_temperature(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── History ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Turns (user and assistant messages, counted individually) kept per user
    #[serde(default = "default_history_window")]
    pub window: usize,
}

fn default_history_window() -> usize {
    crate::session::DEFAULT_WINDOW
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: default_history_window(),
        }
    }
}

// ── Gateway (webhook mode) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Externally reachable base URL. When set, updates arrive by webhook
    /// instead of long-polling.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}

fn default_gateway_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            webhook_url: None,
        }
    }
}

// ── Reliability ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Initial backoff before restarting a failed listener
    #[serde(default = "default_channel_backoff_secs")]
    pub channel_initial_backoff_secs: u64,
    /// Backoff ceiling for listener restarts
    #[serde(default = "default_channel_backoff_max_secs")]
    pub channel_max_backoff_secs: u64,
}

fn default_channel_backoff_secs() -> u64 {
    5
}

fn default_channel_backoff_max_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            channel_initial_backoff_secs: default_channel_backoff_secs(),
            channel_max_backoff_secs: default_channel_backoff_max_secs(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// How inbound updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Polling,
    Webhook { base_url: String },
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        };

        if let Some(token) = get(&["TELEGRAM_BOT_TOKEN"]) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(channel) = get(&["TELEGRAM_CHANNEL_LINK", "TELEGRAM_CHANNEL"]) {
            self.telegram.channel = Some(channel);
        }
        if let Some(title) = get(&["TELEGRAM_CHANNEL_TITLE"]) {
            self.telegram.channel_title = title;
        }

        if let Some(key) = get(&["DEEPSEEK_API_KEY", "COMPLETION_API_KEY"]) {
            self.completion.api_key = Some(key);
        }
        if let Some(url) = get(&["COMPLETION_BASE_URL"]) {
            self.completion.base_url = url;
        }
        if let Some(model) = get(&["COMPLETION_MODEL"]) {
            self.completion.model = model;
        }
        if let Some(temp) = get(&["COMPLETION_TEMPERATURE"]).and_then(|s| s.parse::<f64>().ok()) {
            if (0.0..=2.0).contains(&temp) {
                self.completion.temperature = temp;
            }
        }
        if let Some(secs) = get(&["COMPLETION_TIMEOUT_SECS"]).and_then(|s| s.parse::<u64>().ok()) {
            self.completion.timeout_secs = secs;
        }

        if let Some(window) = get(&["HISTORY_WINDOW"]).and_then(|s| s.parse::<usize>().ok()) {
            self.history.window = window;
        }

        if let Some(url) = get(&["WEBHOOK_URL", "RENDER_EXTERNAL_URL"]) {
            self.gateway.webhook_url = Some(url);
        }
        if let Some(port) = get(&["PORT"]).and_then(|s| s.parse::<u16>().ok()) {
            self.gateway.port = port;
        }
        if let Some(host) = get(&["HOST"]) {
            self.gateway.host = host;
        }
    }

    /// Check that everything needed to start is present. Reports every
    /// missing setting at once.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if is_blank(self.telegram.bot_token.as_deref()) {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        if is_blank(self.telegram.channel.as_deref()) {
            missing.push("TELEGRAM_CHANNEL_LINK");
        }
        if is_blank(self.completion.api_key.as_deref()) {
            missing.push("DEEPSEEK_API_KEY");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required configuration: {}. Set them in the environment or config file.",
                missing.join(", ")
            );
        }

        self.channel_ref()?;

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            anyhow::bail!(
                "completion.temperature must be within 0.0..=2.0, got {}",
                self.completion.temperature
            );
        }
        if self.completion.timeout_secs == 0 {
            anyhow::bail!("completion.timeout_secs must be greater than zero");
        }
        if self.history.window == 0 {
            anyhow::bail!("history.window must be at least 1");
        }
        Ok(())
    }

    /// Parsed subscription channel reference.
    pub fn channel_ref(&self) -> Result<ChannelRef> {
        let raw = self
            .telegram
            .channel
            .as_deref()
            .context("TELEGRAM_CHANNEL_LINK is not set")?;
        ChannelRef::parse(raw, &self.telegram.channel_title)
    }

    pub fn transport_mode(&self) -> TransportMode {
        match self.gateway.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => TransportMode::Webhook {
                base_url: url.trim_end_matches('/').to_string(),
            },
            _ => TransportMode::Polling,
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "***".into()
    } else {
        format!("{visible}***")
    }
}
