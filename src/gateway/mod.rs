//! HTTP gateway: liveness routes plus the Telegram webhook endpoint.
//!
//! The webhook path carries a secret derived from the bot token, so only
//! Telegram (which learned the URL through `setWebhook`) can post updates.

use crate::channels::{ChannelMessage, telegram};
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Hex characters of the token digest used as the webhook path segment.
const WEBHOOK_PATH_LEN: usize = 32;

#[derive(Clone)]
pub struct GatewayState {
    tx: mpsc::Sender<ChannelMessage>,
    webhook_path: Arc<str>,
}

impl GatewayState {
    pub fn new(tx: mpsc::Sender<ChannelMessage>, webhook_path: impl Into<Arc<str>>) -> Self {
        Self {
            tx,
            webhook_path: webhook_path.into(),
        }
    }
}

/// Secret path segment for `bot_token`'s webhook.
pub fn webhook_path_for(bot_token: &str) -> String {
    let digest = hex::encode(Sha256::digest(bot_token.as_bytes()));
    digest[..WEBHOOK_PATH_LEN].to_string()
}

/// Public URL Telegram should deliver updates to.
pub fn webhook_url(base_url: &str, webhook_path: &str) -> String {
    format!("{}/webhook/{webhook_path}", base_url.trim_end_matches('/'))
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/webhook/{path}", post(handle_webhook))
        .with_state(state)
}

/// Bind `host:port` and serve until the listener fails.
pub async fn run_gateway(host: &str, port: u16, state: GatewayState) -> Result<()> {
    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind gateway to {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!("Gateway listening on http://{addr}");

    crate::health::mark_component_ok("gateway");
    axum::serve(listener, router(state))
        .await
        .context("Gateway server stopped")
}

async fn handle_root() -> &'static str {
    "Bot is running"
}

async fn handle_health() -> impl IntoResponse {
    Json(crate::health::snapshot_json())
}

async fn handle_webhook(
    State(state): State<GatewayState>,
    Path(path): Path<String>,
    Json(update): Json<serde_json::Value>,
) -> StatusCode {
    if path != *state.webhook_path {
        return StatusCode::NOT_FOUND;
    }

    // Unsupported updates are acknowledged so Telegram does not redeliver them.
    let Some(msg) = telegram::parse_update(&update) else {
        return StatusCode::OK;
    };

    if state.tx.send(msg).await.is_err() {
        tracing::error!("Webhook update dropped: dispatcher is not running");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
