use crate::channels::{Channel, ChannelMessage, TelegramChannel};
use crate::completion::CompletionClient;
use crate::config::{Config, TransportMode};
use crate::gate::SubscriptionGate;
use crate::gateway::{self, GatewayState};
use crate::providers::{self, Provider};
use crate::router::MessageRouter;
use crate::session::HistoryStore;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Inbound messages buffered between the listener and the dispatcher.
const INBOUND_QUEUE: usize = 100;

/// Wire everything from `config` and run until Ctrl+C.
pub async fn run(config: Config, mode: TransportMode) -> Result<()> {
    config.validate()?;

    let initial_backoff = config.reliability.channel_initial_backoff_secs.max(1);
    let max_backoff = config
        .reliability
        .channel_max_backoff_secs
        .max(initial_backoff);

    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN is not set")?;
    let telegram =
        Arc::new(TelegramChannel::new(bot_token.clone()).with_api_base(&config.telegram.api_base));
    let username = verify_bot(&telegram).await?;
    tracing::info!("Authenticated as @{username}");

    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(&config.completion)?);
    if let Err(e) = provider.warmup().await {
        tracing::warn!("Completion backend warmup failed (continuing): {e}");
    }

    let router = Arc::new(build_router(&config, telegram.clone(), provider)?);
    crate::health::mark_component_ok("daemon");

    let (tx, rx) = mpsc::channel::<ChannelMessage>(INBOUND_QUEUE);
    let mut handles: Vec<JoinHandle<()>> =
        vec![spawn_dispatcher(router, telegram.clone() as Arc<dyn Channel>, rx)];

    let webhook_path = gateway::webhook_path_for(&bot_token);
    let host = config.gateway.host.clone();
    let port = config.gateway.port;

    match &mode {
        TransportMode::Polling => {
            // Polling still serves `/` and `/health` for hosts that probe the port.
            let state = GatewayState::new(tx.clone(), webhook_path);
            handles.push(spawn_component_supervisor(
                "gateway",
                initial_backoff,
                max_backoff,
                move || {
                    let state = state.clone();
                    let host = host.clone();
                    async move { gateway::run_gateway(&host, port, state).await }
                },
            ));

            let channel = telegram.clone();
            handles.push(spawn_component_supervisor(
                "telegram",
                initial_backoff,
                max_backoff,
                move || {
                    let channel = channel.clone();
                    let tx = tx.clone();
                    async move {
                        channel
                            .delete_webhook()
                            .await
                            .context("Failed to clear Telegram webhook before polling")?;
                        crate::health::mark_component_ok("telegram");
                        channel.listen(tx).await
                    }
                },
            ));
        }
        TransportMode::Webhook { base_url } => {
            let url = gateway::webhook_url(base_url, &webhook_path);
            let state = GatewayState::new(tx, webhook_path);
            let channel = telegram.clone();
            handles.push(spawn_component_supervisor(
                "gateway",
                initial_backoff,
                max_backoff,
                move || {
                    let state = state.clone();
                    let host = host.clone();
                    let channel = channel.clone();
                    let url = url.clone();
                    async move {
                        channel
                            .set_webhook(&url)
                            .await
                            .context("Failed to register Telegram webhook")?;
                        gateway::run_gateway(&host, port, state).await
                    }
                },
            ));
        }
    }

    let mode_name = match mode {
        TransportMode::Polling => "polling",
        TransportMode::Webhook { .. } => "webhook",
    };
    tracing::info!(
        mode = mode_name,
        host = %config.gateway.host,
        port,
        "Bot started; Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    crate::health::mark_component_error("daemon", "shutdown requested");

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

/// Confirm the bot token is accepted before anything else starts.
pub async fn verify_bot(telegram: &TelegramChannel) -> Result<String> {
    telegram
        .get_me()
        .await
        .context("Telegram rejected the bot token (getMe failed)")
}

/// Assemble the gate, completion client and router for `config`.
pub fn build_router(
    config: &Config,
    telegram: Arc<TelegramChannel>,
    provider: Arc<dyn Provider>,
) -> Result<MessageRouter> {
    let gate = SubscriptionGate::new(telegram, config.channel_ref()?);
    let history = Arc::new(HistoryStore::new(config.history.window));
    let completion = CompletionClient::new(
        provider,
        history,
        config.completion.model.clone(),
        config.completion.temperature,
    );
    Ok(MessageRouter::new(gate, completion))
}

/// Drain `rx`, handling each message on its own task so users do not wait
/// on each other.
pub fn spawn_dispatcher(
    router: Arc<MessageRouter>,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::Receiver<ChannelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let router = router.clone();
            let channel = channel.clone();
            tokio::spawn(async move {
                if let Err(e) = router.dispatch(channel.as_ref(), &msg).await {
                    tracing::error!(
                        channel = %channel.name(),
                        reply_target = %msg.reply_target,
                        "Failed to deliver reply: {e:#}"
                    );
                }
            });
        }
        tracing::info!("Dispatcher stopped: inbound queue closed");
    })
}

fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            crate::health::mark_component_starting(name);
            match run_component().await {
                Ok(()) => {
                    crate::health::mark_component_error(name, "component exited unexpectedly");
                    tracing::warn!("Component '{name}' exited unexpectedly");
                }
                Err(e) => {
                    crate::health::mark_component_error(name, format!("{e:#}"));
                    tracing::error!("Component '{name}' failed: {e:#}");
                }
            }

            crate::health::bump_component_restart(name);
            tracing::info!("Restarting '{name}' in {backoff}s");
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}
