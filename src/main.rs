#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::missing_errors_doc)]

use anyhow::Result;
use chatgate::config::{Config, TransportMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscription-gated Telegram bot backed by a chat completion API.
#[derive(Parser, Debug)]
#[command(name = "chatgate")]
#[command(version)]
#[command(about = "Subscription-gated Telegram AI bot.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot (webhook mode when WEBHOOK_URL is set, otherwise long-polling)
    Run {
        /// TOML config file; environment variables override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port for the HTTP gateway (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host for the HTTP gateway (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Force long-polling even when a webhook URL is configured
        #[arg(long)]
        polling: bool,
    },

    /// Validate configuration and print it with secrets redacted
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match cli.command {
        Commands::Run {
            config,
            port,
            host,
            polling,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            config.validate()?;

            let mode = if polling {
                TransportMode::Polling
            } else {
                config.transport_mode()
            };
            chatgate::daemon::run(config, mode).await
        }
        Commands::CheckConfig { config } => {
            let config = Config::load(config.as_deref())?;
            config.validate()?;
            println!("{config:#?}");
            println!("Transport: {:?}", config.transport_mode());
            println!("Configuration OK");
            Ok(())
        }
    }
}
