//! tgbridge - Telegram <-> IRC relay
//!
//! Long-polls the Telegram Bot API and relays group chat messages into
//! mapped IRC channels, and forwards IRC channel messages and topic
//! changes back to the bound Telegram chats.

mod bridge;
mod common;
mod config;
mod irc;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use bridge::{FeedbackGuard, OutboundForwarder, RelayContext, RelayLoop};
use common::error::AppError;
use config::{env::get_config_path, load_and_validate, Config};
use telegram::TelegramClient;

/// How long background tasks get to wind down after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the Telegram side. A malformed bot token is fatal here, before
/// anything starts polling.
fn build_telegram(config: &Config) -> Result<(FeedbackGuard, TelegramClient), AppError> {
    let guard = FeedbackGuard::from_token(&config.telegram.token)?;
    let client = TelegramClient::new(&config.telegram)?;
    Ok((guard, client))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("tgbridge v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  IRC server: {}:{}", config.irc.host, config.irc.port);
    info!("  IRC nick: {}", config.irc.nick);
    for channel in &config.irc.channels {
        match channel.chat_id {
            Some(chat_id) if chat_id != 0 => info!("  {} <-> chat {}", channel.name, chat_id),
            _ => info!("  {} (not bridged)", channel.name),
        }
    }

    let (guard, telegram) = build_telegram(&config)?;
    info!("Telegram bot id: {}", guard.bot_id());
    let telegram = Arc::new(telegram);

    // ============================================================
    // IRC client and local event bus
    // ============================================================
    let (irc_handle, irc_connection) = irc::new_client(config.irc.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Subscribe before anything can publish
    let events_rx = irc_handle.subscribe();

    // ============================================================
    // Start relay loop and outbound forwarder
    // ============================================================
    let mut relay = RelayLoop::new(RelayContext::new(
        telegram.clone(),
        irc_handle.clone(),
        guard,
        &config,
    ));
    relay.start();

    let forwarder = OutboundForwarder::new(telegram, irc_handle, guard);
    let mut forward_task = tokio::spawn(forwarder.run(events_rx, shutdown_rx.clone()));

    let mut irc_task = tokio::spawn(irc_connection.run_forever(shutdown_rx));

    // ============================================================
    // Run until a signal or a task exits
    // ============================================================
    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping bridge...");
            true
        }
        _ = &mut irc_task => false,
        _ = &mut forward_task => false,
    };

    if !shutdown {
        warn!("A bridge task exited unexpectedly");
    }

    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed (tasks already exited): {}", e);
    }
    relay.shutdown(SHUTDOWN_GRACE).await;

    if shutdown {
        match tokio::time::timeout(SHUTDOWN_GRACE, irc_task).await {
            Ok(Ok(())) => info!("IRC client disconnected gracefully"),
            Ok(Err(e)) => warn!("IRC client task panicked: {}", e),
            Err(_) => warn!("IRC disconnect timed out"),
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, forward_task).await.is_err() {
            warn!("Outbound forwarder did not stop in time");
        }
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
