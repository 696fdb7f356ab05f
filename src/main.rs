mod commands;
mod config;
mod http;
mod led;
mod servo;
mod system;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::led::{Led, LoggingLed};
use crate::servo::{LoggingPwm, PwmServo};
use crate::system::HostMemoryProbe;
use crate::telegram::api::{mask_token, TelegramClient};
use crate::telegram::controller::BotController;
use crate::telegram::transport::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,servo_relay_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bot token: {}", mask_token(&config.telegram.bot_token));
    info!("  API: {}", config.telegram.api_base_url);
    info!(
        "  Poll: timeout {}s, interval {}ms, queue {}",
        config.telegram.poll_timeout_secs,
        config.telegram.poll_interval_ms,
        config.telegram.queue_capacity
    );

    let transport = HttpTransport::new(
        config.telegram.request_timeout(),
        config.telegram.long_poll_request_timeout(),
    )?;
    let client = TelegramClient::new(
        Arc::new(transport),
        &config.telegram.api_base_url,
        &config.telegram.bot_token,
    );
    let bot = BotController::new(Arc::new(client), &config.telegram);

    let servo = PwmServo::new(LoggingPwm::new(), config.servo.clone());
    let led: Arc<dyn Led> = Arc::new(LoggingLed::new());
    commands::register_builtin_commands(
        &bot,
        Arc::new(servo),
        Arc::clone(&led),
        Arc::new(HostMemoryProbe::new()),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = if config.http.enabled {
        let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.http.bind_addr))?;
        Some(tokio::spawn(http::serve(listener, led, async {
            let _ = shutdown_rx.await;
        })))
    } else {
        info!("LED server disabled");
        None
    };

    bot.start_polling()?;
    info!("Bot is {:?}, press Ctrl-C to stop", bot.state());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    bot.stop_polling();
    info!("Stopped at update offset {}", bot.last_update_id());

    let _ = shutdown_tx.send(());
    if let Some(server) = server {
        server.await.context("LED server task failed")??;
    }
    Ok(())
}
