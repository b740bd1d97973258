//! # Equine Gateway
//!
//! Receives telemetry from sensor nodes over the mesh radio and stores it.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Open and configure the radio, then wait for it to join the network
//!    - Open the telemetry store
//!
//! 2. **Main Loop**
//!    - Poll the radio, reassemble fragments, decode and store messages
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Discard incomplete messages
//!    - Close the store
//!
//! Startup failures (configuration, radio) exit with a non-zero status.

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use equine_telemetry::config::Config;
use equine_telemetry::gateway::Gateway;
use equine_telemetry::radio::serial::{RadioOptions, SerialRadio};
use equine_telemetry::storage::jsonl::JsonlStore;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Equine Gateway v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = config_path(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;
    info!("Configuration loaded from {}", config_path);

    let mut radio = SerialRadio::open(
        &config.radio.port,
        config.radio.baud_rate,
        RadioOptions::from(&config),
    )?;
    radio
        .configure(&config.radio)
        .await
        .context("failed to configure radio")?;

    let status = radio
        .wait_for_join(config.gateway.join_timeout())
        .await
        .context("radio stopped responding while joining")?;
    if !status.is_joined() {
        warn!("Continuing without network association: {}", status);
    }

    let store = JsonlStore::from_config(&config.storage).context("failed to open telemetry store")?;
    let mut gateway = Gateway::new(radio, store, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Press Ctrl+C to exit");
    let stats = gateway.run(shutdown_rx).await?;
    info!("Total messages stored: {}", stats.messages_stored);

    Ok(())
}

/// Configuration path from the command line
fn config_path(mut args: impl Iterator<Item = String>) -> String {
    args.nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}
