//! # Gain Server - Main Application Entry Point
//!
//! Listens for TCP connections, applies the configured decibel gain to every
//! chunk a client streams in, and streams the processed chunks back.
//!
//! ## Application Architecture:
//! - **config**: Server configuration (TOML file + environment variables)
//! - **server**: Accept loop with a cap on concurrent connections
//! - **connection**: Per-connection decode → gain → encode loop
//! - **state**: Connection and chunk counters, logged at shutdown

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

use wav_gain_stream::config::AppConfig;
use wav_gain_stream::server::GainServer;
use wav_gain_stream::telemetry::init_tracing;

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Binds the listener** on the configured host and port
/// 4. **Serves connections** until a shutdown signal arrives
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing("wav_gain_stream=info,gain_server=info")?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting gain-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {} (gain {} dB, max {} connections)",
        config.bind_addr(),
        config.processing.gain_db,
        config.server.max_concurrent_connections
    );

    let server = GainServer::from_config(&config)?;
    let listener = GainServer::bind(config.bind_addr()).await?;

    setup_signal_handlers();

    server.serve(listener, wait_for_shutdown()).await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Set the shutdown flag on SIGTERM or SIGINT (Ctrl+C).
///
/// Connections already accepted finish on their own tasks; only new accepts stop.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sigint) => sigint,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Resolve once the shutdown flag is set, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
    info!("Shutdown signal received, no longer accepting connections");
}
