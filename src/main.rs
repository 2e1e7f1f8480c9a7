//! session-relay
//!
//! Reads JSON lines `{"streamKey": ..., "payload": {...}}` from stdin and
//! broadcasts them over the configured real-time connection.
//!
//! ```text
//!  stdin ──► Broadcaster ──► throttle ──► offline queue ──► ConnectionSupervisor ──► WebSocket
//!                 ▲                                               │
//!                 └──────────── EventBus (connection:changed) ◄───┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use session_relay::config::watcher::{log_restart_required, ConfigWatcher};
use session_relay::config::{load_config, RelayConfig};
use session_relay::lifecycle::{shutdown_signal, Relay, Shutdown};
use session_relay::observability::{logging, metrics};
use session_relay::OutboundMessage;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "session-relay")]
#[command(about = "Relay live session progress over a resilient connection", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `connection.url`.
    #[arg(short, long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(url) = cli.url {
        config.connection.url = url;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-relay starting");
    tracing::info!(
        url = %config.connection.url,
        throttle_ms = config.broadcaster.throttle_ms,
        max_queue_per_stream = config.broadcaster.max_queue_per_stream,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = Relay::websocket(
        &config,
        Some(Arc::new(|connected: bool| {
            tracing::info!(connected, "Connectivity changed");
        })),
    );
    relay.start();

    let shutdown = Shutdown::new();
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let broadcaster = Arc::clone(&relay.broadcaster);
            let mut stop = shutdown.subscribe();
            let mut current = config.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(next) = updates.recv() => {
                            log_restart_required(&current, &next);
                            if next.broadcaster != current.broadcaster {
                                broadcaster.apply_settings(next.broadcaster.clone());
                            }
                            current = next;
                        }
                        _ = stop.recv() => break,
                        else => break,
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<OutboundMessage>(&line) {
                    Ok(message) => relay.broadcaster.send(&message.stream_key, message.payload).await,
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed input line"),
                },
                Ok(None) => {
                    tracing::info!("Input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    let drained = relay.shutdown(DRAIN_TIMEOUT).await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
