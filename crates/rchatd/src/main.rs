//! rchatd - chat relay daemon.
//!
//! Accepts client connections over TCP and rebroadcasts every received
//! message to all connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (127.0.0.1:8080)
//! rchatd
//!
//! # Listen elsewhere
//! rchatd --listen 0.0.0.0:9000
//!
//! # Enable debug logging
//! RUST_LOG=rchatd=debug rchatd
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT trigger a graceful shutdown: the listener closes, the
//! broadcaster drains, and every client connection is shut down.

use std::net::SocketAddr;
use std::process;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rchatd::server::{RelayConfig, RelayServer, DEFAULT_LISTEN_ADDR};

/// rchat relay daemon
#[derive(Parser, Debug)]
#[command(name = "rchatd", version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rchatd=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "rchatd starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let config = RelayConfig {
        listen_addr: args.listen,
        ..Default::default()
    };

    let server = RelayServer::bind(config, cancel_token).await?;
    server.run().await;

    info!("rchatd stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
