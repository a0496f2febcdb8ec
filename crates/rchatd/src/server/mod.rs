//! TCP relay server: listener lifecycle, inbound pipelines, broadcaster.
//!
//! The server:
//! - Binds the listening socket and accepts connections in a loop
//! - Spawns an `InboundPipeline` task per client (a slow peer never blocks
//!   subsequent accepts)
//! - Runs a single `Broadcaster` task draining the bounded message queue
//! - Supports graceful shutdown via `CancellationToken`

mod broadcaster;
mod connection;

pub use broadcaster::Broadcaster;
pub use connection::{InboundPipeline, READ_BUFFER_SIZE};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::registry::ConnectionRegistry;

/// Default listen address, matching the original deployment.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default bound on the shared message queue. Producers block (backpressure)
/// when it fills; nothing is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default bound on one broadcast write to one peer. A peer that cannot
/// accept the payload within this window is treated as failed and removed.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One inbound message.
///
/// The origin is recorded for logging but not used to filter fan-out:
/// senders hear their own messages back (observed behavior of the original,
/// preserved as-is).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Remote address of the connection that produced the payload.
    pub origin: SocketAddr,

    /// Exactly the bytes of one socket read. Opaque to the relay.
    pub payload: Vec<u8>,
}

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,

    /// Capacity of the shared message queue.
    pub queue_capacity: usize,

    /// Per-peer write timeout during broadcast.
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            // The literal is a valid socket address; parse cannot fail.
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Errors that can occur while setting up the relay.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("failed to read local address: {0}")]
    LocalAddr(String),
}

/// TCP relay server.
///
/// Owns the listening socket and the top-level lifecycle; the registry is
/// created here and handed by `Arc` to pipelines and the broadcaster.
pub struct RelayServer {
    config: RelayConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    cancel_token: CancellationToken,
}

impl RelayServer {
    /// Binds the listening socket.
    pub async fn bind(
        config: RelayConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.listen_addr,
                error: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        Ok(Self {
            config,
            listener,
            local_addr,
            registry: Arc::new(ConnectionRegistry::new()),
            cancel_token,
        })
    }

    /// Actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the connection registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs the relay until the cancellation token fires.
    ///
    /// Accept errors are logged and the loop continues; only cancellation
    /// stops the server. On shutdown the queue is closed, the broadcaster
    /// drains what it already holds, and every registered connection is
    /// closed.
    pub async fn run(self) {
        info!(addr = %self.local_addr, "Relay listening");

        let (msg_tx, msg_rx) = mpsc::channel::<Message>(self.config.queue_capacity);

        let broadcaster = Broadcaster::new(
            Arc::clone(&self.registry),
            self.config.write_timeout,
            msg_rx,
            self.cancel_token.clone(),
        );
        let broadcaster_handle = tokio::spawn(broadcaster.run());

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Relay shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr, msg_tx.clone()).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep accepting other connections.
                        }
                    }
                }
            }
        }

        // Close the queue so the broadcaster finishes what it holds and stops.
        drop(msg_tx);
        if let Err(e) = broadcaster_handle.await {
            error!(error = %e, "Broadcaster task failed");
        }

        self.cleanup().await;
    }

    /// Registers a new connection and spawns its inbound pipeline.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        queue: mpsc::Sender<Message>,
    ) {
        info!(peer = %addr, "New connection");

        let (reader, writer) = stream.into_split();
        self.registry.add(addr, Arc::new(Mutex::new(writer))).await;

        let pipeline = InboundPipeline::new(reader, addr, Arc::clone(&self.registry), queue);
        tokio::spawn(pipeline.run());
    }

    /// Closes every registered connection on shutdown.
    async fn cleanup(&self) {
        for (addr, writer) in self.registry.drain().await {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %addr, error = %e, "Error closing connection");
            }
        }
        info!("Relay cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_original_deployment() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.queue_capacity, 10);
    }

    #[test]
    fn server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:8080".parse().expect("addr"),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:8080"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn bind_on_ephemeral_port_reports_local_addr() {
        let config = RelayConfig {
            listen_addr: "127.0.0.1:0".parse().expect("addr"),
            ..Default::default()
        };
        let server = RelayServer::bind(config, CancellationToken::new())
            .await
            .expect("bind");
        assert_ne!(server.local_addr().port(), 0);
    }
}
