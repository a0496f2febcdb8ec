//! Inbound pipeline - one reader task per accepted connection.
//!
//! Turns raw socket reads into [`Message`] values and hands them to the
//! bounded queue. There is no length framing: one read is trusted to carry
//! one logical message, which holds while senders write small messages in a
//! single call. This is a known weakness of the wire format, preserved for
//! compatibility rather than strengthened.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Message;
use crate::registry::ConnectionRegistry;

/// Fixed read buffer size; also the upper bound on one message.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Reader task for a single connection.
///
/// Any read failure (including peer close) is terminal for this connection
/// only: the peer is deregistered, the task ends, and nothing propagates to
/// other connections or the relay itself.
pub struct InboundPipeline {
    reader: OwnedReadHalf,
    origin: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    queue: mpsc::Sender<Message>,
}

impl InboundPipeline {
    pub fn new(
        reader: OwnedReadHalf,
        origin: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        queue: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            reader,
            origin,
            registry,
            queue,
        }
    }

    /// Runs the read loop until the connection fails or closes.
    pub async fn run(mut self) {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            match self.reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(peer = %self.origin, "Peer closed connection");
                    break;
                }
                Ok(n) => {
                    let msg = Message {
                        origin: self.origin,
                        payload: buf[..n].to_vec(),
                    };

                    // Blocks when the queue is full: backpressure on fast
                    // senders instead of dropping or buffering unboundedly.
                    if self.queue.send(msg).await.is_err() {
                        debug!(peer = %self.origin, "Message queue closed, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    debug!(peer = %self.origin, error = %e, "Read failed");
                    break;
                }
            }
        }

        if self.registry.remove(self.origin).await {
            info!(peer = %self.origin, "Connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;
    use tokio::time::{timeout, Duration};

    async fn accepted_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let client = TcpStream::connect(addr).await.expect("connect");
        let (server, peer_addr) = listener.accept().await.expect("accept");
        (client, server, peer_addr)
    }

    #[tokio::test]
    async fn forwards_one_read_as_one_message() {
        let (mut client, server, peer_addr) = accepted_pair().await;
        let registry = Arc::new(ConnectionRegistry::new());
        let (reader, writer) = server.into_split();
        registry.add(peer_addr, Arc::new(Mutex::new(writer))).await;

        let (tx, mut rx) = mpsc::channel(10);
        tokio::spawn(InboundPipeline::new(reader, peer_addr, Arc::clone(&registry), tx).run());

        client.write_all(b"alice: hi").await.expect("write");

        let msg = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no timeout")
            .expect("message");
        assert_eq!(msg.origin, peer_addr);
        assert_eq!(msg.payload, b"alice: hi");
    }

    #[tokio::test]
    async fn peer_close_deregisters_connection() {
        let (client, server, peer_addr) = accepted_pair().await;
        let registry = Arc::new(ConnectionRegistry::new());
        let (reader, writer) = server.into_split();
        registry.add(peer_addr, Arc::new(Mutex::new(writer))).await;

        let (tx, _rx) = mpsc::channel(10);
        let handle =
            tokio::spawn(InboundPipeline::new(reader, peer_addr, Arc::clone(&registry), tx).run());

        drop(client);

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("no timeout")
            .expect("task");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn full_queue_blocks_the_producer() {
        let (mut client, server, peer_addr) = accepted_pair().await;
        let registry = Arc::new(ConnectionRegistry::new());
        let (reader, _writer) = server.into_split();

        // Capacity 2 and no consumer: the third send must block.
        let (tx, mut rx) = mpsc::channel(2);
        tokio::spawn(InboundPipeline::new(reader, peer_addr, registry, tx).run());

        for _ in 0..3 {
            client.write_all(b"m").await.expect("write");
            // Separate writes so each arrives as its own read.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Two messages fill the queue; the third is stuck in the pipeline.
        assert_eq!(rx.len(), 2);

        // Draining one slot lets the blocked producer complete.
        rx.recv().await.expect("first message");
        let third = timeout(Duration::from_secs(1), async {
            rx.recv().await.expect("second message");
            rx.recv().await.expect("third message")
        })
        .await
        .expect("producer unblocked");
        assert_eq!(third.payload, b"m");
    }
}
