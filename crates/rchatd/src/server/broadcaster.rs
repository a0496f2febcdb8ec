//! Broadcaster - single consumer of the message queue.
//!
//! Drains the bounded queue in FIFO order and writes each payload to every
//! registered connection, the originator included. One stalled peer can
//! delay delivery to the others for up to the write timeout; this
//! head-of-line blocking is a documented property of the design, bounded
//! rather than hidden behind unbounded per-peer buffers.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Message;
use crate::registry::ConnectionRegistry;

/// Fan-out task: consumes the queue, writes to every live peer.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
    queue: mpsc::Receiver<Message>,
    cancel_token: CancellationToken,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        write_timeout: Duration,
        queue: mpsc::Receiver<Message>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            write_timeout,
            queue,
            cancel_token,
        }
    }

    /// Runs until the queue closes or shutdown is signalled.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Broadcaster shutting down");
                    break;
                }

                msg = self.queue.recv() => {
                    match msg {
                        Some(msg) => self.broadcast(&msg).await,
                        None => {
                            debug!("Message queue closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Fans one message out to every registered peer.
    ///
    /// A write failure or timeout removes only the affected peer; the
    /// fan-out always continues to the rest.
    async fn broadcast(&self, msg: &Message) {
        let peers = self.registry.snapshot().await;
        debug!(
            origin = %msg.origin,
            bytes = msg.payload.len(),
            peers = peers.len(),
            "Broadcasting message"
        );

        let mut failed = Vec::new();
        for (addr, writer) in peers {
            let mut writer = writer.lock().await;
            let result = timeout(self.write_timeout, async {
                writer.write_all(&msg.payload).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(peer = %addr, error = %e, "Write failed, dropping peer");
                    failed.push(addr);
                }
                Err(_) => {
                    warn!(peer = %addr, "Write timed out, dropping peer");
                    failed.push(addr);
                }
            }
        }

        for addr in failed {
            self.registry.remove(addr).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;
    use tokio::time::Duration;

    async fn registered_peer(
        registry: &ConnectionRegistry,
    ) -> (SocketAddr, TcpStream, crate::registry::PeerWriter) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let client = TcpStream::connect(addr).await.expect("connect");
        let (server, peer_addr) = listener.accept().await.expect("accept");
        let (_, writer) = server.into_split();
        let writer = Arc::new(Mutex::new(writer));
        registry.add(peer_addr, Arc::clone(&writer)).await;
        (peer_addr, client, writer)
    }

    fn spawn_broadcaster(
        registry: Arc<ConnectionRegistry>,
    ) -> (mpsc::Sender<Message>, CancellationToken) {
        let (tx, rx) = mpsc::channel(10);
        let cancel_token = CancellationToken::new();
        let broadcaster =
            Broadcaster::new(registry, Duration::from_secs(1), rx, cancel_token.clone());
        tokio::spawn(broadcaster.run());
        (tx, cancel_token)
    }

    async fn read_exact(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(1), client.read_exact(&mut buf))
            .await
            .expect("no timeout")
            .expect("read");
        buf
    }

    fn message(payload: &[u8]) -> Message {
        Message {
            origin: "127.0.0.1:9999".parse().expect("addr"),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_every_peer() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut alice, _w1) = registered_peer(&registry).await;
        let (_, mut bob, _w2) = registered_peer(&registry).await;

        let (tx, _cancel) = spawn_broadcaster(Arc::clone(&registry));
        tx.send(message(b"alice: hi")).await.expect("send");

        assert_eq!(read_exact(&mut alice, 9).await, b"alice: hi");
        assert_eq!(read_exact(&mut bob, 9).await, b"alice: hi");
    }

    #[tokio::test]
    async fn messages_are_delivered_in_queue_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut client, _w) = registered_peer(&registry).await;

        let (tx, _cancel) = spawn_broadcaster(Arc::clone(&registry));
        tx.send(message(b"one")).await.expect("send");
        tx.send(message(b"two")).await.expect("send");
        tx.send(message(b"three")).await.expect("send");

        assert_eq!(read_exact(&mut client, 11).await, b"onetwothree");
    }

    #[tokio::test]
    async fn failed_peer_is_removed_and_others_still_served() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_, mut alice, _alice_writer) = registered_peer(&registry).await;
        let (_, _bob, bob_writer) = registered_peer(&registry).await;

        // Shutting the write half down makes every further write fail
        // immediately, simulating a dead peer deterministically.
        bob_writer
            .lock()
            .await
            .shutdown()
            .await
            .expect("shutdown bob");

        let (tx, _cancel) = spawn_broadcaster(Arc::clone(&registry));
        tx.send(message(b"alice: hi")).await.expect("send");

        // Alice is still served despite bob's failure.
        assert_eq!(read_exact(&mut alice, 9).await, b"alice: hi");

        // Bob is removed; subsequent broadcasts no longer attempt him.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.len().await, 1);

        tx.send(message(b"again")).await.expect("send");
        assert_eq!(read_exact(&mut alice, 5).await, b"again");
    }

    #[tokio::test]
    async fn queue_close_stops_the_broadcaster() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel::<Message>(10);
        let broadcaster = Broadcaster::new(
            registry,
            Duration::from_secs(1),
            rx,
            CancellationToken::new(),
        );
        let handle = tokio::spawn(broadcaster.run());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("no timeout")
            .expect("task");
    }
}
