//! Relay connection handling for the terminal client.
//!
//! The client holds one TCP connection: a reader task prints every line the
//! relay broadcasts (decrypting bodies when encryption is on), while the
//! main loop turns stdin lines into sealed chat lines. The key text is
//! re-validated at each point of use, so a bad key aborts only the affected
//! send or receive, never the session.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rchat_wire::{line, Key};

/// Fixed read buffer size, matching the relay's per-read message cap.
const READ_BUFFER_SIZE: usize = 2048;

/// Client configuration, supplied by the operator.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay address, `host:port`.
    pub server_addr: String,

    /// Display name prefixed to every outgoing message.
    pub username: String,

    /// Shared key text when encryption is enabled; `None` sends plaintext.
    pub key_text: Option<String>,
}

/// Errors that end a client session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {error}")]
    Connect { addr: String, error: String },
}

/// Line-oriented chat client.
pub struct ChatClient {
    config: ClientConfig,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Connects and runs until stdin closes, the connection drops, or the
    /// cancellation token fires.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<(), ClientError> {
        let stream = TcpStream::connect(&self.config.server_addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: self.config.server_addr.clone(),
                error: e.to_string(),
            })?;
        info!(server = %self.config.server_addr, "Connected to relay");

        let (reader, mut writer) = stream.into_split();

        let read_task = tokio::spawn(read_loop(
            reader,
            self.config.key_text.clone(),
            cancel_token.clone(),
        ));

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,

                result = lines.next_line() => {
                    match result {
                        Ok(Some(text)) => {
                            let text = text.trim();
                            if text.is_empty() {
                                continue;
                            }
                            let Some(sealed) = self.seal_outgoing(text) else {
                                continue;
                            };
                            // One write call per message: the relay trusts
                            // one read to carry one logical message.
                            if let Err(e) = writer.write_all(sealed.as_bytes()).await {
                                error!(error = %e, "Failed to send message");
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("stdin closed");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read stdin");
                            break;
                        }
                    }
                }
            }
        }

        cancel_token.cancel();
        let _ = read_task.await;
        Ok(())
    }

    /// Renders one outgoing line, encrypting the body when configured.
    ///
    /// Returns `None` when the configured key text is invalid: the send is
    /// aborted, the connection stays up.
    fn seal_outgoing(&self, text: &str) -> Option<String> {
        let key = match &self.config.key_text {
            Some(key_text) => match Key::parse(key_text) {
                Ok(key) => Some(key),
                Err(e) => {
                    error!(error = %e, "Invalid encryption key, message not sent");
                    return None;
                }
            },
            None => None,
        };
        Some(line::seal(&self.config.username, text, key.as_ref()))
    }
}

/// Prints every broadcast the relay delivers until the connection ends.
async fn read_loop(
    mut reader: OwnedReadHalf,
    key_text: Option<String>,
    cancel_token: CancellationToken,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,

            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Ok(n) => print_incoming(&buf[..n], key_text.as_deref()),
                    Err(e) => {
                        error!(error = %e, "Read failed, disconnecting");
                        break;
                    }
                }
            }
        }
    }

    cancel_token.cancel();
}

/// Handles one received message. A bad key or corrupt ciphertext rejects
/// the message only; it never ends the session.
fn print_incoming(payload: &[u8], key_text: Option<&str>) {
    let raw = String::from_utf8_lossy(payload);

    let key = match key_text {
        Some(text) => match Key::parse(text) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Invalid encryption key, message dropped");
                return;
            }
        },
        None => None,
    };

    match line::open(&raw, key.as_ref()) {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Could not decode incoming message"),
    }
}
