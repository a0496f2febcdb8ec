//! rchat - terminal chat client.
//!
//! Connects to an rchat relay, sends each stdin line as one chat message,
//! and prints every message the relay broadcasts back (its own included).
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local relay as "alice"
//! rchat --name alice
//!
//! # Connect elsewhere
//! rchat 192.168.1.20:9000 --name alice
//!
//! # Encrypted session (both sides must share the same 8-byte key)
//! rchat --name alice --encrypt --key 01234567
//! ```
//!
//! Logs go to stderr so chat output on stdout stays clean.

mod client;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use client::{ChatClient, ClientConfig};

/// rchat terminal client
#[derive(Parser, Debug)]
#[command(name = "rchat", version, about)]
struct Args {
    /// Relay address (host:port)
    #[arg(default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name prefixed to every message
    #[arg(short, long, default_value = "anonymous")]
    name: String,

    /// Encrypt message bodies with the shared key
    #[arg(short, long, requires = "key")]
    encrypt: bool,

    /// 8-byte shared key (required with --encrypt)
    #[arg(short, long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rchat=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig {
        server_addr: args.server,
        username: args.name,
        key_text: if args.encrypt { args.key } else { None },
    };

    let cancel_token = CancellationToken::new();
    let interrupt_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, disconnecting");
            interrupt_token.cancel();
        }
    });

    ChatClient::new(config).run(cancel_token).await?;

    info!("rchat stopped");
    Ok(())
}
