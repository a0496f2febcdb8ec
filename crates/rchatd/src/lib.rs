//! rchatd - the chat relay daemon.
//!
//! Accepts TCP connections and fans every received message out to every
//! connected client, the sender included. Payloads are opaque bytes: the
//! relay never decrypts, so encrypted and plaintext clients are relayed
//! identically.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  accept   ┌─────────────────┐
//! │ RelayServer  │──────────▶│ InboundPipeline │  (one task per client)
//! │ (TcpListener)│           └────────┬────────┘
//! └──────────────┘                    │ bounded queue (backpressure)
//!                                     ▼
//!                            ┌─────────────────┐
//!                            │   Broadcaster   │  (single consumer)
//!                            └────────┬────────┘
//!                                     │ write to every peer
//!                                     ▼
//!                          ┌─────────────────────┐
//!                          │ ConnectionRegistry  │
//!                          └─────────────────────┘
//! ```
//!
//! - `registry` - thread-safe set of live connections
//! - `server` - listener lifecycle, inbound pipelines, broadcaster

pub mod registry;
pub mod server;
