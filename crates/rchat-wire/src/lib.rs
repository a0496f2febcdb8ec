//! Wire envelope shared by all rchat clients.
//!
//! This crate defines the only contract clients and the relay have in
//! common: the textual chat-line format (`"<username>: " + <body>`) and the
//! optional DES-CBC cipher applied to the body. The relay itself never
//! depends on the cipher — it forwards payload bytes verbatim — so this
//! crate carries no networking code.
//!
//! - `cipher` - key validation and the DES-CBC/hex transport encoding
//! - `line` - chat line rendering, parsing, and seal/open helpers

pub mod cipher;
pub mod line;

pub use cipher::{CipherError, Key, KEY_LEN};
pub use line::ChatLine;
