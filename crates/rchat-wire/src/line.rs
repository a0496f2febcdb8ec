//! Chat line framing: `"<username>: " + <body>`.
//!
//! One chat line is one logical write on the wire — no length prefix, no
//! delimiter. The username prefix always travels in the clear; when
//! encryption is on, only the body is run through the cipher.

use crate::cipher::{self, CipherError, Key};

/// Separator between the username prefix and the body.
const SEPARATOR: &str = ": ";

/// One chat line, body either plaintext or hex ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub username: String,
    pub body: String,
}

impl ChatLine {
    pub fn new(username: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            body: body.into(),
        }
    }

    /// Renders the line as it travels on the wire.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.username, SEPARATOR, self.body)
    }

    /// Splits a raw line on the first `": "` occurrence.
    ///
    /// Returns `None` when the separator is absent; callers pass such lines
    /// through verbatim rather than rejecting them.
    pub fn parse(raw: &str) -> Option<Self> {
        let (username, body) = raw.split_once(SEPARATOR)?;
        Some(Self::new(username, body))
    }
}

/// Renders an outgoing line, encrypting the body when a key is supplied.
pub fn seal(username: &str, body: &str, key: Option<&Key>) -> String {
    let body = match key {
        Some(key) => cipher::encrypt(body, key),
        None => body.to_string(),
    };
    ChatLine::new(username, body).render()
}

/// Interprets an incoming line, decrypting the body when a key is supplied.
///
/// A line without the separator is returned verbatim. A body that fails to
/// decrypt is an error for this line only.
pub fn open(raw: &str, key: Option<&Key>) -> Result<String, CipherError> {
    let key = match key {
        Some(key) => key,
        None => return Ok(raw.to_string()),
    };

    match ChatLine::parse(raw) {
        Some(line) => {
            let body = cipher::decrypt(&line.body, key)?;
            Ok(ChatLine::new(line.username, body).render())
        }
        None => Ok(raw.to_string()),
    }
}
