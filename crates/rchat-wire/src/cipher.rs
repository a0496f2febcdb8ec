//! DES-CBC cipher envelope for message bodies.
//!
//! Stateless, symmetric functions: both peers must already share the 8-byte
//! key; no key material is persisted or transmitted. Two quirks of the wire
//! format are preserved deliberately for interoperability:
//!
//! - The key doubles as the CBC initialization vector. This is a known
//!   cryptographic weakness; fixing it would break compatibility with
//!   existing peers.
//! - Padding is always appended, so a block-aligned plaintext grows by a
//!   full extra block before encryption.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

/// Required key length in bytes. Equals the DES block size, so the key can
/// double as the IV (see module docs).
pub const KEY_LEN: usize = 8;

type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;

/// Errors produced by the cipher envelope.
///
/// Every variant is fatal to the affected message only: callers reject the
/// message and keep their connection running.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key text is not exactly [`KEY_LEN`] bytes after trimming.
    #[error("invalid key: key length must be {KEY_LEN} bytes, got {got}")]
    InvalidKeyLength { got: usize },

    /// The incoming body is not valid hexadecimal.
    #[error("ciphertext is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The decoded ciphertext is empty or not a multiple of the block size.
    #[error("ciphertext length {0} is not a positive multiple of {KEY_LEN} bytes")]
    InvalidCiphertextLength(usize),

    /// Padding bytes were malformed after decryption (corrupt ciphertext or
    /// wrong key).
    #[error("invalid padding after decryption (corrupt ciphertext or wrong key)")]
    InvalidPadding,

    /// The decrypted bytes are not valid UTF-8 (corrupt ciphertext or wrong
    /// key).
    #[error("decrypted message is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A validated 8-byte shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Parses operator-supplied key text.
    ///
    /// Surrounding whitespace is trimmed; the remainder must be exactly
    /// [`KEY_LEN`] bytes. The original implementation enforced 8 bytes but
    /// reported "7" in its error text; the check is authoritative and the
    /// message here states the enforced length.
    pub fn parse(text: &str) -> Result<Self, CipherError> {
        let bytes = text.trim().as_bytes();
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength { got: bytes.len() });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Raw key bytes, also used as the CBC IV.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Encrypts a message body for transport.
///
/// Pads the UTF-8 bytes to the DES block size with PKCS#7 (at least one
/// padding byte is always appended), encrypts in CBC mode with the key
/// doubling as IV, and returns lowercase hex.
pub fn encrypt(plaintext: &str, key: &Key) -> String {
    let enc = DesCbcEnc::new(key.as_bytes().into(), key.as_bytes().into());
    let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    hex::encode(ciphertext)
}

/// Decrypts a hex-encoded message body.
///
/// Rejects malformed hex, non-block-multiple ciphertexts, bad padding, and
/// non-UTF-8 plaintexts with a [`CipherError`] rather than emitting garbage.
pub fn decrypt(hex_text: &str, key: &Key) -> Result<String, CipherError> {
    let mut ciphertext = hex::decode(hex_text)?;
    if ciphertext.is_empty() || ciphertext.len() % KEY_LEN != 0 {
        return Err(CipherError::InvalidCiphertextLength(ciphertext.len()));
    }

    let dec = DesCbcDec::new(key.as_bytes().into(), key.as_bytes().into());
    let plaintext = dec
        .decrypt_padded_mut::<Pkcs7>(&mut ciphertext)
        .map_err(|_| CipherError::InvalidPadding)?;

    Ok(String::from_utf8(plaintext.to_vec())?)
}
