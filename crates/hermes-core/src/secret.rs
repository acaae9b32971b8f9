//! Symmetric codec for the `debug` field of outgoing errors.
//!
//! Diagnostics attached to errors would leak internals if sent in the
//! clear, so they are encrypted with a key held by operators. Untrusted
//! readers see opaque base64; anyone holding the key can expand the text
//! with [`Secret::decode`]. The codec is never applied to regular RPC
//! payloads.
//!
//! Three codecs exist: [`Secret::debug`] (identity, for development),
//! [`Secret::ofb`] (AES-OFB, kept for wire compatibility with older
//! deployments) and [`Secret::aead`] (XChaCha20-Poly1305, the current
//! default; decode rejects tampered ciphertext).

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ofb::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error as ThisError;

const AES_BLOCK_SIZE: usize = 16;
const XCHACHA_NONCE_SIZE: usize = 24;

/// An invalid codec key supplied at construction time.
#[derive(Debug, ThisError)]
pub enum SecretKeyError {
    /// The key is not valid hex.
    #[error("secret: key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    /// An AES key must be 16, 24 or 32 bytes.
    #[error("secret: AES key must be 16, 24 or 32 bytes, got {0}")]
    InvalidAesLength(usize),
    /// An AEAD key must be 32 bytes.
    #[error("secret: AEAD key must be 32 bytes, got {0}")]
    InvalidAeadLength(usize),
}

/// A failure while decoding an encrypted debug string.
#[derive(Debug, ThisError)]
pub enum SecretDecodeError {
    /// The input is not valid base64.
    #[error("secret: input is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    /// The input is shorter than the IV / nonce prefix.
    #[error("secret: encoded text too short")]
    TooShort,
    /// Authentication failed: the ciphertext was tampered with.
    #[error("secret: ciphertext rejected")]
    Rejected,
    /// The decrypted bytes are not valid UTF-8.
    #[error("secret: decrypted text is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// The debug-string codec attached to a method handler.
///
/// # Example
///
/// ```
/// use hermes_core::Secret;
///
/// let secret = Secret::aead(&"00".repeat(32)).expect("valid key");
/// let ciphertext = secret.encode("connection refused");
/// assert_ne!(ciphertext, "connection refused");
/// assert_eq!(secret.decode(&ciphertext).unwrap(), "connection refused");
/// ```
pub enum Secret {
    /// Identity codec: input is returned unchanged. Development only.
    Debug,
    /// Legacy AES-OFB codec with a fresh IV prefixed to each ciphertext.
    Ofb(OfbCodec),
    /// XChaCha20-Poly1305 with a fresh 24-byte nonce per encode.
    Aead(AeadCodec),
}

impl Secret {
    /// Returns the identity codec.
    #[must_use]
    pub fn debug() -> Self {
        Self::Debug
    }

    /// Builds the legacy AES-OFB codec from a hex key of 32, 48 or 64
    /// characters (16, 24 or 32 bytes).
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or an unsupported key length.
    pub fn ofb(hex_key: &str) -> Result<Self, SecretKeyError> {
        let key = hex::decode(hex_key)?;
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(SecretKeyError::InvalidAesLength(key.len()));
        }
        Ok(Self::Ofb(OfbCodec { key }))
    }

    /// Builds the AEAD codec from a 64-character hex key (32 bytes).
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or a key that is not 32 bytes.
    pub fn aead(hex_key: &str) -> Result<Self, SecretKeyError> {
        let key = hex::decode(hex_key)?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| SecretKeyError::InvalidAeadLength(key.len()))?;
        Ok(Self::Aead(AeadCodec { cipher }))
    }

    /// Encrypts a debug string. Returns an empty string if encryption
    /// fails, never panics.
    #[must_use]
    pub fn encode(&self, input: &str) -> String {
        match self {
            Self::Debug => input.to_string(),
            Self::Ofb(codec) => codec.encode(input),
            Self::Aead(codec) => codec.encode(input),
        }
    }

    /// Decrypts a previously encoded debug string.
    ///
    /// # Errors
    ///
    /// Fails on malformed input; the AEAD codec additionally rejects
    /// ciphertext that fails authentication.
    pub fn decode(&self, input: &str) -> Result<String, SecretDecodeError> {
        match self {
            Self::Debug => Ok(input.to_string()),
            Self::Ofb(codec) => codec.decode(input),
            Self::Aead(codec) => codec.decode(input),
        }
    }

    /// Returns the codec kind: `"debug"`, `"ofb"` or `"aead"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Ofb(_) => "ofb",
            Self::Aead(_) => "aead",
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("kind", &self.kind()).finish()
    }
}

impl crate::value::ContextValue for Secret {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

/// AES-OFB stream codec. Construct via [`Secret::ofb`].
pub struct OfbCodec {
    key: Vec<u8>,
}

impl OfbCodec {
    fn encode(&self, input: &str) -> String {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut buf = input.as_bytes().to_vec();
        if self.apply_keystream(&iv, &mut buf).is_err() {
            return String::new();
        }

        let mut out = Vec::with_capacity(AES_BLOCK_SIZE + buf.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        BASE64.encode(out)
    }

    fn decode(&self, input: &str) -> Result<String, SecretDecodeError> {
        let encoded = BASE64.decode(input)?;
        if encoded.len() < AES_BLOCK_SIZE {
            return Err(SecretDecodeError::TooShort);
        }
        let (iv, ciphertext) = encoded.split_at(AES_BLOCK_SIZE);
        let mut buf = ciphertext.to_vec();
        self.apply_keystream(iv, &mut buf)
            .map_err(|_| SecretDecodeError::Rejected)?;
        Ok(String::from_utf8(buf)?)
    }

    // OFB is symmetric: the same keystream XOR performs both directions.
    fn apply_keystream(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), ofb::cipher::InvalidLength> {
        match self.key.len() {
            16 => ofb::Ofb::<Aes128>::new_from_slices(&self.key, iv)?.apply_keystream(buf),
            24 => ofb::Ofb::<Aes192>::new_from_slices(&self.key, iv)?.apply_keystream(buf),
            _ => ofb::Ofb::<Aes256>::new_from_slices(&self.key, iv)?.apply_keystream(buf),
        }
        Ok(())
    }
}

/// XChaCha20-Poly1305 codec. Construct via [`Secret::aead`].
pub struct AeadCodec {
    cipher: XChaCha20Poly1305,
}

impl AeadCodec {
    fn encode(&self, input: &str) -> String {
        let mut nonce = [0u8; XCHACHA_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let Ok(ciphertext) = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), input.as_bytes())
        else {
            return String::new();
        };

        let mut out = Vec::with_capacity(XCHACHA_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        BASE64.encode(out)
    }

    fn decode(&self, input: &str) -> Result<String, SecretDecodeError> {
        let encoded = BASE64.decode(input)?;
        if encoded.len() < XCHACHA_NONCE_SIZE {
            return Err(SecretDecodeError::TooShort);
        }
        let (nonce, ciphertext) = encoded.split_at(XCHACHA_NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretDecodeError::Rejected)?;
        Ok(String::from_utf8(plaintext)?)
    }
}
