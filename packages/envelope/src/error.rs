//! Error types for the envelope codec

use thiserror::Error;

/// Errors that can occur while sealing or opening envelopes
///
/// Only [`crate::EnvelopeCodec::try_decrypt`] surfaces the decrypt-side
/// variants; the public decrypt path collapses them into `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Bundle carries a version byte this build does not understand
    #[error("unsupported bundle format version: {0}")]
    UnsupportedFormat(u8),

    /// Bundle is shorter than its version's header plus tag
    #[error("invalid bundle: {len} bytes, need at least {min}")]
    InvalidBundle { len: usize, min: usize },

    /// AEAD verification failed (wrong key, tampering, truncation)
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD encryption failed
    #[error("encryption failed")]
    Encryption,

    /// X25519 agreement produced a non-contributory shared secret
    #[error("key agreement failed: peer public key is not contributory")]
    KeyAgreement,

    /// Key material with the wrong length was supplied
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Payload could not be encoded or decoded (base64 or JSON)
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for envelope operations
pub type CryptoResult<T> = Result<T, CryptoError>;
