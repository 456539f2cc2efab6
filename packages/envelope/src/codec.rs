//! AES-256-GCM envelope codec

use std::sync::atomic::{AtomicU64, Ordering};

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::bundle::{write_v1, BundleView, NONCE_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;

/// Key version written when the caller does not pick one
pub const DEFAULT_KEY_VERSION: u16 = 1;

const NONCE_PREFIX_LEN: usize = 4;

/// Per-instance nonce source: a random prefix fixed at construction followed
/// by a big-endian counter. Unique for 2^64 encryptions under one instance.
struct NonceSequence {
    prefix: [u8; NONCE_PREFIX_LEN],
    counter: AtomicU64,
}

impl NonceSequence {
    fn new() -> Self {
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        OsRng.fill_bytes(&mut prefix);
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> [u8; NONCE_LEN] {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..NONCE_PREFIX_LEN].copy_from_slice(&self.prefix);
        nonce[NONCE_PREFIX_LEN..].copy_from_slice(&count.to_be_bytes());
        nonce
    }
}

/// Seals and opens versioned bundles under one symmetric key
///
/// # Security Properties
///
/// - **Algorithm**: AES-256-GCM (authenticated encryption)
/// - **Nonce**: 4 random bytes per instance + 8-byte counter
/// - **Format**: always writes v1 bundles, reads v0 and v1
/// - **Failure reporting**: [`decrypt`](Self::decrypt) returns `None` for every
///   failure so callers cannot build an oracle out of it
///
/// ```ignore
/// let codec = EnvelopeCodec::new(&key);
/// let bundle = codec.encrypt(b"hello")?;
/// assert_eq!(codec.decrypt(&bundle).as_deref(), Some(&b"hello"[..]));
/// ```
pub struct EnvelopeCodec {
    cipher: Aes256Gcm,
    key_version: u16,
    nonces: NonceSequence,
}

impl EnvelopeCodec {
    pub fn new(key: &SymmetricKey) -> Self {
        Self::with_key_version(key, DEFAULT_KEY_VERSION)
    }

    /// Create a codec that stamps and expects `key_version` on v1 bundles
    pub fn with_key_version(key: &SymmetricKey, key_version: u16) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
            key_version,
            nonces: NonceSequence::new(),
        }
    }

    pub fn key_version(&self) -> u16 {
        self.key_version
    }

    /// Encrypt `plaintext` into a v1 bundle
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        seal(&self.cipher, self.key_version, self.nonces.next(), plaintext)
    }

    /// Decrypt a bundle, hiding the failure reason
    pub fn decrypt(&self, bundle: &[u8]) -> Option<Vec<u8>> {
        match self.try_decrypt(bundle) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                tracing::debug!(error = %e, len = bundle.len(), "Envelope rejected");
                None
            }
        }
    }

    /// Decrypt a bundle, classifying the failure
    ///
    /// Intended for diagnostics. A v1 key version that does not match this
    /// codec reports [`CryptoError::DecryptionFailed`], same as a wrong key.
    pub fn try_decrypt(&self, bundle: &[u8]) -> CryptoResult<Vec<u8>> {
        let view = BundleView::parse(bundle)?;

        if let Some(key_version) = view.key_version {
            if key_version != self.key_version {
                return Err(CryptoError::DecryptionFailed);
            }
        }

        self.cipher
            .decrypt(Nonce::from_slice(view.nonce), view.sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Serialize `value` to JSON, seal it, and base64 the bundle
    pub fn seal_json(&self, value: &Value) -> CryptoResult<String> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let bundle = self.encrypt(&plaintext)?;
        Ok(STANDARD.encode(bundle))
    }

    /// Reverse of [`seal_json`](Self::seal_json)
    pub fn open_json(&self, sealed: &str) -> Option<Value> {
        match self.try_open_json(sealed) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "Sealed payload rejected");
                None
            }
        }
    }

    pub fn try_open_json(&self, sealed: &str) -> CryptoResult<Value> {
        let bundle = STANDARD
            .decode(sealed.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let plaintext = self.try_decrypt(&bundle)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("key_version", &self.key_version)
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

fn seal(
    cipher: &Aes256Gcm,
    key_version: u16,
    nonce: [u8; NONCE_LEN],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;
    Ok(write_v1(key_version, &nonce, &sealed))
}

/// One-shot encryption with a fully random nonce
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    seal(&cipher, DEFAULT_KEY_VERSION, nonce, plaintext)
}

/// One-shot decryption; `None` on any failure
pub fn decrypt(bundle: &[u8], key: &SymmetricKey) -> Option<Vec<u8>> {
    EnvelopeCodec::new(key).decrypt(bundle)
}
