//! Envelope encryption for Switchboard sync payloads
//!
//! Domain payloads travelling through the relay can be sealed end-to-end with
//! AES-256-GCM. Keys are either generated directly or agreed between two
//! devices with X25519 and stretched through HKDF-SHA256.
//!
//! The relay never needs this crate; it forwards sealed payloads untouched.

mod bundle;
mod codec;
mod error;
mod key;

pub use bundle::{BundleVersion, KEY_VERSION_LEN, NONCE_LEN, TAG_LEN};
pub use codec::{decrypt, encrypt, EnvelopeCodec, DEFAULT_KEY_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_shared_key, KeyPair, SymmetricKey, KEY_LEN};

pub use x25519_dalek::{PublicKey, StaticSecret};
