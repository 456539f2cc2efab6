//! Key material and X25519 key agreement

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Symmetric key size for AES-256-GCM
pub const KEY_LEN: usize = 32;

/// Salt used for HKDF key derivation
const HKDF_SALT: &[u8] = b"switchboard-sync";

/// Info string binding derived keys to the envelope format
const HKDF_INFO: &[u8] = b"switchboard-envelope-v1";

/// 32-byte symmetric key used by the envelope codec
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a key from an arbitrary slice, rejecting anything but 32 bytes
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Generate a random key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// Long-lived X25519 identity used to agree on envelope keys with a peer
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Restore a key pair from its 32 secret bytes
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Derive the symmetric key shared with `peer`
    pub fn derive_shared_key(&self, peer: &PublicKey) -> CryptoResult<SymmetricKey> {
        derive_shared_key(&self.secret, peer)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.as_bytes())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Run X25519 between `local` and `peer`, then HKDF-SHA256 the shared secret
/// into a 32-byte envelope key.
///
/// Both sides of the exchange arrive at the same key without it ever being
/// transmitted. Low-order peer points are rejected.
pub fn derive_shared_key(local: &StaticSecret, peer: &PublicKey) -> CryptoResult<SymmetricKey> {
    let shared = local.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(CryptoError::KeyAgreement);
    }

    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared.as_bytes());
    let mut key = [0u8; KEY_LEN];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|_| CryptoError::InvalidKeyLength(KEY_LEN))?;
    Ok(SymmetricKey(key))
}
