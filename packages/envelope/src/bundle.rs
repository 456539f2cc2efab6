//! Binary bundle layout
//!
//! ```text
//! v0: [version:1][nonce:12][ciphertext:N][tag:16]
//! v1: [version:1][key_version:2 BE][nonce:12][ciphertext:N][tag:16]
//! ```

use crate::error::{CryptoError, CryptoResult};

/// Nonce size for AES-256-GCM (12 bytes / 96 bits)
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag size
pub const TAG_LEN: usize = 16;

/// Size of the key version field carried by v1 bundles
pub const KEY_VERSION_LEN: usize = 2;

/// Bundle format versions understood by this codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleVersion {
    /// Legacy layout without a key version
    V0,
    /// Current layout with a 2-byte key version
    V1,
}

impl BundleVersion {
    /// Version written by new encryptions
    pub const CURRENT: Self = Self::V1;

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::V0),
            1 => Some(Self::V1),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    /// Bytes preceding the ciphertext
    pub fn header_len(self) -> usize {
        match self {
            Self::V0 => 1 + NONCE_LEN,
            Self::V1 => 1 + KEY_VERSION_LEN + NONCE_LEN,
        }
    }

    /// Smallest well-formed bundle (empty plaintext)
    pub fn min_len(self) -> usize {
        self.header_len() + TAG_LEN
    }
}

/// Borrowed view over a structurally valid bundle
#[derive(Debug)]
pub(crate) struct BundleView<'a> {
    pub version: BundleVersion,
    pub key_version: Option<u16>,
    pub nonce: &'a [u8],
    /// Ciphertext with the tag appended, as the AEAD expects it
    pub sealed: &'a [u8],
}

impl<'a> BundleView<'a> {
    /// Parse the header. The version byte is inspected before any length check
    /// beyond "there is a version byte at all".
    pub fn parse(bundle: &'a [u8]) -> CryptoResult<Self> {
        let Some(&version_byte) = bundle.first() else {
            return Err(CryptoError::InvalidBundle {
                len: 0,
                min: BundleVersion::V0.min_len(),
            });
        };

        let version = BundleVersion::from_byte(version_byte)
            .ok_or(CryptoError::UnsupportedFormat(version_byte))?;

        if bundle.len() < version.min_len() {
            return Err(CryptoError::InvalidBundle {
                len: bundle.len(),
                min: version.min_len(),
            });
        }

        let (key_version, nonce_start) = match version {
            BundleVersion::V0 => (None, 1),
            BundleVersion::V1 => (
                Some(u16::from_be_bytes([bundle[1], bundle[2]])),
                1 + KEY_VERSION_LEN,
            ),
        };

        let header_len = version.header_len();
        Ok(Self {
            version,
            key_version,
            nonce: &bundle[nonce_start..header_len],
            sealed: &bundle[header_len..],
        })
    }
}

/// Assemble a v1 bundle from its parts
pub(crate) fn write_v1(key_version: u16, nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BundleVersion::V1.header_len() + sealed.len());
    out.push(BundleVersion::V1.as_byte());
    out.extend_from_slice(&key_version.to_be_bytes());
    out.extend_from_slice(nonce);
    out.extend_from_slice(sealed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_lengths() {
        assert_eq!(BundleVersion::V0.min_len(), 29);
        assert_eq!(BundleVersion::V1.min_len(), 31);
    }

    #[test]
    fn test_parse_empty_is_invalid() {
        assert_eq!(
            BundleView::parse(&[]).unwrap_err(),
            CryptoError::InvalidBundle { len: 0, min: 29 }
        );
    }

    #[test]
    fn test_unknown_version_checked_before_length() {
        assert_eq!(
            BundleView::parse(&[7, 1, 2]).unwrap_err(),
            CryptoError::UnsupportedFormat(7)
        );
    }

    #[test]
    fn test_parse_v1_fields() {
        let nonce = [9u8; NONCE_LEN];
        let sealed = [0xAB; TAG_LEN + 3];
        let bundle = write_v1(0x0102, &nonce, &sealed);

        let view = BundleView::parse(&bundle).unwrap();
        assert_eq!(view.version, BundleVersion::V1);
        assert_eq!(view.key_version, Some(0x0102));
        assert_eq!(view.nonce, &nonce);
        assert_eq!(view.sealed, &sealed);
    }

    #[test]
    fn test_parse_v0_fields() {
        let mut bundle = vec![0u8];
        bundle.extend_from_slice(&[5u8; NONCE_LEN]);
        bundle.extend_from_slice(&[6u8; TAG_LEN]);

        let view = BundleView::parse(&bundle).unwrap();
        assert_eq!(view.version, BundleVersion::V0);
        assert_eq!(view.key_version, None);
        assert_eq!(view.sealed.len(), TAG_LEN);
    }
}
