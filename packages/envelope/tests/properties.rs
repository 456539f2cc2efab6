//! Tamper and key-handling properties of sealed bundles

use rstest::rstest;
use switchboard_envelope::{
    decrypt, encrypt, BundleVersion, CryptoError, EnvelopeCodec, KeyPair, SymmetricKey,
};

fn sample_bundle(key: &SymmetricKey) -> Vec<u8> {
    EnvelopeCodec::new(key)
        .encrypt(br#"{"event":"session","data":{"id":"abc"}}"#)
        .unwrap()
}

#[test]
fn wrong_key_yields_none() {
    let bundle = sample_bundle(&SymmetricKey::generate());
    assert!(decrypt(&bundle, &SymmetricKey::generate()).is_none());
}

#[rstest]
#[case::nonce_first_byte(3)]
#[case::nonce_last_byte(14)]
#[case::ciphertext(15)]
#[case::tag_last_byte(usize::MAX)]
fn flipped_bit_yields_none(#[case] position: usize) {
    let key = SymmetricKey::generate();
    let mut bundle = sample_bundle(&key);
    let index = position.min(bundle.len() - 1);
    bundle[index] ^= 0x01;

    assert!(decrypt(&bundle, &key).is_none());
}

#[test]
fn flipped_key_version_yields_none() {
    let key = SymmetricKey::generate();
    let mut bundle = sample_bundle(&key);
    bundle[2] ^= 0x01;

    let codec = EnvelopeCodec::new(&key);
    assert_eq!(
        codec.try_decrypt(&bundle).unwrap_err(),
        CryptoError::DecryptionFailed
    );
}

#[test]
fn every_truncation_yields_none() {
    let key = SymmetricKey::generate();
    let bundle = sample_bundle(&key);

    for len in 0..bundle.len() {
        assert!(
            decrypt(&bundle[..len], &key).is_none(),
            "truncated to {len} bytes should not decrypt"
        );
    }
}

#[rstest]
#[case::v0(0, 28)]
#[case::v1(1, 30)]
fn short_bundles_are_invalid(#[case] version: u8, #[case] len: usize) {
    let codec = EnvelopeCodec::new(&SymmetricKey::generate());
    let mut bundle = vec![0u8; len];
    bundle[0] = version;

    let min = BundleVersion::from_byte(version).unwrap().min_len();
    assert_eq!(
        codec.try_decrypt(&bundle).unwrap_err(),
        CryptoError::InvalidBundle { len, min }
    );
}

#[test]
fn unknown_version_is_unsupported() {
    let key = SymmetricKey::generate();
    let mut bundle = sample_bundle(&key);
    bundle[0] = 2;

    let codec = EnvelopeCodec::new(&key);
    assert_eq!(
        codec.try_decrypt(&bundle).unwrap_err(),
        CryptoError::UnsupportedFormat(2)
    );
    assert!(codec.decrypt(&bundle).is_none());
}

#[test]
fn agreed_keys_open_each_others_bundles() {
    let phone = KeyPair::generate();
    let laptop = KeyPair::generate();

    let phone_key = phone.derive_shared_key(&laptop.public_key()).unwrap();
    let laptop_key = laptop.derive_shared_key(&phone.public_key()).unwrap();

    let bundle = encrypt(b"hello from the phone", &phone_key).unwrap();
    assert_eq!(
        decrypt(&bundle, &laptop_key).unwrap(),
        b"hello from the phone"
    );
}

#[test]
fn fresh_nonce_per_encryption() {
    let key = SymmetricKey::generate();
    let a = encrypt(b"same plaintext", &key).unwrap();
    let b = encrypt(b"same plaintext", &key).unwrap();

    assert_ne!(a, b);
}
