//! Proptest generators for property-based testing.

use proptest::prelude::*;

use ndn_nac_core::{Component, KeyLocator, Name};
use ndn_nac_crypto::{CompactEnvelope, EncryptAlgorithm, FullEnvelope};

/// A generic name component of 1-12 bytes.
pub fn component() -> impl Strategy<Value = Component> {
    prop::collection::vec(any::<u8>(), 1..=12).prop_map(Component::generic)
}

/// A name with 1 to `max_len` components.
pub fn name(max_len: usize) -> impl Strategy<Value = Name> {
    prop::collection::vec(component(), 1..=max_len).prop_map(Name::from_components)
}

/// Payload bytes of at most `max_len` bytes.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// An AES key of 128, 192 or 256 bits.
pub fn aes_key() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![Just(16usize), Just(24), Just(32)]
        .prop_flat_map(|len| prop::collection::vec(any::<u8>(), len))
}

/// A 16-byte initial vector.
pub fn initial_vector() -> impl Strategy<Value = Vec<u8>> {
    any::<[u8; 16]>().prop_map(|iv| iv.to_vec())
}

pub fn encrypt_algorithm() -> impl Strategy<Value = EncryptAlgorithm> {
    prop_oneof![
        Just(EncryptAlgorithm::AesEcb),
        Just(EncryptAlgorithm::AesCbc),
        Just(EncryptAlgorithm::RsaPkcs),
        Just(EncryptAlgorithm::RsaOaep),
    ]
}

pub fn key_locator() -> impl Strategy<Value = KeyLocator> {
    prop_oneof![
        name(6).prop_map(KeyLocator::Name),
        prop::collection::vec(any::<u8>(), 32).prop_map(KeyLocator::KeyDigest),
    ]
}

/// A structurally valid full-profile envelope. The payload is random bytes,
/// not real ciphertext.
pub fn full_envelope() -> impl Strategy<Value = FullEnvelope> {
    (
        encrypt_algorithm(),
        key_locator(),
        prop::option::of(initial_vector()),
        payload(256),
    )
        .prop_map(|(algorithm, key_locator, initial_vector, payload)| FullEnvelope {
            algorithm,
            key_locator,
            initial_vector,
            payload,
        })
}

/// A structurally valid compact-profile envelope.
pub fn compact_envelope() -> impl Strategy<Value = CompactEnvelope> {
    (payload(256), prop::option::of(payload(256))).prop_map(|(payload, wrapped_secret)| {
        CompactEnvelope {
            payload,
            wrapped_secret,
        }
    })
}
