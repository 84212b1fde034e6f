//! Content encryption with automatic hybrid fallback.
//!
//! Symmetric algorithms always produce a single full-profile envelope. RSA
//! encrypts directly while the payload fits one block; past that a 128-bit
//! nonce key is generated and:
//!
//! - envelope A holds the payload under AES-CBC with the nonce key, locator
//!   `<key-name>/nonce`
//! - envelope B holds the nonce key under RSA, locator `<key-name>`
//!
//! The wire form is `B || A` with no enclosing header. A reader finds A by
//! skipping [`encoded_len`] bytes of B.

use ndn_nac_core::{KeyLocator, Name};

use crate::algorithm::{EncryptAlgorithm, EncryptParams};
use crate::asymmetric;
use crate::envelope::{encoded_len, FullEnvelope};
use crate::error::{CryptoError, Result};
use crate::symmetric::{self, BLOCK_SIZE};

/// Size of the ephemeral key used by the hybrid path.
pub const NONCE_KEY_BITS: usize = 128;

/// Name component appended to the target key name for the hybrid payload.
pub const NONCE_COMPONENT: &str = "nonce";

/// Output of [`encrypt_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealedContent {
    /// Payload encrypted directly under the target key.
    Single(FullEnvelope),
    /// Payload encrypted under a nonce key that is itself wrapped under the
    /// target key.
    Hybrid {
        wrapped_nonce: FullEnvelope,
        body: FullEnvelope,
    },
}

impl SealedContent {
    pub fn is_hybrid(&self) -> bool {
        matches!(self, Self::Hybrid { .. })
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        match self {
            Self::Single(env) => env.wire_encode(),
            Self::Hybrid {
                wrapped_nonce,
                body,
            } => {
                let mut buf = wrapped_nonce.wire_encode();
                buf.extend_from_slice(&body.wire_encode());
                buf
            }
        }
    }

    /// Decode one envelope, or two concatenated ones.
    pub fn wire_decode(bytes: &[u8]) -> Result<Self> {
        let first_len = encoded_len(bytes)?;
        if first_len > bytes.len() {
            return Err(CryptoError::InvalidFormat("truncated envelope".into()));
        }
        let (first, rest) = bytes.split_at(first_len);
        let first = FullEnvelope::wire_decode(first)?;
        if rest.is_empty() {
            return Ok(Self::Single(first));
        }
        Ok(Self::Hybrid {
            wrapped_nonce: first,
            body: FullEnvelope::wire_decode(rest)?,
        })
    }
}

/// Encrypt `payload` under the key named `key_name`.
///
/// `key_bits` is the raw AES key for symmetric algorithms and the
/// SubjectPublicKeyInfo DER for RSA.
pub fn encrypt_content(
    payload: &[u8],
    key_name: &Name,
    key_bits: &[u8],
    params: &EncryptParams,
) -> Result<SealedContent> {
    if params.algorithm.is_symmetric() {
        return encrypt_symmetric(payload, key_name, key_bits, params).map(SealedContent::Single);
    }

    match asymmetric::encrypt(key_bits, payload, params.algorithm) {
        Ok(ciphertext) => Ok(SealedContent::Single(FullEnvelope {
            algorithm: params.algorithm,
            key_locator: KeyLocator::Name(key_name.clone()),
            initial_vector: None,
            payload: ciphertext,
        })),
        Err(CryptoError::PlaintextTooLong { .. }) => {
            encrypt_hybrid(payload, key_name, key_bits, params.algorithm)
        }
        Err(e) => Err(e),
    }
}

fn encrypt_symmetric(
    payload: &[u8],
    key_name: &Name,
    key_bits: &[u8],
    params: &EncryptParams,
) -> Result<FullEnvelope> {
    let ciphertext = symmetric::encrypt(key_bits, payload, params)?;
    let initial_vector = match params.algorithm {
        EncryptAlgorithm::AesCbc => params.initial_vector.clone(),
        _ => None,
    };
    Ok(FullEnvelope {
        algorithm: params.algorithm,
        key_locator: KeyLocator::Name(key_name.clone()),
        initial_vector,
        payload: ciphertext,
    })
}

fn encrypt_hybrid(
    payload: &[u8],
    key_name: &Name,
    key_bits: &[u8],
    algorithm: EncryptAlgorithm,
) -> Result<SealedContent> {
    let nonce = symmetric::generate_key(NONCE_KEY_BITS)?;
    let nonce_name = key_name.clone().append(NONCE_COMPONENT);
    let nonce_params = EncryptParams::new(EncryptAlgorithm::AesCbc).with_random_iv(BLOCK_SIZE);
    let body = encrypt_symmetric(payload, &nonce_name, &nonce, &nonce_params)?;

    let wrapped = asymmetric::encrypt(key_bits, &nonce, algorithm)?;
    let wrapped_nonce = FullEnvelope {
        algorithm,
        key_locator: KeyLocator::Name(key_name.clone()),
        initial_vector: None,
        payload: wrapped,
    };
    Ok(SealedContent::Hybrid {
        wrapped_nonce,
        body,
    })
}

/// Invert [`encrypt_content`].
///
/// `key_bits` is the raw AES key for symmetric envelopes and the PKCS#8 DER
/// private key for RSA.
pub fn decrypt_content(sealed: &SealedContent, key_bits: &[u8]) -> Result<Vec<u8>> {
    match sealed {
        SealedContent::Single(env) => decrypt_envelope(env, key_bits),
        SealedContent::Hybrid {
            wrapped_nonce,
            body,
        } => {
            if !body.algorithm.is_symmetric() {
                return Err(CryptoError::UnsupportedAlgorithm(body.algorithm));
            }
            let nonce = zeroize::Zeroizing::new(decrypt_envelope(wrapped_nonce, key_bits)?);
            decrypt_envelope(body, &nonce)
        }
    }
}

/// Decrypt a single full-profile envelope with the given key bits.
pub fn decrypt_envelope(env: &FullEnvelope, key_bits: &[u8]) -> Result<Vec<u8>> {
    if env.algorithm.is_symmetric() {
        let params = EncryptParams {
            algorithm: env.algorithm,
            initial_vector: env.initial_vector.clone(),
        };
        symmetric::decrypt(key_bits, &env.payload, &params)
    } else {
        asymmetric::decrypt(key_bits, &env.payload, env.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asymmetric::RsaKeyPair;
    use proptest::prelude::*;
    use std::sync::OnceLock;

    fn key() -> &'static RsaKeyPair {
        static KEY: OnceLock<RsaKeyPair> = OnceLock::new();
        KEY.get_or_init(|| RsaKeyPair::generate(1024).unwrap())
    }

    fn key_name() -> Name {
        Name::from_uri("/member/KEY/k1").unwrap()
    }

    #[test]
    fn test_small_payload_uses_direct_path() {
        let public = key().public_key_der().unwrap();
        let private = key().to_pkcs8_der().unwrap();
        let params = EncryptParams::new(EncryptAlgorithm::RsaOaep);

        let sealed = encrypt_content(&[3u8; 32], &key_name(), &public, &params).unwrap();
        assert!(!sealed.is_hybrid());
        assert_eq!(decrypt_content(&sealed, &private).unwrap(), vec![3u8; 32]);
    }

    #[test]
    fn test_large_payload_falls_back_to_hybrid() {
        let public = key().public_key_der().unwrap();
        let private = key().to_pkcs8_der().unwrap();
        let params = EncryptParams::new(EncryptAlgorithm::RsaOaep);
        let payload: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();

        let sealed = encrypt_content(&payload, &key_name(), &public, &params).unwrap();
        let SealedContent::Hybrid {
            wrapped_nonce,
            body,
        } = &sealed
        else {
            panic!("expected hybrid output");
        };
        assert_eq!(wrapped_nonce.key_name(), Some(&key_name()));
        assert_eq!(body.key_name(), Some(&key_name().append("nonce")));
        assert_eq!(body.algorithm, EncryptAlgorithm::AesCbc);
        assert_eq!(body.initial_vector.as_ref().map(Vec::len), Some(16));

        let wire = sealed.wire_encode();
        let decoded = SealedContent::wire_decode(&wire).unwrap();
        assert_eq!(decoded, sealed);
        assert_eq!(decrypt_content(&decoded, &private).unwrap(), payload);
    }

    #[test]
    fn test_hybrid_wire_starts_with_wrapped_nonce() {
        let public = key().public_key_der().unwrap();
        let params = EncryptParams::new(EncryptAlgorithm::RsaPkcs);
        let sealed = encrypt_content(&[0u8; 500], &key_name(), &public, &params).unwrap();
        let wire = sealed.wire_encode();
        let first = encoded_len(&wire).unwrap();
        let b = FullEnvelope::wire_decode(&wire[..first]).unwrap();
        assert_eq!(b.algorithm, EncryptAlgorithm::RsaPkcs);
        assert!(b.initial_vector.is_none());
    }

    #[test]
    fn test_symmetric_cbc_checks_iv() {
        let params = EncryptParams::new(EncryptAlgorithm::AesCbc).with_initial_vector(vec![0; 12]);
        let err = encrypt_content(b"x", &key_name(), &[0u8; 32], &params).unwrap_err();
        assert!(matches!(err, CryptoError::IncorrectInitialVector { .. }));
    }

    #[test]
    fn test_ecb_envelope_has_no_iv() {
        let params = EncryptParams::new(EncryptAlgorithm::AesEcb).with_initial_vector(vec![1; 16]);
        let sealed = encrypt_content(b"x", &key_name(), &[0u8; 16], &params).unwrap();
        let SealedContent::Single(env) = &sealed else {
            panic!("expected single envelope");
        };
        assert!(env.initial_vector.is_none());
        assert_eq!(decrypt_content(&sealed, &[0u8; 16]).unwrap(), b"x");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_cbc_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..512), key in prop::array::uniform32(any::<u8>())) {
            let params = EncryptParams::new(EncryptAlgorithm::AesCbc).with_random_iv(16);
            let sealed = encrypt_content(&payload, &key_name(), &key, &params).unwrap();
            let decoded = SealedContent::wire_decode(&sealed.wire_encode()).unwrap();
            prop_assert_eq!(decrypt_content(&decoded, &key).unwrap(), payload);
        }

        #[test]
        fn prop_rsa_any_size_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..400)) {
            let public = key().public_key_der().unwrap();
            let private = key().to_pkcs8_der().unwrap();
            let params = EncryptParams::new(EncryptAlgorithm::RsaOaep);
            let sealed = encrypt_content(&payload, &key_name(), &public, &params).unwrap();
            prop_assert_eq!(sealed.is_hybrid(), payload.len() > 62);
            prop_assert_eq!(decrypt_content(&sealed, &private).unwrap(), payload);
        }
    }
}
