//! # NDN NAC Crypto
//!
//! Ciphers and the encrypted-content envelope used by name-based access
//! control.
//!
//! ## Layers
//!
//! 1. **Symmetric** ([`symmetric`]): AES-128/192/256 in ECB or CBC mode with PKCS#7
//!    padding. CBC requires a 16-byte initial vector.
//! 2. **Asymmetric** ([`asymmetric`]): RSA with OAEP-SHA256 or PKCS#1 v1.5 padding.
//!    Plaintext larger than one block fails with
//!    [`CryptoError::PlaintextTooLong`].
//! 3. **Envelope** ([`envelope`]): the TLV record carrying ciphertext and the
//!    data needed to decrypt it, in a full or a compact profile.
//! 4. **Hybrid** ([`hybrid`]): picks the direct path when the payload fits
//!    the key, otherwise wraps a fresh AES nonce key under RSA and encrypts
//!    the payload under the nonce key.

pub mod algorithm;
pub mod asymmetric;
pub mod envelope;
pub mod error;
pub mod hybrid;
pub mod symmetric;

pub use algorithm::{EncryptAlgorithm, EncryptParams};
pub use asymmetric::RsaKeyPair;
pub use envelope::{encoded_len, CompactEnvelope, EncryptedContent, FullEnvelope, Profile};
pub use error::{CryptoError, Result};
pub use hybrid::{decrypt_content, decrypt_envelope, encrypt_content, SealedContent};

pub use ndn_nac_core::KeyLocator;
