//! Error types for ciphers and envelopes.

use thiserror::Error;

use crate::algorithm::EncryptAlgorithm;

/// Errors that can occur while encrypting, decrypting or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// CBC was asked to run with an IV that is not one block long.
    #[error("incorrect initial vector: expected {expected} bytes, got {actual}")]
    IncorrectInitialVector { expected: usize, actual: usize },

    /// AES key is not 16, 24 or 32 bytes.
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),

    /// Plaintext does not fit in one RSA block.
    #[error("plaintext of {len} bytes exceeds key capacity of {capacity} bytes")]
    PlaintextTooLong { len: usize, capacity: usize },

    #[error("algorithm {0:?} cannot be used here")]
    UnsupportedAlgorithm(EncryptAlgorithm),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// DER import or export of a key failed.
    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    /// Malformed or incomplete envelope.
    #[error("invalid encrypted format: {0}")]
    InvalidFormat(String),
}

impl From<ndn_nac_core::CoreError> for CryptoError {
    fn from(e: ndn_nac_core::CoreError) -> Self {
        Self::InvalidFormat(e.to_string())
    }
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
