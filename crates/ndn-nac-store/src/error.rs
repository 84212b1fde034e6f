//! Error types for caches and key chains.

use thiserror::Error;

/// Errors that can occur during key chain operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// No private key under this name. A TPM decrypt with an unknown key
    /// reports this.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("certificate not found: {0}")]
    CertificateNotFound(String),

    /// The operation needs a different key type.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("signing error: {0}")]
    Signing(String),

    /// Safe bag could not be built, parsed or unlocked.
    #[error("safe bag error: {0}")]
    SafeBag(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] ndn_nac_crypto::CryptoError),

    #[error("core error: {0}")]
    Core(#[from] ndn_nac_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
