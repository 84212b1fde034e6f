//! Error types for the NAC core.

use thiserror::Error;

/// Core errors that can occur while handling names and packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid name URI: {0}")]
    InvalidUri(String),

    #[error("invalid certificate name: {0}")]
    InvalidCertificateName(String),

    #[error("invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("TLV error: {0}")]
    Tlv(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
