//! Error types for the access-control components.
//!
//! Every failure carries an [`ErrorCode`] so callers can tell a format
//! problem from a retrieval or cryptographic one, plus a human-readable
//! message naming the packet involved.

use std::fmt;

use ndn_nac_crypto::CryptoError;
use ndn_nac_face::FaceError;
use ndn_nac_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The envelope's key locator is missing or not a name.
    MissingRequiredKeyLocator,
    /// The envelope has no initial vector.
    MissingRequiredInitialVector,
    /// An envelope could not be decoded.
    InvalidEncryptedFormat,
    KekRetrievalTimeout,
    KekRetrievalFailure,
    /// A KEK name does not end in `KEK/<key-id>`.
    KekInvalidName,
    CkRetrievalTimeout,
    CkRetrievalFailure,
    /// A CK Data name is not `<ck-name>/ENCRYPTED-BY/<kek-name>`.
    CkInvalidName,
    KdkRetrievalTimeout,
    KdkRetrievalFailure,
    /// A private key expected in a TPM is absent.
    TpmKeyNotFound,
    DecryptionFailure,
    EncryptionFailure,
    /// The component was shut down before the request completed.
    Cancelled,
    General,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An access-control failure.
///
/// `Clone` so that one failed resolution can be delivered to every request
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct NacError {
    pub code: ErrorCode,
    pub message: String,
}

impl NacError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Map a failed fetch to the timeout or failure code for that fetch.
    pub(crate) fn retrieval(
        err: FaceError,
        what: &str,
        name: &ndn_nac_core::Name,
        on_timeout: ErrorCode,
        on_failure: ErrorCode,
    ) -> Self {
        match err {
            FaceError::Timeout => Self::new(
                on_timeout,
                format!("Retrieval of {} [{}] timed out", what, name),
            ),
            FaceError::Nack(reason) => Self::new(
                on_failure,
                format!("Retrieval of {} [{}] failed. Got NACK ({})", what, name, reason),
            ),
            other => Self::new(
                on_failure,
                format!("Retrieval of {} [{}] failed: {}", what, name, other),
            ),
        }
    }
}

impl From<CryptoError> for NacError {
    fn from(e: CryptoError) -> Self {
        let code = match &e {
            CryptoError::InvalidFormat(_) => ErrorCode::InvalidEncryptedFormat,
            CryptoError::EncryptionError(_) | CryptoError::PlaintextTooLong { .. } => {
                ErrorCode::EncryptionFailure
            }
            CryptoError::DecryptionError(_)
            | CryptoError::IncorrectInitialVector { .. }
            | CryptoError::InvalidKeyLength(_) => ErrorCode::DecryptionFailure,
            CryptoError::UnsupportedAlgorithm(_) | CryptoError::KeyEncoding(_) => {
                ErrorCode::General
            }
        };
        Self::new(code, e.to_string())
    }
}

impl From<StoreError> for NacError {
    fn from(e: StoreError) -> Self {
        let code = match &e {
            StoreError::KeyNotFound(_) => ErrorCode::TpmKeyNotFound,
            _ => ErrorCode::General,
        };
        Self::new(code, e.to_string())
    }
}

impl From<ndn_nac_core::CoreError> for NacError {
    fn from(e: ndn_nac_core::CoreError) -> Self {
        Self::new(ErrorCode::General, e.to_string())
    }
}

/// Result type for access-control operations.
pub type Result<T> = std::result::Result<T, NacError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndn_nac_core::Name;
    use ndn_nac_face::NackReason;

    #[test]
    fn test_retrieval_codes() {
        let name = Name::from_uri("/ck/CK/1").unwrap();
        let timeout = NacError::retrieval(
            FaceError::Timeout,
            "CK",
            &name,
            ErrorCode::CkRetrievalTimeout,
            ErrorCode::CkRetrievalFailure,
        );
        assert_eq!(timeout.code(), ErrorCode::CkRetrievalTimeout);
        assert!(timeout.message.contains("/ck/CK/1"));

        let nack = NacError::retrieval(
            FaceError::Nack(NackReason::NoRoute),
            "CK",
            &name,
            ErrorCode::CkRetrievalTimeout,
            ErrorCode::CkRetrievalFailure,
        );
        assert_eq!(nack.code(), ErrorCode::CkRetrievalFailure);
    }

    #[test]
    fn test_from_lower_errors() {
        let e: NacError = CryptoError::InvalidFormat("short".into()).into();
        assert_eq!(e.code(), ErrorCode::InvalidEncryptedFormat);

        let e: NacError = StoreError::KeyNotFound("/a/KEY/1".into()).into();
        assert_eq!(e.code(), ErrorCode::TpmKeyNotFound);

        let e: NacError = CryptoError::PlaintextTooLong {
            len: 300,
            capacity: 190,
        }
        .into();
        assert_eq!(e.code(), ErrorCode::EncryptionFailure);
    }

    #[test]
    fn test_display() {
        let e = NacError::new(ErrorCode::Cancelled, "shut down");
        assert_eq!(e.to_string(), "Cancelled: shut down");
    }
}
