//! Algorithm tags and per-call cipher parameters.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

/// Encryption algorithm. The discriminant is the value carried in the
/// envelope's `EncryptionAlgorithm` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptAlgorithm {
    AesEcb = 0,
    AesCbc = 1,
    RsaPkcs = 2,
    RsaOaep = 3,
}

impl EncryptAlgorithm {
    pub fn to_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0 => Ok(Self::AesEcb),
            1 => Ok(Self::AesCbc),
            2 => Ok(Self::RsaPkcs),
            3 => Ok(Self::RsaOaep),
            other => Err(CryptoError::InvalidFormat(format!(
                "unknown encryption algorithm {}",
                other
            ))),
        }
    }

    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::AesEcb | Self::AesCbc)
    }
}

/// Algorithm plus optional initial vector for one encrypt or decrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptParams {
    pub algorithm: EncryptAlgorithm,
    pub initial_vector: Option<Vec<u8>>,
}

impl EncryptParams {
    pub fn new(algorithm: EncryptAlgorithm) -> Self {
        Self {
            algorithm,
            initial_vector: None,
        }
    }

    /// Use a fresh random IV of `len` bytes.
    pub fn with_random_iv(mut self, len: usize) -> Self {
        let mut iv = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut iv);
        self.initial_vector = Some(iv);
        self
    }

    pub fn with_initial_vector(mut self, iv: impl Into<Vec<u8>>) -> Self {
        self.initial_vector = Some(iv.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_values() {
        for alg in [
            EncryptAlgorithm::AesEcb,
            EncryptAlgorithm::AesCbc,
            EncryptAlgorithm::RsaPkcs,
            EncryptAlgorithm::RsaOaep,
        ] {
            assert_eq!(EncryptAlgorithm::from_u64(alg.to_u64()).unwrap(), alg);
        }
        assert_eq!(EncryptAlgorithm::AesCbc.to_u64(), 1);
        assert_eq!(EncryptAlgorithm::RsaOaep.to_u64(), 3);
        assert!(EncryptAlgorithm::from_u64(4).is_err());
    }

    #[test]
    fn test_random_iv_length() {
        let params = EncryptParams::new(EncryptAlgorithm::AesCbc).with_random_iv(16);
        assert_eq!(params.initial_vector.as_ref().map(Vec::len), Some(16));
    }
}
