//! RSA with OAEP-SHA256 or PKCS#1 v1.5 padding.
//!
//! Public keys travel as SubjectPublicKeyInfo DER, private keys as PKCS#8
//! DER.

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use crate::algorithm::EncryptAlgorithm;
use crate::error::{CryptoError, Result};

/// Bytes of plaintext one RSA block can carry for a modulus of
/// `modulus_len` bytes.
pub fn capacity(modulus_len: usize, algorithm: EncryptAlgorithm) -> usize {
    match algorithm {
        // 2 * hash length + 2
        EncryptAlgorithm::RsaOaep => modulus_len.saturating_sub(66),
        _ => modulus_len.saturating_sub(11),
    }
}

/// An RSA private key together with its public half.
#[derive(Clone)]
pub struct RsaKeyPair {
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Generate a fresh key pair with a modulus of `bits`.
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self { private })
    }

    /// Import a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self { private })
    }

    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        Self { private }
    }

    /// Export the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// Export the public key as SubjectPublicKeyInfo DER.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .private
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(doc.into_vec())
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus length in bytes.
    pub fn size(&self) -> usize {
        self.private.size()
    }

    pub fn decrypt(&self, ciphertext: &[u8], algorithm: EncryptAlgorithm) -> Result<Vec<u8>> {
        let result = match algorithm {
            EncryptAlgorithm::RsaOaep => self.private.decrypt(Oaep::new::<Sha256>(), ciphertext),
            EncryptAlgorithm::RsaPkcs => self.private.decrypt(Pkcs1v15Encrypt, ciphertext),
            other => return Err(CryptoError::UnsupportedAlgorithm(other)),
        };
        result.map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RsaKeyPair({} bits)", self.size() * 8)
    }
}

/// Encrypt under a SubjectPublicKeyInfo DER public key.
pub fn encrypt(
    public_key_der: &[u8],
    plaintext: &[u8],
    algorithm: EncryptAlgorithm,
) -> Result<Vec<u8>> {
    let public = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    let mut rng = rand::thread_rng();
    let result = match algorithm {
        EncryptAlgorithm::RsaOaep => public.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext),
        EncryptAlgorithm::RsaPkcs => public.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext),
        other => return Err(CryptoError::UnsupportedAlgorithm(other)),
    };
    result.map_err(|e| match e {
        rsa::Error::MessageTooLong => CryptoError::PlaintextTooLong {
            len: plaintext.len(),
            capacity: capacity(public.size(), algorithm),
        },
        other => CryptoError::EncryptionError(other.to_string()),
    })
}

/// Decrypt with a PKCS#8 DER private key.
pub fn decrypt(
    private_key_der: &[u8],
    ciphertext: &[u8],
    algorithm: EncryptAlgorithm,
) -> Result<Vec<u8>> {
    RsaKeyPair::from_pkcs8_der(private_key_der)?.decrypt(ciphertext, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn key() -> &'static RsaKeyPair {
        static KEY: OnceLock<RsaKeyPair> = OnceLock::new();
        KEY.get_or_init(|| RsaKeyPair::generate(1024).unwrap())
    }

    #[test]
    fn test_oaep_roundtrip() {
        let public = key().public_key_der().unwrap();
        let ct = encrypt(&public, &[5u8; 32], EncryptAlgorithm::RsaOaep).unwrap();
        assert_eq!(ct.len(), 128);
        assert_eq!(key().decrypt(&ct, EncryptAlgorithm::RsaOaep).unwrap(), vec![5u8; 32]);
    }

    #[test]
    fn test_pkcs1_roundtrip_via_der() {
        let public = key().public_key_der().unwrap();
        let private = key().to_pkcs8_der().unwrap();
        let ct = encrypt(&public, b"secret", EncryptAlgorithm::RsaPkcs).unwrap();
        assert_eq!(decrypt(&private, &ct, EncryptAlgorithm::RsaPkcs).unwrap(), b"secret");
    }

    #[test]
    fn test_plaintext_too_long_is_distinguishable() {
        let public = key().public_key_der().unwrap();
        let cap = capacity(128, EncryptAlgorithm::RsaOaep);
        assert_eq!(cap, 62);
        assert!(encrypt(&public, &vec![0u8; cap], EncryptAlgorithm::RsaOaep).is_ok());

        let err = encrypt(&public, &vec![0u8; cap + 1], EncryptAlgorithm::RsaOaep).unwrap_err();
        assert_eq!(
            err,
            CryptoError::PlaintextTooLong {
                len: cap + 1,
                capacity: cap
            }
        );

        let err = encrypt(&public, &[0u8; 118], EncryptAlgorithm::RsaPkcs).unwrap_err();
        assert!(matches!(err, CryptoError::PlaintextTooLong { capacity: 117, .. }));
    }

    #[test]
    fn test_bad_public_key() {
        let err = encrypt(&[1, 2, 3], b"x", EncryptAlgorithm::RsaOaep).unwrap_err();
        assert!(matches!(err, CryptoError::KeyEncoding(_)));
    }

    #[test]
    fn test_wrong_padding_fails() {
        let public = key().public_key_der().unwrap();
        let ct = encrypt(&public, b"x", EncryptAlgorithm::RsaOaep).unwrap();
        assert!(key().decrypt(&ct, EncryptAlgorithm::RsaPkcs).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", key()), "RsaKeyPair(1024 bits)");
    }
}
