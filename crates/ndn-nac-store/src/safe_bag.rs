//! Safe bags: a certificate plus its passphrase-protected private key.
//!
//! The private key is an EncryptedPrivateKeyInfo (PKCS#8) using PBES2 with
//! PBKDF2-SHA256 and AES-256-CBC. The bag itself is CBOR.

use pkcs8::pkcs5::pbes2;
use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use ndn_nac_core::{Certificate, Data};

use crate::error::{Result, StoreError};

/// PBKDF2 rounds used unless the caller picks another count.
pub const DEFAULT_ITERATIONS: u32 = 2048;

const SALT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeBag {
    certificate: Vec<u8>,
    encrypted_key: Vec<u8>,
}

impl SafeBag {
    /// Seal a PKCS#8 DER private key under `passphrase`.
    pub fn seal(
        certificate: &Certificate,
        private_key_der: &[u8],
        passphrase: &[u8],
        iterations: u32,
    ) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; 16];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
            .map_err(|e| StoreError::SafeBag(e.to_string()))?;
        let info = PrivateKeyInfo::try_from(private_key_der)
            .map_err(|e| StoreError::SafeBag(e.to_string()))?;
        let encrypted = info
            .encrypt_with_params(params, passphrase)
            .map_err(|e| StoreError::SafeBag(e.to_string()))?;

        Ok(Self {
            certificate: certificate.data().wire_encode(),
            encrypted_key: encrypted.as_bytes().to_vec(),
        })
    }

    /// Recover the certificate and the PKCS#8 DER private key.
    pub fn open(&self, passphrase: &[u8]) -> Result<(Certificate, Zeroizing<Vec<u8>>)> {
        let certificate = self.certificate()?;
        let info = EncryptedPrivateKeyInfo::try_from(self.encrypted_key.as_slice())
            .map_err(|e| StoreError::SafeBag(e.to_string()))?;
        let document = info
            .decrypt(passphrase)
            .map_err(|e| StoreError::SafeBag(format!("cannot unlock private key: {}", e)))?;
        Ok((certificate, Zeroizing::new(document.as_bytes().to_vec())))
    }

    pub fn certificate(&self) -> Result<Certificate> {
        let data = Data::wire_decode(&self.certificate)?;
        Ok(Certificate::from_data(data)?)
    }

    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    pub fn wire_decode(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::SafeBag(e.to_string()))
    }
}
