//! AES in ECB and CBC mode with PKCS#7 padding.
//!
//! The AES variant is picked from the key length: 16, 24 or 32 bytes.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::algorithm::{EncryptAlgorithm, EncryptParams};
use crate::error::{CryptoError, Result};

/// AES block size, and the only IV length CBC accepts.
pub const BLOCK_SIZE: usize = 16;

/// Run `$body` with `$cipher` aliased to the AES variant matching the key.
macro_rules! with_aes {
    ($key:expr, $cipher:ident => $body:expr) => {
        match $key.len() {
            16 => {
                type $cipher = aes::Aes128;
                $body
            }
            24 => {
                type $cipher = aes::Aes192;
                $body
            }
            32 => {
                type $cipher = aes::Aes256;
                $body
            }
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    };
}

/// Generate a random AES key of `bits` (128, 192 or 256).
pub fn generate_key(bits: usize) -> Result<Zeroizing<Vec<u8>>> {
    let len = bits / 8;
    if bits % 8 != 0 || !matches!(len, 16 | 24 | 32) {
        return Err(CryptoError::InvalidKeyLength(len));
    }
    let mut key = Zeroizing::new(vec![0u8; len]);
    rand::thread_rng().fill_bytes(&mut key);
    Ok(key)
}

/// Encrypt `plaintext` under `key`.
///
/// CBC checks the IV length before touching the cipher. ECB ignores any IV.
pub fn encrypt(key: &[u8], plaintext: &[u8], params: &EncryptParams) -> Result<Vec<u8>> {
    match params.algorithm {
        EncryptAlgorithm::AesEcb => with_aes!(key, C => {
            let cipher = ecb::Encryptor::<C>::new_from_slice(key)
                .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
            Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }),
        EncryptAlgorithm::AesCbc => {
            let iv = require_iv(params)?;
            with_aes!(key, C => {
                let cipher = cbc::Encryptor::<C>::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            })
        }
        other => Err(CryptoError::UnsupportedAlgorithm(other)),
    }
}

/// Decrypt `ciphertext` under `key`, stripping the padding.
pub fn decrypt(key: &[u8], ciphertext: &[u8], params: &EncryptParams) -> Result<Vec<u8>> {
    match params.algorithm {
        EncryptAlgorithm::AesEcb => with_aes!(key, C => {
            let cipher = ecb::Decryptor::<C>::new_from_slice(key)
                .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| CryptoError::DecryptionError("bad padding".into()))
        }),
        EncryptAlgorithm::AesCbc => {
            let iv = require_iv(params)?;
            with_aes!(key, C => {
                let cipher = cbc::Decryptor::<C>::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| CryptoError::DecryptionError("bad padding".into()))
            })
        }
        other => Err(CryptoError::UnsupportedAlgorithm(other)),
    }
}

fn require_iv(params: &EncryptParams) -> Result<&[u8]> {
    let iv = params.initial_vector.as_deref().unwrap_or_default();
    if iv.len() != BLOCK_SIZE {
        return Err(CryptoError::IncorrectInitialVector {
            expected: BLOCK_SIZE,
            actual: iv.len(),
        });
    }
    Ok(iv)
}
