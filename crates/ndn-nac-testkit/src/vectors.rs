//! Known-answer vectors.
//!
//! Cipher vectors come from NIST SP 800-38A. Only the first ciphertext
//! block is compared, since our output carries an extra PKCS#7 padding block.
//! Envelope vectors pin the NDN-TLV layout byte for byte.

use ndn_nac_core::{KeyLocator, Name};
use ndn_nac_crypto::{symmetric, CompactEnvelope, EncryptAlgorithm, EncryptParams, FullEnvelope};

/// A block cipher known-answer vector.
#[derive(Debug, Clone)]
pub struct CipherVector {
    pub name: &'static str,
    pub algorithm: EncryptAlgorithm,
    /// Key (hex).
    pub key: &'static str,
    /// Initial vector (hex), empty for ECB.
    pub iv: &'static str,
    /// One plaintext block (hex).
    pub plaintext: &'static str,
    /// Expected first ciphertext block (hex).
    pub expected_block: &'static str,
}

pub fn cipher_vectors() -> Vec<CipherVector> {
    vec![
        CipherVector {
            name: "AES-128-ECB F.1.1 block 1",
            algorithm: EncryptAlgorithm::AesEcb,
            key: "2b7e151628aed2a6abf7158809cf4f3c",
            iv: "",
            plaintext: "6bc1bee22e409f96e93d7e117393172a",
            expected_block: "3ad77bb40d7a3660a89ecaf32466ef97",
        },
        CipherVector {
            name: "AES-128-CBC F.2.1 block 1",
            algorithm: EncryptAlgorithm::AesCbc,
            key: "2b7e151628aed2a6abf7158809cf4f3c",
            iv: "000102030405060708090a0b0c0d0e0f",
            plaintext: "6bc1bee22e409f96e93d7e117393172a",
            expected_block: "7649abac8119b246cee98e9b12e9197d",
        },
        CipherVector {
            name: "AES-256-CBC F.2.5 block 1",
            algorithm: EncryptAlgorithm::AesCbc,
            key: "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4",
            iv: "000102030405060708090a0b0c0d0e0f",
            plaintext: "6bc1bee22e409f96e93d7e117393172a",
            expected_block: "f58c4c04d6e5f1ba779eabfb5f7bfbd6",
        },
    ]
}

/// Run one cipher vector, returning the first ciphertext block (hex).
pub fn run_cipher_vector(vector: &CipherVector) -> Result<String, String> {
    let key = hex::decode(vector.key).map_err(|e| e.to_string())?;
    let plaintext = hex::decode(vector.plaintext).map_err(|e| e.to_string())?;
    let mut params = EncryptParams::new(vector.algorithm);
    if !vector.iv.is_empty() {
        params = params.with_initial_vector(hex::decode(vector.iv).map_err(|e| e.to_string())?);
    }

    let ciphertext = symmetric::encrypt(&key, &plaintext, &params).map_err(|e| e.to_string())?;
    if ciphertext.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", ciphertext.len()));
    }
    let recovered = symmetric::decrypt(&key, &ciphertext, &params).map_err(|e| e.to_string())?;
    if recovered != plaintext {
        return Err("decryption did not recover the plaintext".into());
    }
    Ok(hex::encode(&ciphertext[..16]))
}

/// An envelope with its expected wire encoding.
#[derive(Debug, Clone)]
pub enum EnvelopeVector {
    Full {
        name: &'static str,
        envelope: FullEnvelope,
        expected_hex: &'static str,
    },
    Compact {
        name: &'static str,
        envelope: CompactEnvelope,
        expected_hex: &'static str,
    },
}

impl EnvelopeVector {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Full { name, .. } | Self::Compact { name, .. } => *name,
        }
    }

    pub fn expected_hex(&self) -> &'static str {
        match self {
            Self::Full { expected_hex, .. } | Self::Compact { expected_hex, .. } => *expected_hex,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Full { envelope, .. } => envelope.wire_encode(),
            Self::Compact { envelope, .. } => envelope.wire_encode(),
        }
    }
}

pub fn envelope_vectors() -> Vec<EnvelopeVector> {
    let key_a = Name::from_components(vec!["a".into()]);
    vec![
        EnvelopeVector::Full {
            name: "full, name locator, CBC with IV",
            envelope: FullEnvelope {
                algorithm: EncryptAlgorithm::AesCbc,
                key_locator: KeyLocator::Name(key_a),
                initial_vector: Some(vec![0xaa, 0xbb]),
                payload: vec![0x01],
            },
            // 130 { 28 { 7 { 8 "a" } } 131 {1} 133 {aa bb} 132 {01} }
            expected_hex: "82111c0507030801618301018502aabb840101",
        },
        EnvelopeVector::Full {
            name: "full, digest locator, RSA-OAEP",
            envelope: FullEnvelope {
                algorithm: EncryptAlgorithm::RsaOaep,
                key_locator: KeyLocator::KeyDigest(vec![0x11, 0x22]),
                initial_vector: None,
                payload: vec![0xff, 0xee],
            },
            expected_hex: "820d1c041d02112283010384 02ffee",
        },
        EnvelopeVector::Compact {
            name: "compact, payload only",
            envelope: CompactEnvelope {
                payload: vec![1, 2, 3],
                wrapped_secret: None,
            },
            expected_hex: "8205840301 0203",
        },
        EnvelopeVector::Compact {
            name: "compact, payload and wrapped secret",
            envelope: CompactEnvelope {
                payload: vec![1, 2, 3],
                wrapped_secret: Some(vec![9]),
            },
            expected_hex: "8208840301020386 0109",
        },
    ]
}

/// Run every vector. Returns (name, passed, detail) per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for vector in cipher_vectors() {
        let (passed, detail) = match run_cipher_vector(&vector) {
            Ok(block) if block == vector.expected_block => (true, block),
            Ok(block) => (false, format!("expected {}, got {}", vector.expected_block, block)),
            Err(e) => (false, e),
        };
        results.push((vector.name.to_string(), passed, detail));
    }

    for vector in envelope_vectors() {
        let actual = hex::encode(vector.encode());
        let expected: String = vector.expected_hex().split_whitespace().collect();
        let passed = actual == expected;
        let detail = if passed {
            actual
        } else {
            format!("expected {}, got {}", expected, actual)
        };
        results.push((vector.name().to_string(), passed, detail));
    }

    results
}
