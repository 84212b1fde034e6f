//! Encrypted-content envelope.
//!
//! Two profiles, chosen when the envelope is built:
//!
//! - **Full**: algorithm, key locator, optional IV, payload. Used for
//!   application content and for each half of a hybrid encryption.
//! - **Compact**: payload plus an optional wrapped secret. Used for CK and
//!   KDK Data.
//!
//! ## Wire format (NDN-TLV)
//!
//! ```text
//! Full    := 130 { KeyLocator(28) { Name(7) | KeyLocatorDigest(29) }
//!                  EncryptionAlgorithm(131) InitialVector(133)? EncryptedPayload(132) }
//! Compact := 130 { EncryptedPayload(132) EncryptedPayloadKey(134)? }
//! ```
//!
//! A decoder is told which profile to expect; it does not guess.

use ndn_nac_core::tlv::{self, TlvReader};
use ndn_nac_core::{KeyLocator, Name};

use crate::algorithm::EncryptAlgorithm;
use crate::error::{CryptoError, Result};

/// TLV type numbers.
pub mod types {
    pub const ENCRYPTED_CONTENT: u64 = 130;
    pub const ENCRYPTION_ALGORITHM: u64 = 131;
    pub const ENCRYPTED_PAYLOAD: u64 = 132;
    pub const INITIAL_VECTOR: u64 = 133;
    pub const ENCRYPTED_PAYLOAD_KEY: u64 = 134;
    pub const KEY_LOCATOR: u64 = 28;
    pub const KEY_LOCATOR_DIGEST: u64 = 29;
}

/// Which envelope layout to encode or expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Full,
    Compact,
}

/// Full-profile envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullEnvelope {
    pub algorithm: EncryptAlgorithm,
    pub key_locator: KeyLocator,
    pub initial_vector: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl FullEnvelope {
    /// The locator name, if the locator is name-typed.
    pub fn key_name(&self) -> Option<&Name> {
        self.key_locator.name()
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = Vec::new();
        encode_key_locator(&mut value, &self.key_locator);
        tlv::write_nonneg_tlv(
            &mut value,
            types::ENCRYPTION_ALGORITHM,
            self.algorithm.to_u64(),
        );
        if let Some(iv) = &self.initial_vector {
            tlv::write_tlv(&mut value, types::INITIAL_VECTOR, iv);
        }
        tlv::write_tlv(&mut value, types::ENCRYPTED_PAYLOAD, &self.payload);

        let mut buf = Vec::with_capacity(value.len() + 8);
        tlv::write_tlv(&mut buf, types::ENCRYPTED_CONTENT, &value);
        buf
    }

    pub fn wire_decode(bytes: &[u8]) -> Result<Self> {
        let mut inner = open_outer(bytes)?;

        let locator = inner
            .expect_tlv(types::KEY_LOCATOR)
            .map_err(|e| missing("KeyLocator", e))?;
        let key_locator = decode_key_locator(locator)?;

        let algorithm = inner
            .expect_tlv(types::ENCRYPTION_ALGORITHM)
            .map_err(|e| missing("EncryptionAlgorithm", e))?;
        let algorithm = EncryptAlgorithm::from_u64(tlv::read_nonneg(algorithm)?)?;

        let initial_vector = if inner.peek_type() == Some(types::INITIAL_VECTOR) {
            Some(inner.expect_tlv(types::INITIAL_VECTOR)?.to_vec())
        } else {
            None
        };

        let payload = inner
            .expect_tlv(types::ENCRYPTED_PAYLOAD)
            .map_err(|e| missing("EncryptedPayload", e))?
            .to_vec();

        finish(&inner)?;
        Ok(Self {
            algorithm,
            key_locator,
            initial_vector,
            payload,
        })
    }
}

/// Compact-profile envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactEnvelope {
    pub payload: Vec<u8>,
    /// Secret encrypted for the recipient, e.g. the passphrase protecting a
    /// KDK bundle.
    pub wrapped_secret: Option<Vec<u8>>,
}

impl CompactEnvelope {
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = Vec::new();
        tlv::write_tlv(&mut value, types::ENCRYPTED_PAYLOAD, &self.payload);
        if let Some(secret) = &self.wrapped_secret {
            tlv::write_tlv(&mut value, types::ENCRYPTED_PAYLOAD_KEY, secret);
        }

        let mut buf = Vec::with_capacity(value.len() + 8);
        tlv::write_tlv(&mut buf, types::ENCRYPTED_CONTENT, &value);
        buf
    }

    pub fn wire_decode(bytes: &[u8]) -> Result<Self> {
        let mut inner = open_outer(bytes)?;

        let payload = inner
            .expect_tlv(types::ENCRYPTED_PAYLOAD)
            .map_err(|e| missing("EncryptedPayload", e))?
            .to_vec();

        let wrapped_secret = if inner.peek_type() == Some(types::ENCRYPTED_PAYLOAD_KEY) {
            Some(inner.expect_tlv(types::ENCRYPTED_PAYLOAD_KEY)?.to_vec())
        } else {
            None
        };

        finish(&inner)?;
        Ok(Self {
            payload,
            wrapped_secret,
        })
    }
}

/// An envelope in either profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedContent {
    Full(FullEnvelope),
    Compact(CompactEnvelope),
}

impl EncryptedContent {
    pub fn profile(&self) -> Profile {
        match self {
            Self::Full(_) => Profile::Full,
            Self::Compact(_) => Profile::Compact,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Full(e) => &e.payload,
            Self::Compact(e) => &e.payload,
        }
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        match self {
            Self::Full(e) => e.wire_encode(),
            Self::Compact(e) => e.wire_encode(),
        }
    }

    /// Decode bytes expected to hold an envelope in `profile`.
    pub fn wire_decode(bytes: &[u8], profile: Profile) -> Result<Self> {
        match profile {
            Profile::Full => FullEnvelope::wire_decode(bytes).map(Self::Full),
            Profile::Compact => CompactEnvelope::wire_decode(bytes).map(Self::Compact),
        }
    }
}

impl From<FullEnvelope> for EncryptedContent {
    fn from(e: FullEnvelope) -> Self {
        Self::Full(e)
    }
}

impl From<CompactEnvelope> for EncryptedContent {
    fn from(e: CompactEnvelope) -> Self {
        Self::Compact(e)
    }
}

/// Total encoded size of the envelope at the start of `bytes`, read from
/// its outer type and length only.
pub fn encoded_len(bytes: &[u8]) -> Result<usize> {
    let mut reader = TlvReader::new(bytes);
    let typ = reader.read_var_number()?;
    if typ != types::ENCRYPTED_CONTENT {
        return Err(CryptoError::InvalidFormat(format!(
            "expected EncryptedContent, found type {}",
            typ
        )));
    }
    let len = reader.read_var_number()?;
    usize::try_from(len)
        .ok()
        .and_then(|len| len.checked_add(reader.position()))
        .ok_or_else(|| CryptoError::InvalidFormat("length overflow".into()))
}

fn open_outer(bytes: &[u8]) -> Result<TlvReader<'_>> {
    let mut outer = TlvReader::new(bytes);
    let value = outer
        .expect_tlv(types::ENCRYPTED_CONTENT)
        .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
    if !outer.is_empty() {
        return Err(CryptoError::InvalidFormat(
            "trailing bytes after EncryptedContent".into(),
        ));
    }
    Ok(TlvReader::new(value))
}

fn finish(inner: &TlvReader<'_>) -> Result<()> {
    match inner.peek_type() {
        None => Ok(()),
        Some(t) => Err(CryptoError::InvalidFormat(format!(
            "unexpected element type {}",
            t
        ))),
    }
}

fn missing(element: &str, cause: ndn_nac_core::CoreError) -> CryptoError {
    CryptoError::InvalidFormat(format!("missing or bad {}: {}", element, cause))
}

fn encode_key_locator(buf: &mut Vec<u8>, locator: &KeyLocator) {
    let mut value = Vec::new();
    match locator {
        KeyLocator::Name(name) => tlv::write_name(&mut value, name),
        KeyLocator::KeyDigest(digest) => {
            tlv::write_tlv(&mut value, types::KEY_LOCATOR_DIGEST, digest)
        }
    }
    tlv::write_tlv(buf, types::KEY_LOCATOR, &value);
}

fn decode_key_locator(value: &[u8]) -> Result<KeyLocator> {
    let mut reader = TlvReader::new(value);
    let (typ, inner) = reader.read_tlv()?;
    let locator = match typ {
        tlv::types::NAME => KeyLocator::Name(tlv::read_name_value(inner)?),
        types::KEY_LOCATOR_DIGEST => KeyLocator::KeyDigest(inner.to_vec()),
        other => {
            return Err(CryptoError::InvalidFormat(format!(
                "unknown key locator type {}",
                other
            )))
        }
    };
    finish(&reader)?;
    Ok(locator)
}
