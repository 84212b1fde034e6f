//! Interest and Data packets.
//!
//! Data packets serialize to deterministic CBOR. The implicit digest that
//! completes a Data's full name is `Blake3(wire_encode(data))`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::name::{Component, Name};

/// Lifetime of an Interest that does not set one.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Identifies the key (or key digest) that produced a signature or
/// encrypted a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLocator {
    Name(Name),
    KeyDigest(Vec<u8>),
}

impl KeyLocator {
    /// The locator name, if this is a name-type locator.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Self::Name(n) => Some(n),
            Self::KeyDigest(_) => None,
        }
    }
}

/// A request for a named Data packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub lifetime: Duration,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            lifetime: DEFAULT_INTEREST_LIFETIME,
        }
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Whether `data` satisfies this Interest.
    ///
    /// `is_fresh` is the caller's judgement of the Data's freshness; stale
    /// Data never satisfies an Interest with `must_be_fresh` set. An Interest
    /// whose name ends in an implicit digest matches only the Data with that
    /// digest.
    pub fn matches_data(&self, data: &Data, is_fresh: bool) -> bool {
        if self.must_be_fresh && !is_fresh {
            return false;
        }

        let ends_in_digest = matches!(self.name.get(-1), Some(Component::ImplicitDigest(_)));
        if ends_in_digest || (self.can_be_prefix && self.name.len() > data.name.len()) {
            let full = data.full_name();
            return if self.can_be_prefix {
                self.name.is_prefix_of(&full)
            } else {
                self.name == full
            };
        }

        if self.can_be_prefix {
            self.name.is_prefix_of(&data.name)
        } else {
            self.name == data.name
        }
    }
}

/// Packet metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// How long after arrival a cached copy still counts as fresh. `None`
    /// means the Data is stale immediately.
    pub freshness_period: Option<Duration>,
}

/// Signature algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    /// SHA-256 of the signed portion, no key.
    DigestSha256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Sha256WithRsa,
    Ed25519,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,
    pub key_locator: Option<KeyLocator>,
}

impl Default for SignatureInfo {
    fn default() -> Self {
        Self {
            signature_type: SignatureType::DigestSha256,
            key_locator: None,
        }
    }
}

/// A signed, named, content-bearing packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub meta_info: MetaInfo,
    pub content: Bytes,
    pub signature_info: SignatureInfo,
    pub signature_value: Bytes,
}

/// The part of a Data covered by its signature.
#[derive(Serialize)]
struct SignedPortion<'a> {
    name: &'a Name,
    meta_info: &'a MetaInfo,
    content: &'a Bytes,
    signature_info: &'a SignatureInfo,
}

impl Data {
    /// An unsigned Data with empty content.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            meta_info: MetaInfo::default(),
            content: Bytes::new(),
            signature_info: SignatureInfo::default(),
            signature_value: Bytes::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_freshness_period(mut self, period: Duration) -> Self {
        self.meta_info.freshness_period = Some(period);
        self
    }

    /// Bytes a signer signs: name, meta info, content and signature info.
    pub fn signed_portion(&self) -> Vec<u8> {
        let portion = SignedPortion {
            name: &self.name,
            meta_info: &self.meta_info,
            content: &self.content,
            signature_info: &self.signature_info,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&portion, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Serialize the whole packet.
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Parse a packet produced by [`Data::wire_encode`].
    pub fn wire_decode(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    /// Digest of the wire encoding.
    pub fn implicit_digest(&self) -> [u8; 32] {
        *blake3::hash(&self.wire_encode()).as_bytes()
    }

    /// The name with the implicit digest component appended.
    pub fn full_name(&self) -> Name {
        self.name
            .clone()
            .append(Component::ImplicitDigest(self.implicit_digest()))
    }
}
