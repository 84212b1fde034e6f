//! # NDN NAC Core
//!
//! Pure primitives for name-based access control: hierarchical names,
//! Interest and Data packets, certificates, and the NDN-TLV helpers used by
//! the encrypted-content codec.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Name`] - Hierarchical identifier compared by canonical component value
//! - [`Interest`] - A request for a named packet
//! - [`Data`] - A signed, named, content-bearing packet
//! - [`Certificate`] - A Data packet carrying a public key
//!
//! ## Wire Forms
//!
//! Data packets are serialized with deterministic CBOR; their full name
//! carries a BLAKE3 implicit digest of that encoding. Names embedded in
//! encrypted content use NDN-TLV, see [`tlv`].

pub mod certificate;
pub mod error;
pub mod name;
pub mod packet;
pub mod tlv;

pub use certificate::Certificate;
pub use error::{CoreError, Result};
pub use name::{Component, Name};
pub use packet::{
    Data, Interest, KeyLocator, MetaInfo, SignatureInfo, SignatureType,
    DEFAULT_INTEREST_LIFETIME,
};
