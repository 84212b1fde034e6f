//! # NDN NAC
//!
//! Name-based access control for Named Data Networking.
//!
//! A data owner runs an [`AccessManager`] per dataset, publishing a
//! key-encryption key (KEK) and, for every granted member, a copy of the
//! matching key-decryption key (KDK) that only that member can open.
//! Producers encrypt with an [`Encryptor`], which publishes its content key
//! (CK) wrapped under the KEK. Consumers decrypt with a [`Decryptor`], which
//! fetches the CK and their KDK on demand.
//!
//! ## Key Types
//!
//! - [`AccessManager`] - Owns the NAC key pair and grants members access
//! - [`Encryptor`] - Encrypts payloads under a rotating content key
//! - [`Decryptor`] - Resolves content keys and decrypts payloads
//! - [`NacConfig`] - Freshness periods, retry policies and key sizes
//! - [`NacError`] - Failure with an [`ErrorCode`] and a message
//!
//! ## Design Notes
//!
//! - **Retaining caches**: published KEK, KDK and CK packets are served from
//!   memory and never evicted
//! - **Single flight**: concurrent decrypts of one CK share one fetch and
//!   complete in submission order
//! - **Explicit shutdown**: every component withdraws its prefixes and
//!   cancels outstanding work on `shutdown()` or drop

mod access_manager;
pub mod config;
mod decryptor;
mod encryptor;
pub mod error;
pub mod naming;
mod serve;

pub use access_manager::AccessManager;
pub use config::{NacConfig, PassphraseMapping};
pub use decryptor::Decryptor;
pub use encryptor::{Encryptor, ErrorCallback};
pub use error::{ErrorCode, NacError, Result};

pub use ndn_nac_core as core;
pub use ndn_nac_crypto as crypto;
pub use ndn_nac_face as face;
pub use ndn_nac_store as store;
