//! # NDN NAC Store
//!
//! Local state shared by the access-control components.
//!
//! ## Key Types
//!
//! - [`RetainingCache`] - Published packets, served on matching Interests
//! - [`KeyChain`] - Identity store, signer and private-key holder
//! - [`MemoryKeyChain`] - In-memory [`KeyChain`]
//! - [`SafeBag`] - A certificate plus its passphrase-protected private key
//!
//! ## Design Notes
//!
//! - **No eviction**: the cache grows until its owner clears it
//! - **Replace on insert**: a packet with an existing name overwrites the
//!   old one
//! - **Sync API**: key chain calls are CPU-bound and never await

pub mod cache;
pub mod error;
pub mod keychain;
pub mod memory;
pub mod safe_bag;

pub use cache::RetainingCache;
pub use error::{Result, StoreError};
pub use keychain::{KeyChain, KeyParams, KeyType, SigningInfo};
pub use memory::MemoryKeyChain;
pub use safe_bag::SafeBag;
