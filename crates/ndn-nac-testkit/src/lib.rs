//! # NDN NAC Testkit
//!
//! Testing utilities for NDN NAC.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Known-answer vectors**: NIST AES vectors and byte-exact envelope encodings
//! - **Generators**: Proptest strategies for names, keys and envelopes
//! - **Fixtures**: A shared memory network and key chain with constructors
//!   for every component
//!
//! ## Known-Answer Vectors
//!
//! ```rust
//! use ndn_nac_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed, detail) in verify_all_vectors() {
//!     assert!(passed, "{}: {}", name, detail);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ndn_nac_crypto::FullEnvelope;
//! use ndn_nac_testkit::generators::full_envelope;
//!
//! proptest! {
//!     #[test]
//!     fn envelope_decodes(env in full_envelope()) {
//!         let decoded = FullEnvelope::wire_decode(&env.wire_encode()).unwrap();
//!         prop_assert_eq!(decoded, env);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use ndn_nac_testkit::NacFixture;
//!
//! let fixture = NacFixture::new();
//! let manager = fixture.access_manager();
//! let alice = fixture.member("/alice");
//! manager.grant_access(&alice)?;
//!
//! let encryptor = fixture.encryptor("/producer");
//! encryptor.wait_for_kek().await?;
//! let envelope = encryptor.encrypt(b"hello")?;
//!
//! let plaintext = fixture.decryptor(&alice).decrypt(envelope).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, name, test_config, NacFixture};
pub use vectors::{cipher_vectors, envelope_vectors, verify_all_vectors, CipherVector, EnvelopeVector};
