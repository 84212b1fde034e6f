//! KeyChain trait: identities, keys, certificates, signing and TPM decrypt.
//!
//! Names follow the usual grammar:
//!
//! - identity: any name, e.g. `/alice`
//! - key: `<identity>/KEY/<key-id>`
//! - certificate: `<key-name>/<issuer-id>/<version>`

use serde::{Deserialize, Serialize};

use ndn_nac_core::{Certificate, Data, Name};

use crate::error::Result;
use crate::safe_bag::SafeBag;

/// Parameters for generating a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyParams {
    Rsa { bits: usize },
    Ed25519,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self::Rsa { bits: 2048 }
    }
}

impl KeyParams {
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa { .. } => KeyType::Rsa,
            Self::Ed25519 => KeyType::Ed25519,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

/// Which key signs a packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningInfo {
    /// SHA-256 digest only, no key.
    #[default]
    DigestSha256,
    /// The default key of an identity.
    Identity(Name),
    /// A specific key.
    Key(Name),
}

/// Identity store, signer and private-key holder.
///
/// Implementations are internally synchronized.
pub trait KeyChain: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Identities
    // ─────────────────────────────────────────────────────────────────────────

    /// Create `identity` if it does not exist, and give it a default key if
    /// it has none. Returns the default key's certificate.
    fn create_identity(&self, identity: &Name, params: &KeyParams) -> Result<Certificate>;

    fn has_identity(&self, identity: &Name) -> bool;

    /// Remove an identity with all its keys and certificates.
    fn delete_identity(&self, identity: &Name) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Keys and certificates
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a new key for an existing identity and make it the default.
    fn create_key(&self, identity: &Name, params: &KeyParams) -> Result<Certificate>;

    /// Name of the identity's default key.
    fn default_key(&self, identity: &Name) -> Result<Name>;

    fn key_type(&self, key_name: &Name) -> Result<KeyType>;

    fn has_key(&self, key_name: &Name) -> bool;

    /// The key's default certificate.
    fn certificate(&self, key_name: &Name) -> Result<Certificate>;

    // ─────────────────────────────────────────────────────────────────────────
    // Signing and decryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Fill in the signature info and value of `data`.
    fn sign(&self, data: &mut Data, info: &SigningInfo) -> Result<()>;

    /// Decrypt RSA-OAEP `ciphertext` with the private key `key_name`.
    fn decrypt(&self, ciphertext: &[u8], key_name: &Name) -> Result<Vec<u8>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Safe bags
    // ─────────────────────────────────────────────────────────────────────────

    /// Export the certificate and its private key, the key encrypted under
    /// `passphrase` with `iterations` rounds of PBKDF2.
    fn export_safe_bag(
        &self,
        certificate: &Certificate,
        passphrase: &[u8],
        iterations: u32,
    ) -> Result<SafeBag>;

    /// Import a safe bag, creating the identity if needed. An existing key of
    /// the same name is replaced.
    fn import_safe_bag(&self, bag: &SafeBag, passphrase: &[u8]) -> Result<()>;
}
