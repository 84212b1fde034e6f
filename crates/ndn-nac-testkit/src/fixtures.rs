//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: one memory network, one shared
//! key chain, and constructors for every NAC component wired to them.

use std::sync::{Arc, Mutex};

use rand::RngCore;

use ndn_nac::{AccessManager, Decryptor, Encryptor, ErrorCode, NacConfig, NacError};
use ndn_nac_core::{Certificate, Name};
use ndn_nac_face::memory::MemoryNetwork;
use ndn_nac_face::Face;
use ndn_nac_store::{KeyChain, KeyParams, MemoryKeyChain, SigningInfo};

/// Owner identity used by [`NacFixture::new`].
pub const OWNER: &str = "/org/owner";

/// Dataset used by [`NacFixture::new`].
pub const DATASET: &str = "data";

/// Parse a name URI, panicking on bad input.
pub fn name(uri: &str) -> Name {
    Name::from_uri(uri).expect("valid name URI")
}

/// Small keys and few PBKDF2 rounds so tests stay fast.
pub fn test_config() -> NacConfig {
    NacConfig {
        rsa_key_bits: 1024,
        safe_bag_iterations: 16,
        ..NacConfig::default()
    }
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();
}

/// Random bytes of the given length.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// A network and key chain shared by an owner, producers and members.
pub struct NacFixture {
    pub network: Arc<MemoryNetwork>,
    pub keychain: Arc<MemoryKeyChain>,
    pub owner: Name,
    pub dataset: String,
    pub config: NacConfig,
}

impl NacFixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: NacConfig) -> Self {
        Self {
            network: MemoryNetwork::new(),
            keychain: Arc::new(MemoryKeyChain::new()),
            owner: name(OWNER),
            dataset: DATASET.to_string(),
            config,
        }
    }

    /// `<owner>/NAC/<dataset>`
    pub fn nac_identity(&self) -> Name {
        ndn_nac::naming::nac_identity(&self.owner, self.dataset.as_str())
    }

    /// A fresh face on the shared network.
    pub fn face(&self) -> Arc<dyn Face> {
        Arc::new(self.network.create_face())
    }

    /// Access manager for the owner's dataset. Creates the owner identity
    /// on first use.
    pub fn access_manager(&self) -> AccessManager {
        self.keychain
            .create_identity(
                &self.owner,
                &KeyParams::Rsa {
                    bits: self.config.rsa_key_bits,
                },
            )
            .expect("owner identity");
        AccessManager::new(
            &self.owner,
            self.dataset.as_str(),
            self.keychain.clone(),
            self.face(),
            self.config.clone(),
        )
        .expect("access manager")
    }

    /// Create a member identity with an RSA key and return its certificate.
    pub fn member(&self, identity: &str) -> Certificate {
        self.keychain
            .create_identity(
                &name(identity),
                &KeyParams::Rsa {
                    bits: self.config.rsa_key_bits,
                },
            )
            .expect("member identity")
    }

    /// Create `count` members named `/member/<i>`.
    pub fn members(&self, count: usize) -> Vec<Certificate> {
        (0..count)
            .map(|i| self.member(&format!("/member/{}", i)))
            .collect()
    }

    /// Encryptor publishing under `ck_prefix` that ignores errors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn encryptor(&self, ck_prefix: &str) -> Encryptor {
        self.encryptor_with(ck_prefix, Arc::new(|_: &NacError| {}))
    }

    /// Encryptor plus a log of every error code it reports.
    pub fn recording_encryptor(&self, ck_prefix: &str) -> (Encryptor, Arc<Mutex<Vec<ErrorCode>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let encryptor = self.encryptor_with(
            ck_prefix,
            Arc::new(move |e: &NacError| sink.lock().expect("error log").push(e.code())),
        );
        (encryptor, log)
    }

    fn encryptor_with(&self, ck_prefix: &str, on_error: ndn_nac::ErrorCallback) -> Encryptor {
        Encryptor::new(
            &self.nac_identity(),
            &name(ck_prefix),
            SigningInfo::DigestSha256,
            on_error,
            self.keychain.clone(),
            self.face(),
            self.config.clone(),
        )
        .expect("encryptor")
    }

    /// Decryptor for the member whose certificate is `member`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn decryptor(&self, member: &Certificate) -> Decryptor {
        Decryptor::new(
            &member.key_name(),
            self.keychain.clone(),
            self.face(),
            self.config.clone(),
        )
        .expect("decryptor")
    }
}

impl Default for NacFixture {
    fn default() -> Self {
        Self::new()
    }
}
