//! The Access Manager: publishes the KEK and grants KDKs to members.
//!
//! The data owner runs one Access Manager per dataset. It holds the NAC key
//! pair for `<identity>/NAC/<dataset>`. The public half goes out as the KEK.
//! The private half goes out once per member as a KDK: a safe bag locked
//! with a random passphrase, with the passphrase encrypted to the member's
//! key.

use rand::RngCore;
use std::sync::{Arc, Mutex, PoisonError};
use zeroize::Zeroizing;

use ndn_nac_core::{Certificate, Component, Data, Name};
use ndn_nac_crypto::{asymmetric, CompactEnvelope, EncryptAlgorithm};
use ndn_nac_face::{Face, RegisteredPrefixId};
use ndn_nac_store::{KeyChain, KeyParams, KeyType, RetainingCache, SigningInfo};

use crate::config::NacConfig;
use crate::error::{ErrorCode, NacError, Result};
use crate::naming;
use crate::serve::ServeFromCache;

/// Publishes the KEK for a dataset and issues per-member KDKs.
pub struct AccessManager {
    identity: Name,
    nac_certificate: Certificate,
    kek_name: Name,
    kdk_prefix: Name,
    keychain: Arc<dyn KeyChain>,
    face: Arc<dyn Face>,
    cache: Arc<RetainingCache>,
    config: NacConfig,
    registrations: Mutex<Vec<RegisteredPrefixId>>,
}

impl AccessManager {
    /// Set up the NAC identity `<identity>/NAC/<dataset>`, publish its KEK,
    /// and start serving the KEK and KDK prefixes.
    ///
    /// An existing RSA key of the NAC identity is reused. Packets are signed
    /// with the default key of `identity`, which must exist in `keychain`.
    pub fn new(
        identity: &Name,
        dataset: impl Into<Component>,
        keychain: Arc<dyn KeyChain>,
        face: Arc<dyn Face>,
        config: NacConfig,
    ) -> Result<Self> {
        let nac_identity = naming::nac_identity(identity, dataset);
        let params = KeyParams::Rsa {
            bits: config.rsa_key_bits,
        };

        let mut nac_certificate = keychain.create_identity(&nac_identity, &params)?;
        if keychain.key_type(&nac_certificate.key_name())? != KeyType::Rsa {
            tracing::debug!(
                identity = %nac_identity,
                "Cannot re-use existing KEK/KDK pair, as it is not an RSA key, regenerating"
            );
            nac_certificate = keychain.create_key(&nac_identity, &params)?;
        }

        let nac_key_name = nac_certificate.key_name();
        let key_id = nac_key_name.get(-1).cloned().ok_or_else(|| {
            NacError::new(
                ErrorCode::General,
                format!("NAC key name {} has no key id", nac_key_name),
            )
        })?;

        let kek_prefix = naming::kek_prefix(&nac_identity);
        let kek_name = kek_prefix.clone().append(key_id.clone());
        let kdk_prefix = naming::kdk_prefix(&nac_identity, &key_id);

        // The KEK is the NAC certificate under another name.
        let mut kek_data = Data::new(kek_name.clone())
            .with_content(nac_certificate.content().clone())
            .with_freshness_period(config.kek_freshness);
        keychain.sign(&mut kek_data, &SigningInfo::Identity(identity.clone()))?;

        let cache = Arc::new(RetainingCache::new());
        cache.insert(kek_data);
        tracing::debug!(kek = %kek_name, "Publishing KEK");

        let handler = ServeFromCache::new(Arc::clone(&cache), "KEK/KDK");
        let mut registrations = Vec::with_capacity(2);
        for prefix in [&kek_prefix, &kdk_prefix] {
            match face.register_prefix(prefix, handler.clone()) {
                Ok(id) => registrations.push(id),
                Err(e) => {
                    for id in registrations {
                        face.unregister_prefix(id);
                    }
                    return Err(NacError::new(
                        ErrorCode::General,
                        format!("Failed to register prefix {}: {}", prefix, e),
                    ));
                }
            }
        }

        Ok(Self {
            identity: identity.clone(),
            nac_certificate,
            kek_name,
            kdk_prefix,
            keychain,
            face,
            cache,
            config,
            registrations: Mutex::new(registrations),
        })
    }

    /// Authorize the owner of `member` to decrypt, returning the KDK Data.
    ///
    /// Granting the same member key again replaces the earlier KDK.
    #[doc(alias = "add_member")]
    pub fn grant_access(&self, member: &Certificate) -> Result<Data> {
        let kdk_name = naming::kdk_name(&self.kdk_prefix, &member.key_name());

        let mut secret = Zeroizing::new(vec![0u8; self.config.secret_length]);
        rand::thread_rng().fill_bytes(&mut secret);
        self.config.passphrase_mapping.apply(&mut secret);

        let bag = self.keychain.export_safe_bag(
            &self.nac_certificate,
            &secret,
            self.config.safe_bag_iterations,
        )?;

        let wrapped_secret =
            asymmetric::encrypt(member.public_key_der(), &secret, EncryptAlgorithm::RsaOaep)
                .map_err(|e| {
                    NacError::new(
                        ErrorCode::EncryptionFailure,
                        format!("Failed to encrypt KDK secret for {}: {}", member.key_name(), e),
                    )
                })?;

        let envelope = CompactEnvelope {
            payload: bag.wire_encode(),
            wrapped_secret: Some(wrapped_secret),
        };
        let mut kdk_data = Data::new(kdk_name)
            .with_content(envelope.wire_encode())
            .with_freshness_period(self.config.kdk_freshness);
        self.keychain
            .sign(&mut kdk_data, &SigningInfo::Identity(self.identity.clone()))?;

        self.cache.insert(kdk_data.clone());
        tracing::debug!(kdk = %kdk_data.name, "Granted access");
        Ok(kdk_data)
    }

    /// Number of packets published (the KEK plus one KDK per member).
    pub fn size(&self) -> usize {
        self.cache.size()
    }

    pub fn kek_name(&self) -> &Name {
        &self.kek_name
    }

    /// The published KEK Data.
    pub fn kek_data(&self) -> Option<Data> {
        self.cache.get(&self.kek_name)
    }

    /// `<identity>/NAC/<dataset>/KEY/<key-id>`
    pub fn nac_key_name(&self) -> Name {
        self.nac_certificate.key_name()
    }

    pub fn kdk_prefix(&self) -> &Name {
        &self.kdk_prefix
    }

    /// Withdraw the KEK and KDK registrations. Idempotent.
    pub fn shutdown(&self) {
        let registrations = std::mem::take(
            &mut *self
                .registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in registrations {
            self.face.unregister_prefix(id);
        }
    }
}

impl Drop for AccessManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndn_nac_core::Interest;
    use ndn_nac_face::memory::MemoryNetwork;
    use ndn_nac_store::{MemoryKeyChain, SafeBag};
    use std::time::Duration;

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn config() -> NacConfig {
        NacConfig {
            rsa_key_bits: 1024,
            safe_bag_iterations: 16,
            ..NacConfig::default()
        }
    }

    struct Fixture {
        network: Arc<MemoryNetwork>,
        keychain: Arc<MemoryKeyChain>,
        manager: AccessManager,
    }

    fn fixture() -> Fixture {
        let network = MemoryNetwork::new();
        let keychain = Arc::new(MemoryKeyChain::new());
        keychain
            .create_identity(&n("/owner"), &KeyParams::Rsa { bits: 1024 })
            .unwrap();
        let manager = AccessManager::new(
            &n("/owner"),
            "dataset",
            keychain.clone(),
            Arc::new(network.create_face()),
            config(),
        )
        .unwrap();
        Fixture {
            network,
            keychain,
            manager,
        }
    }

    #[test]
    fn test_kek_published() {
        let f = fixture();
        assert_eq!(f.manager.size(), 1);
        assert_eq!(f.manager.kek_name().prefix(-1), n("/owner/NAC/dataset/KEK"));
        assert_eq!(f.manager.kek_name().get(-1), f.manager.nac_key_name().get(-1));

        let kek = f.manager.kek_data().unwrap();
        let nac_cert = f.keychain.certificate(&f.manager.nac_key_name()).unwrap();
        assert_eq!(kek.content, nac_cert.content().clone());
        assert_eq!(kek.meta_info.freshness_period, Some(Duration::from_millis(3_600_000)));
        assert!(f.keychain.verify(&kek).unwrap());
        assert_eq!(f.network.route_count(), 2);
    }

    #[test]
    fn test_nac_key_reused() {
        let f = fixture();
        let second = AccessManager::new(
            &n("/owner"),
            "dataset",
            f.keychain.clone(),
            Arc::new(f.network.create_face()),
            config(),
        )
        .unwrap();
        assert_eq!(second.nac_key_name(), f.manager.nac_key_name());
        assert_eq!(second.kek_name(), f.manager.kek_name());
    }

    #[test]
    fn test_non_rsa_nac_key_replaced() {
        let network = MemoryNetwork::new();
        let keychain = Arc::new(MemoryKeyChain::new());
        keychain
            .create_identity(&n("/owner"), &KeyParams::Rsa { bits: 1024 })
            .unwrap();
        let ed_cert = keychain
            .create_identity(&n("/owner/NAC/ds"), &KeyParams::Ed25519)
            .unwrap();

        let manager = AccessManager::new(
            &n("/owner"),
            "ds",
            keychain.clone(),
            Arc::new(network.create_face()),
            config(),
        )
        .unwrap();
        assert_ne!(manager.nac_key_name(), ed_cert.key_name());
        assert_eq!(keychain.key_type(&manager.nac_key_name()).unwrap(), KeyType::Rsa);
    }

    #[test]
    fn test_grant_access_kdk() {
        let f = fixture();
        let member_cert = f
            .keychain
            .create_identity(&n("/member"), &KeyParams::Rsa { bits: 1024 })
            .unwrap();

        let kdk = f.manager.grant_access(&member_cert).unwrap();
        let expected = f
            .manager
            .kdk_prefix()
            .clone()
            .append("ENCRYPTED-BY")
            .append_name(&member_cert.key_name());
        assert_eq!(kdk.name, expected);
        assert_eq!(kdk.meta_info.freshness_period, Some(Duration::from_millis(3_600_000)));
        assert_eq!(f.manager.size(), 2);

        let envelope = CompactEnvelope::wire_decode(&kdk.content).unwrap();
        let secret = f
            .keychain
            .decrypt(envelope.wrapped_secret.as_ref().unwrap(), &member_cert.key_name())
            .unwrap();
        assert_eq!(secret.len(), 32);
        assert!(secret.iter().all(|b| (1..=0x7f).contains(b)));

        let bag = SafeBag::wire_decode(&envelope.payload).unwrap();
        let (cert, _der) = bag.open(&secret).unwrap();
        assert_eq!(cert.key_name(), f.manager.nac_key_name());
    }

    #[test]
    fn test_grant_twice_replaces() {
        let f = fixture();
        let member_cert = f
            .keychain
            .create_identity(&n("/member"), &KeyParams::Rsa { bits: 1024 })
            .unwrap();

        let first = f.manager.grant_access(&member_cert).unwrap();
        let second = f.manager.grant_access(&member_cert).unwrap();
        assert_eq!(first.name, second.name);
        assert_ne!(first.content, second.content);
        assert_eq!(f.manager.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_kek_and_kdk() {
        let f = fixture();
        let member_cert = f
            .keychain
            .create_identity(&n("/member"), &KeyParams::Rsa { bits: 1024 })
            .unwrap();
        let kdk = f.manager.grant_access(&member_cert).unwrap();

        let consumer = f.network.create_face();
        let kek_interest = Interest::new(n("/owner/NAC/dataset/KEK"))
            .with_can_be_prefix(true)
            .with_must_be_fresh(true);
        let kek = consumer.express_interest(kek_interest).await.unwrap();
        assert_eq!(&kek.name, f.manager.kek_name());

        let kdk_interest = Interest::new(kdk.name.clone()).with_must_be_fresh(true);
        let fetched = consumer.express_interest(kdk_interest).await.unwrap();
        assert_eq!(fetched, kdk);
    }

    #[test]
    fn test_shutdown_withdraws_prefixes() {
        let f = fixture();
        assert_eq!(f.network.route_count(), 2);
        f.manager.shutdown();
        assert_eq!(f.network.route_count(), 0);
        f.manager.shutdown();

        let network = f.network.clone();
        let second = AccessManager::new(
            &n("/owner"),
            "other",
            f.keychain.clone(),
            Arc::new(network.create_face()),
            config(),
        )
        .unwrap();
        assert_eq!(network.route_count(), 2);
        drop(second);
        assert_eq!(network.route_count(), 0);
    }
}
