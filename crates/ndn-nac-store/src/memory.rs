//! In-memory KeyChain.
//!
//! Identities, keys and certificates live in a single `RwLock`. Nothing is
//! persisted. Thread-safe.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ed25519_dalek::pkcs8::EncodePublicKey;
use rand::RngCore;
use rsa::pkcs1v15;
use rsa::signature::SignatureEncoding;
use sha2::{Digest, Sha256};

use ndn_nac_core::certificate::{make_certificate_name, make_key_name, SELF_ISSUER};
use ndn_nac_core::{Certificate, Data, KeyLocator, Name, SignatureInfo, SignatureType};
use ndn_nac_crypto::{EncryptAlgorithm, RsaKeyPair};

use crate::error::{Result, StoreError};
use crate::keychain::{KeyChain, KeyParams, KeyType, SigningInfo};
use crate::safe_bag::SafeBag;

/// Freshness period given to self-signed certificates.
const CERTIFICATE_FRESHNESS: Duration = Duration::from_secs(3600);

const KEY_ID_LEN: usize = 8;

/// In-memory identity store and TPM.
pub struct MemoryKeyChain {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    identities: BTreeMap<Name, IdentityRecord>,
    keys: HashMap<Name, KeyRecord>,
}

#[derive(Default)]
struct IdentityRecord {
    keys: BTreeSet<Name>,
    default_key: Option<Name>,
}

struct KeyRecord {
    secret: SecretKey,
    certificate: Certificate,
}

enum SecretKey {
    Rsa(RsaKeyPair),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SecretKey {
    fn generate(params: &KeyParams) -> Result<Self> {
        match params {
            KeyParams::Rsa { bits } => Ok(Self::Rsa(RsaKeyPair::generate(*bits)?)),
            KeyParams::Ed25519 => Ok(Self::Ed25519(ed25519_dalek::SigningKey::generate(
                &mut rand::thread_rng(),
            ))),
        }
    }

    fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    fn signature_type(&self) -> SignatureType {
        match self {
            Self::Rsa(_) => SignatureType::Sha256WithRsa,
            Self::Ed25519(_) => SignatureType::Ed25519,
        }
    }

    fn public_key_der(&self) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(kp) => Ok(kp.public_key_der()?),
            Self::Ed25519(sk) => sk
                .verifying_key()
                .to_public_key_der()
                .map(|doc| doc.into_vec())
                .map_err(|e| StoreError::Signing(e.to_string())),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(kp) => {
                let signer = pkcs1v15::SigningKey::<Sha256>::new(kp.private_key().clone());
                let signature = rsa::signature::Signer::try_sign(&signer, message)
                    .map_err(|e| StoreError::Signing(e.to_string()))?;
                Ok(signature.to_vec())
            }
            Self::Ed25519(sk) => {
                let signature: ed25519_dalek::Signature = ed25519_dalek::Signer::sign(sk, message);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Rsa(kp) => {
                let verifier = pkcs1v15::VerifyingKey::<Sha256>::new(kp.private_key().to_public_key());
                match pkcs1v15::Signature::try_from(signature) {
                    Ok(sig) => rsa::signature::Verifier::verify(&verifier, message, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            Self::Ed25519(sk) => match ed25519_dalek::Signature::from_slice(signature) {
                Ok(sig) => sk.verify_strict(message, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }
}

impl MemoryKeyChain {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Check the signature of `data` against a key held by this key chain.
    ///
    /// Digest signatures are checked by recomputing the digest.
    pub fn verify(&self, data: &Data) -> Result<bool> {
        let portion = data.signed_portion();
        match data.signature_info.signature_type {
            SignatureType::DigestSha256 => {
                Ok(Sha256::digest(&portion).as_slice() == data.signature_value.as_ref())
            }
            _ => {
                let key_name = match &data.signature_info.key_locator {
                    Some(KeyLocator::Name(name)) => name,
                    _ => return Err(StoreError::Signing("signature has no key name".into())),
                };
                let inner = self.read();
                let record = inner
                    .keys
                    .get(key_name)
                    .ok_or_else(|| StoreError::KeyNotFound(key_name.to_uri()))?;
                Ok(record.secret.verify(&portion, &data.signature_value))
            }
        }
    }

    /// Names of all identities.
    pub fn identities(&self) -> Vec<Name> {
        self.read().identities.keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a key and its self-signed certificate without touching the
    /// store.
    fn generate_key(identity: &Name, params: &KeyParams) -> Result<(Name, KeyRecord)> {
        let mut key_id = [0u8; KEY_ID_LEN];
        rand::thread_rng().fill_bytes(&mut key_id);
        let key_name = make_key_name(identity, key_id.to_vec());

        let secret = SecretKey::generate(params)?;
        let certificate = self_sign(&key_name, &secret)?;
        Ok((key_name, KeyRecord { secret, certificate }))
    }

    fn resolve_signing_key(inner: &Inner, info: &SigningInfo) -> Result<Name> {
        match info {
            SigningInfo::DigestSha256 => Err(StoreError::Signing("no key for digest signing".into())),
            SigningInfo::Key(key_name) => Ok(key_name.clone()),
            SigningInfo::Identity(identity) => inner
                .identities
                .get(identity)
                .ok_or_else(|| StoreError::IdentityNotFound(identity.to_uri()))?
                .default_key
                .clone()
                .ok_or_else(|| StoreError::KeyNotFound(format!("{} has no default key", identity))),
        }
    }
}

impl Default for MemoryKeyChain {
    fn default() -> Self {
        Self::new()
    }
}

fn self_sign(key_name: &Name, secret: &SecretKey) -> Result<Certificate> {
    let version = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let name = make_certificate_name(key_name, SELF_ISSUER, version)?;

    let mut data = Data::new(name)
        .with_content(secret.public_key_der()?)
        .with_freshness_period(CERTIFICATE_FRESHNESS);
    data.signature_info = SignatureInfo {
        signature_type: secret.signature_type(),
        key_locator: Some(KeyLocator::Name(key_name.clone())),
    };
    data.signature_value = secret.sign(&data.signed_portion())?.into();
    Ok(Certificate::from_data(data)?)
}

impl KeyChain for MemoryKeyChain {
    fn create_identity(&self, identity: &Name, params: &KeyParams) -> Result<Certificate> {
        {
            let inner = self.read();
            if let Some(default_key) = inner
                .identities
                .get(identity)
                .and_then(|record| record.default_key.as_ref())
            {
                if let Some(key) = inner.keys.get(default_key) {
                    return Ok(key.certificate.clone());
                }
            }
        }

        let (key_name, record) = Self::generate_key(identity, params)?;
        let certificate = record.certificate.clone();

        let mut inner = self.write();
        let entry = inner.identities.entry(identity.clone()).or_default();
        entry.keys.insert(key_name.clone());
        entry.default_key = Some(key_name.clone());
        inner.keys.insert(key_name.clone(), record);
        tracing::debug!(identity = %identity, key = %key_name, "Created identity");
        Ok(certificate)
    }

    fn has_identity(&self, identity: &Name) -> bool {
        self.read().identities.contains_key(identity)
    }

    fn delete_identity(&self, identity: &Name) -> Result<()> {
        let mut inner = self.write();
        let record = inner
            .identities
            .remove(identity)
            .ok_or_else(|| StoreError::IdentityNotFound(identity.to_uri()))?;
        for key_name in &record.keys {
            inner.keys.remove(key_name);
        }
        Ok(())
    }

    fn create_key(&self, identity: &Name, params: &KeyParams) -> Result<Certificate> {
        if !self.has_identity(identity) {
            return Err(StoreError::IdentityNotFound(identity.to_uri()));
        }
        let (key_name, record) = Self::generate_key(identity, params)?;
        let certificate = record.certificate.clone();

        let mut inner = self.write();
        let entry = inner
            .identities
            .get_mut(identity)
            .ok_or_else(|| StoreError::IdentityNotFound(identity.to_uri()))?;
        entry.keys.insert(key_name.clone());
        entry.default_key = Some(key_name.clone());
        inner.keys.insert(key_name, record);
        Ok(certificate)
    }

    fn default_key(&self, identity: &Name) -> Result<Name> {
        let inner = self.read();
        inner
            .identities
            .get(identity)
            .ok_or_else(|| StoreError::IdentityNotFound(identity.to_uri()))?
            .default_key
            .clone()
            .ok_or_else(|| StoreError::KeyNotFound(format!("{} has no default key", identity)))
    }

    fn key_type(&self, key_name: &Name) -> Result<KeyType> {
        self.read()
            .keys
            .get(key_name)
            .map(|record| record.secret.key_type())
            .ok_or_else(|| StoreError::KeyNotFound(key_name.to_uri()))
    }

    fn has_key(&self, key_name: &Name) -> bool {
        self.read().keys.contains_key(key_name)
    }

    fn certificate(&self, key_name: &Name) -> Result<Certificate> {
        self.read()
            .keys
            .get(key_name)
            .map(|record| record.certificate.clone())
            .ok_or_else(|| StoreError::CertificateNotFound(key_name.to_uri()))
    }

    fn sign(&self, data: &mut Data, info: &SigningInfo) -> Result<()> {
        if let SigningInfo::DigestSha256 = info {
            data.signature_info = SignatureInfo {
                signature_type: SignatureType::DigestSha256,
                key_locator: None,
            };
            data.signature_value = Sha256::digest(data.signed_portion()).to_vec().into();
            return Ok(());
        }

        let inner = self.read();
        let key_name = Self::resolve_signing_key(&inner, info)?;
        let record = inner
            .keys
            .get(&key_name)
            .ok_or_else(|| StoreError::KeyNotFound(key_name.to_uri()))?;

        data.signature_info = SignatureInfo {
            signature_type: record.secret.signature_type(),
            key_locator: Some(KeyLocator::Name(key_name.clone())),
        };
        data.signature_value = record.secret.sign(&data.signed_portion())?.into();
        Ok(())
    }

    fn decrypt(&self, ciphertext: &[u8], key_name: &Name) -> Result<Vec<u8>> {
        let inner = self.read();
        match inner.keys.get(key_name).map(|record| &record.secret) {
            Some(SecretKey::Rsa(kp)) => Ok(kp.decrypt(ciphertext, EncryptAlgorithm::RsaOaep)?),
            Some(SecretKey::Ed25519(_)) => Err(StoreError::UnsupportedKeyType(format!(
                "{} is not an RSA key",
                key_name
            ))),
            None => Err(StoreError::KeyNotFound(key_name.to_uri())),
        }
    }

    fn export_safe_bag(
        &self,
        certificate: &Certificate,
        passphrase: &[u8],
        iterations: u32,
    ) -> Result<SafeBag> {
        let key_name = certificate.key_name();
        let der = {
            let inner = self.read();
            match inner.keys.get(&key_name).map(|record| &record.secret) {
                Some(SecretKey::Rsa(kp)) => kp.to_pkcs8_der()?,
                Some(SecretKey::Ed25519(_)) => {
                    return Err(StoreError::UnsupportedKeyType(format!(
                        "{} cannot be exported",
                        key_name
                    )))
                }
                None => return Err(StoreError::KeyNotFound(key_name.to_uri())),
            }
        };
        SafeBag::seal(certificate, &der, passphrase, iterations)
    }

    fn import_safe_bag(&self, bag: &SafeBag, passphrase: &[u8]) -> Result<()> {
        let (certificate, der) = bag.open(passphrase)?;
        let key_pair = RsaKeyPair::from_pkcs8_der(&der)?;
        let key_name = certificate.key_name();
        let identity = certificate.identity();

        let mut inner = self.write();
        let entry = inner.identities.entry(identity).or_default();
        entry.keys.insert(key_name.clone());
        if entry.default_key.is_none() {
            entry.default_key = Some(key_name.clone());
        }
        inner.keys.insert(
            key_name.clone(),
            KeyRecord {
                secret: SecretKey::Rsa(key_pair),
                certificate,
            },
        );
        tracing::debug!(key = %key_name, "Imported safe bag");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe_bag::DEFAULT_ITERATIONS;
    use ndn_nac_crypto::asymmetric;

    const RSA: KeyParams = KeyParams::Rsa { bits: 1024 };

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_create_identity_is_reused() {
        let kc = MemoryKeyChain::new();
        let cert = kc.create_identity(&n("/alice"), &RSA).unwrap();
        assert_eq!(cert.identity(), n("/alice"));
        assert_eq!(kc.default_key(&n("/alice")).unwrap(), cert.key_name());
        assert_eq!(kc.key_type(&cert.key_name()).unwrap(), KeyType::Rsa);

        let again = kc.create_identity(&n("/alice"), &KeyParams::Ed25519).unwrap();
        assert_eq!(again, cert);
    }

    #[test]
    fn test_create_key_becomes_default() {
        let kc = MemoryKeyChain::new();
        let first = kc.create_identity(&n("/bob"), &RSA).unwrap();
        let second = kc.create_key(&n("/bob"), &KeyParams::Ed25519).unwrap();
        assert_ne!(first.key_name(), second.key_name());
        assert_eq!(kc.default_key(&n("/bob")).unwrap(), second.key_name());
        assert_eq!(kc.key_type(&second.key_name()).unwrap(), KeyType::Ed25519);
        assert!(kc.has_key(&first.key_name()));

        assert!(matches!(
            kc.create_key(&n("/nobody"), &RSA),
            Err(StoreError::IdentityNotFound(_))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let kc = MemoryKeyChain::new();
        kc.create_identity(&n("/rsa"), &RSA).unwrap();
        kc.create_identity(&n("/ed"), &KeyParams::Ed25519).unwrap();

        for (info, expected) in [
            (SigningInfo::Identity(n("/rsa")), SignatureType::Sha256WithRsa),
            (SigningInfo::Identity(n("/ed")), SignatureType::Ed25519),
            (SigningInfo::DigestSha256, SignatureType::DigestSha256),
        ] {
            let mut data = Data::new(n("/d")).with_content(vec![1, 2, 3]);
            kc.sign(&mut data, &info).unwrap();
            assert_eq!(data.signature_info.signature_type, expected);
            assert!(kc.verify(&data).unwrap());

            data.content = vec![9].into();
            assert!(!kc.verify(&data).unwrap());
        }
    }

    #[test]
    fn test_certificates_are_self_signed() {
        let kc = MemoryKeyChain::new();
        let cert = kc.create_identity(&n("/carol"), &RSA).unwrap();
        assert!(kc.verify(cert.data()).unwrap());
        assert_eq!(kc.certificate(&cert.key_name()).unwrap(), cert);
    }

    #[test]
    fn test_decrypt_unknown_key() {
        let kc = MemoryKeyChain::new();
        assert!(matches!(
            kc.decrypt(&[0u8; 128], &n("/x/KEY/1")),
            Err(StoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_tpm_decrypt() {
        let kc = MemoryKeyChain::new();
        let cert = kc.create_identity(&n("/dave"), &RSA).unwrap();
        let ct =
            asymmetric::encrypt(cert.public_key_der(), b"secret", EncryptAlgorithm::RsaOaep).unwrap();
        assert_eq!(kc.decrypt(&ct, &cert.key_name()).unwrap(), b"secret");
    }

    #[test]
    fn test_safe_bag_roundtrip() {
        let owner = MemoryKeyChain::new();
        let cert = owner.create_identity(&n("/owner/NAC/ds"), &RSA).unwrap();
        let bag = owner.export_safe_bag(&cert, b"pass", DEFAULT_ITERATIONS).unwrap();
        let bag = SafeBag::wire_decode(&bag.wire_encode()).unwrap();

        let other = MemoryKeyChain::new();
        assert!(other.import_safe_bag(&bag, b"wrong").is_err());
        assert!(!other.has_key(&cert.key_name()));

        other.import_safe_bag(&bag, b"pass").unwrap();
        assert!(other.has_key(&cert.key_name()));
        assert!(other.has_identity(&n("/owner/NAC/ds")));

        let ct =
            asymmetric::encrypt(cert.public_key_der(), &[4u8; 32], EncryptAlgorithm::RsaOaep).unwrap();
        assert_eq!(other.decrypt(&ct, &cert.key_name()).unwrap(), vec![4u8; 32]);

        // Importing again replaces the key in place.
        other.import_safe_bag(&bag, b"pass").unwrap();
        assert_eq!(other.identities().len(), 1);
    }

    #[test]
    fn test_ed25519_not_exportable() {
        let kc = MemoryKeyChain::new();
        let cert = kc.create_identity(&n("/ed"), &KeyParams::Ed25519).unwrap();
        assert!(matches!(
            kc.export_safe_bag(&cert, b"p", DEFAULT_ITERATIONS),
            Err(StoreError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn test_delete_identity() {
        let kc = MemoryKeyChain::new();
        let cert = kc.create_identity(&n("/eve"), &RSA).unwrap();
        kc.delete_identity(&n("/eve")).unwrap();
        assert!(!kc.has_identity(&n("/eve")));
        assert!(!kc.has_key(&cert.key_name()));
        assert!(kc.delete_identity(&n("/eve")).is_err());
    }
}
