//! Certificates.
//!
//! A certificate is a Data packet named
//! `<identity>/KEY/<key-id>/<issuer-id>/<version>` whose content is the
//! subject public key in DER (SubjectPublicKeyInfo) form.

use bytes::Bytes;

use crate::error::{CoreError, Result};
use crate::name::{Component, Name};
use crate::packet::Data;

/// The `KEY` marker component of key and certificate names.
pub const KEY_COMPONENT: &str = "KEY";

/// Issuer id used for self-signed certificates.
pub const SELF_ISSUER: &str = "self";

/// A Data packet carrying a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    data: Data,
}

impl Certificate {
    /// Wrap a Data, checking that its name follows the certificate grammar.
    pub fn from_data(data: Data) -> Result<Self> {
        if !is_certificate_name(&data.name) {
            return Err(CoreError::InvalidCertificateName(data.name.to_uri()));
        }
        Ok(Self { data })
    }

    /// `<identity>/KEY/<key-id>`.
    pub fn key_name(&self) -> Name {
        self.data.name.prefix(-2)
    }

    /// `<identity>`.
    pub fn identity(&self) -> Name {
        self.data.name.prefix(-4)
    }

    pub fn name(&self) -> &Name {
        &self.data.name
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.data.content
    }

    pub fn content(&self) -> &Bytes {
        &self.data.content
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }
}

/// `<identity>/KEY/<key-id>/<issuer-id>/<version>`.
pub fn is_certificate_name(name: &Name) -> bool {
    name.len() >= 4
        && matches!(name.get(-4), Some(c) if c.equals_str(KEY_COMPONENT))
        && matches!(name.get(-1), Some(Component::Version(_)))
}

/// `<identity>/KEY/<key-id>`.
pub fn is_key_name(name: &Name) -> bool {
    name.len() >= 2 && matches!(name.get(-2), Some(c) if c.equals_str(KEY_COMPONENT))
}

/// Build `<identity>/KEY/<key-id>`.
pub fn make_key_name(identity: &Name, key_id: impl Into<Component>) -> Name {
    identity.clone().append(KEY_COMPONENT).append(key_id)
}

/// Build `<key-name>/<issuer-id>/<version>`.
pub fn make_certificate_name(
    key_name: &Name,
    issuer_id: impl Into<Component>,
    version: u64,
) -> Result<Name> {
    if !is_key_name(key_name) {
        return Err(CoreError::InvalidKeyName(key_name.to_uri()));
    }
    Ok(key_name.clone().append(issuer_id).append_version(version))
}

/// The identity a key name belongs to.
pub fn key_name_to_identity(key_name: &Name) -> Result<Name> {
    if !is_key_name(key_name) {
        return Err(CoreError::InvalidKeyName(key_name.to_uri()));
    }
    Ok(key_name.prefix(-2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_certificate_accessors() {
        let name = n("/alice/KEY/%01/self/v=5");
        let cert = Certificate::from_data(Data::new(name.clone()).with_content(vec![0x30, 0x00]))
            .unwrap();
        assert_eq!(cert.key_name(), n("/alice/KEY/%01"));
        assert_eq!(cert.identity(), n("/alice"));
        assert_eq!(cert.public_key_der(), &[0x30, 0x00]);
        assert_eq!(cert.name(), &name);
    }

    #[test]
    fn test_rejects_non_certificate_name() {
        assert!(Certificate::from_data(Data::new(n("/alice/KEY/%01"))).is_err());
        assert!(Certificate::from_data(Data::new(n("/alice/NOTKEY/%01/self/v=1"))).is_err());
        assert!(Certificate::from_data(Data::new(n("/alice/KEY/%01/self/1"))).is_err());
    }

    #[test]
    fn test_key_name_helpers() {
        let key = make_key_name(&n("/bob"), "k1");
        assert_eq!(key, n("/bob/KEY/k1"));
        assert!(is_key_name(&key));
        assert_eq!(key_name_to_identity(&key).unwrap(), n("/bob"));
        assert!(key_name_to_identity(&n("/bob")).is_err());

        let cert = make_certificate_name(&key, SELF_ISSUER, 9).unwrap();
        assert!(is_certificate_name(&cert));
        assert!(make_certificate_name(&n("/bob/k1"), SELF_ISSUER, 9).is_err());
    }
}
