//! The NAC naming grammar.
//!
//! ```text
//! KEK            <identity>/NAC/<dataset>/KEK/<key-id>
//! KDK            <identity>/NAC/<dataset>/KDK/<key-id>/ENCRYPTED-BY/<member-key-name>
//! CK             <ck-prefix>/CK/<version>
//! CK Data        <ck-prefix>/CK/<version>/ENCRYPTED-BY/<kek-name>
//! ```

use ndn_nac_core::certificate::KEY_COMPONENT;
use ndn_nac_core::{Component, Name};

use crate::error::{ErrorCode, NacError, Result};

pub const NAC: &str = "NAC";
pub const KEK: &str = "KEK";
pub const KDK: &str = "KDK";
pub const CK: &str = "CK";
pub const ENCRYPTED_BY: &str = "ENCRYPTED-BY";

/// `<identity>/NAC/<dataset>`
pub fn nac_identity(identity: &Name, dataset: impl Into<Component>) -> Name {
    identity.clone().append(NAC).append(dataset)
}

/// `<prefix>/KEK`
pub fn kek_prefix(prefix: &Name) -> Name {
    prefix.clone().append(KEK)
}

/// `<nac-identity>/KDK/<key-id>`
pub fn kdk_prefix(nac_identity: &Name, key_id: &Component) -> Name {
    nac_identity.clone().append(KDK).append(key_id.clone())
}

/// `<kdk-prefix>/ENCRYPTED-BY/<member-key-name>`
pub fn kdk_name(kdk_prefix: &Name, member_key_name: &Name) -> Name {
    kdk_prefix.clone().append(ENCRYPTED_BY).append_name(member_key_name)
}

/// `<prefix>/CK`
pub fn ck_prefix(prefix: &Name) -> Name {
    prefix.clone().append(CK)
}

/// `<ck-name>/ENCRYPTED-BY/<kek-name>`
pub fn ck_data_name(ck_name: &Name, kek_name: &Name) -> Name {
    ck_name.clone().append(ENCRYPTED_BY).append_name(kek_name)
}

/// `<x>/KEK/<key-id>` to `<x>/KDK/<key-id>`.
pub fn kek_name_to_kdk_prefix(kek_name: &Name) -> Result<Name> {
    match (kek_name.get(-2), kek_name.get(-1)) {
        (Some(marker), Some(key_id)) if marker.equals_str(KEK) => {
            Ok(kdk_prefix(&kek_name.prefix(-2), key_id))
        }
        _ => Err(NacError::new(
            ErrorCode::KekInvalidName,
            format!("Invalid KEK name [{}]", kek_name),
        )),
    }
}

/// Where to find the KDK for a CK, derived from the CK Data name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdkInfo {
    /// `<nac-identity>/KDK/<key-id>`
    pub kdk_prefix: Name,
    /// `<nac-identity>`
    pub kdk_identity: Name,
    /// `<nac-identity>/KEY/<key-id>`, the key a KDK bundle imports as.
    pub kdk_key_name: Name,
}

/// Split `<ck-name>/ENCRYPTED-BY/<kek-name>` and derive the KDK location.
pub fn extract_kdk_info(ck_data_name: &Name, ck_name: &Name) -> Result<KdkInfo> {
    let marker = ck_data_name.get(ck_name.len() as isize);
    let well_formed = ck_data_name.len() > ck_name.len()
        && ck_name.is_prefix_of(ck_data_name)
        && marker.map_or(false, |c| c.equals_str(ENCRYPTED_BY));
    if !well_formed {
        return Err(NacError::new(
            ErrorCode::CkInvalidName,
            format!("Invalid CK name [{}]", ck_data_name),
        ));
    }

    let kek_name = ck_data_name.sub_name(ck_name.len() + 1);
    let kdk_prefix = kek_name_to_kdk_prefix(&kek_name)?;
    let kdk_identity = kek_name.prefix(-2);
    let kdk_key_name = kdk_identity
        .clone()
        .append(KEY_COMPONENT)
        .append_name(&kek_name.sub_name(kek_name.len() - 1));
    Ok(KdkInfo {
        kdk_prefix,
        kdk_identity,
        kdk_key_name,
    })
}
