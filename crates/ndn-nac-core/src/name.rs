//! Hierarchical names.
//!
//! A [`Name`] is an ordered sequence of [`Component`]s. Equality, ordering
//! and prefix tests compare component values, never their URI rendering, so
//! `/a/%2F` and a name whose single component is the two bytes `a/` differ.
//!
//! ## URI form
//!
//! - Unreserved characters (`A-Z a-z 0-9 - . _ ~`) are written as-is
//! - Every other byte is percent-encoded as `%XX`
//! - A component made only of periods (including the empty component) gets
//!   three extra periods, so `...` is the empty component
//! - `v=<n>` is a version component, `sha256digest=<hex>` an implicit digest

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// A single name component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    /// Opaque bytes.
    Generic(Vec<u8>),
    /// A version number.
    Version(u64),
    /// Digest of a packet's wire encoding, only ever the last component.
    ImplicitDigest([u8; 32]),
}

impl Component {
    /// Create a generic component from raw bytes.
    pub fn generic(bytes: impl AsRef<[u8]>) -> Self {
        Self::Generic(bytes.as_ref().to_vec())
    }

    /// The raw value bytes of this component.
    ///
    /// Versions are rendered as a big-endian non-negative integer of minimal
    /// length, the same value encoding NDN-TLV uses.
    pub fn value_bytes(&self) -> Vec<u8> {
        match self {
            Self::Generic(b) => b.clone(),
            Self::Version(v) => crate::tlv::nonneg_bytes(*v),
            Self::ImplicitDigest(d) => d.to_vec(),
        }
    }

    /// Whether this component is the ASCII text `s`.
    pub fn equals_str(&self, s: &str) -> bool {
        matches!(self, Self::Generic(b) if b.as_slice() == s.as_bytes())
    }

    /// The version number, if this is a version component.
    pub fn as_version(&self) -> Option<u64> {
        match self {
            Self::Version(v) => Some(*v),
            _ => None,
        }
    }

    /// Render in URI form (without a leading slash).
    pub fn to_uri(&self) -> String {
        match self {
            Self::Version(v) => format!("v={}", v),
            Self::ImplicitDigest(d) => format!("sha256digest={}", hex::encode(d)),
            Self::Generic(bytes) => {
                let mut out = String::with_capacity(bytes.len());
                if bytes.iter().all(|b| *b == b'.') {
                    out.push_str("...");
                }
                for &b in bytes {
                    if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                        out.push(b as char);
                    } else {
                        out.push_str(&format!("%{:02X}", b));
                    }
                }
                out
            }
        }
    }

    /// Parse a single component from URI form.
    pub fn from_uri(s: &str) -> Result<Self> {
        if let Some(v) = s.strip_prefix("v=") {
            let n = v
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidUri(format!("bad version component: {}", s)))?;
            return Ok(Self::Version(n));
        }

        if let Some(h) = s.strip_prefix("sha256digest=") {
            let bytes = hex::decode(h)
                .map_err(|_| CoreError::InvalidUri(format!("bad digest component: {}", s)))?;
            let digest: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CoreError::InvalidUri(format!("digest must be 32 bytes: {}", s)))?;
            return Ok(Self::ImplicitDigest(digest));
        }

        let mut bytes = percent_decode(s)?;
        if bytes.iter().all(|b| *b == b'.') {
            if bytes.len() < 3 {
                return Err(CoreError::InvalidUri(format!(
                    "illegal period-only component: {}",
                    s
                )));
            }
            bytes.truncate(bytes.len() - 3);
        }
        Ok(Self::Generic(bytes))
    }
}

fn percent_decode(s: &str) -> Result<Vec<u8>> {
    let raw = s.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw
                .get(i + 1..i + 3)
                .ok_or_else(|| CoreError::InvalidUri(format!("truncated escape in {}", s)))?;
            let text = std::str::from_utf8(hex)
                .map_err(|_| CoreError::InvalidUri(format!("bad escape in {}", s)))?;
            let byte = u8::from_str_radix(text, 16)
                .map_err(|_| CoreError::InvalidUri(format!("bad escape in {}", s)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.to_uri())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self::Generic(s.as_bytes().to_vec())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Self::Generic(s.into_bytes())
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Generic(bytes)
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Self::Generic(bytes.to_vec())
    }
}

/// A hierarchical name.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty name `/`.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a name from components.
    pub fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// Parse a name from URI form, e.g. `/alice/KEY/%01`.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let trimmed = uri.strip_prefix("ndn:").unwrap_or(uri);
        trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Component::from_uri)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Render in URI form. The empty name renders as `/`.
    pub fn to_uri(&self) -> String {
        if self.0.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for c in &self.0 {
            out.push('/');
            out.push_str(&c.to_uri());
        }
        out
    }

    /// Append a component, builder style.
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.0.push(component.into());
        self
    }

    /// Append every component of `other`, builder style.
    pub fn append_name(mut self, other: &Name) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// Append a version component, builder style.
    pub fn append_version(mut self, version: u64) -> Self {
        self.0.push(Component::Version(version));
        self
    }

    /// Append a component in place.
    pub fn push(&mut self, component: impl Into<Component>) {
        self.0.push(component.into());
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `index`. Negative indices count from the end, so
    /// `get(-1)` is the last component.
    pub fn get(&self, index: isize) -> Option<&Component> {
        let i = self.resolve_index(index)?;
        self.0.get(i)
    }

    /// The first `n` components. A negative `n` drops `|n|` components from
    /// the end. Out-of-range values clamp to the whole or empty name.
    pub fn prefix(&self, n: isize) -> Name {
        let len = self.0.len() as isize;
        let end = if n < 0 { len + n } else { n };
        let end = end.clamp(0, len) as usize;
        Self(self.0[..end].to_vec())
    }

    /// All components from `start` on.
    pub fn sub_name(&self, start: usize) -> Name {
        Self(self.0.get(start..).map(<[Component]>::to_vec).unwrap_or_default())
    }

    /// Whether every component of `self` matches the leading components of
    /// `other`. A name is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// The components, in order.
    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Iterate over components.
    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.0.iter()
    }

    fn resolve_index(&self, index: isize) -> Option<usize> {
        if index < 0 {
            let back = index.unsigned_abs();
            self.0.len().checked_sub(back)
        } else {
            Some(index as usize)
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Name {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_uri(s)
    }
}

impl<'a> IntoIterator for &'a Name {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_uri_roundtrip() {
        let name = n("/alice/KEY/%01%02/v=7");
        assert_eq!(name.len(), 4);
        assert_eq!(name.get(-1), Some(&Component::Version(7)));
        assert_eq!(name.get(2), Some(&Component::Generic(vec![1, 2])));
        assert_eq!(name.to_uri(), "/alice/KEY/%01%02/v=7");
    }

    #[test]
    fn test_empty_name() {
        let name = n("/");
        assert!(name.is_empty());
        assert_eq!(name.to_uri(), "/");
        assert!(name.is_prefix_of(&n("/anything")));
    }

    #[test]
    fn test_period_components() {
        let name = Name::new().append("").append(".");
        assert_eq!(name.to_uri(), "/.../....");
        assert_eq!(n("/.../...."), name);
        assert!(Name::from_uri("/..").is_err());
    }

    #[test]
    fn test_prefix_and_get_negative() {
        let name = n("/a/b/c/d");
        assert_eq!(name.prefix(-2), n("/a/b"));
        assert_eq!(name.prefix(2), n("/a/b"));
        assert_eq!(name.prefix(10), name);
        assert_eq!(name.prefix(-10), Name::new());
        assert_eq!(name.get(-2), Some(&Component::from("c")));
        assert_eq!(name.get(-5), None);
        assert_eq!(name.get(4), None);
        assert_eq!(name.sub_name(3), n("/d"));
        assert_eq!(name.sub_name(9), Name::new());
    }

    #[test]
    fn test_prefix_compares_components_not_text() {
        assert!(n("/a/b").is_prefix_of(&n("/a/b/c")));
        assert!(!n("/a/b").is_prefix_of(&n("/a/bc")));
        assert!(n("/a/b").is_prefix_of(&n("/a/b")));
        assert!(!n("/a/b/c").is_prefix_of(&n("/a/b")));
    }

    #[test]
    fn test_escaped_slash_is_one_component() {
        let name = n("/a%2Fb");
        assert_eq!(name.len(), 1);
        assert_ne!(name, n("/a/b"));
    }

    #[test]
    fn test_digest_component_uri() {
        let name = Name::new().append("x").append(Component::ImplicitDigest([0xab; 32]));
        let parsed = n(&name.to_uri());
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_bad_uris_rejected() {
        assert!(Name::from_uri("/a/%4").is_err());
        assert!(Name::from_uri("/v=notanumber").is_err());
        assert!(Name::from_uri("/sha256digest=abcd").is_err());
    }

    proptest! {
        #[test]
        fn prop_generic_components_survive_uri(parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..6)) {
            let name = Name::from_components(parts.into_iter().map(Component::Generic).collect());
            let parsed = Name::from_uri(&name.to_uri()).unwrap();
            prop_assert_eq!(parsed, name);
        }

        #[test]
        fn prop_prefix_is_prefix(parts in prop::collection::vec("[a-z]{1,4}", 0..6), cut in 0isize..7) {
            let mut name = Name::new();
            for p in &parts {
                name.push(p.as_str());
            }
            prop_assert!(name.prefix(cut).is_prefix_of(&name));
        }
    }
}
