//! Retaining cache of published packets.
//!
//! Entries are indexed by Data name; inserting a packet with a name already
//! present replaces it. Nothing is ever evicted. Lookups scan in name order
//! and return the first entry whose full name (implicit digest included)
//! starts with the Interest name.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use ndn_nac_core::{Data, Interest, Name};

/// An unbounded, explicitly managed store of published packets.
#[derive(Debug, Default)]
pub struct RetainingCache {
    entries: RwLock<BTreeMap<Name, CachedPacket>>,
}

#[derive(Debug)]
struct CachedPacket {
    full_name: Name,
    data: Data,
}

impl RetainingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `data`, replacing any entry with the same name.
    pub fn insert(&self, data: Data) {
        let full_name = data.full_name();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(data.name.clone(), CachedPacket { full_name, data });
    }

    /// First packet whose full name has the Interest name as a prefix.
    ///
    /// Freshness and other selectors are not consulted.
    pub fn find(&self, interest: &Interest) -> Option<Data> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .find(|entry| interest.name.is_prefix_of(&entry.full_name))
            .map(|entry| entry.data.clone())
    }

    /// Packet stored under exactly `name`.
    pub fn get(&self, name: &Name) -> Option<Data> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).map(|entry| entry.data.clone())
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Names of all stored packets, in canonical order.
    pub fn names(&self) -> Vec<Name> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
