//! External content store interface (§6) plus an in-memory reference
//! implementation used by tests and doctests. Grounded on
//! `aura-anti-entropy/src/persistent.rs::PersistentSyncHandler`'s role: one
//! concrete backing behind a trait the protocol code never names directly.

use std::collections::HashMap;

use crate::fingerprint::BundleId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMeta {
    pub id: BundleId,
    pub last_priority: u32,
    pub announce_bar_now: bool,
    pub transmit_now: bool,
}

/// Collaborator consulted by the engine for everything content-addressed.
/// The engine never assumes a particular storage medium; it only ever
/// drives this trait.
pub trait ContentStore {
    fn list_bundles(&self) -> Vec<BundleMeta>;

    /// Fetch a primed cache of a bundle's bytes: the manifest (capped at
    /// 1024 bytes per the transport's transmission ordering) and the full
    /// body.
    fn fetch(&self, bid: &[u8; 32], version: u64) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Look up the most recent version we hold of a journal bundle, used
    /// for preload (§4.4).
    fn latest_version(&self, bid: &[u8; 32]) -> Option<u64>;

    fn insert(&mut self, id: BundleId, manifest: Vec<u8>, body: Vec<u8>) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    bundles: HashMap<[u8; 32], HashMap<u64, (BundleId, Vec<u8>, Vec<u8>)>>,
    priorities: HashMap<[u8; 32], u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_priority(&mut self, bid: [u8; 32], priority: u32) {
        self.priorities.insert(bid, priority);
    }
}

impl ContentStore for MemoryStore {
    fn list_bundles(&self) -> Vec<BundleMeta> {
        let mut out = Vec::new();
        for (bid, versions) in &self.bundles {
            let latest = versions.iter().max_by_key(|(version, _)| **version);
            if let Some((_, (id, _, _))) = latest {
                out.push(BundleMeta {
                    id: id.clone(),
                    last_priority: *self.priorities.get(bid).unwrap_or(&0),
                    announce_bar_now: true,
                    transmit_now: true,
                });
            }
        }
        out
    }

    fn fetch(&self, bid: &[u8; 32], version: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        self.bundles
            .get(bid)
            .and_then(|versions| versions.get(&version))
            .map(|(_, manifest, body)| (manifest.clone(), body.clone()))
    }

    fn latest_version(&self, bid: &[u8; 32]) -> Option<u64> {
        self.bundles.get(bid).and_then(|versions| versions.keys().max().copied())
    }

    fn insert(&mut self, id: BundleId, manifest: Vec<u8>, body: Vec<u8>) -> bool {
        let entry = self.bundles.entry(id.bid).or_default();
        let is_new = !entry.contains_key(&id.version);
        entry.insert(id.version, (id, manifest, body));
        is_new
    }
}
