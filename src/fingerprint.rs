//! C1 — derive a 64-bit salted fingerprint key from a bundle's identity.
//!
//! The fingerprint is what the sync tree actually reconciles on; two bundles
//! with the same fingerprint are treated as the same key regardless of any
//! other metadata. Salting and folding in `version`/`filehash` means that
//! almost any update to a bundle's content changes its fingerprint, so
//! "the peer is missing this key" and "the peer has a stale copy of this
//! bundle" collapse into the same reconciliation primitive.

use sha1::{Digest, Sha1};

/// A bundle's stable, content-addressed identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleId {
    pub bid: [u8; 32],
    pub version: u64,
    pub length: u64,
    pub filehash: String,
}

/// The 64-bit payload reconciled by the sync tree.
pub type FingerprintKey = [u8; 8];

/// Compute `fingerprint = SHA1(salt ‖ bid ‖ filehash ‖ "{length:x}:{version:x}")[..8]`.
///
/// Journal bundles (`version < 2^32`) fold their version in the same way as
/// any other bundle: the fingerprint formula does not special-case them,
/// only the reassembler's preload logic does (see [`crate::reassembly`]).
pub fn fingerprint(salt: &[u8; 8], id: &BundleId) -> FingerprintKey {
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(id.bid);
    hasher.update(id.filehash.as_bytes());
    hasher.update(format!("{:x}:{:x}", id.length, id.version).as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 8];
    key.copy_from_slice(&digest[..8]);
    key
}

/// A journal bundle's body is an append-only log whose length equals its
/// version number; this threshold is how the reassembler decides whether to
/// preload a prior copy's body as the first segment of a new partial.
pub const JOURNAL_VERSION_CEILING: u64 = 1 << 32;

pub fn is_journal_bundle(version: u64) -> bool {
    version < JOURNAL_VERSION_CEILING
}
