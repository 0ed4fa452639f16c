//! C6 — per-peer sequencing, retransmission, and the packet-stuffing
//! selection policy. The actual frame assembly loop lives in
//! [`crate::engine`], which owns the store and the codec; this module only
//! owns the bookkeeping a scheduler needs to decide who gets a frame next
//! and what to do when one goes unacknowledged.

use crate::reassembly::PartialTable;
use crate::tree::SyncTree;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeqWindow {
    pub local_seq: u8,
    /// The peer's ack of our own `local_seq`, echoed back to us in their
    /// wrapper's `remote_seq_ack` field. `has_space` compares against this.
    pub local_seq_acked_by_peer: u8,
    /// Our ack of the peer's `local_seq`, echoed outward in our own
    /// wrapper's `remote_seq_ack` field.
    pub remote_seq_ack: u8,
    pub remote_bitmap: u16,
}

impl SeqWindow {
    /// A peer has window space iff `(local_seq - local_seq_acked_by_peer)
    /// mod 256 > 0`. Any nonzero difference counts, not just differences
    /// under 128.
    pub fn has_space(&self) -> bool {
        self.local_seq != self.local_seq_acked_by_peer
    }

    /// Advance to the next outgoing sequence number and return it, matching
    /// the reference implementation's pre-increment-then-embed order.
    pub fn advance(&mut self) -> u8 {
        self.local_seq = self.local_seq.wrapping_add(1);
        self.local_seq
    }

    /// `remote_local_seq` is the sequence number the peer just sent us;
    /// `remote_ack_of_us` is the peer's ack of our own sequence, lifted
    /// straight from their wrapper's `remote_seq_ack` field.
    pub fn on_ack(&mut self, remote_local_seq: u8, remote_ack_of_us: u8, bitmap: u16) {
        self.remote_seq_ack = remote_local_seq;
        self.local_seq_acked_by_peer = remote_ack_of_us;
        self.remote_bitmap = bitmap;
    }
}

#[derive(Debug, Clone)]
pub struct RetransmitRing {
    slots: Vec<Option<Vec<u8>>>,
}

impl RetransmitRing {
    pub fn new(size: u16) -> Self {
        Self {
            slots: vec![None; size as usize],
        }
    }

    fn slot_for(&self, seq: u8) -> usize {
        seq as usize % self.slots.len()
    }

    pub fn record_sent(&mut self, seq: u8, frame: Vec<u8>) {
        let idx = self.slot_for(seq);
        self.slots[idx] = Some(frame);
    }

    pub fn get(&self, seq: u8) -> Option<&[u8]> {
        self.slots[self.slot_for(seq)].as_deref()
    }
}

/// Which bundle a peer is currently being pushed pieces of, and how far.
/// Bundles are tracked here by their 64-bit wire prefix, the same handle
/// `'B'`/`'L'`/piece records carry; the engine resolves it back to a full
/// identity only when it needs to call into the store.
#[derive(Debug, Clone, Default)]
pub struct TxCursor {
    pub bid_prefix: Option<u64>,
    pub version: u64,
    pub manifest_offset: u64,
    pub body_offset: u64,
}

pub struct PeerRecord {
    pub sid_prefix: u64,
    /// This peer's independent view of set reconciliation: per-node send
    /// state (what we've already offered this specific peer) is peer-local
    /// even though the underlying key set is shared, so each peer gets its
    /// own tree instance, seeded from the local store.
    pub sync_tree: SyncTree,
    pub partials: PartialTable,
    pub tx: TxCursor,
    pub seq: SeqWindow,
    pub retransmit: RetransmitRing,
    pub retransmit_requested: Option<u8>,
    pub last_seen_ms: u64,
    pub last_message_number: Option<u16>,
    /// Bundle prefixes already announced to this peer via a BAR record, so
    /// `announce_bar_now` bundles are advertised once rather than every
    /// tick.
    pub announced_bars: std::collections::HashSet<u64>,
}

impl PeerRecord {
    pub fn new(sid_prefix: u64, max_retries: u8, max_bundles_in_flight: u8, ring_size: u16) -> Self {
        Self {
            sid_prefix,
            sync_tree: SyncTree::new(max_retries),
            partials: PartialTable::new(max_bundles_in_flight),
            tx: TxCursor::default(),
            seq: SeqWindow::default(),
            retransmit: RetransmitRing::new(ring_size),
            retransmit_requested: None,
            last_seen_ms: 0,
            last_message_number: None,
            announced_bars: std::collections::HashSet::new(),
        }
    }

    /// A BAR reporting the peer already holds `version` or newer acts as a
    /// positive acknowledgement: advance past the bundle we were pushing so
    /// the scheduler moves on to the next priority candidate.
    pub fn accept_bar_as_ack(&mut self, bid_prefix: u64, version: u64) {
        if self.tx.bid_prefix == Some(bid_prefix) && version >= self.tx.version {
            self.tx = TxCursor::default();
        }
    }

    pub fn is_idle(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > idle_timeout_ms
    }
}

pub struct PeerTable {
    peers: Vec<PeerRecord>,
    capacity: usize,
}

impl PeerTable {
    pub fn new(capacity: u16) -> Self {
        Self {
            peers: Vec::new(),
            capacity: capacity as usize,
        }
    }

    pub fn get_mut(&mut self, sid_prefix: u64) -> Option<&mut PeerRecord> {
        self.peers.iter_mut().find(|p| p.sid_prefix == sid_prefix)
    }

    pub fn get(&self, sid_prefix: u64) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.sid_prefix == sid_prefix)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerRecord> {
        self.peers.iter_mut()
    }

    /// Insert a new peer, evicting via `pick_eviction_index` if the table is
    /// already at capacity. Returns the evicted peer's sid prefix, if any.
    pub fn get_or_insert(
        &mut self,
        sid_prefix: u64,
        make: impl FnOnce() -> PeerRecord,
        pick_eviction_index: impl FnOnce(usize) -> usize,
    ) -> (&mut PeerRecord, Option<u64>) {
        if let Some(pos) = self.peers.iter().position(|p| p.sid_prefix == sid_prefix) {
            return (&mut self.peers[pos], None);
        }
        let mut evicted = None;
        if self.peers.len() >= self.capacity && !self.peers.is_empty() {
            let idx = pick_eviction_index(self.peers.len()) % self.peers.len();
            evicted = Some(self.peers.remove(idx).sid_prefix);
        }
        self.peers.push(make());
        let last = self.peers.len() - 1;
        (&mut self.peers[last], evicted)
    }

    pub fn remove_idle(&mut self, now_ms: u64, idle_timeout_ms: u64) -> Vec<u64> {
        let mut removed = Vec::new();
        self.peers.retain(|p| {
            let idle = p.is_idle(now_ms, idle_timeout_ms);
            if idle {
                removed.push(p.sid_prefix);
            }
            !idle
        });
        removed
    }

    /// Choose up to `fanout` peer indices to service this tick, given an
    /// external source of randomness. The policy knob only needs to be
    /// deterministic given its input sequence (spec §9); callers supply
    /// `pick_index` for that determinism in tests.
    pub fn select_fanout(&self, fanout: usize, mut pick_index: impl FnMut(usize) -> usize) -> Vec<usize> {
        if self.peers.is_empty() {
            return Vec::new();
        }
        let take = fanout.min(self.peers.len());
        let mut chosen = Vec::with_capacity(take);
        let mut seen = std::collections::HashSet::new();
        let mut attempts = 0;
        while chosen.len() < take && attempts < take * 8 {
            let idx = pick_index(self.peers.len()) % self.peers.len();
            if seen.insert(idx) {
                chosen.push(idx);
            }
            attempts += 1;
        }
        chosen
    }
}

/// Priority comparison used to pick the next bundle to push to an idle
/// peer: highest `last_priority` wins, ties broken by most recent update.
pub fn higher_priority(a: (u32, u64), b: (u32, u64)) -> std::cmp::Ordering {
    a.0.cmp(&b.0).then(a.1.cmp(&b.1))
}
