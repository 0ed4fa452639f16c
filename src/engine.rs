//! Top-level coordinator tying C1-C6 together behind the three entry points
//! mandated by the concurrency model (§5): `on_tick`, `on_frame`, and
//! `build_frame`. None of them block or spawn work; the engine is driven
//! entirely by its caller.
//!
//! Grounded on `aura-anti-entropy/src/broadcast.rs::BroadcasterHandler`'s
//! role as the single coordinating type a caller drives, though that
//! teacher type is async and this one, per the concurrency model, is not.

use rand::Rng;
use tracing::{debug, warn};

use crate::codec::{
    decode_all, encode_bar, encode_length, encode_piece, encode_sync_tree, Bar, LengthAdvert,
    Piece, Record, SyncTreeWrapper, MAX_PIECE_BYTES,
};
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError};
use crate::fingerprint::{fingerprint, is_journal_bundle, BundleId};
use crate::frame::{decode_header, encode_header, FrameHeader, HEADER_LEN};
use crate::metrics::EngineMetrics;
use crate::protocol::{absorb_records, build_outbound};
use crate::reassembly::Partial;
use crate::scheduler::{higher_priority, PeerRecord, PeerTable, TxCursor};
use crate::store::ContentStore;

fn bid_prefix(bid: &[u8; 32]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bid[..8]);
    u64::from_le_bytes(b)
}

/// Coarse log2 size bucket for a BAR's `size_byte`, cheap enough to fit in a
/// single byte without carrying the exact length on the wire.
fn size_class(length: u64) -> u8 {
    (64 - length.max(1).leading_zeros()) as u8
}

pub struct Engine {
    config: EngineConfig,
    our_sid_prefix: u64,
    peers: PeerTable,
    metrics: EngineMetrics,
    local_msg_number: u16,
    /// Maps a bundle's 64-bit wire prefix back to its full identity; rebuilt
    /// from the store each tick since the wire protocol only ever carries
    /// the truncated form.
    bid_index: std::collections::HashMap<u64, [u8; 32]>,
}

impl Engine {
    pub fn new(config: EngineConfig, our_sid_prefix: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            peers: PeerTable::new(config.max_peers),
            our_sid_prefix,
            metrics: EngineMetrics::default(),
            local_msg_number: 0,
            bid_index: std::collections::HashMap::new(),
            config,
        })
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Convenience wrapper over [`Self::build_frame`] for callers that don't
    /// need deterministic control over the fanout/eviction randomness.
    pub fn build_frame_with_thread_rng(&mut self, store: &dyn ContentStore, mtu: usize) -> Vec<u8> {
        self.build_frame(store, mtu, |n| rand::thread_rng().gen_range(0..n.max(1)))
    }

    /// Convenience wrapper over [`Self::on_frame`] for callers that don't
    /// need deterministic control over the fanout/eviction randomness.
    pub fn on_frame_with_thread_rng(
        &mut self,
        bytes: &[u8],
        now_ms: u64,
        store: &mut dyn ContentStore,
    ) -> Result<(), EngineError> {
        self.on_frame(bytes, now_ms, store, |n| rand::thread_rng().gen_range(0..n.max(1)))
    }

    /// Seed a peer's per-relationship tree with our current keyset and
    /// evict any peer that has gone quiet. Cheap and safe to call every
    /// tick; the actual work is proportional to the number of peers and
    /// bundles, both small and bounded in this system's intended scale.
    pub fn on_tick(&mut self, now_ms: u64, store: &dyn ContentStore) {
        self.bid_index.clear();
        for meta in store.list_bundles() {
            self.bid_index.insert(bid_prefix(&meta.id.bid), meta.id.bid);
        }

        let evicted = self.peers.remove_idle(now_ms, self.config.peer_idle_timeout_ms);
        for sid in evicted {
            warn!(peer = sid, "evicted idle peer");
            self.metrics.record_peer_evicted();
        }

        for peer in self.peers.iter_mut() {
            for meta in store.list_bundles() {
                let key = fingerprint(&self.config.salt, &meta.id);
                peer.sync_tree.add(key);
            }
        }
    }

    fn get_or_insert_peer(&mut self, sid_prefix: u64, mut rng: impl FnMut(usize) -> usize) -> u64 {
        let cfg = &self.config;
        let (_, evicted) = self.peers.get_or_insert(
            sid_prefix,
            || PeerRecord::new(sid_prefix, cfg.max_retries, cfg.max_bundles_in_flight, cfg.retransmit_ring_size),
            &mut rng,
        );
        if let Some(evicted_sid) = evicted {
            self.metrics.record_peer_evicted();
            warn!(peer = evicted_sid, "evicted peer to make room for {sid_prefix:012x}");
        }
        sid_prefix
    }

    /// Assemble one outbound broadcast frame. The transport has no notion
    /// of unicast addressing; individual records carry their own recipient
    /// fields, so a single frame can usefully serve several peers at once.
    pub fn build_frame(
        &mut self,
        store: &dyn ContentStore,
        mtu: usize,
        mut rng: impl FnMut(usize) -> usize,
    ) -> Vec<u8> {
        let mut frame = Vec::with_capacity(mtu.min(4096));
        let header = FrameHeader {
            sender_sid_prefix: self.our_sid_prefix,
            msg_number: self.local_msg_number,
            is_retransmission: false,
        };
        self.local_msg_number = self.local_msg_number.wrapping_add(1) & 0x7FFF;
        encode_header(&header, &mut frame);

        let fanout = self.config.packet_stuffing_fanout as usize;
        let sids: Vec<u64> = self.peers.iter().map(|p| p.sid_prefix).collect();
        if sids.is_empty() {
            return frame;
        }
        let chosen = self.peers.select_fanout(fanout, &mut rng);

        for idx in chosen {
            let peer_sid = sids[idx];
            if let Some(retransmit_seq) = self.peers.get(peer_sid).and_then(|p| p.retransmit_requested) {
                if let Some(peer) = self.peers.get_mut(peer_sid) {
                    if let Some(bytes) = peer.retransmit.get(retransmit_seq) {
                        if frame.len() + bytes.len() <= mtu {
                            frame.extend_from_slice(bytes);
                        }
                        peer.retransmit_requested = None;
                        continue;
                    }
                }
            }
            self.stuff_for_peer(peer_sid, store, mtu, &mut frame);
            if frame.len() >= mtu {
                break;
            }
        }

        if frame.len() > HEADER_LEN {
            self.metrics.record_frame_sent();
        }
        frame
    }

    fn stuff_for_peer(&mut self, peer_sid: u64, store: &dyn ContentStore, mtu: usize, out: &mut Vec<u8>) {
        // A peer we have never sent a sequenced frame to trivially has
        // space: `has_space` only throttles once something is actually
        // outstanding, and `local_seq == 0` before the first `advance()`
        // means nothing is.
        let has_space = match self.peers.get(peer_sid) {
            Some(p) => p.seq.local_seq == 0 || p.seq.has_space(),
            None => return,
        };
        if !has_space {
            return;
        }

        self.announce_bars(peer_sid, store, mtu, out);

        if let Some(peer) = self.peers.get_mut(peer_sid) {
            let records = build_outbound(&mut peer.sync_tree, 8);
            if !records.is_empty() {
                let local_seq = peer.seq.advance();
                let wrapper = SyncTreeWrapper {
                    recipient_sid_prefix: (peer_sid & 0xFF_FFFF) as u32,
                    local_seq,
                    remote_seq_ack: peer.seq.remote_seq_ack,
                    remote_bitmap: peer.seq.remote_bitmap,
                    records,
                };
                encode_sync_tree(&wrapper, out);
            }
        }

        let needs_bundle = self.peers.get(peer_sid).map(|p| p.tx.bid_prefix.is_none()).unwrap_or(false);
        if needs_bundle {
            self.pick_next_bundle(peer_sid, store);
        }

        let cursor = match self.peers.get(peer_sid) {
            Some(p) => p.tx.clone(),
            None => return,
        };
        let Some(prefix) = cursor.bid_prefix else { return };
        let Some(full_bid) = self.bid_index.get(&prefix).copied() else { return };
        let Some((manifest, body)) = store.fetch(&full_bid, cursor.version) else {
            return;
        };
        self.append_piece_records(peer_sid, prefix, cursor.version, &manifest, &body, mtu, out);
    }

    /// Announce any bundle the local store already holds in full, so a peer
    /// that is still missing it can either wait for a push or request it
    /// directly rather than discovering it only through tree convergence.
    /// Each prefix is announced to a given peer once.
    fn announce_bars(&mut self, peer_sid: u64, store: &dyn ContentStore, mtu: usize, out: &mut Vec<u8>) {
        let Some(peer) = self.peers.get_mut(peer_sid) else { return };
        for meta in store.list_bundles() {
            if !meta.announce_bar_now {
                continue;
            }
            let prefix = bid_prefix(&meta.id.bid);
            if peer.announced_bars.contains(&prefix) {
                continue;
            }
            if out.len() + 24 > mtu {
                break;
            }
            let bar = Bar {
                bid_prefix: prefix,
                version: meta.id.version,
                recipient_prefix: (peer_sid & 0xFFFF_FFFF) as u32,
                size_byte: size_class(meta.id.length),
            };
            encode_bar(&bar, out);
            peer.announced_bars.insert(prefix);
        }
    }

    fn pick_next_bundle(&mut self, peer_sid: u64, store: &dyn ContentStore) {
        let best = store
            .list_bundles()
            .into_iter()
            .filter(|b| b.transmit_now)
            .max_by(|a, b| {
                higher_priority((a.last_priority, a.id.version), (b.last_priority, b.id.version))
            });
        if let (Some(meta), Some(peer)) = (best, self.peers.get_mut(peer_sid)) {
            peer.tx = TxCursor {
                bid_prefix: Some(bid_prefix(&meta.id.bid)),
                version: meta.id.version,
                manifest_offset: 0,
                body_offset: 0,
            };
        }
    }

    /// Honour a pull request ('R') addressed to us: point the requesting
    /// peer's transmit cursor at the named bundle and offset, jumping ahead
    /// of whatever `pick_next_bundle` would otherwise have chosen. Grounded
    /// on `rxmessages.c`'s `'R'` case, which sets `transmit_now` and the
    /// announced stream offset for the target bundle once it confirms the
    /// request is addressed to its own SID.
    fn handle_request(&mut self, peer_sid: u64, req: &crate::codec::Request, store: &dyn ContentStore) {
        let our_prefix16 = (self.our_sid_prefix & 0xFFFF) as u16;
        if req.target_sid_prefix != our_prefix16 {
            return;
        }
        let Some(full_bid) = self.bid_index.get(&req.bid_prefix).copied() else {
            debug!(peer = peer_sid, bundle = req.bid_prefix, "pull request for unknown bundle");
            return;
        };
        let Some(meta) = store.list_bundles().into_iter().find(|m| m.id.bid == full_bid) else {
            return;
        };
        let Some((manifest, _)) = store.fetch(&full_bid, meta.id.version) else {
            return;
        };
        let Some(peer) = self.peers.get_mut(peer_sid) else { return };
        debug!(peer = peer_sid, bundle = req.bid_prefix, offset = req.offset, manifest = req.is_manifest, "honouring pull request");
        // A body request should not re-walk the manifest stage; mark it
        // already past its cap so `append_piece_records` falls straight
        // through to body bytes at the requested offset.
        let manifest_cap = manifest.len().min(1024) as u64;
        peer.tx = TxCursor {
            bid_prefix: Some(req.bid_prefix),
            version: meta.id.version,
            manifest_offset: if req.is_manifest { req.offset as u64 } else { manifest_cap },
            body_offset: if req.is_manifest { 0 } else { req.offset as u64 },
        };
    }

    #[allow(clippy::too_many_arguments)]
    fn append_piece_records(
        &mut self,
        peer_sid: u64,
        prefix: u64,
        version: u64,
        manifest: &[u8],
        body: &[u8],
        mtu: usize,
        out: &mut Vec<u8>,
    ) {
        const MANIFEST_CAP: usize = 1024;
        let Some(peer) = self.peers.get_mut(peer_sid) else { return };

        let manifest_cap = manifest.len().min(MANIFEST_CAP);
        if manifest_cap == 0 {
            // An empty manifest still needs an explicit end-of-item piece:
            // without it the receiver never learns `manifest_length = 0`
            // and the partial can never be judged complete.
            if peer.tx.manifest_offset == 0 {
                if out.len() + 21 > mtu {
                    return;
                }
                let piece = Piece {
                    bid_prefix: prefix,
                    version,
                    offset: 0,
                    length: 0,
                    is_manifest: true,
                    end_of_item: true,
                    data: Vec::new(),
                };
                encode_piece(&piece, out);
                peer.tx.manifest_offset = 1;
                return;
            }
        } else if (peer.tx.manifest_offset as usize) < manifest_cap {
            let offset = peer.tx.manifest_offset as usize;
            let remaining = manifest_cap - offset;
            let budget = mtu.saturating_sub(out.len() + 23).min(MAX_PIECE_BYTES);
            let take = remaining.min(budget);
            if take == 0 {
                return;
            }
            let end_of_item = offset + take >= manifest_cap;
            let piece = Piece {
                bid_prefix: prefix,
                version,
                offset: offset as u64,
                length: take as u16,
                is_manifest: true,
                end_of_item,
                data: manifest[offset..offset + take].to_vec(),
            };
            encode_piece(&piece, out);
            peer.tx.manifest_offset += take as u64;
            return;
        }

        if peer.tx.body_offset == 0 {
            encode_length(
                &LengthAdvert {
                    bid_prefix: prefix,
                    version,
                    body_length: body.len() as u32,
                },
                out,
            );
        }

        let offset = peer.tx.body_offset as usize;
        let remaining = body.len().saturating_sub(offset);
        if remaining == 0 {
            peer.tx = TxCursor::default();
            return;
        }
        let budget = mtu.saturating_sub(out.len() + 23).min(MAX_PIECE_BYTES);
        let take = remaining.min(budget);
        if take == 0 {
            return;
        }
        let end_of_item = offset + take >= body.len();
        let piece = Piece {
            bid_prefix: prefix,
            version,
            offset: offset as u64,
            length: take as u16,
            is_manifest: false,
            end_of_item,
            data: body[offset..offset + take].to_vec(),
        };
        encode_piece(&piece, out);
        peer.tx.body_offset += take as u64;
        if end_of_item {
            peer.tx = TxCursor::default();
        }
    }

    /// Absorb one inbound frame. Never returns an error that should tear
    /// down the peer session — framing errors stop parsing the remainder of
    /// the packet and nothing more (§7).
    pub fn on_frame(
        &mut self,
        bytes: &[u8],
        now_ms: u64,
        store: &mut dyn ContentStore,
        mut rng: impl FnMut(usize) -> usize,
    ) -> Result<(), EngineError> {
        let header = match decode_header(bytes) {
            Ok(h) => h,
            Err(e) => {
                self.metrics.record_framing_error();
                return Err(EngineError::Framing(e));
            }
        };
        if header.sender_sid_prefix == self.our_sid_prefix {
            return Ok(());
        }
        self.metrics.record_frame_received();

        self.get_or_insert_peer(header.sender_sid_prefix, &mut rng);
        let Some(peer) = self.peers.get_mut(header.sender_sid_prefix) else {
            return Err(EngineError::UnknownPeer(header.sender_sid_prefix));
        };
        peer.last_seen_ms = now_ms;
        if !header.is_retransmission {
            peer.last_message_number = Some(header.msg_number);
        }

        let records = decode_all(&bytes[HEADER_LEN..]);
        for record in records {
            self.dispatch_record(header.sender_sid_prefix, record, store, &mut rng);
        }
        Ok(())
    }

    fn dispatch_record(
        &mut self,
        peer_sid: u64,
        record: Record,
        store: &mut dyn ContentStore,
        rng: &mut impl FnMut(usize) -> usize,
    ) {
        match record {
            Record::SyncTree(wrapper) => {
                if let Some(peer) = self.peers.get_mut(peer_sid) {
                    peer.seq.on_ack(wrapper.local_seq, wrapper.remote_seq_ack, wrapper.remote_bitmap);
                    absorb_records(&mut peer.sync_tree, &wrapper.records);
                }
            }
            Record::Bar(bar) => {
                if let Some(peer) = self.peers.get_mut(peer_sid) {
                    peer.accept_bar_as_ack(bar.bid_prefix, bar.version);
                }
            }
            Record::Length(len) => {
                if let Some(peer) = self.peers.get_mut(peer_sid) {
                    if let Some(partial) = peer.partials.find_mut(len.bid_prefix) {
                        partial.body.set_declared_length(len.body_length as u64);
                    }
                }
                self.finalize_if_complete(peer_sid, len.bid_prefix, store);
            }
            Record::Piece(piece) => {
                self.absorb_piece(peer_sid, piece, store, rng);
            }
            Record::Request(req) => {
                self.handle_request(peer_sid, &req, store);
            }
        }
    }

    fn absorb_piece(
        &mut self,
        peer_sid: u64,
        piece: Piece,
        store: &mut dyn ContentStore,
        rng: &mut impl FnMut(usize) -> usize,
    ) {
        let Some(peer) = self.peers.get_mut(peer_sid) else { return };

        if peer.partials.find(piece.bid_prefix).is_none() {
            let mut fresh = Partial::new(piece.bid_prefix, piece.version);
            if is_journal_bundle(piece.version) {
                if let Some(full_bid) = self.bid_index.get(&piece.bid_prefix).copied() {
                    if let Some(prior_version) = store.latest_version(&full_bid) {
                        if prior_version < piece.version {
                            if let Some((_, prior_body)) = store.fetch(&full_bid, prior_version) {
                                fresh.preload_journal_body(prior_body);
                            }
                        }
                    }
                }
            }
            let evicted = peer.partials.insert(fresh, |n| rng(n));
            if evicted.is_some() {
                self.metrics.record_partial_aborted();
                warn!(peer = peer_sid, "evicted in-flight partial to make room for a new bundle");
            }
        }

        let Some(peer) = self.peers.get_mut(peer_sid) else { return };
        let Some(partial) = peer.partials.find_mut(piece.bid_prefix) else { return };
        let list = if piece.is_manifest { &mut partial.manifest } else { &mut partial.body };
        list.absorb(piece.offset, &piece.data);
        if piece.end_of_item {
            list.set_declared_length(piece.offset + piece.data.len() as u64);
        }

        self.finalize_if_complete(peer_sid, piece.bid_prefix, store);
    }

    /// Hand a fully reassembled bundle to the store and free its partial.
    /// Called after either a piece or a length advertisement might have
    /// been the last thing needed to complete it — a wholly empty stream
    /// (declared length zero) never receives a piece of its own, so the
    /// length advertisement alone must be able to trigger this.
    fn finalize_if_complete(&mut self, peer_sid: u64, bid_prefix: u64, store: &mut dyn ContentStore) {
        let Some(peer) = self.peers.get_mut(peer_sid) else { return };
        let Some(partial) = peer.partials.find(bid_prefix) else { return };
        if !partial.is_complete() {
            return;
        }
        let version = partial.version;
        let manifest = partial.manifest.completed_bytes().unwrap_or(&[]).to_vec();
        let body = partial.body.completed_bytes().unwrap_or(&[]).to_vec();
        peer.partials.remove(bid_prefix);

        if let Some(full_bid) = self.bid_index.get(&bid_prefix).copied() {
            let id = BundleId {
                bid: full_bid,
                version,
                length: body.len() as u64,
                filehash: String::new(),
            };
            store.insert(id, manifest, body);
            self.metrics.record_bundle_completed();
            debug!(peer = peer_sid, bundle = bid_prefix, "bundle reassembly complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lcg(seed: &mut u64) -> impl FnMut(usize) -> usize + '_ {
        move |n: usize| {
            *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            if n == 0 {
                0
            } else {
                (*seed >> 33) as usize % n
            }
        }
    }

    #[test]
    fn two_engines_converge_and_exchange_a_bundle() {
        let cfg = EngineConfig::default();
        let mut engine_a = Engine::new(cfg.clone(), 1).unwrap();
        let mut engine_b = Engine::new(cfg, 2).unwrap();

        let mut store_a = MemoryStore::new();
        let mut store_b = MemoryStore::new();

        let id = BundleId {
            bid: [5u8; 32],
            version: 1,
            length: 4,
            filehash: "abcd".to_string(),
        };
        store_a.insert(id, vec![0xAA, 0xBB], vec![1, 2, 3, 4]);

        let mut seed_a = 1u64;
        let mut seed_b = 2u64;

        // Prime each peer table by exchanging an initial empty frame so
        // both sides register each other before anything useful is sent.
        let hello_a = engine_a.build_frame(&store_a, 512, lcg(&mut seed_a));
        let hello_b = engine_b.build_frame(&store_b, 512, lcg(&mut seed_b));
        engine_b.on_frame(&hello_a, 0, &mut store_b, lcg(&mut seed_b)).unwrap();
        engine_a.on_frame(&hello_b, 0, &mut store_a, lcg(&mut seed_a)).unwrap();

        let mut completed = false;
        for tick in 0..200u64 {
            engine_a.on_tick(tick, &store_a);
            engine_b.on_tick(tick, &store_b);

            let frame_a = engine_a.build_frame(&store_a, 512, lcg(&mut seed_a));
            let frame_b = engine_b.build_frame(&store_b, 512, lcg(&mut seed_b));

            if frame_a.len() > HEADER_LEN {
                engine_b.on_frame(&frame_a, tick, &mut store_b, lcg(&mut seed_b)).unwrap();
            }
            if frame_b.len() > HEADER_LEN {
                engine_a.on_frame(&frame_b, tick, &mut store_a, lcg(&mut seed_a)).unwrap();
            }

            if store_b.fetch(&[5u8; 32], 1).is_some() {
                completed = true;
                break;
            }
        }

        assert!(completed, "bundle never reached the second store");
        let (manifest, body) = store_b.fetch(&[5u8; 32], 1).unwrap();
        assert_eq!(manifest, vec![0xAA, 0xBB]);
        assert_eq!(body, vec![1, 2, 3, 4]);
        assert!(engine_a.metrics().frames_sent > 0);
    }

    #[test]
    fn self_frames_are_discarded() {
        let cfg = EngineConfig::default();
        let mut engine = Engine::new(cfg, 42).unwrap();
        let mut store = MemoryStore::new();
        let header = FrameHeader {
            sender_sid_prefix: 42,
            msg_number: 0,
            is_retransmission: false,
        };
        let mut frame = Vec::new();
        encode_header(&header, &mut frame);
        engine.on_frame(&frame, 0, &mut store, |n| n % n.max(1)).unwrap();
        assert_eq!(engine.peer_count(), 0);
    }

    #[test]
    fn pull_request_addressed_to_us_redirects_the_tx_cursor() {
        use crate::codec::{encode_request, Request};

        let cfg = EngineConfig::default();
        let mut engine = Engine::new(cfg, 0x0000_0000_1234).unwrap();
        let mut store = MemoryStore::new();
        let id = BundleId {
            bid: [9u8; 32],
            version: 3,
            length: 4,
            filehash: "xyz".to_string(),
        };
        store.insert(id, vec![0xAA, 0xBB], vec![1, 2, 3, 4]);
        engine.on_tick(0, &store);

        let mut frame = Vec::new();
        encode_header(
            &FrameHeader {
                sender_sid_prefix: 0xAAAA,
                msg_number: 0,
                is_retransmission: false,
            },
            &mut frame,
        );
        encode_request(
            &Request {
                target_sid_prefix: 0x1234,
                bid_prefix: bid_prefix(&[9u8; 32]),
                offset: 2,
                is_manifest: false,
                size_byte: 1,
            },
            &mut frame,
        );

        engine.on_frame(&frame, 1, &mut store, |n| n % n.max(1)).unwrap();

        let peer = engine.peers.get(0xAAAA).expect("peer registered");
        assert_eq!(peer.tx.bid_prefix, Some(bid_prefix(&[9u8; 32])));
        assert_eq!(peer.tx.body_offset, 2);
    }

    #[test]
    fn pull_request_addressed_elsewhere_is_ignored() {
        use crate::codec::{encode_request, Request};

        let cfg = EngineConfig::default();
        let mut engine = Engine::new(cfg, 0x0000_0000_1234).unwrap();
        let mut store = MemoryStore::new();
        let id = BundleId {
            bid: [9u8; 32],
            version: 3,
            length: 4,
            filehash: "xyz".to_string(),
        };
        store.insert(id, vec![0xAA, 0xBB], vec![1, 2, 3, 4]);
        engine.on_tick(0, &store);

        let mut frame = Vec::new();
        encode_header(
            &FrameHeader {
                sender_sid_prefix: 0xAAAA,
                msg_number: 0,
                is_retransmission: false,
            },
            &mut frame,
        );
        encode_request(
            &Request {
                target_sid_prefix: 0x9999,
                bid_prefix: bid_prefix(&[9u8; 32]),
                offset: 2,
                is_manifest: false,
                size_byte: 1,
            },
            &mut frame,
        );

        engine.on_frame(&frame, 1, &mut store, |n| n % n.max(1)).unwrap();

        let peer = engine.peers.get(0xAAAA).expect("peer registered");
        assert_eq!(peer.tx.bid_prefix, None);
    }
}
