//! C3 — tree protocol: encode outbound summaries, absorb inbound ones, and
//! drive the two trees toward convergence.
//!
//! The receiver walk below is the Rust expression of the reference
//! implementation's `recv_key`: descend the local trie in lock-step with an
//! incoming summary, and at the first point of disagreement either learn a
//! new key, queue a local subtree the remote evidently lacks, or step one
//! level deeper to let a future, more specific message resolve the rest.

use tracing::debug;

use crate::tree::{key_equals, nibble, xor_keys, NodeIndex, SyncTree, TreeKey};

/// Encode up to `max_records` outbound summaries by draining the transmit
/// queue. If nothing is queued, fall back to announcing the root alone —
/// the minimum periodic heartbeat that keeps an idle peer pair checking in.
pub fn build_outbound(tree: &mut SyncTree, max_records: usize) -> Vec<TreeKey> {
    let mut records = Vec::new();
    while records.len() < max_records {
        match tree.dequeue_next() {
            Some(idx) => records.push(tree.key(idx)),
            None => break,
        }
    }
    if records.is_empty() {
        if let Some(root) = tree.root() {
            records.push(tree.key(root));
        }
    }
    records
}

/// Absorb a batch of incoming summaries, returning whether any of them
/// changed local state (learned a key or queued a subtree). Callers feed
/// this into [`SyncTree::record_no_progress`]'s stall detection.
pub fn absorb_records(tree: &mut SyncTree, records: &[TreeKey]) -> bool {
    let mut any_progress = false;
    for remote in records {
        if recv_record(tree, remote) {
            any_progress = true;
        }
    }
    if !any_progress {
        tree.record_no_progress();
    }
    any_progress
}

fn recv_record(tree: &mut SyncTree, remote: &TreeKey) -> bool {
    match tree.root() {
        None => {
            if remote.is_leaf() {
                debug!(?remote.payload, "learned first key from empty tree");
                tree.add(remote.payload);
                true
            } else {
                false
            }
        }
        Some(root) => recv_at(tree, root, remote),
    }
}

fn recv_at(tree: &mut SyncTree, local_idx: NodeIndex, remote: &TreeKey) -> bool {
    let local = tree.key(local_idx);

    if key_equals(&local, remote) {
        // Synchronised subtree: de-queue any pending send of it, recursively,
        // now that the remote has proven it already holds this summary.
        tree.mark_dont_send_subtree(local_idx);
        return false;
    }

    if remote.is_leaf() {
        if tree.contains(remote.payload) {
            return false;
        }
        debug!(?remote.payload, "learned key from remote leaf");
        tree.add(remote.payload);
        return true;
    }

    if local.is_leaf() {
        // We hold a concrete key the remote's summary doesn't account for;
        // make sure the remote hears about it.
        tree.queue_node(local_idx, false);
        return false;
    }

    let common_nibbles = (local.prefix_len.min(remote.prefix_len) / 4) as u32;
    let prefix_diverges =
        (0..common_nibbles).any(|n| nibble(&local.payload, n) != nibble(&remote.payload, n));
    if prefix_diverges {
        // The two summaries don't even share a common ancestor at this
        // depth; offer every leaf under our node since nothing finer will
        // resolve the mismatch.
        tree.queue_leaf_nodes(local_idx, false);
        // The remote is guaranteed internal here (its leaf case was ruled
        // out above), so also re-queue the local node itself to prompt it
        // again once it descends further.
        tree.queue_node(local_idx, false);
        return false;
    }

    if remote.prefix_len < local.prefix_len {
        // The remote's record is shallower than ours: it hasn't subdivided
        // this far yet. Re-offer our node so it keeps pace.
        tree.queue_node(local_idx, false);
        return false;
    }

    // Prefixes agree up to our own prefix_len but the summaries disagree;
    // descend into whichever child the remote's bits select.
    let prefix_nibbles = (local.prefix_len / 4) as u32;
    let child_nibble = nibble(&remote.payload, prefix_nibbles) as usize;
    match tree.child(local_idx, child_nibble) {
        Some(child_idx) => recv_at(tree, child_idx, remote),
        None => {
            // We have nothing down this exact path. Try to name the precise
            // subtree the remote is missing by searching for a node whose
            // key equals the XOR difference; if found, that subtree is
            // exactly what's absent on the remote side.
            let diff = xor_keys(&local.payload, &remote.payload);
            let candidate = TreeKey {
                payload: diff,
                prefix_len: local.prefix_len,
                min_prefix_len: local.min_prefix_len,
            };
            if let Some(found) = tree.find_equal(local_idx, &candidate) {
                tree.queue_leaf_nodes(found, false);
            } else {
                tree.queue_node(local_idx, false);
            }
            false
        }
    }
}
