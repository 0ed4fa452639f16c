//! Plain counters accumulated by the engine and returned to the caller.
//! There is no export pipeline here — shipping these numbers anywhere is a
//! caller concern, matching the Non-goals around observability plumbing.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped_framing_error: u64,
    pub bundles_completed: u64,
    pub partials_aborted: u64,
    pub peers_evicted: u64,
}

impl EngineMetrics {
    pub fn record_frame_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn record_frame_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn record_framing_error(&mut self) {
        self.frames_dropped_framing_error += 1;
    }

    pub fn record_bundle_completed(&mut self) {
        self.bundles_completed += 1;
    }

    pub fn record_partial_aborted(&mut self) {
        self.partials_aborted += 1;
    }

    pub fn record_peer_evicted(&mut self) {
        self.peers_evicted += 1;
    }
}
