//! Error taxonomy for the synchronisation core.
//!
//! Parse-time failures and operational failures are kept as distinct types
//! because they are handled differently by callers: a [`FramingError`]
//! discards only the remainder of the offending packet, while an
//! [`EngineError`] is reported upward but never tears down a peer session.

use thiserror::Error;

/// Failure while decoding a wire record from an inbound frame.
///
/// Encountering one of these means the rest of the packet is unreadable;
/// bytes already consumed for earlier records in the same packet remain
/// valid and are not rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("packet truncated: expected at least {expected} bytes for record {record_type:#04x}, found {found}")]
    Truncated {
        record_type: u8,
        expected: usize,
        found: usize,
    },

    #[error("unknown record type {0:#04x}")]
    UnknownRecordType(u8),

    #[error("outer frame shorter than the {0}-byte header")]
    ShortHeader(usize),

    #[error("piece offset/length overflowed the bundle's declared size")]
    OffsetOverflow,
}

/// Operational failure surfaced by the engine to its caller.
///
/// None of these are fatal to a peer's session; each corresponds to one row
/// of the error taxonomy the engine is specified to tolerate indefinitely.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("partial reassembly for bundle {bid_prefix:016x} from peer {peer:012x} aborted: {reason}")]
    ReassemblyAborted {
        peer: u64,
        bid_prefix: u64,
        reason: &'static str,
    },

    #[error("content store rejected {op} for bundle {bid_prefix:016x}")]
    StoreFailure { op: &'static str, bid_prefix: u64 },

    #[error("no peer record for sid prefix {0:012x}")]
    UnknownPeer(u64),

    #[error("peer table is full ({0} entries) and eviction found no candidate")]
    PeerTableFull(usize),

    #[error("configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Failure validating an [`crate::config::EngineConfig`] at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_bundles_in_flight must be at least 1")]
    ZeroBundlesInFlight,

    #[error("max_peers must be at least 1")]
    ZeroMaxPeers,

    #[error("retransmit_ring_size must be a power of two, got {0}")]
    RingSizeNotPowerOfTwo(u16),

    #[error("failed to parse TOML configuration: {0}")]
    Parse(String),
}
