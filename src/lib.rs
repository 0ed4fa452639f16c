//! Low-bandwidth, tick-driven content-bundle synchronisation.
//!
//! A sync engine reconciles a set of content-addressed *bundles* with a
//! population of peers over an unreliable, bandwidth-constrained broadcast
//! link. It never blocks and never spawns work of its own; a caller drives
//! it entirely through three calls — [`engine::Engine::on_tick`],
//! [`engine::Engine::build_frame`], and [`engine::Engine::on_frame`] — and
//! owns the actual I/O.
//!
//! Module map:
//!
//! - [`fingerprint`] — derive the salted 64-bit key a bundle reconciles on.
//! - [`tree`] — the local XOR-summarised prefix trie over those keys.
//! - [`protocol`] — encode/absorb tree summaries and drive convergence.
//! - [`reassembly`] — buffer out-of-order manifest/body pieces per bundle.
//! - [`codec`] — the wire format for pieces, BARs, requests, and tree
//!   summaries.
//! - [`frame`] — the outer per-packet header wrapping codec records.
//! - [`scheduler`] — per-peer sequencing, retransmission, fanout selection.
//! - [`store`] — the [`store::ContentStore`] trait the engine reads and
//!   writes bundles through, plus an in-memory reference implementation.
//! - [`config`] — engine tuning knobs, loadable from TOML.
//! - [`metrics`] — plain counters returned to the caller.
//! - [`engine`] — the coordinator tying the above together.
//! - [`error`] — the error taxonomy shared across modules.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod frame;
pub mod metrics;
pub mod protocol;
pub mod reassembly;
pub mod scheduler;
pub mod store;
pub mod tree;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, EngineError, FramingError};
pub use fingerprint::BundleId;
pub use metrics::EngineMetrics;
pub use store::{BundleMeta, ContentStore, MemoryStore};
