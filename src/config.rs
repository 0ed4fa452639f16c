//! Engine configuration.
//!
//! Mirrors the teacher crate's `AntiEntropyConfig`/`AntiEntropyRuntimeConfig`
//! pattern: a plain, `serde`-serialisable struct with a [`Default`] impl
//! matching sensible compiled-in constants, loadable from TOML, validated
//! once at construction rather than at every use site.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of bits consumed per level of the sync tree's prefix trie.
pub const PREFIX_STEP_BITS: u32 = 4;

/// Width, in bytes, of a fingerprint key.
pub const KEY_BYTES: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shared salt mixed into every fingerprint. Both peers must agree on
    /// this value or their trees will never converge; rotating it is an
    /// unresolved open question upstream (see DESIGN.md) and is not
    /// performed automatically.
    #[serde(with = "salt_hex")]
    pub salt: [u8; 8],

    /// Maximum number of times a queued tree node is retransmitted before
    /// it is marked sent and dropped from the queue.
    pub max_retries: u8,

    /// Maximum number of bundles a single peer may be reassembling at once.
    pub max_bundles_in_flight: u8,

    /// Maximum number of peer records held concurrently; beyond this the
    /// table evicts by the configured policy.
    pub max_peers: u16,

    /// Size of the per-peer retransmit ring. Must be a power of two so
    /// slot selection can mask rather than modulo.
    pub retransmit_ring_size: u16,

    /// How many randomly chosen active peers are considered per call to the
    /// scheduler's packet-stuffing loop.
    pub packet_stuffing_fanout: u8,

    /// Milliseconds of silence after which a peer record is evicted.
    pub peer_idle_timeout_ms: u64,

    /// Consecutive no-progress packets before a tree reports a stall.
    pub stall_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Fixed default salt carried over from the reference
            // implementation this protocol was distilled from.
            salt: [0xa9, 0x1b, 0x8d, 0x11, 0xdd, 0xee, 0x20, 0xd0],
            max_retries: 5,
            max_bundles_in_flight: 4,
            max_peers: 64,
            retransmit_ring_size: 16,
            packet_stuffing_fanout: 10,
            peer_idle_timeout_ms: 120_000,
            stall_threshold: 50,
        }
    }
}

impl EngineConfig {
    /// Validate field invariants that the rest of the engine relies on
    /// holding unconditionally.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bundles_in_flight == 0 {
            return Err(ConfigError::ZeroBundlesInFlight);
        }
        if self.max_peers == 0 {
            return Err(ConfigError::ZeroMaxPeers);
        }
        if !self.retransmit_ring_size.is_power_of_two() {
            return Err(ConfigError::RingSizeNotPowerOfTwo(self.retransmit_ring_size));
        }
        Ok(())
    }

    /// Parse configuration from a TOML document, validating before returning.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

mod salt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &[u8; 8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex_encode(salt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 8], D::Error> {
        let text = String::deserialize(d)?;
        hex_decode(&text).map_err(serde::de::Error::custom)
    }

    fn hex_encode(bytes: &[u8; 8]) -> String {
        let mut out = String::with_capacity(16);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    fn hex_decode(text: &str) -> Result<[u8; 8], String> {
        if text.len() != 16 {
            return Err(format!("expected 16 hex characters, got {}", text.len()));
        }
        let mut out = [0u8; 8];
        for (i, chunk) in out.iter_mut().enumerate() {
            *chunk = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid hex byte: {e}"))?;
        }
        Ok(out)
    }
}
