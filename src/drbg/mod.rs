//! Deterministic random bit generators.
//!
//! Two closed variants share one state machine in [`DrbgEngine`]:
//! a ChaCha20 stream-cipher generator and an HMAC_DRBG-style keyed-hash
//! generator built on BLAKE3.

mod chacha;
mod engine;
mod keyed;
mod material;

pub use engine::{DrbgEngine, DrbgSnapshot, DrbgStatus};
pub use material::{SeedMaterial, SeedOrigin};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest accepted reseed input in bytes.
pub const MIN_RESEED_LEN: usize = 32;

/// Default per-seed output limit (16 MiB).
pub const DEFAULT_MAX_BYTES_PER_SEED: u64 = 16 * 1024 * 1024;

/// DRBG errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DrbgError {
    #[error("DRBG has not been seeded")]
    Unseeded,

    #[error("insufficient seed material: got {got} bytes, need at least {need}")]
    InsufficientSeedMaterial { got: usize, need: usize },

    #[error("reseed required: {generated} bytes generated since last reseed, limit {limit}")]
    ReseedRequired { generated: u64, limit: u64 },

    #[error("DRBG engine faulted: {0}")]
    EngineFaulted(String),

    #[error("unknown DRBG algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Supported generator constructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrbgAlgorithm {
    #[default]
    #[serde(rename = "chacha20")]
    ChaCha20,
    #[serde(rename = "keyed-hash")]
    KeyedHash,
}

impl DrbgAlgorithm {
    /// Minimum seed length for instantiation.
    pub fn seed_len(&self) -> usize {
        match self {
            Self::ChaCha20 => chacha::SEED_LEN,
            Self::KeyedHash => keyed::SEED_LEN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChaCha20 => "chacha20",
            Self::KeyedHash => "keyed-hash",
        }
    }
}

impl fmt::Display for DrbgAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrbgAlgorithm {
    type Err = DrbgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chacha20" | "chacha" => Ok(Self::ChaCha20),
            "keyed-hash" | "keyed_hash" | "hmac" => Ok(Self::KeyedHash),
            other => Err(DrbgError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrbgConfig {
    pub algorithm: DrbgAlgorithm,
    /// Output bytes allowed between reseeds before `generate` refuses.
    pub max_bytes_per_seed: u64,
}

impl Default for DrbgConfig {
    fn default() -> Self {
        Self {
            algorithm: DrbgAlgorithm::default(),
            max_bytes_per_seed: DEFAULT_MAX_BYTES_PER_SEED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("ChaCha20".parse::<DrbgAlgorithm>(), Ok(DrbgAlgorithm::ChaCha20));
        assert_eq!("keyed-hash".parse::<DrbgAlgorithm>(), Ok(DrbgAlgorithm::KeyedHash));
        assert!(matches!(
            "aes-ctr".parse::<DrbgAlgorithm>(),
            Err(DrbgError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_seed_lengths() {
        assert_eq!(DrbgAlgorithm::ChaCha20.seed_len(), 40);
        assert_eq!(DrbgAlgorithm::KeyedHash.seed_len(), 48);
    }
}
