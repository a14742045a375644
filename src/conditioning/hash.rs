//! Cryptographic hash-based entropy conditioning.
//!
//! Uses standard one-way functions to turn biased, correlated raw
//! samples into fixed-size blocks that are statistically close to
//! uniform.

use super::block::ConditionedBlock;
use super::ConditioningError;
use crate::extraction::RawSample;
use blake3::Hasher as Blake3Hasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use std::fmt;
use std::str::FromStr;

/// Smallest supported block size in bytes.
pub const MIN_BLOCK_SIZE: usize = 16;
/// Largest supported block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 64;

/// Supported extraction functions.
///
/// The set is closed on purpose: adding a primitive is a reviewed change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditioningAlgorithm {
    /// SHA-256. Blocks longer than the digest are expanded in counter mode.
    #[default]
    Sha256,
    /// SHAKE256 extendable output.
    Shake256,
    /// BLAKE3 extendable output.
    Blake3,
}

impl ConditioningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Shake256 => "shake256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for ConditioningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditioningAlgorithm {
    type Err = ConditioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "shake256" => Ok(Self::Shake256),
            "blake3" => Ok(Self::Blake3),
            other => Err(ConditioningError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Streaming state for one block derivation.
enum Extraction {
    Sha256(Sha256),
    Shake256(Shake256),
    Blake3(Box<Blake3Hasher>),
}

impl Extraction {
    fn start(algorithm: ConditioningAlgorithm) -> Self {
        match algorithm {
            ConditioningAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ConditioningAlgorithm::Shake256 => Self::Shake256(Shake256::default()),
            ConditioningAlgorithm::Blake3 => Self::Blake3(Box::new(Blake3Hasher::new())),
        }
    }

    fn absorb(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => Digest::update(h, data),
            Self::Shake256(h) => Update::update(h, data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn squeeze(self, out: &mut [u8]) {
        match self {
            Self::Sha256(h) => {
                let digest = h.finalize();
                // Counter-mode expansion keeps every algorithm on the same
                // block size contract.
                for (i, chunk) in out.chunks_mut(32).enumerate() {
                    if i == 0 {
                        chunk.copy_from_slice(&digest[..chunk.len()]);
                    } else {
                        let mut next = Sha256::new();
                        Digest::update(&mut next, digest.as_slice());
                        Digest::update(&mut next, (i as u32).to_be_bytes());
                        let expanded = next.finalize();
                        chunk.copy_from_slice(&expanded[..chunk.len()]);
                    }
                }
            }
            Self::Shake256(h) => h.finalize_xof().read(out),
            Self::Blake3(h) => h.finalize_xof().fill(out),
        }
    }
}

/// Conditioner parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub algorithm: ConditioningAlgorithm,
    /// Output block size in bytes.
    pub block_size: usize,
    /// Minimum raw input per block (min-entropy floor).
    pub min_input_bytes: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            algorithm: ConditioningAlgorithm::Sha256,
            block_size: 32,
            min_input_bytes: 64,
        }
    }
}

impl ConditionerConfig {
    pub fn validate(&self) -> Result<(), ConditioningError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConditioningError::InvalidBlockSize(self.block_size));
        }
        if self.min_input_bytes < self.block_size {
            return Err(ConditioningError::MinimumBelowBlockSize {
                min_input: self.min_input_bytes,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

/// Entropy conditioner.
///
/// Maps a batch of raw samples to one block of the configured size. The
/// output size never depends on the input size or on the algorithm.
#[derive(Debug, Clone)]
pub struct Conditioner {
    config: ConditionerConfig,
}

impl Conditioner {
    /// Creates a conditioner, rejecting invalid size parameters.
    pub fn new(config: ConditionerConfig) -> Result<Self, ConditioningError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    pub fn algorithm(&self) -> ConditioningAlgorithm {
        self.config.algorithm
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Conditions a batch of raw samples into one block.
    ///
    /// Fails with [`ConditioningError::InsufficientEntropyInput`] when the
    /// batch holds fewer than `min_input_bytes` bytes.
    pub fn condition(&self, batch: &[RawSample]) -> Result<ConditionedBlock, ConditioningError> {
        let total: usize = batch.iter().map(RawSample::len).sum();
        self.check_floor(total)?;
        Ok(self.derive(batch.iter().map(RawSample::data), total, false))
    }

    /// Conditions an already accumulated byte buffer.
    pub fn condition_bytes(&self, input: &[u8]) -> Result<ConditionedBlock, ConditioningError> {
        self.check_floor(input.len())?;
        Ok(self.derive(std::iter::once(input), input.len(), false))
    }

    /// Conditions input below the floor. The block is marked degraded.
    ///
    /// Only for callers that explicitly accept reduced assurance.
    pub fn condition_degraded(&self, input: &[u8]) -> Result<ConditionedBlock, ConditioningError> {
        if input.is_empty() {
            return Err(ConditioningError::InsufficientEntropyInput {
                got: 0,
                need: self.config.min_input_bytes,
            });
        }
        tracing::warn!(
            input_bytes = input.len(),
            min_input_bytes = self.config.min_input_bytes,
            "Conditioning below the minimum input size"
        );
        Ok(self.derive(std::iter::once(input), input.len(), input.len() < self.config.min_input_bytes))
    }

    fn check_floor(&self, total: usize) -> Result<(), ConditioningError> {
        if total < self.config.min_input_bytes {
            return Err(ConditioningError::InsufficientEntropyInput {
                got: total,
                need: self.config.min_input_bytes,
            });
        }
        Ok(())
    }

    fn derive<'a>(
        &self,
        parts: impl Iterator<Item = &'a [u8]>,
        input_bytes: usize,
        degraded: bool,
    ) -> ConditionedBlock {
        let mut extraction = Extraction::start(self.config.algorithm);
        for part in parts {
            extraction.absorb(part);
        }
        let mut data = vec![0u8; self.config.block_size];
        extraction.squeeze(&mut data);
        ConditionedBlock::new(data, self.config.algorithm, input_bytes, degraded)
    }
}

impl Default for Conditioner {
    fn default() -> Self {
        Self {
            config: ConditionerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [ConditioningAlgorithm; 3] = [
        ConditioningAlgorithm::Sha256,
        ConditioningAlgorithm::Shake256,
        ConditioningAlgorithm::Blake3,
    ];

    fn conditioner(algorithm: ConditioningAlgorithm, block_size: usize) -> Conditioner {
        Conditioner::new(ConditionerConfig {
            algorithm,
            block_size,
            min_input_bytes: 64,
        })
        .unwrap()
    }

    #[test]
    fn test_below_minimum_rejected_for_all_algorithms() {
        for algorithm in ALL {
            let c = conditioner(algorithm, 32);
            let batch = vec![RawSample::from_bytes(vec![1u8; 63], 1)];
            assert!(matches!(
                c.condition(&batch),
                Err(ConditioningError::InsufficientEntropyInput { got: 63, need: 64 })
            ));
        }
    }

    #[test]
    fn test_sha256_matches_plain_digest() {
        let c = conditioner(ConditioningAlgorithm::Sha256, 32);
        let input = vec![0x42u8; 1000];
        let block = c.condition_bytes(&input).unwrap();
        assert_eq!(block.as_bytes(), Sha256::digest(&input).as_slice());
    }

    #[test]
    fn test_batch_equals_concatenation() {
        let c = conditioner(ConditioningAlgorithm::Blake3, 32);
        let batch = vec![
            RawSample::from_bytes(vec![1u8; 40], 1),
            RawSample::from_bytes(vec![2u8; 40], 2),
        ];
        let mut joined = vec![1u8; 40];
        joined.extend_from_slice(&[2u8; 40]);

        let a = c.condition(&batch).unwrap();
        let b = c.condition_bytes(&joined).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.input_bytes(), 80);
    }

    #[test]
    fn test_block_size_same_across_algorithms() {
        for size in [16, 32, 48, 64] {
            for algorithm in ALL {
                let block = conditioner(algorithm, size)
                    .condition_bytes(&[7u8; 128])
                    .unwrap();
                assert_eq!(block.len(), size, "{algorithm} at {size}");
            }
        }
    }

    #[test]
    fn test_algorithms_disagree() {
        let input = [9u8; 100];
        let sha = conditioner(ConditioningAlgorithm::Sha256, 32).condition_bytes(&input).unwrap();
        let shake = conditioner(ConditioningAlgorithm::Shake256, 32).condition_bytes(&input).unwrap();
        let b3 = conditioner(ConditioningAlgorithm::Blake3, 32).condition_bytes(&input).unwrap();
        assert_ne!(sha.as_bytes(), shake.as_bytes());
        assert_ne!(shake.as_bytes(), b3.as_bytes());
    }

    #[test]
    fn test_sha256_expansion_extends_digest() {
        let input = [3u8; 100];
        let short = conditioner(ConditioningAlgorithm::Sha256, 32).condition_bytes(&input).unwrap();
        let long = conditioner(ConditioningAlgorithm::Sha256, 64).condition_bytes(&input).unwrap();
        assert_eq!(&long.as_bytes()[..32], short.as_bytes());
        assert_ne!(&long.as_bytes()[32..], short.as_bytes());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let too_big = ConditionerConfig {
            block_size: 65,
            min_input_bytes: 128,
            ..Default::default()
        };
        assert!(matches!(
            Conditioner::new(too_big),
            Err(ConditioningError::InvalidBlockSize(65))
        ));

        let floor_too_low = ConditionerConfig {
            block_size: 32,
            min_input_bytes: 16,
            ..Default::default()
        };
        assert!(Conditioner::new(floor_too_low).is_err());
    }

    #[test]
    fn test_degraded_flush_is_marked() {
        let c = conditioner(ConditioningAlgorithm::Sha256, 32);
        let block = c.condition_degraded(&[1u8; 10]).unwrap();
        assert!(block.is_degraded());
        assert_eq!(block.len(), 32);
        assert!(c.condition_degraded(&[]).is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("SHAKE256".parse::<ConditioningAlgorithm>().unwrap(), ConditioningAlgorithm::Shake256);
        assert_eq!("sha-256".parse::<ConditioningAlgorithm>().unwrap(), ConditioningAlgorithm::Sha256);
        assert!("md5".parse::<ConditioningAlgorithm>().is_err());
    }

    proptest! {
        #[test]
        fn prop_block_size_is_fixed(
            len in 64usize..2048,
            byte in any::<u8>(),
            size in MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE,
            which in 0usize..3,
        ) {
            let c = Conditioner::new(ConditionerConfig {
                algorithm: ALL[which],
                block_size: size,
                min_input_bytes: 64.max(size),
            }).unwrap();
            let input = vec![byte; len.max(size)];
            let block = c.condition_bytes(&input).unwrap();
            prop_assert_eq!(block.len(), size);
        }
    }
}
