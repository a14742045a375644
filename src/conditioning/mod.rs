//! Entropy conditioning via cryptographic hashing.
//!
//! This module whitens raw extracted samples into fixed-size
//! [`ConditionedBlock`]s. It relies on well-established one-way
//! functions to remove bias and correlation, and enforces a minimum raw
//! input per block.

mod block;
mod hash;
mod pool;

pub use block::ConditionedBlock;
pub use hash::{
    Conditioner, ConditionerConfig, ConditioningAlgorithm, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
};
pub use pool::{EntropyPool, DEFAULT_MAX_POOL_BYTES};

use thiserror::Error;

/// Conditioning errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditioningError {
    #[error("insufficient entropy input: got {got} bytes, need at least {need}")]
    InsufficientEntropyInput { got: usize, need: usize },
    #[error("block size {0} outside supported range 16..=64")]
    InvalidBlockSize(usize),
    #[error("minimum input {min_input} is smaller than the block size {block_size}")]
    MinimumBelowBlockSize { min_input: usize, block_size: usize },
    #[error("unknown conditioning algorithm: {0}")]
    UnknownAlgorithm(String),
}
