//! Raw sample accumulation.
//!
//! Collects raw samples until the conditioner's minimum input size is
//! reached, then turns the accumulated bytes into one block.

use super::hash::Conditioner;
use super::{ConditionedBlock, ConditioningError};
use crate::extraction::RawSample;
use crate::secret::extend_wiped;
use zeroize::{Zeroize, Zeroizing};

/// Default cap on buffered raw bytes.
pub const DEFAULT_MAX_POOL_BYTES: usize = 64 * 1024;

/// Accumulates raw samples before conditioning.
///
/// Every block is derived from at least the conditioner's
/// `min_input_bytes`. Raw bytes are wiped after each flush.
pub struct EntropyPool {
    buffer: Zeroizing<Vec<u8>>,
    max_bytes: usize,
    conditioner: Conditioner,
    /// Total raw bytes accepted (for metrics).
    total_bytes_added: u64,
    /// Raw bytes dropped because the pool was full.
    total_bytes_dropped: u64,
    /// Blocks produced.
    total_blocks: u64,
}

impl EntropyPool {
    /// Creates a pool around `conditioner`. `max_bytes` is raised to the
    /// conditioner floor if needed.
    pub fn new(conditioner: Conditioner, max_bytes: usize) -> Self {
        let max_bytes = max_bytes.max(conditioner.config().min_input_bytes);
        Self {
            buffer: Zeroizing::new(Vec::with_capacity(max_bytes.min(DEFAULT_MAX_POOL_BYTES))),
            max_bytes,
            conditioner,
            total_bytes_added: 0,
            total_bytes_dropped: 0,
            total_blocks: 0,
        }
    }

    /// Adds a raw sample, truncating at the pool cap.
    pub fn add(&mut self, sample: RawSample) {
        let space_remaining = self.max_bytes.saturating_sub(self.buffer.len());
        let bytes_to_add = sample.len().min(space_remaining);
        let mut bytes = sample.into_bytes();

        extend_wiped(&mut self.buffer, &bytes[..bytes_to_add]);
        self.total_bytes_added += bytes_to_add as u64;
        self.total_bytes_dropped += (bytes.len() - bytes_to_add) as u64;
        bytes.zeroize();

        tracing::trace!(
            bytes_added = bytes_to_add,
            pool_size = self.buffer.len(),
            "Added raw sample to pool"
        );
    }

    /// Returns true once the minimum input size is buffered.
    pub fn is_ready(&self) -> bool {
        self.buffer.len() >= self.conditioner.config().min_input_bytes
    }

    /// Conditions the buffered bytes into a block and clears the pool.
    ///
    /// A forced flush below the minimum fails with
    /// [`ConditioningError::InsufficientEntropyInput`] and keeps the
    /// buffered bytes for later.
    pub fn flush(&mut self) -> Result<ConditionedBlock, ConditioningError> {
        let block = self.conditioner.condition_bytes(&self.buffer)?;
        self.finish(&block);
        Ok(block)
    }

    /// Like [`flush`](Self::flush) but accepts input below the minimum.
    ///
    /// The resulting block is marked degraded.
    pub fn flush_degraded(&mut self) -> Result<ConditionedBlock, ConditioningError> {
        let block = self.conditioner.condition_degraded(&self.buffer)?;
        self.finish(&block);
        Ok(block)
    }

    /// Returns a block if the pool is ready, `None` otherwise.
    pub fn try_flush(&mut self) -> Option<ConditionedBlock> {
        if !self.is_ready() {
            return None;
        }
        self.flush().ok()
    }

    fn finish(&mut self, block: &ConditionedBlock) {
        self.buffer.zeroize();
        self.total_blocks += 1;
        tracing::debug!(
            block_number = self.total_blocks,
            input_bytes = block.input_bytes(),
            algorithm = %block.algorithm(),
            "Conditioned block"
        );
    }

    pub fn size_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn total_bytes_added(&self) -> u64 {
        self.total_bytes_added
    }

    pub fn total_bytes_dropped(&self) -> u64 {
        self.total_bytes_dropped
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn conditioner(&self) -> &Conditioner {
        &self.conditioner
    }

    /// Discards buffered bytes without conditioning them.
    pub fn clear(&mut self) {
        self.buffer.zeroize();
        tracing::debug!("Entropy pool cleared");
    }
}

impl Default for EntropyPool {
    fn default() -> Self {
        Self::new(Conditioner::default(), DEFAULT_MAX_POOL_BYTES)
    }
}

impl Drop for EntropyPool {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::{ConditionerConfig, ConditioningAlgorithm};

    fn pool(min_input_bytes: usize, max_bytes: usize) -> EntropyPool {
        let conditioner = Conditioner::new(ConditionerConfig {
            algorithm: ConditioningAlgorithm::Blake3,
            block_size: 32,
            min_input_bytes,
        })
        .unwrap();
        EntropyPool::new(conditioner, max_bytes)
    }

    #[test]
    fn test_pool_not_ready_initially() {
        assert!(!EntropyPool::default().is_ready());
    }

    #[test]
    fn test_forced_flush_below_minimum_fails_and_keeps_bytes() {
        let mut pool = pool(64, 1024);
        pool.add(RawSample::from_bytes(vec![1u8; 40], 1));

        assert!(matches!(
            pool.flush(),
            Err(ConditioningError::InsufficientEntropyInput { got: 40, need: 64 })
        ));
        assert_eq!(pool.size_bytes(), 40);

        pool.add(RawSample::from_bytes(vec![2u8; 40], 2));
        let block = pool.flush().unwrap();
        assert_eq!(block.len(), 32);
        assert_eq!(block.input_bytes(), 80);
        assert_eq!(pool.size_bytes(), 0);
        assert_eq!(pool.total_blocks(), 1);
    }

    #[test]
    fn test_try_flush_waits_for_minimum() {
        let mut pool = pool(64, 1024);
        pool.add(RawSample::from_bytes(vec![0u8; 63], 1));
        assert!(pool.try_flush().is_none());
        pool.add(RawSample::from_bytes(vec![0u8; 1], 2));
        assert!(pool.try_flush().is_some());
    }

    #[test]
    fn test_max_bytes_limit() {
        let mut pool = pool(32, 100);
        pool.add(RawSample::from_bytes(vec![0u8; 150], 1));

        assert_eq!(pool.size_bytes(), 100);
        assert_eq!(pool.total_bytes_dropped(), 50);
    }

    #[test]
    fn test_cap_never_below_floor() {
        let mut pool = pool(64, 10);
        pool.add(RawSample::from_bytes(vec![0u8; 64], 1));
        assert!(pool.is_ready());
    }

    #[test]
    fn test_degraded_flush() {
        let mut pool = pool(64, 1024);
        pool.add(RawSample::from_bytes(vec![5u8; 8], 1));
        let block = pool.flush_degraded().unwrap();
        assert!(block.is_degraded());
        assert_eq!(pool.size_bytes(), 0);
    }
}
