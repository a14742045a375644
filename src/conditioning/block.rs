//! Conditioned block type.

use super::ConditioningAlgorithm;
use zeroize::Zeroizing;

/// Fixed-size conditioned output.
///
/// A block is consumed exactly once. It is deliberately not `Clone`;
/// fan-out to independent pipelines goes through
/// [`duplicate`](Self::duplicate). Contents are wiped on drop.
pub struct ConditionedBlock {
    data: Zeroizing<Vec<u8>>,
    algorithm: ConditioningAlgorithm,
    /// Raw bytes that went into the block.
    input_bytes: usize,
    /// True when produced below the minimum input size.
    degraded: bool,
}

impl ConditionedBlock {
    pub(crate) fn new(
        data: Vec<u8>,
        algorithm: ConditioningAlgorithm,
        input_bytes: usize,
        degraded: bool,
    ) -> Self {
        Self {
            data: Zeroizing::new(data),
            algorithm,
            input_bytes,
            degraded,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn algorithm(&self) -> ConditioningAlgorithm {
        self.algorithm
    }

    pub fn input_bytes(&self) -> usize {
        self.input_bytes
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Copies the block for an independent pipeline.
    pub(crate) fn duplicate(&self) -> Self {
        Self::new(
            self.data.to_vec(),
            self.algorithm,
            self.input_bytes,
            self.degraded,
        )
    }

    /// Creates a block from arbitrary bytes, bypassing conditioning.
    #[cfg(test)]
    pub(crate) fn new_for_testing(data: Vec<u8>) -> Self {
        let input_bytes = data.len();
        Self::new(data, ConditioningAlgorithm::Sha256, input_bytes, false)
    }
}

impl std::fmt::Debug for ConditionedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionedBlock")
            .field("len", &self.data.len())
            .field("algorithm", &self.algorithm)
            .field("input_bytes", &self.input_bytes)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}
