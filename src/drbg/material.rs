//! Seed material handed to a DRBG exactly once.

use crate::conditioning::ConditionedBlock;
use crate::secret::extend_wiped;
use std::fmt;
use zeroize::Zeroizing;

/// Where seed material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOrigin {
    /// Conditioned blocks from the frame pipeline.
    Stream,
    /// Operating-system entropy, used only under the insecure-fallback flag.
    OsFallback,
    /// Bytes supplied by an operator.
    External,
}

impl fmt::Display for SeedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stream => "stream",
            Self::OsFallback => "os-fallback",
            Self::External => "external",
        })
    }
}

/// Seed or reseed input.
///
/// Consumed by value by [`DrbgEngine::seed`](super::DrbgEngine::seed) and
/// [`DrbgEngine::reseed`](super::DrbgEngine::reseed); the bytes are wiped
/// when it is dropped, so no copy outlives the call.
pub struct SeedMaterial {
    bytes: Zeroizing<Vec<u8>>,
    origin: SeedOrigin,
}

impl SeedMaterial {
    pub fn new(bytes: Vec<u8>, origin: SeedOrigin) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            origin,
        }
    }

    /// Concatenates conditioned blocks. The blocks are consumed.
    pub fn from_blocks(blocks: Vec<ConditionedBlock>) -> Self {
        let total = blocks.iter().map(ConditionedBlock::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for block in &blocks {
            bytes.extend_from_slice(block.as_bytes());
        }
        Self::new(bytes, SeedOrigin::Stream)
    }

    /// Appends more material, keeping the weakest origin.
    pub fn extend(&mut self, other: SeedMaterial) {
        extend_wiped(&mut self.bytes, &other.bytes);
        if other.origin == SeedOrigin::OsFallback {
            self.origin = SeedOrigin::OsFallback;
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn origin(&self) -> SeedOrigin {
        self.origin
    }
}

impl fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedMaterial")
            .field("len", &self.bytes.len())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_blocks_concatenates() {
        let blocks = vec![
            ConditionedBlock::new_for_testing(vec![1; 32]),
            ConditionedBlock::new_for_testing(vec![2; 32]),
        ];
        let material = SeedMaterial::from_blocks(blocks);
        assert_eq!(material.len(), 64);
        assert_eq!(material.as_bytes()[31], 1);
        assert_eq!(material.as_bytes()[32], 2);
        assert_eq!(material.origin(), SeedOrigin::Stream);
    }

    #[test]
    fn test_extend_keeps_weakest_origin() {
        let mut material = SeedMaterial::new(vec![0; 16], SeedOrigin::Stream);
        material.extend(SeedMaterial::new(vec![1; 16], SeedOrigin::OsFallback));
        assert_eq!(material.len(), 32);
        assert_eq!(material.origin(), SeedOrigin::OsFallback);
    }

    #[test]
    fn test_debug_hides_bytes() {
        let material = SeedMaterial::new(vec![0xAB; 8], SeedOrigin::External);
        let shown = format!("{:?}", material);
        assert!(!shown.contains("171"));
        assert!(shown.contains("External"));
    }
}
