//! Unbiased draws on top of a byte source.
//!
//! [`RejectionSampler`] never reduces a draw modulo the range size: it
//! masks candidates to the smallest covering power of two and redraws any
//! candidate outside the range. Where the bytes come from is a closed
//! choice, [`DrawSource`]: a managed DRBG or the raw conditioned stream.

mod rejection;

pub use rejection::{RejectionSampler, ROULETTE_POCKETS};

use crate::drbg::{DrbgEngine, DrbgError};
use crate::feeder::{FeederError, ManagedDrbg};
use crate::queue::{EntropyQueue, QueueError};
use crate::secret::extend_wiped;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("invalid range: low {low} is greater than high {high}")]
    InvalidRange { low: i64, high: i64 },

    #[error("a die needs at least one side")]
    InvalidSides,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Drbg(#[from] DrbgError),

    #[error(transparent)]
    Feeder(#[from] FeederError),
}

/// Anything that can fill a buffer with uniform bytes.
pub trait ByteSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError>;
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
        (**self).fill(dest)
    }
}

impl ByteSource for DrbgEngine {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
        Ok(DrbgEngine::fill(self, dest)?)
    }
}

impl ByteSource for ManagedDrbg {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
        Ok(ManagedDrbg::fill(self, dest)?)
    }
}

/// Conditioned bytes straight from a queue.
///
/// Blocks are split into a private buffer so small draws do not waste a
/// whole block each; every byte is still handed out once.
pub struct RawStream {
    queue: Arc<EntropyQueue>,
    timeout: Duration,
    buffer: Mutex<Zeroizing<Vec<u8>>>,
}

impl RawStream {
    pub fn new(queue: Arc<EntropyQueue>, timeout: Duration) -> Self {
        Self {
            queue,
            timeout,
            buffer: Mutex::new(Zeroizing::new(Vec::new())),
        }
    }

    pub fn queue(&self) -> &Arc<EntropyQueue> {
        &self.queue
    }
}

impl ByteSource for RawStream {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        while buffer.len() < dest.len() {
            // Partial progress stays buffered if this times out.
            let entry = self.queue.dequeue(self.timeout)?;
            extend_wiped(&mut buffer, entry.block().as_bytes());
        }
        dest.copy_from_slice(&buffer[..dest.len()]);
        buffer.drain(..dest.len());
        Ok(())
    }
}

impl std::fmt::Debug for RawStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawStream")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Where draws come from.
#[derive(Debug)]
pub enum DrawSource {
    Drbg(ManagedDrbg),
    Raw(RawStream),
}

impl ByteSource for DrawSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
        match self {
            Self::Drbg(drbg) => ByteSource::fill(drbg, dest),
            Self::Raw(raw) => raw.fill(dest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::ConditionedBlock;
    use crate::queue::OverflowPolicy;

    #[test]
    fn test_raw_stream_uses_every_byte_once() {
        let queue = Arc::new(EntropyQueue::new(4, OverflowPolicy::Block));
        for tag in [1u8, 2] {
            queue
                .enqueue(
                    ConditionedBlock::new_for_testing((0..32).map(|i| tag * 100 + i).collect()),
                    Duration::ZERO,
                )
                .unwrap();
        }
        let stream = RawStream::new(queue, Duration::ZERO);

        let mut a = [0u8; 20];
        let mut b = [0u8; 20];
        stream.fill(&mut a).unwrap();
        stream.fill(&mut b).unwrap();
        assert_eq!(a[0], 100);
        assert_eq!(b[0], 120);
        assert_eq!(b[12], 200);

        let mut c = [0u8; 30];
        assert!(matches!(
            stream.fill(&mut c),
            Err(SamplerError::Queue(QueueError::Timeout { .. }))
        ));
    }
}
