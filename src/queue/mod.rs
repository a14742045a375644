//! Bounded FIFO of conditioned blocks.
//!
//! The queue decouples the single generator thread from any number of
//! consumers. Producers either wait for space or evict the oldest entry,
//! depending on [`OverflowPolicy`]. Consumers wait up to a caller-supplied
//! timeout and never receive stale or fabricated data.

use crate::conditioning::ConditionedBlock;
use crate::secret::extend_wiped;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use zeroize::Zeroizing;

/// Consumer-visible queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("timed out after {waited:?} waiting for entropy")]
    Timeout { waited: Duration },
    #[error("entropy queue closed")]
    Closed,
}

/// A rejected enqueue. The block is handed back so it is never lost.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("entropy queue full")]
    Full(ConditionedBlock),
    #[error("entropy queue closed")]
    Closed(ConditionedBlock),
}

impl EnqueueError {
    pub fn into_block(self) -> ConditionedBlock {
        match self {
            Self::Full(block) | Self::Closed(block) => block,
        }
    }
}

/// What a producer does when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for a consumer to make room (backpressure).
    #[default]
    Block,
    /// Evict the oldest entry.
    DropOldest,
}

/// Queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity in blocks.
    pub capacity: usize,
    pub policy: OverflowPolicy,
    /// Default consumer wait in milliseconds.
    pub dequeue_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            policy: OverflowPolicy::Block,
            dequeue_timeout_ms: 2_000,
        }
    }
}

impl QueueConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

/// An enqueued block with its position in the stream.
#[derive(Debug)]
pub struct QueueEntry {
    sequence: u64,
    block: ConditionedBlock,
}

impl QueueEntry {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn block(&self) -> &ConditionedBlock {
        &self.block
    }

    pub fn into_block(self) -> ConditionedBlock {
        self.block
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub available_bytes: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
}

struct QueueInner {
    entries: VecDeque<QueueEntry>,
    available_bytes: usize,
    next_sequence: u64,
    closed: bool,
    enqueued: u64,
    dequeued: u64,
    dropped: u64,
}

impl QueueInner {
    fn pop(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        self.available_bytes -= entry.block.len();
        self.dequeued += 1;
        Some(entry)
    }
}

/// Bounded, thread-safe, multi-consumer FIFO of conditioned blocks.
pub struct EntropyQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl EntropyQueue {
    /// Creates a queue holding at most `capacity` blocks (at least one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::with_capacity(capacity),
                available_bytes: 0,
                next_sequence: 0,
                closed: false,
                enqueued: 0,
                dequeued: 0,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.capacity, config.policy)
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // Entries are only mutated through complete push/pop steps, so a
        // poisoned guard still holds a consistent queue.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a block, returning its sequence number.
    ///
    /// With [`OverflowPolicy::Block`] a full queue makes the caller wait up
    /// to `timeout`; on expiry the block is returned in
    /// [`EnqueueError::Full`]. With [`OverflowPolicy::DropOldest`] the call
    /// never waits.
    pub fn enqueue(&self, block: ConditionedBlock, timeout: Duration) -> Result<u64, EnqueueError> {
        let deadline = deadline_after(timeout);
        let mut guard = self.lock();

        loop {
            if guard.closed {
                return Err(EnqueueError::Closed(block));
            }
            if guard.entries.len() < self.capacity {
                break;
            }
            match self.policy {
                OverflowPolicy::DropOldest => {
                    if let Some(evicted) = guard.entries.pop_front() {
                        guard.available_bytes -= evicted.block.len();
                        guard.dropped += 1;
                        tracing::debug!(sequence = evicted.sequence, "Evicted oldest block");
                    }
                }
                OverflowPolicy::Block => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(EnqueueError::Full(block));
                    }
                    guard = self
                        .not_full
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }

        let sequence = guard.next_sequence;
        guard.next_sequence += 1;
        guard.enqueued += 1;
        guard.available_bytes += block.len();
        guard.entries.push_back(QueueEntry { sequence, block });
        drop(guard);

        self.not_empty.notify_all();
        Ok(sequence)
    }

    /// Removes the oldest entry, waiting up to `timeout`.
    ///
    /// A zero timeout on an empty queue fails immediately with
    /// [`QueueError::Timeout`]. A closed queue still hands out the entries
    /// it holds before reporting [`QueueError::Closed`].
    pub fn dequeue(&self, timeout: Duration) -> Result<QueueEntry, QueueError> {
        let started = Instant::now();
        let deadline = deadline_after(timeout);
        let mut guard = self.lock();

        loop {
            if let Some(entry) = guard.pop() {
                drop(guard);
                self.not_full.notify_one();
                return Ok(entry);
            }
            if guard.closed {
                return Err(QueueError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Timeout {
                    waited: started.elapsed(),
                });
            }
            guard = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Drains `count` bytes from whole blocks, waiting up to `timeout`.
    ///
    /// Blocks are consumed whole; unused trailing bytes of the last block
    /// are wiped, never handed to another consumer. When the request fits
    /// in the queue the bytes are taken in one step, so a timeout consumes
    /// nothing. Larger requests drain incrementally and lose what they took
    /// if they time out.
    pub fn pull_bytes(&self, count: usize, timeout: Duration) -> Result<Vec<u8>, QueueError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let deadline = deadline_after(timeout);
        let mut guard = self.lock();
        // Sized by what is queued, not by the request.
        let mut out = Zeroizing::new(Vec::with_capacity(count.min(guard.available_bytes)));

        loop {
            let need = count - out.len();
            if guard.available_bytes >= need || guard.entries.len() >= self.capacity {
                let mut taken = 0;
                while out.len() < count {
                    let Some(entry) = guard.pop() else { break };
                    let bytes = entry.block.as_bytes();
                    let take = bytes.len().min(count - out.len());
                    extend_wiped(&mut out, &bytes[..take]);
                    taken += 1;
                }
                if taken > 0 {
                    self.not_full.notify_all();
                }
                if out.len() == count {
                    return Ok(std::mem::take(&mut *out));
                }
            }
            if guard.closed {
                return Err(QueueError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Timeout {
                    waited: started.elapsed(),
                });
            }
            guard = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Stops accepting blocks and wakes every waiter.
    ///
    /// Entries already queued remain available to consumers.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        tracing::debug!("Entropy queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued blocks.
    pub fn depth(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn available_bytes(&self) -> usize {
        self.lock().available_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn is_full(&self) -> bool {
        self.lock().entries.len() >= self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        let guard = self.lock();
        QueueStats {
            depth: guard.entries.len(),
            available_bytes: guard.available_bytes,
            enqueued: guard.enqueued,
            dequeued: guard.dequeued,
            dropped: guard.dropped,
        }
    }
}

impl std::fmt::Debug for EntropyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntropyQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// `now + timeout`, saturating far in the future.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn block(tag: u8) -> ConditionedBlock {
        ConditionedBlock::new_for_testing(vec![tag; 32])
    }

    const NO_WAIT: Duration = Duration::ZERO;

    #[test]
    fn test_fifo_order() {
        let queue = EntropyQueue::new(8, OverflowPolicy::Block);
        for tag in 0..5 {
            queue.enqueue(block(tag), NO_WAIT).unwrap();
        }
        for tag in 0..5 {
            let entry = queue.dequeue(NO_WAIT).unwrap();
            assert_eq!(entry.sequence(), tag as u64);
            assert_eq!(entry.block().as_bytes()[0], tag);
        }
    }

    #[test]
    fn test_empty_dequeue_zero_timeout_fails_immediately() {
        let queue = EntropyQueue::new(4, OverflowPolicy::Block);
        let started = Instant::now();
        assert!(matches!(
            queue.dequeue(NO_WAIT),
            Err(QueueError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_full_queue_rejects_with_block_returned() {
        let queue = EntropyQueue::new(1, OverflowPolicy::Block);
        queue.enqueue(block(1), NO_WAIT).unwrap();
        assert!(queue.is_full());

        let err = queue.enqueue(block(2), Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, EnqueueError::Full(_)));
        assert_eq!(err.into_block().as_bytes()[0], 2);
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_drop_oldest_evicts() {
        let queue = EntropyQueue::new(2, OverflowPolicy::DropOldest);
        for tag in 0..4 {
            queue.enqueue(block(tag), NO_WAIT).unwrap();
        }
        assert_eq!(queue.stats().dropped, 2);
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().block().as_bytes()[0], 2);
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().block().as_bytes()[0], 3);
    }

    #[test]
    fn test_blocked_producer_resumes_when_consumer_pulls() {
        let queue = Arc::new(EntropyQueue::new(1, OverflowPolicy::Block));
        queue.enqueue(block(1), NO_WAIT).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(block(2), Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().sequence(), 0);
        assert_eq!(producer.join().unwrap().unwrap(), 1);
        assert_eq!(queue.dequeue(Duration::from_secs(1)).unwrap().sequence(), 1);
    }

    #[test]
    fn test_consumer_wakes_on_enqueue() {
        let queue = Arc::new(EntropyQueue::new(4, OverflowPolicy::Block));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.enqueue(block(9), NO_WAIT).unwrap();
        assert_eq!(consumer.join().unwrap().unwrap().block().as_bytes()[0], 9);
    }

    #[test]
    fn test_pull_bytes_spans_blocks_and_discards_remainder() {
        let queue = EntropyQueue::new(8, OverflowPolicy::Block);
        queue.enqueue(block(1), NO_WAIT).unwrap();
        queue.enqueue(block(2), NO_WAIT).unwrap();
        queue.enqueue(block(3), NO_WAIT).unwrap();

        let bytes = queue.pull_bytes(40, NO_WAIT).unwrap();
        assert_eq!(bytes.len(), 40);
        assert!(bytes[..32].iter().all(|&b| b == 1));
        assert!(bytes[32..].iter().all(|&b| b == 2));

        // The rest of block 2 is gone; block 3 is next.
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().block().as_bytes()[0], 3);
    }

    #[test]
    fn test_pull_bytes_timeout_consumes_nothing() {
        let queue = EntropyQueue::new(8, OverflowPolicy::Block);
        queue.enqueue(block(1), NO_WAIT).unwrap();

        assert!(matches!(
            queue.pull_bytes(64, Duration::from_millis(10)),
            Err(QueueError::Timeout { .. })
        ));
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_huge_pull_request_does_not_preallocate() {
        let queue = EntropyQueue::new(8, OverflowPolicy::Block);
        queue.enqueue(block(1), NO_WAIT).unwrap();

        assert!(matches!(
            queue.pull_bytes(usize::MAX, NO_WAIT),
            Err(QueueError::Timeout { .. })
        ));
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_pull_bytes_larger_than_queue_drains_in_steps() {
        let queue = Arc::new(EntropyQueue::new(2, OverflowPolicy::Block));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for tag in 0..6 {
                    queue.enqueue(block(tag), Duration::from_secs(5)).unwrap();
                }
            })
        };

        let bytes = queue.pull_bytes(6 * 32, Duration::from_secs(5)).unwrap();
        producer.join().unwrap();

        assert_eq!(bytes.len(), 6 * 32);
        for (i, chunk) in bytes.chunks(32).enumerate() {
            assert!(chunk.iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_close_keeps_queued_entries() {
        let queue = EntropyQueue::new(4, OverflowPolicy::Block);
        queue.enqueue(block(1), NO_WAIT).unwrap();
        queue.close();

        assert!(matches!(
            queue.enqueue(block(2), NO_WAIT),
            Err(EnqueueError::Closed(_))
        ));
        assert!(queue.dequeue(NO_WAIT).is_ok());
        assert_eq!(queue.dequeue(NO_WAIT).unwrap_err(), QueueError::Closed);
    }

    #[test]
    fn test_concurrent_consumers_see_each_block_once() {
        let queue = Arc::new(EntropyQueue::new(64, OverflowPolicy::Block));
        for tag in 0..64u8 {
            queue.enqueue(block(tag), NO_WAIT).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Ok(entry) = queue.dequeue(Duration::from_millis(10)) {
                        seen.push(entry.sequence());
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..64).collect::<Vec<_>>());
    }
}
