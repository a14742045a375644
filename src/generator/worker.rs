//! The frame → block worker loop.

use super::backoff::Backoff;
use super::shutdown::ShutdownSignal;
use super::status::{GeneratorState, SourceStatus};
use super::{GeneratorConfig, GeneratorHandle};
use crate::analysis::SampleMonitor;
use crate::capture::{Frame, FrameSource, SourceError};
use crate::conditioning::{ConditionedBlock, Conditioner, EntropyPool};
use crate::extraction::{ExtractorConfig, FeatureExtractor};
use crate::queue::{EnqueueError, EntropyQueue};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Single producer of conditioned blocks.
///
/// Pulls frames, extracts and conditions them, and publishes each block
/// to every subscriber queue that has room. When none has room it waits
/// (backpressure) instead of dropping the block.
pub struct Generator<S> {
    source: S,
    extractor: FeatureExtractor,
    pool: EntropyPool,
    monitor: SampleMonitor,
    subscribers: Vec<Arc<EntropyQueue>>,
    config: GeneratorConfig,
    stride: u64,
    status: Arc<SourceStatus>,
    shutdown: ShutdownSignal,
}

enum Published {
    Delivered,
    Interrupted,
    NoSubscribers,
}

impl<S: FrameSource + 'static> Generator<S> {
    pub fn new(
        source: S,
        extraction: ExtractorConfig,
        conditioner: Conditioner,
        config: GeneratorConfig,
        subscribers: Vec<Arc<EntropyQueue>>,
    ) -> Self {
        let status = Arc::new(SourceStatus::new(source.describe()));
        let stride = u64::from(extraction.stride.max(1));
        Self {
            source,
            extractor: FeatureExtractor::new(extraction),
            pool: EntropyPool::new(conditioner, config.pool_max_bytes),
            monitor: SampleMonitor::new(config.thresholds.clone()),
            subscribers,
            config,
            stride,
            status,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Shares an existing shutdown signal (e.g. with the reseed timer).
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn status(&self) -> Arc<SourceStatus> {
        Arc::clone(&self.status)
    }

    /// Moves the generator onto its own thread.
    pub fn spawn(self) -> io::Result<GeneratorHandle> {
        let status = self.status();
        let shutdown = self.shutdown.clone();
        let thread = thread::Builder::new()
            .name("aleamaris-generator".to_string())
            .spawn(move || self.run())?;
        Ok(GeneratorHandle::new(thread, shutdown, status))
    }

    /// Runs until shutdown, terminal source failure, or every subscriber
    /// closing. Subscriber queues are closed on exit; blocks already in
    /// them stay available.
    pub fn run(mut self) {
        info!(source = %self.source.describe(), stride = self.stride, "generator started");
        self.status.set_state(GeneratorState::Running);

        let mut backoff = Backoff::new(self.config.backoff);
        let mut index: u64 = 0;
        let mut frames_since_rewind: u64 = 0;
        let mut final_state = GeneratorState::Stopped;

        while !self.shutdown.is_triggered() {
            match self.source.next_frame() {
                Ok(frame) => {
                    if backoff.failures() > 0 {
                        info!(after_failures = backoff.failures(), "frame source recovered");
                        self.status.set_state(GeneratorState::Running);
                    }
                    backoff.succeed();
                    self.status.frame_seen();
                    frames_since_rewind += 1;

                    index += 1;
                    if (index - 1) % self.stride != 0 {
                        continue;
                    }
                    match self.process(frame) {
                        Published::Delivered => {}
                        Published::Interrupted => break,
                        Published::NoSubscribers => {
                            warn!("every subscriber queue closed, stopping generator");
                            break;
                        }
                    }
                }
                Err(SourceError::Exhausted) => {
                    if !(self.config.rewind_on_exhausted && self.source.rewind()) {
                        error!("frame source exhausted and cannot rewind");
                        self.status.source_failed("source exhausted");
                        final_state = GeneratorState::Failed;
                        break;
                    }
                    self.extractor.reset();
                    if frames_since_rewind > 0 {
                        info!(frames = frames_since_rewind, "frame source exhausted, rewound");
                        frames_since_rewind = 0;
                        continue;
                    }
                    // A pass without a single complete frame counts as a failure.
                    if !self.retry_after_failure(&mut backoff, "source holds no complete frame") {
                        final_state = GeneratorState::Failed;
                        break;
                    }
                }
                Err(SourceError::Unavailable(reason)) => {
                    if !self.retry_after_failure(&mut backoff, &reason) {
                        final_state = GeneratorState::Failed;
                        break;
                    }
                }
            }
        }

        // The in-flight batch is discarded, never conditioned below the floor.
        self.pool.clear();
        self.source.release();
        for queue in &self.subscribers {
            queue.close();
        }
        self.status.set_state(final_state);
        info!(state = ?final_state, blocks = self.status.blocks(), "generator stopped");
    }

    /// Records a source failure and sleeps out the backoff delay. Returns
    /// false once the failure budget is spent; shutdown during the sleep
    /// returns true and lets the main loop exit.
    fn retry_after_failure(&self, backoff: &mut Backoff, reason: &str) -> bool {
        self.status.source_failed(reason);
        match backoff.fail() {
            Some(delay) => {
                warn!(
                    reason = %reason,
                    attempt = backoff.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "frame source unavailable, retrying"
                );
                self.status.set_state(GeneratorState::Retrying);
                self.shutdown.wait(delay);
                true
            }
            None => {
                error!(
                    reason = %reason,
                    failures = backoff.failures(),
                    "frame source failed permanently"
                );
                false
            }
        }
    }

    fn process(&mut self, frame: Frame) -> Published {
        let sample = match self.extractor.extract(&frame) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "frame rejected");
                self.status.frame_rejected();
                return Published::Delivered;
            }
        };

        self.monitor.observe(&sample);
        let state = self.monitor.state();
        self.status.set_degraded(!state.is_healthy && state.violations > 0);

        self.pool.add(sample);
        match self.pool.try_flush() {
            Some(block) => self.publish(block),
            None => Published::Delivered,
        }
    }

    fn publish(&self, block: ConditionedBlock) -> Published {
        let mut pending = None;
        let mut delivered = false;

        for queue in &self.subscribers {
            match queue.enqueue(block.duplicate(), Duration::ZERO) {
                Ok(sequence) => {
                    debug!(sequence, "block published");
                    delivered = true;
                }
                Err(EnqueueError::Full(copy)) => {
                    pending.get_or_insert(copy);
                }
                Err(EnqueueError::Closed(_)) => {}
            }
        }
        if delivered {
            self.status.block_published();
            return Published::Delivered;
        }

        let Some(mut pending) = pending else {
            return Published::NoSubscribers;
        };
        let retry = self.config.publish_retry();
        debug!("all subscribers full, waiting");
        loop {
            let mut open = false;
            for queue in &self.subscribers {
                if self.shutdown.is_triggered() {
                    return Published::Interrupted;
                }
                match queue.enqueue(pending, retry) {
                    Ok(_) => {
                        self.status.block_published();
                        return Published::Delivered;
                    }
                    Err(EnqueueError::Full(copy)) => {
                        open = true;
                        pending = copy;
                    }
                    Err(EnqueueError::Closed(copy)) => pending = copy,
                }
            }
            if !open {
                return Published::NoSubscribers;
            }
        }
    }
}
