//! Background frame → block pipeline.
//!
//! A [`Generator`] owns the frame source, the feature extractor and the
//! entropy pool, and runs on a dedicated thread. It is the only writer of
//! fresh entropy; consumers see its output through [`EntropyQueue`]s.
//!
//! [`EntropyQueue`]: crate::queue::EntropyQueue

mod backoff;
mod shutdown;
mod status;
mod worker;

pub use backoff::{Backoff, BackoffConfig};
pub use shutdown::ShutdownSignal;
pub use status::{GeneratorState, SourceReport, SourceStatus};
pub use worker::Generator;

use crate::analysis::QualityThresholds;
use crate::conditioning::DEFAULT_MAX_POOL_BYTES;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Restart finite sources (recorded video) at end of input.
    pub rewind_on_exhausted: bool,
    /// Wait slice while every subscriber is full.
    pub publish_retry_ms: u64,
    /// Cap on raw bytes buffered ahead of conditioning.
    pub pool_max_bytes: usize,
    pub backoff: BackoffConfig,
    pub thresholds: QualityThresholds,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rewind_on_exhausted: true,
            publish_retry_ms: 50,
            pool_max_bytes: DEFAULT_MAX_POOL_BYTES,
            backoff: BackoffConfig::default(),
            thresholds: QualityThresholds::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn publish_retry(&self) -> Duration {
        Duration::from_millis(self.publish_retry_ms.max(1))
    }
}

/// Owner's handle on a running generator thread.
///
/// Dropping the handle stops the generator and waits for it.
pub struct GeneratorHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: ShutdownSignal,
    status: Arc<SourceStatus>,
}

impl GeneratorHandle {
    pub(crate) fn new(
        thread: JoinHandle<()>,
        shutdown: ShutdownSignal,
        status: Arc<SourceStatus>,
    ) -> Self {
        Self {
            thread: Some(thread),
            shutdown,
            status,
        }
    }

    pub fn status(&self) -> &Arc<SourceStatus> {
        &self.status
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Requests shutdown and waits for the worker to exit.
    pub fn stop(&mut self) {
        self.shutdown.trigger();
        self.join();
    }

    /// Waits for the worker to exit on its own.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("generator thread panicked");
                self.status.set_state(GeneratorState::Failed);
            }
        }
    }
}

impl Drop for GeneratorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
