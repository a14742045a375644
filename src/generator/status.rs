//! Generator status shared with the health interface.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum GeneratorState {
    Starting = 0,
    Running = 1,
    /// Source unavailable, backing off before the next attempt.
    Retrying = 2,
    /// Terminal. The source failed too often or ran out for good.
    Failed = 3,
    /// Terminal. Shut down on request.
    Stopped = 4,
}

impl GeneratorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Retrying,
            3 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

/// Live counters, updated by the worker and read by anyone.
#[derive(Debug)]
pub struct SourceStatus {
    description: String,
    state: AtomicU8,
    frames: AtomicU64,
    blocks: AtomicU64,
    failures: AtomicU64,
    rejected_frames: AtomicU64,
    degraded: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Serializable copy of [`SourceStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub description: String,
    pub state: GeneratorState,
    pub frames: u64,
    pub blocks: u64,
    pub failures: u64,
    pub rejected_frames: u64,
    /// Raw samples currently fail the quality thresholds.
    pub degraded: bool,
    pub last_error: Option<String>,
}

impl SourceStatus {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            state: AtomicU8::new(GeneratorState::Starting as u8),
            frames: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejected_frames: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> GeneratorState {
        GeneratorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: GeneratorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub(crate) fn frame_seen(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn block_published(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_rejected(&self) {
        self.rejected_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn source_failed(&self, reason: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }

    pub(crate) fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Relaxed);
    }

    pub fn report(&self) -> SourceReport {
        SourceReport {
            description: self.description.clone(),
            state: self.state(),
            frames: self.frames.load(Ordering::Relaxed),
            blocks: self.blocks(),
            failures: self.failures.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
