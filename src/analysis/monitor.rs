//! Raw sample monitoring.
//!
//! Watches extractor output before conditioning. A frozen or saturated
//! source flips the monitor to degraded immediately; it recovers only
//! after a streak of good samples.

use super::{
    statistics::SampleStatistics,
    threshold::{QualityThresholds, ThresholdViolation},
};
use crate::extraction::RawSample;

/// Running view of raw sample quality.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub latest: Option<SampleStatistics>,
    /// False until the first healthy streak completes.
    pub is_healthy: bool,
    pub last_violation: Option<ThresholdViolation>,
    pub healthy_streak: u64,
    pub unhealthy_streak: u64,
    pub samples_seen: u64,
    pub violations: u64,
}

pub struct SampleMonitor {
    thresholds: QualityThresholds,
    state: MonitorState,
    recovery_streak: u64,
}

impl SampleMonitor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self::with_recovery_streak(thresholds, 3)
    }

    pub fn with_recovery_streak(thresholds: QualityThresholds, streak: u64) -> Self {
        Self {
            thresholds,
            state: MonitorState::default(),
            recovery_streak: streak.max(1),
        }
    }

    /// Scores one sample and returns the violation, if any.
    pub fn observe(&mut self, sample: &RawSample) -> Option<ThresholdViolation> {
        let stats = SampleStatistics::analyze(sample);
        let state = &mut self.state;
        state.samples_seen += 1;
        state.latest = Some(stats);

        match self.thresholds.check(&stats) {
            Ok(()) => {
                state.healthy_streak += 1;
                state.unhealthy_streak = 0;
                if !state.is_healthy && state.healthy_streak >= self.recovery_streak {
                    tracing::info!(
                        streak = state.healthy_streak,
                        frame = sample.frame_sequence(),
                        "raw samples healthy"
                    );
                    state.is_healthy = true;
                }
                None
            }
            Err(violation) => {
                state.unhealthy_streak += 1;
                state.healthy_streak = 0;
                state.violations += 1;
                if state.is_healthy {
                    tracing::warn!(
                        violation = %violation,
                        frame = sample.frame_sequence(),
                        "raw samples degraded"
                    );
                } else {
                    tracing::debug!(violation = %violation, "raw sample rejected");
                }
                state.is_healthy = false;
                state.last_violation = Some(violation.clone());
                Some(violation)
            }
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy
    }

    pub fn reset(&mut self) {
        self.state = MonitorState::default();
    }
}

impl Default for SampleMonitor {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> RawSample {
        RawSample::from_bytes((0..1000).map(|i| (i * 17 + 31) as u8).collect(), 1)
    }

    fn saturated() -> RawSample {
        RawSample::from_bytes(vec![0xFF; 1000], 2)
    }

    #[test]
    fn test_starts_unhealthy() {
        assert!(!SampleMonitor::default().is_healthy());
    }

    #[test]
    fn test_recovers_after_streak() {
        let mut monitor = SampleMonitor::with_recovery_streak(QualityThresholds::default(), 2);
        assert!(monitor.observe(&good()).is_none());
        assert!(!monitor.is_healthy());
        monitor.observe(&good());
        assert!(monitor.is_healthy());
    }

    #[test]
    fn test_single_violation_degrades() {
        let mut monitor = SampleMonitor::with_recovery_streak(QualityThresholds::default(), 1);
        monitor.observe(&good());
        assert!(monitor.is_healthy());

        assert!(monitor.observe(&saturated()).is_some());
        assert!(!monitor.is_healthy());
        assert_eq!(monitor.state().violations, 1);
        assert_eq!(monitor.state().samples_seen, 2);
    }
}
