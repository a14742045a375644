//! Bounded exponential backoff for source failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry parameters for an unavailable frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Consecutive failures after which the generator gives up.
    pub max_failures: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 50,
            max_ms: 2_000,
            max_failures: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Records a failure. Returns the delay before the next attempt, or
    /// `None` once the failure budget is spent.
    pub fn fail(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.config.max_failures {
            return None;
        }
        let shift = (self.failures - 1).min(32);
        let delay = self
            .config
            .base_ms
            .saturating_mul(1u64 << shift)
            .min(self.config.max_ms);
        Some(Duration::from_millis(delay))
    }

    pub fn succeed(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_and_cap() {
        let mut backoff = Backoff::new(BackoffConfig {
            base_ms: 50,
            max_ms: 300,
            max_failures: 10,
        });
        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.fail().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300]);
    }

    #[test]
    fn test_budget_exhausted() {
        let mut backoff = Backoff::new(BackoffConfig {
            base_ms: 1,
            max_ms: 10,
            max_failures: 3,
        });
        assert!(backoff.fail().is_some());
        assert!(backoff.fail().is_some());
        assert!(backoff.fail().is_none());
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        backoff.fail();
        backoff.fail();
        backoff.succeed();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.fail(), Some(Duration::from_millis(50)));
    }
}
