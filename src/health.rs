//! Service health summary.

use crate::drbg::DrbgStatus;
use crate::generator::{GeneratorState, SourceReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    /// Still serving, with reduced assurance or about to stop.
    Degraded,
    /// Not serving; needs an operator.
    Fault,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Degraded => "DEGRADED",
            Self::Fault => "FAULT",
        }
    }

    /// Numeric form for gauges: 0 ok, 1 degraded, 2 fault.
    pub fn as_gauge(&self) -> i64 {
        *self as i64
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub last_reseed_age_secs: Option<f64>,
    pub queue_depth: usize,
    pub source_status: SourceReport,
    pub drbg_status: DrbgStatus,
    pub fallback_uses: u64,
    /// Why the status is not OK.
    pub reasons: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Derives the overall status from component states.
    pub fn assess(
        source_status: SourceReport,
        drbg_status: DrbgStatus,
        last_reseed_age_secs: Option<f64>,
        queue_depth: usize,
        fallback_uses: u64,
    ) -> Self {
        let mut status = HealthStatus::Ok;
        let mut reasons = Vec::new();
        let mut flag = |level: HealthStatus, reason: String| {
            status = status.max(level);
            reasons.push(reason);
        };

        match source_status.state {
            GeneratorState::Failed => flag(
                HealthStatus::Fault,
                format!(
                    "generator failed: {}",
                    source_status.last_error.as_deref().unwrap_or("unknown")
                ),
            ),
            GeneratorState::Stopped => flag(HealthStatus::Degraded, "generator stopped".to_string()),
            GeneratorState::Retrying => {
                flag(HealthStatus::Degraded, "frame source retrying".to_string())
            }
            GeneratorState::Starting | GeneratorState::Running => {}
        }
        if source_status.degraded {
            flag(
                HealthStatus::Degraded,
                "raw samples below quality thresholds".to_string(),
            );
        }
        match drbg_status {
            DrbgStatus::Fault => flag(HealthStatus::Fault, "DRBG faulted".to_string()),
            DrbgStatus::Unseeded => flag(HealthStatus::Degraded, "DRBG not seeded".to_string()),
            DrbgStatus::Seeded | DrbgStatus::Generating | DrbgStatus::Reseeding => {}
        }
        if fallback_uses > 0 {
            flag(
                HealthStatus::Degraded,
                format!("OS entropy fallback used {} times", fallback_uses),
            );
        }

        Self {
            status,
            last_reseed_age_secs,
            queue_depth,
            source_status,
            drbg_status,
            fallback_uses,
            reasons,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(state: GeneratorState, degraded: bool) -> SourceReport {
        SourceReport {
            description: "test".to_string(),
            state,
            frames: 10,
            blocks: 10,
            failures: 0,
            rejected_frames: 0,
            degraded,
            last_error: None,
        }
    }

    #[test]
    fn test_all_good_is_ok() {
        let report = HealthReport::assess(
            source(GeneratorState::Running, false),
            DrbgStatus::Seeded,
            Some(1.0),
            4,
            0,
        );
        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn test_worst_component_wins() {
        let report = HealthReport::assess(
            source(GeneratorState::Retrying, true),
            DrbgStatus::Fault,
            None,
            0,
            0,
        );
        assert_eq!(report.status, HealthStatus::Fault);
        assert_eq!(report.reasons.len(), 3);
    }

    #[test]
    fn test_failed_generator_is_fault() {
        let report = HealthReport::assess(
            source(GeneratorState::Failed, false),
            DrbgStatus::Seeded,
            Some(0.5),
            0,
            0,
        );
        assert_eq!(report.status, HealthStatus::Fault);
    }

    #[test]
    fn test_fallback_degrades() {
        let report = HealthReport::assess(
            source(GeneratorState::Running, false),
            DrbgStatus::Seeded,
            Some(0.5),
            0,
            2,
        );
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_serializes_uppercase_status() {
        let report = HealthReport::assess(
            source(GeneratorState::Running, false),
            DrbgStatus::Unseeded,
            None,
            0,
            0,
        );
        #[derive(Serialize)]
        struct Status {
            status: HealthStatus,
        }
        let text = toml::to_string(&Status {
            status: report.status,
        })
        .unwrap();
        assert_eq!(text.trim(), "status = \"DEGRADED\"");
    }
}
