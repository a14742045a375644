//! Quality checks.
//!
//! Two layers: [`SampleMonitor`] scores raw extractor output as a sanity
//! check on the source, and [`OutputCheck`] implementations run inside a
//! DRBG over every output buffer. Neither proves entropy.

mod monitor;
mod online;
mod statistics;
mod threshold;

pub use monitor::{MonitorState, SampleMonitor};
pub use online::{AdaptiveProportionTest, CheckFailure, OutputCheck, RepetitionCountTest};
pub use statistics::{shannon_entropy, SampleStatistics};
pub use threshold::{QualityThresholds, ThresholdViolation};
