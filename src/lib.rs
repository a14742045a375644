//! AleaMaris
//!
//! True random numbers from the sensor noise of video frames. Frames are
//! reduced to noisy features, hashed into fixed-size conditioned blocks and
//! queued; a DRBG is seeded and periodically reseeded from that stream, and
//! a rejection sampler turns either stream into unbiased integers.
//!
//! # Architecture
//!
//! ```text
//! FrameSource → FeatureExtractor → Conditioner → EntropyQueue ─┬─→ raw bytes
//!                      ↓               (Generator thread)      │
//!              analysis (quality)                              └─→ Feeder → DrbgEngine
//!                                                                              ↓
//!                                                                   RejectionSampler
//! ```
//!
//! # Design Principles
//!
//! - **Fail-closed**: a faulted DRBG stops serving until it is reseeded
//! - **No silent fallback**: OS entropy is used only when explicitly allowed
//! - **Standard primitives**: SHA-256, SHAKE256 or BLAKE3 for conditioning,
//!   ChaCha20 or an HMAC-style keyed hash for the DRBG
//! - **No cryptographic claims**: the quality checks are sanity checks
//!
//! # Example
//!
//! ```no_run
//! use aleamaris::{AleaConfig, EntropyService};
//!
//! let service = EntropyService::start(AleaConfig::default()).expect("service");
//! let roll = service.draw_dice(6).expect("draw");
//! let bytes = service.pull_bytes(32).expect("bytes");
//! println!("rolled {} with {} raw bytes", roll, bytes.len());
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod conditioning;
pub mod config;
pub mod drbg;
pub mod error;
pub mod extraction;
pub mod feeder;
pub mod generator;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod sampler;
mod secret;
pub mod service;

pub use capture::{Frame, FrameSource, RawFileSource, ReplaySource, SourceError, SyntheticSource};
pub use conditioning::{ConditionedBlock, Conditioner, ConditionerConfig, ConditioningAlgorithm};
pub use config::AleaConfig;
pub use drbg::{DrbgAlgorithm, DrbgEngine, DrbgStatus, SeedMaterial};
pub use error::{Error, ErrorKind, Result};
pub use extraction::{FeatureExtractor, RawSample};
pub use feeder::{Feeder, ManagedDrbg};
pub use generator::{Generator, GeneratorHandle};
pub use health::{HealthReport, HealthStatus};
pub use queue::{EntropyQueue, OverflowPolicy};
pub use sampler::RejectionSampler;
pub use service::EntropyService;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
