//! Crate-wide error type.
//!
//! Wraps the per-module errors and classifies them: transient failures are
//! worth retrying, everything else needs a reseed or an operator.

use crate::capture::SourceError;
use crate::conditioning::ConditioningError;
use crate::config::ConfigError;
use crate::drbg::DrbgError;
use crate::extraction::ExtractionError;
use crate::feeder::FeederError;
use crate::queue::QueueError;
use crate::sampler::SamplerError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Conditioning(#[from] ConditioningError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Drbg(#[from] DrbgError),

    #[error(transparent)]
    Feeder(#[from] FeederError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("generator failed: {0}")]
    GeneratorFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error categories for callers and front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    SourceExhausted,
    SourceUnavailable,
    InvalidFrame,
    InsufficientEntropyInput,
    InsufficientSeedMaterial,
    ReseedRequired,
    EngineFaulted,
    Unseeded,
    QueueTimeout,
    QueueClosed,
    InvalidRange,
    ConfigurationError,
    GeneratorFailed,
    InvalidArgument,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Source(SourceError::Exhausted) => ErrorKind::SourceExhausted,
            Self::Source(SourceError::Unavailable(_)) => ErrorKind::SourceUnavailable,
            Self::Extraction(_) => ErrorKind::InvalidFrame,
            Self::Conditioning(e) => conditioning_kind(e),
            Self::Queue(e) => queue_kind(e),
            Self::Drbg(e) => drbg_kind(e),
            Self::Feeder(e) => feeder_kind(e),
            Self::Sampler(e) => match e {
                SamplerError::InvalidRange { .. } | SamplerError::InvalidSides => {
                    ErrorKind::InvalidRange
                }
                SamplerError::Queue(e) => queue_kind(e),
                SamplerError::Drbg(e) => drbg_kind(e),
                SamplerError::Feeder(e) => feeder_kind(e),
            },
            Self::Config(_) => ErrorKind::ConfigurationError,
            Self::GeneratorFailed(_) => ErrorKind::GeneratorFailed,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// True when retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::QueueTimeout
                | ErrorKind::SourceUnavailable
                | ErrorKind::InsufficientEntropyInput
        )
    }
}

fn conditioning_kind(e: &ConditioningError) -> ErrorKind {
    match e {
        ConditioningError::InsufficientEntropyInput { .. } => ErrorKind::InsufficientEntropyInput,
        _ => ErrorKind::ConfigurationError,
    }
}

fn queue_kind(e: &QueueError) -> ErrorKind {
    match e {
        QueueError::Timeout { .. } => ErrorKind::QueueTimeout,
        QueueError::Closed => ErrorKind::QueueClosed,
    }
}

fn drbg_kind(e: &DrbgError) -> ErrorKind {
    match e {
        DrbgError::Unseeded => ErrorKind::Unseeded,
        DrbgError::InsufficientSeedMaterial { .. } => ErrorKind::InsufficientSeedMaterial,
        DrbgError::ReseedRequired { .. } => ErrorKind::ReseedRequired,
        DrbgError::EngineFaulted(_) => ErrorKind::EngineFaulted,
        DrbgError::UnknownAlgorithm(_) => ErrorKind::ConfigurationError,
    }
}

fn feeder_kind(e: &FeederError) -> ErrorKind {
    match e {
        FeederError::Stream(e) => queue_kind(e),
        FeederError::Drbg(e) => drbg_kind(e),
        FeederError::OsEntropy(_) => ErrorKind::InsufficientSeedMaterial,
    }
}
