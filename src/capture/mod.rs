//! Frame input.
//!
//! This module provides the frame type and the [`FrameSource`] seam the
//! generator pulls from. Frames are treated as raw visual data, not as
//! entropy directly.

mod frame;
mod source;

pub use frame::Frame;
pub use source::{FrameSource, RawFileSource, ReplaySource, SourceError, SyntheticSource};
