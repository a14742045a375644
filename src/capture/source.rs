//! Frame source abstraction.
//!
//! The core never talks to a camera or video decoder directly. Anything
//! that can hand out grayscale frames implements [`FrameSource`]; the
//! generator decides what to do when a source runs dry or disappears.

use super::Frame;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by a frame source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// End of a finite source (e.g. end of a recorded video).
    #[error("frame source exhausted")]
    Exhausted,
    /// The device or file is gone or failed to deliver a frame.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

/// Something that produces frames on demand.
///
/// Implementations are moved into the generator's worker thread, so they
/// must be `Send`. They are not shared between threads.
pub trait FrameSource: Send {
    /// Pulls the next frame.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;

    /// Restarts a finite source from its beginning.
    ///
    /// Returns `false` when the source cannot be rewound (live devices),
    /// in which case exhaustion is terminal.
    fn rewind(&mut self) -> bool {
        false
    }

    /// Releases any underlying handle. Called once on generator shutdown.
    fn release(&mut self) {}

    /// Human-readable description used in logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        (**self).next_frame()
    }

    fn rewind(&mut self) -> bool {
        (**self).rewind()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Synthetic noise source for demos and tests.
///
/// Pixels come from a seeded ChaCha8 stream. NOT for entropy: output is
/// fully determined by the seed.
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    rng: ChaCha8Rng,
    sequence: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self {
            width,
            height,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sequence: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let mut pixels = vec![0u8; (self.width as usize) * (self.height as usize)];
        self.rng.fill_bytes(&mut pixels);
        self.sequence += 1;
        Ok(Frame::new(pixels, self.width, self.height, self.sequence))
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

/// Replays a fixed script of frames and failures.
///
/// Each call to [`next_frame`](FrameSource::next_frame) consumes one step.
/// Once the script is empty the source reports [`SourceError::Exhausted`],
/// or starts over when rewinding is enabled.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    script: Vec<Result<Frame, SourceError>>,
    pending: VecDeque<Result<Frame, SourceError>>,
    rewindable: bool,
}

impl ReplaySource {
    /// Replays the given frames once.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self::from_script(frames.into_iter().map(Ok).collect())
    }

    /// Replays an arbitrary script of frames and errors.
    pub fn from_script(script: Vec<Result<Frame, SourceError>>) -> Self {
        Self {
            pending: script.iter().cloned().collect(),
            script,
            rewindable: false,
        }
    }

    /// Allows the script to restart when exhausted.
    pub fn with_rewind(mut self, rewindable: bool) -> Self {
        self.rewindable = rewindable;
        self
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.pending.pop_front().unwrap_or(Err(SourceError::Exhausted))
    }

    fn rewind(&mut self) -> bool {
        if !self.rewindable || self.script.is_empty() {
            return false;
        }
        self.pending = self.script.iter().cloned().collect();
        true
    }

    fn describe(&self) -> String {
        format!("replay ({} steps)", self.script.len())
    }
}

/// File-backed source reading raw 8-bit grayscale frames.
///
/// The file is a plain concatenation of `width * height` byte frames, as
/// produced by e.g. `ffmpeg -pix_fmt gray -f rawvideo`. A trailing
/// partial frame is treated as end of video.
pub struct RawFileSource {
    path: PathBuf,
    width: u32,
    height: u32,
    reader: Option<BufReader<File>>,
    sequence: u64,
}

impl RawFileSource {
    /// Opens the file. Fails with [`SourceError::Unavailable`] if it cannot be read.
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        if width == 0 || height == 0 {
            return Err(SourceError::Unavailable(format!(
                "invalid frame dimensions {}x{}",
                width, height
            )));
        }
        let file = File::open(&path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), width, height, "Opened raw frame file");
        Ok(Self {
            path,
            width,
            height,
            reader: Some(BufReader::new(file)),
            sequence: 0,
        })
    }
}

impl FrameSource for RawFileSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("source released".to_string()))?;

        let mut pixels = vec![0u8; (self.width as usize) * (self.height as usize)];
        match reader.read_exact(&mut pixels) {
            Ok(()) => {
                self.sequence += 1;
                Ok(Frame::new(pixels, self.width, self.height, self.sequence))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(SourceError::Exhausted),
            Err(e) => Err(SourceError::Unavailable(e.to_string())),
        }
    }

    fn rewind(&mut self) -> bool {
        match self.reader.as_mut().map(|r| r.seek(SeekFrom::Start(0))) {
            Some(Ok(_)) => {
                tracing::debug!(path = %self.path.display(), "Rewound raw frame file");
                true
            }
            Some(Err(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Rewind failed");
                false
            }
            None => false,
        }
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!(path = %self.path.display(), "Raw frame file released");
        }
    }

    fn describe(&self) -> String {
        format!("file {} ({}x{})", self.path.display(), self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_synthetic_source_frames_valid() {
        let mut source = SyntheticSource::new(16, 8, 7);

        let frame = source.next_frame().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);

        let frame2 = source.next_frame().unwrap();
        assert_eq!(frame2.sequence(), 2);
        assert_ne!(frame.pixels(), frame2.pixels());
    }

    #[test]
    fn test_synthetic_source_deterministic() {
        let mut a = SyntheticSource::new(8, 8, 42);
        let mut b = SyntheticSource::new(8, 8, 42);
        assert_eq!(a.next_frame().unwrap().pixels(), b.next_frame().unwrap().pixels());
    }

    #[test]
    fn test_replay_exhausts_then_rewinds() {
        let mut source =
            ReplaySource::from_frames(vec![Frame::filled(1, 2, 2, 1)]).with_rewind(true);

        assert!(source.next_frame().is_ok());
        assert_eq!(source.next_frame().unwrap_err(), SourceError::Exhausted);

        assert!(source.rewind());
        assert!(source.next_frame().is_ok());
    }

    #[test]
    fn test_replay_without_rewind() {
        let mut source = ReplaySource::from_frames(vec![Frame::filled(1, 2, 2, 1)]);
        source.next_frame().unwrap();
        assert!(!source.rewind());
        assert_eq!(source.next_frame().unwrap_err(), SourceError::Exhausted);
    }

    #[test]
    fn test_raw_file_source_reads_and_rewinds() {
        let path = std::env::temp_dir().join(format!(
            "aleamaris-frames-{}-{}.raw",
            std::process::id(),
            line!()
        ));
        {
            let mut file = File::create(&path).unwrap();
            // Two 2x2 frames plus a truncated third.
            file.write_all(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        }

        let mut source = RawFileSource::open(&path, 2, 2).unwrap();
        assert_eq!(source.next_frame().unwrap().pixels(), &[1, 2, 3, 4]);
        assert_eq!(source.next_frame().unwrap().pixels(), &[5, 6, 7, 8]);
        assert_eq!(source.next_frame().unwrap_err(), SourceError::Exhausted);

        assert!(source.rewind());
        assert_eq!(source.next_frame().unwrap().pixels(), &[1, 2, 3, 4]);

        source.release();
        assert!(matches!(
            source.next_frame(),
            Err(SourceError::Unavailable(_))
        ));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_raw_file_missing_is_unavailable() {
        let result = RawFileSource::open("/nonexistent/aleamaris.raw", 4, 4);
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
