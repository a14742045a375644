//! Raw sample type produced by feature extraction.

/// Bytes derived from one frame.
///
/// This is the output of the extraction stage and input to conditioning.
/// No claim is made about its entropy: the length follows the frame
/// resolution, not the unpredictability of its contents.
#[derive(Clone)]
pub struct RawSample {
    data: Vec<u8>,
    /// Sequence number of the frame this sample came from.
    frame_sequence: u64,
}

impl RawSample {
    pub fn from_bytes(data: Vec<u8>, frame_sequence: u64) -> Self {
        Self {
            data,
            frame_sequence,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Consumes the sample, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Counts the number of set bits.
    pub fn popcount(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Bit bias as deviation from 0.5, in [-0.5, 0.5].
    pub fn bit_bias(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let ones = self.popcount() as f64;
        let total = (self.data.len() * 8) as f64;
        (ones / total) - 0.5
    }
}

impl std::fmt::Debug for RawSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSample")
            .field("bytes", &self.data.len())
            .field("frame_sequence", &self.frame_sequence)
            .field("bit_bias", &format!("{:.4}", self.bit_bias()))
            .finish()
    }
}
