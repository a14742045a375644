//! Spatial XOR folding.
//!
//! Adjacent pixels are strongly correlated. Folding each byte with the
//! byte `stride` positions ahead (wrapping) breaks up local structure
//! before hashing. The fold is in place and keeps the sample length.

/// XORs bytes with a partner `stride` positions away.
#[derive(Debug, Clone, Copy)]
pub struct SpatialMixer {
    stride: usize,
}

impl SpatialMixer {
    /// Creates a mixer; a zero stride is treated as 1.
    pub fn with_stride(stride: usize) -> Self {
        Self {
            stride: stride.max(1),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Folds `data` in place.
    ///
    /// Partners are read from the original contents, so the result does
    /// not depend on iteration order.
    pub fn mix_in_place(&self, data: &mut [u8]) {
        let len = data.len();
        if len < 2 {
            return;
        }
        let stride = self.stride % len;
        if stride == 0 {
            return;
        }
        let head: Vec<u8> = data[..stride].to_vec();
        for i in 0..len {
            let partner = if i + stride < len {
                data[i + stride]
            } else {
                head[i + stride - len]
            };
            data[i] ^= partner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_untouched() {
        let mixer = SpatialMixer::with_stride(3);
        let mut data = vec![0x42];
        mixer.mix_in_place(&mut data);
        assert_eq!(data, vec![0x42]);
    }

    #[test]
    fn test_alternating_pattern() {
        let mixer = SpatialMixer::with_stride(0);
        let mut data = vec![0xAA, 0x55, 0xAA, 0x55];
        mixer.mix_in_place(&mut data);
        assert!(data.iter().all(|&v| v == 0xFF));
    }

    #[test]
    fn test_wraps_with_original_values() {
        let mixer = SpatialMixer::with_stride(1);
        let mut data = vec![1, 2, 4];
        mixer.mix_in_place(&mut data);
        assert_eq!(data, vec![1 ^ 2, 2 ^ 4, 4 ^ 1]);
    }

    #[test]
    fn test_stride_multiple_of_len_is_noop() {
        let mixer = SpatialMixer::with_stride(4);
        let mut data = vec![9, 8, 7, 6];
        mixer.mix_in_place(&mut data);
        assert_eq!(data, vec![9, 8, 7, 6]);
    }
}
