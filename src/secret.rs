//! Growth of secret byte buffers without leaving copies behind.

use zeroize::Zeroizing;

/// Appends `bytes` to `buf`, moving into a fresh allocation when the
/// current one is too small. The outgrown allocation is wiped on drop
/// instead of being handed back to the allocator with its contents.
pub(crate) fn extend_wiped(buf: &mut Zeroizing<Vec<u8>>, bytes: &[u8]) {
    let needed = buf.len().saturating_add(bytes.len());
    if needed > buf.capacity() {
        let mut grown = Zeroizing::new(Vec::with_capacity(needed.max(buf.capacity() * 2)));
        grown.extend_from_slice(buf);
        std::mem::swap(buf, &mut grown);
    }
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_within_capacity_keeps_allocation() {
        let mut buf = Zeroizing::new(Vec::with_capacity(8));
        buf.extend_from_slice(&[1, 2]);
        let ptr = buf.as_ptr();

        extend_wiped(&mut buf, &[3, 4, 5]);

        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.as_ptr(), ptr);
    }

    #[test]
    fn test_extend_past_capacity_moves_and_keeps_contents() {
        let mut buf = Zeroizing::new(Vec::with_capacity(4));
        buf.extend_from_slice(&[9, 9, 9, 9]);

        extend_wiped(&mut buf, &[7; 13]);

        assert_eq!(buf.len(), 17);
        assert!(buf.capacity() >= 17);
        assert_eq!(&buf[..4], &[9, 9, 9, 9]);
        assert!(buf[4..].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_growth_at_least_doubles() {
        let mut buf = Zeroizing::new(Vec::with_capacity(16));
        buf.extend_from_slice(&[0; 16]);

        extend_wiped(&mut buf, &[1]);

        assert!(buf.capacity() >= 32);
    }
}
