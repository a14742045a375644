//! Edge-magnitude features.
//!
//! A 3x3 Laplacian highlights local intensity changes; the absolute
//! response is halved and clipped to one byte per pixel.

use super::grayscale::GrayImage;

/// Aperture-3 Laplacian kernel (corners weighted, centre -8).
const KERNEL: [[i32; 3]; 3] = [[2, 0, 2], [0, -8, 0], [2, 0, 2]];

/// Computes `min(|laplacian| >> 1, 255)` for every pixel.
///
/// Borders are reflected without repeating the edge pixel
/// (`dcb|abcd|cba`).
pub fn laplacian_magnitude(image: &GrayImage) -> Vec<u8> {
    let (w, h) = (image.width(), image.height());
    let mut out = Vec::with_capacity(w * h);

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0i32;
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    if k == 0 {
                        continue;
                    }
                    let sx = reflect(x as isize + kx as isize - 1, w);
                    let sy = reflect(y as isize + ky as isize - 1, h);
                    acc += k * image.at(sx, sy) as i32;
                }
            }
            out.push((acc.unsigned_abs() >> 1).min(255) as u8);
        }
    }

    out
}

fn reflect(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let i = if i < 0 {
        -i
    } else if i > last {
        2 * last - i
    } else {
        i
    };
    i.clamp(0, last) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_has_no_edges() {
        let image = GrayImage::new(8, 8, vec![90; 64]);
        assert!(laplacian_magnitude(&image).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_single_spike() {
        let mut data = vec![0u8; 25];
        data[12] = 10; // centre of 5x5
        let image = GrayImage::new(5, 5, data);
        let edges = laplacian_magnitude(&image);

        // Centre: |-8 * 10| >> 1 = 40; diagonal neighbours: |2 * 10| >> 1 = 10
        assert_eq!(edges[12], 40);
        assert_eq!(edges[6], 10);
        assert_eq!(edges[7], 0);
    }

    #[test]
    fn test_output_clipped() {
        let mut data = vec![0u8; 9];
        data[4] = 255;
        let image = GrayImage::new(3, 3, data);
        assert_eq!(laplacian_magnitude(&image)[4], 255);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(-1, 1), 0);
    }
}
