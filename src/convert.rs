// convert.rs — RGB → luma conversion.
//
// Integer approximation of the BT.709 luma weights in sixteenths:
//
//   0.2126 R + 0.7152 G + 0.0722 B  ≈  (3 R + 11 G + 2 B) / 16
//
// The weights sum to 16, so white maps to exactly 255 and the widened sum
// never exceeds 16 * 255 = 4080 (fits comfortably in a u16 lane).
//
// Two entry points per operation, mirroring the rest of the kernels:
//   grayscale_scalar — one pixel at a time, the reference
//   grayscale_lanes  — LANES pixels per block, scalar tail
// Both must produce identical bytes for any input length.

use crate::image::{Image, Rgb8};
use crate::lanes::{KernelBackend, LaneKernels, LANES};

/// R, G, B weights in sixteenths.
pub const LUMA_WEIGHTS: [u16; 3] = [3, 11, 2];

/// Right shift that divides the weighted sum by 16.
pub const LUMA_SHIFT: i32 = 4;

/// Luma of a single pixel, saturated to [0, 255].
#[inline]
pub fn luma(px: Rgb8) -> u8 {
    let [wr, wg, wb] = LUMA_WEIGHTS;
    let sum = wr * u16::from(px.r) + wg * u16::from(px.g) + wb * u16::from(px.b);
    (sum >> LUMA_SHIFT).min(255) as u8
}

/// Convert `src` to luma one pixel at a time.
///
/// # Panics
/// Panics if `src.len() != dst.len()`.
pub fn grayscale_scalar(src: &[Rgb8], dst: &mut [u8]) {
    assert_eq!(
        src.len(),
        dst.len(),
        "grayscale source ({}) and destination ({}) lengths differ",
        src.len(),
        dst.len(),
    );
    for (d, &px) in dst.iter_mut().zip(src) {
        *d = luma(px);
    }
}

/// Convert `src` to luma `LANES` pixels at a time, finishing the trailing
/// `len % LANES` pixels with [`luma`].
///
/// # Panics
/// Panics if `src.len() != dst.len()`.
pub fn grayscale_lanes<K: LaneKernels>(lanes: &K, src: &[Rgb8], dst: &mut [u8]) {
    assert_eq!(
        src.len(),
        dst.len(),
        "grayscale source ({}) and destination ({}) lengths differ",
        src.len(),
        dst.len(),
    );

    let mut src_blocks = src.chunks_exact(LANES);
    let mut dst_blocks = dst.chunks_exact_mut(LANES);
    for (s, d) in (&mut src_blocks).zip(&mut dst_blocks) {
        lanes.luma_block(s, d);
    }
    grayscale_scalar(src_blocks.remainder(), dst_blocks.into_remainder());
}

/// Whole-image grayscale on one thread.
pub fn grayscale_image(src: &Image<Rgb8>, backend: KernelBackend) -> Image<u8> {
    let mut dst = Image::new(src.width(), src.height());
    backend.grayscale(src.as_slice(), dst.as_mut_slice());
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::PortableLanes;

    #[test]
    fn test_primary_colours() {
        assert_eq!(luma(Rgb8::new(255, 0, 0)), 47);
        assert_eq!(luma(Rgb8::new(0, 255, 0)), 175);
        assert_eq!(luma(Rgb8::new(0, 0, 255)), 31);
    }

    #[test]
    fn test_white_saturates_exactly() {
        assert_eq!(luma(Rgb8::new(255, 255, 255)), 255);
        assert_eq!(luma(Rgb8::default()), 0);
    }

    #[test]
    fn test_gray_is_identity() {
        // Weights sum to 16, so equal channels round-trip.
        for v in 0..=255u8 {
            assert_eq!(luma(Rgb8::gray(v)), v);
        }
    }

    #[test]
    fn test_lanes_with_tail() {
        // 8 + 5: one full block and a scalar tail.
        let src: Vec<Rgb8> = (0..13u8).map(|i| Rgb8::new(i * 19, 255 - i * 7, i * 3)).collect();
        let mut expected = vec![0u8; src.len()];
        let mut actual = vec![0u8; src.len()];
        grayscale_scalar(&src, &mut expected);
        grayscale_lanes(&PortableLanes, &src, &mut actual);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_last_pixel_is_written() {
        let src = vec![Rgb8::gray(200); 9];
        let mut dst = vec![0u8; 9];
        grayscale_lanes(&PortableLanes, &src, &mut dst);
        assert_eq!(dst[8], 200);
    }

    #[test]
    #[should_panic(expected = "lengths differ")]
    fn test_length_mismatch_panics() {
        let src = vec![Rgb8::default(); 4];
        let mut dst = vec![0u8; 5];
        grayscale_scalar(&src, &mut dst);
    }

    #[test]
    fn test_grayscale_image() {
        let img = Image::from_vec(
            2,
            2,
            vec![
                Rgb8::new(255, 0, 0),
                Rgb8::new(0, 255, 0),
                Rgb8::new(0, 0, 255),
                Rgb8::new(255, 255, 255),
            ],
        );
        let gray = grayscale_image(&img, KernelBackend::Scalar);
        assert_eq!(gray.as_slice(), &[47, 175, 31, 255]);
    }
}
