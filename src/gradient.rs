// gradient.rs — Sobel edge response on 8-bit luma.
//
//   Gx = [-1 0 1]      Gy = [-1 -2 -1]
//        [-2 0 2]           [ 0  0  0]
//        [-1 0 1]           [ 1  2  1]
//
//   G  = clamp(Gx + Gy, 0, 255)
//
// G is the plain sum of the two directional responses, not a magnitude:
// a falling edge gives a negative Gx or Gy and clamps towards 0. Each term is
// bounded by ±1020, so the sum stays inside an i16 lane.
//
// EDGE POLICY: no clamping, no wraparound. The stencil only runs where all
// nine taps exist; the first and last columns of every output row are never
// written, and the caller supplies the rows above and below.
//
// SHAPE CONTRACT (both entry points):
//   src: width W, H + 2 rows   (row 0 = context above, row H + 1 = context below)
//   dst: width W, H rows       (dst row y is centred on src row y + 1)

use crate::image::{Image, ImageView, ImageViewMut};
use crate::lanes::{KernelBackend, LaneKernels, LANES};

pub const SOBEL_X: [[i16; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
pub const SOBEL_Y: [[i16; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Gradient at column `x` of the middle row. `rows` are above, center and
/// below; `x - 1` and `x + 1` must be valid columns.
#[inline]
pub fn gradient_at(rows: [&[u8]; 3], x: usize) -> u8 {
    let mut gx = 0i32;
    let mut gy = 0i32;
    for (ky, row) in rows.iter().enumerate() {
        for (kx, &v) in row[x - 1..=x + 1].iter().enumerate() {
            let v = i32::from(v);
            gx += i32::from(SOBEL_X[ky][kx]) * v;
            gy += i32::from(SOBEL_Y[ky][kx]) * v;
        }
    }
    (gx + gy).clamp(0, 255) as u8
}

/// Sobel pass one pixel at a time.
///
/// # Panics
/// Panics if the shapes break the contract in the module header.
pub fn sobel_scalar(src: ImageView<'_, u8>, mut dst: ImageViewMut<'_, u8>) {
    check_shapes(&src, &dst);
    let w = dst.width();
    for y in 0..dst.height() {
        let rows = [src.row(y), src.row(y + 1), src.row(y + 2)];
        let out = dst.row_mut(y);
        for x in 1..w.saturating_sub(1) {
            out[x] = gradient_at(rows, x);
        }
    }
}

/// Sobel pass `LANES` output columns at a time, remaining columns scalar.
///
/// # Panics
/// Panics if the shapes break the contract in the module header.
pub fn sobel_lanes<K: LaneKernels>(lanes: &K, src: ImageView<'_, u8>, mut dst: ImageViewMut<'_, u8>) {
    check_shapes(&src, &dst);
    let w = dst.width();
    for y in 0..dst.height() {
        let rows = [src.row(y), src.row(y + 1), src.row(y + 2)];
        let out = dst.row_mut(y);

        let mut x = 1;
        // A block at x reads columns x-1 ..= x+LANES.
        while x + LANES < w {
            let window = [&rows[0][x - 1..], &rows[1][x - 1..], &rows[2][x - 1..]];
            lanes.gradient_block(window, &mut out[x..x + LANES]);
            x += LANES;
        }
        while x + 1 < w {
            out[x] = gradient_at(rows, x);
            x += 1;
        }
    }
}

/// Whole-image Sobel on one thread. Border pixels of the result are zero.
pub fn sobel_image(gray: &Image<u8>, backend: KernelBackend) -> Image<u8> {
    let mut out = Image::new(gray.width(), gray.height());
    let h = gray.height();
    if h >= 3 {
        backend.sobel(gray.view(), out.band_mut(1..h - 1));
    }
    out
}

fn check_shapes(src: &ImageView<'_, u8>, dst: &ImageViewMut<'_, u8>) {
    assert_eq!(
        src.width(),
        dst.width(),
        "sobel source width ({}) differs from destination width ({})",
        src.width(),
        dst.width(),
    );
    assert_eq!(
        src.height(),
        dst.height() + 2,
        "sobel source needs one context row above and below: {} rows for {} output rows",
        src.height(),
        dst.height(),
    );
}
