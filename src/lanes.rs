// lanes.rs — 8-lane block kernels behind one capability trait.
//
// The per-pixel maths lives in convert.rs (luma) and gradient.rs (Sobel).
// This module owns the *block* form of that maths: exactly LANES outputs per
// call, computed in widened 16-bit lanes and narrowed back to u8 with
// saturation. Strip loops call a block kernel while at least LANES pixels
// remain and finish the tail with the scalar per-pixel functions.
//
//   LaneKernels           — the capability: luma_block / gradient_block
//   ├── PortableLanes     — [u16; 8] / [i16; 8] arrays, left to the optimiser
//   ├── Sse2Lanes         — x86_64 intrinsics
//   └── NeonLanes         — aarch64 intrinsics
//
// KernelBackend picks one of those (or the pure scalar path) at runtime and
// is the only thing the workers know about. Every backend must produce the
// same bytes as the scalar path; tests/test_kernels.rs checks that for all
// backends available on the host.

use std::fmt;
use std::sync::OnceLock;

use crate::convert;
use crate::gradient;
use crate::image::{ImageView, ImageViewMut, Rgb8};

/// Outputs produced per block call.
pub const LANES: usize = 8;

/// Input columns a gradient block reads per row: one column of context on
/// each side of the LANES outputs.
pub const WINDOW: usize = LANES + 2;

/// Hardware-independent block operations used by the strip loops.
///
/// `luma_block` converts the first `LANES` pixels of `src` into `dst`.
/// `gradient_block` reads `WINDOW` columns from each of the three rows
/// (above, center, below; column 0 is the left neighbour of the first output)
/// and writes `LANES` gradient values.
///
/// Implementations panic if a slice is shorter than the block needs.
pub trait LaneKernels {
    fn luma_block(&self, src: &[Rgb8], dst: &mut [u8]);
    fn gradient_block(&self, rows: [&[u8]; 3], dst: &mut [u8]);
}

// ---------------------------------------------------------------------------
// Portable lanes
// ---------------------------------------------------------------------------

/// Fixed-width array lanes. No intrinsics; LLVM vectorises the lane loops on
/// most targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableLanes;

impl LaneKernels for PortableLanes {
    #[inline]
    fn luma_block(&self, src: &[Rgb8], dst: &mut [u8]) {
        let src = &src[..LANES];
        let dst = &mut dst[..LANES];
        let [wr, wg, wb] = convert::LUMA_WEIGHTS;

        let mut acc = [0u16; LANES];
        for (a, px) in acc.iter_mut().zip(src) {
            *a = wr * u16::from(px.r) + wg * u16::from(px.g) + wb * u16::from(px.b);
        }
        for (d, a) in dst.iter_mut().zip(acc) {
            *d = (a >> convert::LUMA_SHIFT).min(255) as u8;
        }
    }

    #[inline]
    fn gradient_block(&self, rows: [&[u8]; 3], dst: &mut [u8]) {
        let dst = &mut dst[..LANES];
        let mut gx = [0i16; LANES];
        let mut gy = [0i16; LANES];

        for (ky, row) in rows.iter().enumerate() {
            let row = &row[..WINDOW];
            for kx in 0..3 {
                let wx = gradient::SOBEL_X[ky][kx];
                let wy = gradient::SOBEL_Y[ky][kx];
                if wx == 0 && wy == 0 {
                    continue;
                }
                let taps = &row[kx..kx + LANES];
                for lane in 0..LANES {
                    let v = i16::from(taps[lane]);
                    gx[lane] += wx * v;
                    gy[lane] += wy * v;
                }
            }
        }

        for lane in 0..LANES {
            dst[lane] = (gx[lane] + gy[lane]).clamp(0, 255) as u8;
        }
    }
}

// ---------------------------------------------------------------------------
// x86_64: SSE2
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
pub use self::x86::Sse2Lanes;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    use super::{LaneKernels, LANES, WINDOW};
    use crate::convert::{LUMA_SHIFT, LUMA_WEIGHTS};
    use crate::gradient::{SOBEL_X, SOBEL_Y};
    use crate::image::Rgb8;

    /// SSE2 block kernels. Only constructible when the CPU reports SSE2.
    #[derive(Debug, Clone, Copy)]
    pub struct Sse2Lanes {
        _detected: (),
    }

    impl Sse2Lanes {
        pub fn new() -> Option<Self> {
            if std::arch::is_x86_feature_detected!("sse2") {
                Some(Sse2Lanes { _detected: () })
            } else {
                None
            }
        }
    }

    impl LaneKernels for Sse2Lanes {
        #[inline]
        fn luma_block(&self, src: &[Rgb8], dst: &mut [u8]) {
            assert!(src.len() >= LANES && dst.len() >= LANES, "luma block needs {LANES} pixels");
            // SAFETY: SSE2 presence was checked in `new`; lengths checked above.
            unsafe { luma_block_sse2(src, dst) }
        }

        #[inline]
        fn gradient_block(&self, rows: [&[u8]; 3], dst: &mut [u8]) {
            assert!(
                rows.iter().all(|r| r.len() >= WINDOW) && dst.len() >= LANES,
                "gradient block needs {WINDOW} input and {LANES} output columns"
            );
            // SAFETY: SSE2 presence was checked in `new`; lengths checked above.
            unsafe { gradient_block_sse2(rows, dst) }
        }
    }

    /// Load 8 bytes and zero-extend them into 8 x i16 lanes.
    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn load_widen(ptr: *const u8) -> __m128i {
        unsafe { _mm_unpacklo_epi8(_mm_loadl_epi64(ptr as *const __m128i), _mm_setzero_si128()) }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn luma_block_sse2(src: &[Rgb8], dst: &mut [u8]) {
        // SSE2 has no 3-way byte deinterleave, so split the channels first.
        let mut r = [0u8; LANES];
        let mut g = [0u8; LANES];
        let mut b = [0u8; LANES];
        for (i, px) in src[..LANES].iter().enumerate() {
            r[i] = px.r;
            g[i] = px.g;
            b[i] = px.b;
        }

        unsafe {
            let r = _mm_mullo_epi16(load_widen(r.as_ptr()), _mm_set1_epi16(LUMA_WEIGHTS[0] as i16));
            let g = _mm_mullo_epi16(load_widen(g.as_ptr()), _mm_set1_epi16(LUMA_WEIGHTS[1] as i16));
            let b = _mm_mullo_epi16(load_widen(b.as_ptr()), _mm_set1_epi16(LUMA_WEIGHTS[2] as i16));
            let sum = _mm_add_epi16(_mm_add_epi16(r, g), b);
            let luma = _mm_srli_epi16::<LUMA_SHIFT>(sum);
            let packed = _mm_packus_epi16(luma, luma);
            _mm_storel_epi64(dst.as_mut_ptr() as *mut __m128i, packed);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn gradient_block_sse2(rows: [&[u8]; 3], dst: &mut [u8]) {
        unsafe {
            let mut gx = _mm_setzero_si128();
            let mut gy = _mm_setzero_si128();

            for (ky, row) in rows.iter().enumerate() {
                for kx in 0..3 {
                    let wx = SOBEL_X[ky][kx];
                    let wy = SOBEL_Y[ky][kx];
                    if wx == 0 && wy == 0 {
                        continue;
                    }
                    let taps = load_widen(row[kx..kx + LANES].as_ptr());
                    if wx != 0 {
                        gx = _mm_add_epi16(gx, _mm_mullo_epi16(taps, _mm_set1_epi16(wx)));
                    }
                    if wy != 0 {
                        gy = _mm_add_epi16(gy, _mm_mullo_epi16(taps, _mm_set1_epi16(wy)));
                    }
                }
            }

            // Signed 16-bit -> unsigned 8-bit with saturation clamps to [0, 255].
            let g = _mm_add_epi16(gx, gy);
            _mm_storel_epi64(dst.as_mut_ptr() as *mut __m128i, _mm_packus_epi16(g, g));
        }
    }
}

// ---------------------------------------------------------------------------
// aarch64: NEON
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
pub use self::arm::NeonLanes;

#[cfg(target_arch = "aarch64")]
mod arm {
    use std::arch::aarch64::*;

    use super::{LaneKernels, LANES, WINDOW};
    use crate::convert::{LUMA_SHIFT, LUMA_WEIGHTS};
    use crate::gradient::{SOBEL_X, SOBEL_Y};
    use crate::image::Rgb8;

    /// NEON block kernels. Only constructible when the CPU reports NEON.
    #[derive(Debug, Clone, Copy)]
    pub struct NeonLanes {
        _detected: (),
    }

    impl NeonLanes {
        pub fn new() -> Option<Self> {
            if std::arch::is_aarch64_feature_detected!("neon") {
                Some(NeonLanes { _detected: () })
            } else {
                None
            }
        }
    }

    impl LaneKernels for NeonLanes {
        #[inline]
        fn luma_block(&self, src: &[Rgb8], dst: &mut [u8]) {
            assert!(src.len() >= LANES && dst.len() >= LANES, "luma block needs {LANES} pixels");
            // SAFETY: NEON presence was checked in `new`; lengths checked above.
            unsafe { luma_block_neon(src, dst) }
        }

        #[inline]
        fn gradient_block(&self, rows: [&[u8]; 3], dst: &mut [u8]) {
            assert!(
                rows.iter().all(|r| r.len() >= WINDOW) && dst.len() >= LANES,
                "gradient block needs {WINDOW} input and {LANES} output columns"
            );
            // SAFETY: NEON presence was checked in `new`; lengths checked above.
            unsafe { gradient_block_neon(rows, dst) }
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn luma_block_neon(src: &[Rgb8], dst: &mut [u8]) {
        unsafe {
            // vld3 deinterleaves 24 bytes into r/g/b planes of 8 lanes each.
            let rgb = vld3_u8(src.as_ptr() as *const u8);
            let r = vmulq_n_u16(vmovl_u8(rgb.0), LUMA_WEIGHTS[0]);
            let g = vmulq_n_u16(vmovl_u8(rgb.1), LUMA_WEIGHTS[1]);
            let b = vmulq_n_u16(vmovl_u8(rgb.2), LUMA_WEIGHTS[2]);
            let sum = vaddq_u16(vaddq_u16(r, g), b);
            let luma = vshrq_n_u16::<LUMA_SHIFT>(sum);
            vst1_u8(dst.as_mut_ptr(), vqmovn_u16(luma));
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn gradient_block_neon(rows: [&[u8]; 3], dst: &mut [u8]) {
        unsafe {
            let mut gx = vdupq_n_s16(0);
            let mut gy = vdupq_n_s16(0);

            for (ky, row) in rows.iter().enumerate() {
                for kx in 0..3 {
                    let wx = SOBEL_X[ky][kx];
                    let wy = SOBEL_Y[ky][kx];
                    if wx == 0 && wy == 0 {
                        continue;
                    }
                    let taps = vreinterpretq_s16_u16(vmovl_u8(vld1_u8(row[kx..kx + LANES].as_ptr())));
                    if wx != 0 {
                        gx = vmlaq_s16(gx, taps, vdupq_n_s16(wx));
                    }
                    if wy != 0 {
                        gy = vmlaq_s16(gy, taps, vdupq_n_s16(wy));
                    }
                }
            }

            vst1_u8(dst.as_mut_ptr(), vqmovun_s16(vaddq_s16(gx, gy)));
        }
    }
}

// ---------------------------------------------------------------------------
// KernelBackend — runtime selection
// ---------------------------------------------------------------------------

/// Which implementation of the pixel kernels a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelBackend {
    /// One pixel at a time, no lanes. The reference every other backend
    /// must match.
    Scalar,
    /// `PortableLanes`.
    Portable,
    /// `Sse2Lanes` (x86_64 only).
    Sse2,
    /// `NeonLanes` (aarch64 only).
    Neon,
}

impl KernelBackend {
    pub const ALL: [KernelBackend; 4] = [
        KernelBackend::Scalar,
        KernelBackend::Portable,
        KernelBackend::Sse2,
        KernelBackend::Neon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KernelBackend::Scalar => "scalar",
            KernelBackend::Portable => "portable",
            KernelBackend::Sse2 => "sse2",
            KernelBackend::Neon => "neon",
        }
    }

    /// Whether this backend can run on the current CPU.
    pub fn is_available(self) -> bool {
        match self {
            KernelBackend::Scalar | KernelBackend::Portable => true,
            #[cfg(target_arch = "x86_64")]
            KernelBackend::Sse2 => Sse2Lanes::new().is_some(),
            #[cfg(target_arch = "aarch64")]
            KernelBackend::Neon => NeonLanes::new().is_some(),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// All backends usable on this CPU, scalar first.
    pub fn available() -> Vec<KernelBackend> {
        Self::ALL.into_iter().filter(|b| b.is_available()).collect()
    }

    /// The fastest backend available on this CPU. Detected once per process.
    pub fn detect() -> KernelBackend {
        static BEST: OnceLock<KernelBackend> = OnceLock::new();
        *BEST.get_or_init(|| {
            [KernelBackend::Neon, KernelBackend::Sse2]
                .into_iter()
                .find(|b| b.is_available())
                .unwrap_or(KernelBackend::Portable)
        })
    }

    /// Convert a contiguous run of pixels to luma. `src` and `dst` must have
    /// the same length.
    ///
    /// # Panics
    /// Panics on a length mismatch or if the backend is not available.
    pub fn grayscale(self, src: &[Rgb8], dst: &mut [u8]) {
        match self {
            KernelBackend::Scalar => convert::grayscale_scalar(src, dst),
            KernelBackend::Portable => convert::grayscale_lanes(&PortableLanes, src, dst),
            #[cfg(target_arch = "x86_64")]
            KernelBackend::Sse2 => convert::grayscale_lanes(&self.sse2(), src, dst),
            #[cfg(target_arch = "aarch64")]
            KernelBackend::Neon => convert::grayscale_lanes(&self.neon(), src, dst),
            #[allow(unreachable_patterns)]
            _ => self.unavailable(),
        }
    }

    /// Sobel pass: `src` carries one context row above and below the rows of
    /// `dst` (see [`gradient::sobel_scalar`] for the exact contract).
    ///
    /// # Panics
    /// Panics on a shape mismatch or if the backend is not available.
    pub fn sobel(self, src: ImageView<'_, u8>, dst: ImageViewMut<'_, u8>) {
        match self {
            KernelBackend::Scalar => gradient::sobel_scalar(src, dst),
            KernelBackend::Portable => gradient::sobel_lanes(&PortableLanes, src, dst),
            #[cfg(target_arch = "x86_64")]
            KernelBackend::Sse2 => gradient::sobel_lanes(&self.sse2(), src, dst),
            #[cfg(target_arch = "aarch64")]
            KernelBackend::Neon => gradient::sobel_lanes(&self.neon(), src, dst),
            #[allow(unreachable_patterns)]
            _ => self.unavailable(),
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn sse2(self) -> Sse2Lanes {
        Sse2Lanes::new().unwrap_or_else(|| self.unavailable())
    }

    #[cfg(target_arch = "aarch64")]
    fn neon(self) -> NeonLanes {
        NeonLanes::new().unwrap_or_else(|| self.unavailable())
    }

    #[cold]
    fn unavailable(self) -> ! {
        panic!("kernel backend `{self}` is not available on this CPU")
    }
}

impl fmt::Display for KernelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for KernelBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|b| b.name()).collect();
                format!("unknown backend `{s}` (expected one of: {})", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_pixels(n: usize) -> Vec<Rgb8> {
        (0..n)
            .map(|i| Rgb8::new((i * 37) as u8, (i * 91 + 13) as u8, (255 - i * 7) as u8))
            .collect()
    }

    #[test]
    fn test_portable_luma_block_matches_scalar() {
        let src = ramp_pixels(LANES);
        let mut dst = [0u8; LANES];
        PortableLanes.luma_block(&src, &mut dst);
        for (px, &v) in src.iter().zip(&dst) {
            assert_eq!(v, convert::luma(*px), "pixel {px:?}");
        }
    }

    #[test]
    fn test_portable_gradient_block_matches_scalar() {
        let above: Vec<u8> = (0..WINDOW as u8).map(|i| i * 20).collect();
        let center: Vec<u8> = (0..WINDOW as u8).map(|i| 250 - i * 9).collect();
        let below: Vec<u8> = (0..WINDOW).map(|i| ((i * 71) % 255) as u8).collect();
        let rows = [&above[..], &center[..], &below[..]];

        let mut dst = [0u8; LANES];
        PortableLanes.gradient_block(rows, &mut dst);
        for (lane, &v) in dst.iter().enumerate() {
            assert_eq!(v, gradient::gradient_at(rows, lane + 1), "lane {lane}");
        }
    }

    #[test]
    #[should_panic]
    fn test_short_block_panics() {
        let src = ramp_pixels(LANES - 1);
        let mut dst = [0u8; LANES];
        PortableLanes.luma_block(&src, &mut dst);
    }

    #[test]
    fn test_detect_is_available() {
        let best = KernelBackend::detect();
        assert!(best.is_available());
        assert_ne!(best, KernelBackend::Scalar);
        assert!(KernelBackend::available().contains(&KernelBackend::Scalar));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(KernelBackend::Sse2.to_string(), "sse2");
        assert_eq!(KernelBackend::Portable.to_string(), "portable");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("NEON".parse::<KernelBackend>(), Ok(KernelBackend::Neon));
        assert_eq!("scalar".parse::<KernelBackend>(), Ok(KernelBackend::Scalar));
        assert!("avx512".parse::<KernelBackend>().unwrap_err().contains("expected one of"));
    }
}
