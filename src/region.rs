// region.rs — Static partition of a frame into horizontal strips.
//
// With N workers and R rows, strip k owns the *core* rows
//
//   [k * (R / N), (k + 1) * (R / N))      for k < N - 1
//   [(N - 1) * (R / N), R)                for the last strip
//
// so the remainder R % N is folded into the last strip. Every strip except
// the last carries one *skirt* row: the first core row of the next strip,
// which its Sobel pass reads as the row below its own bottom edge.
//
//   row  0 ┌─────────────┐
//          │  strip 0    │
//   row  4 ├ ─ skirt 0 ─ ┤──┐
//          │  strip 1    │  │ core rows of strip 1
//   row  8 ├ ─ skirt 1 ─ ┤──┘
//          │  ...        │
//
// The plan is computed once from the frame dimensions and never changes.

use std::ops::Range;

use crate::error::{Error, Result};

/// Worker count used when the caller does not pick one.
pub const DEFAULT_WORKERS: usize = 4;

/// Extra rows below a strip that its stencil reads.
pub const SKIRT_ROWS: usize = 1;

/// One worker's strip: `height` rows starting at `origin_row`, including
/// `skirt` context rows at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub origin_row: usize,
    pub origin_col: usize,
    pub width: usize,
    pub height: usize,
    pub skirt: usize,
}

impl RegionDescriptor {
    /// Rows this strip owns (no skirt).
    #[inline]
    pub fn core_height(&self) -> usize {
        self.height - self.skirt
    }

    #[inline]
    pub fn core_rows(&self) -> Range<usize> {
        self.origin_row..self.origin_row + self.core_height()
    }

    #[inline]
    pub fn skirt_rows(&self) -> Range<usize> {
        let end = self.core_rows().end;
        end..end + self.skirt
    }

    #[inline]
    pub fn skirted_rows(&self) -> Range<usize> {
        self.origin_row..self.origin_row + self.height
    }

    /// Rows of the output frame this strip's Sobel pass writes: its core
    /// rows minus the first and last rows of the frame.
    pub fn gradient_rows(&self, frame_rows: usize) -> Range<usize> {
        let core = self.core_rows();
        let start = core.start.max(1);
        let end = core.end.min(frame_rows.saturating_sub(1));
        if start < end {
            start..end
        } else {
            start..start
        }
    }

    /// Rows of the grayscale frame the Sobel pass reads: the gradient rows
    /// plus one row above and one below (the skirt).
    pub fn gradient_context(&self, frame_rows: usize) -> Range<usize> {
        let out = self.gradient_rows(frame_rows);
        if out.is_empty() {
            out
        } else {
            out.start - 1..out.end + 1
        }
    }
}

/// The full set of strips for one frame geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    rows: usize,
    cols: usize,
    regions: Vec<RegionDescriptor>,
}

impl RegionPlan {
    /// Split a `rows × cols` frame into `workers` strips.
    ///
    /// A frame with no rows or no columns, one too large to address, or a
    /// pool with no workers, is a configuration error. An uneven split is fine.
    pub fn new(rows: usize, cols: usize, workers: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::ZeroSizedFrame {
                width: cols,
                height: rows,
            });
        }
        // Every raster is allocated as rows * cols pixels of up to 3 bytes.
        if rows.checked_mul(cols).and_then(|n| n.checked_mul(3)).is_none() {
            return Err(Error::FrameTooLarge {
                width: cols,
                height: rows,
            });
        }
        if workers == 0 {
            return Err(Error::NoWorkers);
        }

        let band = rows / workers;
        let regions = (0..workers)
            .map(|k| {
                let start = k * band;
                let end = if k + 1 == workers { rows } else { start + band };
                let skirt = if end < rows { SKIRT_ROWS } else { 0 };
                RegionDescriptor {
                    origin_row: start,
                    origin_col: 0,
                    width: cols,
                    height: end - start + skirt,
                    skirt,
                }
            })
            .collect();

        Ok(RegionPlan {
            rows,
            cols,
            regions,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn regions(&self) -> &[RegionDescriptor] {
        &self.regions
    }

    /// Number of strips (= workers).
    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let plan = RegionPlan::new(480, 640, 4).unwrap();
        let cores: Vec<_> = plan.regions().iter().map(|r| r.core_rows()).collect();
        assert_eq!(cores, vec![0..120, 120..240, 240..360, 360..480]);

        let heights: Vec<_> = plan.regions().iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![121, 121, 121, 120]);
        assert!(plan.regions().iter().all(|r| r.width == 640 && r.origin_col == 0));
    }

    #[test]
    fn test_remainder_goes_to_last_strip() {
        let plan = RegionPlan::new(10, 3, 4).unwrap();
        let cores: Vec<_> = plan.regions().iter().map(|r| r.core_rows()).collect();
        assert_eq!(cores, vec![0..2, 2..4, 4..6, 6..10]);
    }

    #[test]
    fn test_skirt_is_next_core_row() {
        let plan = RegionPlan::new(13, 5, 4).unwrap();
        for pair in plan.regions().windows(2) {
            assert_eq!(pair[0].skirt_rows(), pair[1].core_rows().start..pair[1].core_rows().start + 1);
        }
        assert!(plan.regions()[3].skirt_rows().is_empty());
    }

    #[test]
    fn test_fewer_rows_than_workers() {
        let plan = RegionPlan::new(2, 8, 4).unwrap();
        let cores: Vec<_> = plan.regions().iter().map(|r| r.core_rows()).collect();
        assert_eq!(cores, vec![0..0, 0..0, 0..0, 0..2]);
        // Empty strips never produce gradient rows.
        assert!(plan.regions()[..3].iter().all(|r| r.gradient_rows(2).is_empty()));
    }

    #[test]
    fn test_gradient_rows_skip_frame_border() {
        let plan = RegionPlan::new(12, 4, 3).unwrap();
        let rows: Vec<_> = plan.regions().iter().map(|r| r.gradient_rows(12)).collect();
        assert_eq!(rows, vec![1..4, 4..8, 8..11]);

        let ctx: Vec<_> = plan.regions().iter().map(|r| r.gradient_context(12)).collect();
        assert_eq!(ctx, vec![0..5, 3..9, 7..12]);
    }

    #[test]
    fn test_context_stays_within_skirt() {
        let plan = RegionPlan::new(37, 4, 5).unwrap();
        for r in plan.regions() {
            let ctx = r.gradient_context(37);
            if ctx.is_empty() {
                continue;
            }
            assert!(ctx.start + 1 >= r.origin_row, "{r:?}");
            assert!(ctx.end <= r.skirted_rows().end, "{r:?}");
        }
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        assert!(matches!(
            RegionPlan::new(0, 10, 4),
            Err(Error::ZeroSizedFrame { width: 10, height: 0 })
        ));
        assert!(matches!(RegionPlan::new(10, 0, 4), Err(Error::ZeroSizedFrame { .. })));
        assert!(matches!(RegionPlan::new(10, 10, 0), Err(Error::NoWorkers)));
    }
}
