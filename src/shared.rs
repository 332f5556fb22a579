// shared.rs — Frame buffers shared between the coordinator and the workers.
//
// The pool writes one frame into three full-size rasters that live for the
// whole run:
//
//   input  (Rgb8) — written by the frame source, read by every worker
//   gray   (u8)   — each worker writes its own core rows, then all read
//   output (u8)   — each worker writes its own gradient rows
//
// The borrow checker cannot see the protocol that makes this sound (it is
// enforced by the barriers in cycle.rs), so access goes through `unsafe`
// accessors whose contracts spell out who may touch which rows when:
//
//   between cycles           coordinator only, any rows, read or write
//   start .. phase barrier   workers: read input, write own core rows of gray
//   phase .. finish barrier  workers: read gray, write own gradient rows of output
//
// Strips never overlap in the rows they write (see region.rs), so concurrent
// writers always hold disjoint slices.

use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Range;
use std::ptr::NonNull;
use std::slice;

use crate::image::{Image, ImageView, ImageViewMut, Pixel, Rgb8};

/// A raster whose rows are handed out to several threads at once.
pub(crate) struct SharedImage<T: Pixel> {
    ptr: NonNull<T>,
    len: usize,
    capacity: usize,
    width: usize,
    height: usize,
    _owns: PhantomData<T>,
}

// SAFETY: the buffer is plain `Pixel` data (Send + Sync); all aliasing rules
// are pushed onto the callers of the unsafe accessors below.
unsafe impl<T: Pixel> Send for SharedImage<T> {}
unsafe impl<T: Pixel> Sync for SharedImage<T> {}

impl<T: Pixel> SharedImage<T> {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        let mut data = ManuallyDrop::new(Image::<T>::new(width, height).into_vec());
        SharedImage {
            ptr: NonNull::from(data.as_mut_slice()).cast::<T>(),
            len: data.len(),
            capacity: data.capacity(),
            width,
            height,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    /// Element range of `rows`. Panics if the rows are not inside the
    /// raster: a worker asking for rows it does not have is a broken plan.
    #[inline]
    fn span(&self, rows: &Range<usize>) -> Range<usize> {
        assert!(
            rows.start <= rows.end && rows.end <= self.height,
            "rows {}..{} outside shared frame of height {}",
            rows.start,
            rows.end,
            self.height,
        );
        rows.start * self.width..rows.end * self.width
    }

    /// Read-only band of rows.
    ///
    /// # Safety
    /// No thread may write any of `rows` while the returned view is alive.
    pub(crate) unsafe fn band(&self, rows: Range<usize>) -> ImageView<'_, T> {
        let span = self.span(&rows);
        // SAFETY: span is inside the allocation; the caller rules out writers.
        let data = unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(span.start), span.len()) };
        ImageView::new(data, self.width, rows.len())
    }

    /// Writable band of rows.
    ///
    /// # Safety
    /// The calling thread must be the only one reading or writing any of
    /// `rows` while the returned view is alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn band_mut(&self, rows: Range<usize>) -> ImageViewMut<'_, T> {
        let span = self.span(&rows);
        // SAFETY: span is inside the allocation; the caller guarantees exclusivity.
        let data = unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(span.start), span.len()) };
        ImageViewMut::new(data, self.width, rows.len())
    }

    /// Plain slice over a band of rows (see [`SharedImage::band`]).
    ///
    /// # Safety
    /// As for [`SharedImage::band`].
    pub(crate) unsafe fn rows(&self, rows: Range<usize>) -> &[T] {
        unsafe { self.band(rows).as_slice() }
    }

    /// Plain mutable slice over a band of rows (see [`SharedImage::band_mut`]).
    ///
    /// # Safety
    /// As for [`SharedImage::band_mut`].
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn rows_mut(&self, rows: Range<usize>) -> &mut [T] {
        let span = self.span(&rows);
        // SAFETY: span is inside the allocation; the caller guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(span.start), span.len()) }
    }

    /// The whole raster, read-only.
    ///
    /// # Safety
    /// As for [`SharedImage::band`], over every row.
    pub(crate) unsafe fn view(&self) -> ImageView<'_, T> {
        unsafe { self.band(0..self.height) }
    }

    /// The whole raster, writable.
    ///
    /// # Safety
    /// As for [`SharedImage::band_mut`], over every row.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn view_mut(&self) -> ImageViewMut<'_, T> {
        unsafe { self.band_mut(0..self.height) }
    }
}

impl<T: Pixel> Drop for SharedImage<T> {
    fn drop(&mut self) {
        // SAFETY: ptr/len/capacity came from a Vec<T> that was never freed.
        unsafe { drop(Vec::from_raw_parts(self.ptr.as_ptr(), self.len, self.capacity)) }
    }
}

/// The three rasters of one pipeline, allocated once at startup.
pub(crate) struct FrameBuffers {
    pub(crate) input: SharedImage<Rgb8>,
    pub(crate) gray: SharedImage<u8>,
    pub(crate) output: SharedImage<u8>,
}

impl FrameBuffers {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        FrameBuffers {
            input: SharedImage::new(width, height),
            gray: SharedImage::new(width, height),
            output: SharedImage::new(width, height),
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.output.width()
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.output.height()
    }
}
