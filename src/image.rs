// image.rs — Runtime-sized raster container, generic over pixel type.
//
// Every buffer the pipeline touches is a full-width, row-major raster with
// stride == width. That makes a horizontal strip of rows one contiguous run
// of pixels, which is what the strip workers and the 8-lane kernels want:
//
//   data index:  0  1  2  3 | 4  5  6  7 | 8  9 10 11
//   row:         |- row 0 -|  |- row 1 -|  |- row 2 -|
//                └──────── rows(0..2) ─────┘
//
// Three flavours:
//   Image<T>           — owns its pixels (Vec<T>)
//   ImageView<'a, T>   — borrowed, read-only window of consecutive rows
//   ImageViewMut<'a, T>— borrowed, writable window of consecutive rows
//
// Kernels, frame sources and frame sinks only ever see the view types, so the
// same code works on an owned test image and on a strip of a shared frame
// buffer.

use std::fmt;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

// ---------------------------------------------------------------------------
// Pixel types
// ---------------------------------------------------------------------------

/// Marker for raster element types. `Default` is the value a fresh frame
/// buffer starts with; `Send + Sync` lets strips of one buffer go to
/// different workers.
pub trait Pixel: Copy + Default + Send + Sync + 'static {}

impl Pixel for u8 {}

/// One interleaved 24-bit colour sample.
///
/// `#[repr(C)]` + `Pod` pins the layout to three consecutive bytes, so a whole
/// frame can be viewed as `&mut [u8]` for raw video I/O (see [`Image::as_bytes_mut`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb8 { r, g, b }
    }

    #[inline]
    pub const fn gray(v: u8) -> Self {
        Rgb8 { r: v, g: v, b: v }
    }
}

impl Pixel for Rgb8 {}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// An owned raster, row-major with no padding between rows.
#[derive(Clone, PartialEq, Eq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// A `width × height` raster of `T::default()`.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Create an image from an existing pixel vector (row-major, no padding).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Give the pixel vector back, e.g. to hand it to a shared frame buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y`. Panics outside the raster.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.width + x;
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        self.rows(y..y + 1)
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        self.rows_mut(y..y + 1)
    }

    /// Borrow a run of consecutive rows as one contiguous slice.
    ///
    /// # Panics
    /// Panics if the range is reversed or extends past the last row.
    pub fn rows(&self, rows: Range<usize>) -> &[T] {
        let span = row_span(self.width, self.height, &rows);
        &self.data[span]
    }

    pub fn rows_mut(&mut self, rows: Range<usize>) -> &mut [T] {
        let span = row_span(self.width, self.height, &rows);
        &mut self.data[span]
    }

    /// Borrow the whole image read-only.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView::new(&self.data, self.width, self.height)
    }

    /// Borrow the whole image writable.
    pub fn view_mut(&mut self) -> ImageViewMut<'_, T> {
        ImageViewMut::new(&mut self.data, self.width, self.height)
    }

    /// Borrow a band of rows read-only.
    pub fn band(&self, rows: Range<usize>) -> ImageView<'_, T> {
        let height = rows.len();
        ImageView::new(self.rows(rows), self.width, height)
    }

    /// Borrow a band of rows writable.
    pub fn band_mut(&mut self, rows: Range<usize>) -> ImageViewMut<'_, T> {
        let height = rows.len();
        let width = self.width;
        ImageViewMut::new(self.rows_mut(rows), width, height)
    }

    /// `(x, y, value)` for every pixel in scan order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            self.row(y).iter().enumerate().map(move |(x, &v)| (x, y, v))
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        check_pixel(x, y, self.width, self.height);
    }
}

impl Image<Rgb8> {
    /// The interleaved frame as raw bytes (3 per pixel).
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }
}

/// Element range covering `rows` of a `width`-wide, `height`-tall raster.
#[inline]
fn row_span(width: usize, height: usize, rows: &Range<usize>) -> Range<usize> {
    assert!(
        rows.start <= rows.end && rows.end <= height,
        "rows {}..{} out of bounds (height {height})",
        rows.start,
        rows.end,
    );
    rows.start * width..rows.end * width
}

#[inline]
fn check_pixel(x: usize, y: usize, width: usize, height: usize) {
    assert!(
        x < width && y < height,
        "pixel ({x}, {y}) out of bounds in {width}x{height} raster"
    );
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

// ---------------------------------------------------------------------------
// ImageView<'a, T> — borrowed band of full-width rows
// ---------------------------------------------------------------------------
//
// The lifetime 'a ties the view to whatever owns the pixels: an Image<T>, or
// a strip of a shared frame buffer handed out for the duration of one cycle.

/// A borrowed, read-only band of consecutive full-width rows.
#[derive(Clone, Copy)]
pub struct ImageView<'a, T: Pixel> {
    data: &'a [T],
    width: usize,
    height: usize,
}

impl<'a, T: Pixel> ImageView<'a, T> {
    /// Wrap a row-major slice.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn new(data: &'a [T], width: usize, height: usize) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "view data length ({}) must equal width * height ({width}×{height})",
            data.len(),
        );
        ImageView { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at (x, y), relative to the first row of the view.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        check_pixel(x, y, self.width, self.height);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &'a [T] {
        let span = row_span(self.width, self.height, &(y..y + 1));
        let data: &'a [T] = self.data;
        &data[span]
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Copy the view into a new owned image.
    pub fn to_owned_image(&self) -> Image<T> {
        Image::from_vec(self.width, self.height, self.data.to_vec())
    }
}

/// Shows the geometry and the first few rows; frame-sized dumps are useless
/// in a failed assertion.
impl<T: Pixel + fmt::Debug> fmt::Debug for ImageView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 4;
        let head: Vec<&[T]> = (0..self.height.min(SHOWN)).map(|y| self.row(y)).collect();
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rows", &head)
            .finish_non_exhaustive()
    }
}

/// A borrowed, writable band of consecutive full-width rows.
pub struct ImageViewMut<'a, T: Pixel> {
    data: &'a mut [T],
    width: usize,
    height: usize,
}

impl<'a, T: Pixel> ImageViewMut<'a, T> {
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn new(data: &'a mut [T], width: usize, height: usize) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "view data length ({}) must equal width * height ({width}×{height})",
            data.len(),
        );
        ImageViewMut { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        check_pixel(x, y, self.width, self.height);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        check_pixel(x, y, self.width, self.height);
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let span = row_span(self.width, self.height, &(y..y + 1));
        &mut self.data[span]
    }

    pub fn as_slice(&self) -> &[T] {
        &*self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }
}

impl<'a> ImageViewMut<'a, Rgb8> {
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut *self.data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
