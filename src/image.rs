// image.rs -- Runtime-sized single-channel image container.
//
// Every stage of the tracker works on one grayscale plane:
//   u8  -- the blurred frame the classifier features and integral images see
//   f32 -- pyramid levels and sub-pixel sampling for optical flow
//
// Layout is row-major and tightly packed (stride == width). Pixels for row
// y start at index y * width.

use std::fmt;

use crate::rect::Rect;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// `Send + Sync` is required because frames are shared read-only across
/// the worker pool during classification and training.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Raw conversion to f32 (u8 42 -> 42.0, not normalized).
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value, clamping and rounding as needed.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// Mirror axis for `Image::flipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    /// Identity, kept so the four flip variants can be iterated uniformly.
    None,
    /// Mirror left-right.
    Horizontal,
    /// Mirror top-bottom.
    Vertical,
    /// Mirror both axes (a 180 degree rotation).
    Both,
}

impl Flip {
    pub const ALL: [Flip; 4] = [Flip::None, Flip::Horizontal, Flip::Vertical, Flip::Both];

    /// Map a rectangle expressed in the coordinates of a `width x height`
    /// image into the coordinates of the flipped image.
    pub fn apply_to_rect(self, rect: Rect, width: i32, height: i32) -> Rect {
        let mut out = rect;
        if matches!(self, Flip::Horizontal | Flip::Both) {
            out.x = width - rect.x - rect.width;
        }
        if matches!(self, Flip::Vertical | Flip::Both) {
            out.y = height - rect.y - rect.height;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

// Manual Clone: a deep copy of the pixel buffer, never implicit.
impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Create an image from an existing row-major pixel vector.
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

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The full image extent as a rectangle anchored at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(
            x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        *self.data.get_unchecked(y * self.width + x)
    }

    /// Set pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.width + x) = value;
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

    /// Borrow a single row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height)
            .flat_map(move |y| (0..self.width).map(move |x| (x, y, self.data[y * self.width + x])))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copy the part of `rect` that lies inside the image into a new image.
    ///
    /// The rectangle is clipped first, so the result may be smaller than
    /// `rect` (or empty when they do not intersect).
    pub fn crop(&self, rect: Rect) -> Image<T> {
        let clipped = rect.intersection(&self.bounds());
        let (x0, y0) = (clipped.x as usize, clipped.y as usize);
        let (w, h) = (clipped.width as usize, clipped.height as usize);
        let mut out = Image::new(w, h);
        for y in 0..h {
            let src = &self.row(y0 + y)[x0..x0 + w];
            out.row_mut(y).copy_from_slice(src);
        }
        out
    }

    /// Return a mirrored copy.
    pub fn flipped(&self, flip: Flip) -> Image<T> {
        let (w, h) = (self.width, self.height);
        let mut out = Image::new(w, h);
        for y in 0..h {
            let sy = match flip {
                Flip::Vertical | Flip::Both => h - 1 - y,
                _ => y,
            };
            let src = self.row(sy);
            let dst = out.row_mut(y);
            match flip {
                Flip::Horizontal | Flip::Both => {
                    for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
                        *d = *s;
                    }
                }
                _ => dst.copy_from_slice(src),
            }
        }
        out
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}x{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}x{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.width + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.width + x;
        &mut self.data[idx]
    }
}

// ---------------------------------------------------------------------------
// Bilinear Interpolation
// ---------------------------------------------------------------------------

/// Bilinear interpolation for sub-pixel access on an f32 image.
///
/// **Boundary handling:** coordinates are clamped to the image, so the
/// edge pixels are replicated outward. Optical flow relies on this: a
/// window that slides partly off the frame still produces finite values,
/// and the degenerate gradients it yields show up as a singular system.
///
/// # Panics
/// Panics if the image is empty.
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    assert!(!img.is_empty(), "cannot interpolate on an empty image");

    let max_x = (img.width() - 1) as f32;
    let max_y = (img.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    // SAFETY: x0, x1 < width and y0, y1 < height after clamping.
    unsafe {
        let p00 = img.get_unchecked(x0, y0);
        let p10 = img.get_unchecked(x1, y0);
        let p01 = img.get_unchecked(x0, y1);
        let p11 = img.get_unchecked(x1, y1);
        (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
    }
}

/// Bilinear sample of a u8 image with a constant border.
///
/// Coordinates whose 2x2 neighbourhood leaves the image blend in `border`
/// for the missing taps. Used by the affine warp, where rotated corners
/// must fall to black rather than smear the edge pixels inward.
pub fn sample_bilinear_constant(img: &Image<u8>, x: f32, y: f32, border: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let (w, h) = (img.width() as i64, img.height() as i64);

    let tap = |px: i64, py: i64| -> f32 {
        if px < 0 || py < 0 || px >= w || py >= h {
            border
        } else {
            // SAFETY: checked against the image extent just above.
            unsafe { img.get_unchecked(px as usize, py as usize) as f32 }
        }
    };

    (1.0 - fx) * (1.0 - fy) * tap(x0, y0)
        + fx * (1.0 - fy) * tap(x0 + 1, y0)
        + (1.0 - fx) * fy * tap(x0, y0 + 1)
        + fx * fy * tap(x0 + 1, y0 + 1)
}
