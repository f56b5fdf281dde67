// pyramid.rs -- Gaussian image pyramid for coarse-to-fine optical flow.
//
// Algorithm at each level:
//   1. Gaussian blur (separable convolution from convolution.rs)
//   2. Downsample 2x by taking every other pixel in both dimensions
//
// The number of levels actually built is capped so that the coarsest level
// is still at least `min_side` pixels on each side. A Lucas-Kanade window
// larger than the image it slides over produces nothing but border pixels.

use crate::convolution::{convolve_separable, gaussian_kernel_1d};
use crate::image::{Image, Pixel};

/// A Gaussian image pyramid.
///
/// `levels[0]` is the original resolution (converted to f32).
/// `levels[n]` is approximately `(width / 2^n, height / 2^n)`.
#[derive(Clone, Debug)]
pub struct Pyramid {
    /// Pyramid levels, from finest (index 0) to coarsest.
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build a pyramid with exactly `num_levels` levels.
    ///
    /// # Panics
    /// Panics if `num_levels` is 0.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, sigma: f32) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");

        let half_size = (3.0 * sigma).ceil().max(1.0) as usize;
        let kernel = gaussian_kernel_1d(half_size, sigma);

        let mut levels = Vec::with_capacity(num_levels);
        let mut current = to_f32_image(src);
        for _ in 1..num_levels {
            let blurred = convolve_separable(&current, &kernel, &kernel);
            let next = downsample_2x(&blurred);
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Pyramid { levels }
    }

    /// Build at most `max_levels` levels, stopping before any level would
    /// drop below `min_side` pixels in either dimension.
    pub fn build_bounded<T: Pixel>(src: &Image<T>, max_levels: usize, min_side: usize, sigma: f32) -> Self {
        let levels = usable_levels(src.width(), src.height(), max_levels, min_side);
        Self::build(src, levels, sigma)
    }

    /// Number of pyramid levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Get a reference to a specific level.
    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }
}

/// Number of levels (at least 1, at most `max_levels`) for which every
/// level keeps both sides >= `min_side`.
pub fn usable_levels(width: usize, height: usize, max_levels: usize, min_side: usize) -> usize {
    let mut levels = 1;
    let (mut w, mut h) = (width / 2, height / 2);
    while levels < max_levels && w >= min_side && h >= min_side {
        levels += 1;
        w /= 2;
        h /= 2;
    }
    levels
}

/// Downsample an image by 2x in both dimensions.
///
/// Takes every other pixel: `dst(x, y) = src(2*x, 2*y)`. Odd dimensions
/// drop the last row/column.
fn downsample_2x(src: &Image<f32>) -> Image<f32> {
    let new_w = src.width() / 2;
    let new_h = src.height() / 2;
    let mut dst = Image::new(new_w, new_h);

    for y in 0..new_h {
        for x in 0..new_w {
            // SAFETY: x*2 < width and y*2 < height since x < width/2 and y < height/2.
            unsafe { dst.set_unchecked(x, y, src.get_unchecked(x * 2, y * 2)) };
        }
    }
    dst
}

/// Convert any Pixel image to f32, preserving raw values.
fn to_f32_image<T: Pixel>(src: &Image<T>) -> Image<f32> {
    let data = src.as_slice().iter().map(|v| v.to_f32()).collect();
    Image::from_vec(src.width(), src.height(), data)
}
