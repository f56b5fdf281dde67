// convolution.rs -- Separable 1D convolution and the smoothing filters
// built on it.
//
// Two consumers:
//   box_blur_3x3()      -- frame denoising before any feature is sampled
//   gaussian_kernel_1d  -- anti-aliasing between pyramid levels
//
// A 2D convolution with a separable kernel K = k_col * k_row^T decomposes
// into a horizontal pass and a vertical pass, O(2k) instead of O(k^2).
//
// BORDER HANDLING: clamp (replicate edge pixels).

use crate::image::{Image, Pixel};

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Cols,
}

/// One 1D pass along `axis`. Interior pixels skip the clamp.
fn convolve_axis<T: Pixel>(src: &Image<T>, kernel: &[f32], axis: Axis) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);
    if src.is_empty() {
        return dst;
    }

    let len = match axis {
        Axis::Rows => w,
        Axis::Cols => h,
    };
    let fetch = |x: usize, y: usize, offset: isize| -> f32 {
        let (x, y) = match axis {
            Axis::Rows => ((x as isize + offset).clamp(0, w as isize - 1) as usize, y),
            Axis::Cols => (x, (y as isize + offset).clamp(0, h as isize - 1) as usize),
        };
        // SAFETY: both coordinates were clamped into the image above.
        unsafe { src.get_unchecked(x, y).to_f32() }
    };

    for y in 0..h {
        for x in 0..w {
            let pos = match axis {
                Axis::Rows => x,
                Axis::Cols => y,
            };
            let mut acc = 0.0f32;
            if pos >= half && pos + half < len {
                // SAFETY: the whole kernel footprint lies inside the image.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        let v = match axis {
                            Axis::Rows => src.get_unchecked(x + ki - half, y),
                            Axis::Cols => src.get_unchecked(x, y + ki - half),
                        };
                        acc += v.to_f32() * kv;
                    }
                }
            } else {
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += fetch(x, y, ki as isize - half as isize) * kv;
                }
            }
            // SAFETY: (x, y) iterates the destination extent.
            unsafe { dst.set_unchecked(x, y, acc) };
        }
    }
    dst
}

/// Convolve each row of `src` with a 1D kernel (horizontal pass).
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    convolve_axis(src, kernel, Axis::Rows)
}

/// Convolve each column of `src` with a 1D kernel (vertical pass).
pub fn convolve_cols<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    convolve_axis(src, kernel, Axis::Cols)
}

/// Full separable 2D convolution: horizontal pass then vertical pass.
///
/// # Panics
/// Panics if either kernel is empty or has even length.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Generate a normalized 1D Gaussian kernel of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = tld::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * half_size)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// 3x3 normalized box filter on a u8 image, rounded back to u8.
///
/// This is the noise reduction every frame goes through before grayscale
/// statistics and pixel comparisons are taken from it.
pub fn box_blur_3x3(src: &Image<u8>) -> Image<u8> {
    const K: [f32; 3] = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
    let blurred = convolve_separable(src, &K, &K);
    let data = blurred.as_slice().iter().map(|&v| u8::from_f32(v)).collect();
    Image::from_vec(src.width(), src.height(), data)
}
