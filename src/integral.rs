// integral.rs -- Summed-area tables over a u8 image.
//
// ii(x, y) = sum of src(i, j) for i < x, j < y, stored with one extra row
// and column of zeros so that any window sum is four lookups:
//
//   sum(x, y, w, h) = ii(x+w, y+h) - ii(x+w, y) - ii(x, y+h) + ii(x, y)
//
// The squared table gives the second moment in the same way, which turns
// per-window variance into an O(1) test. Both tables are u64: a 4K frame
// of saturated pixels squared stays far below 2^64.

use crate::image::Image;
use crate::rect::Rect;

/// Integral and squared-integral image of a u8 frame.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    /// Source width (table width is width + 1).
    width: usize,
    /// Source height (table height is height + 1).
    height: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    /// Build both tables in one pass over `src`.
    pub fn new(src: &Image<u8>) -> Self {
        let (w, h) = (src.width(), src.height());
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            let row = src.row(y);
            for x in 0..w {
                let v = row[x] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        IntegralImage { width: w, height: h, sum, sq_sum }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Clip `rect` to the source image; `None` when nothing is left.
    #[inline]
    fn clip(&self, rect: &Rect) -> Option<(usize, usize, usize, usize)> {
        let x0 = rect.x.max(0) as i64;
        let y0 = rect.y.max(0) as i64;
        let x1 = (rect.x as i64 + rect.width as i64).min(self.width as i64);
        let y1 = (rect.y as i64 + rect.height as i64).min(self.height as i64);
        if rect.is_empty() || x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
        }
    }

    #[inline]
    fn window(table: &[u64], stride: usize, (x0, y0, x1, y1): (usize, usize, usize, usize)) -> u64 {
        // Corner order keeps every intermediate non-negative.
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// Sum of the pixels of `rect` that lie inside the image.
    ///
    /// Rectangles with non-positive size, or entirely outside the frame,
    /// sum to 0.
    #[inline]
    pub fn sum(&self, rect: &Rect) -> u64 {
        match self.clip(rect) {
            Some(c) => Self::window(&self.sum, self.width + 1, c),
            None => 0,
        }
    }

    /// Sum of squared pixels of `rect` (clipped like `sum`).
    #[inline]
    pub fn squared_sum(&self, rect: &Rect) -> u64 {
        match self.clip(rect) {
            Some(c) => Self::window(&self.sq_sum, self.width + 1, c),
            None => 0,
        }
    }

    /// Mean intensity over the clipped window, 0 for an empty window.
    pub fn mean(&self, rect: &Rect) -> f64 {
        match self.clip(rect) {
            Some(c) => {
                let area = ((c.2 - c.0) * (c.3 - c.1)) as f64;
                Self::window(&self.sum, self.width + 1, c) as f64 / area
            }
            None => 0.0,
        }
    }

    /// Intensity variance E[x^2] - E[x]^2 over the clipped window.
    ///
    /// Defined as 0 for an empty window; never negative.
    pub fn variance(&self, rect: &Rect) -> f64 {
        match self.clip(rect) {
            Some(c) => {
                let stride = self.width + 1;
                let area = ((c.2 - c.0) * (c.3 - c.1)) as f64;
                let mean = Self::window(&self.sum, stride, c) as f64 / area;
                let second = Self::window(&self.sq_sum, stride, c) as f64 / area;
                (second - mean * mean).max(0.0)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Image<u8> {
        Image::from_vec(w, h, (0..w * h).map(|i| (i % 251) as u8).collect())
    }

    fn brute_sum(img: &Image<u8>, r: &Rect) -> u64 {
        let mut s = 0u64;
        for y in r.y..r.bottom() {
            for x in r.x..r.right() {
                if x >= 0 && y >= 0 && (x as usize) < img.width() && (y as usize) < img.height() {
                    s += img.get(x as usize, y as usize) as u64;
                }
            }
        }
        s
    }

    #[test]
    fn test_sum_matches_brute_force() {
        let img = ramp(17, 11);
        let ii = IntegralImage::new(&img);
        for r in [
            Rect::new(0, 0, 17, 11),
            Rect::new(3, 2, 5, 4),
            Rect::new(16, 10, 1, 1),
            Rect::new(-3, -2, 6, 5),
            Rect::new(12, 8, 20, 20),
        ] {
            assert_eq!(ii.sum(&r), brute_sum(&img, &r), "rect {r}");
        }
    }

    #[test]
    fn test_degenerate_rects_sum_to_zero() {
        let ii = IntegralImage::new(&ramp(8, 8));
        assert_eq!(ii.sum(&Rect::new(2, 2, 0, 5)), 0);
        assert_eq!(ii.sum(&Rect::new(2, 2, -3, 5)), 0);
        assert_eq!(ii.sum(&Rect::new(20, 20, 5, 5)), 0);
        assert_eq!(ii.squared_sum(&Rect::new(-9, -9, 5, 5)), 0);
        assert_eq!(ii.sum(&Rect::new(i32::MAX - 2, 0, 50, 50)), 0);
        assert_eq!(ii.variance(&Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)), 0.0);
    }

    #[test]
    fn test_variance_of_constant_is_zero() {
        let ii = IntegralImage::new(&Image::from_vec(6, 6, vec![200u8; 36]));
        assert_eq!(ii.variance(&Rect::new(1, 1, 4, 4)), 0.0);
        assert!((ii.mean(&Rect::new(1, 1, 4, 4)) - 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_variance_of_two_levels() {
        // Half 0, half 100: mean 50, variance 2500.
        let mut img: Image<u8> = Image::new(4, 2);
        for x in 2..4 {
            img.set(x, 0, 100);
            img.set(x, 1, 100);
        }
        let ii = IntegralImage::new(&img);
        assert!((ii.variance(&img.bounds()) - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_variance_of_empty_is_zero() {
        let ii = IntegralImage::new(&ramp(8, 8));
        assert_eq!(ii.variance(&Rect::zero()), 0.0);
        assert_eq!(ii.mean(&Rect::new(3, 3, 0, 0)), 0.0);
    }
}
