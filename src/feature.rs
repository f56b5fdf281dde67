// feature.rs -- One binary-pair intensity comparison inside a patch.
//
// A feature is a sub-block of the patch, expressed in patch-relative
// fractions so it scales with the patch. Testing it compares the two
// halves of the block left-vs-right and top-vs-bottom, which quantizes
// the dominant local gradient direction into a 2-bit code:
//
//   bit 1 = (left sum <= right sum)
//   bit 0 = (top sum  <= bottom sum)
//
// All four sums come from the integral image, so a test is O(1)
// regardless of patch size.

use rand::Rng;

use crate::integral::IntegralImage;
use crate::rect::Rect;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    scale_x: f64,
    scale_y: f64,
    scale_w: f64,
    scale_h: f64,
}

impl Feature {
    /// Sample a feature whose width/height fractions are uniform in
    /// `[min_scale, max_scale]` and whose offset fills the remainder.
    pub fn new<R: Rng + ?Sized>(min_scale: f64, max_scale: f64, rng: &mut R) -> Self {
        let scale_w = rng.gen_range(min_scale..=max_scale);
        let scale_h = rng.gen_range(min_scale..=max_scale);
        let scale_x = (1.0 - scale_w) * rng.gen::<f64>();
        let scale_y = (1.0 - scale_h) * rng.gen::<f64>();
        Feature { scale_x, scale_y, scale_w, scale_h }
    }

    /// Build a feature from explicit fractions.
    pub fn from_fractions(scale_x: f64, scale_y: f64, scale_w: f64, scale_h: f64) -> Self {
        Feature { scale_x, scale_y, scale_w, scale_h }
    }

    /// The sub-block this feature covers inside `patch`.
    pub fn block(&self, patch: &Rect) -> Rect {
        let pw = patch.width as f64;
        let ph = patch.height as f64;
        Rect::new(
            (self.scale_x * pw).round() as i32 + patch.x,
            (self.scale_y * ph).round() as i32 + patch.y,
            (self.scale_w * pw).round() as i32,
            (self.scale_h * ph).round() as i32,
        )
    }

    /// Evaluate on `patch`; returns a code in `0..4`.
    ///
    /// Out-of-frame or degenerate halves sum to 0 (the integral image
    /// clips), so this never faults.
    #[inline]
    pub fn test(&self, integral: &IntegralImage, patch: &Rect) -> u8 {
        let b = self.block(patch);
        let (hw, hh) = (b.width / 2, b.height / 2);
        let left = integral.sum(&Rect::new(b.x, b.y, hw, b.height));
        let right = integral.sum(&Rect::new(b.x + hw, b.y, hw, b.height));
        let top = integral.sum(&Rect::new(b.x, b.y, b.width, hh));
        let bottom = integral.sum(&Rect::new(b.x, b.y + hh, b.width, hh));
        (((left <= right) as u8) << 1) | ((top <= bottom) as u8)
    }
}
