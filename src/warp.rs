// warp.rs -- 2x3 affine transforms and inverse-mapped warping.
//
// Used to synthesize rotated views of the target when the classifier
// learns positive examples. Angles follow the image convention of the
// capture side: degrees, positive = counter-clockwise as seen on screen
// (y axis pointing down), rotation about an explicit center.
//
//   | a11 a12 b1 |
//   | a21 a22 b2 |

use crate::image::{sample_bilinear_constant, Image};
use crate::rect::{Point2, Rect};

/// 2x3 affine matrix mapping source coordinates to destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self { a11: 1.0, a12: 0.0, b1: dx, a21: 0.0, a22: 1.0, b2: dy }
    }

    /// Rotation about the origin.
    pub fn rotation(angle_degrees: f32) -> Self {
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        Self { a11: cos_a, a12: sin_a, b1: 0.0, a21: -sin_a, a22: cos_a, b2: 0.0 }
    }

    /// Rotation by `angle_degrees` that keeps `center` fixed.
    pub fn rotation_around_center(center: Point2, angle_degrees: f32) -> Self {
        let to_origin = Self::translation(-center.x, -center.y);
        let back = Self::translation(center.x, center.y);
        back.compose(&Self::rotation(angle_degrees).compose(&to_origin))
    }

    /// Matrix product `self * other` (apply `other` first).
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }

    /// `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }

    #[inline]
    pub fn transform_point(&self, p: Point2) -> Point2 {
        Point2::new(
            self.a11 * p.x + self.a12 * p.y + self.b1,
            self.a21 * p.x + self.a22 * p.y + self.b2,
        )
    }
}

/// Warp `src` by `matrix` into an image of the same size.
///
/// Every destination pixel is pulled from the source through the inverse
/// transform with bilinear sampling; samples that land outside the source
/// read as black. A singular matrix yields a black image.
pub fn warp_affine(src: &Image<u8>, matrix: &AffineMatrix) -> Image<u8> {
    let (w, h) = (src.width(), src.height());
    let mut dst = Image::new(w, h);
    let Some(inv) = matrix.inverse() else {
        return dst;
    };

    for y in 0..h {
        let row = dst.row_mut(y);
        for (x, out) in row.iter_mut().enumerate() {
            let s = inv.transform_point(Point2::new(x as f32, y as f32));
            *out = sample_bilinear_constant(src, s.x, s.y, 0.0).clamp(0.0, 255.0).round() as u8;
        }
    }
    dst
}

/// Integer bounding box of a `width x height` rectangle centered on
/// `center` and rotated by `angle_degrees`.
///
/// Corners are floored/ceiled outward and the box is inclusive of its far
/// corner, so it always covers every pixel the rotated rectangle touches.
pub fn rotated_bounding_rect(center: Point2, width: f32, height: f32, angle_degrees: f32) -> Rect {
    let rot = AffineMatrix::rotation_around_center(center, angle_degrees);
    let (hw, hh) = (width / 2.0, height / 2.0);
    let corners = [
        Point2::new(center.x - hw, center.y - hh),
        Point2::new(center.x + hw, center.y - hh),
        Point2::new(center.x + hw, center.y + hh),
        Point2::new(center.x - hw, center.y + hh),
    ];

    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for c in corners {
        let p = rot.transform_point(c);
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let x0 = min_x.floor() as i32;
    let y0 = min_y.floor() as i32;
    let x1 = max_x.ceil() as i32;
    let y1 = max_y.ceil() as i32;
    Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
}
