// rect.rs -- Integer rectangles, sub-pixel points and scored patches.
//
// Rect follows the (x, y, width, height) convention of the capture side:
// (x, y) is the top-left corner, the right/bottom edges are exclusive.
// The all-zero rectangle is the "no target" sentinel that flows through
// the whole pipeline instead of an error.

use std::cmp::Ordering;
use std::fmt;

/// Axis-aligned integer rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    /// The "target not found" sentinel.
    pub const fn zero() -> Self {
        Rect::new(0, 0, 0, 0)
    }

    /// Width * height, or 0 when either side is non-positive.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge, saturating at the i32 range.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at the i32 range.
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Intersection of two rectangles; the zero rectangle when disjoint.
    pub fn intersection(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::zero();
        }
        // Edges in i64: a caller rectangle may sit anywhere in the i32 range.
        let x0 = (self.x as i64).max(other.x as i64);
        let y0 = (self.y as i64).max(other.y as i64);
        let x1 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        if x1 <= x0 || y1 <= y0 {
            Rect::zero()
        } else {
            // Both sides are bounded by the smaller input side, so they fit.
            Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
        }
    }

    /// Intersection-over-union in [0, 1].
    ///
    /// 0 when the rectangles do not intersect (or either is empty).
    pub fn overlap(&self, other: &Rect) -> f64 {
        let inter = self.intersection(other).area();
        if inter <= 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        inter as f64 / union as f64
    }

    /// Center rounded to the nearest pixel, halves away from zero.
    pub fn center(&self) -> (i32, i32) {
        let cx = (self.x as f64 + self.width as f64 / 2.0).round() as i32;
        let cy = (self.y as f64 + self.height as f64 / 2.0).round() as i32;
        (cx, cy)
    }

    /// True when the rectangle is non-empty and lies entirely inside `bounds`.
    pub fn is_inside(&self, bounds: &Rect) -> bool {
        !self.is_empty()
            && self.x >= bounds.x
            && self.y >= bounds.y
            && self.x as i64 + self.width as i64 <= bounds.x as i64 + bounds.width as i64
            && self.y as i64 + self.height as i64 <= bounds.y as i64 + bounds.height as i64
    }

    /// Rectangle of the given size centered on `(cx, cy)`.
    pub fn centered_at(cx: i32, cy: i32, width: i32, height: i32) -> Rect {
        Rect::new(cx.saturating_sub(width / 2), cy.saturating_sub(height / 2), width, height)
    }

    /// Shift by an offset.
    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Sub-pixel image coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Point2 { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A candidate rectangle scored against the classifier.
///
/// `confidence` is the ensemble posterior in [0, 1]; `overlap` is the IoU
/// against whatever reference rectangle the producer evaluated it against.
/// `is_overlapping` records whether that overlap cleared the producer's
/// minimum (the tracker also requires the rectangle to be inside the frame).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Patch {
    pub rect: Rect,
    pub confidence: f64,
    pub overlap: f64,
    pub is_overlapping: bool,
}

impl Patch {
    pub fn new(rect: Rect, confidence: f64, overlap: f64, is_overlapping: bool) -> Self {
        Patch { rect, confidence, overlap, is_overlapping }
    }

    /// The zero-rectangle, zero-confidence "lost" patch.
    pub fn lost() -> Self {
        Patch::default()
    }

    /// Order by confidence (NaN-safe total order).
    pub fn cmp_confidence(&self, other: &Patch) -> Ordering {
        self.confidence.total_cmp(&other.confidence)
    }
}
