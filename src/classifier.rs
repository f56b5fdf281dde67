// classifier.rs -- Random-fern ensemble: training and scoring of patches.
//
// Confidence of a patch is the mean posterior of the leaf each fern maps it
// to. Leaves are atomic, so every method takes &self and training batches
// run on the shared worker pool without further locking.
//
// Positive learning synthesizes views of the target:
//   scales      width and height each at 0.95 / 1.00 / 1.05
//   jitter      +-1 px in x and y
//   flips       none, horizontal, vertical, both
//   rotations   -max..=max degrees in 1 degree steps, max <= 10
// Negative learning scans the whole frame at 0.5..=1.5 times the target
// size and trains every window that does not overlap the target enough.

use std::sync::Arc;

use log::debug;
use rand::Rng;

use crate::fern::Fern;
use crate::frame::Frame;
use crate::image::{Flip, Image};
use crate::integral::IntegralImage;
use crate::parallel::WorkerPool;
use crate::rect::{Point2, Rect};
use crate::warp::{rotated_bounding_rect, warp_affine, AffineMatrix};

/// Scale steps of 0.05 around 1.0 for synthetic positives.
const POSITIVE_SCALE_STEPS: i32 = 1;
const POSITIVE_SCALE_STEP: f64 = 0.05;
/// Clearance a scaled positive must keep from the frame edge.
const POSITIVE_MARGIN: i32 = 3;
const POSITIVE_JITTER: i32 = 1;
const MAX_WARP_ANGLE: i32 = 10;

/// Negative scan scales are 0.5 + 0.25 * k for k in 0..=4.
const NEGATIVE_SCALE_COUNT: i32 = 4;
/// Scan step is 1/10 of the window side.
const NEGATIVE_STEP_DIVISOR: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub fern_count: usize,
    pub features_per_fern: usize,
    /// Smallest feature block, as a fraction of the patch side.
    pub min_feature_scale: f64,
    /// Largest feature block, as a fraction of the patch side.
    pub max_feature_scale: f64,
    /// IoU above which two rectangles count as the same object.
    pub minimum_overlap: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            fern_count: 10,
            features_per_fern: 8,
            min_feature_scale: 0.1,
            max_feature_scale: 0.5,
            minimum_overlap: 0.6,
        }
    }
}

pub struct Classifier {
    config: ClassifierConfig,
    ferns: Vec<Fern>,
    pool: Arc<WorkerPool>,
}

impl Classifier {
    pub fn new<R: Rng + ?Sized>(config: ClassifierConfig, pool: Arc<WorkerPool>, rng: &mut R) -> Self {
        let ferns = (0..config.fern_count)
            .map(|_| {
                Fern::new(
                    config.features_per_fern,
                    config.min_feature_scale,
                    config.max_feature_scale,
                    rng,
                )
            })
            .collect();
        Classifier { config, ferns, pool }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn ferns(&self) -> &[Fern] {
        &self.ferns
    }

    /// Forget everything learned; feature geometry is kept.
    pub fn reset(&self) {
        for fern in &self.ferns {
            fern.reset();
        }
    }

    /// Learn a new target from scratch.
    pub fn init(&self, frame: &Frame, rect: Rect) {
        self.reset();
        self.train(frame.integral(), &rect, true);
        let positives = self.train_positive(frame.gray(), rect);
        let negatives = self.train_negative(frame.integral(), rect);
        debug!("classifier init on {rect}: {positives} positive and {negatives} negative samples");
    }

    /// Mean fern posterior in [0, 1]; 0 for an empty rectangle.
    pub fn classify(&self, integral: &IntegralImage, rect: &Rect) -> f64 {
        if rect.is_empty() || self.ferns.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.ferns.iter().map(|f| f.classify(integral, rect)).sum();
        sum / self.ferns.len() as f64
    }

    pub fn train(&self, integral: &IntegralImage, rect: &Rect, positive: bool) {
        for fern in &self.ferns {
            fern.train(integral, rect, positive);
        }
    }

    /// Train every rectangle of `rects` on the worker pool.
    pub fn train_batch(&self, integral: &IntegralImage, rects: &[Rect], positive: bool) {
        self.pool.for_each(rects, |r| self.train(integral, r, positive));
    }

    /// Train synthetic positive views of `rect` taken from `image`.
    ///
    /// Returns the number of (warped frame, rectangle) pairs trained.
    pub fn train_positive(&self, image: &Image<u8>, rect: Rect) -> usize {
        let bounds = image.bounds();
        if rect.is_empty() || rect.intersection(&bounds).is_empty() {
            return 0;
        }
        let (cx, cy) = rect.center();
        let sizes = positive_sizes(&rect, &bounds);

        // Largest rotation whose bounding box still fits, 0 if none does.
        let max_scale = 1.0 + POSITIVE_SCALE_STEP * POSITIVE_SCALE_STEPS as f64;
        let pad = 2 * (POSITIVE_JITTER + POSITIVE_MARGIN);
        let warp_w = (rect.width as f64 * max_scale).ceil() as f32 + pad as f32;
        let warp_h = (rect.height as f64 * max_scale).ceil() as f32 + pad as f32;
        let center = Point2::new(cx as f32, cy as f32);
        let (max_angle, region) = (0..=MAX_WARP_ANGLE)
            .rev()
            .map(|a| (a, rotated_bounding_rect(center, warp_w, warp_h, a as f32)))
            .find(|(_, r)| r.is_inside(&bounds))
            .unwrap_or_else(|| (0, rotated_bounding_rect(center, warp_w, warp_h, 0.0).intersection(&bounds)));
        if region.is_empty() {
            return 0;
        }

        let crop = image.crop(region);
        let local = rect.translated(-region.x, -region.y);
        let angles: Vec<i32> = (-max_angle..=max_angle).collect();
        let (rw, rh) = (crop.width() as i32, crop.height() as i32);

        let mut trained = 0;
        for flip in Flip::ALL {
            let view = crop.flipped(flip);
            let target = flip.apply_to_rect(local, rw, rh);
            let (tx, ty) = target.center();
            let pivot = Point2::new(tx as f32, ty as f32);

            let mut rects = Vec::with_capacity(sizes.len() * 9);
            for &(w, h) in &sizes {
                for dy in -POSITIVE_JITTER..=POSITIVE_JITTER {
                    for dx in -POSITIVE_JITTER..=POSITIVE_JITTER {
                        rects.push(Rect::centered_at(tx + dx, ty + dy, w, h));
                    }
                }
            }

            // One flip's rotations at a time bounds peak memory.
            let frames = self.pool.map(&angles, |&a| {
                let m = AffineMatrix::rotation_around_center(pivot, a as f32);
                IntegralImage::new(&warp_affine(&view, &m))
            });
            for integral in &frames {
                self.train_batch(integral, &rects, true);
                trained += rects.len();
            }
        }

        debug!("train_positive {rect}: max angle {max_angle}, {} sizes, {trained} samples", sizes.len());
        trained
    }

    /// Train every window of the negative scan that overlaps `rect` by
    /// less than the minimum overlap. Returns the number of windows.
    pub fn train_negative(&self, integral: &IntegralImage, rect: Rect) -> usize {
        let windows = negative_windows(&rect, &integral.bounds(), self.config.minimum_overlap);
        self.train_batch(integral, &windows, false);
        windows.len()
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field("ferns", &self.ferns.len())
            .finish()
    }
}

/// Width/height combinations for synthetic positives that keep the margin
/// inside the frame. Falls back to the original size when none fits.
fn positive_sizes(rect: &Rect, bounds: &Rect) -> Vec<(i32, i32)> {
    let (cx, cy) = rect.center();
    let steps = -POSITIVE_SCALE_STEPS..=POSITIVE_SCALE_STEPS;
    let scale = |side: i32, k: i32| (side as f64 * (1.0 + POSITIVE_SCALE_STEP * k as f64)).round() as i32;

    let mut sizes = Vec::new();
    for kw in steps.clone() {
        for kh in steps.clone() {
            let (w, h) = (scale(rect.width, kw), scale(rect.height, kh));
            let padded = Rect::centered_at(cx, cy, w, h);
            let padded = Rect::new(
                padded.x - POSITIVE_MARGIN,
                padded.y - POSITIVE_MARGIN,
                w + 2 * POSITIVE_MARGIN,
                h + 2 * POSITIVE_MARGIN,
            );
            if w > 0 && h > 0 && padded.is_inside(bounds) {
                sizes.push((w, h));
            }
        }
    }
    if sizes.is_empty() {
        sizes.push((rect.width, rect.height));
    }
    sizes
}

/// Every scan window of the negative pass that overlaps `rect` by less
/// than `minimum_overlap`.
fn negative_windows(rect: &Rect, bounds: &Rect, minimum_overlap: f64) -> Vec<Rect> {
    let mut windows = Vec::new();
    for k in 0..=NEGATIVE_SCALE_COUNT {
        let scale = 0.5 + 0.25 * k as f64;
        let w = (rect.width as f64 * scale) as i32;
        let h = (rect.height as f64 * scale) as i32;
        if w < 1 || h < 1 || w > bounds.width || h > bounds.height {
            continue;
        }
        let step_x = ((w as f64 / NEGATIVE_STEP_DIVISOR).round() as usize).max(1);
        let step_y = ((h as f64 / NEGATIVE_STEP_DIVISOR).round() as usize).max(1);
        for y in (bounds.y..=bounds.bottom() - h).step_by(step_y) {
            for x in (bounds.x..=bounds.right() - w).step_by(step_x) {
                let window = Rect::new(x, y, w, h);
                if window.overlap(rect) < minimum_overlap {
                    windows.push(window);
                }
            }
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn block_noise(w: usize, h: usize, seed: u64) -> Image<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (bw, bh) = (w.div_ceil(4), h.div_ceil(4));
        let blocks: Vec<u8> = (0..bw * bh).map(|_| rng.gen()).collect();
        let mut img = Image::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.set(x, y, blocks[(y / 4) * bw + x / 4]);
            }
        }
        img
    }

    fn classifier(seed: u64) -> Classifier {
        let pool = Arc::new(WorkerPool::new(Some(2)).unwrap());
        let mut rng = StdRng::seed_from_u64(seed);
        Classifier::new(ClassifierConfig::default(), pool, &mut rng)
    }

    #[test]
    fn test_positive_only_training_gives_one() {
        let c = classifier(1);
        let ii = IntegralImage::new(&block_noise(80, 80, 3));
        let r = Rect::new(10, 10, 40, 40);
        for _ in 0..4 {
            c.train(&ii, &r, true);
        }
        assert_eq!(c.classify(&ii, &r), 1.0);
    }

    #[test]
    fn test_negative_only_training_gives_zero() {
        let c = classifier(2);
        let ii = IntegralImage::new(&block_noise(80, 80, 3));
        let r = Rect::new(10, 10, 40, 40);
        c.train(&ii, &r, false);
        assert_eq!(c.classify(&ii, &r), 0.0);
    }

    #[test]
    fn test_empty_rect_classifies_to_zero() {
        let c = classifier(3);
        let ii = IntegralImage::new(&block_noise(40, 40, 1));
        assert_eq!(c.classify(&ii, &Rect::zero()), 0.0);
        assert_eq!(c.classify(&ii, &Rect::new(5, 5, 0, 10)), 0.0);
    }

    #[test]
    fn test_positive_sizes_respect_margin() {
        let bounds = Rect::new(0, 0, 100, 100);
        assert_eq!(positive_sizes(&Rect::new(30, 30, 40, 40), &bounds).len(), 9);
        // Touching the left edge: no variant keeps a 3 px margin.
        assert_eq!(positive_sizes(&Rect::new(0, 30, 40, 40), &bounds), vec![(40, 40)]);
    }

    #[test]
    fn test_negative_windows_exclude_target() {
        let bounds = Rect::new(0, 0, 120, 100);
        let target = Rect::new(40, 30, 30, 30);
        let windows = negative_windows(&target, &bounds, 0.6);
        assert!(!windows.is_empty());
        for w in &windows {
            assert!(w.is_inside(&bounds), "{w}");
            assert!(w.overlap(&target) < 0.6);
        }
        // Scales 0.5 and 1.5 are both scanned.
        assert!(windows.iter().any(|w| w.width == 15));
        assert!(windows.iter().any(|w| w.width == 45));
    }

    #[test]
    fn test_init_learns_target_over_background() {
        let c = classifier(4);
        let frame = Frame::new(block_noise(160, 120, 11));
        let target = Rect::new(60, 40, 40, 40);
        c.init(&frame, target);

        assert!(c.classify(frame.integral(), &target) > 0.8);
        let background = Rect::new(5, 5, 40, 40);
        assert!(c.classify(frame.integral(), &background) < 0.5);
    }

    #[test]
    fn test_reset_forgets() {
        let c = classifier(5);
        let frame = Frame::new(block_noise(120, 120, 7));
        let target = Rect::new(40, 40, 40, 40);
        c.init(&frame, target);
        c.reset();
        assert_eq!(c.classify(frame.integral(), &target), 0.0);
    }

    #[test]
    fn test_train_positive_near_border_still_trains() {
        let c = classifier(6);
        let img = block_noise(64, 64, 2);
        let n = c.train_positive(&img, Rect::new(0, 0, 30, 30));
        // No rotation room: 4 flips x 1 angle x 1 size x 9 jitters.
        assert_eq!(n, 36);
        assert_eq!(c.train_positive(&img, Rect::new(200, 200, 10, 10)), 0);
    }
}
