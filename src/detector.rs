// detector.rs -- Sliding-window detection around the last known target.
//
// Each call builds a grid of candidate windows (three widths x three
// heights around the reference size, stepped by 1/20 of the side) inside
// a search area centered on the best current guess of the target. The
// search area is one window size in every direction, widened by
// failures / 20 once the caller has handed over more than 20 unusable
// rectangles in a row, and always clipped to the frame.
//
// Candidates then go through two parallel passes: a variance filter
// (flat windows cannot be the target) and fern scoring.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use crate::classifier::Classifier;
use crate::frame::Frame;
use crate::kalman::KalmanFilter;
use crate::parallel::WorkerPool;
use crate::rect::{Patch, Rect};

/// Relative size change accepted between consecutive input rectangles.
const SIZE_TOLERANCE: f64 = 0.15;
/// Relative size agreement required before the Kalman prediction is used.
const PREDICTION_TOLERANCE: f64 = 0.05;
const CANDIDATE_SCALES: [f64; 3] = [0.975, 1.0, 1.025];
const STEP_DIVISOR: f64 = 20.0;
const FAILURE_DIVISOR: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Input rectangles with a side below this are ignored.
    pub min_side_size: i32,
    /// Input rectangles with a side above this are ignored.
    pub max_side_size: i32,
    /// Candidates scoring above this are reported.
    pub minimum_confidence: f64,
    /// Drop windows whose variance is below half the target's.
    pub variance_pruning: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_side_size: 16,
            max_side_size: 1024,
            minimum_confidence: 0.6,
            variance_pruning: true,
        }
    }
}

#[derive(Debug)]
pub struct Detector {
    config: DetectorConfig,
    pool: Arc<WorkerPool>,
    kalman: KalmanFilter,
    frame_bounds: Rect,
    last_rect: Rect,
    variance_threshold: f64,
    failure_counter: u32,
    search_region: Rect,
}

fn within(a: i32, b: i32, tolerance: f64) -> bool {
    let (a, b) = (a as f64, b as f64);
    a >= b * (1.0 - tolerance) && a <= b * (1.0 + tolerance)
}

fn similar_size(a: &Rect, b: &Rect, tolerance: f64) -> bool {
    within(a.width, b.width, tolerance) && within(a.height, b.height, tolerance)
}

/// Window origins `(first, last, step)` along one axis for a window of
/// `side` pixels centered on `center`, kept inside `0..limit`.
fn span(center: i32, side: i32, limit: i32, factor: f64) -> (i32, i32, usize) {
    let origin = center - side / 2;
    let reach = (side as f64 * factor).round() as i32;
    let step = ((side as f64 / STEP_DIVISOR).round() as usize).max(1);
    ((origin - reach).max(0), (origin + reach).min(limit - side), step)
}

impl Detector {
    pub fn new(config: DetectorConfig, pool: Arc<WorkerPool>) -> Self {
        Detector {
            config,
            pool,
            kalman: KalmanFilter::new(),
            frame_bounds: Rect::zero(),
            last_rect: Rect::zero(),
            variance_threshold: 0.0,
            failure_counter: 0,
            search_region: Rect::zero(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Start a new target session.
    pub fn init(&mut self, frame: &Frame, rect: Rect) {
        self.frame_bounds = frame.bounds();
        self.last_rect = rect;
        self.variance_threshold = frame.integral().variance(&rect) / 2.0;
        self.failure_counter = 0;
        self.search_region = Rect::zero();
        self.kalman.reset();
        self.kalman.predict(rect);
    }

    pub fn failure_counter(&self) -> u32 {
        self.failure_counter
    }

    /// Area the last `detect` scanned at the reference size.
    pub fn search_region(&self) -> Rect {
        self.search_region
    }

    pub fn variance_threshold(&self) -> f64 {
        self.variance_threshold
    }

    /// Last accepted reference rectangle.
    pub fn last_rect(&self) -> Rect {
        self.last_rect
    }

    fn is_valid_input(&self, rect: &Rect) -> bool {
        let c = &self.config;
        rect.width >= c.min_side_size
            && rect.height >= c.min_side_size
            && rect.width <= c.max_side_size
            && rect.height <= c.max_side_size
            && rect.is_inside(&self.frame_bounds)
    }

    /// Pick the rectangle the search is centered on, updating the failure
    /// counter and the motion model along the way.
    fn search_reference(&mut self, rect: Rect) -> Rect {
        let valid = self.is_valid_input(&rect);
        if !valid {
            self.failure_counter = self.failure_counter.saturating_add(1);
        }

        let accepted = valid && similar_size(&rect, &self.last_rect, SIZE_TOLERANCE);
        let predicted = self.kalman.predict(if accepted { rect } else { Rect::zero() });
        if accepted {
            self.last_rect = rect;
            self.failure_counter = 0;
            return rect;
        }

        if similar_size(&predicted, &self.last_rect, PREDICTION_TOLERANCE)
            && predicted.is_inside(&self.frame_bounds)
        {
            let (cx, cy) = predicted.center();
            return Rect::centered_at(cx, cy, self.last_rect.width, self.last_rect.height);
        }
        self.last_rect
    }

    fn search_factor(&self) -> f64 {
        (self.failure_counter as f64 / FAILURE_DIVISOR).max(1.0)
    }

    /// Area scanned at the reference size, clipped to the frame.
    fn search_area(&self, reference: &Rect) -> Rect {
        let factor = self.search_factor();
        let (cx, cy) = reference.center();
        let (x0, x1, _) = span(cx, reference.width, self.frame_bounds.width, factor);
        let (y0, y1, _) = span(cy, reference.height, self.frame_bounds.height, factor);
        if x1 < x0 || y1 < y0 {
            return Rect::zero();
        }
        Rect::new(x0, y0, x1 - x0 + reference.width, y1 - y0 + reference.height)
    }

    /// Candidate windows around `reference`, all inside the frame.
    fn candidates(&self, reference: &Rect) -> Vec<Rect> {
        let factor = self.search_factor();
        let (cx, cy) = reference.center();
        let (fw, fh) = (self.frame_bounds.width, self.frame_bounds.height);

        let sides = |side: i32, limit: i32| -> BTreeSet<i32> {
            CANDIDATE_SCALES
                .iter()
                .map(|s| (side as f64 * s).round() as i32)
                .filter(|&v| v >= 1 && v <= limit)
                .collect()
        };

        let mut out = Vec::new();
        for &w in &sides(reference.width, fw) {
            let (x0, x1, sx) = span(cx, w, fw, factor);
            for &h in &sides(reference.height, fh) {
                let (y0, y1, sy) = span(cy, h, fh, factor);
                if x1 < x0 || y1 < y0 {
                    continue;
                }
                for y in (y0..=y1).step_by(sy) {
                    for x in (x0..=x1).step_by(sx) {
                        out.push(Rect::new(x, y, w, h));
                    }
                }
            }
        }
        out
    }

    /// Scan for the target. `rect` is the tracker's estimate for this
    /// frame, or the zero rectangle when there is none.
    pub fn detect(&mut self, classifier: &Classifier, frame: &Frame, rect: Rect) -> Vec<Patch> {
        self.frame_bounds = frame.bounds();
        let reference = self.search_reference(rect);
        let candidates = self.candidates(&reference);
        let generated = candidates.len();

        self.search_region = self.search_area(&reference);

        let integral = frame.integral();
        let candidates = if self.config.variance_pruning {
            let threshold = self.variance_threshold;
            self.pool.filter(candidates, |r| integral.variance(r) > threshold)
        } else {
            candidates
        };
        let textured = candidates.len();

        let minimum_overlap = classifier.config().minimum_overlap;
        let scored = self.pool.map(&candidates, |r| {
            let overlap = r.overlap(&rect);
            Patch::new(*r, classifier.classify(integral, r), overlap, overlap > minimum_overlap)
        });

        let minimum_confidence = self.config.minimum_confidence;
        let patches: Vec<Patch> = scored
            .into_iter()
            .filter(|p| p.confidence > minimum_confidence || p.overlap > minimum_overlap)
            .collect();

        debug!(
            "detect around {reference} (failures {}, region {}): {generated} windows, {textured} textured, {} kept",
            self.failure_counter,
            self.search_region,
            patches.len()
        );
        patches
    }
}
