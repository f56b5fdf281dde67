// tracker.rs -- Median-flow tracking of the target rectangle.
//
// Per frame:
//   1. Lay a regular grid of points over the rectangle, kept one half
//      template away from its edges
//   2. Track the grid forward (previous -> current) with pyramidal LK,
//      then track the results backward (current -> previous)
//   3. Drop points that failed either pass or whose LK residual is too big
//   4. Score each survivor by template NCC (higher is better) and by
//      forward-backward distance (lower is better); keep only points at
//      least as good as the median on both
//   5. Median displacement gives the translation, median ratio of pairwise
//      distances gives the scale
//
// The tracker owns the previous frame's pyramid and nothing else; it is
// only ever driven from the orchestrator's thread.

use log::trace;

use crate::classifier::Classifier;
use crate::frame::Frame;
use crate::image::{interpolate_bilinear, Image};
use crate::klt::{FlowPoint, LkMethod, LkTracker};
use crate::pyramid::Pyramid;
use crate::rect::{Patch, Point2, Rect};

/// Median-flow configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianFlowConfig {
    /// Maximum grid points per side.
    pub grid_size: usize,
    /// Upper bound on the NCC template side; smaller targets use side / 5.
    pub max_template_size: usize,
    /// LK window half-size.
    pub window_size: usize,
    /// LK pyramid levels (fewer on small frames).
    pub pyramid_levels: usize,
    /// LK iterations per level.
    pub max_iterations: usize,
    /// LK convergence threshold in pixels.
    pub epsilon: f32,
    /// Points whose forward or backward LK residual reaches this are dropped.
    pub max_flow_error: f32,
    /// LK formulation. Inverse-compositional reuses the template gradients
    /// across iterations; forward-additive re-samples them every step.
    pub lk_method: LkMethod,
}

impl Default for MedianFlowConfig {
    fn default() -> Self {
        MedianFlowConfig {
            grid_size: 20,
            max_template_size: 10,
            window_size: 4,
            pyramid_levels: 4,
            max_iterations: 20,
            epsilon: 0.03,
            max_flow_error: 3.0,
            lk_method: LkMethod::InverseCompositional,
        }
    }
}

#[derive(Debug)]
pub struct MedianFlowTracker {
    config: MedianFlowConfig,
    lk: LkTracker,
    prev: Option<Pyramid>,
}

impl MedianFlowTracker {
    pub fn new(config: MedianFlowConfig) -> Self {
        let lk = LkTracker::with_method(
            config.window_size,
            config.max_iterations,
            config.epsilon,
            config.pyramid_levels,
            config.lk_method,
        );
        MedianFlowTracker { config, lk, prev: None }
    }

    pub fn config(&self) -> &MedianFlowConfig {
        &self.config
    }

    /// Seed the previous frame.
    pub fn init(&mut self, frame: &Frame) {
        self.prev = Some(self.pyramid(frame));
    }

    /// Make `frame` the previous frame without tracking anything.
    pub fn advance(&mut self, frame: &Frame) {
        self.init(frame);
    }

    fn pyramid(&self, frame: &Frame) -> Pyramid {
        Pyramid::build_bounded(
            frame.gray(),
            self.config.pyramid_levels,
            2 * self.config.window_size + 1,
            1.0,
        )
    }

    /// Follow `rect` from the previous frame into `frame`.
    ///
    /// The estimate is clipped to the frame. Returns the lost patch (zero
    /// rectangle) when no point survives the filters or nothing of the
    /// estimate is left inside the frame. The confidence is always the
    /// classifier's score of the returned rectangle on `frame`.
    pub fn track(&mut self, classifier: &Classifier, frame: &Frame, rect: Rect) -> Patch {
        let curr = self.pyramid(frame);
        let Some(prev) = self.prev.take() else {
            self.prev = Some(curr);
            return Patch::lost();
        };

        let template = template_size(&rect, self.config.max_template_size);
        let points = grid_points(&rect, template, self.config.grid_size);

        let forward = self.lk.track(&prev, &curr, &points);
        let next: Vec<Point2> = forward.iter().map(|f| f.point).collect();
        let backward = self.lk.track_with_guess(&curr, &prev, &next, &points);

        let max_error = self.config.max_flow_error;
        let reliable = |f: &FlowPoint| f.is_tracked() && f.error < max_error;
        let pairs: Vec<(Point2, Point2, Point2)> = points
            .iter()
            .zip(&forward)
            .zip(&backward)
            .filter(|((_, f), b)| reliable(*f) && reliable(*b))
            .map(|((p, f), b)| (*p, f.point, b.point))
            .collect();

        let matches: Vec<f64> = pairs
            .iter()
            .map(|(p, n, _)| template_ncc(prev.level(0), curr.level(0), *p, *n, template))
            .collect();
        let fb_errors: Vec<f64> = pairs.iter().map(|(p, _, b)| p.distance(b) as f64).collect();
        let match_median = median(&matches);
        let fb_median = median(&fb_errors);

        let (prev_pts, next_pts): (Vec<Point2>, Vec<Point2>) = pairs
            .iter()
            .zip(matches.iter().zip(&fb_errors))
            .filter(|(_, (m, fb))| **m >= match_median && **fb <= fb_median)
            .map(|((p, n, _), _)| (*p, *n))
            .unzip();

        trace!(
            "median flow: {} grid points, {} reliable, {} kept",
            points.len(),
            pairs.len(),
            prev_pts.len()
        );

        self.prev = Some(curr);

        let tracked = if prev_pts.is_empty() {
            Rect::zero()
        } else {
            bounded_rect(&rect, &prev_pts, &next_pts).intersection(&frame.bounds())
        };

        let confidence = classifier.classify(frame.integral(), &tracked);
        let overlap = rect.overlap(&tracked);
        let is_overlapping =
            overlap > classifier.config().minimum_overlap && tracked.is_inside(&frame.bounds());
        Patch::new(tracked, confidence, overlap, is_overlapping)
    }
}

fn template_size(rect: &Rect, max: usize) -> usize {
    let min_side = rect.width.min(rect.height).max(0) as usize;
    max.min(min_side / 5)
}

/// `count x count` points over `rect` shrunk by `template` (half on each
/// side), `count = min(grid, width, height)` of the shrunk rectangle.
fn grid_points(rect: &Rect, template: usize, grid: usize) -> Vec<Point2> {
    let t = template as i32;
    let local = Rect::new(
        rect.x.saturating_add(t / 2),
        rect.y.saturating_add(t / 2),
        rect.width.saturating_sub(t),
        rect.height.saturating_sub(t),
    );
    if local.width < 2 || local.height < 2 {
        return Vec::new();
    }
    let count = grid.min(local.width as usize).min(local.height as usize);
    if count < 2 {
        return Vec::new();
    }
    let step_x = local.width as f32 / (count - 1) as f32;
    let step_y = local.height as f32 / (count - 1) as f32;

    let mut points = Vec::with_capacity(count * count);
    for i in 0..count {
        for j in 0..count {
            points.push(Point2::new(
                local.x as f32 + step_x * i as f32,
                local.y as f32 + step_y * j as f32,
            ));
        }
    }
    points
}

/// Normalized cross-correlation of two `size x size` windows centered on
/// `a` in `prev` and `b` in `next`. 0 when either window is flat.
fn template_ncc(prev: &Image<f32>, next: &Image<f32>, a: Point2, b: Point2, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    let half = (size as f32 - 1.0) / 2.0;
    let n = (size * size) as f64;

    let mut ta = Vec::with_capacity(size * size);
    let mut tb = Vec::with_capacity(size * size);
    for j in 0..size {
        for i in 0..size {
            let (ox, oy) = (i as f32 - half, j as f32 - half);
            ta.push(interpolate_bilinear(prev, a.x + ox, a.y + oy) as f64);
            tb.push(interpolate_bilinear(next, b.x + ox, b.y + oy) as f64);
        }
    }

    let mean_a = ta.iter().sum::<f64>() / n;
    let mean_b = tb.iter().sum::<f64>() / n;
    let (mut cross, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (va, vb) in ta.iter().zip(&tb) {
        let (da, db) = (va - mean_a, vb - mean_b);
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cross / denom
    }
}

/// Median with the two middle values averaged on even counts; 0 when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Move `rect` by the median displacement and scale it about its center by
/// the median ratio of pairwise point distances.
fn bounded_rect(rect: &Rect, prev: &[Point2], next: &[Point2]) -> Rect {
    let dx: Vec<f64> = prev.iter().zip(next).map(|(p, n)| (n.x - p.x) as f64).collect();
    let dy: Vec<f64> = prev.iter().zip(next).map(|(p, n)| (n.y - p.y) as f64).collect();
    let (dx, dy) = (median(&dx), median(&dy));

    let mut ratios = Vec::new();
    for i in 0..prev.len() {
        for j in i + 1..prev.len() {
            let before = prev[i].distance(&prev[j]) as f64;
            if before > f64::EPSILON {
                ratios.push(next[i].distance(&next[j]) as f64 / before);
            }
        }
    }
    let scale = if ratios.is_empty() { 1.0 } else { median(&ratios) };

    let shift_w = 0.5 * (scale - 1.0) * rect.width as f64;
    let shift_h = 0.5 * (scale - 1.0) * rect.height as f64;
    Rect::new(
        rect.x.saturating_sub((shift_w - dx).round() as i32),
        rect.y.saturating_sub((shift_h - dy).round() as i32),
        rect.width.saturating_add((2.0 * shift_w).round() as i32),
        rect.height.saturating_add((2.0 * shift_h).round() as i32),
    )
}
