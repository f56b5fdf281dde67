// klt.rs -- Pyramidal Lucas-Kanade point tracker.
//
// Implements two formulations of Lucas-Kanade for pure translation:
//
// 1. FORWARD ADDITIVE:
//    Gradients evaluated at the warped position in the current frame
//    each iteration, so the Hessian is recomputed every iteration.
//
// 2. INVERSE COMPOSITIONAL (Baker & Matthews, 2004):
//    Gradients evaluated once at the template position in the previous
//    frame. The Hessian is constant across iterations and only the error
//    image is recomputed.
//
// Both share the same coarse-to-fine strategy. Each point may start from
// an initial guess instead of zero flow, which is how the backward pass of
// a forward-backward check is seeded. After convergence the residual is
// reported as the mean absolute intensity difference over the window at
// full resolution, on the 0..255 scale.

use crate::image::{interpolate_bilinear, Image};
use crate::pyramid::Pyramid;
use crate::rect::Point2;

/// Outcome of tracking one point from the previous frame to the current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Successfully tracked to a new position.
    Tracked,
    /// Lost: the gradient structure under the window was degenerate.
    Lost,
    /// The tracked position fell outside the image bounds.
    OutOfBounds,
}

/// Lucas-Kanade algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LkMethod {
    ForwardAdditive,
    InverseCompositional,
}

/// A tracked point together with its status and residual.
#[derive(Debug, Clone, Copy)]
pub struct FlowPoint {
    /// Position in the current frame. Unreliable unless `status == Tracked`.
    pub point: Point2,
    pub status: TrackStatus,
    /// Mean absolute difference between the template window and the
    /// matched window. `f32::INFINITY` for lost points.
    pub error: f32,
}

impl FlowPoint {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

/// Pyramidal Lucas-Kanade tracker.
#[derive(Debug, Clone)]
pub struct LkTracker {
    /// Patch half-size. The actual patch is (2*window_size + 1)^2.
    pub window_size: usize,
    /// Maximum Gauss-Newton iterations per pyramid level.
    pub max_iterations: usize,
    /// Convergence threshold in pixels.
    pub epsilon: f32,
    /// Number of pyramid levels to use, capped by the pyramids given.
    pub max_levels: usize,
    pub method: LkMethod,
}

/// Smallest acceptable eigenvalue of the window's structure tensor,
/// normalized by window area.
const MIN_EIGEN_THRESHOLD: f32 = 1e-4;

impl LkTracker {
    /// Create a tracker using the inverse-compositional variant.
    pub fn new(window_size: usize, max_iterations: usize, epsilon: f32, max_levels: usize) -> Self {
        Self::with_method(window_size, max_iterations, epsilon, max_levels, LkMethod::InverseCompositional)
    }

    pub fn with_method(
        window_size: usize,
        max_iterations: usize,
        epsilon: f32,
        max_levels: usize,
        method: LkMethod,
    ) -> Self {
        LkTracker { window_size, max_iterations, epsilon, max_levels, method }
    }

    /// Track `points` from `prev` to `curr`, starting from zero flow.
    pub fn track(&self, prev: &Pyramid, curr: &Pyramid, points: &[Point2]) -> Vec<FlowPoint> {
        points
            .iter()
            .map(|p| self.track_single(prev, curr, *p, *p))
            .collect()
    }

    /// Track `points` from `prev` to `curr`, starting each point from the
    /// matching entry of `guesses` (positions in the current frame).
    ///
    /// # Panics
    /// Panics if the two slices differ in length.
    pub fn track_with_guess(
        &self,
        prev: &Pyramid,
        curr: &Pyramid,
        points: &[Point2],
        guesses: &[Point2],
    ) -> Vec<FlowPoint> {
        assert_eq!(points.len(), guesses.len(), "one guess per point");
        points
            .iter()
            .zip(guesses)
            .map(|(p, g)| self.track_single(prev, curr, *p, *g))
            .collect()
    }

    /// Track a single point through the pyramid, coarse-to-fine.
    fn track_single(&self, prev_pyr: &Pyramid, curr_pyr: &Pyramid, point: Point2, guess: Point2) -> FlowPoint {
        let num_levels = self
            .max_levels
            .min(prev_pyr.num_levels())
            .min(curr_pyr.num_levels())
            .max(1);

        let top_scale = 1.0 / (1u32 << (num_levels - 1)) as f32;
        let mut dx = (guess.x - point.x) * top_scale;
        let mut dy = (guess.y - point.y) * top_scale;

        for level in (0..num_levels).rev() {
            let prev_img = prev_pyr.level(level);
            let curr_img = curr_pyr.level(level);

            let scale = 1.0 / (1u32 << level) as f32;
            let px = point.x * scale;
            let py = point.y * scale;

            // Bilinear sampling clamps at the border, so a window that
            // slides off the frame sees flat pixels and ends up singular.
            let result = match self.method {
                LkMethod::ForwardAdditive => self.lk_forward_additive(prev_img, curr_img, px, py, dx, dy),
                LkMethod::InverseCompositional => self.lk_inverse_compositional(prev_img, curr_img, px, py, dx, dy),
            };

            match result {
                LkResult::Converged(ndx, ndy) | LkResult::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkResult::Singular => {
                    return FlowPoint {
                        point: Point2::new(point.x + dx / scale, point.y + dy / scale),
                        status: TrackStatus::Lost,
                        error: f32::INFINITY,
                    };
                }
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let tracked = Point2::new(point.x + dx, point.y + dy);
        let base = curr_pyr.level(0);
        let (w, h) = (base.width() as f32, base.height() as f32);
        if !(tracked.x >= 0.0 && tracked.x < w && tracked.y >= 0.0 && tracked.y < h) {
            return FlowPoint { point: tracked, status: TrackStatus::OutOfBounds, error: f32::INFINITY };
        }

        let error = self.residual(prev_pyr.level(0), base, point, tracked);
        FlowPoint { point: tracked, status: TrackStatus::Tracked, error }
    }

    /// Mean absolute difference between the windows around `from` in
    /// `prev` and around `to` in `curr`.
    fn residual(&self, prev: &Image<f32>, curr: &Image<f32>, from: Point2, to: Point2) -> f32 {
        let half = self.window_size as isize;
        let mut total = 0.0f32;
        for oy in -half..=half {
            for ox in -half..=half {
                let (fx, fy) = (ox as f32, oy as f32);
                let t = interpolate_bilinear(prev, from.x + fx, from.y + fy);
                let i = interpolate_bilinear(curr, to.x + fx, to.y + fy);
                total += (t - i).abs();
            }
        }
        let side = 2 * self.window_size + 1;
        total / (side * side) as f32
    }

    fn window_area(&self) -> f32 {
        let side = 2 * self.window_size + 1;
        (side * side) as f32
    }

    /// Solve H * delta = b after checking the smallest eigenvalue of H.
    fn solve(&self, h00: f32, h01: f32, h11: f32, b0: f32, b1: f32) -> Option<(f32, f32)> {
        let trace = h00 + h11;
        let disc = ((h00 - h11) * (h00 - h11) + 4.0 * h01 * h01).sqrt();
        let min_eig = (trace - disc) / (2.0 * self.window_area());
        let det = h00 * h11 - h01 * h01;
        if min_eig < MIN_EIGEN_THRESHOLD || det.abs() < f32::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        Some((inv_det * (h11 * b0 - h01 * b1), inv_det * (h00 * b1 - h01 * b0)))
    }

    /// Iterative forward-additive Lucas-Kanade at a single pyramid level.
    fn lk_forward_additive(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        px: f32,
        py: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let half = self.window_size as isize;

        for _ in 0..self.max_iterations {
            let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            for oy in -half..=half {
                for ox in -half..=half {
                    let (fx, fy) = (ox as f32, oy as f32);
                    let t = interpolate_bilinear(prev_img, px + fx, py + fy);
                    let wx = px + dx + fx;
                    let wy = py + dy + fy;
                    let e = t - interpolate_bilinear(curr_img, wx, wy);

                    let gx = 0.5
                        * (interpolate_bilinear(curr_img, wx + 1.0, wy) - interpolate_bilinear(curr_img, wx - 1.0, wy));
                    let gy = 0.5
                        * (interpolate_bilinear(curr_img, wx, wy + 1.0) - interpolate_bilinear(curr_img, wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let Some((ddx, ddy)) = self.solve(h00, h01, h11, b0, b1) else {
                return LkResult::Singular;
            };
            dx += ddx;
            dy += ddy;

            if ddx * ddx + ddy * ddy < self.epsilon * self.epsilon {
                return LkResult::Converged(dx, dy);
            }
        }

        LkResult::MaxIter(dx, dy)
    }

    /// Iterative inverse-compositional Lucas-Kanade at a single pyramid level.
    ///
    /// For pure translation the composed update reduces to the same
    /// additive step as the forward variant; only the gradients differ.
    fn lk_inverse_compositional(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        px: f32,
        py: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let half = self.window_size as isize;
        let side = 2 * self.window_size + 1;
        let mut template = Vec::with_capacity(side * side);
        let mut grads = Vec::with_capacity(side * side);

        let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
        for oy in -half..=half {
            for ox in -half..=half {
                let tx = px + ox as f32;
                let ty = py + oy as f32;
                let gx = 0.5 * (interpolate_bilinear(prev_img, tx + 1.0, ty) - interpolate_bilinear(prev_img, tx - 1.0, ty));
                let gy = 0.5 * (interpolate_bilinear(prev_img, tx, ty + 1.0) - interpolate_bilinear(prev_img, tx, ty - 1.0));
                template.push(interpolate_bilinear(prev_img, tx, ty));
                grads.push((gx, gy));
                h00 += gx * gx;
                h01 += gx * gy;
                h11 += gy * gy;
            }
        }

        for _ in 0..self.max_iterations {
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            let mut idx = 0;
            for oy in -half..=half {
                for ox in -half..=half {
                    let i = interpolate_bilinear(curr_img, px + dx + ox as f32, py + dy + oy as f32);
                    let e = template[idx] - i;
                    let (gx, gy) = grads[idx];
                    b0 += gx * e;
                    b1 += gy * e;
                    idx += 1;
                }
            }

            let Some((ddx, ddy)) = self.solve(h00, h01, h11, b0, b1) else {
                return LkResult::Singular;
            };
            dx += ddx;
            dy += ddy;

            if ddx * ddx + ddy * ddy < self.epsilon * self.epsilon {
                return LkResult::Converged(dx, dy);
            }
        }

        LkResult::MaxIter(dx, dy)
    }
}

/// Internal result of iterative LK at one pyramid level.
enum LkResult {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}
