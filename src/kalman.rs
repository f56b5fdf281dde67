// kalman.rs -- Constant-velocity Kalman filter over the target rectangle.
//
// State `[cx, cy, vx, vy, w, h]`, measurement `[cx, cy, w, h]`. Velocity is
// in pixels per second; the time step comes from a monotonic clock between
// successive predictions. After `LOST_LIMIT` consecutive predictions
// without a measurement the filter stops extrapolating and reports the
// zero rectangle until a measurement arrives again.

use std::time::Instant;

use log::{trace, warn};
use nalgebra::{SMatrix, SVector, Vector4};

use crate::rect::Rect;

/// Consecutive measurement-less predictions before the filter goes quiet.
pub const LOST_LIMIT: u32 = 50;

type State = SVector<f32, 6>;
type StateCov = SMatrix<f32, 6, 6>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    x: State,
    p: StateCov,
    f: StateCov,
    h: SMatrix<f32, 4, 6>,
    q: StateCov,
    r: SMatrix<f32, 4, 4>,
    last_tick: Option<Instant>,
    lost: u32,
    initialized: bool,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut h = SMatrix::<f32, 4, 6>::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        h[(2, 4)] = 1.0;
        h[(3, 5)] = 1.0;

        KalmanFilter {
            x: State::zeros(),
            p: StateCov::zeros(),
            f: StateCov::identity(),
            h,
            q: StateCov::from_diagonal(&State::from_column_slice(&[1e-2, 1e-2, 5.0, 5.0, 1e-2, 1e-2])),
            r: SMatrix::<f32, 4, 4>::identity() * 1e-1,
            last_tick: None,
            lost: 0,
            initialized: false,
        }
    }

    /// Forget the target: state, covariance, clock and lost counter.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Consecutive predictions without a measurement.
    pub fn lost_count(&self) -> u32 {
        self.lost
    }

    pub fn state(&self) -> &SVector<f32, 6> {
        &self.x
    }

    /// Predict the current rectangle, then fold in `measurement` when it
    /// has positive area.
    pub fn predict(&mut self, measurement: Rect) -> Rect {
        self.predict_at(measurement, Instant::now())
    }

    /// Same as `predict` with an explicit clock reading. The first call
    /// after a reset uses a zero time step.
    pub fn predict_at(&mut self, measurement: Rect, now: Instant) -> Rect {
        let dt = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let mut predicted = Rect::zero();
        if self.initialized && self.lost < LOST_LIMIT {
            self.f[(0, 2)] = dt;
            self.f[(1, 3)] = dt;
            self.x = self.f * self.x;
            self.p = self.f * self.p * self.f.transpose() + self.q;
            predicted = self.state_rect();
            trace!("kalman dt={dt:.4}s predicted {predicted}");
        }

        if measurement.area() > 0 {
            let z = Vector4::new(
                measurement.x as f32 + measurement.width as f32 / 2.0,
                measurement.y as f32 + measurement.height as f32 / 2.0,
                measurement.width as f32,
                measurement.height as f32,
            );
            if self.initialized {
                self.correct(&z);
            } else {
                self.x = State::from_column_slice(&[z[0], z[1], 0.0, 0.0, z[2], z[3]]);
                self.p = StateCov::identity();
                self.initialized = true;
            }
            self.lost = 0;
        } else {
            self.lost = self.lost.saturating_add(1);
        }

        predicted
    }

    fn correct(&mut self, z: &Vector4<f32>) {
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            warn!("kalman innovation covariance is singular, skipping correction");
            return;
        };
        let k = self.p * self.h.transpose() * s_inv;
        self.x += k * y;
        self.p = (StateCov::identity() - k * self.h) * self.p;
    }

    fn state_rect(&self) -> Rect {
        let w = self.x[4].round() as i32;
        let h = self.x[5].round() as i32;
        if w <= 0 || h <= 0 {
            return Rect::zero();
        }
        let x = (self.x[0] - self.x[4] / 2.0).round() as i32;
        let y = (self.x[1] - self.x[5] / 2.0).round() as i32;
        Rect::new(x, y, w, h)
    }
}
