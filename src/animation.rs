//! Eased viewport transitions driven by host ticks.

use std::time::Duration;

use crate::viewport::Viewport;

/// Timing curve for viewport transitions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
    /// CSS-style cubic bezier through (0,0), (x1,y1), (x2,y2), (1,1)
    CubicBezier(f32, f32, f32, f32),
}

impl Easing {
    /// Map linear progress `t` in `[0, 1]` to eased progress.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::CubicBezier(x1, y1, x2, y2) => {
                let s = solve_bezier_x(t, x1.clamp(0.0, 1.0), x2.clamp(0.0, 1.0));
                bezier_1d(s, y1, y2)
            }
        }
    }
}

/// One coordinate of a cubic bezier with end points fixed at 0 and 1.
fn bezier_1d(s: f32, p1: f32, p2: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
}

fn bezier_1d_slope(s: f32, p1: f32, p2: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * p1 + 6.0 * inv * s * (p2 - p1) + 3.0 * s * s * (1.0 - p2)
}

/// Curve parameter whose x equals `x`: Newton steps, bisection as fallback.
fn solve_bezier_x(x: f32, x1: f32, x2: f32) -> f32 {
    let mut s = x;
    for _ in 0..8 {
        let err = bezier_1d(s, x1, x2) - x;
        if err.abs() < 1e-6 {
            return s;
        }
        let slope = bezier_1d_slope(s, x1, x2);
        if slope.abs() < 1e-6 {
            break;
        }
        s = (s - err / slope).clamp(0.0, 1.0);
    }

    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    s = x;
    for _ in 0..32 {
        let v = bezier_1d(s, x1, x2);
        if (v - x).abs() < 1e-6 {
            break;
        }
        if v < x {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) / 2.0;
    }
    s
}

/// A transition from one viewport to another.
///
/// Pan and zoom are interpolated independently with the same eased progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportAnimation {
    from: Viewport,
    to: Viewport,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
}

impl ViewportAnimation {
    pub fn new(from: Viewport, to: Viewport, duration: Duration, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            easing,
        }
    }

    pub fn target(&self) -> Viewport {
        self.to
    }

    /// Linear progress in `[0, 1]`, before easing.
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Move time forward and return the viewport at the new instant.
    pub fn advance(&mut self, dt: Duration) -> Viewport {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.current()
    }

    /// Interpolated viewport at the current instant.
    pub fn current(&self) -> Viewport {
        if self.is_finished() {
            return self.to;
        }
        let t = self.easing.apply(self.progress());
        Viewport {
            pan: self.from.pan.lerp(self.to.pan, t),
            zoom: self.from.zoom + (self.to.zoom - self.from.zoom) * t,
        }
    }
}
