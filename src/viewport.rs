//! Camera state: pan, zoom and animated navigation.
//!
//! Screen coordinates are pixels in the host's drawing area; canvas
//! coordinates are graph units. The mapping is
//! `canvas = (screen - pan) / zoom`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::animation::{Easing, ViewportAnimation};
use crate::config::ViewportConfig;
use crate::geometry::{Point, Rect, Size};

/// Pan offset (screen pixels) and zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Screen position of the canvas origin
    pub pan: Point,
    /// Screen pixels per canvas unit
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Point::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(pan: Point, zoom: f32) -> Self {
        Self { pan, zoom }
    }

    pub fn screen_to_canvas(&self, p: Point) -> Point {
        (p - self.pan) * (1.0 / self.zoom)
    }

    pub fn canvas_to_screen(&self, p: Point) -> Point {
        p * self.zoom + self.pan
    }
}

/// Owns the camera for one drawing area.
///
/// Zoom always stays inside the configured limits. Animations advance only
/// when the host calls [`ViewportController::advance`].
#[derive(Debug, Clone)]
pub struct ViewportController {
    config: ViewportConfig,
    viewport: Viewport,
    /// Size of the drawing area in screen pixels
    size: Size,
    animation: Option<ViewportAnimation>,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl ViewportController {
    /// Camera at the origin with the configured default zoom.
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            viewport: Viewport::new(Point::ZERO, config.clamp_zoom(config.default_zoom)),
            size: Size::default(),
            animation: None,
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn zoom(&self) -> f32 {
        self.viewport.zoom
    }

    pub fn pan(&self) -> Point {
        self.viewport.pan
    }

    /// Drawing area size in screen pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Resize the drawing area; the pan is kept.
    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    fn screen_center(&self) -> Point {
        Point::new(self.size.width / 2.0, self.size.height / 2.0)
    }

    fn clamped(&self, viewport: Viewport) -> Viewport {
        Viewport::new(viewport.pan, self.config.clamp_zoom(viewport.zoom))
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    pub fn screen_to_canvas(&self, p: Point) -> Point {
        self.viewport.screen_to_canvas(p)
    }

    pub fn canvas_to_screen(&self, p: Point) -> Point {
        self.viewport.canvas_to_screen(p)
    }

    /// Map a screen rectangle into canvas space.
    pub fn screen_rect_to_canvas(&self, rect: Rect) -> Rect {
        Rect::from_points(
            self.screen_to_canvas(rect.origin()),
            self.screen_to_canvas(Point::new(rect.right(), rect.bottom())),
        )
    }

    pub fn canvas_rect_to_screen(&self, rect: Rect) -> Rect {
        Rect::from_points(
            self.canvas_to_screen(rect.origin()),
            self.canvas_to_screen(Point::new(rect.right(), rect.bottom())),
        )
    }

    /// Canvas area currently on screen.
    pub fn visible_rect(&self) -> Rect {
        self.screen_rect_to_canvas(Rect::from_origin_size(Point::ZERO, self.size))
    }

    // ========================================================================
    // Immediate navigation
    // ========================================================================
    //
    // Every immediate change cancels a running animation.

    /// Jump to a viewport. Zoom is clamped.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.stop_animation();
        self.viewport = self.clamped(viewport);
    }

    /// Shift the pan by a screen-space delta.
    pub fn pan_by(&mut self, delta: Point) {
        self.stop_animation();
        self.viewport.pan = self.viewport.pan + delta;
    }

    /// Zoom by an additive `delta` about `anchor` (screen), or the centre of
    /// the drawing area. The canvas point under the anchor stays put.
    pub fn zoom_by(&mut self, delta: f32, anchor: Option<Point>) {
        self.zoom_to(self.viewport.zoom + delta, anchor);
    }

    /// Set an absolute zoom about `anchor` (screen), or the centre of the
    /// drawing area.
    pub fn zoom_to(&mut self, zoom: f32, anchor: Option<Point>) {
        self.stop_animation();
        self.viewport = self.zoomed(zoom, anchor.unwrap_or_else(|| self.screen_center()));
    }

    fn zoomed(&self, zoom: f32, anchor: Point) -> Viewport {
        let zoom = self.config.clamp_zoom(zoom);
        let fixed = self.screen_to_canvas(anchor);
        Viewport::new(anchor - fixed * zoom, zoom)
    }

    /// Back to the origin at the default zoom.
    pub fn reset_viewport(&mut self) {
        self.set_viewport(Viewport::new(Point::ZERO, self.config.default_zoom));
    }

    /// Put a canvas point at the centre of the drawing area, keeping zoom.
    pub fn center_on(&mut self, point: Point) {
        self.stop_animation();
        self.viewport = self.centered(point, self.viewport.zoom);
    }

    fn centered(&self, point: Point, zoom: f32) -> Viewport {
        let zoom = self.config.clamp_zoom(zoom);
        Viewport::new(self.screen_center() - point * zoom, zoom)
    }

    /// Zoom and pan so `rect` grown by `padding` canvas units fills the
    /// drawing area along its tighter axis, centred along the other.
    pub fn fit_rect(&mut self, rect: Rect, padding: f32) {
        self.stop_animation();
        self.viewport = self.fitted(rect, padding);
    }

    fn fitted(&self, rect: Rect, padding: f32) -> Viewport {
        let target = rect.expand(padding.max(0.0));
        let scale = |available: f32, extent: f32| {
            if extent > 0.0 {
                available / extent
            } else {
                f32::INFINITY
            }
        };
        let zoom = scale(self.size.width, target.width).min(scale(self.size.height, target.height));
        let zoom = if zoom.is_finite() && zoom > 0.0 {
            zoom
        } else {
            self.viewport.zoom
        };
        self.centered(target.center(), zoom)
    }

    // ========================================================================
    // Animated navigation
    // ========================================================================

    /// Start a transition, superseding any running one from wherever it
    /// currently is. A zero duration jumps straight to the target.
    pub fn animate_to_viewport(&mut self, target: Viewport, duration: Duration, easing: Easing) {
        let target = self.clamped(target);
        if self.animation.take().is_some() {
            debug!(?target, "viewport animation superseded");
        }
        if duration.is_zero() {
            self.viewport = target;
            return;
        }
        debug!(?target, ?duration, "viewport animation started");
        self.animation = Some(ViewportAnimation::new(self.viewport, target, duration, easing));
    }

    /// Animate the zoom about the centre of the drawing area.
    pub fn animate_to_scale(&mut self, zoom: f32, duration: Duration, easing: Easing) {
        let target = self.zoomed(zoom, self.screen_center());
        self.animate_to_viewport(target, duration, easing);
    }

    /// Animate the pan so a canvas point ends up centred.
    pub fn animate_to_position(&mut self, point: Point, duration: Duration, easing: Easing) {
        let target = self.centered(point, self.viewport.zoom);
        self.animate_to_viewport(target, duration, easing);
    }

    /// Animated [`fit_rect`](Self::fit_rect).
    pub fn animate_to_bounds(&mut self, rect: Rect, padding: f32, duration: Duration, easing: Easing) {
        let target = self.fitted(rect, padding);
        self.animate_to_viewport(target, duration, easing);
    }

    /// Advance the running animation; returns true while it is still running.
    pub fn advance(&mut self, dt: Duration) -> bool {
        let Some(animation) = self.animation.as_mut() else {
            return false;
        };
        self.viewport = animation.advance(dt);
        if animation.is_finished() {
            self.animation = None;
            return false;
        }
        true
    }

    /// Freeze at the current interpolated state.
    pub fn stop_animation(&mut self) {
        if self.animation.take().is_some() {
            debug!(viewport = ?self.viewport, "viewport animation stopped");
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Where the running animation will end, if any.
    pub fn animation_target(&self) -> Option<Viewport> {
        self.animation.map(|a| a.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ViewportController {
        let mut vc = ViewportController::default();
        vc.set_size(Size::new(800.0, 600.0));
        vc
    }

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    #[test]
    fn test_transform_round_trip() {
        let mut vc = controller();
        vc.set_viewport(Viewport::new(Point::new(30.0, -20.0), 2.0));
        let canvas = Point::new(12.5, 40.0);
        let screen = vc.canvas_to_screen(canvas);
        assert_eq!(screen, Point::new(55.0, 60.0));
        assert!(approx(vc.screen_to_canvas(screen), canvas));
    }

    #[test]
    fn test_visible_rect() {
        let mut vc = controller();
        vc.set_viewport(Viewport::new(Point::new(-100.0, 0.0), 2.0));
        let r = vc.visible_rect();
        assert!(approx(r.origin(), Point::new(50.0, 0.0)));
        assert!((r.width - 400.0).abs() < 1e-3 && (r.height - 300.0).abs() < 1e-3);
    }

    // ========================================================================
    // Zoom
    // ========================================================================

    #[test]
    fn test_zoom_is_clamped_silently() {
        let mut vc = controller();
        vc.zoom_to(100.0, None);
        assert_eq!(vc.zoom(), 4.0);
        vc.zoom_by(-50.0, None);
        assert_eq!(vc.zoom(), 0.1);
        vc.zoom_to(f32::NAN, None);
        assert_eq!(vc.zoom(), 1.0);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut vc = controller();
        vc.pan_by(Point::new(40.0, 10.0));
        let anchor = Point::new(200.0, 150.0);
        let before = vc.screen_to_canvas(anchor);
        vc.zoom_by(0.5, Some(anchor));
        assert_eq!(vc.zoom(), 1.5);
        assert!(approx(vc.screen_to_canvas(anchor), before));

        let centre = vc.screen_to_canvas(Point::new(400.0, 300.0));
        vc.zoom_by(-0.25, None);
        assert!(approx(vc.screen_to_canvas(Point::new(400.0, 300.0)), centre));
    }

    #[test]
    fn test_reset_and_center() {
        let mut vc = controller();
        vc.set_viewport(Viewport::new(Point::new(5.0, 5.0), 3.0));
        vc.reset_viewport();
        assert_eq!(vc.viewport(), Viewport::default());
        vc.center_on(Point::new(100.0, 100.0));
        assert!(approx(vc.canvas_to_screen(Point::new(100.0, 100.0)), Point::new(400.0, 300.0)));
    }

    #[test]
    fn test_fit_rect_tighter_axis() {
        let mut vc = controller();
        // 700 x 200 plus 50 each side is 800 x 300: width is the tight axis
        vc.fit_rect(Rect::new(100.0, 100.0, 700.0, 200.0), 50.0);
        assert!((vc.zoom() - 1.0).abs() < 1e-4);
        let screen = vc.canvas_rect_to_screen(Rect::new(50.0, 50.0, 800.0, 300.0));
        assert!(approx(screen.origin(), Point::new(0.0, 150.0)));
    }

    #[test]
    fn test_fit_degenerate_rect_keeps_zoom() {
        let mut vc = controller();
        vc.zoom_to(2.0, None);
        vc.fit_rect(Rect::new(10.0, 10.0, 0.0, 0.0), 0.0);
        assert_eq!(vc.zoom(), 2.0);
        assert!(approx(vc.canvas_to_screen(Point::new(10.0, 10.0)), Point::new(400.0, 300.0)));
    }

    // ========================================================================
    // Animation
    // ========================================================================

    #[test]
    fn test_second_scale_animation_supersedes_first() {
        let mut vc = controller();
        vc.animate_to_scale(2.0, Duration::from_millis(400), Easing::EaseInOut);
        vc.animate_to_scale(0.5, Duration::from_millis(400), Easing::EaseInOut);
        while vc.advance(Duration::from_millis(16)) {}
        assert!((vc.zoom() - 0.5).abs() < 1e-4);
        assert!(!vc.is_animating());
    }

    #[test]
    fn test_supersession_starts_from_current_state() {
        let mut vc = controller();
        vc.animate_to_scale(3.0, Duration::from_millis(400), Easing::Linear);
        assert!(vc.advance(Duration::from_millis(200)));
        let mid = vc.zoom();
        assert!((mid - 2.0).abs() < 1e-3);

        vc.animate_to_scale(1.0, Duration::from_millis(100), Easing::Linear);
        assert_eq!(vc.zoom(), mid);
        assert_eq!(vc.animation_target().map(|v| v.zoom), Some(1.0));
        assert!(!vc.advance(Duration::from_millis(100)));
        assert!((vc.zoom() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_duration_and_stop() {
        let mut vc = controller();
        vc.animate_to_position(Point::new(0.0, 0.0), Duration::ZERO, Easing::Linear);
        assert!(!vc.is_animating());
        assert_eq!(vc.pan(), Point::new(400.0, 300.0));

        vc.animate_to_bounds(Rect::new(0.0, 0.0, 100.0, 100.0), 0.0, Duration::from_secs(1), Easing::EaseOut);
        vc.advance(Duration::from_millis(100));
        vc.pan_by(Point::new(1.0, 0.0));
        assert!(!vc.is_animating());
        assert!(!vc.advance(Duration::from_millis(100)));
    }
}
