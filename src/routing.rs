//! Connection routing for every [`ConnectionStyle`].
//!
//! The router is a pure function of the two anchors (point, facing side and
//! owning node rectangle), the style, the control points and a
//! [`RouterConfig`]. It never fails: degenerate input yields a short or
//! zero-length path.

use tracing::trace;

use crate::config::RouterConfig;
use crate::geometry::{Point, Rect, Side, EPSILON};
use crate::model::ConnectionStyle;
use crate::path::{PathSegment, RoutedPath};

/// Where a connection meets a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Port position in canvas coordinates
    pub point: Point,
    /// Side the port sits on; the path leaves in this direction
    pub side: Side,
    /// Rectangle of the owning node, kept clear by orthogonal paths
    pub node_rect: Rect,
}

impl Anchor {
    pub fn new(point: Point, side: Side, node_rect: Rect) -> Self {
        Self {
            point,
            side,
            node_rect,
        }
    }

    /// End of the straight stub that leaves the port.
    fn extended(&self, distance: f32) -> Point {
        self.point + self.side.direction() * distance
    }
}

/// Computes connection paths with a fixed [`RouterConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionRouter {
    config: RouterConfig,
}

impl ConnectionRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Path from `source` to `target` in the given style.
    ///
    /// `control_points` only shape [`ConnectionStyle::Editable`] paths; the
    /// other styles ignore them.
    pub fn route(
        &self,
        source: &Anchor,
        target: &Anchor,
        style: ConnectionStyle,
        control_points: &[Point],
    ) -> RoutedPath {
        trace!(?style, from = ?source.point, to = ?target.point, "routing connection");
        let segments = match style {
            ConnectionStyle::Straight => vec![PathSegment::line(source.point, target.point)],
            ConnectionStyle::Bezier => self.bezier(source, target),
            ConnectionStyle::Step => sharp_segments(&self.orthogonal_corners(source, target)),
            ConnectionStyle::SmoothStep => rounded_segments(
                &self.orthogonal_corners(source, target),
                self.config.corner_radius,
            ),
            ConnectionStyle::Editable if control_points.is_empty() => rounded_segments(
                &self.orthogonal_corners(source, target),
                self.config.corner_radius,
            ),
            ConnectionStyle::Editable => rounded_segments(
                &self.editable_corners(source, target, control_points),
                self.config.corner_radius,
            ),
        };
        RoutedPath::new(segments, self.config.hit_samples)
    }

    /// Cubic curve bowing out of each port along its facing direction.
    fn bezier(&self, source: &Anchor, target: &Anchor) -> Vec<PathSegment> {
        let (s, t) = (source.point, target.point);
        // If the anchors are very close, use a straight line to avoid zig-zags
        if s.distance(t) < self.config.straight_threshold {
            return vec![PathSegment::line(s, t)];
        }

        let offset_for = |anchor: &Anchor| {
            let axis_distance = if anchor.side.is_horizontal() {
                (t.x - s.x).abs()
            } else {
                (t.y - s.y).abs()
            };
            (axis_distance * 0.5).max(self.config.bezier_min_offset) * self.config.curvature
        };

        vec![PathSegment::Cubic {
            from: s,
            ctrl1: s + source.side.direction() * offset_for(source),
            ctrl2: t + target.side.direction() * offset_for(target),
            to: t,
        }]
    }

    /// Corner points of the orthogonal path between two anchors, anchors included.
    ///
    /// Tries the direct candidates first and keeps the one with the fewest
    /// bends (then the shortest) that stays out of both node rectangles.
    /// When none qualifies the path walks around the nodes. Loopbacks keep
    /// at least `back_edge_gap` of clearance on both stubs.
    pub fn orthogonal_corners(&self, source: &Anchor, target: &Anchor) -> Vec<Point> {
        let ext = if is_loopback(source, target, self.config.port_extension) {
            self.config.back_edge_gap.max(self.config.port_extension)
        } else {
            self.config.port_extension
        };
        let (s0, t0) = (source.point, target.point);
        let (s1, t1) = (source.extended(ext), target.extended(ext));
        let obstacles = [source.node_rect, target.node_rect];

        let mut best: Option<(usize, f32, Vec<Point>)> = None;
        for middle in direct_candidates(source, target, s1, t1) {
            let mut points = Vec::with_capacity(middle.len() + 2);
            points.push(s0);
            points.extend(middle);
            points.push(t0);
            let points = simplify(&points);

            if has_backtrack(&points) || crosses_any(&points, &obstacles) {
                continue;
            }
            let bends = points.len().saturating_sub(2);
            let length = polyline_length(&points);
            let better = match &best {
                None => true,
                Some((b, l, _)) => bends < *b || (bends == *b && length < *l - EPSILON),
            };
            if better {
                best = Some((bends, length, points));
            }
        }

        match best {
            Some((_, _, points)) => points,
            None => {
                trace!("no direct orthogonal route, walking around the nodes");
                self.perimeter_walk(source, target)
            }
        }
    }

    /// Loopback route along the rectangle enclosing both nodes.
    fn perimeter_walk(&self, source: &Anchor, target: &Anchor) -> Vec<Point> {
        let gap = self.config.back_edge_gap.max(self.config.port_extension);
        let outer = source.node_rect.union(&target.node_rect).expand(gap);
        let exit = project_to_border(&outer, source);
        let entry = project_to_border(&outer, target);

        let build = |corners: Vec<Point>| {
            let mut points = Vec::with_capacity(corners.len() + 4);
            points.push(source.point);
            points.push(exit);
            points.extend(corners);
            points.push(entry);
            points.push(target.point);
            simplify(&points)
        };
        let clockwise = build(perimeter_corners(&outer, exit, source.side, entry, target.side, true));
        let counter = build(perimeter_corners(&outer, exit, source.side, entry, target.side, false));

        let (cw_len, ccw_len) = (polyline_length(&clockwise), polyline_length(&counter));
        if (cw_len - ccw_len).abs() > EPSILON {
            return if cw_len < ccw_len { clockwise } else { counter };
        }
        // Equal length: prefer the walk reaching further down, then further right
        let reach = |pts: &[Point]| {
            pts.iter().fold((f32::MIN, f32::MIN), |(y, x), p| (y.max(p.y), x.max(p.x)))
        };
        let (cw_y, cw_x) = reach(&clockwise);
        let (ccw_y, ccw_x) = reach(&counter);
        if ccw_y > cw_y + EPSILON || ((ccw_y - cw_y).abs() <= EPSILON && ccw_x > cw_x + EPSILON) {
            counter
        } else {
            clockwise
        }
    }

    /// Orthogonal corners through user-authored control points.
    fn editable_corners(&self, source: &Anchor, target: &Anchor, control_points: &[Point]) -> Vec<Point> {
        let ext = self.config.port_extension;
        let mut waypoints = Vec::with_capacity(control_points.len() + 2);
        waypoints.push(source.extended(ext));
        waypoints.extend_from_slice(control_points);
        waypoints.push(target.extended(ext));

        let mut points = vec![source.point];
        // Axis of the leg arriving at `prev`
        let mut horizontal = source.side.is_horizontal();
        let mut prev = source.point;
        for &next in &waypoints {
            if !is_axis_aligned(prev, next) {
                // Turn at `prev` so every waypoint is a corner; the leg into
                // `next` then keeps the incoming axis
                let elbow = if horizontal {
                    Point::new(prev.x, next.y)
                } else {
                    Point::new(next.x, prev.y)
                };
                points.push(elbow);
            } else if (next.x - prev.x).abs() > EPSILON {
                horizontal = true;
            } else if (next.y - prev.y).abs() > EPSILON {
                horizontal = false;
            }
            points.push(next);
            prev = next;
        }
        if !is_axis_aligned(prev, target.point) {
            let elbow = if horizontal {
                Point::new(prev.x, target.point.y)
            } else {
                Point::new(target.point.x, prev.y)
            };
            points.push(elbow);
        }
        points.push(target.point);
        simplify(&points)
    }
}

/// Index at which a new control point should be inserted.
///
/// The chain `[source, control_points.., target]` is split at the segment
/// closest to `point`; the first of equally close segments wins.
pub fn control_point_insert_index(
    source: Point,
    control_points: &[Point],
    target: Point,
    point: Point,
) -> usize {
    let mut chain = Vec::with_capacity(control_points.len() + 2);
    chain.push(source);
    chain.extend_from_slice(control_points);
    chain.push(target);

    let mut best = (0, f32::MAX);
    for (i, pair) in chain.windows(2).enumerate() {
        let d = crate::geometry::distance_to_segment_sq(point, pair[0], pair[1]);
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

fn direct_candidates(source: &Anchor, target: &Anchor, s1: Point, t1: Point) -> Vec<Vec<Point>> {
    let mid = s1.lerp(t1, 0.5);
    let mut candidates = vec![
        vec![s1, Point::new(mid.x, s1.y), Point::new(mid.x, t1.y), t1],
        vec![s1, Point::new(s1.x, mid.y), Point::new(t1.x, mid.y), t1],
    ];

    // Lanes through the empty space between the two nodes
    let (a, b) = (source.node_rect, target.node_rect);
    let lane_x = if a.right() < b.left() {
        Some((a.right() + b.left()) / 2.0)
    } else if b.right() < a.left() {
        Some((b.right() + a.left()) / 2.0)
    } else {
        None
    };
    let lane_y = if a.bottom() < b.top() {
        Some((a.bottom() + b.top()) / 2.0)
    } else if b.bottom() < a.top() {
        Some((b.bottom() + a.top()) / 2.0)
    } else {
        None
    };
    if let Some(x) = lane_x {
        candidates.push(vec![s1, Point::new(x, s1.y), Point::new(x, t1.y), t1]);
    }
    if let Some(y) = lane_y {
        candidates.push(vec![s1, Point::new(s1.x, y), Point::new(t1.x, y), t1]);
    }

    candidates.push(vec![s1, Point::new(t1.x, s1.y), t1]);
    candidates.push(vec![s1, Point::new(s1.x, t1.y), t1]);
    candidates
}

/// Point where the anchor's outward ray meets the border of `outer`.
fn project_to_border(outer: &Rect, anchor: &Anchor) -> Point {
    let p = anchor.point;
    let x = p.x.clamp(outer.left(), outer.right());
    let y = p.y.clamp(outer.top(), outer.bottom());
    match anchor.side {
        Side::Left => Point::new(outer.left(), y),
        Side::Right => Point::new(outer.right(), y),
        Side::Top => Point::new(x, outer.top()),
        Side::Bottom => Point::new(x, outer.bottom()),
    }
}

/// Clockwise distance along the border from the top-left corner.
fn perimeter_position(r: &Rect, p: Point, side: Side) -> f32 {
    match side {
        Side::Top => p.x - r.left(),
        Side::Right => r.width + (p.y - r.top()),
        Side::Bottom => r.width + r.height + (r.right() - p.x),
        Side::Left => 2.0 * r.width + r.height + (r.bottom() - p.y),
    }
}

/// Rectangle corners passed when walking the border from `from` to `to`.
fn perimeter_corners(
    r: &Rect,
    from: Point,
    from_side: Side,
    to: Point,
    to_side: Side,
    clockwise: bool,
) -> Vec<Point> {
    let perimeter = 2.0 * (r.width + r.height);
    if perimeter <= EPSILON {
        return Vec::new();
    }
    let start = perimeter_position(r, from, from_side);
    let end = perimeter_position(r, to, to_side);
    let corners = [
        (0.0, Point::new(r.left(), r.top())),
        (r.width, Point::new(r.right(), r.top())),
        (r.width + r.height, Point::new(r.right(), r.bottom())),
        (2.0 * r.width + r.height, Point::new(r.left(), r.bottom())),
    ];

    let along = |pos: f32| {
        if clockwise {
            (pos - start).rem_euclid(perimeter)
        } else {
            (start - pos).rem_euclid(perimeter)
        }
    };
    let span = along(end);
    let mut passed: Vec<(f32, Point)> = corners
        .iter()
        .map(|&(pos, corner)| (along(pos), corner))
        .filter(|&(d, _)| d > EPSILON && d < span - EPSILON)
        .collect();
    passed.sort_by(|a, b| a.0.total_cmp(&b.0));
    passed.into_iter().map(|(_, corner)| corner).collect()
}

/// Drop repeated points and points in the middle of a straight run.
fn simplify(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_some_and(|last| last.approx_eq(p)) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let straight = crate::geometry::orientation(a, b, p).abs() < EPSILON;
            if straight && (b - a).dot(p - b) > 0.0 {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

/// True when the path reverses onto itself at some vertex.
/// Same node, or the stubs point away from each other so the path has
/// to come back around a node.
fn is_loopback(source: &Anchor, target: &Anchor, ext: f32) -> bool {
    if source.node_rect == target.node_rect {
        return true;
    }
    let (s1, t1) = (source.extended(ext), target.extended(ext));
    (t1 - s1).dot(source.side.direction()) < 0.0 || (s1 - t1).dot(target.side.direction()) < 0.0
}

fn has_backtrack(points: &[Point]) -> bool {
    points.windows(3).any(|w| {
        let (a, b, c) = (w[0], w[1], w[2]);
        crate::geometry::orientation(a, b, c).abs() < EPSILON && (b - a).dot(c - b) < 0.0
    })
}

fn crosses_any(points: &[Point], obstacles: &[Rect]) -> bool {
    points.windows(2).any(|leg| {
        obstacles
            .iter()
            .any(|rect| rect.segment_crosses_interior(leg[0], leg[1]))
    })
}

fn is_axis_aligned(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < EPSILON || (a.y - b.y).abs() < EPSILON
}

fn polyline_length(points: &[Point]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

fn sharp_segments(points: &[Point]) -> Vec<PathSegment> {
    match points {
        [] => Vec::new(),
        [only] => vec![PathSegment::line(*only, *only)],
        _ => points
            .windows(2)
            .map(|w| PathSegment::line(w[0], w[1]))
            .collect(),
    }
}

/// Lines joined by quadratic corners of radius `min(radius, half of each adjacent leg)`.
fn rounded_segments(points: &[Point], radius: f32) -> Vec<PathSegment> {
    if points.len() < 3 || radius <= EPSILON {
        return sharp_segments(points);
    }

    let mut segments = Vec::with_capacity(points.len() * 2);
    let mut cursor = points[0];
    for w in points.windows(3) {
        let (prev, corner, next) = (w[0], w[1], w[2]);
        let r = radius
            .min(prev.distance(corner) / 2.0)
            .min(corner.distance(next) / 2.0);
        if r <= EPSILON {
            segments.push(PathSegment::line(cursor, corner));
            cursor = corner;
            continue;
        }
        let arc_start = corner - (corner - prev).normalized() * r;
        let arc_end = corner + (next - corner).normalized() * r;
        if !cursor.approx_eq(arc_start) {
            segments.push(PathSegment::line(cursor, arc_start));
        }
        segments.push(PathSegment::Quadratic {
            from: arc_start,
            ctrl: corner,
            to: arc_end,
        });
        cursor = arc_end;
    }
    if let Some(&last) = points.last() {
        if !cursor.approx_eq(last) {
            segments.push(PathSegment::line(cursor, last));
        }
    }
    segments
}
