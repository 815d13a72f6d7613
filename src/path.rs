//! Routed connection paths and the geometry queries run against them.
//!
//! A [`RoutedPath`] is a chain of line, quadratic and cubic segments. It is
//! flattened once on construction; length, arc-length sampling, hit distance
//! and bounds all work on that polyline, the same sampling approach the
//! hit-tester uses for curves.

use std::fmt::Write as _;

use crate::geometry::{distance_to_segment_sq, Point, Rect};

/// One piece of a routed path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    Line {
        from: Point,
        to: Point,
    },
    Quadratic {
        from: Point,
        ctrl: Point,
        to: Point,
    },
    Cubic {
        from: Point,
        ctrl1: Point,
        ctrl2: Point,
        to: Point,
    },
}

impl PathSegment {
    pub fn line(from: Point, to: Point) -> Self {
        PathSegment::Line { from, to }
    }

    pub fn start(&self) -> Point {
        match *self {
            PathSegment::Line { from, .. }
            | PathSegment::Quadratic { from, .. }
            | PathSegment::Cubic { from, .. } => from,
        }
    }

    pub fn end(&self) -> Point {
        match *self {
            PathSegment::Line { to, .. }
            | PathSegment::Quadratic { to, .. }
            | PathSegment::Cubic { to, .. } => to,
        }
    }

    /// Evaluate the segment at parameter t (0.0 to 1.0)
    pub fn eval(&self, t: f32) -> Point {
        match *self {
            PathSegment::Line { from, to } => from.lerp(to, t),
            PathSegment::Quadratic { from, ctrl, to } => {
                let mt = 1.0 - t;
                from * (mt * mt) + ctrl * (2.0 * mt * t) + to * (t * t)
            }
            PathSegment::Cubic {
                from,
                ctrl1,
                ctrl2,
                to,
            } => {
                let t2 = t * t;
                let t3 = t2 * t;
                let mt = 1.0 - t;
                let mt2 = mt * mt;
                let mt3 = mt2 * mt;
                from * mt3 + ctrl1 * (3.0 * mt2 * t) + ctrl2 * (3.0 * mt * t2) + to * t3
            }
        }
    }

    pub fn is_curve(&self) -> bool {
        !matches!(self, PathSegment::Line { .. })
    }

    /// Append the flattened samples of this segment, excluding its start point.
    fn flatten_into(&self, samples: usize, out: &mut Vec<Point>) {
        if !self.is_curve() {
            out.push(self.end());
            return;
        }
        for i in 1..=samples {
            out.push(self.eval(i as f32 / samples as f32));
        }
    }

    fn write_svg(&self, out: &mut String) {
        // Writing to a String cannot fail
        let _ = match *self {
            PathSegment::Line { to, .. } => write!(out, " L {} {}", to.x, to.y),
            PathSegment::Quadratic { ctrl, to, .. } => {
                write!(out, " Q {} {} {} {}", ctrl.x, ctrl.y, to.x, to.y)
            }
            PathSegment::Cubic {
                ctrl1, ctrl2, to, ..
            } => write!(
                out,
                " C {} {} {} {} {} {}",
                ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y
            ),
        };
    }
}

/// The output of the router for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPath {
    segments: Vec<PathSegment>,
    polyline: Vec<Point>,
    /// Arc length from the start to each polyline vertex
    cumulative: Vec<f32>,
}

impl RoutedPath {
    /// Build a path, flattening each curved segment into `samples` pieces.
    pub fn new(segments: Vec<PathSegment>, samples: usize) -> Self {
        let samples = samples.max(1);
        let mut polyline = Vec::with_capacity(segments.len() * samples + 1);
        if let Some(first) = segments.first() {
            polyline.push(first.start());
        }
        for segment in &segments {
            segment.flatten_into(samples, &mut polyline);
        }

        let mut cumulative = Vec::with_capacity(polyline.len());
        let mut total = 0.0;
        for (i, p) in polyline.iter().enumerate() {
            if i > 0 {
                total += polyline[i - 1].distance(*p);
            }
            cumulative.push(total);
        }

        Self {
            segments,
            polyline,
            cumulative,
        }
    }

    /// Zero-length path sitting on a single point.
    pub fn point(at: Point) -> Self {
        Self::new(vec![PathSegment::line(at, at)], 1)
    }

    /// Chain of straight segments through `points`.
    pub fn from_polyline(points: &[Point]) -> Self {
        match points {
            [] => Self::new(Vec::new(), 1),
            [only] => Self::point(*only),
            _ => Self::new(
                points
                    .windows(2)
                    .map(|w| PathSegment::line(w[0], w[1]))
                    .collect(),
                1,
            ),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Flattened samples of the whole path, start and end included.
    pub fn polyline(&self) -> &[Point] {
        &self.polyline
    }

    pub fn start(&self) -> Point {
        self.polyline.first().copied().unwrap_or(Point::ZERO)
    }

    pub fn end(&self) -> Point {
        self.polyline.last().copied().unwrap_or(Point::ZERO)
    }

    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Point at fraction `t` of the path's arc length.
    pub fn point_at(&self, t: f32) -> Point {
        match self.locate(t) {
            Some((i, local)) => self.polyline[i].lerp(self.polyline[i + 1], local),
            None => self.start(),
        }
    }

    pub fn midpoint(&self) -> Point {
        self.point_at(0.5)
    }

    /// Unit direction of travel at fraction `t` of the arc length.
    ///
    /// Zero-length paths have no direction and return [`Point::ZERO`].
    pub fn tangent_at(&self, t: f32) -> Point {
        let Some((i, _)) = self.locate(t) else {
            return Point::ZERO;
        };
        let piece = |j: usize| self.polyline[j + 1] - self.polyline[j];
        let direction = piece(i);
        if direction.length() > f32::EPSILON {
            return direction.normalized();
        }
        // Skip over zero-length pieces, searching forward then backward
        (i + 1..self.polyline.len() - 1)
            .chain((0..i).rev())
            .map(piece)
            .find(|d| d.length() > f32::EPSILON)
            .map(Point::normalized)
            .unwrap_or(Point::ZERO)
    }

    /// Minimum distance from `point` to the path.
    pub fn distance_to(&self, point: Point) -> f32 {
        match self.polyline.as_slice() {
            [] => f32::MAX,
            [only] => only.distance(point),
            pts => pts
                .windows(2)
                .map(|w| distance_to_segment_sq(point, w[0], w[1]))
                .fold(f32::MAX, f32::min)
                .sqrt(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::bounding_points(self.polyline.iter().copied())
            .unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0))
    }

    /// SVG path data ("M x y L ... Q ... C ...") for the rendering layer.
    pub fn to_svg_path(&self) -> String {
        let mut out = String::new();
        let mut cursor: Option<Point> = None;
        for segment in &self.segments {
            let start = segment.start();
            if cursor.map_or(true, |c| !c.approx_eq(start)) {
                if !out.is_empty() {
                    out.push(' ');
                }
                let _ = write!(out, "M {} {}", start.x, start.y);
            }
            segment.write_svg(&mut out);
            cursor = Some(segment.end());
        }
        out
    }

    /// Polyline piece index and local fraction for arc-length fraction `t`.
    fn locate(&self, t: f32) -> Option<(usize, f32)> {
        if self.polyline.len() < 2 {
            return None;
        }
        let total = self.length();
        let last_piece = self.polyline.len() - 2;
        if total <= f32::EPSILON {
            return Some((0, 0.0));
        }
        let target = t.clamp(0.0, 1.0) * total;
        // First vertex strictly beyond the target distance ends the piece
        let end = self
            .cumulative
            .partition_point(|d| *d <= target)
            .clamp(1, last_piece + 1);
        let i = end - 1;
        let piece_len = self.cumulative[end] - self.cumulative[i];
        let local = if piece_len > f32::EPSILON {
            ((target - self.cumulative[i]) / piece_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some((i, local))
    }
}
