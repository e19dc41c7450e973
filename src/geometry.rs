use std::f32::consts::PI;

const CURVE_FLATTEN_STEPS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.max_x().max(other.max_x()) - x,
            height: self.max_y().max(other.max_y()) - y,
        }
    }

    pub fn include(&self, p: Point) -> Rect {
        let x = self.x.min(p.x);
        let y = self.y.min(p.y);
        Rect {
            x,
            y,
            width: self.max_x().max(p.x) - x,
            height: self.max_y().max(p.y) - y,
        }
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.max_x() <= self.max_x() + EPS
            && other.max_y() <= self.max_y() + EPS
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// 2x3 affine matrix in SVG order: maps (x, y) to
/// (a*x + c*y + e, b*x + d*y + f).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub const fn translate(tx: f32, ty: f32) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn rotate_deg(angle: f32) -> Self {
        let rad = angle.to_radians();
        let (sin, cos) = rad.sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn rotate_deg_about(angle: f32, cx: f32, cy: f32) -> Self {
        Transform::translate(cx, cy)
            .pre_concat(Transform::rotate_deg(angle))
            .pre_concat(Transform::translate(-cx, -cy))
    }

    pub fn skew_x_deg(angle: f32) -> Self {
        Self {
            c: angle.to_radians().tan(),
            ..Self::identity()
        }
    }

    pub fn skew_y_deg(angle: f32) -> Self {
        Self {
            b: angle.to_radians().tan(),
            ..Self::identity()
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Returns self * other, so `other` is applied to points first.
    pub fn pre_concat(&self, other: Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    pub fn apply_rect(&self, r: &Rect) -> Rect {
        let corners = [
            self.apply(Point::new(r.x, r.y)),
            self.apply(Point::new(r.max_x(), r.y)),
            self.apply(Point::new(r.max_x(), r.max_y())),
            self.apply(Point::new(r.x, r.max_y())),
        ];
        let mut out = Rect::from_points(corners[0], corners[1]);
        out = out.include(corners[2]);
        out.include(corners[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    Nonzero,
    EvenOdd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    Line {
        to: Point,
    },
    Cubic {
        c1: Point,
        c2: Point,
        to: Point,
    },
    Arc {
        rx: f32,
        ry: f32,
        x_rotation: f32,
        large_arc: bool,
        sweep: bool,
        to: Point,
    },
}

impl PathSegment {
    pub fn end_point(&self) -> Point {
        match self {
            PathSegment::Line { to } => *to,
            PathSegment::Cubic { to, .. } => *to,
            PathSegment::Arc { to, .. } => *to,
        }
    }

    /// Direction of travel leaving `from`, in degrees. Curved segments sample
    /// a flattened point near the start.
    pub fn start_tangent_deg(&self, from: Point) -> f32 {
        match self {
            PathSegment::Line { to } => direction_deg(from, *to),
            PathSegment::Cubic { c1, c2, to } => {
                let near = sample_cubic(from, *c1, *c2, *to, 1.0 / CURVE_FLATTEN_STEPS as f32);
                if points_coincide(from, near) {
                    direction_deg(from, *to)
                } else {
                    direction_deg(from, near)
                }
            }
            PathSegment::Arc { .. } => {
                let flat = self.flatten(from);
                match flat.iter().find(|p| !points_coincide(from, **p)) {
                    Some(p) => direction_deg(from, *p),
                    None => 0.0,
                }
            }
        }
    }

    /// Direction of travel arriving at the segment end, in degrees.
    pub fn end_tangent_deg(&self, from: Point) -> f32 {
        match self {
            PathSegment::Line { to } => direction_deg(from, *to),
            PathSegment::Cubic { c1, c2, to } => {
                let t = 1.0 - 1.0 / CURVE_FLATTEN_STEPS as f32;
                let near = sample_cubic(from, *c1, *c2, *to, t);
                if points_coincide(near, *to) {
                    direction_deg(from, *to)
                } else {
                    direction_deg(near, *to)
                }
            }
            PathSegment::Arc { to, .. } => {
                let flat = self.flatten(from);
                let mut prev = from;
                for p in &flat {
                    if !points_coincide(*p, *to) {
                        prev = *p;
                    }
                }
                direction_deg(prev, *to)
            }
        }
    }

    /// Flattened polyline for the segment, excluding the start point.
    pub fn flatten(&self, from: Point) -> Vec<Point> {
        match self {
            PathSegment::Line { to } => vec![*to],
            PathSegment::Cubic { c1, c2, to } => {
                let mut out = Vec::with_capacity(CURVE_FLATTEN_STEPS);
                for step in 1..=CURVE_FLATTEN_STEPS {
                    let t = step as f32 / CURVE_FLATTEN_STEPS as f32;
                    out.push(sample_cubic(from, *c1, *c2, *to, t));
                }
                out
            }
            PathSegment::Arc { .. } => {
                let mut out = Vec::new();
                for cubic in self.arc_to_cubics(from) {
                    let PathSegment::Cubic { c1, c2, to } = cubic else {
                        continue;
                    };
                    let start = out.last().copied().unwrap_or(from);
                    for step in 1..=CURVE_FLATTEN_STEPS {
                        let t = step as f32 / CURVE_FLATTEN_STEPS as f32;
                        out.push(sample_cubic(start, c1, c2, to, t));
                    }
                }
                if out.is_empty() {
                    out.push(self.end_point());
                }
                out
            }
        }
    }

    /// Lowers an arc segment to cubic beziers via the endpoint-to-center
    /// conversion from the SVG implementation notes. Non-arc segments return
    /// themselves.
    pub fn arc_to_cubics(&self, from: Point) -> Vec<PathSegment> {
        let PathSegment::Arc {
            rx,
            ry,
            x_rotation,
            large_arc,
            sweep,
            to,
        } = *self
        else {
            return vec![*self];
        };

        if points_coincide(from, to) {
            return Vec::new();
        }
        let mut rx = rx.abs();
        let mut ry = ry.abs();
        if rx == 0.0 || ry == 0.0 {
            return vec![PathSegment::Line { to }];
        }

        let phi = x_rotation.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let dx2 = (from.x - to.x) / 2.0;
        let dy2 = (from.y - to.y) / 2.0;
        let x1p = cos_phi * dx2 + sin_phi * dy2;
        let y1p = -sin_phi * dx2 + cos_phi * dy2;

        // Scale radii up if they cannot span the endpoints.
        let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
        if lambda > 1.0 {
            let s = lambda.sqrt();
            rx *= s;
            ry *= s;
        }

        let num = (rx * rx) * (ry * ry) - (rx * rx) * (y1p * y1p) - (ry * ry) * (x1p * x1p);
        let den = (rx * rx) * (y1p * y1p) + (ry * ry) * (x1p * x1p);
        let mut coefficient = if den == 0.0 {
            0.0
        } else {
            (num / den).max(0.0).sqrt()
        };
        if large_arc == sweep {
            coefficient = -coefficient;
        }
        let cxp = coefficient * rx * y1p / ry;
        let cyp = -coefficient * ry * x1p / rx;
        let cx = cos_phi * cxp - sin_phi * cyp + (from.x + to.x) / 2.0;
        let cy = sin_phi * cxp + cos_phi * cyp + (from.y + to.y) / 2.0;

        let angle = |ux: f32, uy: f32, vx: f32, vy: f32| -> f32 {
            let dot = ux * vx + uy * vy;
            let len = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
            if len == 0.0 {
                return 0.0;
            }
            let mut a = (dot / len).clamp(-1.0, 1.0).acos();
            if ux * vy - uy * vx < 0.0 {
                a = -a;
            }
            a
        };
        let theta1 = angle(1.0, 0.0, (x1p - cxp) / rx, (y1p - cyp) / ry);
        let mut delta = angle(
            (x1p - cxp) / rx,
            (y1p - cyp) / ry,
            (-x1p - cxp) / rx,
            (-y1p - cyp) / ry,
        );
        if !sweep && delta > 0.0 {
            delta -= 2.0 * PI;
        } else if sweep && delta < 0.0 {
            delta += 2.0 * PI;
        }

        // Split into arcs of at most 90 degrees, each approximated by one
        // cubic.
        let segment_count = (delta.abs() / (PI / 2.0)).ceil().max(1.0) as usize;
        let step = delta / segment_count as f32;
        let mut out = Vec::with_capacity(segment_count);
        let mut theta = theta1;
        for i in 0..segment_count {
            let theta_next = theta + step;
            let alpha = 4.0 / 3.0 * (step / 4.0).tan();

            let ellipse_point = |t: f32| -> Point {
                let (sin_t, cos_t) = t.sin_cos();
                Point {
                    x: cx + rx * cos_t * cos_phi - ry * sin_t * sin_phi,
                    y: cy + rx * cos_t * sin_phi + ry * sin_t * cos_phi,
                }
            };
            let ellipse_derivative = |t: f32| -> Point {
                let (sin_t, cos_t) = t.sin_cos();
                Point {
                    x: -rx * sin_t * cos_phi - ry * cos_t * sin_phi,
                    y: -rx * sin_t * sin_phi + ry * cos_t * cos_phi,
                }
            };

            let p1 = ellipse_point(theta);
            let p2 = ellipse_point(theta_next);
            let d1 = ellipse_derivative(theta);
            let d2 = ellipse_derivative(theta_next);

            let end = if i == segment_count - 1 { to } else { p2 };
            out.push(PathSegment::Cubic {
                c1: Point::new(p1.x + alpha * d1.x, p1.y + alpha * d1.y),
                c2: Point::new(end.x - alpha * d2.x, end.y - alpha * d2.y),
                to: end,
            });
            theta = theta_next;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathFigure {
    pub start: Point,
    pub segments: Vec<PathSegment>,
    pub closed: bool,
    pub filled: bool,
}

impl PathFigure {
    pub fn new(start: Point) -> Self {
        Self {
            start,
            segments: Vec::new(),
            closed: false,
            filled: true,
        }
    }

    pub fn line_to(&mut self, to: Point) {
        self.segments.push(PathSegment::Line { to });
    }

    pub fn cubic_to(&mut self, c1: Point, c2: Point, to: Point) {
        self.segments.push(PathSegment::Cubic { c1, c2, to });
    }

    /// Ordered vertex list: the start point followed by each segment end.
    pub fn vertices(&self) -> Vec<Point> {
        let mut out = Vec::with_capacity(self.segments.len() + 1);
        out.push(self.start);
        for segment in &self.segments {
            out.push(segment.end_point());
        }
        out
    }

    pub fn end_point(&self) -> Point {
        self.segments
            .last()
            .map(|s| s.end_point())
            .unwrap_or(self.start)
    }

    pub fn is_curve_free(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PathSegment::Line { .. }))
    }

    /// Flattened polyline including the start point.
    pub fn flatten(&self) -> Vec<Point> {
        let mut out = vec![self.start];
        let mut current = self.start;
        for segment in &self.segments {
            let points = segment.flatten(current);
            current = segment.end_point();
            out.extend(points);
        }
        if self.closed && !points_coincide(current, self.start) {
            out.push(self.start);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathGeometry {
    pub figures: Vec<PathFigure>,
    pub fill_rule: FillRule,
}

impl PathGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(figure: PathFigure) -> Self {
        Self {
            figures: vec![figure],
            fill_rule: FillRule::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    /// Appends another geometry's figures; used to union clip shapes.
    pub fn append(&mut self, other: PathGeometry) {
        self.figures.extend(other.figures);
    }

    /// Derived bounding rectangle over flattened figures. Empty geometry has
    /// no bounds.
    pub fn bounds(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        for figure in &self.figures {
            for point in figure.flatten() {
                bounds = Some(match bounds {
                    Some(b) => b.include(point),
                    None => Rect::new(point.x, point.y, 0.0, 0.0),
                });
            }
        }
        bounds
    }

    /// Returns the geometry with `transform` applied to every point. Arcs are
    /// lowered to cubics first so the result stays exact under any affine.
    pub fn transformed(&self, transform: &Transform) -> PathGeometry {
        let mut out = PathGeometry {
            figures: Vec::with_capacity(self.figures.len()),
            fill_rule: self.fill_rule,
        };
        for figure in &self.figures {
            let mut mapped = PathFigure {
                start: transform.apply(figure.start),
                segments: Vec::with_capacity(figure.segments.len()),
                closed: figure.closed,
                filled: figure.filled,
            };
            let mut current = figure.start;
            for segment in &figure.segments {
                match segment {
                    PathSegment::Line { to } => {
                        mapped.segments.push(PathSegment::Line {
                            to: transform.apply(*to),
                        });
                    }
                    PathSegment::Cubic { c1, c2, to } => {
                        mapped.segments.push(PathSegment::Cubic {
                            c1: transform.apply(*c1),
                            c2: transform.apply(*c2),
                            to: transform.apply(*to),
                        });
                    }
                    PathSegment::Arc { .. } => {
                        for cubic in segment.arc_to_cubics(current) {
                            let PathSegment::Cubic { c1, c2, to } = cubic else {
                                continue;
                            };
                            mapped.segments.push(PathSegment::Cubic {
                                c1: transform.apply(c1),
                                c2: transform.apply(c2),
                                to: transform.apply(to),
                            });
                        }
                    }
                }
                current = segment.end_point();
            }
            out.figures.push(mapped);
        }
        out
    }
}

pub(crate) fn direction_deg(from: Point, to: Point) -> f32 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees()
}

pub(crate) fn points_coincide(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
}

fn sample_cubic(p0: Point, c1: Point, c2: Point, p1: Point, t: f32) -> Point {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let c = 3.0 * mt * t * t;
    let d = t * t * t;
    Point {
        x: a * p0.x + b * c1.x + c * c2.x + d * p1.x,
        y: a * p0.y + b * c1.y + c * c2.y + d * p1.y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_composition_applies_right_to_left() {
        let t = Transform::translate(10.0, 0.0).pre_concat(Transform::scale(2.0, 2.0));
        let p = t.apply(Point::new(1.0, 1.0));
        assert!((p.x - 12.0).abs() < 1e-6);
        assert!((p.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn rotation_about_point_keeps_center_fixed() {
        let t = Transform::rotate_deg_about(90.0, 5.0, 5.0);
        let c = t.apply(Point::new(5.0, 5.0));
        assert!((c.x - 5.0).abs() < 1e-4);
        assert!((c.y - 5.0).abs() < 1e-4);
    }

    #[test]
    fn closed_triangle_bounds() {
        let mut figure = PathFigure::new(Point::new(0.0, 0.0));
        figure.line_to(Point::new(10.0, 0.0));
        figure.line_to(Point::new(10.0, 10.0));
        figure.closed = true;
        let geometry = PathGeometry::single(figure);
        let bounds = geometry.bounds().unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn arc_with_coincident_endpoints_produces_no_cubics() {
        let arc = PathSegment::Arc {
            rx: 5.0,
            ry: 5.0,
            x_rotation: 0.0,
            large_arc: false,
            sweep: true,
            to: Point::new(1.0, 1.0),
        };
        assert!(arc.arc_to_cubics(Point::new(1.0, 1.0)).is_empty());
    }

    #[test]
    fn zero_radius_arc_degrades_to_line() {
        let arc = PathSegment::Arc {
            rx: 0.0,
            ry: 4.0,
            x_rotation: 0.0,
            large_arc: false,
            sweep: true,
            to: Point::new(8.0, 0.0),
        };
        let lowered = arc.arc_to_cubics(Point::new(0.0, 0.0));
        assert_eq!(lowered, vec![PathSegment::Line { to: Point::new(8.0, 0.0) }]);
    }

    #[test]
    fn half_circle_arc_bounds_reach_the_apex() {
        let mut figure = PathFigure::new(Point::new(0.0, 0.0));
        figure.segments.push(PathSegment::Arc {
            rx: 5.0,
            ry: 5.0,
            x_rotation: 0.0,
            large_arc: false,
            sweep: false,
            to: Point::new(10.0, 0.0),
        });
        let bounds = PathGeometry::single(figure).bounds().unwrap();
        assert!((bounds.y + 5.0).abs() < 0.1, "top of arc near y=-5, got {}", bounds.y);
        assert!((bounds.width - 10.0).abs() < 0.1);
    }

    #[test]
    fn line_tangent_matches_atan2() {
        let segment = PathSegment::Line {
            to: Point::new(10.0, 10.0),
        };
        let angle = segment.start_tangent_deg(Point::new(0.0, 0.0));
        assert!((angle - 45.0).abs() < 1e-4);
    }
}
