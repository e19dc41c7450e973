use crate::config::RenderOptions;
use crate::geometry::{FillRule, PathFigure, PathGeometry, PathSegment, Point, points_coincide};
use crate::render::values::parse_number;
use crate::source::SourceNode;

/// Builds vector geometry for a shape element. Degenerate shapes
/// (non-positive width/height/radius, too few points) yield None and the
/// caller emits no leaf.
pub(crate) fn build_geometry(node: &SourceNode, options: &RenderOptions) -> Option<PathGeometry> {
    let mut geometry = match node.local_name.as_str() {
        "rect" => build_rect(node),
        "circle" => build_circle(node),
        "ellipse" => build_ellipse(node),
        "line" => build_line(node),
        "polyline" => build_poly(node, false),
        "polygon" => build_poly(node, true),
        "path" => build_path(node, options),
        _ => None,
    }?;
    if geometry.figures.is_empty() {
        return None;
    }
    if node.computed_value("fill-rule") == Some("evenodd") {
        geometry.fill_rule = FillRule::EvenOdd;
    }
    Some(geometry)
}

fn number_attr(node: &SourceNode, name: &str, default: f32) -> f32 {
    node.attribute(name)
        .and_then(parse_number)
        .unwrap_or(default)
}

fn build_rect(node: &SourceNode) -> Option<PathGeometry> {
    let x = number_attr(node, "x", 0.0);
    let y = number_attr(node, "y", 0.0);
    let width = number_attr(node, "width", 0.0);
    let height = number_attr(node, "height", 0.0);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    // A lone rx or ry implies the other.
    let rx_attr = node.attribute("rx").and_then(parse_number);
    let ry_attr = node.attribute("ry").and_then(parse_number);
    let mut rx = rx_attr.or(ry_attr).unwrap_or(0.0).max(0.0);
    let mut ry = ry_attr.or(rx_attr).unwrap_or(0.0).max(0.0);
    rx = rx.min(width / 2.0);
    ry = ry.min(height / 2.0);

    let mut figure = if rx > 0.0 && ry > 0.0 {
        let mut figure = PathFigure::new(Point::new(x + rx, y));
        let corner = |figure: &mut PathFigure, to: Point| {
            figure.segments.push(PathSegment::Arc {
                rx,
                ry,
                x_rotation: 0.0,
                large_arc: false,
                sweep: true,
                to,
            });
        };
        figure.line_to(Point::new(x + width - rx, y));
        corner(&mut figure, Point::new(x + width, y + ry));
        figure.line_to(Point::new(x + width, y + height - ry));
        corner(&mut figure, Point::new(x + width - rx, y + height));
        figure.line_to(Point::new(x + rx, y + height));
        corner(&mut figure, Point::new(x, y + height - ry));
        figure.line_to(Point::new(x, y + ry));
        corner(&mut figure, Point::new(x + rx, y));
        figure
    } else {
        let mut figure = PathFigure::new(Point::new(x, y));
        figure.line_to(Point::new(x + width, y));
        figure.line_to(Point::new(x + width, y + height));
        figure.line_to(Point::new(x, y + height));
        figure
    };
    figure.closed = true;
    Some(PathGeometry::single(figure))
}

fn ellipse_figure(cx: f32, cy: f32, rx: f32, ry: f32) -> PathFigure {
    let mut figure = PathFigure::new(Point::new(cx + rx, cy));
    let quadrant = |figure: &mut PathFigure, to: Point| {
        figure.segments.push(PathSegment::Arc {
            rx,
            ry,
            x_rotation: 0.0,
            large_arc: false,
            sweep: true,
            to,
        });
    };
    quadrant(&mut figure, Point::new(cx, cy + ry));
    quadrant(&mut figure, Point::new(cx - rx, cy));
    quadrant(&mut figure, Point::new(cx, cy - ry));
    quadrant(&mut figure, Point::new(cx + rx, cy));
    figure.closed = true;
    figure
}

fn build_circle(node: &SourceNode) -> Option<PathGeometry> {
    let r = number_attr(node, "r", 0.0);
    if r <= 0.0 {
        return None;
    }
    let cx = number_attr(node, "cx", 0.0);
    let cy = number_attr(node, "cy", 0.0);
    Some(PathGeometry::single(ellipse_figure(cx, cy, r, r)))
}

fn build_ellipse(node: &SourceNode) -> Option<PathGeometry> {
    let rx = number_attr(node, "rx", 0.0);
    let ry = number_attr(node, "ry", 0.0);
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    let cx = number_attr(node, "cx", 0.0);
    let cy = number_attr(node, "cy", 0.0);
    Some(PathGeometry::single(ellipse_figure(cx, cy, rx, ry)))
}

fn build_line(node: &SourceNode) -> Option<PathGeometry> {
    let x1 = number_attr(node, "x1", 0.0);
    let y1 = number_attr(node, "y1", 0.0);
    let x2 = number_attr(node, "x2", 0.0);
    let y2 = number_attr(node, "y2", 0.0);
    let mut figure = PathFigure::new(Point::new(x1, y1));
    figure.line_to(Point::new(x2, y2));
    figure.filled = false;
    Some(PathGeometry::single(figure))
}

fn build_poly(node: &SourceNode, closed: bool) -> Option<PathGeometry> {
    let points = parse_points(node.attribute("points")?);
    if points.len() < 2 {
        return None;
    }
    let mut figure = PathFigure::new(points[0]);
    for point in &points[1..] {
        figure.line_to(*point);
    }
    figure.closed = closed;
    Some(PathGeometry::single(figure))
}

fn parse_points(value: &str) -> Vec<Point> {
    let numbers: Vec<f32> = value
        .split([',', ' ', '\t', '\n', '\r'])
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f32>().ok())
        .collect();
    numbers
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect()
}

fn build_path(node: &SourceNode, options: &RenderOptions) -> Option<PathGeometry> {
    let data = node.attribute("d")?;
    if options.optimize_path {
        if let Ok(geometry) = parse_path_data(data) {
            return finish_path(optimize_figures(geometry));
        }
        // Malformed data: fall back to the tolerant segment constructor.
    }
    finish_path(build_path_segments(data))
}

fn finish_path(geometry: PathGeometry) -> Option<PathGeometry> {
    if geometry.figures.is_empty() {
        None
    } else {
        Some(geometry)
    }
}

/// Collapses collinear runs inside entirely-closed, curve-free figures so
/// downstream consumers iterate fewer segments.
fn optimize_figures(mut geometry: PathGeometry) -> PathGeometry {
    for figure in &mut geometry.figures {
        if !figure.closed || !figure.is_curve_free() || figure.segments.len() < 3 {
            continue;
        }
        let vertices = figure.vertices();
        let mut kept: Vec<Point> = vec![vertices[0]];
        for window in vertices.windows(3) {
            if !collinear(window[0], window[1], window[2]) {
                kept.push(window[1]);
            }
        }
        kept.push(*vertices.last().unwrap());
        if kept.len() < vertices.len() {
            figure.start = kept[0];
            figure.segments = kept[1..]
                .iter()
                .map(|to| PathSegment::Line { to: *to })
                .collect();
        }
    }
    geometry
}

fn collinear(a: Point, b: Point, c: Point) -> bool {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    cross.abs() < 1e-5
}

#[derive(Debug)]
pub(crate) struct PathDataError {
    pub position: usize,
}

/// Strict path-data parser; any malformed token is an error. Used by the
/// optimized path mode.
pub(crate) fn parse_path_data(data: &str) -> Result<PathGeometry, PathDataError> {
    let mut builder = PathBuilder::new();
    let mut scanner = Scanner::new(data);
    scanner.run(&mut builder)?;
    Ok(builder.finish())
}

/// Tolerant segment-by-segment constructor: consumes commands until the
/// first malformed token and keeps everything built so far.
pub(crate) fn build_path_segments(data: &str) -> PathGeometry {
    let mut builder = PathBuilder::new();
    let mut scanner = Scanner::new(data);
    let _ = scanner.run(&mut builder);
    builder.finish()
}

struct PathBuilder {
    figures: Vec<PathFigure>,
    current: Option<PathFigure>,
    position: Point,
    start: Point,
    last_cubic_control: Option<Point>,
    last_quad_control: Option<Point>,
}

impl PathBuilder {
    fn new() -> Self {
        Self {
            figures: Vec::new(),
            current: None,
            position: Point::default(),
            start: Point::default(),
            last_cubic_control: None,
            last_quad_control: None,
        }
    }

    fn move_to(&mut self, to: Point) {
        self.flush();
        self.current = Some(PathFigure::new(to));
        self.position = to;
        self.start = to;
        self.reset_controls();
    }

    fn ensure_figure(&mut self) -> &mut PathFigure {
        if self.current.is_none() {
            self.current = Some(PathFigure::new(self.position));
            self.start = self.position;
        }
        self.current.as_mut().unwrap()
    }

    fn line_to(&mut self, to: Point) {
        self.ensure_figure().line_to(to);
        self.position = to;
        self.reset_controls();
    }

    fn cubic_to(&mut self, c1: Point, c2: Point, to: Point) {
        self.ensure_figure().cubic_to(c1, c2, to);
        self.position = to;
        self.last_cubic_control = Some(c2);
        self.last_quad_control = None;
    }

    fn quad_to(&mut self, control: Point, to: Point) {
        // Exact cubic equivalent of the quadratic.
        let from = self.position;
        let c1 = Point::new(
            from.x + 2.0 / 3.0 * (control.x - from.x),
            from.y + 2.0 / 3.0 * (control.y - from.y),
        );
        let c2 = Point::new(
            to.x + 2.0 / 3.0 * (control.x - to.x),
            to.y + 2.0 / 3.0 * (control.y - to.y),
        );
        self.ensure_figure().cubic_to(c1, c2, to);
        self.position = to;
        self.last_quad_control = Some(control);
        self.last_cubic_control = None;
    }

    fn arc_to(&mut self, rx: f32, ry: f32, x_rotation: f32, large_arc: bool, sweep: bool, to: Point) {
        // Arcs between coincident endpoints are omitted entirely.
        if points_coincide(self.position, to) {
            self.reset_controls();
            return;
        }
        if rx == 0.0 || ry == 0.0 {
            self.line_to(to);
            return;
        }
        self.ensure_figure().segments.push(PathSegment::Arc {
            rx: rx.abs(),
            ry: ry.abs(),
            x_rotation,
            large_arc,
            sweep,
            to,
        });
        self.position = to;
        self.reset_controls();
    }

    fn close(&mut self) {
        if let Some(figure) = self.current.as_mut() {
            figure.closed = true;
            figure.filled = true;
        }
        self.flush();
        self.position = self.start;
        self.reset_controls();
    }

    fn reflected_cubic_control(&self) -> Point {
        match self.last_cubic_control {
            Some(c) => Point::new(2.0 * self.position.x - c.x, 2.0 * self.position.y - c.y),
            None => self.position,
        }
    }

    fn reflected_quad_control(&self) -> Point {
        match self.last_quad_control {
            Some(c) => Point::new(2.0 * self.position.x - c.x, 2.0 * self.position.y - c.y),
            None => self.position,
        }
    }

    fn reset_controls(&mut self) {
        self.last_cubic_control = None;
        self.last_quad_control = None;
    }

    fn flush(&mut self) {
        if let Some(figure) = self.current.take()
            && !figure.segments.is_empty()
        {
            self.figures.push(figure);
        }
    }

    fn finish(mut self) -> PathGeometry {
        self.flush();
        PathGeometry {
            figures: self.figures,
            fill_rule: FillRule::default(),
        }
    }
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(data: &'a str) -> Self {
        Self {
            bytes: data.as_bytes(),
            pos: 0,
        }
    }

    fn run(&mut self, builder: &mut PathBuilder) -> Result<(), PathDataError> {
        let mut command: Option<u8> = None;
        loop {
            self.skip_separators();
            let Some(byte) = self.peek() else {
                return Ok(());
            };
            if byte.is_ascii_alphabetic() {
                command = Some(byte);
                self.pos += 1;
            } else if command.is_none() {
                return Err(self.error());
            }
            let cmd = command.ok_or_else(|| self.error())?;
            self.apply(cmd, builder)?;
            command = match cmd {
                // An implicit repeat of moveto continues as lineto.
                b'M' => Some(b'L'),
                b'm' => Some(b'l'),
                // Close takes no arguments; trailing numbers are malformed.
                b'Z' | b'z' => None,
                other => Some(other),
            };
        }
    }

    fn apply(&mut self, cmd: u8, builder: &mut PathBuilder) -> Result<(), PathDataError> {
        let relative = cmd.is_ascii_lowercase();
        let base = if relative {
            builder.position
        } else {
            Point::default()
        };
        match cmd.to_ascii_uppercase() {
            b'M' => {
                let p = self.point(base)?;
                builder.move_to(p);
            }
            b'L' => {
                let p = self.point(base)?;
                builder.line_to(p);
            }
            b'H' => {
                let x = self.number()?;
                let x = if relative { builder.position.x + x } else { x };
                builder.line_to(Point::new(x, builder.position.y));
            }
            b'V' => {
                let y = self.number()?;
                let y = if relative { builder.position.y + y } else { y };
                builder.line_to(Point::new(builder.position.x, y));
            }
            b'C' => {
                let c1 = self.point(base)?;
                let c2 = self.point(base)?;
                let to = self.point(base)?;
                builder.cubic_to(c1, c2, to);
            }
            b'S' => {
                let c1 = builder.reflected_cubic_control();
                let c2 = self.point(base)?;
                let to = self.point(base)?;
                builder.cubic_to(c1, c2, to);
            }
            b'Q' => {
                let control = self.point(base)?;
                let to = self.point(base)?;
                builder.quad_to(control, to);
            }
            b'T' => {
                let control = builder.reflected_quad_control();
                let to = self.point(base)?;
                builder.quad_to(control, to);
            }
            b'A' => {
                let rx = self.number()?;
                let ry = self.number()?;
                let x_rotation = self.number()?;
                let large_arc = self.flag()?;
                let sweep = self.flag()?;
                let to = self.point(base)?;
                builder.arc_to(rx, ry, x_rotation, large_arc, sweep, to);
            }
            b'Z' => builder.close(),
            _ => return Err(self.error()),
        }
        Ok(())
    }

    fn point(&mut self, base: Point) -> Result<Point, PathDataError> {
        let x = self.number()?;
        let y = self.number()?;
        Ok(Point::new(base.x + x, base.y + y))
    }

    fn number(&mut self) -> Result<f32, PathDataError> {
        self.skip_separators();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut seen_digit = false;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
            seen_digit = true;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
                seen_digit = true;
            }
        }
        if !seen_digit {
            self.pos = start;
            return Err(self.error());
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let exp_start = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let mut exp_digits = false;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
                exp_digits = true;
            }
            if !exp_digits {
                self.pos = exp_start;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| self.error())?;
        text.parse::<f32>().map_err(|_| self.error())
    }

    fn flag(&mut self) -> Result<bool, PathDataError> {
        self.skip_separators();
        match self.peek() {
            Some(b'0') => {
                self.pos += 1;
                Ok(false)
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(true)
            }
            _ => Err(self.error()),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.peek(),
            Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b',')
        ) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self) -> PathDataError {
        PathDataError { position: self.pos }
    }
}
