use once_cell::sync::Lazy;
use regex::Regex;

use crate::geometry::{Rect, Transform};

static TRANSFORM_FN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(matrix|translate|scale|rotate|skewX|skewY)\s*\(([^)]*)\)").unwrap());
static URL_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^url\(\s*['"]?#([^'")\s]+)['"]?\s*\)"#).unwrap());

pub(crate) fn parse_number(value: &str) -> Option<f32> {
    let trimmed = value.trim().trim_end_matches("px");
    trimmed.parse::<f32>().ok()
}

/// Length with an optional percent sign; percentages resolve against `base`.
pub(crate) fn parse_length(value: &str, base: f32) -> Option<f32> {
    let trimmed = value.trim();
    if let Some(pct) = trimmed.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|v| v / 100.0 * base);
    }
    parse_number(trimmed)
}

/// Number or percentage, normalized to a fraction: "40%" -> 0.4, "0.4" -> 0.4.
pub(crate) fn parse_number_or_percent(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    if let Some(pct) = trimmed.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|v| v / 100.0);
    }
    trimmed.parse::<f32>().ok()
}

/// The id of a `url(#...)` reference, if the value is one.
pub(crate) fn parse_url_reference(value: &str) -> Option<&str> {
    URL_REF_RE
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Remainder after a leading `url(...)` token; holds the fallback component
/// of a paint declaration.
pub(crate) fn strip_url_reference(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let close = trimmed.find(')')?;
    trimmed.get(close + 1..).map(str::trim)
}

/// Parses an SVG transform list into a single matrix; functions compose left
/// to right. Unrecognized or malformed entries are skipped.
pub(crate) fn parse_transform_list(value: &str) -> Option<Transform> {
    let mut result = Transform::identity();
    let mut any = false;
    for caps in TRANSFORM_FN_RE.captures_iter(value) {
        let name = caps.get(1)?.as_str();
        let args: Vec<f32> = caps
            .get(2)?
            .as_str()
            .split([',', ' ', '\t', '\n'])
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<f32>().ok())
            .collect();
        let transform = match (name, args.as_slice()) {
            ("matrix", [a, b, c, d, e, f]) => Transform {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            },
            ("translate", [tx]) => Transform::translate(*tx, 0.0),
            ("translate", [tx, ty]) => Transform::translate(*tx, *ty),
            ("scale", [s]) => Transform::scale(*s, *s),
            ("scale", [sx, sy]) => Transform::scale(*sx, *sy),
            ("rotate", [angle]) => Transform::rotate_deg(*angle),
            ("rotate", [angle, cx, cy]) => Transform::rotate_deg_about(*angle, *cx, *cy),
            ("skewX", [angle]) => Transform::skew_x_deg(*angle),
            ("skewY", [angle]) => Transform::skew_y_deg(*angle),
            _ => continue,
        };
        result = result.pre_concat(transform);
        any = true;
    }
    if any { Some(result) } else { None }
}

/// `viewBox="min-x min-y width height"`. Rejected when width or height is
/// not positive.
pub(crate) fn parse_view_box(value: &str) -> Option<Rect> {
    let parts: Vec<f32> = value
        .split([',', ' ', '\t', '\n'])
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f32>().ok())
        .collect();
    let [x, y, width, height] = parts.as_slice() else {
        return None;
    };
    if *width <= 0.0 || *height <= 0.0 {
        return None;
    }
    Some(Rect::new(*x, *y, *width, *height))
}

pub(crate) fn parse_dash_array(value: &str) -> Vec<f32> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return Vec::new();
    }
    let mut dashes: Vec<f32> = trimmed
        .split([',', ' ', '\t'])
        .filter(|s| !s.is_empty())
        .filter_map(|s| parse_number(s))
        .collect();
    // Negative entries invalidate the list; an all-zero list strokes solid.
    if dashes.iter().any(|d| *d < 0.0) || dashes.iter().sum::<f32>() <= 0.0 {
        return Vec::new();
    }
    // Odd-length lists repeat themselves to an even count.
    if dashes.len() % 2 == 1 {
        let doubled = dashes.clone();
        dashes.extend(doubled);
    }
    dashes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AspectAlign {
    None,
    Min,
    Mid,
    Max,
}

/// Parsed `preserveAspectRatio`: per-axis alignment plus meet/slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PreserveAspectRatio {
    pub align_x: AspectAlign,
    pub align_y: AspectAlign,
    pub slice: bool,
}

impl Default for PreserveAspectRatio {
    fn default() -> Self {
        Self {
            align_x: AspectAlign::Mid,
            align_y: AspectAlign::Mid,
            slice: false,
        }
    }
}

pub(crate) fn parse_preserve_aspect_ratio(value: &str) -> PreserveAspectRatio {
    let mut parts = value.split_whitespace();
    let align = parts.next().unwrap_or("xMidYMid");
    let slice = parts.next() == Some("slice");
    if align == "none" {
        return PreserveAspectRatio {
            align_x: AspectAlign::None,
            align_y: AspectAlign::None,
            slice: false,
        };
    }
    let component = |tag: Option<&str>| match tag {
        Some("Min") => AspectAlign::Min,
        Some("Max") => AspectAlign::Max,
        _ => AspectAlign::Mid,
    };
    let (x_part, y_part) = match align.len() {
        8 => (align.get(1..4), align.get(5..8)),
        _ => (None, None),
    };
    PreserveAspectRatio {
        align_x: component(x_part),
        align_y: component(y_part),
        slice,
    }
}

/// Transform mapping `view_box` coordinates onto a `width` x `height`
/// viewport, honoring alignment and meet/slice.
pub(crate) fn view_box_transform(
    view_box: Rect,
    width: f32,
    height: f32,
    ratio: PreserveAspectRatio,
) -> Transform {
    let sx = width / view_box.width;
    let sy = height / view_box.height;
    if ratio.align_x == AspectAlign::None {
        return Transform::scale(sx, sy)
            .pre_concat(Transform::translate(-view_box.x, -view_box.y));
    }
    let s = if ratio.slice { sx.max(sy) } else { sx.min(sy) };
    let offset = |align: AspectAlign, viewport: f32, content: f32| match align {
        AspectAlign::Min | AspectAlign::None => 0.0,
        AspectAlign::Mid => (viewport - content * s) / 2.0,
        AspectAlign::Max => viewport - content * s,
    };
    Transform::translate(
        offset(ratio.align_x, width, view_box.width),
        offset(ratio.align_y, height, view_box.height),
    )
    .pre_concat(Transform::scale(s, s))
    .pre_concat(Transform::translate(-view_box.x, -view_box.y))
}
