use crate::error::RenderError;
use crate::geometry::{PathGeometry, Point, Rect, Transform};
use crate::render::context::RenderContext;
use crate::render::values::{
    parse_number, parse_preserve_aspect_ratio, parse_url_reference, parse_view_box,
    view_box_transform,
};
use crate::render::{clip, dispatch};
use crate::scene::Group;
use crate::source::{Document, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerPosition {
    Start,
    Mid,
    End,
}

impl MarkerPosition {
    fn property(self) -> &'static str {
        match self {
            MarkerPosition::Start => "marker-start",
            MarkerPosition::Mid => "marker-mid",
            MarkerPosition::End => "marker-end",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    point: Point,
    /// Direction arriving at the vertex, from the preceding segment.
    in_dir: Option<f32>,
    /// Direction leaving the vertex, from the following segment.
    out_dir: Option<f32>,
}

/// Places the host shape's marker decorations: for each relevant vertex the
/// marker content is dispatched through the normal pipeline under a composed
/// placement transform.
pub(crate) fn render_markers(
    ctx: &mut RenderContext,
    doc: &Document,
    host: SourceId,
    geometry: &PathGeometry,
    stroke_width: f32,
) -> Result<(), RenderError> {
    let host_node = doc.node(host);
    let shorthand = host_node.computed_value("marker");
    let references = [
        MarkerPosition::Start,
        MarkerPosition::Mid,
        MarkerPosition::End,
    ]
    .map(|position| {
        let value = host_node.computed_value(position.property()).or(shorthand);
        (position, value.and_then(resolve_marker_value))
    });
    if references.iter().all(|(_, id)| id.is_none()) {
        return Ok(());
    }

    let vertices = vertex_angles(geometry);
    if vertices.is_empty() {
        return Ok(());
    }
    let host_zero_length = geometry
        .bounds()
        .is_none_or(|bounds| bounds.width < 1e-6 && bounds.height < 1e-6);

    for (position, reference) in references {
        let Some(reference) = reference else {
            continue;
        };
        let Some(marker_id) = doc.element_by_id(&reference) else {
            continue;
        };
        if doc.node(marker_id).local_name != "marker" {
            continue;
        }

        let marker_uid = doc.node(marker_id).unique_id.clone();
        if !ctx.begin_reference(&marker_uid) {
            continue;
        }
        let result = place_at_position(
            ctx,
            doc,
            host,
            marker_id,
            position,
            &vertices,
            stroke_width,
            host_zero_length,
        );
        ctx.end_reference(&marker_uid);
        result?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn place_at_position(
    ctx: &mut RenderContext,
    doc: &Document,
    host: SourceId,
    marker_id: SourceId,
    position: MarkerPosition,
    vertices: &[Vertex],
    stroke_width: f32,
    host_zero_length: bool,
) -> Result<(), RenderError> {
    let last = vertices.len() - 1;
    for (index, vertex) in vertices.iter().enumerate() {
        let matches = match position {
            MarkerPosition::Start => index == 0,
            MarkerPosition::End => index == last,
            MarkerPosition::Mid => index != 0 && index != last,
        };
        if !matches {
            continue;
        }
        place_marker(
            ctx,
            doc,
            host,
            marker_id,
            position,
            *vertex,
            stroke_width,
            host_zero_length,
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn place_marker(
    ctx: &mut RenderContext,
    doc: &Document,
    host: SourceId,
    marker_id: SourceId,
    position: MarkerPosition,
    vertex: Vertex,
    stroke_width: f32,
    host_zero_length: bool,
) -> Result<(), RenderError> {
    let marker = doc.node(marker_id);
    let marker_width = marker
        .attribute("markerWidth")
        .and_then(parse_number)
        .unwrap_or(3.0);
    let marker_height = marker
        .attribute("markerHeight")
        .and_then(parse_number)
        .unwrap_or(3.0);
    if marker_width <= 0.0 || marker_height <= 0.0 {
        return Ok(());
    }
    let ref_x = marker.attribute("refX").and_then(parse_number).unwrap_or(0.0);
    let ref_y = marker.attribute("refY").and_then(parse_number).unwrap_or(0.0);
    let view_box = marker.attribute("viewBox").and_then(parse_view_box);
    let units_scale = match marker.attribute("markerUnits") {
        Some("userSpaceOnUse") => 1.0,
        _ => stroke_width,
    };

    let angle = marker_angle(marker.attribute("orient").unwrap_or("0"), position, vertex);

    // Applied to content in order: negated reference point, viewbox fit,
    // stroke-width scale, orientation, translate to the vertex. The
    // reference point stays pinned to the vertex under rotation.
    let mut transform = Transform::translate(vertex.point.x, vertex.point.y)
        .pre_concat(Transform::rotate_deg(angle))
        .pre_concat(Transform::scale(units_scale, units_scale));
    if let Some(view_box) = view_box {
        let ratio = parse_preserve_aspect_ratio(
            marker.attribute("preserveAspectRatio").unwrap_or_default(),
        );
        transform =
            transform.pre_concat(view_box_transform(view_box, marker_width, marker_height, ratio));
    }
    transform = transform.pre_concat(Transform::translate(-ref_x, -ref_y));

    // Marker viewport clip; a zero-length host has no direction-derived
    // bounds and clips to the raw marker box.
    let clip_rect = if host_zero_length {
        Rect::new(0.0, 0.0, marker_width, marker_height)
    } else {
        view_box.unwrap_or(Rect::new(0.0, 0.0, marker_width, marker_height))
    };
    let clip = clip::overflow_clip(doc, marker_id, clip_rect);

    let group = ctx.open_group(Group {
        transform: Some(transform),
        clip,
        ..Group::default()
    });
    let saved_target = ctx.context_target.clone();
    ctx.context_target = Some(doc.node(host).unique_id.clone());
    let mut result = Ok(());
    for child in doc.node(marker_id).children() {
        result = dispatch(doc, *child, ctx);
        if result.is_err() {
            break;
        }
    }
    ctx.context_target = saved_target;
    result?;
    ctx.close_group(group, "marker")
}

fn resolve_marker_value(value: &str) -> Option<String> {
    if value.trim() == "none" {
        return None;
    }
    parse_url_reference(value).map(str::to_string)
}

/// Marker rotation in degrees: a fixed angle, the path tangent for `auto`,
/// or the tangent plus 180 at the start vertex for `auto-start-reverse`.
fn marker_angle(orient: &str, position: MarkerPosition, vertex: Vertex) -> f32 {
    match orient.trim() {
        "auto" => tangent_angle(position, vertex),
        "auto-start-reverse" => {
            let angle = tangent_angle(position, vertex);
            if position == MarkerPosition::Start {
                (angle + 180.0).rem_euclid(360.0)
            } else {
                angle
            }
        }
        fixed => parse_number(fixed).unwrap_or(0.0),
    }
}

fn tangent_angle(position: MarkerPosition, vertex: Vertex) -> f32 {
    match position {
        MarkerPosition::Start => vertex.out_dir.or(vertex.in_dir).unwrap_or(0.0),
        MarkerPosition::End => vertex.in_dir.or(vertex.out_dir).unwrap_or(0.0),
        MarkerPosition::Mid => match (vertex.in_dir, vertex.out_dir) {
            (Some(incoming), Some(outgoing)) => bisect_angles(incoming, outgoing),
            (Some(angle), None) | (None, Some(angle)) => angle,
            (None, None) => 0.0,
        },
    }
}

fn bisect_angles(a: f32, b: f32) -> f32 {
    let (a, b) = (a.to_radians(), b.to_radians());
    let x = a.cos() + b.cos();
    let y = a.sin() + b.sin();
    if x.abs() < 1e-6 && y.abs() < 1e-6 {
        a.to_degrees()
    } else {
        y.atan2(x).to_degrees()
    }
}

/// Per-vertex tangent data across all figures, in traversal order.
fn vertex_angles(geometry: &PathGeometry) -> Vec<Vertex> {
    let mut out = Vec::new();
    for figure in &geometry.figures {
        let mut current = figure.start;
        let first_out = figure
            .segments
            .first()
            .map(|segment| segment.start_tangent_deg(current));
        out.push(Vertex {
            point: figure.start,
            in_dir: None,
            out_dir: first_out,
        });
        for (index, segment) in figure.segments.iter().enumerate() {
            let in_dir = segment.end_tangent_deg(current);
            let end = segment.end_point();
            let out_dir = figure
                .segments
                .get(index + 1)
                .map(|next| next.start_tangent_deg(end));
            out.push(Vertex {
                point: end,
                in_dir: Some(in_dir),
                out_dir,
            });
            current = end;
        }
    }
    out
}
