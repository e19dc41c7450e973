use std::collections::HashSet;

use crate::color::{Color, parse_color};
use crate::error::RenderError;
use crate::geometry::Rect;
use crate::render::context::{PaintContext, RenderContext};
use crate::render::values::{
    parse_dash_array, parse_number, parse_number_or_percent, parse_transform_list,
    parse_url_reference, strip_url_reference,
};
use crate::scene::{
    Gradient, GradientStop, GradientVariant, Group, LineCap, LineJoin, Paint, Pattern, SpreadMode,
    StrokeStyle, UnitSpace,
};
use crate::source::{Document, SourceId};

const REFERENCE_CHAIN_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaintProperty {
    Fill,
    Stroke,
}

impl PaintProperty {
    fn name(self) -> &'static str {
        match self {
            PaintProperty::Fill => "fill",
            PaintProperty::Stroke => "stroke",
        }
    }

    fn opacity_name(self) -> &'static str {
        match self {
            PaintProperty::Fill => "fill-opacity",
            PaintProperty::Stroke => "stroke-opacity",
        }
    }

    fn initial(self) -> &'static str {
        match self {
            PaintProperty::Fill => "black",
            PaintProperty::Stroke => "none",
        }
    }
}

#[derive(Debug, Clone)]
enum PaintDecl {
    None,
    CurrentColor,
    ContextFill,
    ContextStroke,
    Color(Color),
    Reference {
        id: String,
        fallback: Option<Box<PaintDecl>>,
    },
}

fn parse_paint_decl(value: &str) -> Option<PaintDecl> {
    let trimmed = value.trim();
    match trimmed {
        "" => return None,
        "none" => return Some(PaintDecl::None),
        "currentColor" => return Some(PaintDecl::CurrentColor),
        "context-fill" => return Some(PaintDecl::ContextFill),
        "context-stroke" => return Some(PaintDecl::ContextStroke),
        _ => {}
    }
    if let Some(id) = parse_url_reference(trimmed) {
        let fallback = strip_url_reference(trimmed)
            .filter(|rest| !rest.is_empty())
            .and_then(parse_paint_decl)
            .map(Box::new);
        return Some(PaintDecl::Reference {
            id: id.to_string(),
            fallback,
        });
    }
    parse_color(trimmed).map(PaintDecl::Color)
}

/// Resolves the `fill` declaration of `node` into a concrete paint,
/// with the element's fill-opacity and shorthand opacity folded in.
pub(crate) fn resolve_fill(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    bbox: Option<Rect>,
) -> Result<Paint, RenderError> {
    resolve_paint(ctx, doc, node, PaintProperty::Fill, bbox, true)
}

/// Resolves the `stroke` declaration plus the stroke descriptor properties.
/// None when the stroke paint is none or the width is not positive.
pub(crate) fn resolve_stroke(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    bbox: Option<Rect>,
) -> Result<Option<StrokeStyle>, RenderError> {
    let paint = resolve_paint(ctx, doc, node, PaintProperty::Stroke, bbox, true)?;
    if paint.is_none() {
        return Ok(None);
    }
    let node = doc.node(node);
    let width = resolve_stroke_width(node);
    if width <= 0.0 {
        return Ok(None);
    }
    let cap = match node.computed_value("stroke-linecap") {
        Some("round") => LineCap::Round,
        Some("square") => LineCap::Square,
        _ => LineCap::Butt,
    };
    let join = match node.computed_value("stroke-linejoin") {
        Some("round") => LineJoin::Round,
        Some("bevel") => LineJoin::Bevel,
        _ => LineJoin::Miter,
    };
    let miter_limit = node
        .computed_value("stroke-miterlimit")
        .and_then(parse_number)
        .filter(|limit| *limit >= 1.0)
        .unwrap_or(4.0);
    let dash_array = node
        .computed_value("stroke-dasharray")
        .map(parse_dash_array)
        .unwrap_or_default();
    let dash_offset = node
        .computed_value("stroke-dashoffset")
        .and_then(parse_number)
        .unwrap_or(0.0);
    Ok(Some(StrokeStyle {
        paint,
        width,
        cap,
        join,
        miter_limit,
        dash_array,
        dash_offset,
    }))
}

pub(crate) fn resolve_stroke_width(node: &crate::source::SourceNode) -> f32 {
    node.computed_value("stroke-width")
        .and_then(parse_number)
        .unwrap_or(1.0)
}

/// Records the node's resolved paints so marker and pattern content can
/// inherit them through `context-fill`/`context-stroke`.
pub(crate) fn register_paint_context(
    ctx: &mut RenderContext,
    node: &crate::source::SourceNode,
    fill: &Paint,
    stroke: Option<&StrokeStyle>,
) {
    let target = ctx.context_target.clone();
    ctx.register_paint_context(
        &node.unique_id,
        PaintContext {
            fill: Some(fill.clone()),
            stroke: stroke.map(|s| s.paint.clone()),
            target,
        },
    );
}

fn resolve_paint(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    property: PaintProperty,
    bbox: Option<Rect>,
    allow_context: bool,
) -> Result<Paint, RenderError> {
    let source = doc.node(node);
    let raw = source
        .computed_value(property.name())
        .unwrap_or(property.initial());
    let Some(decl) = parse_paint_decl(raw) else {
        return Ok(Paint::None);
    };
    let paint = resolve_decl(ctx, doc, node, property, &decl, bbox, allow_context)?;
    Ok(apply_element_opacity(paint, doc, node, property))
}

fn resolve_decl(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    property: PaintProperty,
    decl: &PaintDecl,
    bbox: Option<Rect>,
    allow_context: bool,
) -> Result<Paint, RenderError> {
    match decl {
        PaintDecl::None => Ok(Paint::None),
        PaintDecl::Color(color) => Ok(Paint::solid(*color)),
        PaintDecl::CurrentColor => Ok(Paint::solid(resolve_current_color(doc, node))),
        PaintDecl::ContextFill | PaintDecl::ContextStroke => {
            if !allow_context {
                return Ok(Paint::None);
            }
            let want = if matches!(decl, PaintDecl::ContextFill) {
                PaintProperty::Fill
            } else {
                PaintProperty::Stroke
            };
            if let Some(paint) = lookup_paint_context(ctx, doc, node, want) {
                return Ok(paint);
            }
            // Documented fallback: with no context match, the declaration
            // resolves against the node itself. Opacity is applied by the
            // outer call, so only the declaration is re-read here.
            let raw = doc
                .node(node)
                .computed_value(want.name())
                .unwrap_or(want.initial());
            match parse_paint_decl(raw) {
                Some(own) => resolve_decl(ctx, doc, node, want, &own, bbox, false),
                None => Ok(Paint::None),
            }
        }
        PaintDecl::Reference { id, fallback } => {
            if let Some(paint) = resolve_paint_server(ctx, doc, id, bbox)? {
                return Ok(paint);
            }
            match fallback {
                Some(fallback) => {
                    resolve_decl(ctx, doc, node, property, fallback, bbox, allow_context)
                }
                None => Ok(Paint::None),
            }
        }
    }
}

/// `currentColor` reads the node's own `color`; failing that, an
/// intentionally special-cased search for the nearest ancestor that pairs
/// `fill="currentColor"` with an explicit `color`, since `currentColor` is
/// not inherited like ordinary properties here.
fn resolve_current_color(doc: &Document, node: SourceId) -> Color {
    if let Some(color) = doc
        .node(node)
        .computed_value("color")
        .and_then(parse_color)
    {
        return color;
    }
    let ancestor = doc.find_ancestor(node, |candidate| {
        candidate.computed_value("fill") == Some("currentColor")
            && candidate.computed_value("color").is_some()
    });
    if let Some(ancestor) = ancestor
        && let Some(color) = doc
            .node(ancestor)
            .computed_value("color")
            .and_then(parse_color)
    {
        return color;
    }
    Color::BLACK
}

fn lookup_paint_context(
    ctx: &RenderContext,
    doc: &Document,
    node: SourceId,
    want: PaintProperty,
) -> Option<Paint> {
    let unique_id = doc.node(node).unique_id.clone();
    let mut current = if ctx.paint_context(&unique_id).is_some() {
        Some(unique_id)
    } else {
        ctx.context_target.clone()
    };
    let mut visited: HashSet<String> = HashSet::new();
    while let Some(id) = current {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(paint_context) = ctx.paint_context(&id) else {
            break;
        };
        let slot = match want {
            PaintProperty::Fill => &paint_context.fill,
            PaintProperty::Stroke => &paint_context.stroke,
        };
        if let Some(paint) = slot
            && !paint.is_none()
        {
            return Some(paint.clone());
        }
        current = paint_context.target.clone();
    }
    None
}

fn apply_element_opacity(
    paint: Paint,
    doc: &Document,
    node: SourceId,
    property: PaintProperty,
) -> Paint {
    let source = doc.node(node);
    let own = source
        .computed_value(property.opacity_name())
        .and_then(parse_opacity)
        .unwrap_or(1.0);
    let shorthand = source
        .computed_value("opacity")
        .and_then(parse_opacity)
        .unwrap_or(1.0);
    let factor = (own * shorthand).clamp(0.0, 1.0);
    if factor >= 1.0 {
        return paint;
    }
    match paint {
        Paint::None => Paint::None,
        Paint::Solid { color, opacity } => Paint::Solid {
            color,
            opacity: (opacity * factor).clamp(0.0, 1.0),
        },
        Paint::Gradient(mut gradient) => {
            for stop in &mut gradient.stops {
                stop.color = stop.color.scale_alpha(factor);
            }
            Paint::Gradient(gradient)
        }
        // Tile content carries its own opacity; the factor is left to the
        // consuming compositor via the host group.
        Paint::Pattern(pattern) => Paint::Pattern(pattern),
    }
}

pub(crate) fn parse_opacity(value: &str) -> Option<f32> {
    parse_number_or_percent(value).map(|v| v.clamp(0.0, 1.0))
}

fn resolve_paint_server(
    ctx: &mut RenderContext,
    doc: &Document,
    id: &str,
    bbox: Option<Rect>,
) -> Result<Option<Paint>, RenderError> {
    let Some(server) = doc.element_by_id(id) else {
        return Ok(None);
    };
    match doc.node(server).local_name.as_str() {
        "linearGradient" | "radialGradient" => Ok(build_gradient(doc, server, bbox)),
        "pattern" => build_pattern(ctx, doc, server, bbox),
        _ => Ok(None),
    }
}

/// Inheritance chain for `href`-linked paint servers, nearest first.
fn reference_chain(doc: &Document, start: SourceId) -> Vec<SourceId> {
    let mut chain = vec![start];
    let mut visited: HashSet<SourceId> = HashSet::new();
    visited.insert(start);
    let mut current = start;
    while chain.len() < REFERENCE_CHAIN_LIMIT {
        let Some(next) = doc.resolve_reference(current) else {
            break;
        };
        if !visited.insert(next) {
            break;
        }
        chain.push(next);
        current = next;
    }
    chain
}

fn chain_attr<'a>(doc: &'a Document, chain: &[SourceId], name: &str) -> Option<&'a str> {
    chain.iter().find_map(|id| doc.node(*id).attribute(name))
}

fn chain_fraction(doc: &Document, chain: &[SourceId], name: &str, default: f32) -> f32 {
    chain_attr(doc, chain, name)
        .and_then(parse_number_or_percent)
        .unwrap_or(default)
}

fn build_gradient(doc: &Document, server: SourceId, bbox: Option<Rect>) -> Option<Paint> {
    let chain = reference_chain(doc, server);
    let units = chain_attr(doc, &chain, "gradientUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or_default();

    // A bounding-box-relative gradient must not apply to a zero-area box;
    // the caller falls back instead.
    if units == UnitSpace::ObjectBoundingBox
        && let Some(bbox) = bbox
        && bbox.is_degenerate()
    {
        return None;
    }

    let stops = resolve_gradient_stops(doc, &chain)?;
    if stops.is_empty() {
        return None;
    }
    if stops.len() == 1 {
        return Some(Paint::solid(stops[0].color));
    }

    let variant = if doc.node(server).local_name == "linearGradient" {
        GradientVariant::Linear {
            x1: chain_fraction(doc, &chain, "x1", 0.0),
            y1: chain_fraction(doc, &chain, "y1", 0.0),
            x2: chain_fraction(doc, &chain, "x2", 1.0),
            y2: chain_fraction(doc, &chain, "y2", 0.0),
        }
    } else {
        let cx = chain_fraction(doc, &chain, "cx", 0.5);
        let cy = chain_fraction(doc, &chain, "cy", 0.5);
        GradientVariant::Radial {
            cx,
            cy,
            r: chain_fraction(doc, &chain, "r", 0.5),
            fx: chain_attr(doc, &chain, "fx")
                .and_then(parse_number_or_percent)
                .unwrap_or(cx),
            fy: chain_attr(doc, &chain, "fy")
                .and_then(parse_number_or_percent)
                .unwrap_or(cy),
        }
    };

    let spread = chain_attr(doc, &chain, "spreadMethod")
        .and_then(SpreadMode::parse)
        .unwrap_or_default();
    let transform = chain_attr(doc, &chain, "gradientTransform").and_then(parse_transform_list);

    Some(Paint::Gradient(Gradient {
        variant,
        stops,
        spread,
        units,
        transform,
    }))
}

/// Stops come from the nearest chain element that declares any, in document
/// order, each offset clamped to stay non-decreasing.
fn resolve_gradient_stops(doc: &Document, chain: &[SourceId]) -> Option<Vec<GradientStop>> {
    let owner = chain.iter().find(|id| {
        doc.node(**id)
            .children()
            .iter()
            .any(|child| doc.node(*child).local_name == "stop")
    })?;
    let mut stops = Vec::new();
    let mut previous = 0.0f32;
    for child in doc.node(*owner).children() {
        let stop = doc.node(*child);
        if stop.local_name != "stop" {
            continue;
        }
        let raw = stop
            .attribute("offset")
            .and_then(parse_number_or_percent)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let offset = raw.max(previous);
        previous = offset;

        let mut color = match stop.computed_value("stop-color") {
            Some("currentColor") => resolve_current_color(doc, *child),
            Some(value) => parse_color(value).unwrap_or(Color::BLACK),
            None => Color::BLACK,
        };
        if let Some(stop_opacity) = stop
            .computed_value("stop-opacity")
            .and_then(parse_opacity)
        {
            color = color.scale_alpha(stop_opacity);
        }
        stops.push(GradientStop { offset, color });
    }
    Some(stops)
}

fn build_pattern(
    ctx: &mut RenderContext,
    doc: &Document,
    server: SourceId,
    bbox: Option<Rect>,
) -> Result<Option<Paint>, RenderError> {
    let chain = reference_chain(doc, server);
    let units = chain_attr(doc, &chain, "patternUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or_default();
    let content_units = chain_attr(doc, &chain, "patternContentUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or(UnitSpace::UserSpace);
    let x = chain_fraction(doc, &chain, "x", 0.0);
    let y = chain_fraction(doc, &chain, "y", 0.0);
    let width = chain_fraction(doc, &chain, "width", 0.0);
    let height = chain_fraction(doc, &chain, "height", 0.0);
    if width <= 0.0 || height <= 0.0 {
        return Ok(None);
    }

    let tile = match (units, bbox) {
        (UnitSpace::ObjectBoundingBox, Some(bbox)) => Rect::new(
            bbox.x + x * bbox.width,
            bbox.y + y * bbox.height,
            width * bbox.width,
            height * bbox.height,
        ),
        _ => Rect::new(x, y, width, height),
    };

    // The content comes from the nearest chain element that has children;
    // unset attributes were already inherited above.
    let Some(content_owner) = chain
        .iter()
        .copied()
        .find(|id| !doc.node(*id).children().is_empty())
    else {
        return Ok(None);
    };

    // A pattern viewBox rescales the tile content into the resolved tile.
    let content_fit = chain_attr(doc, &chain, "viewBox")
        .and_then(crate::render::values::parse_view_box)
        .map(|view_box| {
            let ratio = crate::render::values::parse_preserve_aspect_ratio(
                chain_attr(doc, &chain, "preserveAspectRatio").unwrap_or_default(),
            );
            crate::render::values::view_box_transform(view_box, tile.width, tile.height, ratio)
        });

    let content_uid = doc.node(content_owner).unique_id.clone();
    if !ctx.begin_reference(&content_uid) {
        // Already expanding this pattern further up the call stack.
        return Ok(None);
    }
    let result = render_pattern_content(ctx, doc, content_owner, content_fit);
    ctx.end_reference(&content_uid);
    let content = result?;

    let transform = chain_attr(doc, &chain, "patternTransform").and_then(parse_transform_list);
    Ok(Some(Paint::Pattern(Box::new(Pattern {
        content,
        tile,
        units,
        content_units,
        transform,
    }))))
}

/// Renders the pattern's child content as an independent sub-scene on a
/// nested context with its own stack.
fn render_pattern_content(
    ctx: &mut RenderContext,
    doc: &Document,
    owner: SourceId,
    content_fit: Option<crate::geometry::Transform>,
) -> Result<crate::scene::Scene, RenderError> {
    let mut nested = ctx.nested();
    let root = nested.open_group(Group {
        transform: content_fit,
        ..Group::default()
    });
    for child in doc.node(owner).children() {
        crate::render::dispatch(doc, *child, &mut nested)?;
    }
    nested.close_group(root, &doc.node(owner).local_name)?;
    nested.uninitialize()
}
