use crate::error::RenderError;
use crate::geometry::{FillRule, PathFigure, PathGeometry, Point, Rect, Transform};
use crate::render::context::RenderContext;
use crate::render::shapes;
use crate::render::values::{parse_number, parse_transform_list, parse_url_reference};
use crate::scene::{Group, Paint, Pattern, UnitSpace};
use crate::source::{Document, RenderingHint, SourceId};

pub(crate) fn rect_geometry(rect: Rect) -> PathGeometry {
    let mut figure = PathFigure::new(Point::new(rect.x, rect.y));
    figure.line_to(Point::new(rect.max_x(), rect.y));
    figure.line_to(Point::new(rect.max_x(), rect.max_y()));
    figure.line_to(Point::new(rect.x, rect.max_y()));
    figure.closed = true;
    PathGeometry::single(figure)
}

/// Approximate bounding box of an element in its own user space: shape
/// geometry bounds, or the union of child boxes for containers.
pub(crate) fn node_bbox(
    doc: &Document,
    node: SourceId,
    options: &crate::config::RenderOptions,
) -> Option<Rect> {
    node_bbox_inner(doc, node, options, 0)
}

fn node_bbox_inner(
    doc: &Document,
    node_id: SourceId,
    options: &crate::config::RenderOptions,
    depth: usize,
) -> Option<Rect> {
    if depth > 16 {
        return None;
    }
    let node = doc.node(node_id);
    match node.rendering_hint {
        RenderingHint::Shape => shapes::build_geometry(node, options)?.bounds(),
        RenderingHint::Container => {
            if node.local_name == "use" {
                let target = doc.resolve_reference(node_id)?;
                let inner = node_bbox_inner(doc, target, options, depth + 1)?;
                let tx = node.attribute("x").and_then(parse_number).unwrap_or(0.0);
                let ty = node.attribute("y").and_then(parse_number).unwrap_or(0.0);
                return Some(Transform::translate(tx, ty).apply_rect(&inner));
            }
            let mut bounds: Option<Rect> = None;
            for child in node.children() {
                let Some(mut child_bounds) = node_bbox_inner(doc, *child, options, depth + 1)
                else {
                    continue;
                };
                if let Some(transform) = doc
                    .node(*child)
                    .attribute("transform")
                    .and_then(parse_transform_list)
                {
                    child_bounds = transform.apply_rect(&child_bounds);
                }
                bounds = Some(match bounds {
                    Some(existing) => existing.union(&child_bounds),
                    None => child_bounds,
                });
            }
            bounds
        }
        _ => None,
    }
}

/// Effective clip geometry from the node's `clip-path` reference: every
/// child shape of the referenced clip converts to geometry and the results
/// union into one geometry. `objectBoundingBox` units rescale the union into
/// the target's box.
pub(crate) fn resolve_clip_path(
    ctx: &RenderContext,
    doc: &Document,
    node: SourceId,
    bbox: Option<Rect>,
) -> Option<PathGeometry> {
    let value = doc.node(node).computed_value("clip-path")?;
    let id = parse_url_reference(value)?;
    let clip_id = doc.element_by_id(id)?;
    clip_content_geometry(ctx, doc, clip_id, bbox, 0)
}

fn clip_content_geometry(
    ctx: &RenderContext,
    doc: &Document,
    clip_id: SourceId,
    bbox: Option<Rect>,
    depth: usize,
) -> Option<PathGeometry> {
    if depth > 4 {
        return None;
    }
    let clip_node = doc.node(clip_id);
    if clip_node.local_name != "clipPath" {
        return None;
    }

    let mut union = PathGeometry::new();
    let mut fill_rule = FillRule::Nonzero;
    for child_id in clip_node.children() {
        // A use child contributes its referenced shape.
        let (shape_id, use_offset) = if doc.node(*child_id).local_name == "use" {
            let Some(target) = doc.resolve_reference(*child_id) else {
                continue;
            };
            let child = doc.node(*child_id);
            let tx = child.attribute("x").and_then(parse_number).unwrap_or(0.0);
            let ty = child.attribute("y").and_then(parse_number).unwrap_or(0.0);
            (target, Some(Transform::translate(tx, ty)))
        } else {
            (*child_id, None)
        };
        let shape = doc.node(shape_id);
        if shape.rendering_hint != RenderingHint::Shape {
            continue;
        }
        let Some(geometry) = shapes::build_geometry(shape, &ctx.options) else {
            continue;
        };
        if shape.computed_value("clip-rule") == Some("evenodd") {
            fill_rule = FillRule::EvenOdd;
        }

        let mut transform = doc
            .node(*child_id)
            .attribute("transform")
            .and_then(parse_transform_list)
            .unwrap_or_default();
        if let Some(offset) = use_offset {
            transform = offset.pre_concat(transform);
        }
        if transform.is_identity() {
            union.append(geometry);
        } else {
            union.append(geometry.transformed(&transform));
        }
    }
    if union.is_empty() {
        return None;
    }
    union.fill_rule = fill_rule;

    if let Some(transform) = clip_node
        .attribute("transform")
        .and_then(parse_transform_list)
    {
        union = union.transformed(&transform);
    }

    // Bounding-box units: rescale the unit-space clip into the target box.
    let units = clip_node
        .attribute("clipPathUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or(UnitSpace::UserSpace);
    if units == UnitSpace::ObjectBoundingBox {
        let bbox = bbox?;
        let to_bbox =
            Transform::translate(bbox.x, bbox.y).pre_concat(Transform::scale(bbox.width, bbox.height));
        union = union.transformed(&to_bbox);
    }

    // A clip-path on the clip source intersects; figures concatenate under
    // the combined fill rule.
    if let Some(outer_value) = clip_node.computed_value("clip-path")
        && let Some(outer_id) = parse_url_reference(outer_value)
        && let Some(outer) = doc.element_by_id(outer_id)
        && let Some(outer_geometry) = clip_content_geometry(ctx, doc, outer, bbox, depth + 1)
    {
        union.append(outer_geometry);
    }

    Some(union)
}

/// Viewport clip for container-like nodes (root, symbol, marker, pattern)
/// whose `overflow` computes to hidden or scroll. An explicit `clip` rect
/// shorthand takes precedence over the viewport.
pub(crate) fn overflow_clip(
    doc: &Document,
    node: SourceId,
    viewport: Rect,
) -> Option<PathGeometry> {
    let source = doc.node(node);
    let overflow = source.computed_value("overflow").unwrap_or("hidden");
    if overflow != "hidden" && overflow != "scroll" {
        return None;
    }
    let rect = match source.computed_value("clip") {
        Some(value) => parse_clip_rect(value, viewport).unwrap_or(viewport),
        None => viewport,
    };
    if rect.is_degenerate() {
        return None;
    }
    Some(rect_geometry(rect))
}

/// CSS `clip: rect(top, right, bottom, left)` against the viewport box.
fn parse_clip_rect(value: &str, viewport: Rect) -> Option<Rect> {
    let inner = value
        .trim()
        .strip_prefix("rect(")?
        .strip_suffix(')')?
        .trim();
    let parts: Vec<&str> = inner.split([',', ' ']).filter(|s| !s.is_empty()).collect();
    let [top, right, bottom, left] = parts.as_slice() else {
        return None;
    };
    let edge = |raw: &str, auto_value: f32| -> f32 {
        if raw == "auto" {
            auto_value
        } else {
            parse_number(raw).unwrap_or(auto_value)
        }
    };
    let top = edge(top, 0.0);
    let right = edge(right, viewport.width);
    let bottom = edge(bottom, viewport.height);
    let left = edge(left, 0.0);
    Some(Rect::new(
        viewport.x + left,
        viewport.y + top,
        right - left,
        bottom - top,
    ))
}

/// Renders the referenced mask's content into an independent sub-scene and
/// wraps it as a tileable opacity-mask paint sized to the content bounds.
pub(crate) fn resolve_mask(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    bbox: Option<Rect>,
) -> Result<Option<Paint>, RenderError> {
    let Some(value) = doc.node(node).computed_value("mask") else {
        return Ok(None);
    };
    let Some(id) = parse_url_reference(value) else {
        return Ok(None);
    };
    let Some(mask_id) = doc.element_by_id(id) else {
        return Ok(None);
    };
    let mask_node = doc.node(mask_id);
    if mask_node.local_name != "mask" {
        return Ok(None);
    }

    let units = mask_node
        .attribute("maskUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or(UnitSpace::ObjectBoundingBox);
    let content_units = mask_node
        .attribute("maskContentUnits")
        .and_then(UnitSpace::parse)
        .unwrap_or(UnitSpace::UserSpace);

    let mask_uid = mask_node.unique_id.clone();
    if !ctx.begin_reference(&mask_uid) {
        return Ok(None);
    }
    let result = render_mask_content(ctx, doc, mask_id);
    ctx.end_reference(&mask_uid);
    let content = result?;

    let tile = content
        .bounds
        .or(bbox)
        .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
    Ok(Some(Paint::Pattern(Box::new(Pattern {
        content,
        tile,
        units,
        content_units,
        transform: None,
    }))))
}

fn render_mask_content(
    ctx: &mut RenderContext,
    doc: &Document,
    mask_id: SourceId,
) -> Result<crate::scene::Scene, RenderError> {
    let mut nested = ctx.nested();
    let root = nested.open_group(Group::default());
    for child in doc.node(mask_id).children() {
        crate::render::dispatch(doc, *child, &mut nested)?;
    }
    nested.close_group(root, "mask")?;
    nested.uninitialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderOptions;

    fn context() -> RenderContext {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        ctx
    }

    #[test]
    fn clip_path_unions_child_shapes() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let clip = doc.add_child(root, "clipPath");
        doc.set_attribute(clip, "id", "c");
        let first = doc.add_child(clip, "rect");
        doc.set_attribute(first, "width", "4");
        doc.set_attribute(first, "height", "4");
        let second = doc.add_child(clip, "circle");
        doc.set_attribute(second, "cx", "10");
        doc.set_attribute(second, "cy", "10");
        doc.set_attribute(second, "r", "2");
        let target = doc.add_child(root, "rect");
        doc.set_attribute(target, "clip-path", "url(#c)");
        let ctx = context();
        let geometry = resolve_clip_path(&ctx, &doc, target, None).unwrap();
        assert_eq!(geometry.figures.len(), 2);
    }

    #[test]
    fn object_bounding_box_clip_rescales_into_target() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let clip = doc.add_child(root, "clipPath");
        doc.set_attribute(clip, "id", "c");
        doc.set_attribute(clip, "clipPathUnits", "objectBoundingBox");
        let unit = doc.add_child(clip, "rect");
        doc.set_attribute(unit, "width", "0.5");
        doc.set_attribute(unit, "height", "1");
        let target = doc.add_child(root, "rect");
        doc.set_attribute(target, "clip-path", "url(#c)");
        let ctx = context();
        let bbox = Rect::new(20.0, 30.0, 40.0, 10.0);
        let geometry = resolve_clip_path(&ctx, &doc, target, Some(bbox)).unwrap();
        let bounds = geometry.bounds().unwrap();
        // Clip bounds stay inside the unit square mapped onto the box.
        assert!(bbox.contains_rect(&bounds));
        assert_eq!(bounds, Rect::new(20.0, 30.0, 20.0, 10.0));
    }

    #[test]
    fn missing_or_foreign_reference_yields_no_clip() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let target = doc.add_child(root, "rect");
        doc.set_attribute(target, "clip-path", "url(#nope)");
        let ctx = context();
        assert!(resolve_clip_path(&ctx, &doc, target, None).is_none());
    }

    #[test]
    fn overflow_visible_disables_viewport_clip() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let viewport = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(overflow_clip(&doc, root, viewport).is_some());
        doc.set_computed(root, "overflow", "visible");
        assert!(overflow_clip(&doc, root, viewport).is_none());
    }

    #[test]
    fn explicit_clip_rect_overrides_viewport() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        doc.set_computed(root, "clip", "rect(10, 90, 40, 5)");
        let viewport = Rect::new(0.0, 0.0, 100.0, 50.0);
        let geometry = overflow_clip(&doc, root, viewport).unwrap();
        assert_eq!(geometry.bounds(), Some(Rect::new(5.0, 10.0, 85.0, 30.0)));
    }
}
