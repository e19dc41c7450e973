pub mod cache;
pub mod context;

pub(crate) mod clip;
pub(crate) mod marker;
pub(crate) mod paint;
pub(crate) mod shapes;
pub(crate) mod text;
pub(crate) mod values;

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::config::{ExternalResourceMode, RenderOptions};
use crate::error::RenderError;
use crate::geometry::{Rect, Transform};
use crate::scene::{Drawing, Group, Paint, Scene, SceneId, SceneNode};
use crate::source::{Document, RenderingHint, SourceId, SourceNode};
use crate::visitors::Visitors;

pub use context::{PaintContext, RenderContext};

use values::{parse_number, parse_transform_list, parse_view_box};

static SUPPORTED_FEATURES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "http://www.w3.org/TR/SVG11/feature#SVG",
        "http://www.w3.org/TR/SVG11/feature#SVG-static",
        "http://www.w3.org/TR/SVG11/feature#CoreAttribute",
        "http://www.w3.org/TR/SVG11/feature#Structure",
        "http://www.w3.org/TR/SVG11/feature#BasicStructure",
        "http://www.w3.org/TR/SVG11/feature#ConditionalProcessing",
        "http://www.w3.org/TR/SVG11/feature#Shape",
        "http://www.w3.org/TR/SVG11/feature#Image",
        "http://www.w3.org/TR/SVG11/feature#Style",
        "http://www.w3.org/TR/SVG11/feature#PaintAttribute",
        "http://www.w3.org/TR/SVG11/feature#BasicPaintAttribute",
        "http://www.w3.org/TR/SVG11/feature#OpacityAttribute",
        "http://www.w3.org/TR/SVG11/feature#GraphicsAttribute",
        "http://www.w3.org/TR/SVG11/feature#BasicGraphicsAttribute",
        "http://www.w3.org/TR/SVG11/feature#Marker",
        "http://www.w3.org/TR/SVG11/feature#Gradient",
        "http://www.w3.org/TR/SVG11/feature#Pattern",
        "http://www.w3.org/TR/SVG11/feature#Clip",
        "http://www.w3.org/TR/SVG11/feature#BasicClip",
        "http://www.w3.org/TR/SVG11/feature#Mask",
        "http://www.w3.org/TR/SVG11/feature#Text",
        "http://www.w3.org/TR/SVG11/feature#BasicText",
        "http://www.w3.org/TR/SVG11/feature#Hyperlinking",
    ]
    .into_iter()
    .collect()
});

/// Closed set of renderable element kinds; the renderer cache is keyed by
/// this classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ElementKind {
    Svg,
    Group,
    Anchor,
    Use,
    Switch,
    Rect,
    Circle,
    Ellipse,
    Line,
    Polyline,
    Polygon,
    Path,
    Text,
    Image,
}

impl ElementKind {
    /// Selects the renderer kind for a node, special-casing
    /// container/shape/text via the rendering hint for names outside the
    /// known set. None means the node does not render in normal flow
    /// (defs, paint servers, clip and mask sources, standalone symbols).
    fn classify(node: &SourceNode) -> Option<ElementKind> {
        let kind = match node.local_name.as_str() {
            "svg" => ElementKind::Svg,
            "g" => ElementKind::Group,
            "a" => ElementKind::Anchor,
            "use" => ElementKind::Use,
            "switch" => ElementKind::Switch,
            "rect" => ElementKind::Rect,
            "circle" => ElementKind::Circle,
            "ellipse" => ElementKind::Ellipse,
            "line" => ElementKind::Line,
            "polyline" => ElementKind::Polyline,
            "polygon" => ElementKind::Polygon,
            "path" => ElementKind::Path,
            "text" => ElementKind::Text,
            "image" => ElementKind::Image,
            "defs" | "symbol" | "marker" | "clipPath" | "mask" | "linearGradient"
            | "radialGradient" | "pattern" | "stop" | "style" | "title" | "desc"
            | "metadata" => return None,
            _ => match node.rendering_hint {
                RenderingHint::Container => ElementKind::Group,
                RenderingHint::Text => ElementKind::Text,
                RenderingHint::Shape => ElementKind::Path,
                _ => return None,
            },
        };
        Some(kind)
    }

    fn is_shape(self) -> bool {
        matches!(
            self,
            ElementKind::Rect
                | ElementKind::Circle
                | ElementKind::Ellipse
                | ElementKind::Line
                | ElementKind::Polyline
                | ElementKind::Polygon
                | ElementKind::Path
        )
    }

    fn takes_markers(self) -> bool {
        matches!(
            self,
            ElementKind::Path | ElementKind::Line | ElementKind::Polyline | ElementKind::Polygon
        )
    }
}

/// Transient per-node renderer state, pooled in the cache and rebound to a
/// node through `initialize`.
pub(crate) struct Renderer {
    kind: ElementKind,
    node: Option<SourceId>,
    group: Option<SceneId>,
    self_terminal: bool,
}

impl Renderer {
    pub(crate) fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            node: None,
            group: None,
            self_terminal: false,
        }
    }

    /// Rebinds the instance to a node, resetting all per-node state.
    pub(crate) fn initialize(&mut self, node: SourceId) {
        self.node = Some(node);
        self.group = None;
        self.self_terminal = false;
    }

    fn node_id(&self) -> SourceId {
        self.node.expect("renderer used before initialize")
    }

    /// True when the renderer dispatches (or suppresses) its own children.
    fn handles_children(&self) -> bool {
        !matches!(
            self.kind,
            ElementKind::Svg | ElementKind::Group | ElementKind::Anchor
        )
    }

    fn before_render(&mut self, doc: &Document, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let node_id = self.node_id();
        match self.kind {
            ElementKind::Svg => self.before_viewport(doc, ctx, node_id),
            ElementKind::Group | ElementKind::Anchor | ElementKind::Switch => {
                self.group = Some(open_container_group(doc, ctx, node_id, None)?);
                Ok(())
            }
            ElementKind::Use => {
                let node = doc.node(node_id);
                let x = node.attribute("x").and_then(parse_number).unwrap_or(0.0);
                let y = node.attribute("y").and_then(parse_number).unwrap_or(0.0);
                let offset = (x != 0.0 || y != 0.0).then(|| Transform::translate(x, y));
                self.group = Some(open_container_group(doc, ctx, node_id, offset)?);
                Ok(())
            }
            kind if kind.is_shape() => self.before_leafish(doc, ctx, node_id),
            ElementKind::Text | ElementKind::Image => self.before_leafish(doc, ctx, node_id),
            _ => Ok(()),
        }
    }

    /// Root and nested `svg` viewports: viewBox fitting, degenerate-size
    /// self-termination, and the overflow viewport clip.
    fn before_viewport(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        let node = doc.node(node_id);
        let is_root = node.parent().is_none();
        let view_box = if is_root && ctx.options.ignore_root_viewbox {
            None
        } else {
            node.attribute("viewBox").and_then(parse_view_box)
        };

        // Percentage sizes resolve against the viewBox when one exists and
        // stay indeterminate otherwise.
        let width = viewport_length(node.attribute("width"), view_box.map(|vb| vb.width));
        let height = viewport_length(node.attribute("height"), view_box.map(|vb| vb.height));
        if width.is_some_and(|w| w <= 0.0) || height.is_some_and(|h| h <= 0.0) {
            // Invalid viewport: the node renders nothing below it.
            self.self_terminal = true;
        }

        let mut transform = Transform::identity();
        if !is_root {
            let x = node.attribute("x").and_then(parse_number).unwrap_or(0.0);
            let y = node.attribute("y").and_then(parse_number).unwrap_or(0.0);
            if x != 0.0 || y != 0.0 {
                transform = transform.pre_concat(Transform::translate(x, y));
            }
        }
        if let Some(view_box) = view_box {
            if ctx.options.ensure_viewbox_size
                && let (Some(width), Some(height)) = (width, height)
                && width > 0.0
                && height > 0.0
            {
                let ratio = values::parse_preserve_aspect_ratio(
                    node.attribute("preserveAspectRatio").unwrap_or_default(),
                );
                let mut fit = values::view_box_transform(view_box, width, height, ratio);
                if !ctx.options.ensure_viewbox_position {
                    // Undo the min-x/min-y shift when only size fitting is
                    // wanted.
                    fit = fit.pre_concat(Transform::translate(view_box.x, view_box.y));
                }
                transform = transform.pre_concat(fit);
            } else if ctx.options.ensure_viewbox_position {
                transform =
                    transform.pre_concat(Transform::translate(-view_box.x, -view_box.y));
            }
        }
        if let Some(attr_transform) = node.attribute("transform").and_then(parse_transform_list) {
            transform = transform.pre_concat(attr_transform);
        }

        let viewport = match (view_box, width, height) {
            (Some(vb), _, _) => Some(Rect::new(vb.x, vb.y, vb.width, vb.height)),
            (None, Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(Rect::new(0.0, 0.0, w, h)),
            _ => None,
        };
        let clip = viewport.and_then(|viewport| clip::overflow_clip(doc, node_id, viewport));

        let opacity = node
            .computed_value("opacity")
            .and_then(paint::parse_opacity)
            .filter(|o| *o < 1.0);
        let (name, class) = ctx.group_metadata(node);
        self.group = Some(ctx.open_group(Group {
            transform: (!transform.is_identity()).then_some(transform),
            clip,
            opacity,
            name,
            class,
            ..Group::default()
        }));
        Ok(())
    }

    /// Shapes, text and images wrap themselves in a group only when they
    /// carry a transform, clip or mask of their own.
    fn before_leafish(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        let node = doc.node(node_id);
        let transform = node.attribute("transform").and_then(parse_transform_list);
        let bbox = clip::node_bbox(doc, node_id, &ctx.options);
        let clip = clip::resolve_clip_path(ctx, doc, node_id, bbox);
        let mask = clip::resolve_mask(ctx, doc, node_id, bbox)?;
        if transform.is_none() && clip.is_none() && mask.is_none() {
            return Ok(());
        }
        self.group = Some(ctx.open_group(Group {
            transform,
            clip,
            opacity_mask: mask,
            ..Group::default()
        }));
        Ok(())
    }

    fn render(&mut self, doc: &Document, ctx: &mut RenderContext) -> Result<(), RenderError> {
        if self.self_terminal {
            return Ok(());
        }
        let node_id = self.node_id();
        match self.kind {
            kind if kind.is_shape() => self.render_shape(doc, ctx, node_id),
            ElementKind::Use => self.render_use(doc, ctx, node_id),
            ElementKind::Switch => self.render_switch(doc, ctx, node_id),
            ElementKind::Text => text::render_text(ctx, doc, node_id),
            ElementKind::Image => self.render_image(doc, ctx, node_id),
            _ => Ok(()),
        }
    }

    fn render_shape(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        let node = doc.node(node_id);
        if is_invisible(node) {
            return Ok(());
        }
        let Some(geometry) = shapes::build_geometry(node, &ctx.options) else {
            // Degenerate shape: no leaf, no markers.
            return Ok(());
        };
        let bbox = geometry.bounds();
        let fill = paint::resolve_fill(ctx, doc, node_id, bbox)?;
        let stroke = paint::resolve_stroke(ctx, doc, node_id, bbox)?;
        paint::register_paint_context(ctx, node, &fill, stroke.as_ref());

        let stroke_width = stroke
            .as_ref()
            .map(|s| s.width)
            .unwrap_or_else(|| paint::resolve_stroke_width(node));
        // Lines have no interior; their fill declaration still feeds the
        // paint context above but never paints.
        let fillable = geometry.figures.iter().any(|figure| figure.filled);
        let leaf_fill = if fillable { fill } else { Paint::None };
        if !leaf_fill.is_none() || stroke.is_some() {
            ctx.emit(SceneNode::Drawing(Drawing {
                fill: leaf_fill,
                stroke,
                geometry: geometry.clone(),
            }));
        }
        if self.kind.takes_markers() {
            marker::render_markers(ctx, doc, node_id, &geometry, stroke_width)?;
        }
        Ok(())
    }

    /// Use expansion renders the referenced subtree in place; an in-flight
    /// guard rejects re-entrant expansion of the same reference.
    fn render_use(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        let Some(target) = doc.resolve_reference(node_id) else {
            return Ok(());
        };
        let target_uid = doc.node(target).unique_id.clone();
        if !ctx.begin_reference(&target_uid) {
            ctx.add_diagnostic(format!(
                "re-entrant use of #{target_uid} skipped while it is being expanded"
            ));
            return Ok(());
        }
        let result = match doc.node(target).local_name.as_str() {
            "symbol" | "svg" => render_use_viewport(doc, ctx, node_id, target),
            _ => dispatch(doc, target, ctx),
        };
        ctx.end_reference(&target_uid);
        result
    }

    /// Conditional containers render only the first child whose test
    /// predicates all pass.
    fn render_switch(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        for child in doc.node(node_id).children() {
            let child_node = doc.node(*child);
            if ElementKind::classify(child_node).is_none() {
                continue;
            }
            if switch_predicates_pass(child_node, &ctx.options) {
                return dispatch(doc, *child, ctx);
            }
        }
        Ok(())
    }

    fn render_image(
        &mut self,
        doc: &Document,
        ctx: &mut RenderContext,
        node_id: SourceId,
    ) -> Result<(), RenderError> {
        let node = doc.node(node_id);
        if is_invisible(node) {
            return Ok(());
        }
        let href = node
            .attribute("href")
            .or_else(|| node.attribute("xlink:href"));
        if let Some(href) = href
            && !href.starts_with("data:")
            && ctx.options.external_resources == ExternalResourceMode::Throw
        {
            let message = format!("external image reference {href} blocked by policy");
            ctx.add_diagnostic(message);
            return Ok(());
        }
        let Some(paint) = ctx.visitors.embedded_image.clone().visit(node, &ctx.options) else {
            return Ok(());
        };
        let x = node.attribute("x").and_then(parse_number).unwrap_or(0.0);
        let y = node.attribute("y").and_then(parse_number).unwrap_or(0.0);
        let width = node.attribute("width").and_then(parse_number).unwrap_or(0.0);
        let height = node.attribute("height").and_then(parse_number).unwrap_or(0.0);
        if width <= 0.0 || height <= 0.0 {
            return Ok(());
        }
        ctx.emit(SceneNode::Drawing(Drawing {
            fill: paint,
            stroke: None,
            geometry: clip::rect_geometry(Rect::new(x, y, width, height)),
        }));
        Ok(())
    }

    fn after_render(&mut self, doc: &Document, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let node_id = self.node_id();
        if let Some(group) = self.group.take() {
            ctx.close_group(group, &doc.node(node_id).local_name)?;
            if self.kind == ElementKind::Anchor {
                let node = doc.node(node_id);
                let opacity = node
                    .computed_value("opacity")
                    .and_then(paint::parse_opacity)
                    .unwrap_or(1.0);
                let visitor = ctx.visitors.link.clone();
                visitor.visit(ctx.arena_mut(), group, node, opacity);
            }
        }
        Ok(())
    }
}

/// `visibility: hidden|collapse` suppresses painting; unlike
/// `display: none`, descendants of containers may still override it.
pub(crate) fn is_invisible(node: &SourceNode) -> bool {
    matches!(
        node.computed_value("visibility").map(str::trim),
        Some("hidden") | Some("collapse")
    )
}

fn viewport_length(value: Option<&str>, base: Option<f32>) -> Option<f32> {
    let value = value?;
    if value.trim().ends_with('%') {
        values::parse_length(value, base?)
    } else {
        parse_number(value)
    }
}

/// Group push shared by the plain container kinds: transform, clip, mask,
/// group opacity and metadata.
fn open_container_group(
    doc: &Document,
    ctx: &mut RenderContext,
    node_id: SourceId,
    inner_transform: Option<Transform>,
) -> Result<SceneId, RenderError> {
    let node = doc.node(node_id);
    let mut transform = node.attribute("transform").and_then(parse_transform_list);
    if let Some(inner) = inner_transform {
        transform = Some(match transform {
            Some(outer) => outer.pre_concat(inner),
            None => inner,
        });
    }
    let bbox = clip::node_bbox(doc, node_id, &ctx.options);
    let clip = clip::resolve_clip_path(ctx, doc, node_id, bbox);
    let mask = clip::resolve_mask(ctx, doc, node_id, bbox)?;
    let opacity = node
        .computed_value("opacity")
        .and_then(paint::parse_opacity)
        .filter(|o| *o < 1.0);
    let (name, class) = ctx.group_metadata(node);
    Ok(ctx.open_group(Group {
        children: Vec::new(),
        transform,
        clip,
        opacity,
        opacity_mask: mask,
        name,
        class,
    }))
}

/// A use of a `symbol` (or nested `svg`) establishes a fitted viewport: the
/// use's width/height map the target's viewBox, clipped when overflow is
/// hidden.
fn render_use_viewport(
    doc: &Document,
    ctx: &mut RenderContext,
    use_id: SourceId,
    target: SourceId,
) -> Result<(), RenderError> {
    let use_node = doc.node(use_id);
    let target_node = doc.node(target);
    let width = use_node
        .attribute("width")
        .or_else(|| target_node.attribute("width"))
        .and_then(parse_number);
    let height = use_node
        .attribute("height")
        .or_else(|| target_node.attribute("height"))
        .and_then(parse_number);
    if width.is_some_and(|w| w <= 0.0) || height.is_some_and(|h| h <= 0.0) {
        return Ok(());
    }
    let view_box = target_node.attribute("viewBox").and_then(parse_view_box);

    let mut transform = Transform::identity();
    if let (Some(view_box), Some(width), Some(height)) = (view_box, width, height) {
        let ratio = values::parse_preserve_aspect_ratio(
            target_node.attribute("preserveAspectRatio").unwrap_or_default(),
        );
        transform = transform.pre_concat(values::view_box_transform(view_box, width, height, ratio));
    }
    let viewport = view_box.or_else(|| {
        let (width, height) = (width?, height?);
        Some(Rect::new(0.0, 0.0, width, height))
    });
    let clip = viewport.and_then(|viewport| clip::overflow_clip(doc, target, viewport));

    let group = ctx.open_group(Group {
        transform: (!transform.is_identity()).then_some(transform),
        clip,
        ..Group::default()
    });
    let mut result = Ok(());
    for child in target_node.children() {
        result = dispatch(doc, *child, ctx);
        if result.is_err() {
            break;
        }
    }
    result?;
    ctx.close_group(group, &target_node.local_name)
}

/// First-match conditional processing over the test attributes.
fn switch_predicates_pass(node: &SourceNode, options: &RenderOptions) -> bool {
    if let Some(features) = node.attribute("requiredFeatures") {
        let trimmed = features.trim();
        if trimmed.is_empty() {
            return false;
        }
        let all_supported = trimmed
            .split_whitespace()
            .all(|feature| SUPPORTED_FEATURES.contains(feature));
        if !all_supported {
            return false;
        }
    }
    if node.attribute("requiredExtensions").is_some() {
        // No extensions are implemented; any requirement fails.
        return false;
    }
    if let Some(languages) = node.attribute("systemLanguage") {
        let trimmed = languages.trim();
        if trimmed.is_empty() {
            return false;
        }
        let wanted = options.primary_language();
        return trimmed.split(',').any(|tag| {
            tag.trim()
                .split(['-', '_'])
                .next()
                .is_some_and(|primary| primary.eq_ignore_ascii_case(&wanted))
        });
    }
    true
}

/// Renders one source node: selects the renderer kind, leases an instance
/// from the cache, and drives it through before/render/children/after. A
/// node already active on the current path is skipped with a diagnostic.
pub(crate) fn dispatch(
    doc: &Document,
    node_id: SourceId,
    ctx: &mut RenderContext,
) -> Result<(), RenderError> {
    let node = doc.node(node_id);
    let Some(kind) = ElementKind::classify(node) else {
        return Ok(());
    };
    if node.computed_value("display").is_some_and(|v| v.trim() == "none") {
        return Ok(());
    }
    let unique_id = node.unique_id.clone();
    if !ctx.enter_node(&unique_id) {
        ctx.add_diagnostic(format!(
            "circular structure at <{}> ({unique_id}); second entry skipped",
            node.local_name
        ));
        return Ok(());
    }
    let result = dispatch_leased(doc, node_id, kind, ctx);
    ctx.exit_node(&unique_id);
    result
}

fn dispatch_leased(
    doc: &Document,
    node_id: SourceId,
    kind: ElementKind,
    ctx: &mut RenderContext,
) -> Result<(), RenderError> {
    let mut lease = cache::acquire(kind)?;
    let renderer = lease.renderer_mut();
    renderer.initialize(node_id);
    renderer.before_render(doc, ctx)?;
    renderer.render(doc, ctx)?;
    if !renderer.handles_children() && !renderer.self_terminal {
        for child in doc.node(node_id).children() {
            dispatch(doc, *child, ctx)?;
        }
    }
    renderer.after_render(doc, ctx)
}

/// Renders a parsed, style-resolved document into a retained scene graph.
/// The renderer cache must have been initialized first.
pub fn render_document(doc: &Document, options: &RenderOptions) -> anyhow::Result<Scene> {
    render_document_with_visitors(doc, options, Visitors::default())
}

pub fn render_document_with_visitors(
    doc: &Document,
    options: &RenderOptions,
    visitors: Visitors,
) -> anyhow::Result<Scene> {
    let Some(root) = doc.root() else {
        anyhow::bail!("document has no root element");
    };
    let mut ctx = RenderContext::with_visitors(options.clone(), visitors);
    ctx.initialize();
    dispatch(doc, root, &mut ctx)?;
    Ok(ctx.uninitialize()?)
}
