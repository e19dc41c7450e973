use std::cell::RefCell;
use std::rc::Rc;

use svgscene::color::Color;
use svgscene::geometry::Rect;
use svgscene::render::cache;
use svgscene::scene::{Paint, Scene, SceneArena, SceneId, SceneNode};
use svgscene::source::SourceId;
use svgscene::visitors::{EmbeddedImageVisitor, LinkVisitor, Visitors};
use svgscene::{Document, RenderOptions, render_document, render_document_with_visitors};

fn render(doc: &Document) -> Scene {
    render_with(doc, &RenderOptions::default())
}

fn render_with(doc: &Document, options: &RenderOptions) -> Scene {
    cache::initialize();
    render_document(doc, options).expect("render failed")
}

fn drawings(scene: &Scene) -> Vec<svgscene::scene::Drawing> {
    let mut out = Vec::new();
    scene.walk_leaves(|_, node| {
        if let SceneNode::Drawing(drawing) = node {
            out.push(drawing.clone());
        }
    });
    out
}

fn svg_root(doc: &mut Document) -> SourceId {
    doc.add_root("svg")
}

#[test]
fn solid_rect_scene_shape() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let rect = doc.add_child(root, "rect");
    doc.set_attribute(rect, "width", "10");
    doc.set_attribute(rect, "height", "10");
    doc.set_attribute(rect, "fill", "red");
    let scene = render(&doc);
    let (groups, drawing_count, texts) = scene.node_counts();
    assert_eq!((groups, drawing_count, texts), (1, 1, 0));
    let leaves = drawings(&scene);
    assert_eq!(
        leaves[0].fill,
        Paint::Solid {
            color: Color::rgb(255, 0, 0),
            opacity: 1.0
        }
    );
    assert_eq!(
        leaves[0].geometry.bounds(),
        Some(Rect::new(0.0, 0.0, 10.0, 10.0))
    );
    assert_eq!(scene.bounds, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
}

#[test]
fn gradient_fill_resolves_two_stops() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let defs = doc.add_child(root, "defs");
    let gradient = doc.add_child(defs, "linearGradient");
    doc.set_attribute(gradient, "id", "fade");
    let s0 = doc.add_child(gradient, "stop");
    doc.set_attribute(s0, "offset", "0%");
    doc.set_attribute(s0, "stop-color", "red");
    let s1 = doc.add_child(gradient, "stop");
    doc.set_attribute(s1, "offset", "100%");
    doc.set_attribute(s1, "stop-color", "blue");
    let rect = doc.add_child(root, "rect");
    doc.set_attribute(rect, "width", "20");
    doc.set_attribute(rect, "height", "10");
    doc.set_attribute(rect, "fill", "url(#fade)");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    let Paint::Gradient(gradient) = &leaves[0].fill else {
        panic!("expected gradient fill");
    };
    assert_eq!(gradient.stops.len(), 2);
    assert_eq!(gradient.stops[0].offset, 0.0);
    assert_eq!(gradient.stops[1].offset, 1.0);
}

#[test]
fn pattern_fill_renders_tile_subscene() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let pattern = doc.add_child(root, "pattern");
    doc.set_attribute(pattern, "id", "dots");
    doc.set_attribute(pattern, "width", "0.25");
    doc.set_attribute(pattern, "height", "0.25");
    let dot = doc.add_child(pattern, "circle");
    doc.set_attribute(dot, "cx", "2");
    doc.set_attribute(dot, "cy", "2");
    doc.set_attribute(dot, "r", "1");
    doc.set_attribute(dot, "fill", "black");
    let rect = doc.add_child(root, "rect");
    doc.set_attribute(rect, "width", "40");
    doc.set_attribute(rect, "height", "40");
    doc.set_attribute(rect, "fill", "url(#dots)");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    let Paint::Pattern(pattern) = &leaves[0].fill else {
        panic!("expected pattern fill");
    };
    // Tile resolved against the 40x40 bounding box.
    assert_eq!(pattern.tile, Rect::new(0.0, 0.0, 10.0, 10.0));
    let (_, tile_drawings, _) = pattern.content.node_counts();
    assert_eq!(tile_drawings, 1);
}

#[test]
fn self_referential_use_is_suppressed() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let use_el = doc.add_child(root, "use");
    doc.set_attribute(use_el, "id", "self");
    doc.set_attribute(use_el, "href", "#self");
    let scene = render(&doc);
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 0);
    assert!(!scene.diagnostics.is_empty());
}

#[test]
fn indirect_use_cycle_is_suppressed() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let group = doc.add_child(root, "g");
    doc.set_attribute(group, "id", "loop");
    let rect = doc.add_child(group, "rect");
    doc.set_attribute(rect, "width", "5");
    doc.set_attribute(rect, "height", "5");
    let inner_use = doc.add_child(group, "use");
    doc.set_attribute(inner_use, "href", "#loop");
    let outer_use = doc.add_child(root, "use");
    doc.set_attribute(outer_use, "href", "#loop");
    let scene = render(&doc);
    // The group renders once directly and once through the outer use; the
    // nested self-reference contributes nothing either time.
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 2);
}

#[test]
fn use_of_symbol_fits_viewport() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let symbol = doc.add_child(root, "symbol");
    doc.set_attribute(symbol, "id", "icon");
    doc.set_attribute(symbol, "viewBox", "0 0 10 10");
    let rect = doc.add_child(symbol, "rect");
    doc.set_attribute(rect, "width", "10");
    doc.set_attribute(rect, "height", "10");
    let use_el = doc.add_child(root, "use");
    doc.set_attribute(use_el, "href", "#icon");
    doc.set_attribute(use_el, "width", "20");
    doc.set_attribute(use_el, "height", "20");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    // The symbol's content is scaled 10 -> 20 by the fitted viewport group.
    let scaled = scene.bounds.expect("scene bounds");
    assert_eq!((scaled.width, scaled.height), (20.0, 20.0));
}

#[test]
fn clip_path_attaches_to_group() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let clip = doc.add_child(root, "clipPath");
    doc.set_attribute(clip, "id", "c");
    let clip_rect = doc.add_child(clip, "rect");
    doc.set_attribute(clip_rect, "width", "5");
    doc.set_attribute(clip_rect, "height", "5");
    let rect = doc.add_child(root, "rect");
    doc.set_attribute(rect, "width", "10");
    doc.set_attribute(rect, "height", "10");
    doc.set_attribute(rect, "clip-path", "url(#c)");
    let scene = render(&doc);
    let mut clipped_groups = 0;
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(group) = scene.arena.node(id) {
            if group.clip.is_some() {
                clipped_groups += 1;
            }
            stack.extend(group.children.iter().copied());
        }
    }
    assert_eq!(clipped_groups, 1);
}

#[test]
fn mask_becomes_opacity_mask_paint() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let mask = doc.add_child(root, "mask");
    doc.set_attribute(mask, "id", "m");
    let mask_rect = doc.add_child(mask, "rect");
    doc.set_attribute(mask_rect, "width", "10");
    doc.set_attribute(mask_rect, "height", "10");
    doc.set_attribute(mask_rect, "fill", "white");
    let group = doc.add_child(root, "g");
    doc.set_attribute(group, "mask", "url(#m)");
    let rect = doc.add_child(group, "rect");
    doc.set_attribute(rect, "width", "10");
    doc.set_attribute(rect, "height", "10");
    let scene = render(&doc);
    let mut masked = 0;
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(g) = scene.arena.node(id) {
            if let Some(Paint::Pattern(pattern)) = &g.opacity_mask {
                let (_, mask_drawings, _) = pattern.content.node_counts();
                assert_eq!(mask_drawings, 1);
                masked += 1;
            }
            stack.extend(g.children.iter().copied());
        }
    }
    assert_eq!(masked, 1);
}

#[test]
fn marker_end_places_oriented_content() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let marker = doc.add_child(root, "marker");
    doc.set_attribute(marker, "id", "arrow");
    doc.set_attribute(marker, "markerWidth", "6");
    doc.set_attribute(marker, "markerHeight", "6");
    doc.set_attribute(marker, "refX", "3");
    doc.set_attribute(marker, "refY", "3");
    doc.set_attribute(marker, "orient", "auto");
    let tip = doc.add_child(marker, "path");
    doc.set_attribute(tip, "d", "M0,0 L6,3 L0,6 Z");
    doc.set_attribute(tip, "fill", "black");
    let path = doc.add_child(root, "path");
    doc.set_attribute(path, "d", "M0,0 L0,10");
    doc.set_attribute(path, "stroke", "black");
    doc.set_attribute(path, "marker-end", "url(#arrow)");
    let scene = render(&doc);
    // The host path plus the marker tip.
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 2);
    let mut marker_groups = 0;
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(group) = scene.arena.node(id) {
            if let Some(transform) = group.transform {
                // The placement transform lands on the end vertex (0, 10).
                let origin = transform.apply(svgscene::geometry::Point::new(3.0, 3.0));
                assert!((origin.x - 0.0).abs() < 1e-3);
                assert!((origin.y - 10.0).abs() < 1e-3);
                marker_groups += 1;
            }
            stack.extend(group.children.iter().copied());
        }
    }
    assert_eq!(marker_groups, 1);
}

#[test]
fn marker_content_inherits_context_stroke() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let marker = doc.add_child(root, "marker");
    doc.set_attribute(marker, "id", "dot");
    doc.set_attribute(marker, "markerWidth", "4");
    doc.set_attribute(marker, "markerHeight", "4");
    let dot = doc.add_child(marker, "circle");
    doc.set_attribute(dot, "cx", "2");
    doc.set_attribute(dot, "cy", "2");
    doc.set_attribute(dot, "r", "1");
    doc.set_attribute(dot, "fill", "context-stroke");
    let line = doc.add_child(root, "line");
    doc.set_attribute(line, "x1", "0");
    doc.set_attribute(line, "y1", "0");
    doc.set_attribute(line, "x2", "10");
    doc.set_attribute(line, "y2", "0");
    doc.set_attribute(line, "stroke", "purple");
    doc.set_attribute(line, "marker-start", "url(#dot)");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    // line + one dot; the dot's fill took the host's stroke paint.
    assert_eq!(leaves.len(), 2);
    let dot_fill = leaves
        .iter()
        .find(|d| !d.fill.is_none())
        .map(|d| d.fill.clone())
        .expect("marker fill");
    assert_eq!(dot_fill, Paint::solid(Color::rgb(128, 0, 128)));
}

#[test]
fn malformed_path_data_keeps_partial_geometry() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let path = doc.add_child(root, "path");
    doc.set_attribute(path, "d", "M0,0 L10,0 L10,10 L10,bad");
    doc.set_attribute(path, "fill", "black");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    assert_eq!(
        leaves[0].geometry.bounds(),
        Some(Rect::new(0.0, 0.0, 10.0, 10.0))
    );
}

#[test]
fn stroke_descriptor_carries_dash_properties() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let line = doc.add_child(root, "line");
    doc.set_attribute(line, "x2", "20");
    doc.set_attribute(line, "stroke", "black");
    doc.set_attribute(line, "stroke-width", "2.5");
    doc.set_attribute(line, "stroke-linecap", "round");
    doc.set_attribute(line, "stroke-dasharray", "4 2");
    doc.set_attribute(line, "stroke-dashoffset", "1");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    let stroke = leaves[0].stroke.as_ref().expect("stroke");
    assert_eq!(stroke.width, 2.5);
    assert_eq!(stroke.dash_array, vec![4.0, 2.0]);
    assert_eq!(stroke.dash_offset, 1.0);
    assert_eq!(stroke.cap, svgscene::scene::LineCap::Round);
}

#[test]
fn group_opacity_lands_on_group_not_paint() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let group = doc.add_child(root, "g");
    doc.set_computed(group, "opacity", "0.5");
    let rect = doc.add_child(group, "rect");
    doc.set_attribute(rect, "width", "4");
    doc.set_attribute(rect, "height", "4");
    doc.set_attribute(rect, "fill", "red");
    let scene = render(&doc);
    let mut found = false;
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(g) = scene.arena.node(id) {
            if let Some(opacity) = g.opacity {
                assert!((opacity - 0.5).abs() < 1e-6);
                found = true;
            }
            stack.extend(g.children.iter().copied());
        }
    }
    assert!(found, "group opacity missing");
    let leaves = drawings(&scene);
    let Paint::Solid { opacity, .. } = leaves[0].fill else {
        panic!("expected solid");
    };
    // The leaf's own paint stays at full opacity; the group carries 0.5.
    assert_eq!(opacity, 1.0);
}

#[test]
fn runtime_metadata_names_groups_once() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let first = doc.add_child(root, "g");
    doc.set_attribute(first, "id", "layer");
    let second = doc.add_child(root, "g");
    doc.set_attribute(second, "id", "layer");
    let scene = render(&doc);
    let mut named = 0;
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(group) = scene.arena.node(id) {
            if group.name.as_deref() == Some("layer") {
                named += 1;
            }
            stack.extend(group.children.iter().copied());
        }
    }
    // The duplicated id registers once; the second group stays unnamed.
    assert_eq!(named, 1);

    let mut options = RenderOptions::default();
    options.include_runtime_metadata = false;
    let scene = render_with(&doc, &options);
    let mut stack = vec![scene.root];
    while let Some(id) = stack.pop() {
        if let SceneNode::Group(group) = scene.arena.node(id) {
            assert!(group.name.is_none());
            stack.extend(group.children.iter().copied());
        }
    }
}

struct StubImageVisitor;

impl EmbeddedImageVisitor for StubImageVisitor {
    fn visit(&self, node: &svgscene::source::SourceNode, _options: &RenderOptions) -> Option<Paint> {
        node.attribute("href")?;
        Some(Paint::solid(Color::rgb(1, 2, 3)))
    }
}

#[test]
fn embedded_image_visitor_supplies_paint() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let image = doc.add_child(root, "image");
    doc.set_attribute(image, "href", "data:image/png;base64,AAAA");
    doc.set_attribute(image, "width", "8");
    doc.set_attribute(image, "height", "4");
    cache::initialize();

    // Default visitor: no decoder, no leaf.
    let scene = render_document(&doc, &RenderOptions::default()).unwrap();
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 0);

    let mut visitors = Visitors::default();
    visitors.embedded_image = Rc::new(StubImageVisitor);
    let scene =
        render_document_with_visitors(&doc, &RenderOptions::default(), visitors).unwrap();
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].fill, Paint::solid(Color::rgb(1, 2, 3)));
    assert_eq!(
        leaves[0].geometry.bounds(),
        Some(Rect::new(0.0, 0.0, 8.0, 4.0))
    );
}

struct RecordingLinkVisitor {
    seen: Rc<RefCell<Vec<(Option<String>, f32)>>>,
}

impl LinkVisitor for RecordingLinkVisitor {
    fn visit(
        &self,
        arena: &mut SceneArena,
        group: SceneId,
        node: &svgscene::source::SourceNode,
        opacity: f32,
    ) {
        assert!(arena.group(group).is_some(), "link group is a group node");
        self.seen
            .borrow_mut()
            .push((node.attribute("href").map(str::to_string), opacity));
    }
}

#[test]
fn link_visitor_observes_closed_anchor_groups() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let anchor = doc.add_child(root, "a");
    doc.set_attribute(anchor, "href", "https://example.com/");
    doc.set_computed(anchor, "opacity", "0.5");
    let rect = doc.add_child(anchor, "rect");
    doc.set_attribute(rect, "width", "6");
    doc.set_attribute(rect, "height", "6");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut visitors = Visitors::default();
    visitors.link = Rc::new(RecordingLinkVisitor { seen: seen.clone() });
    cache::initialize();
    let scene =
        render_document_with_visitors(&doc, &RenderOptions::default(), visitors).unwrap();
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 1);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some("https://example.com/"));
    assert!((seen[0].1 - 0.5).abs() < 1e-6);
}

#[test]
fn external_image_blocked_by_policy_records_diagnostic() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let image = doc.add_child(root, "image");
    doc.set_attribute(image, "href", "https://example.com/pic.png");
    doc.set_attribute(image, "width", "8");
    doc.set_attribute(image, "height", "4");
    let mut options = RenderOptions::default();
    options.external_resources = svgscene::ExternalResourceMode::Throw;
    let scene = render_with(&doc, &options);
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 0);
    assert!(
        scene
            .diagnostics
            .iter()
            .any(|d| d.contains("example.com")),
        "expected policy diagnostic, got {:?}",
        scene.diagnostics
    );
}

#[test]
fn nested_svg_translates_by_x_y() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let inner = doc.add_child(root, "svg");
    doc.set_attribute(inner, "x", "15");
    doc.set_attribute(inner, "y", "5");
    let rect = doc.add_child(inner, "rect");
    doc.set_attribute(rect, "width", "10");
    doc.set_attribute(rect, "height", "10");
    doc.set_attribute(rect, "fill", "black");
    let scene = render(&doc);
    assert_eq!(scene.bounds, Some(Rect::new(15.0, 5.0, 10.0, 10.0)));
}

#[test]
fn display_none_skips_subtree() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let group = doc.add_child(root, "g");
    doc.set_computed(group, "display", "none");
    let rect = doc.add_child(group, "rect");
    doc.set_attribute(rect, "width", "5");
    doc.set_attribute(rect, "height", "5");
    let visible = doc.add_child(root, "rect");
    doc.set_attribute(visible, "width", "7");
    doc.set_attribute(visible, "height", "7");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].geometry.bounds().unwrap().width, 7.0);
}

#[test]
fn visibility_hidden_suppresses_painting_only() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let hidden = doc.add_child(root, "rect");
    doc.set_computed(hidden, "visibility", "hidden");
    doc.set_attribute(hidden, "width", "5");
    doc.set_attribute(hidden, "height", "5");
    let scene = render(&doc);
    let (_, drawing_count, _) = scene.node_counts();
    assert_eq!(drawing_count, 0);
}

#[test]
fn text_anchor_middle_centers_run() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let text = doc.add_child(root, "text");
    doc.set_attribute(text, "x", "50");
    doc.set_attribute(text, "y", "10");
    doc.set_computed(text, "text-anchor", "middle");
    doc.set_text_content(text, "centered");
    let scene = render(&doc);
    scene.walk_leaves(|_, node| {
        if let SceneNode::Text(run) = node {
            assert!((run.x - (50.0 - run.width / 2.0)).abs() < 1e-4);
        }
    });
}

#[test]
fn pattern_view_box_rescales_tile_content() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let pattern = doc.add_child(root, "pattern");
    doc.set_attribute(pattern, "id", "p");
    doc.set_attribute(pattern, "width", "0.5");
    doc.set_attribute(pattern, "height", "0.5");
    doc.set_attribute(pattern, "viewBox", "0 0 4 4");
    let tile_rect = doc.add_child(pattern, "rect");
    doc.set_attribute(tile_rect, "width", "4");
    doc.set_attribute(tile_rect, "height", "4");
    let rect = doc.add_child(root, "rect");
    doc.set_attribute(rect, "width", "20");
    doc.set_attribute(rect, "height", "20");
    doc.set_attribute(rect, "fill", "url(#p)");
    let scene = render(&doc);
    let leaves = drawings(&scene);
    let Paint::Pattern(pattern) = &leaves[0].fill else {
        panic!("expected pattern fill");
    };
    assert_eq!(pattern.tile, Rect::new(0.0, 0.0, 10.0, 10.0));
    // The 4x4 viewBox maps onto the 10x10 tile: uniform scale 2.5.
    let fit = pattern
        .content
        .root_group()
        .transform
        .expect("content fit transform");
    assert!((fit.a - 2.5).abs() < 1e-5);
}

#[test]
fn text_produces_measured_run() {
    let mut doc = Document::new();
    let root = svg_root(&mut doc);
    let text = doc.add_child(root, "text");
    doc.set_attribute(text, "x", "2");
    doc.set_attribute(text, "y", "12");
    doc.set_attribute(text, "fill", "black");
    doc.set_text_content(text, "hello");
    let scene = render(&doc);
    let (_, _, texts) = scene.node_counts();
    assert_eq!(texts, 1);
    scene.walk_leaves(|_, node| {
        if let SceneNode::Text(run) = node {
            assert_eq!(run.text, "hello");
            assert!(run.width > 0.0);
        }
    });
}
