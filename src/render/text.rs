use crate::error::RenderError;
use crate::render::context::RenderContext;
use crate::render::paint;
use crate::render::values::parse_number;
use crate::scene::{SceneNode, TextRun};
use crate::source::{Document, SourceId};
use crate::text_metrics;

/// Emits text runs for a text element and its tspan children. Layout is the
/// measurement collaborator's concern; this renderer positions runs and
/// advances the cursor by each measured width.
pub(crate) fn render_text(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
) -> Result<(), RenderError> {
    let source = doc.node(node);
    let mut x = source.attribute("x").and_then(parse_number).unwrap_or(0.0);
    let mut y = source.attribute("y").and_then(parse_number).unwrap_or(0.0);
    emit_runs(ctx, doc, node, &mut x, &mut y)
}

fn emit_runs(
    ctx: &mut RenderContext,
    doc: &Document,
    node: SourceId,
    x: &mut f32,
    y: &mut f32,
) -> Result<(), RenderError> {
    let source = doc.node(node);
    if let Some(px) = source.attribute("x").and_then(parse_number) {
        *x = px;
    }
    if let Some(py) = source.attribute("y").and_then(parse_number) {
        *y = py;
    }

    if let Some(text) = source.text_content.clone()
        && !text.trim().is_empty()
        && !crate::render::is_invisible(source)
    {
        let font_size = source
            .computed_value("font-size")
            .and_then(parse_number)
            .unwrap_or(16.0);
        let requested = source.computed_value("font-family");
        let family = ctx
            .visitors
            .font_family
            .clone()
            .resolve(requested, &ctx.options.default_font_name);
        let width = text_metrics::measure_text_width(&text, font_size, &family)
            .filter(|w| *w > 0.0)
            .unwrap_or_else(|| heuristic_width(&text, font_size));
        let anchored_x = match source.computed_value("text-anchor") {
            Some("middle") => *x - width / 2.0,
            Some("end") => *x - width,
            _ => *x,
        };
        let fill = paint::resolve_fill(ctx, doc, node, None)?;
        ctx.emit(SceneNode::Text(TextRun {
            text,
            x: anchored_x,
            y: *y,
            font_family: family,
            font_size,
            fill,
            width,
        }));
        *x += width;
    }

    for child in source.children() {
        if doc.node(*child).local_name == "tspan" {
            emit_runs(ctx, doc, *child, x, y)?;
        }
    }
    Ok(())
}

fn heuristic_width(text: &str, font_size: f32) -> f32 {
    text.chars().filter(|c| *c != '\n').count() as f32 * font_size * 0.56
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderOptions;
    use crate::scene::Group;

    #[test]
    fn text_emits_run_with_position_and_fill() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let text = doc.add_child(root, "text");
        doc.set_attribute(text, "x", "5");
        doc.set_attribute(text, "y", "20");
        doc.set_attribute(text, "fill", "red");
        doc.set_text_content(text, "hi");
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let group = ctx.open_group(Group::default());
        render_text(&mut ctx, &doc, text).unwrap();
        ctx.close_group(group, "svg").unwrap();
        let scene = ctx.uninitialize().unwrap();
        let (_, _, texts) = scene.node_counts();
        assert_eq!(texts, 1);
        scene.walk_leaves(|_, node| {
            let SceneNode::Text(run) = node else {
                panic!("expected text run");
            };
            assert_eq!(run.text, "hi");
            assert_eq!((run.x, run.y), (5.0, 20.0));
            assert!(run.width > 0.0);
        });
    }

    #[test]
    fn whitespace_only_text_emits_nothing() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let text = doc.add_child(root, "text");
        doc.set_text_content(text, "   ");
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let group = ctx.open_group(Group::default());
        render_text(&mut ctx, &doc, text).unwrap();
        ctx.close_group(group, "svg").unwrap();
        let scene = ctx.uninitialize().unwrap();
        let (_, _, texts) = scene.node_counts();
        assert_eq!(texts, 0);
    }

    #[test]
    fn tspan_children_advance_the_cursor() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let text = doc.add_child(root, "text");
        doc.set_attribute(text, "x", "0");
        doc.set_attribute(text, "y", "10");
        doc.set_text_content(text, "ab");
        let span = doc.add_child(text, "tspan");
        doc.set_text_content(span, "cd");
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let group = ctx.open_group(Group::default());
        render_text(&mut ctx, &doc, text).unwrap();
        ctx.close_group(group, "svg").unwrap();
        let scene = ctx.uninitialize().unwrap();
        let mut runs = Vec::new();
        scene.walk_leaves(|_, node| {
            if let SceneNode::Text(run) = node {
                runs.push((run.x, run.width));
            }
        });
        assert_eq!(runs.len(), 2);
        // The second run starts where the first one ended.
        assert!((runs[1].0 - runs[0].1).abs() < 1e-4);
    }
}
