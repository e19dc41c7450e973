use std::rc::Rc;

use crate::config::{ExternalResourceMode, RenderOptions};
use crate::scene::{Paint, SceneArena, SceneId};
use crate::source::SourceNode;

/// Produces the name recorded on a node's scene group. The default uses the
/// element id verbatim.
pub trait IdVisitor {
    fn visit(&self, node: &SourceNode) -> Option<String>;
}

/// Produces the class metadata recorded on a node's scene group.
pub trait ClassVisitor {
    fn visit(&self, node: &SourceNode) -> Option<String>;
}

/// Observes link (`a`) groups as they are closed; an implementation may
/// aggregate the linked content into its own overlay structure.
pub trait LinkVisitor {
    fn visit(
        &self,
        arena: &mut SceneArena,
        group: SceneId,
        node: &SourceNode,
        opacity: f32,
    );
}

/// Maps a requested font family list to the family handed to the text
/// measurer.
pub trait FontFamilyVisitor {
    fn resolve(&self, requested: Option<&str>, default_font: &str) -> String;
}

/// Supplies the paint for an `image` element. The default honors the
/// external-resource mode: inline data URIs yield nothing here (decoding is
/// a host concern) and external references are skipped.
pub trait EmbeddedImageVisitor {
    fn visit(&self, node: &SourceNode, options: &RenderOptions) -> Option<Paint>;
}

pub struct DefaultIdVisitor;

impl IdVisitor for DefaultIdVisitor {
    fn visit(&self, node: &SourceNode) -> Option<String> {
        node.id.clone()
    }
}

pub struct DefaultClassVisitor;

impl ClassVisitor for DefaultClassVisitor {
    fn visit(&self, node: &SourceNode) -> Option<String> {
        node.attribute("class").map(str::to_string)
    }
}

pub struct DefaultLinkVisitor;

impl LinkVisitor for DefaultLinkVisitor {
    fn visit(&self, _arena: &mut SceneArena, _group: SceneId, _node: &SourceNode, _opacity: f32) {}
}

pub struct DefaultFontFamilyVisitor;

impl FontFamilyVisitor for DefaultFontFamilyVisitor {
    fn resolve(&self, requested: Option<&str>, default_font: &str) -> String {
        match requested {
            Some(family) if !family.trim().is_empty() => family.to_string(),
            _ => default_font.to_string(),
        }
    }
}

pub struct DefaultEmbeddedImageVisitor;

impl EmbeddedImageVisitor for DefaultEmbeddedImageVisitor {
    fn visit(&self, node: &SourceNode, options: &RenderOptions) -> Option<Paint> {
        let href = node
            .attribute("href")
            .or_else(|| node.attribute("xlink:href"))?;
        if href.starts_with("data:") {
            return None;
        }
        match options.external_resources {
            ExternalResourceMode::Allow => None,
            ExternalResourceMode::Ignore | ExternalResourceMode::Throw => None,
        }
    }
}

/// The pluggable hook set queried during rendering. Handles are shared so
/// nested contexts (patterns, masks) observe the same visitors.
#[derive(Clone)]
pub struct Visitors {
    pub id: Rc<dyn IdVisitor>,
    pub class: Rc<dyn ClassVisitor>,
    pub link: Rc<dyn LinkVisitor>,
    pub font_family: Rc<dyn FontFamilyVisitor>,
    pub embedded_image: Rc<dyn EmbeddedImageVisitor>,
}

impl Default for Visitors {
    fn default() -> Self {
        Self {
            id: Rc::new(DefaultIdVisitor),
            class: Rc::new(DefaultClassVisitor),
            link: Rc::new(DefaultLinkVisitor),
            font_family: Rc::new(DefaultFontFamilyVisitor),
            embedded_image: Rc::new(DefaultEmbeddedImageVisitor),
        }
    }
}
