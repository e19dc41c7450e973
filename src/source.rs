use std::collections::HashMap;

/// Precomputed classification of a source node, produced by the upstream
/// document/style collaborator and used to drive dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingHint {
    Shape,
    Text,
    Container,
    Image,
    Clipping,
    Masking,
    PaintServer,
    Other,
}

impl RenderingHint {
    pub fn from_local_name(local_name: &str) -> Self {
        match local_name {
            "rect" | "circle" | "ellipse" | "line" | "polyline" | "polygon" | "path" => {
                Self::Shape
            }
            "text" | "tspan" => Self::Text,
            "svg" | "g" | "use" | "switch" | "symbol" | "a" | "defs" | "marker" => {
                Self::Container
            }
            "image" => Self::Image,
            "clipPath" => Self::Clipping,
            "mask" => Self::Masking,
            "linearGradient" | "radialGradient" | "pattern" | "stop" => Self::PaintServer,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub usize);

/// One element of the parsed, style-resolved input document. Attribute and
/// computed-style values are strings whose animation has already been
/// evaluated by the upstream collaborator.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub local_name: String,
    pub rendering_hint: RenderingHint,
    pub id: Option<String>,
    pub unique_id: String,
    pub text_content: Option<String>,
    attributes: HashMap<String, String>,
    computed: HashMap<String, String>,
    children: Vec<SourceId>,
    parent: Option<SourceId>,
}

impl SourceNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Computed property value: the computed-style entry when present,
    /// otherwise the presentation attribute of the same name.
    pub fn computed_value(&self, name: &str) -> Option<&str> {
        self.computed
            .get(name)
            .or_else(|| self.attributes.get(name))
            .map(String::as_str)
    }

    pub fn children(&self) -> &[SourceId] {
        &self.children
    }

    pub fn parent(&self) -> Option<SourceId> {
        self.parent
    }
}

/// Arena-backed input document. Hosts (and tests) construct it directly; the
/// renderer only reads it.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<SourceNode>,
    by_id: HashMap<String, SourceId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the root element. Panics if called twice; a document has one
    /// root.
    pub fn add_root(&mut self, local_name: &str) -> SourceId {
        assert!(self.nodes.is_empty(), "document already has a root");
        self.push_node(local_name, None)
    }

    pub fn add_child(&mut self, parent: SourceId, local_name: &str) -> SourceId {
        let id = self.push_node(local_name, Some(parent));
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_node(&mut self, local_name: &str, parent: Option<SourceId>) -> SourceId {
        let index = self.nodes.len();
        self.nodes.push(SourceNode {
            local_name: local_name.to_string(),
            rendering_hint: RenderingHint::from_local_name(local_name),
            id: None,
            unique_id: format!("n{index}"),
            text_content: None,
            attributes: HashMap::new(),
            computed: HashMap::new(),
            children: Vec::new(),
            parent,
        });
        SourceId(index)
    }

    pub fn root(&self) -> Option<SourceId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(SourceId(0))
        }
    }

    pub fn node(&self, id: SourceId) -> &SourceNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_attribute(&mut self, node: SourceId, name: &str, value: &str) {
        if name == "id" {
            self.nodes[node.0].id = Some(value.to_string());
            self.by_id.insert(value.to_string(), node);
        }
        self.nodes[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    /// Records a computed-style value, overriding the presentation attribute
    /// for `computed_value` lookups.
    pub fn set_computed(&mut self, node: SourceId, name: &str, value: &str) {
        self.nodes[node.0]
            .computed
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_rendering_hint(&mut self, node: SourceId, hint: RenderingHint) {
        self.nodes[node.0].rendering_hint = hint;
    }

    pub fn set_text_content(&mut self, node: SourceId, text: &str) {
        self.nodes[node.0].text_content = Some(text.to_string());
    }

    pub fn element_by_id(&self, id: &str) -> Option<SourceId> {
        self.by_id.get(id).copied()
    }

    /// Resolves an `href`/`xlink:href` fragment reference to an element.
    pub fn resolve_reference(&self, node: SourceId) -> Option<SourceId> {
        let node = self.node(node);
        let href = node
            .attribute("href")
            .or_else(|| node.attribute("xlink:href"))?;
        let fragment = href.strip_prefix('#')?;
        self.element_by_id(fragment)
    }

    /// Nearest ancestor (excluding `node` itself) for which `predicate`
    /// returns true.
    pub fn find_ancestor(
        &self,
        node: SourceId,
        predicate: impl Fn(&SourceNode) -> bool,
    ) -> Option<SourceId> {
        let mut current = self.node(node).parent;
        while let Some(id) = current {
            if predicate(self.node(id)) {
                return Some(id);
            }
            current = self.node(id).parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_classification_by_local_name() {
        assert_eq!(RenderingHint::from_local_name("rect"), RenderingHint::Shape);
        assert_eq!(RenderingHint::from_local_name("svg"), RenderingHint::Container);
        assert_eq!(RenderingHint::from_local_name("mask"), RenderingHint::Masking);
        assert_eq!(RenderingHint::from_local_name("video"), RenderingHint::Other);
    }

    #[test]
    fn computed_value_prefers_computed_style() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let rect = doc.add_child(root, "rect");
        doc.set_attribute(rect, "fill", "red");
        assert_eq!(doc.node(rect).computed_value("fill"), Some("red"));
        doc.set_computed(rect, "fill", "blue");
        assert_eq!(doc.node(rect).computed_value("fill"), Some("blue"));
    }

    #[test]
    fn reference_resolution_follows_href_fragment() {
        let mut doc = Document::new();
        let root = doc.add_root("svg");
        let target = doc.add_child(root, "rect");
        doc.set_attribute(target, "id", "box");
        let use_el = doc.add_child(root, "use");
        doc.set_attribute(use_el, "href", "#box");
        assert_eq!(doc.resolve_reference(use_el), Some(target));
        doc.set_attribute(use_el, "href", "#missing");
        assert_eq!(doc.resolve_reference(use_el), None);
    }
}
