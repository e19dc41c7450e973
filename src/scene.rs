use crate::color::Color;
use crate::geometry::{PathGeometry, Rect, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub usize);

/// Whether coordinates are absolute user-space values or fractions of a
/// target's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSpace {
    UserSpace,
    #[default]
    ObjectBoundingBox,
}

impl UnitSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "userSpaceOnUse" => Some(Self::UserSpace),
            "objectBoundingBox" => Some(Self::ObjectBoundingBox),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadMode {
    #[default]
    Pad,
    Reflect,
    Repeat,
}

impl SpreadMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pad" => Some(Self::Pad),
            "reflect" => Some(Self::Reflect),
            "repeat" => Some(Self::Repeat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Resolved offset in [0, 1], non-decreasing across the stop list.
    pub offset: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientVariant {
    Linear {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Radial {
        cx: f32,
        cy: f32,
        r: f32,
        fx: f32,
        fy: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub variant: GradientVariant,
    pub stops: Vec<GradientStop>,
    pub spread: SpreadMode,
    pub units: UnitSpace,
    pub transform: Option<Transform>,
}

/// A tileable paint whose content is an independently rendered sub-scene.
/// Also used as the opacity-mask paint produced by mask resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub content: Scene,
    pub tile: Rect,
    pub units: UnitSpace,
    pub content_units: UnitSpace,
    pub transform: Option<Transform>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Paint {
    #[default]
    None,
    Solid {
        color: Color,
        opacity: f32,
    },
    Gradient(Gradient),
    Pattern(Box<Pattern>),
}

impl Paint {
    pub fn solid(color: Color) -> Self {
        Self::Solid {
            color,
            opacity: 1.0,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Paint::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub paint: Paint,
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    pub dash_array: Vec<f32>,
    pub dash_offset: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            paint: Paint::None,
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 4.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    pub children: Vec<SceneId>,
    pub transform: Option<Transform>,
    pub clip: Option<PathGeometry>,
    pub opacity: Option<f32>,
    pub opacity_mask: Option<Paint>,
    pub name: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drawing {
    pub fill: Paint,
    pub stroke: Option<StrokeStyle>,
    pub geometry: PathGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_family: String,
    pub font_size: f32,
    pub fill: Paint,
    /// Advance width as measured by the text-layout collaborator.
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Group(Group),
    Drawing(Drawing),
    Text(TextRun),
}

impl SceneNode {
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            SceneNode::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_drawing(&self) -> Option<&Drawing> {
        match self {
            SceneNode::Drawing(drawing) => Some(drawing),
            _ => None,
        }
    }
}

/// Index arena owning every scene node; parent/child links are ids, not
/// pointers. Children lists are append-only during construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneArena {
    nodes: Vec<SceneNode>,
}

impl SceneArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: SceneNode) -> SceneId {
        let id = SceneId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: SceneId) -> &SceneNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: SceneId) -> &mut SceneNode {
        &mut self.nodes[id.0]
    }

    pub fn group(&self, id: SceneId) -> Option<&Group> {
        self.node(id).as_group()
    }

    pub fn group_mut(&mut self, id: SceneId) -> Option<&mut Group> {
        match self.node_mut(id) {
            SceneNode::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn attach(&mut self, parent: SceneId, child: SceneId) {
        if let Some(group) = self.group_mut(parent) {
            group.children.push(child);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The rendered output: an arena plus the root group id.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub arena: SceneArena,
    pub root: SceneId,
    /// Accumulated bounds of all emitted leaves, in root coordinates.
    pub bounds: Option<Rect>,
    /// Non-fatal findings from the render: skipped cycles, blocked external
    /// references.
    pub diagnostics: Vec<String>,
}

impl Scene {
    pub fn root_group(&self) -> &Group {
        self.arena
            .group(self.root)
            .expect("scene root is always a group")
    }

    /// Depth-first walk over all leaves reachable from the root.
    pub fn walk_leaves<'a>(&'a self, mut visit: impl FnMut(SceneId, &'a SceneNode)) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.arena.node(id) {
                SceneNode::Group(group) => {
                    for child in group.children.iter().rev() {
                        stack.push(*child);
                    }
                }
                node => visit(id, node),
            }
        }
    }

    /// Counts nodes of each kind: (groups, drawings, text runs).
    pub fn node_counts(&self) -> (usize, usize, usize) {
        let mut groups = 0;
        let mut drawings = 0;
        let mut texts = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.arena.node(id) {
                SceneNode::Group(group) => {
                    groups += 1;
                    for child in group.children.iter().rev() {
                        stack.push(*child);
                    }
                }
                SceneNode::Drawing(_) => drawings += 1,
                SceneNode::Text(_) => texts += 1,
            }
        }
        (groups, drawings, texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PathFigure, Point};

    #[test]
    fn arena_attach_builds_parent_child_links() {
        let mut arena = SceneArena::new();
        let root = arena.insert(SceneNode::Group(Group::default()));
        let child = arena.insert(SceneNode::Group(Group::default()));
        arena.attach(root, child);
        assert_eq!(arena.group(root).unwrap().children, vec![child]);
    }

    #[test]
    fn walk_leaves_visits_drawings_in_document_order() {
        let mut arena = SceneArena::new();
        let root = arena.insert(SceneNode::Group(Group::default()));
        let mut order = Vec::new();
        for i in 0..3 {
            let geometry = PathGeometry::single(PathFigure::new(Point::new(i as f32, 0.0)));
            let leaf = arena.insert(SceneNode::Drawing(Drawing {
                fill: Paint::solid(crate::color::Color::BLACK),
                stroke: None,
                geometry,
            }));
            arena.attach(root, leaf);
            order.push(leaf);
        }
        let scene = Scene {
            arena,
            root,
            bounds: None,
            diagnostics: Vec::new(),
        };
        let mut seen = Vec::new();
        scene.walk_leaves(|id, _| seen.push(id));
        assert_eq!(seen, order);
    }
}
