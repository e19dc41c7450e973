use std::collections::{HashMap, HashSet};

use crate::config::RenderOptions;
use crate::error::RenderError;
use crate::geometry::{Rect, Transform};
use crate::scene::{Group, Paint, Scene, SceneArena, SceneId, SceneNode};
use crate::source::SourceNode;
use crate::visitors::Visitors;

/// Per-element record of already-resolved paint, used to satisfy
/// `context-fill`/`context-stroke` lookups from markers and patterns. The
/// `target` id redirects the walk toward the element the content was
/// instantiated for.
#[derive(Debug, Clone, Default)]
pub struct PaintContext {
    pub fill: Option<Paint>,
    pub stroke: Option<Paint>,
    pub target: Option<String>,
}

/// Session state for one render call: the open-group cursor stack over the
/// scene arena, registered names, the paint-context table, traversal guards
/// and the pluggable visitors.
pub struct RenderContext {
    pub options: RenderOptions,
    pub visitors: Visitors,
    arena: SceneArena,
    cursor: Vec<SceneId>,
    ctm_stack: Vec<Transform>,
    root: Option<SceneId>,
    registered_names: HashSet<String>,
    paint_contexts: HashMap<String, PaintContext>,
    /// Redirection id installed while marker or pattern content renders on
    /// behalf of a host element.
    pub(crate) context_target: Option<String>,
    active_nodes: HashSet<String>,
    reference_guards: HashSet<String>,
    diagnostics: Vec<String>,
    bounds: Option<Rect>,
    initialized: bool,
}

impl RenderContext {
    pub fn new(options: RenderOptions) -> Self {
        Self::with_visitors(options, Visitors::default())
    }

    pub fn with_visitors(options: RenderOptions, visitors: Visitors) -> Self {
        Self {
            options,
            visitors,
            arena: SceneArena::new(),
            cursor: Vec::new(),
            ctm_stack: Vec::new(),
            root: None,
            registered_names: HashSet::new(),
            paint_contexts: HashMap::new(),
            context_target: None,
            active_nodes: HashSet::new(),
            reference_guards: HashSet::new(),
            diagnostics: Vec::new(),
            bounds: None,
            initialized: false,
        }
    }

    pub fn initialize(&mut self) {
        self.arena = SceneArena::new();
        self.cursor.clear();
        self.ctm_stack.clear();
        self.root = None;
        self.registered_names.clear();
        self.paint_contexts.clear();
        self.context_target = None;
        self.active_nodes.clear();
        self.reference_guards.clear();
        self.diagnostics.clear();
        self.bounds = None;
        self.initialized = true;
    }

    /// Tears the context down and hands the finished scene over. The cursor
    /// stack must be balanced; a leftover entry means a renderer skipped its
    /// matching pop.
    pub fn uninitialize(&mut self) -> Result<Scene, RenderError> {
        if !self.initialized {
            return Err(RenderError::ContextUninitialized);
        }
        if let Some(top) = self.cursor.last() {
            return Err(RenderError::StackInvariant {
                element: "document".to_string(),
                expected: usize::MAX,
                found: Some(top.0),
            });
        }
        self.initialized = false;
        let mut arena = std::mem::take(&mut self.arena);
        let root = match self.root.take() {
            Some(root) => root,
            None => arena.insert(SceneNode::Group(Group::default())),
        };
        Ok(Scene {
            arena,
            root,
            bounds: self.bounds.take(),
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// A nested context for an independent sub-scene (pattern tile, mask
    /// content). Shares options, visitors and the in-flight reference guards
    /// so recursion through sub-scenes stays bounded.
    pub fn nested(&self) -> RenderContext {
        let mut nested = RenderContext::with_visitors(self.options.clone(), self.visitors.clone());
        nested.initialize();
        nested.reference_guards = self.reference_guards.clone();
        nested.paint_contexts = self.paint_contexts.clone();
        nested.context_target = self.context_target.clone();
        nested
    }

    pub fn arena(&self) -> &SceneArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut SceneArena {
        &mut self.arena
    }

    /// Pushes a new group: it becomes a child of the current stack top and
    /// the new insertion point.
    pub fn open_group(&mut self, group: Group) -> SceneId {
        let ctm = self.current_transform();
        let group_transform = group.transform.unwrap_or_default();
        let id = self.arena.insert(SceneNode::Group(group));
        if let Some(parent) = self.cursor.last().copied() {
            self.arena.attach(parent, id);
        } else if self.root.is_none() {
            self.root = Some(id);
        }
        self.cursor.push(id);
        self.ctm_stack.push(ctm.pre_concat(group_transform));
        id
    }

    /// Pops the current group, verifying it is the one the caller opened.
    /// A mismatch is a pipeline bug, not bad input.
    pub fn close_group(&mut self, expected: SceneId, element: &str) -> Result<(), RenderError> {
        let top = self.cursor.last().copied();
        if top != Some(expected) {
            return Err(RenderError::StackInvariant {
                element: element.to_string(),
                expected: expected.0,
                found: top.map(|id| id.0),
            });
        }
        self.cursor.pop();
        self.ctm_stack.pop();
        Ok(())
    }

    pub fn current_group(&self) -> Option<SceneId> {
        self.cursor.last().copied()
    }

    pub fn stack_depth(&self) -> usize {
        self.cursor.len()
    }

    /// Accumulated transform of every open group, root first.
    pub fn current_transform(&self) -> Transform {
        self.ctm_stack.last().copied().unwrap_or_default()
    }

    /// Emits a leaf into the current group and folds its bounds into the
    /// accumulated scene bounds.
    pub fn emit(&mut self, node: SceneNode) -> Option<SceneId> {
        let parent = self.cursor.last().copied()?;
        let leaf_bounds = match &node {
            SceneNode::Drawing(drawing) => drawing.geometry.bounds(),
            SceneNode::Text(run) => Some(Rect::new(
                run.x,
                run.y - run.font_size,
                run.width,
                run.font_size * 1.2,
            )),
            SceneNode::Group(_) => None,
        };
        if let Some(local) = leaf_bounds {
            let global = self.current_transform().apply_rect(&local);
            self.bounds = Some(match self.bounds {
                Some(existing) => existing.union(&global),
                None => global,
            });
        }
        let id = self.arena.insert(node);
        self.arena.attach(parent, id);
        Some(id)
    }

    /// Claims a name for id/class metadata. Returns false when some earlier
    /// node already registered it.
    pub fn register_name(&mut self, name: &str) -> bool {
        self.registered_names.insert(name.to_string())
    }

    /// Name/class metadata for a node's group, honoring the runtime-metadata
    /// option and name registration.
    pub fn group_metadata(&mut self, node: &SourceNode) -> (Option<String>, Option<String>) {
        if !self.options.include_runtime_metadata {
            return (None, None);
        }
        let name = self
            .visitors
            .id
            .clone()
            .visit(node)
            .filter(|name| self.register_name(name));
        let class = self.visitors.class.clone().visit(node);
        (name, class)
    }

    pub fn register_paint_context(&mut self, unique_id: &str, paint_context: PaintContext) {
        self.paint_contexts
            .insert(unique_id.to_string(), paint_context);
    }

    pub fn paint_context(&self, unique_id: &str) -> Option<&PaintContext> {
        self.paint_contexts.get(unique_id)
    }

    /// Marks a node as actively rendering. False means the node is already
    /// on the path from the root: a malformed circular structure.
    pub fn enter_node(&mut self, unique_id: &str) -> bool {
        self.active_nodes.insert(unique_id.to_string())
    }

    pub fn exit_node(&mut self, unique_id: &str) {
        self.active_nodes.remove(unique_id);
    }

    /// Guards expansion of a reference (use target, pattern content) against
    /// re-entry while it is already being expanded.
    pub fn begin_reference(&mut self, unique_id: &str) -> bool {
        self.reference_guards.insert(unique_id.to_string())
    }

    pub fn end_reference(&mut self, unique_id: &str) {
        self.reference_guards.remove(unique_id);
    }

    pub fn add_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_stack_produces_scene() {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let root = ctx.open_group(Group::default());
        let inner = ctx.open_group(Group::default());
        ctx.close_group(inner, "g").unwrap();
        ctx.close_group(root, "svg").unwrap();
        let scene = ctx.uninitialize().unwrap();
        assert_eq!(scene.root, root);
        assert_eq!(scene.root_group().children, vec![inner]);
    }

    #[test]
    fn mismatched_pop_is_a_stack_invariant_violation() {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let root = ctx.open_group(Group::default());
        let _inner = ctx.open_group(Group::default());
        let err = ctx.close_group(root, "svg").unwrap_err();
        assert!(matches!(err, RenderError::StackInvariant { .. }));
    }

    #[test]
    fn unbalanced_stack_fails_teardown() {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        let _root = ctx.open_group(Group::default());
        assert!(ctx.uninitialize().is_err());
    }

    #[test]
    fn node_entry_guard_detects_reentry() {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        assert!(ctx.enter_node("n1"));
        assert!(!ctx.enter_node("n1"));
        ctx.exit_node("n1");
        assert!(ctx.enter_node("n1"));
    }

    #[test]
    fn name_registration_dedupes() {
        let mut ctx = RenderContext::new(RenderOptions::default());
        ctx.initialize();
        assert!(ctx.register_name("shape"));
        assert!(!ctx.register_name("shape"));
    }
}
