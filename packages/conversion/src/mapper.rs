//! # Mapper
//!
//! Bidirectional index between model elements and the view elements that
//! render them, plus translation of positions between the two trees.
//!
//! Positions are translated through the closest bound ancestor. Offsets are
//! re-derived by walking the view children and summing their model length:
//!
//! - a bound element counts as one model node,
//! - text counts its characters,
//! - UI elements count as nothing,
//! - any other element counts the model length of its children.
//!
//! Lookups for elements that are not bound return `None`. That means the
//! element has not been rendered (yet), not that something failed.

use folio_common::{Priority, PriorityList};
use folio_model::{NodeId, Position, Range, Tree};
use folio_view::{ElementKind, ViewNode, ViewNodeId, ViewPosition, ViewRange, ViewTree};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Overrides model to view position mapping. Returning `None` leaves the
/// decision to the next hook, and finally to the default algorithm.
pub type ModelToViewHook = Arc<dyn Fn(&Mapper, &Tree, &ViewTree, &Position) -> Option<ViewPosition> + Send + Sync>;

/// Overrides view to model position mapping.
pub type ViewToModelHook = Arc<dyn Fn(&Mapper, &Tree, &ViewTree, &ViewPosition) -> Option<Position> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Mapper {
    model_to_view: HashMap<NodeId, ViewNodeId>,
    view_to_model: HashMap<ViewNodeId, NodeId>,
    marker_to_view: BTreeMap<String, Vec<ViewNodeId>>,
    model_to_view_hooks: PriorityList<ModelToViewHook>,
    view_to_model_hooks: PriorityList<ViewToModelHook>,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("bindings", &self.model_to_view.len())
            .field("markers", &self.marker_to_view.len())
            .finish()
    }
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a model element to its view counterpart. A previous view
    /// element of the same model element stays resolvable back to the model
    /// until it is unbound, so stale view content keeps its model length
    /// while it waits to be removed.
    pub fn bind_elements(&mut self, model: NodeId, view: ViewNodeId) {
        self.model_to_view.insert(model, view);
        self.view_to_model.insert(view, model);
    }

    pub fn unbind_view_element(&mut self, view: ViewNodeId) {
        if let Some(model) = self.view_to_model.remove(&view) {
            if self.model_to_view.get(&model) == Some(&view) {
                self.model_to_view.remove(&model);
            }
        }
        for elements in self.marker_to_view.values_mut() {
            elements.retain(|id| *id != view);
        }
        self.marker_to_view.retain(|_, elements| !elements.is_empty());
    }

    pub fn unbind_model_element(&mut self, model: NodeId) {
        if let Some(view) = self.model_to_view.remove(&model) {
            if self.view_to_model.get(&view) == Some(&model) {
                self.view_to_model.remove(&view);
            }
        }
    }

    pub fn to_view_element(&self, model: NodeId) -> Option<ViewNodeId> {
        self.model_to_view.get(&model).copied()
    }

    pub fn to_model_element(&self, view: ViewNodeId) -> Option<NodeId> {
        self.view_to_model.get(&view).copied()
    }

    pub fn bind_element_to_marker(&mut self, view: ViewNodeId, marker: &str) {
        self.marker_to_view.entry(marker.to_string()).or_default().push(view);
    }

    /// View elements rendered for a marker.
    pub fn marker_name_to_elements(&self, marker: &str) -> Vec<ViewNodeId> {
        self.marker_to_view.get(marker).cloned().unwrap_or_default()
    }

    pub fn unbind_marker(&mut self, marker: &str) -> Vec<ViewNodeId> {
        self.marker_to_view.remove(marker).unwrap_or_default()
    }

    pub fn clear_bindings(&mut self) {
        self.model_to_view.clear();
        self.view_to_model.clear();
        self.marker_to_view.clear();
    }

    pub fn on_model_to_view_position(
        &mut self,
        priority: Priority,
        hook: impl Fn(&Mapper, &Tree, &ViewTree, &Position) -> Option<ViewPosition> + Send + Sync + 'static,
    ) {
        self.model_to_view_hooks.insert(priority, Arc::new(hook));
    }

    pub fn on_view_to_model_position(
        &mut self,
        priority: Priority,
        hook: impl Fn(&Mapper, &Tree, &ViewTree, &ViewPosition) -> Option<Position> + Send + Sync + 'static,
    ) {
        self.view_to_model_hooks.insert(priority, Arc::new(hook));
    }

    // ---- positions -------------------------------------------------------

    /// View position matching a model position. The model offset does not
    /// need to exist in the model anymore: removed content that is still
    /// rendered can be addressed this way.
    pub fn to_view_position(&self, tree: &Tree, view: &ViewTree, position: &Position) -> Option<ViewPosition> {
        for entry in self.model_to_view_hooks.iter() {
            if let Some(mapped) = (entry.item)(self, tree, view, position) {
                return Some(mapped);
            }
        }
        let parent = tree.node_at_path(&position.root, position.parent_path())?;
        let view_parent = self.to_view_element(parent)?;
        Some(self.find_position_in(view, view_parent, position.offset()))
    }

    pub fn to_view_range(&self, tree: &Tree, view: &ViewTree, range: &Range) -> Option<ViewRange> {
        Some(ViewRange::new(
            self.to_view_position(tree, view, &range.start)?,
            self.to_view_position(tree, view, &range.end)?,
        ))
    }

    pub fn to_model_position(&self, tree: &Tree, view: &ViewTree, position: &ViewPosition) -> Option<Position> {
        for entry in self.view_to_model_hooks.iter() {
            if let Some(mapped) = (entry.item)(self, tree, view, position) {
                return Some(mapped);
            }
        }
        let block = self.find_mapped_view_ancestor(view, position.parent)?;
        let model_parent = self.to_model_element(block)?;
        let offset = self.to_model_offset(view, position.parent, position.offset, block);
        tree.position_in(model_parent, offset).ok()
    }

    pub fn to_model_range(&self, tree: &Tree, view: &ViewTree, range: &ViewRange) -> Option<Range> {
        Some(Range::new(
            self.to_model_position(tree, view, &range.start)?,
            self.to_model_position(tree, view, &range.end)?,
        ))
    }

    /// Closest view node, starting at `id` itself, that is bound to a model
    /// element.
    pub fn find_mapped_view_ancestor(&self, view: &ViewTree, id: ViewNodeId) -> Option<ViewNodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.view_to_model.contains_key(&node) {
                return Some(node);
            }
            current = view.parent(node);
        }
        None
    }

    /// Number of model offsets a view node stands for.
    pub fn model_length(&self, view: &ViewTree, id: ViewNodeId) -> usize {
        if self.view_to_model.contains_key(&id) {
            return 1;
        }
        match view.get(id) {
            Some(ViewNode::Text(data)) => data.chars().count(),
            Some(ViewNode::Element(element)) if element.kind == ElementKind::Ui => 0,
            Some(ViewNode::Element(element)) => element
                .children()
                .iter()
                .map(|child| self.model_length(view, *child))
                .sum(),
            None => 0,
        }
    }

    /// View position inside `parent` that corresponds to `expected` model
    /// offsets from its start.
    pub fn find_position_in(&self, view: &ViewTree, parent: ViewNodeId, expected: usize) -> ViewPosition {
        if view.is_text(parent) {
            return ViewPosition::new(parent, expected.min(view.max_offset(parent)));
        }
        let children = view.children(parent);
        let mut model_offset = 0;
        let mut view_offset = 0;
        let mut last = None;
        while model_offset < expected {
            let Some(&child) = children.get(view_offset) else {
                break;
            };
            model_offset += self.model_length(view, child);
            last = Some(child);
            view_offset += 1;
        }
        match last {
            Some(child) if model_offset > expected => {
                let before = model_offset - self.model_length(view, child);
                self.find_position_in(view, child, expected - before)
            }
            _ => move_to_text_node(view, ViewPosition::new(parent, view_offset)),
        }
    }

    fn to_model_offset(&self, view: &ViewTree, parent: ViewNodeId, offset: usize, block: ViewNodeId) -> usize {
        let local = if view.is_text(parent) {
            offset
        } else {
            view.children(parent)
                .iter()
                .take(offset)
                .map(|child| self.model_length(view, *child))
                .sum()
        };
        if parent == block {
            return local;
        }
        match (view.parent(parent), view.index(parent)) {
            (Some(outer), Some(index)) => self.to_model_offset(view, outer, index, block) + local,
            _ => local,
        }
    }
}

/// Prefers positions inside text nodes over positions next to them.
fn move_to_text_node(view: &ViewTree, position: ViewPosition) -> ViewPosition {
    if let Some(before) = position.node_before(view).filter(|id| view.is_text(*id)) {
        return ViewPosition::new(before, view.max_offset(before));
    }
    if let Some(after) = position.node_after(view).filter(|id| view.is_text(*id)) {
        return ViewPosition::new(after, 0);
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::Node;

    struct Fixture {
        tree: Tree,
        view: ViewTree,
        mapper: Mapper,
        paragraph: NodeId,
        view_p: ViewNodeId,
        bar: ViewNodeId,
    }

    /// `<paragraph>foo<$text bold>bar</$text></paragraph>` rendered as
    /// `<p>foo<strong>bar</strong></p>`.
    fn fixture() -> Fixture {
        let mut tree = Tree::new();
        let root = tree.add_root("main", "$root");
        let paragraph = Node::element("paragraph").with_children([Node::text("foo"), Node::text("bar").with_attribute("bold", true)]);
        tree.insert_nodes(root, 0, &[paragraph]).unwrap();
        let paragraph = tree.children(root)[0];

        let mut view = ViewTree::new();
        let view_root = view.create_root("main", "div").unwrap();
        let view_p = view.create_element("p", ElementKind::Container);
        let foo = view.create_text("foo");
        let strong = view.create_element("strong", ElementKind::attribute());
        let bar = view.create_text("bar");
        view.append_child(strong, bar).unwrap();
        view.append_child(view_p, foo).unwrap();
        view.append_child(view_p, strong).unwrap();
        view.append_child(view_root, view_p).unwrap();

        let mut mapper = Mapper::new();
        mapper.bind_elements(root, view_root);
        mapper.bind_elements(paragraph, view_p);
        Fixture {
            tree,
            view,
            mapper,
            paragraph,
            view_p,
            bar,
        }
    }

    #[test]
    fn test_model_to_view_position_descends_into_attributes() {
        let f = fixture();
        let position = Position::new("main", vec![0, 4]);
        assert_eq!(
            f.mapper.to_view_position(&f.tree, &f.view, &position),
            Some(ViewPosition::new(f.bar, 1))
        );
        let root_position = Position::new("main", vec![1]);
        let main = f.view.root("main").unwrap();
        assert_eq!(
            f.mapper.to_view_position(&f.tree, &f.view, &root_position),
            Some(ViewPosition::new(main, 1))
        );
    }

    #[test]
    fn test_view_to_model_position_sums_offsets() {
        let f = fixture();
        assert_eq!(
            f.mapper.to_model_position(&f.tree, &f.view, &ViewPosition::new(f.bar, 1)),
            Some(Position::new("main", vec![0, 4]))
        );
        assert_eq!(
            f.mapper.to_model_position(&f.tree, &f.view, &ViewPosition::new(f.view_p, 2)),
            Some(Position::new("main", vec![0, 6]))
        );
    }

    #[test]
    fn test_rebinding_replaces_model_side() {
        let mut f = fixture();
        let replacement = f.view.create_element("p", ElementKind::Container);
        f.mapper.bind_elements(f.paragraph, replacement);
        assert_eq!(f.mapper.to_view_element(f.paragraph), Some(replacement));
        // The old view element still counts as one model node until unbound.
        assert_eq!(f.mapper.model_length(&f.view, f.view_p), 1);

        f.mapper.unbind_view_element(f.view_p);
        assert_eq!(f.mapper.to_model_element(f.view_p), None);
        assert_eq!(f.mapper.to_view_element(f.paragraph), Some(replacement));
    }

    #[test]
    fn test_unbound_elements_map_to_none() {
        let f = fixture();
        let mut tree = f.tree.clone();
        let root = tree.root("main").unwrap();
        tree.insert_nodes(root, 1, &[Node::element("heading1")]).unwrap();
        let position = Position::new("main", vec![1, 0]);
        assert_eq!(f.mapper.to_view_position(&tree, &f.view, &position), None);
    }

    #[test]
    fn test_position_hook_overrides_default() {
        let mut f = fixture();
        let view_p = f.view_p;
        f.mapper
            .on_model_to_view_position(Priority::HIGH, move |_, _, _, _| Some(ViewPosition::new(view_p, 0)));
        let position = Position::new("main", vec![0, 4]);
        assert_eq!(
            f.mapper.to_view_position(&f.tree, &f.view, &position),
            Some(ViewPosition::new(view_p, 0))
        );
    }
}
