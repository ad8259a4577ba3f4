//! Positions, ranges and the selection of the view.
//!
//! Unlike model positions, view positions are anchored to a node: the
//! offset counts children of an element or characters of a text node.

use crate::tree::{ViewNodeId, ViewTree};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewPosition {
    pub parent: ViewNodeId,
    pub offset: usize,
}

impl ViewPosition {
    pub fn new(parent: ViewNodeId, offset: usize) -> Self {
        Self { parent, offset }
    }

    pub fn at_start(parent: ViewNodeId) -> Self {
        Self::new(parent, 0)
    }

    pub fn at_end(tree: &ViewTree, parent: ViewNodeId) -> Self {
        Self::new(parent, tree.max_offset(parent))
    }

    pub fn before(tree: &ViewTree, id: ViewNodeId) -> Option<Self> {
        Some(Self::new(tree.parent(id)?, tree.index(id)?))
    }

    pub fn after(tree: &ViewTree, id: ViewNodeId) -> Option<Self> {
        Some(Self::new(tree.parent(id)?, tree.index(id)? + 1))
    }

    pub fn is_at_start(&self) -> bool {
        self.offset == 0
    }

    pub fn is_at_end(&self, tree: &ViewTree) -> bool {
        self.offset == tree.max_offset(self.parent)
    }

    pub fn get_shifted_by(&self, shift: isize) -> Self {
        Self::new(self.parent, (self.offset as isize + shift).max(0) as usize)
    }

    pub fn node_after(&self, tree: &ViewTree) -> Option<ViewNodeId> {
        tree.child(self.parent, self.offset)
    }

    pub fn node_before(&self, tree: &ViewTree) -> Option<ViewNodeId> {
        self.offset.checked_sub(1).and_then(|i| tree.child(self.parent, i))
    }

    /// Position expressed in the enclosing element when this one sits at
    /// the edge of a text node.
    pub fn get_last_matching_element_position(&self, tree: &ViewTree) -> Self {
        if !tree.is_text(self.parent) {
            return *self;
        }
        let edge = if self.offset == 0 {
            Self::before(tree, self.parent)
        } else if self.is_at_end(tree) {
            Self::after(tree, self.parent)
        } else {
            None
        };
        edge.unwrap_or(*self)
    }

    fn path(&self, tree: &ViewTree) -> Vec<usize> {
        let mut path = tree.path_of(self.parent);
        path.push(self.offset);
        path
    }

    /// Document order of two positions in the same tree, `None` when they
    /// belong to different top-level nodes.
    pub fn compare(&self, other: &Self, tree: &ViewTree) -> Option<Ordering> {
        if tree.top_most(self.parent) != tree.top_most(other.parent) {
            return None;
        }
        if self == other {
            return Some(Ordering::Equal);
        }
        let (a, b) = (self.path(tree), other.path(tree));
        for (x, y) in a.iter().zip(b.iter()) {
            if x != y {
                return Some(x.cmp(y));
            }
        }
        // A position inside a node compares after the position before it.
        Some(a.len().cmp(&b.len()))
    }

    pub fn is_before(&self, other: &Self, tree: &ViewTree) -> bool {
        self.compare(other, tree) == Some(Ordering::Less)
    }

    pub fn is_after(&self, other: &Self, tree: &ViewTree) -> bool {
        self.compare(other, tree) == Some(Ordering::Greater)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub start: ViewPosition,
    pub end: ViewPosition,
}

impl ViewRange {
    pub fn new(start: ViewPosition, end: ViewPosition) -> Self {
        Self { start, end }
    }

    pub fn collapsed(position: ViewPosition) -> Self {
        Self::new(position, position)
    }

    /// Range covering exactly one node.
    pub fn on(tree: &ViewTree, id: ViewNodeId) -> Option<Self> {
        Some(Self::new(ViewPosition::before(tree, id)?, ViewPosition::after(tree, id)?))
    }

    /// Range covering the content of an element.
    pub fn in_element(tree: &ViewTree, id: ViewNodeId) -> Self {
        Self::new(ViewPosition::at_start(id), ViewPosition::at_end(tree, id))
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_flat(&self) -> bool {
        self.start.parent == self.end.parent
    }

    pub fn contains_position(&self, position: &ViewPosition, tree: &ViewTree) -> bool {
        position.is_after(&self.start, tree) && position.is_before(&self.end, tree)
    }

    /// Nodes directly between the boundaries of a flat range.
    pub fn flat_nodes(&self, tree: &ViewTree) -> Vec<ViewNodeId> {
        if !self.is_flat() || tree.is_text(self.start.parent) {
            return Vec::new();
        }
        let children = tree.children(self.start.parent);
        let end = self.end.offset.min(children.len());
        let start = self.start.offset.min(end);
        children[start..end].to_vec()
    }
}

/// Selection of the editing view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSelection {
    ranges: Vec<ViewRange>,
    backward: bool,
    /// Set when the selection wraps a single widget-like element.
    fake: bool,
}

impl ViewSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_to(&mut self, ranges: Vec<ViewRange>, backward: bool) {
        self.ranges = ranges;
        self.backward = backward;
        self.fake = false;
    }

    pub fn set_fake(&mut self, fake: bool) {
        self.fake = fake;
    }

    pub fn is_fake(&self) -> bool {
        self.fake
    }

    pub fn ranges(&self) -> &[ViewRange] {
        &self.ranges
    }

    pub fn first_range(&self) -> Option<&ViewRange> {
        self.ranges.first()
    }

    pub fn is_backward(&self) -> bool {
        self.backward
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    pub fn anchor(&self) -> Option<ViewPosition> {
        let range = self.ranges.last()?;
        Some(if self.backward { range.end } else { range.start })
    }

    pub fn focus(&self) -> Option<ViewPosition> {
        let range = self.ranges.last()?;
        Some(if self.backward { range.start } else { range.end })
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.backward = false;
        self.fake = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ElementKind;

    fn sample() -> (ViewTree, ViewNodeId, ViewNodeId, ViewNodeId) {
        let mut tree = ViewTree::new();
        let root = tree.create_root("main", "div").unwrap();
        let p = tree.create_element("p", ElementKind::Container);
        let text = tree.create_text("foo");
        tree.append_child(p, text).unwrap();
        tree.append_child(root, p).unwrap();
        (tree, root, p, text)
    }

    #[test]
    fn test_compare_positions() {
        let (tree, root, p, text) = sample();
        let before_p = ViewPosition::new(root, 0);
        let in_text = ViewPosition::new(text, 2);
        let after_p = ViewPosition::new(root, 1);

        assert!(before_p.is_before(&in_text, &tree));
        assert!(in_text.is_before(&after_p, &tree));
        assert!(ViewPosition::at_start(p).is_after(&before_p, &tree));
        assert_eq!(in_text.compare(&in_text, &tree), Some(Ordering::Equal));
    }

    #[test]
    fn test_text_edge_positions_move_out() {
        let (tree, _, p, text) = sample();
        assert_eq!(
            ViewPosition::new(text, 3).get_last_matching_element_position(&tree),
            ViewPosition::new(p, 1)
        );
        assert_eq!(
            ViewPosition::new(text, 1).get_last_matching_element_position(&tree),
            ViewPosition::new(text, 1)
        );
    }

    #[test]
    fn test_selection_anchor_and_focus() {
        let (tree, root, _, _) = sample();
        let mut selection = ViewSelection::new();
        selection.set_to(vec![ViewRange::in_element(&tree, root)], true);
        assert_eq!(selection.anchor(), Some(ViewPosition::new(root, 1)));
        assert_eq!(selection.focus(), Some(ViewPosition::new(root, 0)));
        assert!(!selection.is_collapsed());
    }
}
