//! # Downcast writer
//!
//! The only way converters change a view tree. Content is always inserted
//! into container elements: attribute elements around the insertion point
//! are broken first, and similar attribute elements that end up touching
//! are merged again afterwards.
//!
//! ```text
//! <p><b>fo|o</b></p>  --break-->  <p><b>fo</b>|<b>o</b></p>
//! <p><b>fo</b>|<b>o</b></p>  --merge-->  <p><b>fo|o</b></p>
//! ```
//!
//! Breaking and merging restructure the tree, so the private helpers take a
//! list of positions to keep valid while they work.

use crate::error::{ViewError, ViewResult};
use crate::position::{ViewPosition, ViewRange};
use crate::tree::{ElementKind, ViewElement, ViewNodeId, ViewTree, DEFAULT_PRIORITY};
use serde_json::Value;
use std::cmp::Ordering;

pub struct DowncastWriter<'t> {
    tree: &'t mut ViewTree,
}

impl<'t> DowncastWriter<'t> {
    pub fn new(tree: &'t mut ViewTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &ViewTree {
        self.tree
    }

    // ---- creation --------------------------------------------------------

    fn create(&mut self, name: &str, kind: ElementKind, attributes: &[(&str, &str)]) -> ViewNodeId {
        let id = self.tree.create_element(name, kind);
        for (key, value) in attributes {
            // Freshly created elements always exist.
            let _ = self.tree.set_attribute(id, key, value);
        }
        id
    }

    pub fn create_container_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(name, ElementKind::Container, attributes)
    }

    pub fn create_attribute_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        priority: Option<i32>,
        id: Option<String>,
    ) -> ViewNodeId {
        let kind = ElementKind::Attribute {
            priority: priority.unwrap_or(DEFAULT_PRIORITY),
            id,
        };
        self.create(name, kind, attributes)
    }

    pub fn create_empty_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(name, ElementKind::Empty, attributes)
    }

    pub fn create_raw_element(&mut self, name: &str, attributes: &[(&str, &str)], html: &str) -> ViewNodeId {
        self.create(name, ElementKind::Raw { html: html.to_string() }, attributes)
    }

    pub fn create_ui_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(name, ElementKind::Ui, attributes)
    }

    pub fn create_editable_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(name, ElementKind::Editable, attributes)
    }

    pub fn create_text(&mut self, data: &str) -> ViewNodeId {
        self.tree.create_text(data)
    }

    // ---- element properties ----------------------------------------------

    pub fn set_attribute(&mut self, id: ViewNodeId, key: &str, value: &str) -> ViewResult<()> {
        self.tree.set_attribute(id, key, value)
    }

    pub fn remove_attribute(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        self.tree.remove_attribute(id, key)
    }

    pub fn add_class(&mut self, id: ViewNodeId, class: &str) -> ViewResult<()> {
        self.tree.add_class(id, class)
    }

    pub fn remove_class(&mut self, id: ViewNodeId, class: &str) -> ViewResult<()> {
        self.tree.remove_class(id, class)
    }

    pub fn set_style(&mut self, id: ViewNodeId, key: &str, value: &str) -> ViewResult<()> {
        self.tree.set_style(id, key, value)
    }

    pub fn remove_style(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        self.tree.remove_style(id, key)
    }

    pub fn set_custom_property(&mut self, id: ViewNodeId, key: &str, value: Value) -> ViewResult<()> {
        self.tree.set_custom_property(id, key, value)
    }

    pub fn remove_custom_property(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        self.tree.remove_custom_property(id, key)
    }

    pub fn rename(&mut self, id: ViewNodeId, name: &str) -> ViewResult<()> {
        self.tree.rename(id, name)
    }

    // ---- structure -------------------------------------------------------

    /// Inserts detached nodes at `position`, breaking attribute elements so
    /// the nodes land in a container. Returns the range they occupy.
    pub fn insert(&mut self, position: ViewPosition, nodes: Vec<ViewNodeId>) -> ViewResult<ViewRange> {
        self.insert_tracking(position, nodes, &mut [])
    }

    fn insert_tracking(
        &mut self,
        position: ViewPosition,
        nodes: Vec<ViewNodeId>,
        tracked: &mut [ViewPosition],
    ) -> ViewResult<ViewRange> {
        for node in &nodes {
            if !self.tree.contains(*node) || self.tree.parent(*node).is_some() {
                return Err(ViewError::InsertInvalidNode);
            }
        }
        let position = self.break_tracking(position, tracked)?;
        let parent = position.parent;
        if !self.tree.kind(parent).map(ElementKind::accepts_children).unwrap_or(false) {
            return Err(ViewError::InsertInvalidNode);
        }

        let count = nodes.len();
        self.tree.insert_children(parent, position.offset, nodes)?;
        shift(tracked, parent, position.offset, count as isize);

        let mut start = position;
        let mut end = ViewPosition::new(parent, position.offset + count);
        end = self.merge_keeping(end, &mut start, tracked)?;
        start = self.merge_keeping(start, &mut end, tracked)?;
        Ok(ViewRange::new(start, end))
    }

    /// Detaches the content of a range. The range must not cross container
    /// boundaries. Returns the removed top-level nodes.
    pub fn remove(&mut self, range: ViewRange) -> ViewResult<Vec<ViewNodeId>> {
        self.remove_tracking(range, &mut [])
    }

    fn remove_tracking(&mut self, range: ViewRange, tracked: &mut [ViewPosition]) -> ViewResult<Vec<ViewNodeId>> {
        if range.is_collapsed() {
            return Ok(Vec::new());
        }
        let (start, end) = self.break_range(range, tracked)?;
        let removed = self.tree.remove_children(start.parent, start.offset, end.offset)?;
        for position in tracked.iter_mut() {
            if position.parent == start.parent && position.offset > start.offset {
                position.offset = position.offset.saturating_sub(removed.len()).max(start.offset);
            }
        }
        self.merge_tracking(start, tracked)?;
        Ok(removed)
    }

    /// Moves the content of `source` to `target`. Returns the range the
    /// content occupies afterwards.
    pub fn move_range(&mut self, source: ViewRange, target: ViewPosition) -> ViewResult<ViewRange> {
        let mut marks = [target];
        let nodes = self.remove_tracking(source, &mut marks)?;
        self.insert(marks[0], nodes)
    }

    /// Wraps the content of a range in clones of an attribute element.
    /// Collapsed ranges are returned unchanged.
    pub fn wrap(&mut self, range: ViewRange, attribute: ViewNodeId) -> ViewResult<ViewRange> {
        let wrapper = self.attribute_template(attribute).ok_or(ViewError::WrapInvalidAttribute)?;
        if range.is_collapsed() {
            return Ok(range);
        }
        let (start, end) = self.break_range(range, &mut [])?;
        let merge_at = self.wrap_children(start.parent, start.offset, end.offset, &wrapper)?;
        self.merge_all(merge_at, start, end)
    }

    /// Removes `attribute` from the content of a range: similar attribute
    /// elements are replaced by their children, compatible ones lose the
    /// wrapper's attributes.
    pub fn unwrap(&mut self, range: ViewRange, attribute: ViewNodeId) -> ViewResult<ViewRange> {
        let wrapper = self.attribute_template(attribute).ok_or(ViewError::UnwrapInvalidAttribute)?;
        if range.is_collapsed() {
            return Ok(range);
        }
        let (start, mut end) = self.break_range(range, &mut [])?;
        let (merge_at, new_end) = self.unwrap_children(start.parent, start.offset, end.offset, &wrapper)?;
        end.offset = new_end;
        self.merge_all(merge_at, start, end)
    }

    /// Splits attribute elements at `position` until it lies in a
    /// container. Text nodes are split as well.
    pub fn break_attributes(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        self.break_tracking(position, &mut [])
    }

    /// Joins the nodes on both sides of `position` when they are texts or
    /// similar attribute elements, and drops an empty attribute element the
    /// position is in.
    pub fn merge_attributes(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        self.merge_tracking(position, &mut [])
    }

    // ---- internals -------------------------------------------------------

    fn attribute_template(&self, id: ViewNodeId) -> Option<ViewElement> {
        self.tree.element(id).filter(|element| element.is_attribute()).cloned()
    }

    /// Breaks attributes at both ends of a range. The end is broken first
    /// so that breaking the start can keep it up to date.
    fn break_range(&mut self, range: ViewRange, tracked: &mut [ViewPosition]) -> ViewResult<(ViewPosition, ViewPosition)> {
        let mut marks: Vec<ViewPosition> = std::iter::once(range.start).chain(tracked.iter().copied()).collect();
        let end = self.break_tracking(range.end, &mut marks)?;

        let start = marks[0];
        let mut marks: Vec<ViewPosition> = std::iter::once(end).chain(marks[1..].iter().copied()).collect();
        let start = self.break_tracking(start, &mut marks)?;
        let end = marks[0];
        tracked.copy_from_slice(&marks[1..]);

        if start.parent != end.parent || start.offset > end.offset {
            return Err(ViewError::InvalidRangeContainer);
        }
        Ok((start, end))
    }

    fn break_tracking(&mut self, position: ViewPosition, tracked: &mut [ViewPosition]) -> ViewResult<ViewPosition> {
        let mut position = self.split_text(position, tracked)?;
        loop {
            let element = self.tree.element(position.parent).ok_or(ViewError::NodeNotFound)?;
            match element.kind {
                ElementKind::Attribute { .. } => {}
                ElementKind::Empty | ElementKind::Raw { .. } | ElementKind::Ui => {
                    return Err(ViewError::CannotBreakElement)
                }
                _ => return Ok(position),
            }

            let parent = position.parent;
            position = if position.is_at_start() {
                ViewPosition::before(self.tree, parent).ok_or(ViewError::NodeNotFound)?
            } else if position.is_at_end(self.tree) {
                ViewPosition::after(self.tree, parent).ok_or(ViewError::NodeNotFound)?
            } else {
                self.split_element(position, tracked)?
            };
        }
    }

    /// Splits the text a position is in. Returns the position between the
    /// halves, or next to the text when the position is at its edge.
    fn split_text(&mut self, position: ViewPosition, tracked: &mut [ViewPosition]) -> ViewResult<ViewPosition> {
        let Some(data) = self.tree.text(position.parent).map(str::to_string) else {
            return Ok(position);
        };
        let text = position.parent;
        if position.is_at_start() {
            return ViewPosition::before(self.tree, text).ok_or(ViewError::NodeNotFound);
        }
        if position.is_at_end(self.tree) {
            return ViewPosition::after(self.tree, text).ok_or(ViewError::NodeNotFound);
        }

        let parent = self.tree.parent(text).ok_or(ViewError::NodeNotFound)?;
        let index = self.tree.index(text).ok_or(ViewError::NodeNotFound)?;
        let at = data
            .char_indices()
            .nth(position.offset)
            .map(|(i, _)| i)
            .ok_or(ViewError::InvalidPosition { offset: position.offset })?;
        let (head, tail) = data.split_at(at);
        let tail_id = self.tree.create_text(tail);
        self.tree.set_text(text, head.to_string())?;
        self.tree.insert_children(parent, index + 1, vec![tail_id])?;

        for mark in tracked.iter_mut() {
            if mark.parent == text && mark.offset > position.offset {
                *mark = ViewPosition::new(tail_id, mark.offset - position.offset);
            }
        }
        shift(tracked, parent, index + 1, 1);
        Ok(ViewPosition::new(parent, index + 1))
    }

    /// Moves everything after `position` into a clone of its attribute
    /// element, inserted right after it.
    fn split_element(&mut self, position: ViewPosition, tracked: &mut [ViewPosition]) -> ViewResult<ViewPosition> {
        let element = position.parent;
        let grandparent = self.tree.parent(element).ok_or(ViewError::NodeNotFound)?;
        let index = self.tree.index(element).ok_or(ViewError::NodeNotFound)? + 1;

        let clone = self.tree.clone_element(element)?;
        let len = self.tree.children(element).len();
        let moved = self.tree.remove_children(element, position.offset, len)?;
        self.tree.insert_children(clone, 0, moved)?;
        self.tree.insert_children(grandparent, index, vec![clone])?;

        for mark in tracked.iter_mut() {
            if mark.parent == element && mark.offset > position.offset {
                *mark = ViewPosition::new(clone, mark.offset - position.offset);
            }
        }
        shift(tracked, grandparent, index, 1);
        Ok(ViewPosition::new(grandparent, index))
    }

    fn merge_keeping(
        &mut self,
        position: ViewPosition,
        other: &mut ViewPosition,
        tracked: &mut [ViewPosition],
    ) -> ViewResult<ViewPosition> {
        let mut marks: Vec<ViewPosition> = std::iter::once(*other).chain(tracked.iter().copied()).collect();
        let merged = self.merge_tracking(position, &mut marks)?;
        *other = marks[0];
        tracked.copy_from_slice(&marks[1..]);
        Ok(merged)
    }

    fn merge_tracking(&mut self, position: ViewPosition, tracked: &mut [ViewPosition]) -> ViewResult<ViewPosition> {
        if self.tree.is_text(position.parent) {
            return Ok(position);
        }

        let parent = position.parent;
        if self.tree.is_attribute_element(parent) && self.tree.children(parent).is_empty() {
            if let Some(outer) = ViewPosition::before(self.tree, parent) {
                self.tree.destroy(parent);
                for mark in tracked.iter_mut() {
                    if mark.parent == parent {
                        *mark = outer;
                    }
                }
                shift(tracked, outer.parent, outer.offset + 1, -1);
                return self.merge_tracking(outer, tracked);
            }
            return Ok(position);
        }

        let (Some(before), Some(after)) = (position.node_before(self.tree), position.node_after(self.tree)) else {
            return Ok(position);
        };

        if let (Some(a), Some(b)) = (self.tree.text(before), self.tree.text(after)) {
            let joined_at = a.chars().count();
            let data = format!("{a}{b}");
            self.tree.set_text(before, data)?;
            self.tree.destroy(after);
            self.retarget(tracked, parent, position.offset, after, before, joined_at);
            return Ok(ViewPosition::new(before, joined_at));
        }

        let similar = match (self.tree.element(before), self.tree.element(after)) {
            (Some(a), Some(b)) => a.is_attribute() && b.is_attribute() && a.is_similar(b),
            _ => false,
        };
        if !similar {
            return Ok(position);
        }

        let joined_at = self.tree.children(before).len();
        let len = self.tree.children(after).len();
        let moved = self.tree.remove_children(after, 0, len)?;
        self.tree.insert_children(before, joined_at, moved)?;
        self.tree.destroy(after);
        self.retarget(tracked, parent, position.offset, after, before, joined_at);
        self.merge_tracking(ViewPosition::new(before, joined_at), tracked)
    }

    /// Updates tracked positions after `from` (the node at `offset` in
    /// `parent`) was merged into `into` at `joined_at`.
    fn retarget(
        &self,
        tracked: &mut [ViewPosition],
        parent: ViewNodeId,
        offset: usize,
        from: ViewNodeId,
        into: ViewNodeId,
        joined_at: usize,
    ) {
        for mark in tracked.iter_mut() {
            if mark.parent == from {
                *mark = ViewPosition::new(into, joined_at + mark.offset);
            } else if mark.parent == parent && mark.offset == offset {
                *mark = ViewPosition::new(into, joined_at);
            } else if mark.parent == parent && mark.offset > offset {
                mark.offset -= 1;
            }
        }
    }

    /// Wraps children `start..end` of `parent`. Returns the positions where
    /// wrappers were placed, for merging.
    fn wrap_children(
        &mut self,
        parent: ViewNodeId,
        start: usize,
        end: usize,
        wrapper: &ViewElement,
    ) -> ViewResult<Vec<ViewPosition>> {
        let mut positions = Vec::new();
        for index in start..end {
            let Some(child) = self.tree.child(parent, index) else {
                break;
            };
            let child_element = self.tree.element(child).cloned();
            match child_element {
                Some(element) if element.is_attribute() && self.absorb_wrapper(child, wrapper)? => {
                    positions.push(ViewPosition::new(parent, index));
                }
                Some(element) if element.is_attribute() && !should_be_outside(wrapper, &element) => {
                    let len = element.children().len();
                    let inner = self.wrap_children(child, 0, len, wrapper)?;
                    self.merge_reverse(inner)?;
                }
                _ => {
                    let clone = self.tree.create_element(&wrapper.name, wrapper.kind.clone());
                    self.copy_properties(wrapper, clone)?;
                    self.tree.remove_children(parent, index, index + 1)?;
                    self.tree.insert_children(clone, 0, vec![child])?;
                    self.tree.insert_children(parent, index, vec![clone])?;
                    positions.push(ViewPosition::new(parent, index));
                }
            }
        }
        Ok(positions)
    }

    /// Unwraps children `start..end` of `parent`. Returns the merge
    /// positions and the new end offset.
    fn unwrap_children(
        &mut self,
        parent: ViewNodeId,
        start: usize,
        end: usize,
        wrapper: &ViewElement,
    ) -> ViewResult<(Vec<ViewPosition>, usize)> {
        let mut positions = Vec::new();
        let mut index = start;
        let mut end = end;
        while index < end {
            let Some(child) = self.tree.child(parent, index) else {
                break;
            };
            let Some(element) = self.tree.element(child).filter(|e| e.is_attribute()).cloned() else {
                index += 1;
                continue;
            };

            if element.is_similar(wrapper) {
                let count = element.children().len();
                let children = self.tree.remove_children(child, 0, count)?;
                self.tree.remove_children(parent, index, index + 1)?;
                self.tree.destroy(child);
                self.tree.insert_children(parent, index, children)?;
                positions.push(ViewPosition::new(parent, index));
                positions.push(ViewPosition::new(parent, index + count));
                index += count;
                end = end + count - 1;
            } else if self.strip_wrapper(child, wrapper)? {
                positions.push(ViewPosition::new(parent, index));
                positions.push(ViewPosition::new(parent, index + 1));
                index += 1;
            } else {
                let len = element.children().len();
                let (inner, _) = self.unwrap_children(child, 0, len, wrapper)?;
                self.merge_reverse(inner)?;
                index += 1;
            }
        }
        Ok((positions, end))
    }

    /// Adds the wrapper's properties to a compatible attribute element.
    fn absorb_wrapper(&mut self, id: ViewNodeId, wrapper: &ViewElement) -> ViewResult<bool> {
        let Some(element) = self.tree.element(id) else {
            return Ok(false);
        };
        if !compatible(element, wrapper) {
            return Ok(false);
        }
        let conflicts = wrapper
            .attributes()
            .iter()
            .any(|(k, v)| element.attributes().get(k).is_some_and(|existing| existing != v))
            || wrapper
                .styles()
                .iter()
                .any(|(k, v)| element.styles().get(k).is_some_and(|existing| existing != v));
        if conflicts {
            return Ok(false);
        }
        self.copy_properties(wrapper, id)?;
        Ok(true)
    }

    /// Removes the wrapper's properties from an attribute element that
    /// carries all of them.
    fn strip_wrapper(&mut self, id: ViewNodeId, wrapper: &ViewElement) -> ViewResult<bool> {
        let Some(element) = self.tree.element(id) else {
            return Ok(false);
        };
        if !compatible(element, wrapper) {
            return Ok(false);
        }
        let carries_all = wrapper.attributes().iter().all(|(k, v)| element.attributes().get(k) == Some(v))
            && wrapper.styles().iter().all(|(k, v)| element.styles().get(k) == Some(v))
            && wrapper.classes().iter().all(|c| element.has_class(c));
        if !carries_all {
            return Ok(false);
        }
        for key in wrapper.attributes().keys() {
            self.tree.remove_attribute(id, key)?;
        }
        for key in wrapper.styles().keys() {
            self.tree.remove_style(id, key)?;
        }
        for class in wrapper.classes() {
            self.tree.remove_class(id, class)?;
        }
        Ok(true)
    }

    fn copy_properties(&mut self, from: &ViewElement, to: ViewNodeId) -> ViewResult<()> {
        for (key, value) in from.attributes() {
            self.tree.set_attribute(to, key, value)?;
        }
        for class in from.classes() {
            self.tree.add_class(to, class)?;
        }
        for (key, value) in from.styles() {
            self.tree.set_style(to, key, value)?;
        }
        for (key, value) in from.custom_properties() {
            self.tree.set_custom_property(to, key, value.clone())?;
        }
        Ok(())
    }

    fn merge_reverse(&mut self, positions: Vec<ViewPosition>) -> ViewResult<()> {
        for position in positions.into_iter().rev() {
            if self.tree.contains(position.parent) && position.offset <= self.tree.max_offset(position.parent) {
                self.merge_tracking(position, &mut [])?;
            }
        }
        Ok(())
    }

    /// Merges at inner wrap positions, then at the range boundaries.
    fn merge_all(&mut self, positions: Vec<ViewPosition>, start: ViewPosition, end: ViewPosition) -> ViewResult<ViewRange> {
        let mut start = start;
        let mut end = end;
        for position in positions.into_iter().rev() {
            if position == start || position == end {
                continue;
            }
            let mut marks = [start, end];
            if position.offset <= self.tree.max_offset(position.parent) {
                self.merge_tracking(position, &mut marks)?;
            }
            [start, end] = marks;
        }
        end = self.merge_keeping(end, &mut start, &mut [])?;
        start = self.merge_keeping(start, &mut end, &mut [])?;
        Ok(ViewRange::new(start, end))
    }
}

/// Attribute elements that could be one element: same name and priority,
/// and equal ids when they have any.
fn compatible(a: &ViewElement, b: &ViewElement) -> bool {
    match (&a.kind, &b.kind) {
        (
            ElementKind::Attribute { priority: pa, id: ia },
            ElementKind::Attribute { priority: pb, id: ib },
        ) => a.name == b.name && pa == pb && ia == ib,
        _ => false,
    }
}

/// Whether `wrapper` goes outside `element` when both wrap the same
/// content. Lower priority is outside; equal priorities order by name.
fn should_be_outside(wrapper: &ViewElement, element: &ViewElement) -> bool {
    match wrapper.priority().cmp(&element.priority()) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => wrapper.name < element.name,
    }
}

/// Shifts positions in `parent` at or after `from`.
fn shift(tracked: &mut [ViewPosition], parent: ViewNodeId, from: usize, delta: isize) {
    for mark in tracked.iter_mut() {
        if mark.parent == parent && mark.offset >= from {
            mark.offset = (mark.offset as isize + delta).max(0) as usize;
        }
    }
}
