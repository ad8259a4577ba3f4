//! # Model tree
//!
//! Arena storage for every node of a document. Nodes are addressed by
//! [`NodeId`]; parents own ordered child lists. Roots are named elements
//! without a parent.
//!
//! ## Text
//!
//! Adjacent text nodes with equal attributes are always merged, and text is
//! split on demand when an offset falls inside it. A text node id therefore
//! identifies "the text currently stored here" and can disappear when the
//! node is merged into its previous sibling.
//!
//! ## Mutation
//!
//! The mutating functions are structural primitives. They check that paths
//! resolve but know nothing about versions or schema; documents change only
//! through operations, which validate before calling in here.

use crate::error::{ModelError, ModelResult};
use crate::node::{byte_index, char_len, slice_chars, Attributes, ElementNode, Node, TextNode, TEXT_NAME};
use crate::position::Position;
use crate::range::Range;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Name of the root that holds removed content.
pub const GRAVEYARD: &str = "$graveyard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Attributes,
    children: Vec<NodeId>,
}

impl Element {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub data: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(Element),
    Text(Text),
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootEntry {
    pub id: NodeId,
    pub attached: bool,
}

/// One item produced by walking a range: a whole element or a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Element(NodeId),
    Text(TextProxy),
}

/// A slice of a text node as seen by a range.
#[derive(Debug, Clone, PartialEq)]
pub struct TextProxy {
    pub node: NodeId,
    pub parent: NodeId,
    /// Offset of the slice start inside the parent element.
    pub start_offset: usize,
    pub data: String,
    pub attributes: Attributes,
}

impl TextProxy {
    pub fn len(&self) -> usize {
        char_len(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Item {
    pub fn name<'t>(&self, tree: &'t Tree) -> &'t str {
        match self {
            Item::Element(id) => tree.name(*id),
            Item::Text(_) => TEXT_NAME,
        }
    }

    pub fn attributes<'a>(&'a self, tree: &'a Tree) -> &'a Attributes {
        match self {
            Item::Element(id) => tree.attributes(*id),
            Item::Text(proxy) => &proxy.attributes,
        }
    }

    pub fn offset_size(&self) -> usize {
        match self {
            Item::Element(_) => 1,
            Item::Text(proxy) => proxy.len(),
        }
    }

    /// Range covering exactly this item.
    pub fn range(&self, tree: &Tree) -> ModelResult<Range> {
        match self {
            Item::Element(id) => Range::on(tree, *id),
            Item::Text(proxy) => {
                let start = tree.position_in(proxy.parent, proxy.start_offset)?;
                Ok(Range::from_position_and_shift(&start, proxy.len()))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    slots: Vec<Option<Slot>>,
    roots: BTreeMap<String, RootEntry>,
    root_names: HashMap<NodeId, String>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- roots -----------------------------------------------------------

    /// Creates (or re-attaches) a root element.
    pub fn add_root(&mut self, name: &str, element_name: &str) -> NodeId {
        if let Some(entry) = self.roots.get_mut(name) {
            entry.attached = true;
            return entry.id;
        }
        let id = self.alloc(
            None,
            NodeKind::Element(Element {
                name: element_name.to_string(),
                attributes: Attributes::new(),
                children: Vec::new(),
            }),
        );
        self.roots.insert(name.to_string(), RootEntry { id, attached: true });
        self.root_names.insert(id, name.to_string());
        id
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).map(|entry| entry.id)
    }

    pub fn root_entry(&self, name: &str) -> Option<&RootEntry> {
        self.roots.get(name)
    }

    pub fn set_root_attached(&mut self, name: &str, attached: bool) -> ModelResult<()> {
        let entry = self
            .roots
            .get_mut(name)
            .ok_or_else(|| ModelError::RootNotFound(name.to_string()))?;
        entry.attached = attached;
        Ok(())
    }

    /// Names of attached content roots, excluding the graveyard.
    pub fn root_names(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|(name, entry)| entry.attached && name.as_str() != GRAVEYARD)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.root_names.contains_key(&id)
    }

    /// Name of the root a node currently belongs to, if it is attached to one.
    pub fn root_name_of(&self, id: NodeId) -> Option<&str> {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        self.root_names.get(&current).map(String::as_str)
    }

    // ---- node access -----------------------------------------------------

    pub fn get(&self, id: NodeId) -> Option<&NodeKind> {
        self.slots.get(id.0).and_then(Option::as_ref).map(|slot| &slot.kind)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.get(id) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&Text> {
        match self.get(id) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(Option::as_ref).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Element name, or `$text` for text nodes.
    pub fn name(&self, id: NodeId) -> &str {
        match self.get(id) {
            Some(NodeKind::Element(element)) => &element.name,
            _ => TEXT_NAME,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &Attributes {
        static EMPTY: Attributes = BTreeMap::new();
        match self.get(id) {
            Some(NodeKind::Element(element)) => &element.attributes,
            Some(NodeKind::Text(text)) => &text.attributes,
            None => &EMPTY,
        }
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.attributes(id).get(key)
    }

    pub fn offset_size(&self, id: NodeId) -> usize {
        match self.get(id) {
            Some(NodeKind::Text(text)) => char_len(&text.data),
            Some(NodeKind::Element(_)) => 1,
            None => 0,
        }
    }

    pub fn max_offset(&self, id: NodeId) -> usize {
        self.children(id).iter().map(|child| self.offset_size(*child)).sum()
    }

    pub fn is_empty(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// Index of a node among its siblings.
    pub fn index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    /// Offset of a node inside its parent.
    pub fn start_offset(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let mut offset = 0;
        for child in self.children(parent) {
            if *child == id {
                return Some(offset);
            }
            offset += self.offset_size(*child);
        }
        None
    }

    /// Offset path from the root to a node. Empty for roots.
    pub fn path_of(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(offset) = self.start_offset(current) {
            path.push(offset);
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Ancestors from the root down, excluding the node itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors.reverse();
        ancestors
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Child containing `offset`: its index, id and start offset.
    pub fn child_at_offset(&self, parent: NodeId, offset: usize) -> Option<(usize, NodeId, usize)> {
        let mut start = 0;
        for (index, child) in self.children(parent).iter().enumerate() {
            let size = self.offset_size(*child);
            if offset < start + size {
                return Some((index, *child, start));
            }
            start += size;
        }
        None
    }

    /// Element whose offset path within `root` is `path`. An empty path
    /// resolves to the root itself.
    pub fn node_at_path(&self, root: &str, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root(root)?;
        for &offset in path {
            let (_, child, start) = self.child_at_offset(current, offset)?;
            if start != offset || !self.is_element(child) {
                return None;
            }
            current = child;
        }
        Some(current)
    }

    /// Resolves the parent element of a position and checks that its offset
    /// is within bounds.
    pub fn resolve_parent(&self, position: &Position) -> ModelResult<NodeId> {
        let invalid = || ModelError::InvalidPosition {
            root: position.root.clone(),
            path: position.path.clone(),
        };
        if position.path.is_empty() {
            return Err(invalid());
        }
        let parent = self.node_at_path(&position.root, position.parent_path()).ok_or_else(invalid)?;
        if position.offset() > self.max_offset(parent) {
            return Err(invalid());
        }
        Ok(parent)
    }

    /// Position at `offset` inside an element.
    pub fn position_in(&self, parent: NodeId, offset: usize) -> ModelResult<Position> {
        let root = self.root_name_of(parent).ok_or(ModelError::NodeNotFound)?.to_string();
        let mut path = self.path_of(parent);
        path.push(offset);
        Ok(Position::new(root, path))
    }

    pub fn position_before(&self, id: NodeId) -> ModelResult<Position> {
        let parent = self.parent(id).ok_or(ModelError::NodeNotFound)?;
        let offset = self.start_offset(id).ok_or(ModelError::NodeNotFound)?;
        self.position_in(parent, offset)
    }

    pub fn position_after(&self, id: NodeId) -> ModelResult<Position> {
        Ok(self.position_before(id)?.get_shifted_by(self.offset_size(id) as isize))
    }

    pub fn position_at_end(&self, parent: NodeId) -> ModelResult<Position> {
        self.position_in(parent, self.max_offset(parent))
    }

    /// Node starting exactly at a position.
    pub fn node_after(&self, position: &Position) -> Option<NodeId> {
        let parent = self.resolve_parent(position).ok()?;
        let (_, child, start) = self.child_at_offset(parent, position.offset())?;
        (start == position.offset()).then_some(child)
    }

    /// Node ending exactly at a position.
    pub fn node_before(&self, position: &Position) -> Option<NodeId> {
        let parent = self.resolve_parent(position).ok()?;
        if position.offset() == 0 {
            return None;
        }
        let (_, child, start) = self.child_at_offset(parent, position.offset() - 1)?;
        (start + self.offset_size(child) == position.offset()).then_some(child)
    }

    /// Text node a position is strictly inside of.
    pub fn text_node_at(&self, position: &Position) -> Option<NodeId> {
        let parent = self.resolve_parent(position).ok()?;
        let (_, child, start) = self.child_at_offset(parent, position.offset())?;
        (start < position.offset() && self.text(child).is_some()).then_some(child)
    }

    /// Attributes of the character right before (or, at offset zero, right
    /// after) a position.
    pub fn attributes_near(&self, position: &Position) -> Attributes {
        let Ok(parent) = self.resolve_parent(position) else {
            return Attributes::new();
        };
        let lookup = if position.offset() > 0 {
            position.offset() - 1
        } else {
            position.offset()
        };
        match self.child_at_offset(parent, lookup) {
            Some((_, child, _)) if self.text(child).is_some() => self.attributes(child).clone(),
            _ => Attributes::new(),
        }
    }

    // ---- snapshots -------------------------------------------------------

    pub fn to_node(&self, id: NodeId) -> Option<Node> {
        match self.get(id)? {
            NodeKind::Text(text) => Some(Node::Text(TextNode {
                data: text.data.clone(),
                attributes: text.attributes.clone(),
            })),
            NodeKind::Element(element) => Some(Node::Element(ElementNode {
                name: element.name.clone(),
                attributes: element.attributes.clone(),
                children: element.children.iter().filter_map(|c| self.to_node(*c)).collect(),
            })),
        }
    }

    pub fn children_nodes(&self, parent: NodeId) -> Vec<Node> {
        self.children(parent).iter().filter_map(|c| self.to_node(*c)).collect()
    }

    /// Owned copy of a root's content.
    pub fn root_content(&self, root: &str) -> Vec<Node> {
        self.root(root).map(|id| self.children_nodes(id)).unwrap_or_default()
    }

    /// Owned copy of the content of a flat range.
    pub fn nodes_in_flat(&self, parent: NodeId, start: usize, end: usize) -> Vec<Node> {
        self.items_in_flat(parent, start, end)
            .into_iter()
            .filter_map(|item| match item {
                Item::Element(id) => self.to_node(id),
                Item::Text(proxy) => Some(Node::Text(TextNode {
                    data: proxy.data,
                    attributes: proxy.attributes,
                })),
            })
            .collect()
    }

    // ---- walking ---------------------------------------------------------

    /// Top-level items of `parent` between two offsets.
    pub fn items_in_flat(&self, parent: NodeId, start: usize, end: usize) -> Vec<Item> {
        let mut items = Vec::new();
        let mut offset = 0;
        for child in self.children(parent) {
            let size = self.offset_size(*child);
            let child_end = offset + size;
            if child_end > start && offset < end {
                match self.get(*child) {
                    Some(NodeKind::Text(text)) => {
                        let from = start.max(offset) - offset;
                        let to = end.min(child_end) - offset;
                        items.push(Item::Text(TextProxy {
                            node: *child,
                            parent,
                            start_offset: offset + from,
                            data: slice_chars(&text.data, from, to).to_string(),
                            attributes: text.attributes.clone(),
                        }));
                    }
                    Some(NodeKind::Element(_)) => items.push(Item::Element(*child)),
                    None => {}
                }
            }
            offset = child_end;
            if offset >= end {
                break;
            }
        }
        items
    }

    /// Items of a range in document order. Shallow walks only the top level
    /// of each flat part; deep also walks into fully covered elements.
    pub fn items(&self, range: &Range, deep: bool) -> ModelResult<Vec<Item>> {
        let mut items = Vec::new();
        for flat in range.minimal_flat_ranges(self)? {
            let parent = self.resolve_parent(&flat.start)?;
            for item in self.items_in_flat(parent, flat.start.offset(), flat.end.offset()) {
                let element = match &item {
                    Item::Element(id) => Some(*id),
                    Item::Text(_) => None,
                };
                items.push(item);
                if let (true, Some(id)) = (deep, element) {
                    self.collect_descendants(id, &mut items);
                }
            }
        }
        Ok(items)
    }

    fn collect_descendants(&self, id: NodeId, items: &mut Vec<Item>) {
        let max = self.max_offset(id);
        for item in self.items_in_flat(id, 0, max) {
            let element = match &item {
                Item::Element(child) => Some(*child),
                Item::Text(_) => None,
            };
            items.push(item);
            if let Some(child) = element {
                self.collect_descendants(child, items);
            }
        }
    }

    // ---- structural primitives ------------------------------------------

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Some(Slot { parent, kind }));
        id
    }

    fn slot_mut(&mut self, id: NodeId) -> ModelResult<&mut Slot> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ModelError::NodeNotFound)
    }

    fn children_mut(&mut self, id: NodeId) -> ModelResult<&mut Vec<NodeId>> {
        match &mut self.slot_mut(id)?.kind {
            NodeKind::Element(element) => Ok(&mut element.children),
            NodeKind::Text(_) => Err(ModelError::NodeNotFound),
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> ModelResult<()> {
        self.slot_mut(id)?.parent = parent;
        Ok(())
    }

    /// Allocates an owned node (and its subtree) without attaching it.
    pub fn instantiate(&mut self, node: &Node) -> ModelResult<NodeId> {
        match node {
            Node::Text(text) => Ok(self.alloc(
                None,
                NodeKind::Text(Text {
                    data: text.data.clone(),
                    attributes: text.attributes.clone(),
                }),
            )),
            Node::Element(element) => {
                let id = self.alloc(
                    None,
                    NodeKind::Element(Element {
                        name: element.name.clone(),
                        attributes: element.attributes.clone(),
                        children: Vec::new(),
                    }),
                );
                let children = element
                    .children
                    .iter()
                    .map(|c| self.instantiate(c))
                    .collect::<ModelResult<Vec<NodeId>>>()?;
                for child in &children {
                    if let Some(slot) = self.slots[child.0].as_mut() {
                        slot.parent = Some(id);
                    }
                }
                if let Some(NodeKind::Element(e)) = self.slots[id.0].as_mut().map(|slot| &mut slot.kind) {
                    e.children = children;
                }
                self.merge_all_texts(id)?;
                Ok(id)
            }
        }
    }

    /// Makes `offset` a child boundary of `parent`, splitting a text node if
    /// needed. Returns the index of the first child at or after `offset`.
    pub fn split_text_at(&mut self, parent: NodeId, offset: usize) -> ModelResult<usize> {
        let Some((index, child, start)) = self.child_at_offset(parent, offset) else {
            return Ok(self.children(parent).len());
        };
        if start == offset {
            return Ok(index);
        }
        let (tail, attributes) = match &mut self.slot_mut(child)?.kind {
            NodeKind::Text(text) => {
                let at = byte_index(&text.data, offset - start);
                (text.data.split_off(at), text.attributes.clone())
            }
            NodeKind::Element(_) => return Ok(index),
        };
        let new_id = self.alloc(Some(parent), NodeKind::Text(Text { data: tail, attributes }));
        self.children_mut(parent)?.insert(index + 1, new_id);
        Ok(index + 1)
    }

    /// Merges the child at `index` into its previous sibling when both are
    /// texts with equal attributes.
    pub fn merge_texts_at(&mut self, parent: NodeId, index: usize) -> ModelResult<bool> {
        let children = self.children(parent);
        if index == 0 || index >= children.len() {
            return Ok(false);
        }
        let (prev, next) = (children[index - 1], children[index]);
        let (Some(a), Some(b)) = (self.text(prev), self.text(next)) else {
            return Ok(false);
        };
        if a.attributes != b.attributes {
            return Ok(false);
        }
        let data = b.data.clone();
        if let NodeKind::Text(text) = &mut self.slot_mut(prev)?.kind {
            text.data.push_str(&data);
        }
        self.children_mut(parent)?.remove(index);
        self.slots[next.0] = None;
        Ok(true)
    }

    fn merge_all_texts(&mut self, parent: NodeId) -> ModelResult<()> {
        let mut index = self.children(parent).len();
        while index > 1 {
            index -= 1;
            self.merge_texts_at(parent, index)?;
        }
        Ok(())
    }

    /// Attaches existing detached nodes at `offset`.
    pub fn insert_existing(&mut self, parent: NodeId, offset: usize, ids: Vec<NodeId>) -> ModelResult<()> {
        if offset > self.max_offset(parent) || !self.is_element(parent) {
            return Err(ModelError::NodeNotFound);
        }
        let index = self.split_text_at(parent, offset)?;
        let count = ids.len();
        for id in &ids {
            self.set_parent(*id, Some(parent))?;
        }
        self.children_mut(parent)?.splice(index..index, ids);
        self.merge_texts_at(parent, index + count)?;
        self.merge_texts_at(parent, index)?;
        Ok(())
    }

    /// Instantiates owned nodes at `offset`. Returns their total offset size.
    pub fn insert_nodes(&mut self, parent: NodeId, offset: usize, nodes: &[Node]) -> ModelResult<usize> {
        let ids = nodes
            .iter()
            .map(|node| self.instantiate(node))
            .collect::<ModelResult<Vec<NodeId>>>()?;
        let size = nodes.iter().map(Node::offset_size).sum();
        self.insert_existing(parent, offset, ids)?;
        Ok(size)
    }

    /// Detaches the children between two offsets and returns them.
    pub fn remove_range(&mut self, parent: NodeId, start: usize, end: usize) -> ModelResult<Vec<NodeId>> {
        let from = self.split_text_at(parent, start)?;
        let to = self.split_text_at(parent, end)?;
        let removed: Vec<NodeId> = self.children_mut(parent)?.drain(from..to).collect();
        for id in &removed {
            self.set_parent(*id, None)?;
        }
        self.merge_texts_at(parent, from)?;
        Ok(removed)
    }

    /// Moves `how_many` offsets from `source` to `target`, where `target` is
    /// given in coordinates from before the removal. Returns the range the
    /// content occupies afterwards.
    pub fn move_nodes(&mut self, source: &Position, how_many: usize, target: &Position) -> ModelResult<Range> {
        let source_parent = self.resolve_parent(source)?;
        let ids = self.remove_range(source_parent, source.offset(), source.offset() + how_many)?;
        let target = target
            .get_transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        let target_parent = self.resolve_parent(&target)?;
        self.insert_existing(target_parent, target.offset(), ids)?;
        Ok(Range::from_position_and_shift(&target, how_many))
    }

    /// Sets (or with `None`, removes) an attribute on every top-level node
    /// between two offsets.
    pub fn set_attribute_in_flat(
        &mut self,
        parent: NodeId,
        start: usize,
        end: usize,
        key: &str,
        value: Option<&Value>,
    ) -> ModelResult<()> {
        let from = self.split_text_at(parent, start)?;
        let to = self.split_text_at(parent, end)?;
        let ids: Vec<NodeId> = self.children(parent)[from..to].to_vec();
        for id in ids {
            self.set_node_attribute(id, key, value)?;
        }
        let mut index = to;
        while index > from {
            self.merge_texts_at(parent, index)?;
            index -= 1;
        }
        self.merge_texts_at(parent, from)?;
        Ok(())
    }

    /// Sets an attribute on a single node without normalizing its siblings.
    pub fn set_node_attribute(&mut self, id: NodeId, key: &str, value: Option<&Value>) -> ModelResult<()> {
        let attributes = match &mut self.slot_mut(id)?.kind {
            NodeKind::Element(element) => &mut element.attributes,
            NodeKind::Text(text) => &mut text.attributes,
        };
        match value {
            Some(value) => {
                attributes.insert(key.to_string(), value.clone());
            }
            None => {
                attributes.remove(key);
            }
        }
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, name: &str) -> ModelResult<()> {
        match &mut self.slot_mut(id)?.kind {
            NodeKind::Element(element) => {
                element.name = name.to_string();
                Ok(())
            }
            NodeKind::Text(_) => Err(ModelError::WriterRenameNotElement),
        }
    }

    /// Splits ancestors of `position` up to (excluding) `limit`. Each split
    /// element keeps the content before the position and a fresh copy
    /// after it receives the rest.
    ///
    /// Returns the position between the outermost split parts inside
    /// `limit` and the `(original, copy)` pairs from the innermost out.
    pub fn split_to(&mut self, position: &Position, limit: NodeId) -> ModelResult<(Position, Vec<(NodeId, NodeId)>)> {
        let mut position = position.clone();
        let mut pairs = Vec::new();
        loop {
            let element = self.resolve_parent(&position)?;
            if element == limit {
                break;
            }
            let parent = self.parent(element).ok_or(ModelError::WriterSplitElementNoParent)?;
            let (name, attributes) = match self.get(element) {
                Some(NodeKind::Element(e)) => (e.name.clone(), e.attributes.clone()),
                _ => return Err(ModelError::NodeNotFound),
            };
            let copy = self.alloc(
                Some(parent),
                NodeKind::Element(Element {
                    name,
                    attributes,
                    children: Vec::new(),
                }),
            );
            let moved = self.remove_range(element, position.offset(), self.max_offset(element))?;
            self.insert_existing(copy, 0, moved)?;
            let index = self.index(element).ok_or(ModelError::NodeNotFound)?;
            self.children_mut(parent)?.insert(index + 1, copy);
            pairs.push((element, copy));
            position = self.position_after(element)?;
            if parent == limit {
                break;
            }
        }
        Ok((position, pairs))
    }

    /// Detaches and frees a node and its subtree.
    pub fn remove_node(&mut self, id: NodeId) -> ModelResult<()> {
        if let Some(parent) = self.parent(id) {
            let index = self.index(id).ok_or(ModelError::NodeNotFound)?;
            self.children_mut(parent)?.remove(index);
            self.merge_texts_at(parent, index)?;
        }
        self.free(id);
        Ok(())
    }

    fn free(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.free(child);
        }
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn set_text_data(&mut self, id: NodeId, data: &str) -> ModelResult<()> {
        match &mut self.slot_mut(id)?.kind {
            NodeKind::Text(text) => {
                text.data = data.to_string();
                Ok(())
            }
            NodeKind::Element(_) => Err(ModelError::NodeNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let root = tree.add_root("main", "$root");
        tree.insert_nodes(
            root,
            0,
            &[
                Node::element("paragraph").with_child(Node::text("foo")),
                Node::element("paragraph").with_child(Node::text("bar").with_attribute("bold", true)),
            ],
        )
        .unwrap();
        (tree, root)
    }

    #[test]
    fn test_instantiate_merges_adjacent_texts() {
        let mut tree = Tree::new();
        let paragraph = Node::element("paragraph")
            .with_child(Node::text("fo"))
            .with_child(Node::text("o"))
            .with_child(Node::text("bar").with_attribute("bold", true));
        let id = tree.instantiate(&paragraph).unwrap();
        assert_eq!(tree.children(id).len(), 2);
        assert_eq!(
            tree.to_node(id),
            Some(
                Node::element("paragraph")
                    .with_child(Node::text("foo"))
                    .with_child(Node::text("bar").with_attribute("bold", true))
            )
        );
    }

    #[test]
    fn test_resolve_and_paths() {
        let (tree, root) = sample();
        let second = tree.children(root)[1];
        assert_eq!(tree.path_of(second), vec![1]);
        assert_eq!(tree.resolve_parent(&Position::new("main", vec![1, 2])).unwrap(), second);
        assert!(tree.resolve_parent(&Position::new("main", vec![1, 4])).is_err());
        assert!(tree.resolve_parent(&Position::new("main", vec![0, 1, 0])).is_err());
        assert_eq!(tree.root_name_of(second), Some("main"));
    }

    #[test]
    fn test_insert_splits_and_merges_text() {
        let (mut tree, root) = sample();
        let first = tree.children(root)[0];
        tree.insert_nodes(first, 1, &[Node::text("X")]).unwrap();
        assert_eq!(tree.children(first).len(), 1);
        assert_eq!(tree.text(tree.children(first)[0]).unwrap().data, "fXoo");

        tree.insert_nodes(first, 2, &[Node::text("Y").with_attribute("bold", true)]).unwrap();
        assert_eq!(tree.children(first).len(), 3);
        assert_eq!(tree.max_offset(first), 5);
    }

    #[test]
    fn test_attribute_range_normalizes() {
        let (mut tree, root) = sample();
        let first = tree.children(root)[0];
        let bold = Value::Bool(true);
        tree.set_attribute_in_flat(first, 1, 2, "bold", Some(&bold)).unwrap();
        assert_eq!(tree.children(first).len(), 3);
        tree.set_attribute_in_flat(first, 1, 2, "bold", None).unwrap();
        assert_eq!(tree.children(first).len(), 1);
        assert_eq!(tree.text(tree.children(first)[0]).unwrap().data, "foo");
    }

    #[test]
    fn test_move_nodes_uses_pre_removal_target() {
        let (mut tree, root) = sample();
        let range = tree
            .move_nodes(&Position::at("main", 0), 1, &Position::at("main", 2))
            .unwrap();
        assert_eq!(range, Range::from_position_and_shift(&Position::at("main", 1), 1));
        assert_eq!(tree.root_content("main")[1], Node::element("paragraph").with_child(Node::text("foo")));
        assert_eq!(tree.children(root).len(), 2);
    }

    #[test]
    fn test_deep_items() {
        let (tree, _) = sample();
        let range = Range::new(Position::at("main", 0), Position::at("main", 2));
        let items = tree.items(&range, true).unwrap();
        let names: Vec<_> = items.iter().map(|item| item.name(&tree).to_string()).collect();
        assert_eq!(names, vec!["paragraph", "$text", "paragraph", "$text"]);
    }

    #[test]
    fn test_split_to() {
        let (mut tree, root) = sample();
        let (position, pairs) = tree.split_to(&Position::new("main", vec![0, 1]), root).unwrap();
        assert_eq!(position, Position::at("main", 1));
        assert_eq!(pairs.len(), 1);
        assert_eq!(tree.children(root).len(), 3);
        assert_eq!(tree.root_content("main")[1], Node::element("paragraph").with_child(Node::text("oo")));
    }
}
