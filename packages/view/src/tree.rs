//! # View tree
//!
//! DOM-shaped counterpart of the model tree, stored in an arena like the
//! model. Elements carry a [`ElementKind`] that decides how the writer
//! treats them: attribute elements are broken and merged around content,
//! empty, raw and UI elements never hold view children.
//!
//! Classes and styles are kept apart from the other attributes so that
//! matchers and converters can consume them one by one.

use crate::error::{ViewError, ViewResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Priority attribute elements get when none is given.
pub const DEFAULT_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewNodeId(usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    Container,
    /// Formatting wrapper. Lower priorities end up outside higher ones.
    Attribute {
        priority: i32,
        id: Option<String>,
    },
    Empty,
    /// Element whose content is opaque HTML.
    Raw {
        html: String,
    },
    Ui,
    Editable,
    Root,
}

impl ElementKind {
    pub fn attribute() -> Self {
        ElementKind::Attribute {
            priority: DEFAULT_PRIORITY,
            id: None,
        }
    }

    /// Kinds that may hold view children.
    pub fn accepts_children(&self) -> bool {
        !matches!(self, ElementKind::Empty | ElementKind::Raw { .. } | ElementKind::Ui)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewElement {
    pub name: String,
    pub kind: ElementKind,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    styles: BTreeMap<String, String>,
    custom_properties: BTreeMap<String, Value>,
    children: Vec<ViewNodeId>,
}

impl ViewElement {
    fn new(name: &str, kind: ElementKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            attributes: BTreeMap::new(),
            classes: Vec::new(),
            styles: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[ViewNodeId] {
        &self.children
    }

    /// Attributes other than `class` and `style`.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Classes in the order they were added.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn styles(&self) -> &BTreeMap<String, String> {
        &self.styles
    }

    pub fn custom_properties(&self) -> &BTreeMap<String, Value> {
        &self.custom_properties
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn priority(&self) -> Option<i32> {
        match &self.kind {
            ElementKind::Attribute { priority, .. } => Some(*priority),
            _ => None,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, ElementKind::Attribute { .. })
    }

    /// Same name, kind, priority and visible attributes. Similar attribute
    /// elements are merged when they touch.
    pub fn is_similar(&self, other: &ViewElement) -> bool {
        if let (ElementKind::Attribute { id: Some(a), .. }, ElementKind::Attribute { id: Some(b), .. }) =
            (&self.kind, &other.kind)
        {
            return a == b;
        }
        let mut classes_a = self.classes.clone();
        let mut classes_b = other.classes.clone();
        classes_a.sort();
        classes_b.sort();
        self.name == other.name
            && self.kind == other.kind
            && self.attributes == other.attributes
            && self.styles == other.styles
            && classes_a == classes_b
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Element(ViewElement),
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<ViewNodeId>,
    node: ViewNode,
}

#[derive(Debug, Clone, Default)]
pub struct ViewTree {
    slots: Vec<Option<Slot>>,
    roots: BTreeMap<String, ViewNodeId>,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- roots -----------------------------------------------------------

    pub fn create_root(&mut self, name: &str, element_name: &str) -> ViewResult<ViewNodeId> {
        if self.roots.contains_key(name) {
            return Err(ViewError::RootExists(name.to_string()));
        }
        let id = self.create_element(element_name, ElementKind::Root);
        self.roots.insert(name.to_string(), id);
        Ok(id)
    }

    /// Drops a root and every node below it.
    pub fn remove_root(&mut self, name: &str) -> ViewResult<()> {
        let id = self
            .roots
            .remove(name)
            .ok_or_else(|| ViewError::RootNotFound(name.to_string()))?;
        self.destroy(id);
        Ok(())
    }

    pub fn root(&self, name: &str) -> Option<ViewNodeId> {
        self.roots.get(name).copied()
    }

    pub fn root_names(&self) -> Vec<String> {
        self.roots.keys().cloned().collect()
    }

    pub fn root_name_of(&self, id: ViewNodeId) -> Option<&str> {
        let top = self.top_most(id);
        self.roots
            .iter()
            .find(|(_, root)| **root == top)
            .map(|(name, _)| name.as_str())
    }

    // ---- creation --------------------------------------------------------

    /// Creates a detached element.
    pub fn create_element(&mut self, name: &str, kind: ElementKind) -> ViewNodeId {
        self.alloc(ViewNode::Element(ViewElement::new(name, kind)))
    }

    pub fn create_text(&mut self, data: &str) -> ViewNodeId {
        self.alloc(ViewNode::Text(data.to_string()))
    }

    /// Shallow copy of an element: same name, kind and attributes, no
    /// children.
    pub fn clone_element(&mut self, id: ViewNodeId) -> ViewResult<ViewNodeId> {
        let element = self.element(id).ok_or(ViewError::NodeNotFound)?;
        let copy = ViewElement {
            children: Vec::new(),
            ..element.clone()
        };
        Ok(self.alloc(ViewNode::Element(copy)))
    }

    /// Recursive copy of a subtree, returned detached.
    pub fn deep_clone(&mut self, id: ViewNodeId) -> ViewResult<ViewNodeId> {
        match self.get(id).cloned().ok_or(ViewError::NodeNotFound)? {
            ViewNode::Text(data) => Ok(self.create_text(&data)),
            ViewNode::Element(element) => {
                let copy = self.clone_element(id)?;
                let mut children = Vec::with_capacity(element.children.len());
                for child in element.children {
                    children.push(self.deep_clone(child)?);
                }
                self.insert_children(copy, 0, children)?;
                Ok(copy)
            }
        }
    }

    fn alloc(&mut self, node: ViewNode) -> ViewNodeId {
        let id = ViewNodeId(self.slots.len());
        self.slots.push(Some(Slot { parent: None, node }));
        id
    }

    // ---- access ----------------------------------------------------------

    pub fn get(&self, id: ViewNodeId) -> Option<&ViewNode> {
        self.slots.get(id.0).and_then(Option::as_ref).map(|slot| &slot.node)
    }

    pub fn contains(&self, id: ViewNodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn element(&self, id: ViewNodeId) -> Option<&ViewElement> {
        match self.get(id) {
            Some(ViewNode::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn text(&self, id: ViewNodeId) -> Option<&str> {
        match self.get(id) {
            Some(ViewNode::Text(data)) => Some(data),
            _ => None,
        }
    }

    pub fn is_text(&self, id: ViewNodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn is_element(&self, id: ViewNodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_attribute_element(&self, id: ViewNodeId) -> bool {
        self.element(id).map(ViewElement::is_attribute).unwrap_or(false)
    }

    /// Element name, empty for text.
    pub fn name(&self, id: ViewNodeId) -> &str {
        self.element(id).map(|e| e.name.as_str()).unwrap_or("")
    }

    pub fn kind(&self, id: ViewNodeId) -> Option<&ElementKind> {
        self.element(id).map(|e| &e.kind)
    }

    pub fn parent(&self, id: ViewNodeId) -> Option<ViewNodeId> {
        self.slots.get(id.0).and_then(Option::as_ref).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: ViewNodeId) -> &[ViewNodeId] {
        self.element(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    pub fn child(&self, id: ViewNodeId, index: usize) -> Option<ViewNodeId> {
        self.children(id).get(index).copied()
    }

    /// Number of offsets inside a node: characters for text, children for
    /// elements.
    pub fn max_offset(&self, id: ViewNodeId) -> usize {
        match self.get(id) {
            Some(ViewNode::Text(data)) => data.chars().count(),
            Some(ViewNode::Element(element)) => element.children.len(),
            None => 0,
        }
    }

    pub fn index(&self, id: ViewNodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn attribute(&self, id: ViewNodeId, key: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attributes.get(key)).map(String::as_str)
    }

    pub fn has_class(&self, id: ViewNodeId, class: &str) -> bool {
        self.element(id).map(|e| e.has_class(class)).unwrap_or(false)
    }

    pub fn style(&self, id: ViewNodeId, key: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.styles.get(key)).map(String::as_str)
    }

    pub fn custom_property(&self, id: ViewNodeId, key: &str) -> Option<&Value> {
        self.element(id).and_then(|e| e.custom_properties.get(key))
    }

    /// Ancestors from the parent outwards.
    pub fn ancestors(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors
    }

    pub fn top_most(&self, id: ViewNodeId) -> ViewNodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Index path from the top-most ancestor down to `id`.
    pub fn path_of(&self, id: ViewNodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(index) = self.index(current) {
            path.push(index);
            current = match self.parent(current) {
                Some(parent) => parent,
                None => break,
            };
        }
        path.reverse();
        path
    }

    pub fn is_ancestor_of(&self, ancestor: ViewNodeId, id: ViewNodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Joined data of every text below `id`.
    pub fn text_content(&self, id: ViewNodeId) -> String {
        match self.get(id) {
            Some(ViewNode::Text(data)) => data.clone(),
            Some(ViewNode::Element(element)) => element.children.iter().map(|c| self.text_content(*c)).collect(),
            None => String::new(),
        }
    }

    // ---- mutation --------------------------------------------------------

    fn slot_mut(&mut self, id: ViewNodeId) -> ViewResult<&mut Slot> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ViewError::NodeNotFound)
    }

    pub(crate) fn element_mut(&mut self, id: ViewNodeId) -> ViewResult<&mut ViewElement> {
        match &mut self.slot_mut(id)?.node {
            ViewNode::Element(element) => Ok(element),
            ViewNode::Text(_) => Err(ViewError::NodeNotFound),
        }
    }

    pub(crate) fn set_text(&mut self, id: ViewNodeId, data: String) -> ViewResult<()> {
        match &mut self.slot_mut(id)?.node {
            ViewNode::Text(text) => {
                *text = data;
                Ok(())
            }
            ViewNode::Element(_) => Err(ViewError::NodeNotFound),
        }
    }

    /// Attaches detached nodes at `index`. Nodes still attached elsewhere
    /// are detached first.
    pub fn insert_children(&mut self, parent: ViewNodeId, index: usize, ids: Vec<ViewNodeId>) -> ViewResult<()> {
        let element = self.element(parent).ok_or(ViewError::NodeNotFound)?;
        if !element.kind.accepts_children() {
            return Err(ViewError::ElementCannotHaveChildren(element.name.clone()));
        }
        if index > element.children.len() {
            return Err(ViewError::InvalidPosition { offset: index });
        }
        for id in &ids {
            self.detach(*id)?;
            self.slot_mut(*id)?.parent = Some(parent);
        }
        // Detaching may have shifted siblings when nodes came from `parent`.
        let index = index.min(self.children(parent).len());
        self.element_mut(parent)?.children.splice(index..index, ids);
        Ok(())
    }

    pub fn append_child(&mut self, parent: ViewNodeId, id: ViewNodeId) -> ViewResult<()> {
        let index = self.children(parent).len();
        self.insert_children(parent, index, vec![id])
    }

    /// Detaches the children in `from..to` and returns them.
    pub fn remove_children(&mut self, parent: ViewNodeId, from: usize, to: usize) -> ViewResult<Vec<ViewNodeId>> {
        let len = self.children(parent).len();
        if from > to || to > len {
            return Err(ViewError::InvalidPosition { offset: to });
        }
        let removed: Vec<ViewNodeId> = self.element_mut(parent)?.children.drain(from..to).collect();
        for id in &removed {
            self.slot_mut(*id)?.parent = None;
        }
        Ok(removed)
    }

    /// Removes a node from its parent, keeping it in the arena.
    pub fn detach(&mut self, id: ViewNodeId) -> ViewResult<()> {
        if let Some(index) = self.index(id) {
            if let Some(parent) = self.parent(id) {
                self.remove_children(parent, index, index + 1)?;
            }
        }
        Ok(())
    }

    /// Frees a node and its subtree.
    pub fn destroy(&mut self, id: ViewNodeId) {
        let _ = self.detach(id);
        let children = self.children(id).to_vec();
        for child in children {
            self.destroy(child);
        }
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn set_attribute(&mut self, id: ViewNodeId, key: &str, value: &str) -> ViewResult<()> {
        match key {
            "class" => {
                let element = self.element_mut(id)?;
                element.classes.clear();
                for class in value.split_whitespace() {
                    if !element.has_class(class) {
                        element.classes.push(class.to_string());
                    }
                }
            }
            "style" => {
                let element = self.element_mut(id)?;
                element.styles = parse_style(value);
            }
            _ => {
                self.element_mut(id)?.attributes.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        let element = self.element_mut(id)?;
        match key {
            "class" => element.classes.clear(),
            "style" => element.styles.clear(),
            _ => {
                element.attributes.remove(key);
            }
        }
        Ok(())
    }

    pub fn add_class(&mut self, id: ViewNodeId, class: &str) -> ViewResult<()> {
        let element = self.element_mut(id)?;
        for class in class.split_whitespace() {
            if !element.has_class(class) {
                element.classes.push(class.to_string());
            }
        }
        Ok(())
    }

    pub fn remove_class(&mut self, id: ViewNodeId, class: &str) -> ViewResult<()> {
        let element = self.element_mut(id)?;
        let removed: Vec<&str> = class.split_whitespace().collect();
        element.classes.retain(|c| !removed.contains(&c.as_str()));
        Ok(())
    }

    pub fn set_style(&mut self, id: ViewNodeId, key: &str, value: &str) -> ViewResult<()> {
        self.element_mut(id)?.styles.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_style(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        self.element_mut(id)?.styles.remove(key);
        Ok(())
    }

    pub fn set_custom_property(&mut self, id: ViewNodeId, key: &str, value: Value) -> ViewResult<()> {
        self.element_mut(id)?.custom_properties.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove_custom_property(&mut self, id: ViewNodeId, key: &str) -> ViewResult<()> {
        self.element_mut(id)?.custom_properties.remove(key);
        Ok(())
    }

    pub fn rename(&mut self, id: ViewNodeId, name: &str) -> ViewResult<()> {
        self.element_mut(id)?.name = name.to_string();
        Ok(())
    }
}

/// Splits a `style` attribute into property/value pairs.
pub fn parse_style(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            (!key.is_empty() && !value.is_empty()).then(|| (key.to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_and_style_attributes_are_split() {
        let mut tree = ViewTree::new();
        let div = tree.create_element("div", ElementKind::Container);
        tree.set_attribute(div, "class", "a  b a").unwrap();
        tree.set_attribute(div, "style", "color: red; margin:0;").unwrap();
        tree.set_attribute(div, "id", "x").unwrap();

        let element = tree.element(div).unwrap();
        assert_eq!(element.classes(), &["a".to_string(), "b".to_string()]);
        assert_eq!(tree.style(div, "margin"), Some("0"));
        assert_eq!(tree.attribute(div, "id"), Some("x"));
        assert!(tree.attribute(div, "class").is_none());
    }

    #[test]
    fn test_insert_moves_attached_nodes() {
        let mut tree = ViewTree::new();
        let root = tree.create_root("main", "div").unwrap();
        let a = tree.create_element("p", ElementKind::Container);
        let b = tree.create_element("p", ElementKind::Container);
        tree.insert_children(root, 0, vec![a, b]).unwrap();
        tree.insert_children(root, 2, vec![a]).unwrap();
        assert_eq!(tree.children(root), &[b, a]);
        assert_eq!(tree.path_of(a), vec![1]);
        assert_eq!(tree.root_name_of(a), Some("main"));
    }

    #[test]
    fn test_empty_elements_reject_children() {
        let mut tree = ViewTree::new();
        let img = tree.create_element("img", ElementKind::Empty);
        let text = tree.create_text("x");
        assert_eq!(
            tree.insert_children(img, 0, vec![text]),
            Err(ViewError::ElementCannotHaveChildren("img".into()))
        );
    }

    #[test]
    fn test_similar_attribute_elements() {
        let mut tree = ViewTree::new();
        let a = tree.create_element("strong", ElementKind::attribute());
        let b = tree.create_element("strong", ElementKind::attribute());
        let c = tree.create_element("strong", ElementKind::Attribute { priority: 5, id: None });
        assert!(tree.element(a).unwrap().is_similar(tree.element(b).unwrap()));
        assert!(!tree.element(a).unwrap().is_similar(tree.element(c).unwrap()));
    }
}
