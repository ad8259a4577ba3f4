//! Bookkeeping of which aspects of a change were already converted.
//!
//! Each dispatch pass fills a consumable with everything that may be
//! converted. Converters consume what they handle, and later converters
//! only act on what is still available.

use folio_model::{Item, NodeId, Position};
use folio_view::{MatchResult, ViewNode, ViewNodeId, ViewTree};
use std::collections::{BTreeMap, HashMap};

/// Model-side subject of a consumable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConsumableItem {
    Element(NodeId),
    /// A slice of text, identified by its parent and offsets.
    Text { parent: NodeId, start: usize, end: usize },
    /// Removed content starting at a position.
    Removed(Position),
    Marker(String),
}

impl ConsumableItem {
    pub fn from_item(item: &Item) -> Self {
        match item {
            Item::Element(id) => ConsumableItem::Element(*id),
            Item::Text(proxy) => ConsumableItem::Text {
                parent: proxy.parent,
                start: proxy.start_offset,
                end: proxy.start_offset + proxy.len(),
            },
        }
    }
}

/// Consumables of one downcast pass, keyed by item and event type such
/// as `insert` or `attribute:bold`.
#[derive(Debug, Default, Clone)]
pub struct ModelConsumable {
    items: HashMap<(ConsumableItem, String), bool>,
}

impl ModelConsumable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: ConsumableItem, kind: &str) {
        self.items.insert((item, kind.to_string()), true);
    }

    /// `None` when the pair was never added, otherwise whether it is still
    /// available.
    pub fn test(&self, item: &ConsumableItem, kind: &str) -> Option<bool> {
        self.items.get(&(item.clone(), kind.to_string())).copied()
    }

    pub fn consume(&mut self, item: &ConsumableItem, kind: &str) -> bool {
        match self.items.get_mut(&(item.clone(), kind.to_string())) {
            Some(available) if *available => {
                *available = false;
                true
            }
            _ => false,
        }
    }

    /// Makes a consumed pair available again. `None` when it does not exist.
    pub fn revert(&mut self, item: &ConsumableItem, kind: &str) -> Option<bool> {
        let available = self.items.get_mut(&(item.clone(), kind.to_string()))?;
        let reverted = !*available;
        *available = true;
        Some(reverted)
    }

    pub fn unconsumed(&self) -> impl Iterator<Item = &(ConsumableItem, String)> {
        self.items.iter().filter(|(_, available)| **available).map(|(key, _)| key)
    }
}

#[derive(Debug, Default, Clone)]
struct ElementParts {
    name: bool,
    attributes: BTreeMap<String, bool>,
    classes: BTreeMap<String, bool>,
    styles: BTreeMap<String, bool>,
}

impl ElementParts {
    fn is_consumed(&self) -> bool {
        !self.name
            && self.attributes.values().all(|v| !v)
            && self.classes.values().all(|v| !v)
            && self.styles.values().all(|v| !v)
    }
}

/// Consumables of one upcast pass: the name, attributes, classes and
/// styles of every view element, and every text node.
#[derive(Debug, Default, Clone)]
pub struct ViewConsumable {
    elements: HashMap<ViewNodeId, ElementParts>,
    texts: HashMap<ViewNodeId, bool>,
}

impl ViewConsumable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumable holding a node and all of its descendants.
    pub fn create_from(tree: &ViewTree, id: ViewNodeId) -> Self {
        let mut consumable = Self::new();
        consumable.add_subtree(tree, id);
        consumable
    }

    pub fn add_subtree(&mut self, tree: &ViewTree, id: ViewNodeId) {
        self.add_node(tree, id);
        for child in tree.children(id).to_vec() {
            self.add_subtree(tree, child);
        }
    }

    pub fn add_node(&mut self, tree: &ViewTree, id: ViewNodeId) {
        match tree.get(id) {
            Some(ViewNode::Text(_)) => {
                self.texts.insert(id, true);
            }
            Some(ViewNode::Element(element)) => {
                let parts = ElementParts {
                    name: true,
                    attributes: element.attributes().keys().map(|k| (k.clone(), true)).collect(),
                    classes: element.classes().iter().map(|c| (c.clone(), true)).collect(),
                    styles: element.styles().keys().map(|k| (k.clone(), true)).collect(),
                };
                self.elements.insert(id, parts);
            }
            None => {}
        }
    }

    /// `None` when a requested part does not exist, `Some(false)` when one
    /// was already consumed.
    pub fn test(&self, id: ViewNodeId, parts: &MatchResult) -> Option<bool> {
        if let Some(available) = self.texts.get(&id) {
            return Some(*available);
        }
        let element = self.elements.get(&id)?;
        let mut requested: Vec<Option<bool>> = Vec::new();
        if parts.name {
            requested.push(Some(element.name));
        }
        requested.extend(parts.attributes.iter().map(|k| element.attributes.get(k).copied()));
        requested.extend(parts.classes.iter().map(|k| element.classes.get(k).copied()));
        requested.extend(parts.styles.iter().map(|k| element.styles.get(k).copied()));
        if requested.iter().any(Option::is_none) {
            return None;
        }
        Some(requested.into_iter().all(|v| v == Some(true)))
    }

    pub fn consume(&mut self, id: ViewNodeId, parts: &MatchResult) -> bool {
        if self.test(id, parts) != Some(true) {
            return false;
        }
        self.set(id, parts, false);
        true
    }

    pub fn revert(&mut self, id: ViewNodeId, parts: &MatchResult) {
        self.set(id, parts, true);
    }

    pub fn consume_name(&mut self, id: ViewNodeId) -> bool {
        self.consume(id, &name_only())
    }

    pub fn test_name(&self, id: ViewNodeId) -> Option<bool> {
        self.test(id, &name_only())
    }

    /// Whether nothing of the node is left to convert.
    pub fn is_consumed(&self, id: ViewNodeId) -> bool {
        if let Some(available) = self.texts.get(&id) {
            return !available;
        }
        self.elements.get(&id).map(ElementParts::is_consumed).unwrap_or(true)
    }

    fn set(&mut self, id: ViewNodeId, parts: &MatchResult, value: bool) {
        if let Some(available) = self.texts.get_mut(&id) {
            *available = value;
            return;
        }
        let Some(element) = self.elements.get_mut(&id) else {
            return;
        };
        if parts.name {
            element.name = value;
        }
        for key in &parts.attributes {
            element.attributes.insert(key.clone(), value);
        }
        for key in &parts.classes {
            element.classes.insert(key.clone(), value);
        }
        for key in &parts.styles {
            element.styles.insert(key.clone(), value);
        }
    }
}

fn name_only() -> MatchResult {
    MatchResult {
        name: true,
        ..MatchResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_view::ElementKind;

    #[test]
    fn test_model_consumable_lifecycle() {
        let mut consumable = ModelConsumable::new();
        let item = ConsumableItem::Marker("comment:1".into());
        assert_eq!(consumable.test(&item, "addMarker:comment:1"), None);

        consumable.add(item.clone(), "addMarker:comment:1");
        assert_eq!(consumable.test(&item, "addMarker:comment:1"), Some(true));
        assert!(consumable.consume(&item, "addMarker:comment:1"));
        assert!(!consumable.consume(&item, "addMarker:comment:1"));
        assert_eq!(consumable.revert(&item, "addMarker:comment:1"), Some(true));
        assert_eq!(consumable.unconsumed().count(), 1);
    }

    #[test]
    fn test_view_consumable_parts() {
        let mut tree = ViewTree::new();
        let section = tree.create_element("section", ElementKind::Container);
        tree.set_attribute(section, "class", "simple-box secret").unwrap();
        let mut consumable = ViewConsumable::create_from(&tree, section);

        let box_match = MatchResult {
            name: true,
            classes: vec!["simple-box".into()],
            ..MatchResult::default()
        };
        assert!(consumable.consume(section, &box_match));
        assert_eq!(consumable.test(section, &box_match), Some(false));
        assert!(!consumable.is_consumed(section));

        let secret = MatchResult {
            classes: vec!["secret".into()],
            ..MatchResult::default()
        };
        let missing = MatchResult {
            attributes: vec!["data-id".into()],
            ..MatchResult::default()
        };
        assert_eq!(consumable.test(section, &missing), None);
        assert!(consumable.consume(section, &secret));
        assert!(consumable.is_consumed(section));
    }
}
