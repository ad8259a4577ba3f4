//! Document selection: live ranges plus the attributes typed text receives.

use crate::node::Attributes;
use crate::operation::Operation;
use crate::position::Position;
use crate::range::Range;
use crate::tree::{Item, Tree};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    ranges: Vec<Range>,
    backward: bool,
    attributes: Attributes,
    /// Attributes set or removed explicitly. `None` means removed.
    #[serde(skip)]
    overrides: BTreeMap<String, Option<Value>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn first_range(&self) -> Option<&Range> {
        self.ranges.iter().min_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn last_range(&self) -> Option<&Range> {
        self.ranges.iter().max_by(|a, b| {
            a.end
                .partial_cmp(&b.end)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn is_backward(&self) -> bool {
        self.backward && !self.is_collapsed()
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Where the selection starts from the user's point of view.
    pub fn anchor(&self) -> Option<&Position> {
        let range = self.ranges.last()?;
        Some(if self.backward { &range.end } else { &range.start })
    }

    /// Where the selection ends from the user's point of view.
    pub fn focus(&self) -> Option<&Position> {
        let range = self.ranges.last()?;
        Some(if self.backward { &range.start } else { &range.end })
    }

    /// Replaces the ranges. Explicit attribute overrides are dropped, as
    /// they only apply to the caret they were set on.
    pub fn set_to(&mut self, ranges: Vec<Range>, backward: bool) {
        self.ranges = ranges;
        self.backward = backward;
        self.overrides.clear();
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get_attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn set_attribute(&mut self, key: &str, value: Value) {
        self.overrides.insert(key.to_string(), Some(value.clone()));
        self.attributes.insert(key.to_string(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) {
        self.overrides.insert(key.to_string(), None);
        self.attributes.remove(key);
    }

    /// Recomputes the attributes from the content: the text before a caret,
    /// or the first text inside a non-collapsed selection. Explicit
    /// overrides win.
    pub fn refresh_attributes(&mut self, tree: &Tree) {
        let mut attributes = match self.first_range() {
            Some(range) if range.is_collapsed() => tree.attributes_near(&range.start),
            Some(range) => tree
                .items(range, false)
                .ok()
                .and_then(|items| {
                    items.into_iter().find_map(|item| match item {
                        Item::Text(proxy) => Some(proxy.attributes),
                        Item::Element(_) => None,
                    })
                })
                .unwrap_or_default(),
            None => Attributes::new(),
        };
        for (key, value) in &self.overrides {
            match value {
                Some(value) => {
                    attributes.insert(key.clone(), value.clone());
                }
                None => {
                    attributes.remove(key);
                }
            }
        }
        self.attributes = attributes;
    }

    /// Keeps the ranges in place after `operation` was applied.
    pub fn apply_operation(&mut self, operation: &Operation) {
        let mut ranges: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            let transformed = range.get_transformed_by_operation_joined(operation);
            if !ranges.contains(&transformed) {
                ranges.push(transformed);
            }
        }
        self.ranges = ranges;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::MarkerCollection;
    use crate::node::Node;
    use crate::operation::OperationKind;
    use crate::tree::GRAVEYARD;
    use serde_json::json;

    fn tree() -> Tree {
        let mut tree = Tree::new();
        let root = tree.add_root("main", "$root");
        tree.add_root(GRAVEYARD, "$root");
        tree.insert_nodes(
            root,
            0,
            &[Node::element("paragraph")
                .with_child(Node::text("ab"))
                .with_child(Node::text("cd").with_attribute("bold", true))],
        )
        .unwrap();
        tree
    }

    fn caret(offset: usize) -> Vec<Range> {
        vec![Range::collapsed(Position::new("main", vec![0, offset]))]
    }

    #[test]
    fn test_attributes_follow_text_before_caret() {
        let tree = tree();
        let mut selection = Selection::new();
        selection.set_to(caret(3), false);
        selection.refresh_attributes(&tree);
        assert_eq!(selection.get_attribute("bold"), Some(&json!(true)));

        selection.set_to(caret(1), false);
        selection.refresh_attributes(&tree);
        assert!(!selection.has_attribute("bold"));
    }

    #[test]
    fn test_explicit_attributes_win_until_moved() {
        let tree = tree();
        let mut selection = Selection::new();
        selection.set_to(caret(3), false);
        selection.remove_attribute("bold");
        selection.refresh_attributes(&tree);
        assert!(!selection.has_attribute("bold"));

        selection.set_to(caret(4), false);
        selection.refresh_attributes(&tree);
        assert!(selection.has_attribute("bold"));
    }

    #[test]
    fn test_caret_moves_with_insertion() {
        let mut tree = tree();
        let mut selection = Selection::new();
        selection.set_to(caret(2), false);
        let op = Operation::new(
            OperationKind::Insert {
                position: Position::new("main", vec![0, 1]),
                nodes: vec![Node::text("xy")],
                should_receive_attributes: false,
            },
            Some(0),
        );
        op.execute(&mut tree, &mut MarkerCollection::new()).unwrap();
        selection.apply_operation(&op);
        assert_eq!(selection.ranges(), caret(4).as_slice());
    }

    #[test]
    fn test_removed_selection_collapses_at_removal() {
        let mut selection = Selection::new();
        selection.set_to(
            vec![Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![0, 3]))],
            true,
        );
        assert!(selection.is_backward());
        assert_eq!(selection.anchor(), Some(&Position::new("main", vec![0, 3])));

        let op = Operation::new(
            OperationKind::Move {
                source_position: Position::at("main", 0),
                how_many: 1,
                target_position: Position::at(GRAVEYARD, 0),
            },
            Some(0),
        );
        selection.apply_operation(&op);
        assert_eq!(selection.ranges(), &[Range::collapsed(Position::at("main", 0))]);
    }
}
