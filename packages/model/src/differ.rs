//! # Differ
//!
//! Collects what changed in the document since the last flush so the view
//! can be patched instead of rebuilt.
//!
//! Before an operation touches an element's children for the first time
//! the differ snapshots those children. When changes are requested, each
//! snapshot is compared against the element's current children and turned
//! into insert, remove and attribute entries. Content inserted and removed
//! again within one flush therefore produces nothing.
//!
//! Entries use positions in the current tree. Within one parent they are
//! ordered by offset with removals before insertions at the same offset,
//! so a consumer walking them in order can patch a view that still
//! reflects the old state.

use crate::node::{Attributes, TEXT_NAME};
use crate::operation::{Operation, OperationKind};
use crate::position::Position;
use crate::range::Range;
use crate::tree::{NodeId, NodeKind, Tree, GRAVEYARD};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiffItem {
    #[serde(rename_all = "camelCase")]
    Insert {
        name: String,
        position: Position,
        length: usize,
        attributes: Attributes,
    },
    #[serde(rename_all = "camelCase")]
    Remove {
        name: String,
        position: Position,
        length: usize,
    },
    #[serde(rename_all = "camelCase")]
    Attribute {
        range: Range,
        attribute_key: String,
        attribute_old_value: Option<Value>,
        attribute_new_value: Option<Value>,
    },
    /// An element that must be converted again from scratch. Produced by
    /// conversion when it folds a remove/insert pair of one element.
    #[serde(rename_all = "camelCase")]
    Reinsert { name: String, position: Position },
}

impl DiffItem {
    pub fn position(&self) -> &Position {
        match self {
            DiffItem::Insert { position, .. } | DiffItem::Remove { position, .. } | DiffItem::Reinsert { position, .. } => {
                position
            }
            DiffItem::Attribute { range, .. } => &range.start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerData {
    pub range: Option<Range>,
    pub affects_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerChange {
    pub name: String,
    pub old: MarkerData,
    pub new: MarkerData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RootState {
    Attached,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootChange {
    pub name: String,
    pub state: Option<RootState>,
    /// Attribute key to `(old, new)`.
    pub attributes: BTreeMap<String, (Option<Value>, Option<Value>)>,
}

/// Everything that changed between two flushes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    pub items: Vec<DiffItem>,
    pub markers: Vec<MarkerChange>,
    pub roots: Vec<RootChange>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.markers.is_empty() && self.roots.is_empty()
    }

    pub fn markers_to_remove(&self) -> impl Iterator<Item = (&str, &Range)> {
        self.markers
            .iter()
            .filter_map(|change| change.old.range.as_ref().map(|range| (change.name.as_str(), range)))
    }

    pub fn markers_to_add(&self) -> impl Iterator<Item = (&str, &Range)> {
        self.markers
            .iter()
            .filter_map(|change| change.new.range.as_ref().map(|range| (change.name.as_str(), range)))
    }

    /// Whether any change touches data, as opposed to only UI markers.
    pub fn has_data_changes(&self) -> bool {
        !self.items.is_empty()
            || self.roots.iter().any(|r| r.state.is_some() || !r.attributes.is_empty())
            || self.markers.iter().any(|m| m.old.affects_data || m.new.affects_data)
    }
}

/// One offset of an element's content as seen by the differ.
#[derive(Debug, Clone)]
enum Unit {
    Element {
        id: NodeId,
        name: String,
        attributes: Attributes,
    },
    Char {
        ch: char,
        attributes: Arc<Attributes>,
    },
}

impl Unit {
    fn attributes(&self) -> &Attributes {
        match self {
            Unit::Element { attributes, .. } => attributes,
            Unit::Char { attributes, .. } => attributes,
        }
    }

    fn name(&self) -> &str {
        match self {
            Unit::Element { name, .. } => name,
            Unit::Char { .. } => TEXT_NAME,
        }
    }

    fn same_key(&self, other: &Unit, refreshed: &HashSet<NodeId>) -> bool {
        match (self, other) {
            (Unit::Element { id: a, name: na, .. }, Unit::Element { id: b, name: nb, .. }) => {
                a == b && na == nb && !refreshed.contains(a)
            }
            (Unit::Char { ch: a, .. }, Unit::Char { ch: b, .. }) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Equal,
    Attribute(Unit, Unit),
    Delete(Unit),
    Insert(Unit),
}

#[derive(Debug, Default)]
pub struct Differ {
    snapshots: HashMap<NodeId, Vec<Unit>>,
    markers: BTreeMap<String, MarkerChange>,
    roots: BTreeMap<String, RootChange>,
    refreshed: HashSet<NodeId>,
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.markers.is_empty() && self.roots.is_empty()
    }

    /// Records the state an operation is about to change. Call before the
    /// operation executes.
    pub fn buffer_operation(&mut self, operation: &Operation, tree: &Tree) {
        match &operation.kind {
            OperationKind::Insert { position, .. } => self.snapshot_at(tree, position),
            OperationKind::Move {
                source_position,
                target_position,
                ..
            } => {
                self.snapshot_at(tree, source_position);
                self.snapshot_at(tree, target_position);
            }
            OperationKind::Attribute { range, .. } => self.snapshot_at(tree, &range.start),
            OperationKind::Rename { position, .. } => self.snapshot_at(tree, position),
            OperationKind::Root { root_name, is_add, .. } => self.buffer_root_state(root_name, *is_add),
            OperationKind::RootAttribute {
                root,
                key,
                old_value,
                new_value,
            } => self.buffer_root_attribute(root, key, old_value.clone(), new_value.clone()),
            OperationKind::Marker { .. } | OperationKind::NoOp => {}
        }
    }

    /// Records a marker change, folding it into an earlier one for the same
    /// marker. A change that ends where it started is dropped.
    pub fn buffer_marker_change(&mut self, name: &str, old: MarkerData, new: MarkerData) {
        let entry = self.markers.entry(name.to_string()).or_insert_with(|| MarkerChange {
            name: name.to_string(),
            old,
            new: new.clone(),
        });
        entry.new = new;
        if entry.old == entry.new {
            self.markers.remove(name);
        }
    }

    fn buffer_root_state(&mut self, name: &str, is_add: bool) {
        let change = self.root_change(name);
        change.state = match (&change.state, is_add) {
            (Some(RootState::Detached), true) | (Some(RootState::Attached), false) => None,
            (_, true) => Some(RootState::Attached),
            (_, false) => Some(RootState::Detached),
        };
        self.prune_root(name);
    }

    fn buffer_root_attribute(&mut self, name: &str, key: &str, old: Option<Value>, new: Option<Value>) {
        let change = self.root_change(name);
        let entry = change.attributes.entry(key.to_string()).or_insert((old, None));
        entry.1 = new;
        if entry.0 == entry.1 {
            change.attributes.remove(key);
        }
        self.prune_root(name);
    }

    fn root_change(&mut self, name: &str) -> &mut RootChange {
        self.roots.entry(name.to_string()).or_insert_with(|| RootChange {
            name: name.to_string(),
            state: None,
            attributes: BTreeMap::new(),
        })
    }

    fn prune_root(&mut self, name: &str) {
        if let Some(change) = self.roots.get(name) {
            if change.state.is_none() && change.attributes.is_empty() {
                self.roots.remove(name);
            }
        }
    }

    /// Forces an element to be reported as removed and inserted again.
    pub fn refresh_item(&mut self, tree: &Tree, id: NodeId) {
        if let Some(parent) = tree.parent(id) {
            self.snapshot(tree, parent);
            self.refreshed.insert(id);
        }
    }

    fn snapshot_at(&mut self, tree: &Tree, position: &Position) {
        if position.root == GRAVEYARD {
            return;
        }
        if let Some(parent) = tree.node_at_path(&position.root, position.parent_path()) {
            self.snapshot(tree, parent);
        }
    }

    fn snapshot(&mut self, tree: &Tree, parent: NodeId) {
        if !self.snapshots.contains_key(&parent) {
            let units = units_of(tree, parent);
            self.snapshots.insert(parent, units);
        }
    }

    /// Changes since the last reset, sorted by root and parent path.
    pub fn get_changes(&self, tree: &Tree) -> Changes {
        let mut per_parent: Vec<(String, Vec<usize>, Vec<DiffItem>)> = Vec::new();
        let mut inserted: HashSet<NodeId> = HashSet::new();

        for (&parent, old) in &self.snapshots {
            let Some(root) = tree.root_name_of(parent) else {
                continue;
            };
            if root == GRAVEYARD {
                continue;
            }
            let root = root.to_string();
            let new = units_of(tree, parent);
            let steps = diff_units(old, &new, &self.refreshed);
            for step in &steps {
                if let Step::Insert(Unit::Element { id, .. }) = step {
                    inserted.insert(*id);
                }
            }
            let items = items_from_steps(tree, parent, steps);
            if !items.is_empty() {
                per_parent.push((root, tree.path_of(parent), items));
            }
        }

        per_parent.retain(|(root, path, _)| {
            let Some(parent) = tree.node_at_path(root, path) else {
                return false;
            };
            !inserted.contains(&parent) && !tree.ancestors(parent).iter().any(|a| inserted.contains(a))
        });
        per_parent.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        Changes {
            items: per_parent.into_iter().flat_map(|(_, _, items)| items).collect(),
            markers: self.markers.values().cloned().collect(),
            roots: self.roots.values().cloned().collect(),
        }
    }

    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.markers.clear();
        self.roots.clear();
        self.refreshed.clear();
    }

    /// Returns the pending changes and starts over.
    pub fn flush(&mut self, tree: &Tree) -> Changes {
        let changes = self.get_changes(tree);
        self.reset();
        debug!(
            items = changes.items.len(),
            markers = changes.markers.len(),
            roots = changes.roots.len(),
            "Flushed differ"
        );
        changes
    }
}

fn units_of(tree: &Tree, parent: NodeId) -> Vec<Unit> {
    let mut units = Vec::new();
    for &child in tree.children(parent) {
        match tree.get(child) {
            Some(NodeKind::Element(element)) => units.push(Unit::Element {
                id: child,
                name: element.name.clone(),
                attributes: element.attributes.clone(),
            }),
            Some(NodeKind::Text(text)) => {
                let attributes = Arc::new(text.attributes.clone());
                units.extend(text.data.chars().map(|ch| Unit::Char {
                    ch,
                    attributes: attributes.clone(),
                }));
            }
            None => {}
        }
    }
    units
}

/// Aligns two unit lists. Exact matches weigh more than key-only matches,
/// so an unchanged unit is never reported as an attribute change.
fn diff_units(old: &[Unit], new: &[Unit], refreshed: &HashSet<NodeId>) -> Vec<Step> {
    let exact = |a: &Unit, b: &Unit| a.same_key(b, refreshed) && a.attributes() == b.attributes();

    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && exact(&old[prefix], &new[prefix]) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && exact(&old[old.len() - 1 - suffix], &new[new.len() - 1 - suffix])
    {
        suffix += 1;
    }

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    let (n, m) = (old_mid.len(), new_mid.len());

    let weight = |a: &Unit, b: &Unit| -> Option<u32> {
        if !a.same_key(b, refreshed) {
            None
        } else if a.attributes() == b.attributes() {
            Some(2)
        } else {
            Some(1)
        }
    };

    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            let mut best = table[i + 1][j].max(table[i][j + 1]);
            if let Some(w) = weight(&old_mid[i], &new_mid[j]) {
                best = best.max(table[i + 1][j + 1] + w);
            }
            table[i][j] = best;
        }
    }

    let mut steps = vec![Step::Equal; prefix];
    let (mut i, mut j) = (0, 0);
    let mut gap_deletes = Vec::new();
    let mut gap_inserts = Vec::new();
    while i < n || j < m {
        let matched = if i < n && j < m {
            weight(&old_mid[i], &new_mid[j]).filter(|w| table[i][j] == table[i + 1][j + 1] + w)
        } else {
            None
        };
        if let Some(w) = matched {
            steps.append(&mut gap_deletes);
            steps.append(&mut gap_inserts);
            steps.push(if w == 2 {
                Step::Equal
            } else {
                Step::Attribute(old_mid[i].clone(), new_mid[j].clone())
            });
            i += 1;
            j += 1;
        } else if i < n && (j >= m || table[i][j] == table[i + 1][j]) {
            gap_deletes.push(Step::Delete(old_mid[i].clone()));
            i += 1;
        } else {
            gap_inserts.push(Step::Insert(new_mid[j].clone()));
            j += 1;
        }
    }
    steps.append(&mut gap_deletes);
    steps.append(&mut gap_inserts);
    steps.extend(std::iter::repeat(Step::Equal).take(suffix));
    steps
}

fn items_from_steps(tree: &Tree, parent: NodeId, steps: Vec<Step>) -> Vec<DiffItem> {
    let mut items: Vec<DiffItem> = Vec::new();
    let mut offset = 0;
    let Ok(base) = tree.position_in(parent, 0) else {
        return items;
    };

    for step in steps {
        match step {
            Step::Equal => offset += 1,
            Step::Delete(unit) => {
                let name = unit.name().to_string();
                if let Some(DiffItem::Remove {
                    name: last_name,
                    position,
                    length,
                }) = items.last_mut()
                {
                    if name == TEXT_NAME && *last_name == TEXT_NAME && position.offset() == offset {
                        *length += 1;
                        continue;
                    }
                }
                items.push(DiffItem::Remove {
                    name,
                    position: base.with_offset(offset),
                    length: 1,
                });
            }
            Step::Insert(unit) => {
                let name = unit.name().to_string();
                if let Some(DiffItem::Insert {
                    name: last_name,
                    position,
                    length,
                    attributes,
                }) = items.last_mut()
                {
                    if name == TEXT_NAME
                        && *last_name == TEXT_NAME
                        && position.offset() + *length == offset
                        && attributes == unit.attributes()
                    {
                        *length += 1;
                        offset += 1;
                        continue;
                    }
                }
                items.push(DiffItem::Insert {
                    name,
                    position: base.with_offset(offset),
                    length: 1,
                    attributes: unit.attributes().clone(),
                });
                offset += 1;
            }
            Step::Attribute(old, new) => {
                let is_text = matches!(new, Unit::Char { .. });
                let keys: Vec<&String> = old
                    .attributes()
                    .keys()
                    .chain(new.attributes().keys().filter(|k| !old.attributes().contains_key(*k)))
                    .collect();
                for key in keys {
                    let old_value = old.attributes().get(key).cloned();
                    let new_value = new.attributes().get(key).cloned();
                    if old_value == new_value {
                        continue;
                    }
                    if is_text && extend_attribute_run(&mut items, key, &old_value, &new_value, offset) {
                        continue;
                    }
                    items.push(DiffItem::Attribute {
                        range: Range::new(base.with_offset(offset), base.with_offset(offset + 1)),
                        attribute_key: key.clone(),
                        attribute_old_value: old_value,
                        attribute_new_value: new_value,
                    });
                }
                offset += 1;
            }
        }
    }
    items
}

/// Grows a text attribute entry ending at `offset` instead of adding a new
/// one. Only the entries of the previous character are considered.
fn extend_attribute_run(
    items: &mut [DiffItem],
    key: &str,
    old_value: &Option<Value>,
    new_value: &Option<Value>,
    offset: usize,
) -> bool {
    for item in items.iter_mut().rev() {
        let DiffItem::Attribute {
            range,
            attribute_key,
            attribute_old_value,
            attribute_new_value,
        } = item
        else {
            return false;
        };
        if range.end.offset() != offset {
            return false;
        }
        if attribute_key == key && attribute_old_value == old_value && attribute_new_value == new_value {
            range.end = range.end.with_offset(offset + 1);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::MarkerCollection;
    use crate::node::Node;
    use serde_json::json;

    struct Fixture {
        tree: Tree,
        markers: MarkerCollection,
        differ: Differ,
        version: u64,
    }

    impl Fixture {
        fn new(content: Vec<Node>) -> Self {
            let mut tree = Tree::new();
            let root = tree.add_root("main", "$root");
            tree.add_root(GRAVEYARD, "$root");
            tree.insert_nodes(root, 0, &content).unwrap();
            Self {
                tree,
                markers: MarkerCollection::new(),
                differ: Differ::new(),
                version: 0,
            }
        }

        fn apply(&mut self, kind: OperationKind) {
            let op = Operation::new(kind, Some(self.version));
            op.validate(&self.tree).unwrap();
            self.differ.buffer_operation(&op, &self.tree);
            op.execute(&mut self.tree, &mut self.markers).unwrap();
            self.version += 1;
        }
    }

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    fn paragraph(text: &str) -> Node {
        Node::element("paragraph").with_child(Node::text(text))
    }

    #[test]
    fn test_text_insert_is_grouped() {
        let mut f = Fixture::new(vec![paragraph("foo")]);
        f.apply(OperationKind::Insert {
            position: pos(&[0, 1]),
            nodes: vec![Node::text("xyz")],
            should_receive_attributes: false,
        });

        let changes = f.differ.get_changes(&f.tree);
        assert_eq!(
            changes.items,
            vec![DiffItem::Insert {
                name: "$text".into(),
                position: pos(&[0, 1]),
                length: 3,
                attributes: Attributes::new(),
            }]
        );
    }

    #[test]
    fn test_insert_then_remove_cancels() {
        let mut f = Fixture::new(vec![paragraph("foo")]);
        f.apply(OperationKind::Insert {
            position: pos(&[1]),
            nodes: vec![paragraph("bar")],
            should_receive_attributes: false,
        });
        f.apply(OperationKind::Move {
            source_position: pos(&[1]),
            how_many: 1,
            target_position: Position::at(GRAVEYARD, 0),
        });
        assert!(f.differ.get_changes(&f.tree).items.is_empty());
    }

    #[test]
    fn test_changes_inside_inserted_element_are_hidden() {
        let mut f = Fixture::new(vec![paragraph("foo")]);
        f.apply(OperationKind::Insert {
            position: pos(&[1]),
            nodes: vec![paragraph("bar")],
            should_receive_attributes: false,
        });
        f.apply(OperationKind::Insert {
            position: pos(&[1, 3]),
            nodes: vec![Node::text("!")],
            should_receive_attributes: false,
        });

        let changes = f.differ.get_changes(&f.tree);
        assert_eq!(changes.items.len(), 1);
        assert!(matches!(&changes.items[0], DiffItem::Insert { name, .. } if name == "paragraph"));
    }

    #[test]
    fn test_remove_before_insert() {
        let mut f = Fixture::new(vec![paragraph("abc")]);
        f.apply(OperationKind::Move {
            source_position: pos(&[0, 1]),
            how_many: 1,
            target_position: Position::at(GRAVEYARD, 0),
        });
        f.apply(OperationKind::Insert {
            position: pos(&[0, 1]),
            nodes: vec![Node::text("X")],
            should_receive_attributes: false,
        });

        let changes = f.differ.get_changes(&f.tree);
        assert_eq!(
            changes.items,
            vec![
                DiffItem::Remove {
                    name: "$text".into(),
                    position: pos(&[0, 1]),
                    length: 1,
                },
                DiffItem::Insert {
                    name: "$text".into(),
                    position: pos(&[0, 1]),
                    length: 1,
                    attributes: Attributes::new(),
                },
            ]
        );
    }

    #[test]
    fn test_attribute_runs_merge_for_text() {
        let mut f = Fixture::new(vec![paragraph("abcd")]);
        f.apply(OperationKind::Attribute {
            range: Range::new(pos(&[0, 1]), pos(&[0, 3])),
            key: "bold".into(),
            old_value: None,
            new_value: Some(json!(true)),
        });

        let changes = f.differ.get_changes(&f.tree);
        assert_eq!(
            changes.items,
            vec![DiffItem::Attribute {
                range: Range::new(pos(&[0, 1]), pos(&[0, 3])),
                attribute_key: "bold".into(),
                attribute_old_value: None,
                attribute_new_value: Some(json!(true)),
            }]
        );
    }

    #[test]
    fn test_rename_is_remove_and_insert() {
        let mut f = Fixture::new(vec![paragraph("abc")]);
        f.apply(OperationKind::Rename {
            position: pos(&[0]),
            old_name: "paragraph".into(),
            new_name: "heading1".into(),
        });

        let changes = f.differ.get_changes(&f.tree);
        assert_eq!(changes.items.len(), 2);
        assert!(matches!(&changes.items[0], DiffItem::Remove { name, .. } if name == "paragraph"));
        assert!(matches!(&changes.items[1], DiffItem::Insert { name, .. } if name == "heading1"));
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut f = Fixture::new(vec![paragraph("abc")]);
        f.apply(OperationKind::Insert {
            position: pos(&[0, 0]),
            nodes: vec![Node::text("x")],
            should_receive_attributes: false,
        });
        assert!(!f.differ.flush(&f.tree).is_empty());
        assert!(f.differ.flush(&f.tree).is_empty());
        assert!(f.differ.flush(&f.tree).is_empty());
    }

    #[test]
    fn test_marker_changes_coalesce() {
        let mut differ = Differ::new();
        let range = Range::new(pos(&[0, 0]), pos(&[0, 1]));
        let none = MarkerData {
            range: None,
            affects_data: false,
        };
        let some = MarkerData {
            range: Some(range),
            affects_data: false,
        };
        differ.buffer_marker_change("search", none.clone(), some.clone());
        assert_eq!(differ.markers.len(), 1);
        differ.buffer_marker_change("search", some, none);
        assert!(differ.is_empty());
    }

    #[test]
    fn test_refresh_item() {
        let f = Fixture::new(vec![paragraph("abc")]);
        let mut differ = Differ::new();
        let root = f.tree.root("main").unwrap();
        let paragraph = f.tree.children(root)[0];
        differ.refresh_item(&f.tree, paragraph);

        let changes = differ.get_changes(&f.tree);
        assert_eq!(changes.items.len(), 2);
        assert!(matches!(&changes.items[0], DiffItem::Remove { .. }));
        assert!(matches!(&changes.items[1], DiffItem::Insert { .. }));
    }
}
