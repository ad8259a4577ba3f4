//! # Document
//!
//! Owns the model tree and everything that must stay consistent with it:
//! version counter, selection, markers, history and differ.
//!
//! ## Applying an operation
//!
//! ```text
//! version check → validate → differ snapshot → execute
//!       → version + 1 → markers/selection follow → history → listeners
//! ```
//!
//! A failed version check or validation leaves the document untouched.
//! There is no rollback across operations: a batch whose k-th operation
//! fails keeps the first k-1 applied.

use crate::differ::{Changes, Differ, MarkerData};
use crate::error::{ModelError, ModelResult};
use crate::history::History;
use crate::markers::MarkerCollection;
use crate::node::Node;
use crate::operation::{Operation, OperationKind};
use crate::position::Position;
use crate::range::Range;
use crate::selection::Selection;
use crate::transform::transform_sets;
use crate::tree::{NodeId, Tree, GRAVEYARD};
use folio_common::{Emitter, ListenerId, Priority};
use tracing::debug;

/// Element name used for roots created without an explicit one.
pub const DEFAULT_ROOT_ELEMENT: &str = "$root";

#[derive(Debug)]
pub struct Document {
    tree: Tree,
    version: u64,
    selection: Selection,
    markers: MarkerCollection,
    history: History,
    differ: Differ,
    events: Emitter<Operation>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.add_root(GRAVEYARD, DEFAULT_ROOT_ELEMENT);
        Self {
            tree,
            version: 0,
            selection: Selection::new(),
            markers: MarkerCollection::new(),
            history: History::new(),
            differ: Differ::new(),
            events: Emitter::new(),
        }
    }

    /// Creates a root outside of the operation flow, for initial setup.
    pub fn create_root(&mut self, element_name: &str, root_name: &str) -> ModelResult<NodeId> {
        if self.tree.root(root_name).is_some() {
            return Err(ModelError::RootAttached(root_name.to_string()));
        }
        let id = self.tree.add_root(root_name, element_name);
        if self.selection.ranges().is_empty() {
            self.selection
                .set_to(vec![Range::collapsed(Position::at(root_name, 0))], false);
        }
        debug!(root = root_name, element = element_name, "Created root");
        Ok(id)
    }

    pub fn get_root(&self, name: &str) -> Option<NodeId> {
        self.tree.root_entry(name).filter(|entry| entry.attached).map(|entry| entry.id)
    }

    /// Attached content roots, excluding the graveyard.
    pub fn root_names(&self) -> Vec<String> {
        self.tree.root_names()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn markers(&self) -> &MarkerCollection {
        &self.markers
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn differ(&self) -> &Differ {
        &self.differ
    }

    /// Owned copy of a root's content.
    pub fn root_content(&self, root: &str) -> Vec<Node> {
        self.tree.root_content(root)
    }

    /// Registers a listener called after every applied operation.
    pub fn on_change(&mut self, priority: Priority, listener: impl FnMut(&Operation) + Send + 'static) -> ListenerId {
        self.events.on(priority, listener)
    }

    pub fn off_change(&mut self, id: ListenerId) {
        self.events.off(id);
    }

    pub fn apply_operation(&mut self, operation: &Operation) -> ModelResult<()> {
        if operation.base_version != Some(self.version) {
            return Err(ModelError::WrongVersion {
                expected: self.version,
                actual: operation.base_version,
            });
        }
        operation.validate(&self.tree)?;

        self.differ.buffer_operation(operation, &self.tree);
        if let OperationKind::Marker {
            name,
            new_range,
            affects_data,
            ..
        } = &operation.kind
        {
            let old = self.marker_data(name);
            self.differ.buffer_marker_change(
                name,
                old,
                MarkerData {
                    range: new_range.clone(),
                    affects_data: *affects_data,
                },
            );
        }

        operation.execute(&mut self.tree, &mut self.markers)?;
        self.version += 1;

        if !matches!(operation.kind, OperationKind::Marker { .. }) {
            self.update_markers(operation);
        }
        self.selection.apply_operation(operation);
        self.selection.refresh_attributes(&self.tree);
        self.history.add_operation(operation.clone());
        self.events.fire(operation);

        debug!(
            operation = operation.class_name(),
            kind = operation.type_name(),
            version = self.version,
            "Applied operation"
        );
        Ok(())
    }

    fn marker_data(&self, name: &str) -> MarkerData {
        match self.markers.get(name) {
            Some(marker) => MarkerData {
                range: Some(marker.range.clone()),
                affects_data: marker.affects_data,
            },
            None => MarkerData {
                range: None,
                affects_data: false,
            },
        }
    }

    fn update_markers(&mut self, operation: &Operation) {
        let updates: Vec<(String, Range, Range, bool)> = self
            .markers
            .iter()
            .filter_map(|marker| {
                let range = marker.range.get_transformed_by_operation_joined(operation);
                (range != marker.range).then(|| (marker.name.clone(), marker.range.clone(), range, marker.affects_data))
            })
            .collect();

        for (name, old, new, affects_data) in updates {
            self.differ.buffer_marker_change(
                &name,
                MarkerData {
                    range: Some(old),
                    affects_data,
                },
                MarkerData {
                    range: Some(new.clone()),
                    affects_data,
                },
            );
            self.markers.update_range(&name, new);
        }
    }

    /// Rebases operations created against an older version onto the
    /// current one. Operations already in history win position ties.
    ///
    /// The returned operations carry consecutive base versions starting at
    /// the current version. Operations created against the current version
    /// are returned unchanged.
    pub fn rebase_operations(&self, operations: &[Operation]) -> Vec<Operation> {
        let Some(base) = operations.iter().find_map(|op| op.base_version) else {
            return operations.to_vec();
        };
        if base >= self.version {
            return operations.to_vec();
        }

        debug!(
            count = operations.len(),
            from = base,
            to = self.version,
            "Rebasing operations"
        );
        self.rebase_operations_over(operations, self.history.operations_since(base))
    }

    /// Rebases operations over an explicit list of applied operations
    /// instead of the raw history. `applied` must take the document from the
    /// base version of `operations` to the current version, as far as the
    /// positions of `operations` are concerned.
    pub fn rebase_operations_over(&self, operations: &[Operation], applied: &[Operation]) -> Vec<Operation> {
        let (rebased, _) = transform_sets(operations, applied, false);
        rebased
            .into_iter()
            .enumerate()
            .map(|(i, op)| op.with_base_version(Some(self.version + i as u64)))
            .collect()
    }

    /// Replaces the selection ranges.
    pub fn set_selection(&mut self, ranges: Vec<Range>, backward: bool) -> ModelResult<()> {
        for range in &ranges {
            self.tree.resolve_parent(&range.start)?;
            self.tree.resolve_parent(&range.end)?;
        }
        self.selection.set_to(ranges, backward);
        self.selection.refresh_attributes(&self.tree);
        Ok(())
    }

    pub fn set_selection_attribute(&mut self, key: &str, value: serde_json::Value) {
        self.selection.set_attribute(key, value);
    }

    pub fn remove_selection_attribute(&mut self, key: &str) {
        self.selection.remove_attribute(key);
    }

    /// Forces an element to be converted again on the next flush.
    pub fn refresh_item(&mut self, id: NodeId) {
        self.differ.refresh_item(&self.tree, id);
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.differ.is_empty()
    }

    /// Pending changes since the last flush. Flushing again without new
    /// operations returns nothing.
    pub fn flush_changes(&mut self) -> Changes {
        self.differ.flush(&self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::DiffItem;
    use std::sync::{Arc, Mutex};

    fn document() -> Document {
        let mut doc = Document::new();
        doc.create_root("$root", "main").unwrap();
        doc
    }

    fn insert_text(path: &[usize], text: &str, version: u64) -> Operation {
        Operation::new(
            OperationKind::Insert {
                position: Position::new("main", path.to_vec()),
                nodes: vec![Node::text(text)],
                should_receive_attributes: false,
            },
            Some(version),
        )
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut doc = document();
        doc.apply_operation(&insert_text(&[0], "a", 0)).unwrap();
        let before = doc.root_content("main");

        let result = doc.apply_operation(&insert_text(&[0], "b", 0));
        assert_eq!(
            result,
            Err(ModelError::WrongVersion {
                expected: 1,
                actual: Some(0)
            })
        );
        assert_eq!(doc.root_content("main"), before);
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_listeners_and_history() {
        let mut doc = document();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        doc.on_change(Priority::NORMAL, move |op| log.lock().unwrap().push(op.base_version));

        doc.apply_operation(&insert_text(&[0], "a", 0)).unwrap();
        doc.apply_operation(&insert_text(&[1], "b", 1)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(1)]);
        assert_eq!(doc.history().len(), 2);
    }

    #[test]
    fn test_markers_follow_content() {
        let mut doc = document();
        doc.apply_operation(&insert_text(&[0], "abcd", 0)).unwrap();
        doc.apply_operation(&Operation::new(
            OperationKind::Marker {
                name: "search:1".into(),
                old_range: None,
                new_range: Some(Range::new(Position::at("main", 1), Position::at("main", 3))),
                affects_data: false,
            },
            Some(1),
        ))
        .unwrap();
        doc.flush_changes();

        doc.apply_operation(&insert_text(&[0], "xx", 2)).unwrap();
        let marker = doc.markers().get("search:1").unwrap();
        assert_eq!(marker.range, Range::new(Position::at("main", 3), Position::at("main", 5)));

        let changes = doc.flush_changes();
        assert_eq!(changes.markers.len(), 1);
        assert!(matches!(changes.items[0], DiffItem::Insert { .. }));
    }

    #[test]
    fn test_rebase_disjoint_inserts() {
        let mut doc = document();
        doc.apply_operation(&insert_text(&[0], "abc", 0)).unwrap();

        let local = insert_text(&[0], "X", 1);
        let remote = insert_text(&[3], "Y", 1);
        doc.apply_operation(&local).unwrap();

        let rebased = doc.rebase_operations(&[remote]);
        assert_eq!(rebased[0].base_version, Some(2));
        doc.apply_operation(&rebased[0]).unwrap();

        assert_eq!(doc.root_content("main"), vec![Node::text("XabcY")]);
        assert_eq!(doc.version(), 3);
    }

    #[test]
    fn test_create_root_twice_fails() {
        let mut doc = document();
        assert!(doc.create_root("$root", "main").is_err());
        assert_eq!(doc.root_names(), vec!["main".to_string()]);
    }
}
