//! # Writer
//!
//! The only way to change a document. Every method turns its intent into
//! operations, applies them to the document and records them in the batch
//! of the current change block.
//!
//! Higher level edits (split, merge, wrap, unwrap) are composed of insert
//! and move operations, so they invert and transform like any other.
//! Removed content is moved into the graveyard root rather than dropped.

use crate::batch::{Batch, BatchOrigin, BatchType};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, PendingChange};
use crate::node::{normalize_nodes, offset_size_of, Attributes, Node};
use crate::operation::{Operation, OperationKind};
use crate::position::Position;
use crate::range::Range;
use crate::schema::Schema;
use crate::document::Document;
use crate::tree::{Item, NodeId, Tree, GRAVEYARD};
use serde_json::Value;

pub struct Writer<'m> {
    model: &'m mut Model,
}

/// Result of [`Writer::split`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// Position between the two outermost split parts.
    pub position: Position,
    /// Range from the end of the first part to the start of the second.
    pub range: Range,
}

impl<'m> Writer<'m> {
    pub(crate) fn new(model: &'m mut Model) -> Self {
        Self { model }
    }

    pub fn document(&self) -> &Document {
        &self.model.document
    }

    pub fn tree(&self) -> &Tree {
        self.model.document.tree()
    }

    pub fn schema(&self) -> &Schema {
        &self.model.schema
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.model.current_batch.as_ref()
    }

    /// Runs a nested block in the current batch.
    pub fn change<R>(&mut self, callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> ModelResult<R> {
        callback(self)
    }

    /// Queues a block to run in its own batch once the outermost block ends.
    pub fn enqueue_change(
        &mut self,
        batch_type: BatchType,
        callback: impl FnOnce(&mut Writer<'_>) -> ModelResult<()> + Send + 'static,
    ) {
        self.model.pending.push_back(PendingChange {
            batch_type,
            origin: BatchOrigin::Local,
            callback: Box::new(callback),
        });
    }

    /// Applies an operation and adds it to the current batch.
    pub fn apply_operation(&mut self, operation: Operation) -> ModelResult<()> {
        self.model.document.apply_operation(&operation)?;
        if let Some(batch) = self.model.current_batch.as_mut() {
            batch.add_operation(operation);
        }
        Ok(())
    }

    fn apply(&mut self, kind: OperationKind) -> ModelResult<()> {
        let operation = Operation::new(kind, Some(self.model.document.version()));
        self.apply_operation(operation)
    }

    // ---- insertion -------------------------------------------------------

    /// Inserts nodes and returns the range they occupy.
    pub fn insert(&mut self, nodes: Vec<Node>, position: &Position) -> ModelResult<Range> {
        let nodes = normalize_nodes(nodes);
        let size = offset_size_of(&nodes);
        if size == 0 {
            return Ok(Range::collapsed(position.clone()));
        }
        self.apply(OperationKind::Insert {
            position: position.clone(),
            nodes,
            should_receive_attributes: false,
        })?;
        Ok(Range::from_position_and_shift(position, size))
    }

    pub fn insert_text(&mut self, text: &str, attributes: Attributes, position: &Position) -> ModelResult<Range> {
        let mut node = Node::text(text);
        *node.attributes_mut() = attributes;
        self.insert(vec![node], position)
    }

    /// Inserts an empty element and returns its id.
    pub fn insert_element(&mut self, name: &str, attributes: Attributes, position: &Position) -> ModelResult<NodeId> {
        let mut node = Node::element(name);
        *node.attributes_mut() = attributes;
        self.insert(vec![node], position)?;
        self.tree().node_after(position).ok_or(ModelError::NodeNotFound)
    }

    /// Inserts nodes at the end of `parent`.
    pub fn append(&mut self, nodes: Vec<Node>, parent: NodeId) -> ModelResult<Range> {
        let position = self.tree().position_at_end(parent)?;
        self.insert(nodes, &position)
    }

    // ---- removal and moving ---------------------------------------------

    /// Moves the content of a range into the graveyard.
    pub fn remove(&mut self, range: &Range) -> ModelResult<()> {
        let flat = range.minimal_flat_ranges(self.tree())?;
        // Last first, so earlier ranges keep their positions.
        for part in flat.into_iter().rev() {
            self.apply(OperationKind::Move {
                source_position: part.start.clone(),
                how_many: part.flat_len(),
                target_position: Position::at(GRAVEYARD, 0),
            })?;
        }
        Ok(())
    }

    pub fn remove_node(&mut self, id: NodeId) -> ModelResult<()> {
        let range = Range::on(self.tree(), id)?;
        self.remove(&range)
    }

    /// Moves a flat range to `target`, given in current coordinates.
    pub fn move_range(&mut self, range: &Range, target: &Position) -> ModelResult<()> {
        if !range.is_flat() {
            return Err(ModelError::WriterMoveInvalidRange);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        self.apply(OperationKind::Move {
            source_position: range.start.clone(),
            how_many: range.flat_len(),
            target_position: target.clone(),
        })
    }

    // ---- attributes ------------------------------------------------------

    /// Sets an attribute on every item of a range, nested items included.
    /// Items that already hold the value are skipped.
    pub fn set_attribute(&mut self, key: &str, value: Value, range: &Range) -> ModelResult<()> {
        self.change_attribute_on_range(key, Some(value), range)
    }

    pub fn remove_attribute(&mut self, key: &str, range: &Range) -> ModelResult<()> {
        self.change_attribute_on_range(key, None, range)
    }

    pub fn set_attributes(&mut self, attributes: &Attributes, range: &Range) -> ModelResult<()> {
        for (key, value) in attributes {
            self.set_attribute(key, value.clone(), range)?;
        }
        Ok(())
    }

    /// Removes every attribute from the items of a range.
    pub fn clear_attributes(&mut self, range: &Range) -> ModelResult<()> {
        let mut keys: Vec<String> = Vec::new();
        for item in self.tree().items(range, true)? {
            for key in item.attributes(self.tree()).keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        for key in keys {
            self.remove_attribute(&key, range)?;
        }
        Ok(())
    }

    /// Sets an attribute on a single element. Roots get a root attribute
    /// operation.
    pub fn set_attribute_on(&mut self, key: &str, value: Value, id: NodeId) -> ModelResult<()> {
        self.change_attribute_on_node(key, Some(value), id)
    }

    pub fn remove_attribute_on(&mut self, key: &str, id: NodeId) -> ModelResult<()> {
        self.change_attribute_on_node(key, None, id)
    }

    fn change_attribute_on_node(&mut self, key: &str, value: Option<Value>, id: NodeId) -> ModelResult<()> {
        let old_value = self.tree().attribute(id, key).cloned();
        if old_value == value {
            return Ok(());
        }
        if let Some(root) = self.tree().is_root(id).then(|| self.tree().root_name_of(id)).flatten() {
            let root = root.to_string();
            return self.apply(OperationKind::RootAttribute {
                root,
                key: key.to_string(),
                old_value,
                new_value: value,
            });
        }
        let range = Range::on(self.tree(), id)?;
        self.apply(OperationKind::Attribute {
            range,
            key: key.to_string(),
            old_value,
            new_value: value,
        })
    }

    fn change_attribute_on_range(&mut self, key: &str, value: Option<Value>, range: &Range) -> ModelResult<()> {
        let runs = attribute_runs(self.tree(), range, key)?;
        for run in runs {
            if run.old_value == value {
                continue;
            }
            let start = self.tree().position_in(run.parent, run.start)?;
            let end = start.with_offset(run.end);
            self.apply(OperationKind::Attribute {
                range: Range::new(start, end),
                key: key.to_string(),
                old_value: run.old_value,
                new_value: value.clone(),
            })?;
        }
        Ok(())
    }

    // ---- structure -------------------------------------------------------

    pub fn rename(&mut self, id: NodeId, new_name: &str) -> ModelResult<()> {
        if self.tree().is_root(id) {
            return Err(ModelError::WriterRenameRoot);
        }
        if !self.tree().is_element(id) {
            return Err(ModelError::WriterRenameNotElement);
        }
        let old_name = self.tree().name(id).to_string();
        if old_name == new_name {
            return Ok(());
        }
        let position = self.tree().position_before(id)?;
        self.apply(OperationKind::Rename {
            position,
            old_name,
            new_name: new_name.to_string(),
        })
    }

    /// Splits the parent of `position` in two. With a `limit`, every
    /// ancestor up to (excluding) the limit is split.
    pub fn split(&mut self, position: &Position, limit: Option<NodeId>) -> ModelResult<SplitResult> {
        let parent = self.tree().resolve_parent(position)?;
        let limit = match limit {
            Some(limit) => {
                if limit == parent || !self.tree().is_ancestor_of(limit, parent) {
                    return Err(ModelError::WriterSplitInvalidLimit);
                }
                limit
            }
            None => self.tree().parent(parent).ok_or(ModelError::WriterSplitElementNoParent)?,
        };

        let mut position = position.clone();
        let mut first_end = None;
        let mut second_start = None;
        loop {
            let element = self.tree().resolve_parent(&position)?;
            if element == limit {
                break;
            }
            let outer = self.tree().parent(element).ok_or(ModelError::WriterSplitElementNoParent)?;
            let copy = self.split_element(element, position.offset())?;

            first_end = Some(self.tree().position_at_end(element)?);
            second_start = Some(self.tree().position_in(copy, 0)?);
            position = self.tree().position_after(element)?;
            if outer == limit {
                break;
            }
        }

        let range = match (first_end, second_start) {
            (Some(start), Some(end)) => Range::new(start, end),
            _ => Range::collapsed(position.clone()),
        };
        Ok(SplitResult { position, range })
    }

    /// Inserts an empty copy of `element` right after it and moves the
    /// content from `offset` on into the copy.
    fn split_element(&mut self, element: NodeId, offset: usize) -> ModelResult<NodeId> {
        let mut copy = Node::element(self.tree().name(element));
        *copy.attributes_mut() = self.tree().attributes(element).clone();
        let after = self.tree().position_after(element)?;
        self.insert(vec![copy], &after)?;
        let copy_id = self.tree().node_after(&after).ok_or(ModelError::NodeNotFound)?;

        let how_many = self.tree().max_offset(element).saturating_sub(offset);
        if how_many > 0 {
            let source = self.tree().position_in(element, offset)?;
            let target = self.tree().position_in(copy_id, 0)?;
            self.apply(OperationKind::Move {
                source_position: source,
                how_many,
                target_position: target,
            })?;
        }
        Ok(copy_id)
    }

    /// Merges the elements on both sides of `position`: the content of the
    /// one after moves to the end of the one before, which then removes the
    /// emptied element.
    pub fn merge(&mut self, position: &Position) -> ModelResult<()> {
        let before = self
            .tree()
            .node_before(position)
            .filter(|id| self.tree().is_element(*id))
            .ok_or(ModelError::WriterMergeNoElementBefore)?;
        let after = self
            .tree()
            .node_after(position)
            .filter(|id| self.tree().is_element(*id))
            .ok_or(ModelError::WriterMergeNoElementAfter)?;

        let how_many = self.tree().max_offset(after);
        if how_many > 0 {
            let source = self.tree().position_in(after, 0)?;
            let target = self.tree().position_at_end(before)?;
            self.apply(OperationKind::Move {
                source_position: source,
                how_many,
                target_position: target,
            })?;
        }
        self.remove_node(after)
    }

    /// Wraps a flat range in a new element.
    pub fn wrap(&mut self, range: &Range, element: Node) -> ModelResult<NodeId> {
        if !range.is_flat() {
            return Err(ModelError::WriterWrapRangeNotFlat);
        }
        if element.is_text() || !element.children().is_empty() {
            return Err(ModelError::WriterWrapElementInvalid);
        }
        self.insert(vec![element], &range.end)?;
        let wrapper = self.tree().node_after(&range.end).ok_or(ModelError::NodeNotFound)?;

        if !range.is_collapsed() {
            let target = range.end.child(0);
            self.apply(OperationKind::Move {
                source_position: range.start.clone(),
                how_many: range.flat_len(),
                target_position: target,
            })?;
        }
        Ok(wrapper)
    }

    /// Replaces an element with its content.
    pub fn unwrap(&mut self, id: NodeId) -> ModelResult<()> {
        if self.tree().parent(id).is_none() {
            return Err(ModelError::WriterUnwrapElementNoParent);
        }
        let how_many = self.tree().max_offset(id);
        if how_many > 0 {
            let source = self.tree().position_in(id, 0)?;
            let target = self.tree().position_before(id)?;
            self.apply(OperationKind::Move {
                source_position: source,
                how_many,
                target_position: target,
            })?;
        }
        self.remove_node(id)
    }

    // ---- markers ---------------------------------------------------------

    pub fn add_marker(&mut self, name: &str, range: Range, affects_data: bool) -> ModelResult<()> {
        if self.document().markers().has(name) {
            return Err(ModelError::MarkerExists(name.to_string()));
        }
        self.apply(OperationKind::Marker {
            name: name.to_string(),
            old_range: None,
            new_range: Some(range),
            affects_data,
        })
    }

    /// Changes the range and/or the data flag of an existing marker.
    pub fn update_marker(&mut self, name: &str, range: Option<Range>, affects_data: Option<bool>) -> ModelResult<()> {
        let marker = self
            .document()
            .markers()
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::MarkerNotFound(name.to_string()))?;
        self.apply(OperationKind::Marker {
            name: name.to_string(),
            old_range: Some(marker.range.clone()),
            new_range: Some(range.unwrap_or(marker.range)),
            affects_data: affects_data.unwrap_or(marker.affects_data),
        })
    }

    pub fn remove_marker(&mut self, name: &str) -> ModelResult<()> {
        let marker = self
            .document()
            .markers()
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::MarkerNotFound(name.to_string()))?;
        self.apply(OperationKind::Marker {
            name: name.to_string(),
            old_range: Some(marker.range),
            new_range: None,
            affects_data: marker.affects_data,
        })
    }

    // ---- roots -----------------------------------------------------------

    pub fn add_root(&mut self, name: &str, element_name: &str) -> ModelResult<NodeId> {
        self.apply(OperationKind::Root {
            root_name: name.to_string(),
            element_name: element_name.to_string(),
            is_add: true,
        })?;
        self.tree().root(name).ok_or_else(|| ModelError::RootNotFound(name.to_string()))
    }

    /// Empties a root, drops its attributes and markers, then detaches it.
    pub fn detach_root(&mut self, name: &str) -> ModelResult<()> {
        let id = self
            .document()
            .get_root(name)
            .ok_or_else(|| ModelError::RootNotFound(name.to_string()))?;

        let content = Range::in_element(self.tree(), id)?;
        self.remove(&content)?;

        let keys: Vec<String> = self.tree().attributes(id).keys().cloned().collect();
        for key in keys {
            self.remove_attribute_on(&key, id)?;
        }

        let markers: Vec<String> = self.document().markers().in_root(name).map(|m| m.name.clone()).collect();
        for marker in markers {
            self.remove_marker(&marker)?;
        }

        let element_name = self.tree().name(id).to_string();
        self.apply(OperationKind::Root {
            root_name: name.to_string(),
            element_name,
            is_add: false,
        })
    }

    // ---- selection -------------------------------------------------------

    pub fn set_selection(&mut self, ranges: Vec<Range>, backward: bool) -> ModelResult<()> {
        self.model.document.set_selection(ranges, backward)
    }

    pub fn set_selection_to(&mut self, position: &Position) -> ModelResult<()> {
        self.set_selection(vec![Range::collapsed(position.clone())], false)
    }

    pub fn set_selection_attribute(&mut self, key: &str, value: Value) {
        self.model.document.set_selection_attribute(key, value);
    }

    pub fn remove_selection_attribute(&mut self, key: &str) {
        self.model.document.remove_selection_attribute(key);
    }
}

/// Consecutive items in one parent sharing the current value of a key.
#[derive(Debug)]
struct AttributeRun {
    parent: NodeId,
    start: usize,
    end: usize,
    old_value: Option<Value>,
}

fn attribute_runs(tree: &Tree, range: &Range, key: &str) -> ModelResult<Vec<AttributeRun>> {
    let mut runs: Vec<AttributeRun> = Vec::new();
    for item in tree.items(range, true)? {
        let (parent, start) = match &item {
            Item::Element(id) => (
                tree.parent(*id).ok_or(ModelError::NodeNotFound)?,
                tree.start_offset(*id).ok_or(ModelError::NodeNotFound)?,
            ),
            Item::Text(proxy) => (proxy.parent, proxy.start_offset),
        };
        let end = start + item.offset_size();
        let old_value = item.attributes(tree).get(key).cloned();

        let open = runs
            .iter_mut()
            .rev()
            .find(|run| run.parent == parent && run.end == start && run.old_value == old_value);
        match open {
            Some(run) => run.end = end,
            None => runs.push(AttributeRun {
                parent,
                start,
                end,
                old_value,
            }),
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use serde_json::json;

    fn model_with(content: Vec<Node>) -> Model {
        let mut model = Model::new();
        let root = model.document_mut().create_root("$root", "main").unwrap();
        model
            .change(|writer| {
                writer.append(content, root)?;
                Ok(())
            })
            .unwrap();
        model.take_completed_batches();
        model
    }

    fn paragraph(text: &str) -> Node {
        Node::element("paragraph").with_child(Node::text(text))
    }

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn test_remove_nested_range() {
        let mut model = model_with(vec![paragraph("foo"), paragraph("bar")]);
        model
            .change(|writer| writer.remove(&Range::new(pos(&[0, 1]), pos(&[1, 2]))))
            .unwrap();
        assert_eq!(
            model.document().root_content("main"),
            vec![Node::element("paragraph").with_child(Node::text("f")), Node::element("paragraph").with_child(Node::text("r"))]
        );
        // Both removed pieces end up at the graveyard start and merge.
        assert_eq!(model.document().root_content(GRAVEYARD), vec![Node::text("ooba")]);
    }

    #[test]
    fn test_set_attribute_skips_equal_runs() {
        let mut model = model_with(vec![Node::element("paragraph")
            .with_child(Node::text("ab"))
            .with_child(Node::text("cd").with_attribute("bold", true))]);
        model
            .change(|writer| writer.set_attribute("bold", json!(true), &Range::new(pos(&[0, 0]), pos(&[0, 4]))))
            .unwrap();

        let batch = &model.take_completed_batches()[0];
        assert_eq!(batch.operations.len(), 1);
        assert_eq!(
            model.document().root_content("main"),
            vec![Node::element("paragraph").with_child(Node::text("abcd").with_attribute("bold", true))]
        );
    }

    #[test]
    fn test_split_and_merge() {
        let mut model = model_with(vec![paragraph("foobar")]);
        let result = model.change(|writer| writer.split(&pos(&[0, 3]), None)).unwrap();
        assert_eq!(result.position, pos(&[1]));
        assert_eq!(result.range, Range::new(pos(&[0, 3]), pos(&[1, 0])));
        assert_eq!(model.document().root_content("main"), vec![paragraph("foo"), paragraph("bar")]);

        model.change(|writer| writer.merge(&pos(&[1]))).unwrap();
        assert_eq!(model.document().root_content("main"), vec![paragraph("foobar")]);
    }

    #[test]
    fn test_split_with_limit() {
        let quote = Node::element("blockQuote").with_child(paragraph("abcd"));
        let mut model = model_with(vec![quote]);
        let root = model.document().get_root("main").unwrap();
        let result = model.change(|writer| writer.split(&pos(&[0, 0, 2]), Some(root))).unwrap();

        assert_eq!(result.position, pos(&[1]));
        assert_eq!(
            model.document().root_content("main"),
            vec![
                Node::element("blockQuote").with_child(paragraph("ab")),
                Node::element("blockQuote").with_child(paragraph("cd")),
            ]
        );
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let mut model = model_with(vec![paragraph("a"), paragraph("b")]);
        let wrapper = model
            .change(|writer| writer.wrap(&Range::new(pos(&[0]), pos(&[2])), Node::element("blockQuote")))
            .unwrap();
        assert_eq!(
            model.document().root_content("main"),
            vec![Node::element("blockQuote").with_children([paragraph("a"), paragraph("b")])]
        );

        model.change(|writer| writer.unwrap(wrapper)).unwrap();
        assert_eq!(model.document().root_content("main"), vec![paragraph("a"), paragraph("b")]);
    }

    #[test]
    fn test_rename_guards() {
        let mut model = model_with(vec![paragraph("a")]);
        let root = model.document().get_root("main").unwrap();
        assert_eq!(model.change(|writer| writer.rename(root, "x")), Err(ModelError::WriterRenameRoot));

        let paragraph = model.document().tree().children(root)[0];
        model.change(|writer| writer.rename(paragraph, "heading1")).unwrap();
        assert_eq!(model.document().tree().name(paragraph), "heading1");
    }

    #[test]
    fn test_markers_lifecycle() {
        let mut model = model_with(vec![paragraph("abc")]);
        let range = Range::new(pos(&[0, 0]), pos(&[0, 2]));
        model.change(|writer| writer.add_marker("comment:1", range.clone(), true)).unwrap();
        assert_eq!(
            model.change(|writer| writer.add_marker("comment:1", range.clone(), true)),
            Err(ModelError::MarkerExists("comment:1".into()))
        );
        model.change(|writer| writer.update_marker("comment:1", None, Some(false))).unwrap();
        assert!(!model.document().markers().get("comment:1").unwrap().affects_data);
        model.change(|writer| writer.remove_marker("comment:1")).unwrap();
        assert!(model.document().markers().is_empty());
    }

    #[test]
    fn test_root_attributes_and_detach() {
        let mut model = model_with(vec![paragraph("abc")]);
        let root = model.document().get_root("main").unwrap();
        model.change(|writer| writer.set_attribute_on("lang", json!("en"), root)).unwrap();
        assert_eq!(model.document().tree().attribute(root, "lang"), Some(&json!("en")));

        model.change(|writer| writer.detach_root("main")).unwrap();
        assert!(model.document().get_root("main").is_none());
        assert!(model.document().tree().attributes(root).is_empty());
        assert!(model.document().root_names().is_empty());
    }
}
