//! # Operations
//!
//! The atomic, invertible and serializable unit of document change.
//!
//! Every operation carries the document version it was created against
//! (`baseVersion`). Detached operations, such as those used only to build
//! content outside a document, have no base version.
//!
//! ## Kinds
//!
//! - **Insert**: owned nodes at a position
//! - **Move**: a flat run of offsets to another position, possibly in another
//!   root. Removal is a move into the graveyard root.
//! - **Attribute**: set, change or remove one attribute over a flat range
//! - **Rename**: change an element's name
//! - **Marker**: add, update or remove a named range
//! - **Root**: attach or detach a root
//! - **RootAttribute**: attribute change on a root element
//! - **NoOp**: placeholder produced by transformation
//!
//! ## Wire format
//!
//! Operations serialize to JSON objects tagged with `__className`, the same
//! shape the replay log uses:
//!
//! ```json
//! {"baseVersion":0,"__className":"InsertOperation","position":{"root":"main","path":[0]},"nodes":[{"name":"paragraph"}],"shouldReceiveAttributes":false}
//! ```

use crate::error::{ModelError, ModelResult};
use crate::markers::MarkerCollection;
use crate::node::{offset_size_of, Node};
use crate::position::{compare_arrays, ArrayRelation, Position};
use crate::range::Range;
use crate::tree::{Tree, GRAVEYARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "baseVersion")]
    pub base_version: Option<u64>,
    #[serde(flatten)]
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__className")]
pub enum OperationKind {
    #[serde(rename = "InsertOperation", rename_all = "camelCase")]
    Insert {
        position: Position,
        nodes: Vec<Node>,
        #[serde(default)]
        should_receive_attributes: bool,
    },

    #[serde(rename = "MoveOperation", rename_all = "camelCase")]
    Move {
        source_position: Position,
        how_many: usize,
        target_position: Position,
    },

    #[serde(rename = "AttributeOperation", rename_all = "camelCase")]
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },

    #[serde(rename = "RenameOperation", rename_all = "camelCase")]
    Rename {
        position: Position,
        old_name: String,
        new_name: String,
    },

    #[serde(rename = "MarkerOperation", rename_all = "camelCase")]
    Marker {
        name: String,
        old_range: Option<Range>,
        new_range: Option<Range>,
        affects_data: bool,
    },

    #[serde(rename = "RootOperation", rename_all = "camelCase")]
    Root {
        root_name: String,
        element_name: String,
        is_add: bool,
    },

    #[serde(rename = "RootAttributeOperation", rename_all = "camelCase")]
    RootAttribute {
        root: String,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },

    #[serde(rename = "NoOperation")]
    NoOp,
}

impl Operation {
    pub fn new(kind: OperationKind, base_version: Option<u64>) -> Self {
        Self { base_version, kind }
    }

    pub fn detached(kind: OperationKind) -> Self {
        Self::new(kind, None)
    }

    pub fn no_op(base_version: Option<u64>) -> Self {
        Self::new(OperationKind::NoOp, base_version)
    }

    pub fn with_base_version(mut self, base_version: Option<u64>) -> Self {
        self.base_version = base_version;
        self
    }

    /// Wire class name, e.g. `MoveOperation`.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            OperationKind::Insert { .. } => "InsertOperation",
            OperationKind::Move { .. } => "MoveOperation",
            OperationKind::Attribute { .. } => "AttributeOperation",
            OperationKind::Rename { .. } => "RenameOperation",
            OperationKind::Marker { .. } => "MarkerOperation",
            OperationKind::Root { .. } => "RootOperation",
            OperationKind::RootAttribute { .. } => "RootAttributeOperation",
            OperationKind::NoOp => "NoOperation",
        }
    }

    /// Short kind name used in logs. Moves into the graveyard report as
    /// `remove`, moves out of it as `reinsert`.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Move {
                source_position,
                target_position,
                ..
            } => {
                if target_position.root == GRAVEYARD {
                    "remove"
                } else if source_position.root == GRAVEYARD {
                    "reinsert"
                } else {
                    "move"
                }
            }
            OperationKind::Attribute { old_value, new_value, .. } => match (old_value, new_value) {
                (None, Some(_)) => "addAttribute",
                (Some(_), None) => "removeAttribute",
                _ => "changeAttribute",
            },
            OperationKind::Rename { .. } => "rename",
            OperationKind::Marker { .. } => "marker",
            OperationKind::Root { is_add: true, .. } => "addRoot",
            OperationKind::Root { is_add: false, .. } => "detachRoot",
            OperationKind::RootAttribute { .. } => "rootAttribute",
            OperationKind::NoOp => "noop",
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// Offset size of inserted or moved content, zero for other kinds.
    pub fn how_many(&self) -> usize {
        match &self.kind {
            OperationKind::Insert { nodes, .. } => offset_size_of(nodes),
            OperationKind::Move { how_many, .. } => *how_many,
            _ => 0,
        }
    }

    /// Start of the moved content after a move is applied.
    pub fn moved_range_start(&self) -> Option<Position> {
        match &self.kind {
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => Some(
                target_position
                    .get_transformed_by_deletion(source_position, *how_many)
                    .unwrap_or_else(|| target_position.clone()),
            ),
            _ => None,
        }
    }

    /// Operation that exactly undoes this one when applied right after it.
    pub fn inverse(&self) -> Operation {
        let base_version = self.base_version.map(|v| v + 1);
        let kind = match &self.kind {
            OperationKind::Insert { position, nodes, .. } => OperationKind::Move {
                source_position: position.clone(),
                how_many: offset_size_of(nodes),
                target_position: Position::at(GRAVEYARD, 0),
            },
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => OperationKind::Move {
                source_position: self.moved_range_start().unwrap_or_else(|| target_position.clone()),
                how_many: *how_many,
                target_position: source_position.get_transformed_by_insertion(target_position, *how_many, true),
            },
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => OperationKind::Attribute {
                range: range.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => OperationKind::Rename {
                position: position.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
            OperationKind::Marker {
                name,
                old_range,
                new_range,
                affects_data,
            } => OperationKind::Marker {
                name: name.clone(),
                old_range: new_range.clone(),
                new_range: old_range.clone(),
                affects_data: *affects_data,
            },
            OperationKind::Root {
                root_name,
                element_name,
                is_add,
            } => OperationKind::Root {
                root_name: root_name.clone(),
                element_name: element_name.clone(),
                is_add: !is_add,
            },
            OperationKind::RootAttribute {
                root,
                key,
                old_value,
                new_value,
            } => OperationKind::RootAttribute {
                root: root.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Operation::new(kind, base_version)
    }

    /// Checks that the operation can be executed against `tree`.
    pub fn validate(&self, tree: &Tree) -> ModelResult<()> {
        match &self.kind {
            OperationKind::Insert { position, .. } => {
                tree.resolve_parent(position)
                    .map(|_| ())
                    .map_err(|_| ModelError::InsertPositionInvalid {
                        root: position.root.clone(),
                        path: position.path.clone(),
                    })
            }
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => validate_move(tree, source_position, *how_many, target_position),
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => {
                if !range.is_flat() {
                    return Err(ModelError::AttributeRangeNotFlat);
                }
                let parent = tree.resolve_parent(&range.start)?;
                tree.resolve_parent(&range.end)?;
                for item in tree.items_in_flat(parent, range.start.offset(), range.end.offset()) {
                    let current = item.attributes(tree).get(key);
                    check_old_value(key, current, old_value.as_ref(), new_value.as_ref())?;
                }
                Ok(())
            }
            OperationKind::Rename { position, old_name, .. } => {
                let element = tree
                    .node_after(position)
                    .filter(|id| tree.is_element(*id))
                    .ok_or_else(|| ModelError::RenameWrongPosition {
                        root: position.root.clone(),
                        path: position.path.clone(),
                    })?;
                let actual = tree.name(element);
                if actual != old_name {
                    return Err(ModelError::RenameWrongName {
                        expected: old_name.clone(),
                        actual: actual.to_string(),
                    });
                }
                Ok(())
            }
            OperationKind::Marker { .. } | OperationKind::NoOp => Ok(()),
            OperationKind::Root { root_name, is_add, .. } => match (tree.root_entry(root_name), is_add) {
                (Some(entry), true) if entry.attached => Err(ModelError::RootAttached(root_name.clone())),
                (Some(entry), false) if !entry.attached => Err(ModelError::RootDetached(root_name.clone())),
                (None, false) => Err(ModelError::RootNotFound(root_name.clone())),
                _ => Ok(()),
            },
            OperationKind::RootAttribute {
                root,
                key,
                old_value,
                new_value,
            } => {
                let id = tree.root(root).ok_or_else(|| ModelError::RootNotFound(root.clone()))?;
                let current = tree.attribute(id, key);
                if let Some(expected) = old_value {
                    if current != Some(expected) {
                        return Err(ModelError::RootAttributeWrongOldValue {
                            root: root.clone(),
                            key: key.clone(),
                            expected: expected.clone(),
                            actual: current.cloned().unwrap_or(Value::Null),
                        });
                    }
                } else if new_value.is_some() && current.is_some() {
                    return Err(ModelError::AttributeExists { key: key.clone() });
                }
                Ok(())
            }
        }
    }

    /// Applies the operation. Callers must validate first.
    pub fn execute(&self, tree: &mut Tree, markers: &mut MarkerCollection) -> ModelResult<()> {
        match &self.kind {
            OperationKind::Insert { position, nodes, .. } => {
                let parent = tree.resolve_parent(position)?;
                tree.insert_nodes(parent, position.offset(), nodes)?;
            }
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => {
                tree.move_nodes(source_position, *how_many, target_position)?;
            }
            OperationKind::Attribute {
                range, key, new_value, ..
            } => {
                let parent = tree.resolve_parent(&range.start)?;
                tree.set_attribute_in_flat(parent, range.start.offset(), range.end.offset(), key, new_value.as_ref())?;
            }
            OperationKind::Rename { position, new_name, .. } => {
                let element = tree.node_after(position).ok_or(ModelError::NodeNotFound)?;
                tree.rename(element, new_name)?;
            }
            OperationKind::Marker {
                name,
                new_range,
                affects_data,
                ..
            } => match new_range {
                Some(range) => {
                    markers.set(name, range.clone(), *affects_data);
                }
                None => {
                    markers.remove(name);
                }
            },
            OperationKind::Root {
                root_name,
                element_name,
                is_add,
            } => {
                if *is_add {
                    tree.add_root(root_name, element_name);
                } else {
                    tree.set_root_attached(root_name, false)?;
                }
            }
            OperationKind::RootAttribute {
                root, key, new_value, ..
            } => {
                let id = tree.root(root).ok_or_else(|| ModelError::RootNotFound(root.clone()))?;
                tree.set_node_attribute(id, key, new_value.as_ref())?;
            }
            OperationKind::NoOp => {}
        }
        Ok(())
    }
}

fn check_old_value(key: &str, current: Option<&Value>, old: Option<&Value>, new: Option<&Value>) -> ModelResult<()> {
    match (old, current) {
        (Some(_), None) => Err(ModelError::AttributeAbsent { key: key.to_string() }),
        (Some(expected), Some(actual)) if expected != actual => Err(ModelError::AttributeWrongOldValue {
            key: key.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
        }),
        (None, Some(_)) if new.is_some() => Err(ModelError::AttributeExists { key: key.to_string() }),
        _ => Ok(()),
    }
}

/// Whether moving `how_many` offsets from `source` to `target` would put
/// content inside itself.
pub fn is_move_into_itself(source: &Position, how_many: usize, target: &Position) -> bool {
    if source.root != target.root {
        return false;
    }
    let source_offset = source.offset();
    if source.has_same_parent_as(target) {
        return source_offset < target.offset() && target.offset() < source_offset + how_many;
    }
    if compare_arrays(source.parent_path(), target.parent_path()) == ArrayRelation::Prefix {
        let i = source.path.len() - 1;
        return target.path[i] >= source_offset && target.path[i] < source_offset + how_many;
    }
    false
}

fn validate_move(tree: &Tree, source: &Position, how_many: usize, target: &Position) -> ModelResult<()> {
    let source_parent = tree.resolve_parent(source)?;
    if source.offset() + how_many > tree.max_offset(source_parent) {
        return Err(ModelError::MoveNodesDoNotExist {
            root: source.root.clone(),
            path: source.path.clone(),
            how_many,
        });
    }
    tree.resolve_parent(target).map_err(|_| ModelError::MovePositionInvalid {
        root: target.root.clone(),
        path: target.path.clone(),
    })?;
    if is_move_into_itself(source, how_many, target) {
        if source.has_same_parent_as(target) {
            return Err(ModelError::MoveRangeIntoItself);
        }
        return Err(ModelError::MoveNodeIntoItself);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Tree {
        let mut tree = Tree::new();
        tree.add_root(GRAVEYARD, "$graveyard");
        let root = tree.add_root("main", "$root");
        tree.insert_nodes(
            root,
            0,
            &[
                Node::element("paragraph").with_child(Node::text("foo")),
                Node::element("paragraph").with_child(Node::text("bar")),
            ],
        )
        .unwrap();
        tree
    }

    fn apply(tree: &mut Tree, op: &Operation) {
        let mut markers = MarkerCollection::new();
        op.validate(tree).unwrap();
        op.execute(tree, &mut markers).unwrap();
    }

    #[test]
    fn test_wire_format() {
        let op = Operation::new(
            OperationKind::Insert {
                position: Position::new("main", vec![0, 1]),
                nodes: vec![Node::text("x")],
                should_receive_attributes: false,
            },
            Some(3),
        );
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "baseVersion": 3,
                "__className": "InsertOperation",
                "position": { "root": "main", "path": [0, 1] },
                "nodes": [{ "data": "x" }],
                "shouldReceiveAttributes": false
            })
        );
        let back: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);

        let noop: Operation = serde_json::from_str(r#"{"baseVersion":1,"__className":"NoOperation"}"#).unwrap();
        assert!(noop.is_no_op());
    }

    #[test]
    fn test_insert_then_inverse_restores_tree() {
        let mut tree = tree();
        let before = tree.root_content("main");
        let op = Operation::new(
            OperationKind::Insert {
                position: Position::new("main", vec![1, 2]),
                nodes: vec![Node::text("XY")],
                should_receive_attributes: false,
            },
            Some(0),
        );
        apply(&mut tree, &op);
        assert_ne!(tree.root_content("main"), before);
        apply(&mut tree, &op.inverse());
        assert_eq!(tree.root_content("main"), before);
        assert_eq!(tree.root_content(GRAVEYARD), vec![Node::text("XY")]);
    }

    #[test]
    fn test_move_then_inverse_restores_tree() {
        let mut tree = tree();
        let before = tree.root_content("main");
        let op = Operation::detached(OperationKind::Move {
            source_position: Position::at("main", 0),
            how_many: 1,
            target_position: Position::new("main", vec![2]),
        });
        apply(&mut tree, &op);
        assert_eq!(tree.root_content("main")[0], before[1]);
        apply(&mut tree, &op.inverse());
        assert_eq!(tree.root_content("main"), before);
    }

    #[test]
    fn test_move_into_itself_fails() {
        let tree = tree();
        let op = Operation::detached(OperationKind::Move {
            source_position: Position::at("main", 0),
            how_many: 1,
            target_position: Position::new("main", vec![0, 1]),
        });
        assert_eq!(op.validate(&tree), Err(ModelError::MoveNodeIntoItself));

        let op = Operation::detached(OperationKind::Move {
            source_position: Position::at("main", 0),
            how_many: 3,
            target_position: Position::new("main", vec![1]),
        });
        assert!(matches!(op.validate(&tree), Err(ModelError::MoveNodesDoNotExist { .. })));
    }

    #[test]
    fn test_attribute_guards() {
        let mut tree = tree();
        let range = Range::new(Position::new("main", vec![0, 0]), Position::new("main", vec![0, 2]));
        let set = Operation::detached(OperationKind::Attribute {
            range: range.clone(),
            key: "bold".into(),
            old_value: None,
            new_value: Some(json!(true)),
        });
        apply(&mut tree, &set);

        assert_eq!(set.validate(&tree), Err(ModelError::AttributeExists { key: "bold".into() }));

        let wrong = Operation::detached(OperationKind::Attribute {
            range: range.clone(),
            key: "bold".into(),
            old_value: Some(json!(false)),
            new_value: None,
        });
        assert!(matches!(wrong.validate(&tree), Err(ModelError::AttributeWrongOldValue { .. })));

        let remove_absent = Operation::detached(OperationKind::Attribute {
            range: Range::new(Position::new("main", vec![1, 0]), Position::new("main", vec![1, 1])),
            key: "bold".into(),
            old_value: Some(json!(true)),
            new_value: None,
        });
        assert_eq!(
            remove_absent.validate(&tree),
            Err(ModelError::AttributeAbsent { key: "bold".into() })
        );

        let not_flat = Operation::detached(OperationKind::Attribute {
            range: Range::new(Position::new("main", vec![0, 0]), Position::new("main", vec![1, 1])),
            key: "bold".into(),
            old_value: None,
            new_value: Some(json!(true)),
        });
        assert_eq!(not_flat.validate(&tree), Err(ModelError::AttributeRangeNotFlat));
    }

    #[test]
    fn test_rename_guards() {
        let tree = tree();
        let wrong_name = Operation::detached(OperationKind::Rename {
            position: Position::at("main", 0),
            old_name: "heading".into(),
            new_name: "paragraph".into(),
        });
        assert!(matches!(wrong_name.validate(&tree), Err(ModelError::RenameWrongName { .. })));

        let wrong_position = Operation::detached(OperationKind::Rename {
            position: Position::new("main", vec![0, 0]),
            old_name: "paragraph".into(),
            new_name: "heading".into(),
        });
        assert!(matches!(
            wrong_position.validate(&tree),
            Err(ModelError::RenameWrongPosition { .. })
        ));
    }

    #[test]
    fn test_type_names() {
        let insert = Operation::detached(OperationKind::Insert {
            position: Position::at("main", 0),
            nodes: vec![Node::element("paragraph")],
            should_receive_attributes: false,
        });
        assert_eq!(insert.type_name(), "insert");
        assert_eq!(insert.inverse().type_name(), "remove");
        assert_eq!(insert.inverse().inverse().type_name(), "reinsert");
    }
}
