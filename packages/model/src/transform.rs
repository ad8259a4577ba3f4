//! # Operational transformation
//!
//! `transform(a, b, strong)` rewrites `a`, created against the same document
//! version as `b`, so that it can be applied after `b` and keeps its intent.
//! `strong` breaks ties when both operations compete for the same place or
//! value: the strong side keeps its position or value, the weak side yields
//! or becomes a no-op.
//!
//! The result is a list because a single operation may need splitting (an
//! attribute change whose range was broken by an insertion, a move whose
//! range was partially moved away). An empty effect is expressed as one
//! [`OperationKind::NoOp`] so callers can keep version numbering aligned.
//!
//! Live ranges and positions (selection, markers) use the
//! `get_transformed_by_operation` helpers defined here as well.

use crate::node::offset_size_of;
use crate::operation::{is_move_into_itself, Operation, OperationKind};
use crate::position::Position;
use crate::range::Range;
use crate::tree::GRAVEYARD;
use tracing::trace;

impl Position {
    /// Where this position ends up after `op`. Content inserted exactly at
    /// the position lands before it.
    pub fn get_transformed_by_operation(&self, op: &Operation) -> Position {
        match &op.kind {
            OperationKind::Insert { position, nodes, .. } => {
                self.get_transformed_by_insertion(position, offset_size_of(nodes), true)
            }
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => self.get_transformed_by_move(source_position, target_position, *how_many, true, false),
            _ => self.clone(),
        }
    }
}

impl Range {
    /// Where this range ends up after `op`, without spreading. Parts moved
    /// elsewhere are returned as additional ranges.
    pub fn get_transformed_by_operation(&self, op: &Operation) -> Vec<Range> {
        match &op.kind {
            OperationKind::Insert { position, nodes, .. } => {
                self.get_transformed_by_insertion(position, offset_size_of(nodes), false, false)
            }
            OperationKind::Move {
                source_position,
                how_many,
                target_position,
            } => self.get_transformed_by_move(source_position, target_position, *how_many, false),
            _ => vec![self.clone()],
        }
    }

    /// Single range after `op`, for live ranges that must stay one piece.
    ///
    /// Pieces are joined when they stay in one root. A range that was moved
    /// entirely into the graveyard collapses where the content was removed.
    pub fn get_transformed_by_operation_joined(&self, op: &Operation) -> Range {
        let pieces = self.get_transformed_by_operation(op);
        let joined = join_pieces(pieces).unwrap_or_else(|| self.clone());
        match &op.kind {
            OperationKind::Move {
                source_position,
                target_position,
                ..
            } if joined.root() == GRAVEYARD && self.root() != GRAVEYARD && target_position.root == GRAVEYARD => {
                Range::collapsed(source_position.clone())
            }
            _ => joined,
        }
    }
}

fn join_pieces(pieces: Vec<Range>) -> Option<Range> {
    let first = pieces.first()?.clone();
    let same_root: Vec<&Range> = pieces.iter().filter(|r| r.root() == first.root()).collect();
    let start = same_root.iter().map(|r| &r.start).fold(first.start.clone(), |acc, p| {
        if p.is_before(&acc) {
            p.clone()
        } else {
            acc
        }
    });
    let end = same_root.iter().map(|r| &r.end).fold(first.end.clone(), |acc, p| {
        if p.is_after(&acc) {
            p.clone()
        } else {
            acc
        }
    });
    Some(Range::new(start, end))
}

/// Transforms `a` so it applies after `b`. Both must share a base version.
pub fn transform(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<Operation> {
    let result = match (&a.kind, &b.kind) {
        (OperationKind::NoOp, _) | (_, OperationKind::NoOp) => vec![a.kind.clone()],
        (OperationKind::Insert { .. }, _) => transform_insert(a, b, a_is_strong),
        (OperationKind::Move { .. }, _) => transform_move(a, b, a_is_strong),
        (OperationKind::Attribute { .. }, _) => transform_attribute(a, b, a_is_strong),
        (OperationKind::Rename { .. }, _) => transform_rename(a, b, a_is_strong),
        (OperationKind::Marker { .. }, _) => transform_marker(a, b, a_is_strong),
        (OperationKind::Root { .. }, _) => transform_root(a, b, a_is_strong),
        (OperationKind::RootAttribute { .. }, _) => transform_root_attribute(a, b, a_is_strong),
    };

    trace!(a = a.class_name(), b = b.class_name(), results = result.len(), "Transformed operation");

    if result.is_empty() {
        return vec![Operation::no_op(a.base_version)];
    }
    result
        .into_iter()
        .map(|kind| Operation::new(kind, a.base_version))
        .collect()
}

/// Transforms two concurrent operation sequences against each other.
///
/// Returns `a` rebased onto the end of `b` and `b` rebased onto the end of
/// `a`. Both input sequences must start from the same document version.
pub fn transform_sets(a: &[Operation], b: &[Operation], a_is_strong: bool) -> (Vec<Operation>, Vec<Operation>) {
    if a.is_empty() || b.is_empty() {
        return (a.to_vec(), b.to_vec());
    }
    if a.len() == 1 && b.len() == 1 {
        return (transform(&a[0], &b[0], a_is_strong), transform(&b[0], &a[0], !a_is_strong));
    }
    if a.len() > 1 {
        let (head, b1) = transform_sets(&a[..1], b, a_is_strong);
        let (tail, b2) = transform_sets(&a[1..], &b1, a_is_strong);
        return ([head, tail].concat(), b2);
    }
    let (a1, head) = transform_sets(a, &b[..1], a_is_strong);
    let (a2, tail) = transform_sets(&a1, &b[1..], a_is_strong);
    (a2, [head, tail].concat())
}

fn transform_insert(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::Insert {
        position,
        nodes,
        should_receive_attributes,
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };
    let mut nodes = nodes.clone();

    let position = match &b.kind {
        OperationKind::Insert {
            position: b_position,
            nodes: b_nodes,
            ..
        } => position.get_transformed_by_insertion(b_position, offset_size_of(b_nodes), !a_is_strong),
        OperationKind::Move {
            source_position,
            how_many,
            target_position,
        } => position.get_transformed_by_move(source_position, target_position, *how_many, !a_is_strong, false),
        OperationKind::Attribute {
            range, key, new_value, ..
        } => {
            if *should_receive_attributes && range.contains_position(position) {
                for node in &mut nodes {
                    match new_value {
                        Some(value) => {
                            node.attributes_mut().insert(key.clone(), value.clone());
                        }
                        None => {
                            node.attributes_mut().remove(key);
                        }
                    }
                }
            }
            position.clone()
        }
        _ => position.clone(),
    };

    vec![OperationKind::Insert {
        position,
        nodes,
        should_receive_attributes: *should_receive_attributes,
    }]
}

fn transform_move(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::Move {
        source_position,
        how_many,
        target_position,
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };

    match &b.kind {
        OperationKind::Insert {
            position: b_position,
            nodes: b_nodes,
            ..
        } => {
            let inserted = offset_size_of(b_nodes);
            let move_range = Range::from_position_and_shift(source_position, *how_many);
            let transformed = move_range
                .get_transformed_by_insertion(b_position, inserted, false, false)
                .into_iter()
                .next()
                .unwrap_or(move_range);
            let target = if target_position == b_position {
                target_position.clone()
            } else {
                target_position.get_transformed_by_insertion(b_position, inserted, true)
            };
            vec![OperationKind::Move {
                source_position: transformed.start.clone(),
                how_many: transformed.flat_len(),
                target_position: target,
            }]
        }
        OperationKind::Move {
            source_position: b_source,
            how_many: b_how_many,
            target_position: b_target,
        } => {
            let range_a = Range::from_position_and_shift(source_position, *how_many);
            let range_b = Range::from_position_and_shift(b_source, *b_how_many);

            if range_a == range_b && !a_is_strong {
                return vec![OperationKind::NoOp];
            }
            // Content removed by `b` stays removed.
            if b_target.root == GRAVEYARD
                && source_position.root != GRAVEYARD
                && (range_b == range_a || range_b.contains_range(&range_a, true))
            {
                return vec![OperationKind::NoOp];
            }

            let target = target_position.get_transformed_by_move(b_source, b_target, *b_how_many, !a_is_strong, false);
            let ranges: Vec<Range> = range_a
                .get_transformed_by_move(b_source, b_target, *b_how_many, false)
                .into_iter()
                .filter(|r| !r.is_collapsed() && r.is_flat())
                .collect();

            moves_from_ranges(ranges, target)
        }
        _ => vec![a.kind.clone()],
    }
}

/// Builds consecutive moves of `ranges` to `target`, each expressed in the
/// document state left by the previous ones.
fn moves_from_ranges(mut ranges: Vec<Range>, mut target: Position) -> Vec<OperationKind> {
    let mut kinds = Vec::new();
    for i in 0..ranges.len() {
        let range = ranges[i].clone();
        let how_many = range.flat_len();
        let source = range.start.clone();

        if !is_move_into_itself(&source, how_many, &target) {
            kinds.push(OperationKind::Move {
                source_position: source.clone(),
                how_many,
                target_position: target.clone(),
            });
        }

        for later in ranges.iter_mut().skip(i + 1) {
            if let Some(moved) = later.get_transformed_by_move(&source, &target, how_many, false).into_iter().next() {
                *later = moved;
            }
        }
        target = target.get_transformed_by_move(&source, &target, how_many, true, false);
    }
    kinds
}

fn transform_attribute(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::Attribute {
        range,
        key,
        old_value,
        new_value,
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };

    let rebuild = |ranges: Vec<Range>| -> Vec<OperationKind> {
        ranges
            .into_iter()
            .filter(|r| !r.is_collapsed() && r.is_flat())
            .map(|range| OperationKind::Attribute {
                range,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
            .collect()
    };

    match &b.kind {
        OperationKind::Insert {
            position, nodes, ..
        } => rebuild(range.get_transformed_by_insertion(position, offset_size_of(nodes), true, true)),
        OperationKind::Move {
            source_position,
            how_many,
            target_position,
        } => rebuild(range.get_transformed_by_move(source_position, target_position, *how_many, true)),
        OperationKind::Attribute {
            range: b_range,
            key: b_key,
            new_value: b_new_value,
            ..
        } if b_key == key && range.is_intersecting(b_range) => {
            let mut kinds = rebuild(range.get_difference(b_range));
            if a_is_strong && b_new_value != new_value {
                if let Some(common) = range.get_intersection(b_range) {
                    kinds.push(OperationKind::Attribute {
                        range: common,
                        key: key.clone(),
                        old_value: b_new_value.clone(),
                        new_value: new_value.clone(),
                    });
                }
            }
            kinds
        }
        _ => vec![a.kind.clone()],
    }
}

fn transform_rename(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::Rename {
        position,
        old_name,
        new_name,
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };

    let (position, old_name) = match &b.kind {
        OperationKind::Insert {
            position: b_position,
            nodes,
            ..
        } => (
            position.get_transformed_by_insertion(b_position, offset_size_of(nodes), true),
            old_name.clone(),
        ),
        OperationKind::Move {
            source_position,
            how_many,
            target_position,
        } => (
            position.get_transformed_by_move(source_position, target_position, *how_many, true, true),
            old_name.clone(),
        ),
        OperationKind::Rename {
            position: b_position,
            new_name: b_new_name,
            ..
        } if b_position == position => {
            if !a_is_strong || b_new_name == new_name {
                return vec![OperationKind::NoOp];
            }
            (position.clone(), b_new_name.clone())
        }
        _ => (position.clone(), old_name.clone()),
    };

    vec![OperationKind::Rename {
        position,
        old_name,
        new_name: new_name.clone(),
    }]
}

fn transform_marker(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::Marker {
        name,
        old_range,
        new_range,
        affects_data,
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };

    if let OperationKind::Marker {
        name: b_name,
        new_range: b_new_range,
        ..
    } = &b.kind
    {
        if b_name != name {
            return vec![a.kind.clone()];
        }
        if !a_is_strong {
            return vec![OperationKind::NoOp];
        }
        return vec![OperationKind::Marker {
            name: name.clone(),
            old_range: b_new_range.clone(),
            new_range: new_range.clone(),
            affects_data: *affects_data,
        }];
    }

    let transform = |range: &Option<Range>| range.as_ref().map(|r| r.get_transformed_by_operation_joined(b));
    vec![OperationKind::Marker {
        name: name.clone(),
        old_range: transform(old_range),
        new_range: transform(new_range),
        affects_data: *affects_data,
    }]
}

fn transform_root(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    match (&a.kind, &b.kind) {
        (
            OperationKind::Root {
                root_name, is_add, ..
            },
            OperationKind::Root {
                root_name: b_root_name,
                is_add: b_is_add,
                ..
            },
        ) if root_name == b_root_name && (is_add == b_is_add || !a_is_strong) => vec![OperationKind::NoOp],
        _ => vec![a.kind.clone()],
    }
}

fn transform_root_attribute(a: &Operation, b: &Operation, a_is_strong: bool) -> Vec<OperationKind> {
    let OperationKind::RootAttribute {
        root,
        key,
        new_value,
        ..
    } = &a.kind
    else {
        return vec![a.kind.clone()];
    };

    match &b.kind {
        OperationKind::RootAttribute {
            root: b_root,
            key: b_key,
            new_value: b_new_value,
            ..
        } if b_root == root && b_key == key => {
            if !a_is_strong || b_new_value == new_value {
                return vec![OperationKind::NoOp];
            }
            vec![OperationKind::RootAttribute {
                root: root.clone(),
                key: key.clone(),
                old_value: b_new_value.clone(),
                new_value: new_value.clone(),
            }]
        }
        _ => vec![a.kind.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use serde_json::json;

    fn insert(path: &[usize], text: &str, version: u64) -> Operation {
        Operation::new(
            OperationKind::Insert {
                position: Position::new("main", path.to_vec()),
                nodes: vec![Node::text(text)],
                should_receive_attributes: false,
            },
            Some(version),
        )
    }

    fn attribute(start: &[usize], end: &[usize], key: &str, old: Option<serde_json::Value>, new: Option<serde_json::Value>) -> Operation {
        Operation::new(
            OperationKind::Attribute {
                range: Range::new(Position::new("main", start.to_vec()), Position::new("main", end.to_vec())),
                key: key.into(),
                old_value: old,
                new_value: new,
            },
            Some(0),
        )
    }

    fn position_of(op: &Operation) -> &Position {
        match &op.kind {
            OperationKind::Insert { position, .. } => position,
            other => panic!("not an insert: {other:?}"),
        }
    }

    #[test]
    fn test_insert_insert_tie_break() {
        let a = insert(&[0, 1], "a", 0);
        let b = insert(&[0, 1], "bb", 0);
        assert_eq!(position_of(&transform(&a, &b, true)[0]), &Position::new("main", vec![0, 1]));
        assert_eq!(position_of(&transform(&a, &b, false)[0]), &Position::new("main", vec![0, 3]));
    }

    #[test]
    fn test_attribute_split_by_insertion() {
        let a = attribute(&[0, 0], &[0, 4], "bold", None, Some(json!(true)));
        let b = insert(&[0, 2], "xy", 0);
        let result = transform(&a, &b, false);
        assert_eq!(result.len(), 2);
        match (&result[0].kind, &result[1].kind) {
            (OperationKind::Attribute { range: first, .. }, OperationKind::Attribute { range: second, .. }) => {
                assert_eq!(first.end, Position::new("main", vec![0, 2]));
                assert_eq!(second.start, Position::new("main", vec![0, 4]));
                assert_eq!(second.end, Position::new("main", vec![0, 6]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_attribute_conflict() {
        let a = attribute(&[0, 0], &[0, 4], "color", None, Some(json!("red")));
        let b = attribute(&[0, 2], &[0, 6], "color", None, Some(json!("blue")));

        let strong = transform(&a, &b, true);
        assert_eq!(strong.len(), 2);
        match &strong[1].kind {
            OperationKind::Attribute { old_value, new_value, .. } => {
                assert_eq!(old_value, &Some(json!("blue")));
                assert_eq!(new_value, &Some(json!("red")));
            }
            other => panic!("unexpected {other:?}"),
        }

        let weak = transform(&a, &b, false);
        assert_eq!(weak.len(), 1);
        match &weak[0].kind {
            OperationKind::Attribute { range, .. } => assert_eq!(range.end, Position::new("main", vec![0, 2])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_same_move_weak_becomes_noop() {
        let mv = Operation::new(
            OperationKind::Move {
                source_position: Position::at("main", 0),
                how_many: 1,
                target_position: Position::at("main", 3),
            },
            Some(0),
        );
        assert!(transform(&mv, &mv, false)[0].is_no_op());
        assert!(!transform(&mv, &mv, true)[0].is_no_op());
    }

    #[test]
    fn test_move_of_removed_content_is_dropped() {
        let remove = Operation::new(
            OperationKind::Move {
                source_position: Position::at("main", 0),
                how_many: 2,
                target_position: Position::at(GRAVEYARD, 0),
            },
            Some(0),
        );
        let mv = Operation::new(
            OperationKind::Move {
                source_position: Position::at("main", 1),
                how_many: 1,
                target_position: Position::at("main", 4),
            },
            Some(0),
        );
        assert!(transform(&mv, &remove, true)[0].is_no_op());
    }

    #[test]
    fn test_rename_conflict() {
        let rename = |name: &str| {
            Operation::new(
                OperationKind::Rename {
                    position: Position::at("main", 0),
                    old_name: "paragraph".into(),
                    new_name: name.into(),
                },
                Some(0),
            )
        };
        let a = rename("heading1");
        let b = rename("heading2");
        assert!(transform(&a, &b, false)[0].is_no_op());
        match &transform(&a, &b, true)[0].kind {
            OperationKind::Rename { old_name, new_name, .. } => {
                assert_eq!(old_name, "heading2");
                assert_eq!(new_name, "heading1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transform_sets_shapes() {
        let a = vec![insert(&[0, 0], "a", 0), insert(&[0, 1], "b", 1)];
        let b = vec![insert(&[0, 0], "x", 0)];
        let (a2, b2) = transform_sets(&a, &b, true);
        assert_eq!(a2.len(), 2);
        assert_eq!(b2.len(), 1);
        assert_eq!(position_of(&a2[0]), &Position::new("main", vec![0, 0]));
        assert_eq!(position_of(&a2[1]), &Position::new("main", vec![0, 1]));
        assert_eq!(position_of(&b2[0]), &Position::new("main", vec![0, 2]));
    }
}
