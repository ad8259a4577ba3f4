//! End-to-end checks of the operation system
//!
//! This tests:
//! - Version mismatch rejection
//! - Range transformation by insertion
//! - Rebasing concurrent operations between replicas
//! - Insert/remove inverse round-trips
//! - Position ordering and differ idempotence

use folio_model::{
    Document, Model, Node, Operation, OperationKind, Position, PositionRelation, Range, Schema, SchemaContext,
};
use serde_json::json;

fn document() -> Document {
    let mut doc = Document::new();
    doc.create_root("$root", "main").unwrap();
    doc
}

fn insert(path: &[usize], nodes: Vec<Node>, version: u64) -> Operation {
    Operation::new(
        OperationKind::Insert {
            position: Position::new("main", path.to_vec()),
            nodes,
            should_receive_attributes: false,
        },
        Some(version),
    )
}

#[test]
fn test_stale_operation_is_rejected_without_mutation() {
    let mut doc = document();
    doc.apply_operation(&insert(&[0], vec![Node::element("paragraph")], 0))
        .unwrap();
    let after_first = doc.root_content("main");

    let stale = insert(&[0], vec![Node::element("heading1")], 0);
    let error = doc.apply_operation(&stale).unwrap_err();

    assert_eq!(
        folio_common::ErrorCode::code(&error),
        "model-document-applyOperation-wrong-version"
    );
    assert_eq!(doc.root_content("main"), after_first);
    assert_eq!(doc.version(), 1);
}

#[test]
fn test_range_transformed_by_insertion() {
    let range = Range::new(
        Position::new("main", vec![2, 7]),
        Position::new("main", vec![4, 0, 1]),
    );

    let shifted = range.get_transformed_by_insertion(&Position::new("main", vec![1]), 2, true, false);
    assert_eq!(
        shifted,
        vec![Range::new(
            Position::new("main", vec![4, 7]),
            Position::new("main", vec![6, 0, 1]),
        )]
    );

    let spread = range.get_transformed_by_insertion(&Position::new("main", vec![3, 2]), 4, true, false);
    assert_eq!(
        spread,
        vec![
            Range::new(Position::new("main", vec![2, 7]), Position::new("main", vec![3, 2])),
            Range::new(Position::new("main", vec![3, 6]), Position::new("main", vec![4, 0, 1])),
        ]
    );
}

#[test]
fn test_concurrent_inserts_converge() {
    // Two replicas share five operations of history.
    let mut replica_a = document();
    let mut replica_b = document();
    for version in 0..5 {
        let op = insert(&[0], vec![Node::text("x")], version);
        replica_a.apply_operation(&op).unwrap();
        replica_b.apply_operation(&op).unwrap();
    }
    assert_eq!(replica_a.version(), 5);

    let from_a = insert(&[1], vec![Node::text("A")], 5);
    let from_b = insert(&[4], vec![Node::text("B")], 5);

    replica_a.apply_operation(&from_a).unwrap();
    let rebased_b = replica_a.rebase_operations(&[from_b.clone()]);
    for op in &rebased_b {
        replica_a.apply_operation(op).unwrap();
    }

    replica_b.apply_operation(&from_b).unwrap();
    let rebased_a = replica_b.rebase_operations(&[from_a]);
    for op in &rebased_a {
        replica_b.apply_operation(op).unwrap();
    }

    assert_eq!(replica_a.version(), 7);
    assert_eq!(replica_b.version(), 7);
    assert_eq!(replica_a.root_content("main"), vec![Node::text("xAxxxBx")]);
    assert_eq!(replica_a.root_content("main"), replica_b.root_content("main"));
}

#[test]
fn test_insert_then_inverse_restores_tree() {
    let mut doc = document();
    doc.apply_operation(&insert(
        &[0],
        vec![Node::element("paragraph").with_child(Node::text("foo"))],
        0,
    ))
    .unwrap();
    let before = doc.root_content("main");

    let op = insert(
        &[0, 1],
        vec![Node::text("XY").with_attribute("bold", true), Node::element("softBreak")],
        1,
    );
    doc.apply_operation(&op).unwrap();
    assert_ne!(doc.root_content("main"), before);

    doc.apply_operation(&op.inverse()).unwrap();
    assert_eq!(doc.root_content("main"), before);
}

#[test]
fn test_attribute_inverse_restores_tree() {
    let mut doc = document();
    doc.apply_operation(&insert(&[0], vec![Node::text("abc").with_attribute("color", "red")], 0))
        .unwrap();
    let before = doc.root_content("main");

    let op = Operation::new(
        OperationKind::Attribute {
            range: Range::new(Position::at("main", 1), Position::at("main", 2)),
            key: "color".into(),
            old_value: Some(json!("red")),
            new_value: Some(json!("blue")),
        },
        Some(1),
    );
    doc.apply_operation(&op).unwrap();
    doc.apply_operation(&op.inverse()).unwrap();
    assert_eq!(doc.root_content("main"), before);
}

#[test]
fn test_position_order_is_total() {
    let paths: Vec<Vec<usize>> = vec![
        vec![0],
        vec![0, 0],
        vec![0, 3],
        vec![1],
        vec![1, 2, 0],
        vec![1, 2, 5],
        vec![2],
        vec![2, 0],
    ];
    let positions: Vec<Position> = paths.into_iter().map(|p| Position::new("main", p)).collect();

    for p in &positions {
        for q in &positions {
            let relations = [p.is_before(q), p == q, p.is_after(q)];
            assert_eq!(relations.iter().filter(|r| **r).count(), 1, "{p} vs {q}");
            for r in &positions {
                if p.is_before(q) && q.is_before(r) {
                    assert!(p.is_before(r));
                }
            }
        }
    }
    assert_eq!(
        Position::at("main", 0).compare(&Position::at("other", 0)),
        PositionRelation::Different
    );
}

#[test]
fn test_flush_without_operations_is_empty() {
    let mut model = Model::new();
    model.document_mut().create_root("$root", "main").unwrap();
    assert!(model.document_mut().flush_changes().is_empty());
    assert!(model.document_mut().flush_changes().is_empty());
}

#[test]
fn test_schema_is_closed_world() {
    let schema = Schema::with_base_items();
    let context = SchemaContext::from_names(["$root"]);
    assert!(!schema.check_child(&context, "unknownWidget"));
    assert!(!schema.check_child(&context, "$text"));
    assert!(schema.check_child(&context, "$block"));
}
