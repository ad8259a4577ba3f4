//! Integration tests for the editor crate
//!
//! This tests:
//! - block widgets with nested editable parts converted in both directions
//! - attribute-to-class conversion on a widget element
//! - undo and redo through the command collection, over several steps
//! - the incrementally patched editing view staying equal to the data
//! - toggling a text attribute with the attribute command
//! - recording operations and replaying them into another editor
//! - lifecycle errors after destroy

use folio_conversion::{ModelValue, UpcastAttributeToAttribute, ViewElementDefinition};
use folio_conversion::AttributeToAttribute;
use folio_common::{ErrorCode, Priority};
use folio_editor::{
    AttributeCommand, Editor, EditorConfig, EditorError, OperationReplayer, ReplayStatus, LOG_SEPARATOR,
};
use folio_model::{Node, Position, Range, SchemaItemDefinition};
use folio_view::{stringify_children, MatcherPattern};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SIMPLE_BOX: &str = concat!(
    r#"<section class="simple-box">"#,
    r#"<h1 class="simple-box-title"></h1>"#,
    r#"<div class="simple-box-description"><p></p></div>"#,
    "</section>"
);

fn editor() -> Editor {
    Editor::new(EditorConfig::default()).unwrap()
}

fn simple_box_editor() -> Editor {
    let mut editor = editor();
    let schema = editor.schema_mut();
    schema.register(
        "simpleBox",
        SchemaItemDefinition::new()
            .allow_where("$block")
            .object()
            .allow_attributes(["secret"]),
    );
    schema.register(
        "simpleBoxTitle",
        SchemaItemDefinition::new()
            .allow_in(["simpleBox"])
            .limit()
            .allow_content_of("$block"),
    );
    schema.register(
        "simpleBoxDescription",
        SchemaItemDefinition::new()
            .allow_in(["simpleBox"])
            .limit()
            .allow_content_of("$root"),
    );

    let conversion = editor.conversion_mut();
    conversion.element_to_element("simpleBox", ViewElementDefinition::new("section").with_class("simple-box"));
    conversion.element_to_element("simpleBoxTitle", ViewElementDefinition::new("h1").with_class("simple-box-title"));
    conversion.element_to_element(
        "simpleBoxDescription",
        ViewElementDefinition::new("div").with_class("simple-box-description"),
    );
    editor
}

fn insert_simple_box(editor: &mut Editor) {
    editor
        .change(|writer| {
            let simple_box = Node::element("simpleBox")
                .with_child(Node::element("simpleBoxTitle"))
                .with_child(Node::element("simpleBoxDescription").with_child(Node::element("paragraph")));
            writer.insert(vec![simple_box], &Position::at("main", 0))?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_simple_box_downcast_and_upcast() {
    let mut editor = simple_box_editor();
    insert_simple_box(&mut editor);
    assert_eq!(editor.get_data("main").unwrap(), SIMPLE_BOX);

    let mut other = simple_box_editor();
    other.set_data(SIMPLE_BOX, "main").unwrap();
    assert_eq!(
        other.model().document().root_content("main"),
        editor.model().document().root_content("main")
    );
    assert_eq!(other.get_data("main").unwrap(), SIMPLE_BOX);
}

#[test]
fn test_simple_box_secret_class() {
    let mut editor = simple_box_editor();
    editor
        .conversion_mut()
        .for_downcast("downcast")
        .unwrap()
        .attribute_to_attribute(AttributeToAttribute::class("secret", "secret").on_element("simpleBox"));
    editor
        .conversion_mut()
        .for_upcast()
        .attribute_to_attribute(UpcastAttributeToAttribute::new(
            MatcherPattern::name("section").with_class("secret"),
            "secret",
            ModelValue::Fixed(true.into()),
        ));

    insert_simple_box(&mut editor);
    editor
        .change(|writer| {
            let simple_box = writer.tree().node_at_path("main", &[0]).expect("simple box");
            writer.set_attribute_on("secret", Value::Bool(true), simple_box)?;
            Ok(())
        })
        .unwrap();

    let data = editor.get_data("main").unwrap();
    assert!(data.starts_with(r#"<section class="simple-box secret">"#), "{data}");

    let mut other = simple_box_editor();
    other
        .conversion_mut()
        .for_upcast()
        .attribute_to_attribute(UpcastAttributeToAttribute::new(
            MatcherPattern::name("section").with_class("secret"),
            "secret",
            ModelValue::Fixed(true.into()),
        ));
    other.set_data(&data, "main").unwrap();
    let content = other.model().document().root_content("main");
    assert_eq!(content[0].attributes().get("secret"), Some(&Value::Bool(true)));
}

#[test]
fn test_undo_and_redo() {
    let mut editor = editor();
    editor.set_data("<p>foo</p>", "main").unwrap();
    assert!(!editor.command_state("undo").unwrap().is_enabled);

    editor
        .change(|writer| {
            writer.insert_text("bar", Default::default(), &Position::new("main", vec![0, 3]))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>foobar</p>");

    editor.execute("undo", Value::Null).unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>foo</p>");
    assert!(editor.command_state("redo").unwrap().is_enabled);

    editor.execute("redo", Value::Null).unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>foobar</p>");
    assert!(!editor.command_state("redo").unwrap().is_enabled);
}

fn remove_block(editor: &mut Editor, index: usize) {
    editor
        .change(|writer| {
            let range = Range::new(Position::new("main", vec![index]), Position::new("main", vec![index + 1]));
            writer.remove(&range)
        })
        .unwrap();
}

fn merge_at(editor: &mut Editor, index: usize) {
    editor
        .change(|writer| writer.merge(&Position::new("main", vec![index])))
        .unwrap();
}

fn run(editor: &mut Editor, command: &str, times: usize) {
    for _ in 0..times {
        editor.execute(command, Value::Null).unwrap();
    }
}

#[test]
fn test_undo_two_removals() {
    let mut editor = editor();
    editor.set_data("<p>a</p><p>b</p><p>c</p>", "main").unwrap();
    remove_block(&mut editor, 0);
    remove_block(&mut editor, 0);
    assert_eq!(editor.get_data("main").unwrap(), "<p>c</p>");

    run(&mut editor, "undo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>b</p><p>c</p>");
    run(&mut editor, "undo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>a</p><p>b</p><p>c</p>");

    run(&mut editor, "redo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>c</p>");
    run(&mut editor, "undo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>a</p><p>b</p><p>c</p>");
}

#[test]
fn test_undo_split_then_merge() {
    let mut editor = editor();
    editor.set_data("<p>abcd</p><p>ef</p>", "main").unwrap();
    editor
        .change(|writer| writer.split(&Position::new("main", vec![0, 2]), None))
        .unwrap();
    merge_at(&mut editor, 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>ab</p><p>cdef</p>");

    run(&mut editor, "undo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>ab</p><p>cd</p><p>ef</p>");
    run(&mut editor, "undo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>abcd</p><p>ef</p>");

    run(&mut editor, "redo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>ab</p><p>cd</p><p>ef</p>");
    run(&mut editor, "redo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>ab</p><p>cdef</p>");
}

#[test]
fn test_undo_two_merges() {
    let mut editor = editor();
    editor.set_data("<p>ab</p><p>cd</p><p>ef</p>", "main").unwrap();
    merge_at(&mut editor, 1);
    merge_at(&mut editor, 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>abcdef</p>");

    run(&mut editor, "undo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>ab</p><p>cd</p><p>ef</p>");
    run(&mut editor, "redo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>abcdef</p>");
}

#[test]
fn test_undo_restores_removed_content_after_undone_insertion() {
    let mut editor = editor();
    editor.set_data("<p>foo</p><p>bar</p>", "main").unwrap();
    remove_block(&mut editor, 1);
    editor
        .change(|writer| {
            writer.insert_text("!", Default::default(), &Position::new("main", vec![0, 3]))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>foo!</p>");

    // The undone "!" now sits in the graveyard in front of the removed paragraph.
    run(&mut editor, "undo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>foo</p><p>bar</p>");
}

#[test]
fn test_undo_after_later_batch_was_undone_and_redone() {
    let mut editor = editor();
    editor.set_data("<p>a</p><p>b</p><p>c</p>", "main").unwrap();
    remove_block(&mut editor, 2);
    remove_block(&mut editor, 0);
    run(&mut editor, "undo", 1);
    run(&mut editor, "redo", 1);
    assert_eq!(editor.get_data("main").unwrap(), "<p>b</p>");

    run(&mut editor, "undo", 2);
    assert_eq!(editor.get_data("main").unwrap(), "<p>a</p><p>b</p><p>c</p>");
}

fn assert_view_matches_data(editor: &Editor) {
    let view = editor.editing().view();
    let root = view.root("main").unwrap();
    assert_eq!(stringify_children(view, root), editor.get_data("main").unwrap());
}

#[test]
fn test_editing_view_follows_model_changes() {
    let mut editor = editor();
    editor
        .schema_mut()
        .extend("$text", SchemaItemDefinition::new().allow_attributes(["bold"]))
        .unwrap();
    editor
        .conversion_mut()
        .attribute_to_element("bold", ViewElementDefinition::new("strong"));
    editor.set_data("<p>foo</p><p>bar</p>", "main").unwrap();
    assert_view_matches_data(&editor);

    editor
        .change(|writer| {
            let range = Range::new(Position::new("main", vec![0, 0]), Position::new("main", vec![0, 2]));
            writer.set_attribute("bold", Value::Bool(true), &range)
        })
        .unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p><strong>fo</strong>o</p><p>bar</p>");
    assert_view_matches_data(&editor);

    editor
        .change(|writer| {
            writer.insert_text("x", Default::default(), &Position::new("main", vec![0, 1]))?;
            Ok(())
        })
        .unwrap();
    assert_view_matches_data(&editor);

    editor
        .change(|writer| {
            let range = Range::new(Position::new("main", vec![0, 0]), Position::new("main", vec![0, 2]));
            writer.remove(&range)
        })
        .unwrap();
    assert_view_matches_data(&editor);

    editor
        .change(|writer| writer.split(&Position::new("main", vec![1, 1]), None))
        .unwrap();
    assert_view_matches_data(&editor);

    merge_at(&mut editor, 1);
    assert_view_matches_data(&editor);

    for command in ["undo", "undo", "undo", "redo", "redo", "undo"] {
        run(&mut editor, command, 1);
        assert_view_matches_data(&editor);
    }
}

#[test]
fn test_attribute_command_toggles_bold() {
    let mut editor = editor();
    editor
        .schema_mut()
        .extend("$text", SchemaItemDefinition::new().allow_attributes(["bold"]))
        .unwrap();
    editor
        .conversion_mut()
        .attribute_to_element("bold", ViewElementDefinition::new("strong"));
    editor.commands_mut().add("bold", AttributeCommand::new("bold"));

    let executed = Arc::new(Mutex::new(Vec::new()));
    let log = executed.clone();
    editor.commands_mut().on_execute(Priority::NORMAL, move |event| {
        log.lock().unwrap().push(event.command.clone());
    });

    editor.set_data("<p>foo</p>", "main").unwrap();
    editor
        .change(|writer| {
            let range = Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![0, 2]));
            writer.set_selection(vec![range], false)
        })
        .unwrap();
    assert_eq!(editor.command_state("bold").unwrap().value, None);

    editor.execute("bold", Value::Null).unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>f<strong>o</strong>o</p>");
    assert_eq!(editor.command_state("bold").unwrap().value, Some(Value::Bool(true)));

    editor.execute("bold", json!({ "forceValue": false })).unwrap();
    assert_eq!(editor.get_data("main").unwrap(), "<p>foo</p>");
    assert_eq!(*executed.lock().unwrap(), vec!["bold", "bold"]);
}

#[test]
fn test_recorded_operations_replay_into_another_editor() {
    let mut source = editor();
    source.start_recording();
    source.set_data("<p>foo</p>", "main").unwrap();
    source
        .change(|writer| {
            writer.insert_text("!", Default::default(), &Position::new("main", vec![0, 3]))?;
            Ok(())
        })
        .unwrap();
    let log = source.recorder().unwrap().log();
    assert!(log.contains(LOG_SEPARATOR));

    let mut target = editor();
    let mut replayer = OperationReplayer::parse(&log).unwrap();
    let applied = replayer.apply_all(&mut target).unwrap();
    assert_eq!(applied, replayer.len());
    assert_eq!(target.get_data("main").unwrap(), "<p>foo!</p>");
    // Replayed changes are not undoable.
    assert!(!target.undo_stack().can_undo());
}

#[test]
fn test_replay_into_diverged_editor_fails() {
    let mut source = editor();
    source.start_recording();
    source.set_data("<p>foo</p>", "main").unwrap();
    let log = source.recorder().unwrap().log();

    let mut target = editor();
    target.set_data("<p>bar</p>", "main").unwrap();
    let error = OperationReplayer::parse(&log)
        .unwrap()
        .apply_all(&mut target)
        .unwrap_err();
    assert_eq!(error.code(), "model-document-applyOperation-wrong-version");
    assert_eq!(target.get_data("main").unwrap(), "<p>bar</p>");
}

#[tokio::test]
async fn test_play_applies_operations_over_time() {
    let mut source = editor();
    source.start_recording();
    source.set_data("<p>a</p>", "main").unwrap();
    for (offset, letter) in ["b", "c"].into_iter().enumerate() {
        source
            .change(|writer| {
                writer.insert_text(letter, Default::default(), &Position::new("main", vec![0, offset + 1]))?;
                Ok(())
            })
            .unwrap();
    }
    let log = source.recorder().unwrap().log();

    let mut target = editor();
    let mut replayer = OperationReplayer::parse(&log).unwrap();
    let (_cancel, cancel_rx) = tokio::sync::watch::channel(false);
    let outcome = replayer
        .play(&mut target, Duration::from_millis(1), cancel_rx)
        .await
        .unwrap();
    assert_eq!(outcome.status, ReplayStatus::Finished);
    assert_eq!(outcome.applied, replayer.len());
    assert_eq!(target.get_data("main").unwrap(), "<p>abc</p>");
}

#[tokio::test]
async fn test_play_stops_when_cancelled() {
    let mut source = editor();
    source.start_recording();
    source.set_data("<p>a</p>", "main").unwrap();
    let log = source.recorder().unwrap().log();

    let mut target = editor();
    let mut replayer = OperationReplayer::parse(&log).unwrap();
    let (cancel, cancel_rx) = tokio::sync::watch::channel(false);
    cancel.send(true).unwrap();
    let outcome = replayer
        .play(&mut target, Duration::from_millis(1), cancel_rx)
        .await
        .unwrap();
    assert_eq!(outcome.status, ReplayStatus::Cancelled);
    assert_eq!(outcome.applied, 0);
    assert_eq!(replayer.remaining(), replayer.len());
}

#[test]
fn test_destroyed_editor_rejects_calls() {
    let mut editor = editor();
    editor.destroy();
    assert!(matches!(editor.get_data("main"), Err(EditorError::Destroyed)));
    assert!(matches!(editor.set_data("<p>x</p>", "main"), Err(EditorError::Destroyed)));
    let result = editor.change(|_| Ok(()));
    assert!(matches!(result, Err(EditorError::Destroyed)));
    assert_eq!(EditorError::Destroyed.code(), "editor-destroyed");
}

#[test]
fn test_unknown_root() {
    let mut editor = editor();
    let error = editor.set_data("<p>x</p>", "sidebar").unwrap_err();
    assert_eq!(error.code(), "datacontroller-get-non-existent-root");
}
