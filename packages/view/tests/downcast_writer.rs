//! Downcast writer behavior
//!
//! This tests:
//! - Insertion into attribute elements breaks them
//! - Wrapping merges with neighbouring similar attribute elements
//! - Wrapper nesting follows priorities
//! - Unwrapping and removal restore merged text

use folio_view::{stringify_children, DowncastWriter, ElementKind, ViewPosition, ViewRange, ViewTree};

fn paragraph(tree: &mut ViewTree, text: &str) -> (folio_view::ViewNodeId, folio_view::ViewNodeId, folio_view::ViewNodeId) {
    let root = tree.create_root("main", "div").unwrap();
    let p = tree.create_element("p", ElementKind::Container);
    let t = tree.create_text(text);
    tree.append_child(p, t).unwrap();
    tree.append_child(root, p).unwrap();
    (root, p, t)
}

#[test]
fn test_insert_text_merges_with_neighbours() {
    let mut tree = ViewTree::new();
    let (root, _, text) = paragraph(&mut tree, "ab");
    let mut writer = DowncastWriter::new(&mut tree);
    let x = writer.create_text("X");
    let range = writer.insert(ViewPosition::new(text, 1), vec![x]).unwrap();

    assert_eq!(stringify_children(&tree, root), "<p>aXb</p>");
    assert_eq!(range.start.offset, 1);
    assert_eq!(range.end.offset, 2);
    assert_eq!(range.start.parent, range.end.parent);
}

#[test]
fn test_wrap_and_merge_attribute_elements() {
    let mut tree = ViewTree::new();
    let (root, p, text) = paragraph(&mut tree, "abcd");
    let mut writer = DowncastWriter::new(&mut tree);

    let bold = writer.create_attribute_element("b", &[], None, None);
    writer
        .wrap(ViewRange::new(ViewPosition::new(text, 1), ViewPosition::new(text, 2)), bold)
        .unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p>a<b>b</b>cd</p>");

    let range = ViewRange::new(ViewPosition::new(p, 2), ViewPosition::new(p, 3));
    let bold = writer.create_attribute_element("b", &[], None, None);
    writer.wrap(range, bold).unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p>a<b>bcd</b></p>");
}

#[test]
fn test_lower_priority_wraps_outside() {
    let mut tree = ViewTree::new();
    let (root, p, _) = paragraph(&mut tree, "ab");
    let mut writer = DowncastWriter::new(&mut tree);

    let strong = writer.create_attribute_element("strong", &[], Some(10), None);
    writer.wrap(ViewRange::in_element(writer.tree(), p), strong).unwrap();
    let link = writer.create_attribute_element("a", &[("href", "x")], Some(5), None);
    writer.wrap(ViewRange::in_element(writer.tree(), p), link).unwrap();
    assert_eq!(stringify_children(writer.tree(), root), r#"<p><a href="x"><strong>ab</strong></a></p>"#);

    let em = writer.create_attribute_element("em", &[], Some(20), None);
    writer.wrap(ViewRange::in_element(writer.tree(), p), em).unwrap();
    assert_eq!(
        stringify_children(writer.tree(), root),
        r#"<p><a href="x"><strong><em>ab</em></strong></a></p>"#
    );
}

#[test]
fn test_unwrap_restores_plain_text() {
    let mut tree = ViewTree::new();
    let (root, p, text) = paragraph(&mut tree, "abc");
    let mut writer = DowncastWriter::new(&mut tree);

    let bold = writer.create_attribute_element("b", &[], None, None);
    writer
        .wrap(ViewRange::new(ViewPosition::new(text, 0), ViewPosition::new(text, 3)), bold)
        .unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p><b>abc</b></p>");

    let template = writer.create_attribute_element("b", &[], None, None);
    writer.unwrap(ViewRange::in_element(writer.tree(), p), template).unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p>abc</p>");
    assert_eq!(writer.tree().children(p).len(), 1);
}

#[test]
fn test_insert_inside_attribute_element_breaks_it() {
    let mut tree = ViewTree::new();
    let (root, p, text) = paragraph(&mut tree, "ab");
    let mut writer = DowncastWriter::new(&mut tree);
    let bold = writer.create_attribute_element("b", &[], None, None);
    writer
        .wrap(ViewRange::new(ViewPosition::new(text, 0), ViewPosition::new(text, 2)), bold)
        .unwrap();

    let b = writer.tree().children(p)[0];
    let inner_text = writer.tree().children(b)[0];
    let image = writer.create_empty_element("img", &[("src", "x.png")]);
    writer.insert(ViewPosition::new(inner_text, 1), vec![image]).unwrap();
    assert_eq!(
        stringify_children(writer.tree(), root),
        r#"<p><b>a</b><img src="x.png"><b>b</b></p>"#
    );
}

#[test]
fn test_remove_merges_what_touches() {
    let mut tree = ViewTree::new();
    let (root, p, _) = paragraph(&mut tree, "ab");
    let mut writer = DowncastWriter::new(&mut tree);
    let br = writer.create_empty_element("br", &[]);
    let tail = writer.create_text("cd");
    writer.insert(ViewPosition::at_end(writer.tree(), p), vec![br, tail]).unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p>ab<br>cd</p>");

    let removed = writer
        .remove(ViewRange::new(ViewPosition::new(p, 1), ViewPosition::new(p, 2)))
        .unwrap();
    assert_eq!(removed, vec![br]);
    assert_eq!(stringify_children(writer.tree(), root), "<p>abcd</p>");
    assert_eq!(writer.tree().children(p).len(), 1);
}

#[test]
fn test_move_range_to_other_container() {
    let mut tree = ViewTree::new();
    let (root, p, _) = paragraph(&mut tree, "ab");
    let second = tree.create_element("p", ElementKind::Container);
    tree.append_child(root, second).unwrap();
    let mut writer = DowncastWriter::new(&mut tree);

    writer
        .move_range(ViewRange::in_element(writer.tree(), p), ViewPosition::at_start(second))
        .unwrap();
    assert_eq!(stringify_children(writer.tree(), root), "<p></p><p>ab</p>");
}
