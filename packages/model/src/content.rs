//! Schema-aware content helpers built on top of the writer.

use crate::error::ModelResult;
use crate::node::{Attributes, Node, TEXT_NAME};
use crate::position::Position;
use crate::range::Range;
use crate::schema::{Schema, SchemaContext};
use crate::tree::{Item, NodeId, Tree};
use crate::writer::Writer;
use tracing::debug;

/// Inserts `nodes` at `position`, respecting the schema.
///
/// Each node goes where the schema allows it: at the position itself, or
/// after splitting ancestors up to the nearest allowed parent. Elements
/// that fit nowhere are replaced by their children; text that fits nowhere
/// is wrapped in a paragraph when possible and dropped otherwise.
/// Attributes the schema refuses are stripped from text.
///
/// Returns the range from the insertion point to the end of what was
/// inserted.
pub fn insert_content(writer: &mut Writer<'_>, nodes: Vec<Node>, position: &Position) -> ModelResult<Range> {
    let start = position.clone();
    let mut position = position.clone();
    for node in nodes {
        position = insert_node(writer, node, position)?;
    }
    Ok(Range::new(start, position))
}

fn insert_node(writer: &mut Writer<'_>, node: Node, position: Position) -> ModelResult<Position> {
    let name = node.name().to_string();

    if writer.schema().check_child_at(writer.tree(), &position, &name) {
        let node = strip_disallowed_attributes(writer.schema(), writer.tree(), &position, node)?;
        let range = writer.insert(vec![node], &position)?;
        return Ok(range.end);
    }

    if node.is_text() {
        if writer.schema().check_child_at(writer.tree(), &position, "paragraph")
            && writer
                .schema()
                .check_child(&SchemaContext::from_names(["$root", "paragraph"]), TEXT_NAME)
        {
            let paragraph = Node::element("paragraph").with_child(node);
            let range = writer.insert(vec![paragraph], &position)?;
            return Ok(range.end);
        }
        debug!(%position, "Dropped text not allowed at position");
        return Ok(position);
    }

    let parent = writer.tree().resolve_parent(&position)?;
    if let Some(allowed) = writer.schema().find_allowed_parent(writer.tree(), &position, &name) {
        if allowed != parent && can_split_up_to(writer.schema(), writer.tree(), parent, allowed) {
            let split = writer.split(&position, Some(allowed))?;
            let range = writer.insert(vec![node], &split.position)?;
            return Ok(range.end);
        }
    }

    debug!(element = %name, "Unwrapping element not allowed at position");
    let mut position = position;
    for child in node.children().to_vec() {
        position = insert_node(writer, child, position)?;
    }
    Ok(position)
}

/// Elements between `from` (included) and `limit` (excluded) may be split.
fn can_split_up_to(schema: &Schema, tree: &Tree, from: NodeId, limit: NodeId) -> bool {
    let mut current = Some(from);
    while let Some(id) = current {
        if id == limit {
            return true;
        }
        if schema.is_limit(tree.name(id)) || tree.is_root(id) {
            return false;
        }
        current = tree.parent(id);
    }
    false
}

fn strip_disallowed_attributes(schema: &Schema, tree: &Tree, position: &Position, mut node: Node) -> ModelResult<Node> {
    if !node.is_text() {
        return Ok(node);
    }
    let context = SchemaContext::from_position(tree, position)?.push(TEXT_NAME);
    let allowed: Attributes = node
        .attributes()
        .iter()
        .filter(|(key, _)| schema.check_attribute(&context, key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    *node.attributes_mut() = allowed;
    Ok(node)
}

/// Removes the content of `range` and merges the blocks it started and
/// ended in, unless either is a limit element. Returns the position where
/// the content was.
pub fn delete_content(writer: &mut Writer<'_>, range: &Range) -> ModelResult<Position> {
    if range.is_collapsed() {
        return Ok(range.start.clone());
    }
    let start_parent = writer.tree().resolve_parent(&range.start)?;
    let end_parent = writer.tree().resolve_parent(&range.end)?;

    writer.remove(range)?;

    if start_parent != end_parent && writer.tree().parent(start_parent) == writer.tree().parent(end_parent) {
        let schema = writer.schema();
        let tree = writer.tree();
        let mergeable = !schema.is_limit(tree.name(start_parent))
            && !schema.is_limit(tree.name(end_parent))
            && tree.index(end_parent).zip(tree.index(start_parent)).map(|(e, s)| e == s + 1) == Some(true);
        if mergeable {
            let between = writer.tree().position_after(start_parent)?;
            writer.merge(&between)?;
        }
    }
    Ok(range.start.clone())
}

/// Deletes the selected content and collapses the selection where it was.
pub fn delete_selection_content(writer: &mut Writer<'_>) -> ModelResult<()> {
    let Some(range) = writer.document().selection().first_range().cloned() else {
        return Ok(());
    };
    let position = delete_content(writer, &range)?;
    writer.set_selection_to(&position)
}

/// Flat parts of `range` whose items may carry `key`.
pub fn valid_ranges_for_attribute(schema: &Schema, tree: &Tree, range: &Range, key: &str) -> ModelResult<Vec<Range>> {
    let mut ranges: Vec<Range> = Vec::new();
    for item in tree.items(range, true)? {
        let allowed = match &item {
            Item::Element(id) => schema.check_attribute_on(tree, *id, key),
            Item::Text(proxy) => schema.check_attribute(&SchemaContext::from_node(tree, proxy.parent).push(TEXT_NAME), key),
        };
        if !allowed {
            continue;
        }
        let item_range = item.range(tree)?;
        match ranges.last_mut() {
            Some(last) if last.end == item_range.start => last.end = item_range.end,
            _ => ranges.push(item_range),
        }
    }
    Ok(ranges)
}

/// Whether `key` may be set somewhere in `range`. For a collapsed range the
/// caret's text context is checked.
pub fn is_attribute_allowed_in(schema: &Schema, tree: &Tree, range: &Range, key: &str) -> bool {
    if range.is_collapsed() {
        return SchemaContext::from_position(tree, &range.start)
            .map(|context| schema.check_attribute(&context.push(TEXT_NAME), key))
            .unwrap_or(false);
    }
    valid_ranges_for_attribute(schema, tree, range, key)
        .map(|ranges| !ranges.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::schema::SchemaItemDefinition;

    fn model() -> Model {
        let mut model = Model::new();
        let schema = model.schema_mut();
        schema.register("paragraph", SchemaItemDefinition::new().inherit_all_from("$block"));
        schema.register("blockQuote", SchemaItemDefinition::new().allow_where("$block").allow_content_of("$root"));
        schema.register("caption", SchemaItemDefinition::new().allow_in(["$root"]).allow_content_of("$block").limit());
        schema.extend("$text", SchemaItemDefinition::new().allow_attributes(["bold"])).unwrap();
        model.document_mut().create_root("$root", "main").unwrap();
        model
    }

    fn paragraph(text: &str) -> Node {
        Node::element("paragraph").with_child(Node::text(text))
    }

    fn load(model: &mut Model, content: Vec<Node>) {
        let root = model.document().get_root("main").unwrap();
        model.change(|writer| writer.append(content, root).map(|_| ())).unwrap();
    }

    #[test]
    fn test_insert_paragraph_splits_paragraph() {
        let mut model = model();
        load(&mut model, vec![paragraph("abcd")]);
        model
            .change(|writer| insert_content(writer, vec![paragraph("X")], &Position::new("main", vec![0, 2])))
            .unwrap();
        assert_eq!(
            model.document().root_content("main"),
            vec![paragraph("ab"), paragraph("X"), paragraph("cd")]
        );
    }

    #[test]
    fn test_text_at_root_is_wrapped_in_paragraph() {
        let mut model = model();
        model
            .change(|writer| insert_content(writer, vec![Node::text("hi")], &Position::at("main", 0)))
            .unwrap();
        assert_eq!(model.document().root_content("main"), vec![paragraph("hi")]);
    }

    #[test]
    fn test_disallowed_attributes_are_stripped() {
        let mut model = model();
        load(&mut model, vec![Node::element("paragraph")]);
        let text = Node::text("x").with_attribute("bold", true).with_attribute("italic", true);
        model
            .change(|writer| insert_content(writer, vec![text], &Position::new("main", vec![0, 0])))
            .unwrap();
        assert_eq!(
            model.document().root_content("main"),
            vec![Node::element("paragraph").with_child(Node::text("x").with_attribute("bold", true))]
        );
    }

    #[test]
    fn test_unknown_element_is_unwrapped() {
        let mut model = model();
        load(&mut model, vec![paragraph("ab")]);
        let unknown = Node::element("span").with_child(Node::text("Z"));
        model
            .change(|writer| insert_content(writer, vec![unknown], &Position::new("main", vec![0, 1])))
            .unwrap();
        assert_eq!(model.document().root_content("main"), vec![paragraph("aZb")]);
    }

    #[test]
    fn test_delete_merges_blocks() {
        let mut model = model();
        load(&mut model, vec![paragraph("foo"), paragraph("bar")]);
        let range = Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![1, 2]));
        let position = model.change(|writer| delete_content(writer, &range)).unwrap();
        assert_eq!(position, Position::new("main", vec![0, 1]));
        assert_eq!(model.document().root_content("main"), vec![paragraph("fr")]);
    }

    #[test]
    fn test_limit_blocks_are_not_merged() {
        let mut model = model();
        let caption = Node::element("caption").with_child(Node::text("bar"));
        load(&mut model, vec![paragraph("foo"), caption]);
        let range = Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![1, 2]));
        model.change(|writer| delete_content(writer, &range)).unwrap();
        assert_eq!(model.document().root_content("main").len(), 2);
    }

    #[test]
    fn test_valid_ranges_for_attribute() {
        let mut model = model();
        load(&mut model, vec![paragraph("foo"), paragraph("bar")]);
        let tree = model.document().tree();
        let range = Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![1, 2]));
        let ranges = valid_ranges_for_attribute(model.schema(), tree, &range, "bold").unwrap();
        assert_eq!(
            ranges,
            vec![
                Range::new(Position::new("main", vec![0, 1]), Position::new("main", vec![0, 3])),
                Range::new(Position::new("main", vec![1, 0]), Position::new("main", vec![1, 2])),
            ]
        );
        assert!(!is_attribute_allowed_in(model.schema(), tree, &range, "italic"));
    }
}
