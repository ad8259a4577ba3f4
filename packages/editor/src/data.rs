//! # Data controller
//!
//! Serializes model content to HTML and back.
//!
//! ```text
//! get_data:  model root ──data downcast──▶ fresh view ──stringify──▶ HTML
//! parse:     HTML ──parse──▶ view fragment ──upcast──▶ model nodes
//! ```
//!
//! Every call works on its own view tree and mapper, so the editing view
//! is never touched. Markers that affect data are rendered as well.

use crate::editing::VIEW_ROOT_ELEMENT;
use crate::errors::{EditorError, EditorResult};
use folio_conversion::{Conversion, DowncastApi, Mapper, ModelConsumable};
use folio_model::{Model, Node, Position, Range, Schema};
use folio_view::{stringify_children, ViewTree};
use tracing::debug;

/// Root used to serialize detached nodes.
const FRAGMENT_ROOT: &str = "$fragment";
const FRAGMENT_ELEMENT: &str = "$documentFragment";

/// HTML of a model root.
pub fn get_data(model: &Model, conversion: &Conversion, root: &str) -> EditorResult<String> {
    let document = model.document();
    let root_id = document
        .get_root(root)
        .ok_or_else(|| EditorError::UnknownRoot(root.to_string()))?;

    let mut view = ViewTree::new();
    let view_root = view.create_root(root, VIEW_ROOT_ELEMENT)?;
    let mut mapper = Mapper::new();
    mapper.bind_elements(root_id, view_root);

    let dispatcher = conversion.data_downcast();
    let range = Range::in_element(document.tree(), root_id)?;
    {
        let mut api = DowncastApi::new(document, &mut view, &mut mapper);
        dispatcher.convert_insert(&range, &mut api)?;
        for marker in document.markers().in_root(root).filter(|marker| marker.affects_data) {
            api.consumable = ModelConsumable::new();
            dispatcher.convert_marker_add(&marker.name, &marker.range, &mut api)?;
        }
    }
    Ok(stringify_children(&view, view_root))
}

/// HTML of detached model nodes.
pub fn stringify(schema: &Schema, conversion: &Conversion, nodes: &[Node]) -> EditorResult<String> {
    let mut scratch = Model::with_schema(schema.clone());
    scratch.document_mut().create_root(FRAGMENT_ELEMENT, FRAGMENT_ROOT)?;
    let nodes = nodes.to_vec();
    scratch.change(move |writer| {
        writer.insert(nodes, &Position::at(FRAGMENT_ROOT, 0))?;
        Ok(())
    })?;
    get_data(&scratch, conversion, FRAGMENT_ROOT)
}

/// Model nodes for an HTML fragment placed in an element named `context`.
pub fn parse(schema: &Schema, conversion: &Conversion, html: &str, context: &str) -> EditorResult<Vec<Node>> {
    let mut view = ViewTree::new();
    let items = folio_view::parse(&mut view, html)?;
    let nodes = conversion.upcast().convert(&view, &items, schema, &[context])?;
    debug!(view_nodes = items.len(), model_nodes = nodes.len(), "Parsed data");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_conversion::ViewElementDefinition;
    use folio_model::SchemaItemDefinition;

    fn setup() -> (Model, Conversion) {
        let mut model = Model::new();
        model
            .schema_mut()
            .register("paragraph", SchemaItemDefinition::new().inherit_all_from("$block"));
        model.document_mut().create_root("$root", "main").unwrap();
        let mut conversion = Conversion::new();
        conversion.element_to_element("paragraph", ViewElementDefinition::new("p"));
        (model, conversion)
    }

    #[test]
    fn test_get_data_of_unknown_root() {
        let (model, conversion) = setup();
        let error = get_data(&model, &conversion, "sidebar").unwrap_err();
        assert!(matches!(error, EditorError::UnknownRoot(root) if root == "sidebar"));
        assert_eq!(get_data(&model, &conversion, "main").unwrap(), "");
    }

    #[test]
    fn test_parse_and_stringify() {
        let (model, conversion) = setup();
        let nodes = parse(model.schema(), &conversion, "<p>One</p>Two", "$root").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::element("paragraph").with_child(Node::text("One")),
                Node::element("paragraph").with_child(Node::text("Two")),
            ]
        );
        assert_eq!(
            stringify(model.schema(), &conversion, &nodes).unwrap(),
            "<p>One</p><p>Two</p>"
        );
    }
}
