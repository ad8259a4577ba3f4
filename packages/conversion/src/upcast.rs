//! # Upcast dispatcher
//!
//! Turns view content into model nodes. Every view node fires one event,
//! `text` for text and `element:<name>` for elements (which also reaches
//! the generic `element` listeners). Handlers read the node, consume the
//! parts they understand and leave their result in [`UpcastData::output`].
//!
//! The dispatcher keeps a schema context of the model elements being
//! built, so converters only create content the schema accepts there.
//! Content nobody claims is unwrapped: its children are converted in the
//! parent's place.

use crate::consumable::ViewConsumable;
use crate::error::ConversionResult;
use crate::registry::HandlerTable;
use folio_common::Priority;
use folio_model::{normalize_nodes, Node, Schema, SchemaContext, TEXT_NAME};
use folio_view::{ViewNodeId, ViewTree};
use std::sync::Arc;
use tracing::debug;

pub type UpcastHandler = Arc<dyn Fn(&mut UpcastData, &mut UpcastApi<'_>) -> ConversionResult<()> + Send + Sync>;

/// Event payload: the view node being converted and the model nodes
/// produced for it so far.
#[derive(Debug)]
pub struct UpcastData {
    pub view_item: ViewNodeId,
    pub output: Option<Vec<Node>>,
}

pub struct UpcastApi<'a> {
    pub view: &'a ViewTree,
    pub schema: &'a Schema,
    pub consumable: ViewConsumable,
    context: Vec<String>,
    dispatcher: &'a UpcastDispatcher,
}

impl UpcastApi<'_> {
    /// Schema context of the model element currently being filled.
    pub fn context(&self) -> SchemaContext {
        SchemaContext::from_names(self.context.iter().cloned())
    }

    pub fn check_child(&self, name: &str) -> bool {
        self.schema.check_child(&self.context(), name)
    }

    pub fn convert_item(&mut self, id: ViewNodeId) -> ConversionResult<Vec<Node>> {
        let dispatcher = self.dispatcher;
        dispatcher.convert_node(id, self)
    }

    /// Converts the children of `parent`. With `model` set the children are
    /// checked against the context of that model element.
    pub fn convert_children(&mut self, parent: ViewNodeId, model: Option<&str>) -> ConversionResult<Vec<Node>> {
        if let Some(name) = model {
            self.context.push(name.to_string());
        }
        let view = self.view;
        let mut result = Ok(Vec::new());
        for child in view.children(parent) {
            match self.convert_item(*child) {
                Ok(nodes) => {
                    if let Ok(all) = &mut result {
                        all.extend(nodes);
                    }
                }
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        if model.is_some() {
            self.context.pop();
        }
        result.map(normalize_nodes)
    }
}

#[derive(Clone, Default)]
pub struct UpcastDispatcher {
    handlers: HandlerTable<UpcastHandler>,
}

impl std::fmt::Debug for UpcastDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcastDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl UpcastDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the text converter and the unwrapping element
    /// fallback registered at the lowest priority.
    pub fn with_core_converters() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.on("text", Priority::LOWEST, text_handler());
        dispatcher.on("element", Priority::LOWEST, unwrap_handler());
        dispatcher
    }

    pub fn on(&mut self, event: &str, priority: Priority, handler: UpcastHandler) {
        self.handlers.add(event, priority, handler);
    }

    /// Converts view nodes into model nodes placed in `context`.
    pub fn convert(
        &self,
        view: &ViewTree,
        items: &[ViewNodeId],
        schema: &Schema,
        context: &[&str],
    ) -> ConversionResult<Vec<Node>> {
        let mut consumable = ViewConsumable::new();
        for id in items {
            consumable.add_subtree(view, *id);
        }
        let mut api = UpcastApi {
            view,
            schema,
            consumable,
            context: context.iter().map(|name| name.to_string()).collect(),
            dispatcher: self,
        };
        let mut nodes = Vec::new();
        for id in items {
            nodes.extend(self.convert_node(*id, &mut api)?);
        }
        Ok(normalize_nodes(nodes))
    }

    fn convert_node(&self, id: ViewNodeId, api: &mut UpcastApi<'_>) -> ConversionResult<Vec<Node>> {
        let event = if api.view.is_text(id) {
            "text".to_string()
        } else {
            format!("element:{}", api.view.name(id))
        };
        let mut data = UpcastData {
            view_item: id,
            output: None,
        };
        for handler in self.handlers.listeners(&event) {
            if api.consumable.is_consumed(id) {
                break;
            }
            handler(&mut data, api)?;
        }
        Ok(data.output.unwrap_or_default())
    }
}

/// Keeps text where the schema allows it. Text that does not fit is
/// wrapped in a paragraph when one is allowed, and dropped otherwise.
fn text_handler() -> UpcastHandler {
    Arc::new(|data, api| {
        let id = data.view_item;
        if api.consumable.test_name(id) != Some(true) {
            return Ok(());
        }
        let text = api.view.text(id).unwrap_or_default().to_string();
        api.consumable.consume_name(id);
        if api.check_child(TEXT_NAME) {
            data.output = Some(vec![Node::text(text)]);
            return Ok(());
        }
        if text.trim().is_empty() {
            data.output = Some(Vec::new());
            return Ok(());
        }
        let paragraph = api.context().push("paragraph");
        if api.check_child("paragraph") && api.schema.check_child(&paragraph, TEXT_NAME) {
            data.output = Some(vec![Node::element("paragraph").with_child(Node::text(text))]);
        } else {
            debug!(context = ?api.context.last(), "Dropped text the schema does not allow");
            data.output = Some(Vec::new());
        }
        Ok(())
    })
}

/// Replaces an unclaimed element by its converted children.
fn unwrap_handler() -> UpcastHandler {
    Arc::new(|data, api| {
        if data.output.is_some() {
            return Ok(());
        }
        let id = data.view_item;
        api.consumable.consume_name(id);
        data.output = Some(api.convert_children(id, None)?);
        Ok(())
    })
}
