//! # Downcast dispatcher
//!
//! Turns model changes into view changes. For every change the dispatcher
//! fires one event per affected item:
//!
//! - `insert:<name>` for each inserted element or text slice, followed by
//!   `attribute:<key>:<name>` for each of its attributes,
//! - `remove:<name>` for removed content,
//! - `attribute:<key>:<name>` for attribute changes,
//! - `addMarker:<marker>` / `removeMarker:<marker>` for markers.
//!
//! Handlers run in priority order until the event's consumable is gone.
//! A change nobody consumes is dropped from the view and logged at debug
//! level. An error from a handler aborts the pass.
//!
//! Changes arrive from the differ ordered so that applying them one after
//! another patches a view that still shows the previous state. Elements
//! registered for reconversion are rendered again from scratch when one of
//! their trigger attributes or children changes.

use crate::consumable::{ConsumableItem, ModelConsumable};
use crate::error::ConversionResult;
use crate::mapper::Mapper;
use crate::registry::HandlerTable;
use folio_common::Priority;
use folio_model::{Changes, DiffItem, Document, Item, NodeId, Position, Range, Schema, Tree, GRAVEYARD, TEXT_NAME};
use folio_view::{DowncastWriter, ViewNodeId, ViewPosition, ViewRange, ViewSelection, ViewTree};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type DowncastHandler = Arc<dyn Fn(&DowncastEvent, &mut DowncastApi<'_>) -> ConversionResult<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum DowncastEvent {
    Insert {
        item: Item,
        range: Range,
    },
    Remove {
        name: String,
        position: Position,
        length: usize,
    },
    Attribute {
        item: Item,
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
    AddMarker {
        name: String,
        range: Range,
    },
    RemoveMarker {
        name: String,
        range: Range,
    },
}

impl DowncastEvent {
    pub fn name(&self, tree: &Tree) -> String {
        match self {
            DowncastEvent::Insert { item, .. } => format!("insert:{}", item_name(item, tree)),
            DowncastEvent::Remove { name, .. } => format!("remove:{name}"),
            DowncastEvent::Attribute { item, key, .. } => format!("attribute:{key}:{}", item_name(item, tree)),
            DowncastEvent::AddMarker { name, .. } => format!("addMarker:{name}"),
            DowncastEvent::RemoveMarker { name, .. } => format!("removeMarker:{name}"),
        }
    }

    /// Consumable a handler has to take to claim this event.
    pub fn consumable(&self) -> (ConsumableItem, String) {
        match self {
            DowncastEvent::Insert { item, .. } => (ConsumableItem::from_item(item), "insert".to_string()),
            DowncastEvent::Remove { position, .. } => (ConsumableItem::Removed(position.clone()), "remove".to_string()),
            DowncastEvent::Attribute { item, key, .. } => (ConsumableItem::from_item(item), format!("attribute:{key}")),
            DowncastEvent::AddMarker { name, .. } => (ConsumableItem::Marker(name.clone()), format!("addMarker:{name}")),
            DowncastEvent::RemoveMarker { name, .. } => {
                (ConsumableItem::Marker(name.clone()), format!("removeMarker:{name}"))
            }
        }
    }
}

fn item_name<'t>(item: &Item, tree: &'t Tree) -> &'t str {
    match item {
        Item::Element(id) => tree.name(*id),
        Item::Text(_) => TEXT_NAME,
    }
}

/// What handlers get to work with during a pass.
pub struct DowncastApi<'a> {
    document: &'a Document,
    pub writer: DowncastWriter<'a>,
    pub mapper: &'a mut Mapper,
    pub consumable: ModelConsumable,
}

impl<'a> DowncastApi<'a> {
    pub fn new(document: &'a Document, view: &'a mut ViewTree, mapper: &'a mut Mapper) -> Self {
        Self {
            document,
            writer: DowncastWriter::new(view),
            mapper,
            consumable: ModelConsumable::new(),
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn tree(&self) -> &'a Tree {
        self.document.tree()
    }

    pub fn view(&self) -> &ViewTree {
        self.writer.tree()
    }

    /// Whether the event is still waiting for a converter.
    pub fn test(&self, event: &DowncastEvent) -> bool {
        let (item, kind) = event.consumable();
        self.consumable.test(&item, &kind) == Some(true)
    }

    pub fn consume(&mut self, event: &DowncastEvent) -> bool {
        let (item, kind) = event.consumable();
        self.consumable.consume(&item, &kind)
    }

    pub fn to_view_position(&self, position: &Position) -> Option<ViewPosition> {
        self.mapper.to_view_position(self.tree(), self.writer.tree(), position)
    }

    pub fn to_view_range(&self, range: &Range) -> Option<ViewRange> {
        self.mapper.to_view_range(self.tree(), self.writer.tree(), range)
    }

    /// Removes view content and drops the bindings of everything removed.
    pub fn remove_view(&mut self, range: ViewRange) -> ConversionResult<Vec<ViewNodeId>> {
        let removed = self.writer.remove(range)?;
        for id in &removed {
            self.unbind_subtree(*id);
        }
        Ok(removed)
    }

    fn unbind_subtree(&mut self, id: ViewNodeId) {
        let children = self.writer.tree().children(id).to_vec();
        self.mapper.unbind_view_element(id);
        for child in children {
            self.unbind_subtree(child);
        }
    }
}

/// Children and attributes of an element whose change re-renders the
/// whole element instead of patching it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerBy {
    pub attributes: Vec<String>,
    pub children: Vec<String>,
}

impl TriggerBy {
    pub fn attributes<I: IntoIterator<Item = S>, S: Into<String>>(attributes: I) -> Self {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            children: Vec::new(),
        }
    }

    pub fn with_children<I: IntoIterator<Item = S>, S: Into<String>>(mut self, children: I) -> Self {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

#[derive(Clone, Default)]
pub struct DowncastDispatcher {
    handlers: HandlerTable<DowncastHandler>,
    reconversion: HashMap<String, TriggerBy>,
}

impl std::fmt::Debug for DowncastDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DowncastDispatcher")
            .field("handlers", &self.handlers.len())
            .field("reconversion", &self.reconversion)
            .finish()
    }
}

impl DowncastDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with text insertion and generic removal registered at
    /// low priority.
    pub fn with_core_converters() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.on(&format!("insert:{TEXT_NAME}"), Priority::LOW, insert_text_handler());
        dispatcher.on("remove", Priority::LOW, remove_handler());
        dispatcher
    }

    pub fn on(&mut self, event: &str, priority: Priority, handler: DowncastHandler) {
        self.handlers.add(event, priority, handler);
    }

    pub fn register_reconversion(&mut self, element: &str, trigger_by: TriggerBy) {
        let entry = self.reconversion.entry(element.to_string()).or_default();
        entry.attributes.extend(trigger_by.attributes);
        entry.children.extend(trigger_by.children);
    }

    /// Converts everything the differ reported.
    pub fn convert_changes(
        &self,
        changes: &Changes,
        document: &Document,
        view: &mut ViewTree,
        mapper: &mut Mapper,
    ) -> ConversionResult<()> {
        let mut api = DowncastApi::new(document, view, mapper);
        for (name, range) in changes.markers_to_remove() {
            api.consumable = ModelConsumable::new();
            self.convert_marker_remove(name, range, &mut api)?;
        }
        for item in self.reduce_changes(&changes.items, document.tree()) {
            api.consumable = ModelConsumable::new();
            match item {
                DiffItem::Insert { position, length, .. } => {
                    self.convert_insert(&Range::from_position_and_shift(&position, length), &mut api)?
                }
                DiffItem::Remove { name, position, length } => self.convert_remove(&name, &position, length, &mut api)?,
                DiffItem::Attribute {
                    range,
                    attribute_key,
                    attribute_old_value,
                    attribute_new_value,
                } => self.convert_attribute(&range, &attribute_key, attribute_old_value, attribute_new_value, &mut api)?,
                DiffItem::Reinsert { position, .. } => self.convert_reinsert(&position, &mut api)?,
            }
        }
        for (name, range) in changes.markers_to_add() {
            api.consumable = ModelConsumable::new();
            self.convert_marker_add(name, range, &mut api)?;
        }
        Ok(())
    }

    /// Renders freshly inserted content.
    pub fn convert_insert(&self, range: &Range, api: &mut DowncastApi<'_>) -> ConversionResult<()> {
        let tree = api.tree();
        let items = tree.items(range, true)?;
        for item in &items {
            let key = ConsumableItem::from_item(item);
            api.consumable.add(key.clone(), "insert");
            for attribute in item.attributes(tree).keys() {
                api.consumable.add(key.clone(), &format!("attribute:{attribute}"));
            }
        }
        for item in items {
            let item_range = item.range(tree)?;
            self.fire(
                &DowncastEvent::Insert {
                    item: item.clone(),
                    range: item_range.clone(),
                },
                api,
            )?;
            for (key, value) in item.attributes(tree) {
                self.fire(
                    &DowncastEvent::Attribute {
                        item: item.clone(),
                        range: item_range.clone(),
                        key: key.clone(),
                        old_value: None,
                        new_value: Some(value.clone()),
                    },
                    api,
                )?;
            }
        }
        Ok(())
    }

    pub fn convert_remove(
        &self,
        name: &str,
        position: &Position,
        length: usize,
        api: &mut DowncastApi<'_>,
    ) -> ConversionResult<()> {
        api.consumable.add(ConsumableItem::Removed(position.clone()), "remove");
        let event = DowncastEvent::Remove {
            name: name.to_string(),
            position: position.clone(),
            length,
        };
        self.fire(&event, api)
    }

    pub fn convert_attribute(
        &self,
        range: &Range,
        key: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        api: &mut DowncastApi<'_>,
    ) -> ConversionResult<()> {
        let tree = api.tree();
        for item in tree.items(range, false)? {
            api.consumable.add(ConsumableItem::from_item(&item), &format!("attribute:{key}"));
            let event = DowncastEvent::Attribute {
                range: item.range(tree)?,
                item,
                key: key.to_string(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            };
            self.fire(&event, api)?;
        }
        Ok(())
    }

    /// Drops the current view of the element at `position` and renders it
    /// again.
    pub fn convert_reinsert(&self, position: &Position, api: &mut DowncastApi<'_>) -> ConversionResult<()> {
        let tree = api.tree();
        let Some(id) = tree.node_after(position) else {
            return Ok(());
        };
        if let Some(old) = api.mapper.to_view_element(id) {
            if let Some(range) = ViewRange::on(api.view(), old) {
                api.remove_view(range)?;
            }
        }
        debug!(element = tree.name(id), "Reconverting element");
        self.convert_insert(&Range::on(tree, id)?, api)
    }

    pub fn convert_marker_add(&self, name: &str, range: &Range, api: &mut DowncastApi<'_>) -> ConversionResult<()> {
        if range.root() == GRAVEYARD {
            return Ok(());
        }
        let event = DowncastEvent::AddMarker {
            name: name.to_string(),
            range: range.clone(),
        };
        let (item, kind) = event.consumable();
        api.consumable.add(item, &kind);
        self.fire(&event, api)
    }

    pub fn convert_marker_remove(&self, name: &str, range: &Range, api: &mut DowncastApi<'_>) -> ConversionResult<()> {
        let event = DowncastEvent::RemoveMarker {
            name: name.to_string(),
            range: range.clone(),
        };
        let (item, kind) = event.consumable();
        api.consumable.add(item, &kind);
        self.fire(&event, api)
    }

    fn fire(&self, event: &DowncastEvent, api: &mut DowncastApi<'_>) -> ConversionResult<()> {
        let name = event.name(api.tree());
        for handler in self.handlers.listeners(&name) {
            if !api.test(event) {
                break;
            }
            handler(event, api)?;
        }
        if api.test(event) {
            debug!(event = %name, "Dropped unconsumed change");
        }
        Ok(())
    }

    /// Replaces changes of elements that must be re-rendered by a single
    /// reinsert per element, placed after every other change.
    fn reduce_changes(&self, items: &[DiffItem], tree: &Tree) -> Vec<DiffItem> {
        if self.reconversion.is_empty() {
            return items.to_vec();
        }
        let mut reconvert: Vec<NodeId> = Vec::new();
        for item in items {
            let element = match item {
                DiffItem::Attribute { range, attribute_key, .. } => single_element(tree, range)
                    .filter(|id| self.triggers(tree, *id).is_some_and(|t| t.attributes.contains(attribute_key))),
                DiffItem::Insert { name, position, .. } | DiffItem::Remove { name, position, .. } => tree
                    .node_at_path(&position.root, position.parent_path())
                    .filter(|parent| !tree.is_root(*parent))
                    .filter(|parent| self.triggers(tree, *parent).is_some_and(|t| t.children.contains(name))),
                DiffItem::Reinsert { .. } => None,
            };
            if let Some(id) = element {
                if !reconvert.contains(&id) {
                    reconvert.push(id);
                }
            }
        }
        if reconvert.is_empty() {
            return items.to_vec();
        }

        let mut targets: Vec<(NodeId, Position)> = Vec::new();
        for id in &reconvert {
            let nested = reconvert.iter().any(|other| tree.is_ancestor_of(*other, *id));
            let Ok(before) = tree.position_before(*id) else {
                continue;
            };
            let inserted = items.iter().any(|item| match item {
                DiffItem::Insert { position, length, .. } => {
                    let range = Range::from_position_and_shift(position, *length);
                    range.start == before || range.contains_position(&before)
                }
                _ => false,
            });
            if !nested && !inserted {
                targets.push((*id, before));
            }
        }

        let mut reduced: Vec<DiffItem> = items
            .iter()
            .filter(|item| {
                !targets.iter().any(|(id, before)| match item {
                    DiffItem::Attribute { range, .. } => {
                        single_element(tree, range) == Some(*id) || is_inside(&range.start, before)
                    }
                    other => is_inside(other.position(), before),
                })
            })
            .cloned()
            .collect();
        reduced.extend(targets.into_iter().map(|(id, position)| DiffItem::Reinsert {
            name: tree.name(id).to_string(),
            position,
        }));
        reduced
    }

    fn triggers(&self, tree: &Tree, id: NodeId) -> Option<&TriggerBy> {
        self.reconversion.get(tree.name(id))
    }
}

/// Element covered exactly by a range.
fn single_element(tree: &Tree, range: &Range) -> Option<NodeId> {
    if !range.is_flat() || range.flat_len() != 1 {
        return None;
    }
    tree.node_after(&range.start).filter(|id| tree.is_element(*id))
}

/// Whether `position` lies inside the element that starts at `before`.
fn is_inside(position: &Position, before: &Position) -> bool {
    position.root == before.root && position.path.len() > before.path.len() && position.path.starts_with(&before.path)
}

// ---- core converters -----------------------------------------------------

pub fn insert_text_handler() -> DowncastHandler {
    Arc::new(|event, api| {
        let DowncastEvent::Insert {
            item: Item::Text(proxy),
            range,
        } = event
        else {
            return Ok(());
        };
        let Some(position) = api.to_view_position(&range.start) else {
            return Ok(());
        };
        if !api.consume(event) {
            return Ok(());
        }
        let text = api.writer.create_text(&proxy.data);
        api.writer.insert(position, vec![text])?;
        Ok(())
    })
}

/// Removes whatever the view shows between the mapped ends of the removed
/// model content.
pub fn remove_handler() -> DowncastHandler {
    Arc::new(|event, api| {
        let DowncastEvent::Remove { position, length, .. } = event else {
            return Ok(());
        };
        let end = position.get_shifted_by(*length as isize);
        let (Some(start), Some(end)) = (api.to_view_position(position), api.to_view_position(&end)) else {
            return Ok(());
        };
        if !api.consume(event) {
            return Ok(());
        }
        api.remove_view(ViewRange::new(start, end))?;
        Ok(())
    })
}

/// Maps the document selection into the view. A selection that covers a
/// single object element becomes a fake selection.
pub fn convert_selection(document: &Document, schema: &Schema, view: &ViewTree, mapper: &Mapper) -> ViewSelection {
    let tree = document.tree();
    let selection = document.selection();
    let ranges = selection
        .ranges()
        .iter()
        .filter_map(|range| mapper.to_view_range(tree, view, range))
        .collect();
    let mut converted = ViewSelection::new();
    converted.set_to(ranges, selection.is_backward());
    if let [range] = selection.ranges() {
        let on_object = single_element(tree, range).is_some_and(|id| schema.is_object(tree.name(id)));
        converted.set_fake(on_object);
    }
    converted
}
