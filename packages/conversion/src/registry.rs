//! # Conversion registry
//!
//! [`Conversion`] owns the three dispatchers of an editor (editing
//! downcast, data downcast and upcast) and hands out helper sets for
//! registering converters by group name:
//!
//! | group | dispatchers |
//! |---|---|
//! | `upcast` | upcast |
//! | `downcast` | editing and data downcast |
//! | `editingDowncast` | editing downcast |
//! | `dataDowncast` | data downcast |
//!
//! Handlers live in a [`HandlerTable`]: one priority-ordered list per event
//! name. Firing `attribute:bold:$text` runs the handlers of
//! `attribute`, `attribute:bold` and `attribute:bold:$text` merged by
//! priority, and equal priorities run in registration order.

use crate::downcast::{DowncastDispatcher, DowncastHandler};
use crate::error::{ConversionError, ConversionResult};
use crate::helpers::{
    attribute_to_attribute_handler, attribute_to_element_handler, element_to_attribute_handler,
    element_to_element_handler, insert_element_handler, marker_add_handler, marker_remove_handler,
    upcast_attribute_to_attribute_handler, AttributeToAttribute, AttributeToElement, ElementToElement,
    MarkerToElement, ModelValue, UpcastAttributeToAttribute, UpcastElementToAttribute, UpcastElementToElement,
    ViewElementDefinition,
};
use crate::upcast::{UpcastDispatcher, UpcastHandler};
use folio_common::{Priority, PriorityList};
use folio_view::Matcher;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Clone)]
pub struct HandlerTable<H> {
    buckets: HashMap<String, PriorityList<H>>,
    next_seq: u64,
}

impl<H> Default for HandlerTable<H> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<H: Clone> HandlerTable<H> {
    pub fn add(&mut self, event: &str, priority: Priority, handler: H) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.buckets
            .entry(event.to_string())
            .or_default()
            .insert_with_seq(priority, seq, handler);
    }

    /// Handlers for `event` and every namespace it belongs to, in the order
    /// they run.
    pub fn listeners(&self, event: &str) -> Vec<H> {
        let mut entries: Vec<(Priority, u64, H)> = Vec::new();
        for namespace in namespaces(event) {
            if let Some(list) = self.buckets.get(namespace) {
                entries.extend(list.iter().map(|e| (e.priority, e.seq, e.item.clone())));
            }
        }
        entries.sort_by_key(|(priority, seq, _)| (Reverse(*priority), *seq));
        entries.into_iter().map(|(_, _, handler)| handler).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(PriorityList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `a:b:c` belongs to `a`, `a:b` and `a:b:c`.
fn namespaces(event: &str) -> impl Iterator<Item = &str> {
    event
        .match_indices(':')
        .map(move |(index, _)| &event[..index])
        .chain(std::iter::once(event))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionGroup {
    Upcast,
    Downcast,
    DataDowncast,
    EditingDowncast,
}

impl FromStr for ConversionGroup {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcast" => Ok(ConversionGroup::Upcast),
            "downcast" => Ok(ConversionGroup::Downcast),
            "dataDowncast" => Ok(ConversionGroup::DataDowncast),
            "editingDowncast" => Ok(ConversionGroup::EditingDowncast),
            other => Err(ConversionError::UnknownGroup(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversion {
    editing_downcast: DowncastDispatcher,
    data_downcast: DowncastDispatcher,
    upcast: UpcastDispatcher,
}

impl Default for Conversion {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversion {
    /// Dispatchers preloaded with the core converters.
    pub fn new() -> Self {
        Self {
            editing_downcast: DowncastDispatcher::with_core_converters(),
            data_downcast: DowncastDispatcher::with_core_converters(),
            upcast: UpcastDispatcher::with_core_converters(),
        }
    }

    pub fn editing_downcast(&self) -> &DowncastDispatcher {
        &self.editing_downcast
    }

    pub fn data_downcast(&self) -> &DowncastDispatcher {
        &self.data_downcast
    }

    pub fn upcast(&self) -> &UpcastDispatcher {
        &self.upcast
    }

    /// Helpers for a downcast group: `downcast`, `dataDowncast` or
    /// `editingDowncast`.
    pub fn for_downcast(&mut self, group: &str) -> ConversionResult<DowncastHelpers<'_>> {
        let dispatchers = match group.parse::<ConversionGroup>()? {
            ConversionGroup::Downcast => vec![&mut self.editing_downcast, &mut self.data_downcast],
            ConversionGroup::DataDowncast => vec![&mut self.data_downcast],
            ConversionGroup::EditingDowncast => vec![&mut self.editing_downcast],
            ConversionGroup::Upcast => return Err(ConversionError::UnknownGroup(group.to_string())),
        };
        Ok(DowncastHelpers { dispatchers })
    }

    pub fn for_upcast(&mut self) -> UpcastHelpers<'_> {
        UpcastHelpers {
            dispatcher: &mut self.upcast,
        }
    }

    /// Two-way element conversion: downcast in both pipelines and upcast
    /// from a view element matching the definition.
    pub fn element_to_element(&mut self, model: &str, view: ViewElementDefinition) {
        let pattern = view.to_pattern();
        DowncastHelpers {
            dispatchers: vec![&mut self.editing_downcast, &mut self.data_downcast],
        }
        .element_to_element(ElementToElement::new(model, view));
        self.for_upcast()
            .element_to_element(UpcastElementToElement::new(pattern, model));
    }

    /// Two-way text attribute conversion through an attribute element.
    pub fn attribute_to_element(&mut self, key: &str, view: ViewElementDefinition) {
        let pattern = view.to_pattern();
        DowncastHelpers {
            dispatchers: vec![&mut self.editing_downcast, &mut self.data_downcast],
        }
        .attribute_to_element(AttributeToElement::new(key, view));
        self.for_upcast()
            .element_to_attribute(UpcastElementToAttribute::new(pattern, key, ModelValue::Fixed(true.into())));
    }
}

/// Registers downcast converters in one or both downcast dispatchers.
pub struct DowncastHelpers<'a> {
    dispatchers: Vec<&'a mut DowncastDispatcher>,
}

impl DowncastHelpers<'_> {
    pub fn add(&mut self, event: &str, priority: Priority, handler: DowncastHandler) -> &mut Self {
        for dispatcher in self.dispatchers.iter_mut() {
            dispatcher.on(event, priority, handler.clone());
        }
        self
    }

    pub fn element_to_element(&mut self, config: ElementToElement) -> &mut Self {
        let handler = insert_element_handler(config.view.clone());
        let event = format!("insert:{}", config.model);
        self.add(&event, config.priority, handler);
        if let Some(trigger_by) = &config.trigger_by {
            for dispatcher in self.dispatchers.iter_mut() {
                dispatcher.register_reconversion(&config.model, trigger_by.clone());
            }
        }
        self
    }

    pub fn attribute_to_element(&mut self, config: AttributeToElement) -> &mut Self {
        let event = format!("attribute:{}", config.key);
        let handler = attribute_to_element_handler(config.view.clone());
        self.add(&event, config.priority, handler)
    }

    pub fn attribute_to_attribute(&mut self, config: AttributeToAttribute) -> &mut Self {
        let event = match &config.element {
            Some(name) => format!("attribute:{}:{}", config.key, name),
            None => format!("attribute:{}", config.key),
        };
        let priority = config.priority;
        self.add(&event, priority, attribute_to_attribute_handler(config))
    }

    pub fn marker_to_element(&mut self, config: MarkerToElement) -> &mut Self {
        let add = format!("addMarker:{}", config.group);
        let remove = format!("removeMarker:{}", config.group);
        self.add(&add, config.priority, marker_add_handler(config.view.clone()));
        self.add(&remove, config.priority, marker_remove_handler())
    }
}

/// Registers upcast converters.
pub struct UpcastHelpers<'a> {
    dispatcher: &'a mut UpcastDispatcher,
}

impl UpcastHelpers<'_> {
    pub fn add(&mut self, event: &str, priority: Priority, handler: UpcastHandler) -> &mut Self {
        self.dispatcher.on(event, priority, handler);
        self
    }

    pub fn element_to_element(&mut self, config: UpcastElementToElement) -> &mut Self {
        let event = element_event(&config.view);
        let priority = config.priority;
        self.add(&event, priority, element_to_element_handler(config))
    }

    pub fn element_to_attribute(&mut self, config: UpcastElementToAttribute) -> &mut Self {
        let event = element_event(&config.view);
        let priority = config.priority;
        self.add(&event, priority, element_to_attribute_handler(config))
    }

    pub fn attribute_to_attribute(&mut self, config: UpcastAttributeToAttribute) -> &mut Self {
        let event = element_event(&config.view);
        let priority = config.priority;
        self.add(&event, priority, upcast_attribute_to_attribute_handler(config))
    }
}

fn element_event(matcher: &Matcher) -> String {
    match matcher.element_name() {
        Some(name) => format!("element:{name}"),
        None => "element".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces() {
        let all: Vec<&str> = namespaces("attribute:bold:$text").collect();
        assert_eq!(all, vec!["attribute", "attribute:bold", "attribute:bold:$text"]);
        assert_eq!(namespaces("text").collect::<Vec<_>>(), vec!["text"]);
    }

    #[test]
    fn test_listeners_merge_by_priority_then_registration() {
        let mut table: HandlerTable<&str> = HandlerTable::default();
        table.add("insert", Priority::LOW, "generic-low");
        table.add("insert:paragraph", Priority::NORMAL, "first");
        table.add("insert:paragraph", Priority::NORMAL, "second");
        table.add("insert", Priority::NORMAL, "generic");
        table.add("insert:heading", Priority::HIGHEST, "other");

        assert_eq!(
            table.listeners("insert:paragraph"),
            vec!["first", "second", "generic", "generic-low"]
        );
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let mut conversion = Conversion::new();
        let error = conversion.for_downcast("sideways").err().unwrap();
        assert_eq!(error, ConversionError::UnknownGroup("sideways".into()));
        assert!(conversion.for_downcast("upcast").is_err());
        assert!(conversion.for_downcast("dataDowncast").is_ok());
    }
}
