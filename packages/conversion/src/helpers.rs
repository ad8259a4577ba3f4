//! Ready-made converters for the common shapes of conversion.
//!
//! Downcast: element to element (optionally re-rendered on trigger
//! changes), attribute to attribute element, attribute to view attribute,
//! marker to UI elements. Upcast: element to element, element to text
//! attribute, view attribute to model attribute.

use crate::downcast::{DowncastEvent, DowncastHandler, TriggerBy};
use crate::error::{ConversionError, ConversionResult};
use crate::upcast::UpcastHandler;
use folio_common::Priority;
use folio_model::{Attributes, Item, Node, Schema, SchemaContext};
use folio_view::{parse_style, DowncastWriter, Matcher, MatcherPattern, ViewNodeId, ViewRange, ViewTree};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declarative description of a view element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewElementDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl ViewElementDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_style(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    fn attribute_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if !self.classes.is_empty() {
            pairs.push(("class".into(), self.classes.join(" ")));
        }
        if !self.styles.is_empty() {
            let style: String = self.styles.iter().map(|(k, v)| format!("{k}:{v};")).collect();
            pairs.push(("style".into(), style));
        }
        pairs
    }

    pub fn create_container(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let pairs = self.attribute_pairs();
        writer.create_container_element(&self.name, &as_refs(&pairs))
    }

    pub fn create_attribute(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let pairs = self.attribute_pairs();
        writer.create_attribute_element(&self.name, &as_refs(&pairs), self.priority, None)
    }

    pub fn create_ui(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let pairs = self.attribute_pairs();
        writer.create_ui_element(&self.name, &as_refs(&pairs))
    }

    /// Pattern matching elements created from this definition.
    pub fn to_pattern(&self) -> MatcherPattern {
        let mut pattern = MatcherPattern::name(&self.name);
        for class in &self.classes {
            pattern = pattern.with_class(class);
        }
        for (key, value) in &self.attributes {
            pattern = pattern.with_attribute(key, Some(value.as_str()));
        }
        for (key, value) in &self.styles {
            pattern = pattern.with_style(key, Some(value.as_str()));
        }
        pattern
    }
}

impl From<&str> for ViewElementDefinition {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

fn as_refs(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---- downcast --------------------------------------------------------------

pub type ElementFactory = Arc<dyn Fn(&Attributes, &mut DowncastWriter<'_>) -> Option<ViewNodeId> + Send + Sync>;

/// Builds the view element of a model element.
#[derive(Clone)]
pub enum ViewElementCreator {
    Definition(ViewElementDefinition),
    Custom(ElementFactory),
}

impl ViewElementCreator {
    pub fn custom(
        factory: impl Fn(&Attributes, &mut DowncastWriter<'_>) -> Option<ViewNodeId> + Send + Sync + 'static,
    ) -> Self {
        ViewElementCreator::Custom(Arc::new(factory))
    }

    fn create(&self, attributes: &Attributes, writer: &mut DowncastWriter<'_>) -> Option<ViewNodeId> {
        match self {
            ViewElementCreator::Definition(definition) => Some(definition.create_container(writer)),
            ViewElementCreator::Custom(factory) => factory(attributes, writer),
        }
    }
}

impl From<ViewElementDefinition> for ViewElementCreator {
    fn from(definition: ViewElementDefinition) -> Self {
        ViewElementCreator::Definition(definition)
    }
}

impl From<&str> for ViewElementCreator {
    fn from(name: &str) -> Self {
        ViewElementCreator::Definition(ViewElementDefinition::new(name))
    }
}

#[derive(Clone)]
pub struct ElementToElement {
    pub model: String,
    pub view: ViewElementCreator,
    pub trigger_by: Option<TriggerBy>,
    pub priority: Priority,
}

impl ElementToElement {
    pub fn new(model: impl Into<String>, view: impl Into<ViewElementCreator>) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            trigger_by: None,
            priority: Priority::NORMAL,
        }
    }

    pub fn trigger_by(mut self, trigger_by: TriggerBy) -> Self {
        self.trigger_by = Some(trigger_by);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

pub type AttributeElementFactory = Arc<dyn Fn(&Value, &mut DowncastWriter<'_>) -> Option<ViewNodeId> + Send + Sync>;

/// Builds the attribute element for a model attribute value. A definition
/// is used for every truthy value.
#[derive(Clone)]
pub enum AttributeElementCreator {
    Definition(ViewElementDefinition),
    Custom(AttributeElementFactory),
}

impl AttributeElementCreator {
    pub fn custom(
        factory: impl Fn(&Value, &mut DowncastWriter<'_>) -> Option<ViewNodeId> + Send + Sync + 'static,
    ) -> Self {
        AttributeElementCreator::Custom(Arc::new(factory))
    }

    fn create(&self, value: &Value, writer: &mut DowncastWriter<'_>) -> Option<ViewNodeId> {
        match self {
            AttributeElementCreator::Definition(definition) => {
                is_truthy(value).then(|| definition.create_attribute(writer))
            }
            AttributeElementCreator::Custom(factory) => factory(value, writer),
        }
    }
}

impl From<ViewElementDefinition> for AttributeElementCreator {
    fn from(definition: ViewElementDefinition) -> Self {
        AttributeElementCreator::Definition(definition)
    }
}

#[derive(Clone)]
pub struct AttributeToElement {
    pub key: String,
    pub view: AttributeElementCreator,
    pub priority: Priority,
}

impl AttributeToElement {
    pub fn new(key: impl Into<String>, view: impl Into<AttributeElementCreator>) -> Self {
        Self {
            key: key.into(),
            view: view.into(),
            priority: Priority::NORMAL,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A view attribute. `class` adds class names and `style` adds style
/// entries instead of replacing the whole attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewAttribute {
    pub key: String,
    pub value: String,
}

impl ViewAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub type ViewAttributeFactory = Arc<dyn Fn(&Value) -> Option<ViewAttribute> + Send + Sync>;

#[derive(Clone)]
pub struct AttributeToAttribute {
    pub key: String,
    /// Restricts the converter to elements with this name.
    pub element: Option<String>,
    pub view: ViewAttributeFactory,
    pub priority: Priority,
}

impl AttributeToAttribute {
    pub fn new(key: impl Into<String>, view: impl Fn(&Value) -> Option<ViewAttribute> + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            element: None,
            view: Arc::new(view),
            priority: Priority::NORMAL,
        }
    }

    /// Truthy values add `class` to the element.
    pub fn class(key: impl Into<String>, class: impl Into<String>) -> Self {
        let class = class.into();
        Self::new(key, move |value| is_truthy(value).then(|| ViewAttribute::new("class", class.clone())))
    }

    /// The model value is written to `view_key` as text.
    pub fn to_view_key(key: impl Into<String>, view_key: impl Into<String>) -> Self {
        let view_key = view_key.into();
        Self::new(key, move |value| {
            (!value.is_null()).then(|| ViewAttribute::new(view_key.clone(), value_to_string(value)))
        })
    }

    pub fn on_element(mut self, name: impl Into<String>) -> Self {
        self.element = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

pub type MarkerElementFactory = Arc<dyn Fn(&str, bool, &mut DowncastWriter<'_>) -> ViewNodeId + Send + Sync>;

/// Builds the UI element placed at a marker boundary. Custom factories get
/// the marker name and whether the element opens the marker.
#[derive(Clone)]
pub enum MarkerElementCreator {
    Definition(ViewElementDefinition),
    Custom(MarkerElementFactory),
}

impl MarkerElementCreator {
    fn create(&self, marker: &str, opening: bool, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        match self {
            MarkerElementCreator::Definition(definition) => definition.create_ui(writer),
            MarkerElementCreator::Custom(factory) => factory(marker, opening, writer),
        }
    }
}

#[derive(Clone)]
pub struct MarkerToElement {
    /// Marker name or group prefix, `comment` matches `comment:1`.
    pub group: String,
    pub view: MarkerElementCreator,
    pub priority: Priority,
}

impl MarkerToElement {
    pub fn new(group: impl Into<String>, view: ViewElementDefinition) -> Self {
        Self {
            group: group.into(),
            view: MarkerElementCreator::Definition(view),
            priority: Priority::NORMAL,
        }
    }

    pub fn custom(
        group: impl Into<String>,
        factory: impl Fn(&str, bool, &mut DowncastWriter<'_>) -> ViewNodeId + Send + Sync + 'static,
    ) -> Self {
        Self {
            group: group.into(),
            view: MarkerElementCreator::Custom(Arc::new(factory)),
            priority: Priority::NORMAL,
        }
    }
}

pub(crate) fn insert_element_handler(creator: ViewElementCreator) -> DowncastHandler {
    Arc::new(move |event, api| {
        let DowncastEvent::Insert {
            item: Item::Element(id),
            range,
        } = event
        else {
            return Ok(());
        };
        let Some(position) = api.to_view_position(&range.start) else {
            return Ok(());
        };
        let attributes = api.tree().attributes(*id).clone();
        let Some(element) = creator.create(&attributes, &mut api.writer) else {
            return Ok(());
        };
        api.consume(event);
        api.mapper.bind_elements(*id, element);
        api.writer.insert(position, vec![element])?;
        Ok(())
    })
}

pub(crate) fn attribute_to_element_handler(creator: AttributeElementCreator) -> DowncastHandler {
    Arc::new(move |event, api| {
        let DowncastEvent::Attribute {
            range,
            old_value,
            new_value,
            ..
        } = event
        else {
            return Ok(());
        };
        let Some(mut view_range) = api.to_view_range(range) else {
            return Ok(());
        };
        let old = old_value.as_ref().and_then(|value| creator.create(value, &mut api.writer));
        let new = new_value.as_ref().and_then(|value| creator.create(value, &mut api.writer));
        if old.is_none() && new.is_none() {
            return Ok(());
        }
        api.consume(event);
        if let Some(old) = old {
            view_range = api.writer.unwrap(view_range, old)?;
        }
        if let Some(new) = new {
            api.writer.wrap(view_range, new)?;
        }
        Ok(())
    })
}

pub(crate) fn attribute_to_attribute_handler(config: AttributeToAttribute) -> DowncastHandler {
    Arc::new(move |event, api| {
        let DowncastEvent::Attribute {
            item,
            key,
            old_value,
            new_value,
            ..
        } = event
        else {
            return Ok(());
        };
        let Item::Element(id) = item else {
            return Err(ConversionError::AttributeToAttributeOnText { key: key.clone() });
        };
        let Some(element) = api.mapper.to_view_element(*id) else {
            return Ok(());
        };
        let old = old_value.as_ref().and_then(|value| (config.view)(value));
        let new = new_value.as_ref().and_then(|value| (config.view)(value));
        api.consume(event);
        if let Some(old) = old {
            remove_view_attribute(&mut api.writer, element, &old)?;
        }
        if let Some(new) = new {
            set_view_attribute(&mut api.writer, element, &new)?;
        }
        Ok(())
    })
}

fn set_view_attribute(writer: &mut DowncastWriter<'_>, element: ViewNodeId, attribute: &ViewAttribute) -> ConversionResult<()> {
    match attribute.key.as_str() {
        "class" => {
            for class in attribute.value.split_whitespace() {
                writer.add_class(element, class)?;
            }
        }
        "style" => {
            for (key, value) in parse_style(&attribute.value) {
                writer.set_style(element, &key, &value)?;
            }
        }
        key => writer.set_attribute(element, key, &attribute.value)?,
    }
    Ok(())
}

fn remove_view_attribute(
    writer: &mut DowncastWriter<'_>,
    element: ViewNodeId,
    attribute: &ViewAttribute,
) -> ConversionResult<()> {
    match attribute.key.as_str() {
        "class" => {
            for class in attribute.value.split_whitespace() {
                writer.remove_class(element, class)?;
            }
        }
        "style" => {
            for key in parse_style(&attribute.value).keys() {
                writer.remove_style(element, key)?;
            }
        }
        key => writer.remove_attribute(element, key)?,
    }
    Ok(())
}

pub(crate) fn marker_add_handler(creator: MarkerElementCreator) -> DowncastHandler {
    Arc::new(move |event, api| {
        let DowncastEvent::AddMarker { name, range } = event else {
            return Ok(());
        };
        let Some(start) = api.to_view_position(&range.start) else {
            return Ok(());
        };
        api.consume(event);
        let opening = creator.create(name, true, &mut api.writer);
        api.writer.insert(start, vec![opening])?;
        api.mapper.bind_element_to_marker(opening, name);
        if range.is_collapsed() {
            return Ok(());
        }
        if let Some(end) = api.to_view_position(&range.end) {
            let closing = creator.create(name, false, &mut api.writer);
            api.writer.insert(end, vec![closing])?;
            api.mapper.bind_element_to_marker(closing, name);
        }
        Ok(())
    })
}

pub(crate) fn marker_remove_handler() -> DowncastHandler {
    Arc::new(|event, api| {
        let DowncastEvent::RemoveMarker { name, .. } = event else {
            return Ok(());
        };
        let elements = api.mapper.marker_name_to_elements(name);
        if elements.is_empty() {
            return Ok(());
        }
        api.consume(event);
        for element in elements {
            if let Some(range) = ViewRange::on(api.view(), element) {
                api.writer.remove(range)?;
            }
        }
        api.mapper.unbind_marker(name);
        Ok(())
    })
}

// ---- upcast ------------------------------------------------------------------

pub type ModelElementFactory = Arc<dyn Fn(&ViewTree, ViewNodeId) -> Option<Node> + Send + Sync>;

/// Builds the model element for a matched view element. Children are
/// converted and appended by the converter.
#[derive(Clone)]
pub enum ModelElementCreator {
    Name(String),
    Custom(ModelElementFactory),
}

impl ModelElementCreator {
    fn create(&self, view: &ViewTree, id: ViewNodeId) -> Option<Node> {
        match self {
            ModelElementCreator::Name(name) => Some(Node::element(name.clone())),
            ModelElementCreator::Custom(factory) => factory(view, id),
        }
    }
}

impl From<&str> for ModelElementCreator {
    fn from(name: &str) -> Self {
        ModelElementCreator::Name(name.to_string())
    }
}

pub type ModelValueFactory = Arc<dyn Fn(&ViewTree, ViewNodeId) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub enum ModelValue {
    Fixed(Value),
    Custom(ModelValueFactory),
}

impl ModelValue {
    pub fn custom(factory: impl Fn(&ViewTree, ViewNodeId) -> Option<Value> + Send + Sync + 'static) -> Self {
        ModelValue::Custom(Arc::new(factory))
    }

    fn resolve(&self, view: &ViewTree, id: ViewNodeId) -> Option<Value> {
        match self {
            ModelValue::Fixed(value) => Some(value.clone()),
            ModelValue::Custom(factory) => factory(view, id),
        }
    }
}

#[derive(Clone)]
pub struct UpcastElementToElement {
    pub view: Matcher,
    pub model: ModelElementCreator,
    pub priority: Priority,
}

impl UpcastElementToElement {
    pub fn new(view: impl Into<Matcher>, model: impl Into<ModelElementCreator>) -> Self {
        Self {
            view: view.into(),
            model: model.into(),
            priority: Priority::NORMAL,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone)]
pub struct UpcastElementToAttribute {
    pub view: Matcher,
    pub key: String,
    pub value: ModelValue,
    pub priority: Priority,
}

impl UpcastElementToAttribute {
    pub fn new(view: impl Into<Matcher>, key: impl Into<String>, value: ModelValue) -> Self {
        Self {
            view: view.into(),
            key: key.into(),
            value,
            priority: Priority::LOW,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone)]
pub struct UpcastAttributeToAttribute {
    pub view: Matcher,
    pub key: String,
    pub value: ModelValue,
    pub priority: Priority,
}

impl UpcastAttributeToAttribute {
    pub fn new(view: impl Into<Matcher>, key: impl Into<String>, value: ModelValue) -> Self {
        Self {
            view: view.into(),
            key: key.into(),
            value,
            priority: Priority::LOW,
        }
    }

    /// Copies the text of a view attribute into a model attribute.
    pub fn from_view_attribute(view_key: impl Into<String>, key: impl Into<String>) -> Self {
        let view_key = view_key.into();
        let pattern = MatcherPattern::any().with_attribute(view_key.clone(), None);
        let value = ModelValue::custom(move |view, id| view.attribute(id, &view_key).map(Value::from));
        Self::new(pattern, key, value)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

pub(crate) fn element_to_element_handler(config: UpcastElementToElement) -> UpcastHandler {
    Arc::new(move |data, api| {
        let id = data.view_item;
        let Some(matched) = config.view.match_node(api.view, id) else {
            return Ok(());
        };
        if api.consumable.test(id, &matched) != Some(true) {
            return Ok(());
        }
        let Some(node) = config.model.create(api.view, id) else {
            return Ok(());
        };
        let name = node.name().to_string();
        if !api.check_child(&name) {
            tracing::debug!(element = %name, "Schema rejected upcast element");
            return Ok(());
        }
        api.consumable.consume(id, &matched);
        let children = api.convert_children(id, Some(&name))?;
        data.output = Some(vec![node.with_children(children)]);
        Ok(())
    })
}

pub(crate) fn element_to_attribute_handler(config: UpcastElementToAttribute) -> UpcastHandler {
    Arc::new(move |data, api| {
        let id = data.view_item;
        let Some(matched) = config.view.match_node(api.view, id) else {
            return Ok(());
        };
        if api.consumable.test(id, &matched) != Some(true) {
            return Ok(());
        }
        let Some(value) = config.value.resolve(api.view, id) else {
            return Ok(());
        };
        let mut nodes = match data.output.take() {
            Some(nodes) => nodes,
            None => api.convert_children(id, None)?,
        };
        if set_attribute_on(api.schema, &api.context(), &mut nodes, &config.key, &value, true) {
            api.consumable.consume(id, &matched);
        }
        data.output = Some(nodes);
        Ok(())
    })
}

pub(crate) fn upcast_attribute_to_attribute_handler(config: UpcastAttributeToAttribute) -> UpcastHandler {
    Arc::new(move |data, api| {
        let id = data.view_item;
        let Some(mut matched) = config.view.match_node(api.view, id) else {
            return Ok(());
        };
        matched.name = false;
        if api.consumable.test(id, &matched) != Some(true) {
            return Ok(());
        }
        let Some(value) = config.value.resolve(api.view, id) else {
            return Ok(());
        };
        let mut nodes = match data.output.take() {
            Some(nodes) => nodes,
            None => api.convert_children(id, None)?,
        };
        if set_attribute_on(api.schema, &api.context(), &mut nodes, &config.key, &value, false) {
            api.consumable.consume(id, &matched);
        }
        data.output = Some(nodes);
        Ok(())
    })
}

/// Sets an attribute on every node that allows it and does not have it yet.
/// Deep mode descends into elements that do not allow the attribute.
fn set_attribute_on(
    schema: &Schema,
    context: &SchemaContext,
    nodes: &mut [Node],
    key: &str,
    value: &Value,
    deep: bool,
) -> bool {
    let mut applied = false;
    for node in nodes.iter_mut() {
        let node_context = context.clone().push(node.name());
        if schema.check_attribute(&node_context, key) {
            if !node.attributes().contains_key(key) {
                node.attributes_mut().insert(key.to_string(), value.clone());
                applied = true;
            }
        } else if let (true, Node::Element(element)) = (deep, &mut *node) {
            applied |= set_attribute_on(schema, &node_context, &mut element.children, key, value, deep);
        }
    }
    applied
}
