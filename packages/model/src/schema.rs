//! # Schema
//!
//! Declarative rules for which elements may contain which children and
//! attributes.
//!
//! Item definitions are registered by name and may be extended later.
//! Definitions are compiled eagerly after every change in fixed phases:
//!
//! 1. merge every definition of an item (`allowIn`, flags, references)
//! 2. `allowChildren` turns into `allowIn` on the children
//! 3. `allowContentOf` copies the places other items are allowed in
//! 4. `allowWhere` copies `allowIn` of the referenced item
//! 5. `allowAttributesOf` and `inheritTypesFrom`
//! 6. drop references to unregistered items and duplicates
//!
//! Checks never fail: unknown items are simply not allowed. Every custom
//! callback runs. Any `Some(false)` vetoes, otherwise any `Some(true)`
//! permits, and when all return `None` the declarative rules decide.

use crate::error::{ModelError, ModelResult};
use crate::node::Attributes;
use crate::position::Position;
use crate::tree::{NodeId, Tree};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rules for one schema item as written by the registering code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaItemDefinition {
    pub allow_in: Vec<String>,
    pub allow_children: Vec<String>,
    pub allow_where: Vec<String>,
    pub allow_content_of: Vec<String>,
    pub allow_attributes: Vec<String>,
    pub allow_attributes_of: Vec<String>,
    pub inherit_types_from: Vec<String>,
    pub inherit_all_from: Option<String>,
    pub is_block: Option<bool>,
    pub is_inline: Option<bool>,
    pub is_limit: Option<bool>,
    pub is_object: Option<bool>,
    pub is_content: Option<bool>,
    pub is_selectable: Option<bool>,
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl SchemaItemDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_in<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.allow_in.extend(strings(items));
        self
    }

    pub fn allow_children<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.allow_children.extend(strings(items));
        self
    }

    pub fn allow_where(mut self, item: impl Into<String>) -> Self {
        self.allow_where.push(item.into());
        self
    }

    pub fn allow_content_of(mut self, item: impl Into<String>) -> Self {
        self.allow_content_of.push(item.into());
        self
    }

    pub fn allow_attributes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.allow_attributes.extend(strings(items));
        self
    }

    pub fn allow_attributes_of(mut self, item: impl Into<String>) -> Self {
        self.allow_attributes_of.push(item.into());
        self
    }

    pub fn inherit_types_from(mut self, item: impl Into<String>) -> Self {
        self.inherit_types_from.push(item.into());
        self
    }

    pub fn inherit_all_from(mut self, item: impl Into<String>) -> Self {
        self.inherit_all_from = Some(item.into());
        self
    }

    pub fn block(mut self) -> Self {
        self.is_block = Some(true);
        self
    }

    pub fn inline(mut self) -> Self {
        self.is_inline = Some(true);
        self
    }

    pub fn limit(mut self) -> Self {
        self.is_limit = Some(true);
        self
    }

    pub fn object(mut self) -> Self {
        self.is_object = Some(true);
        self
    }

    pub fn content(mut self) -> Self {
        self.is_content = Some(true);
        self
    }

    pub fn selectable(mut self) -> Self {
        self.is_selectable = Some(true);
        self
    }
}

/// Fully resolved rules for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledDefinition {
    pub name: String,
    pub allow_in: Vec<String>,
    pub allow_attributes: Vec<String>,
    pub is_block: bool,
    pub is_inline: bool,
    pub is_limit: bool,
    pub is_object: bool,
    pub is_content: bool,
    pub is_selectable: bool,
}

#[derive(Debug, Clone, Default)]
struct WorkingDefinition {
    allow_in: Vec<String>,
    allow_children: Vec<String>,
    allow_where: Vec<String>,
    allow_content_of: Vec<String>,
    allow_attributes: Vec<String>,
    allow_attributes_of: Vec<String>,
    inherit_types_from: Vec<String>,
    is_block: Option<bool>,
    is_inline: Option<bool>,
    is_limit: Option<bool>,
    is_object: Option<bool>,
    is_content: Option<bool>,
    is_selectable: Option<bool>,
}

impl WorkingDefinition {
    fn merge(&mut self, def: &SchemaItemDefinition) {
        self.allow_in.extend(def.allow_in.iter().cloned());
        self.allow_children.extend(def.allow_children.iter().cloned());
        self.allow_where.extend(def.allow_where.iter().cloned());
        self.allow_content_of.extend(def.allow_content_of.iter().cloned());
        self.allow_attributes.extend(def.allow_attributes.iter().cloned());
        self.allow_attributes_of.extend(def.allow_attributes_of.iter().cloned());
        self.inherit_types_from.extend(def.inherit_types_from.iter().cloned());
        if let Some(from) = &def.inherit_all_from {
            self.allow_content_of.push(from.clone());
            self.allow_where.push(from.clone());
            self.allow_attributes_of.push(from.clone());
            self.inherit_types_from.push(from.clone());
        }
        macro_rules! flag {
            ($($field:ident),*) => {
                $(if def.$field.is_some() { self.$field = def.$field; })*
            };
        }
        flag!(is_block, is_inline, is_limit, is_object, is_content, is_selectable);
    }
}

/// One level of a schema context: an element name and its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContextItem {
    pub name: String,
    pub attributes: Attributes,
}

/// Ancestor chain a check is made in, outermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaContext {
    items: Vec<SchemaContextItem>,
}

impl SchemaContext {
    pub fn from_names<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        Self {
            items: names
                .into_iter()
                .map(|name| SchemaContextItem {
                    name: name.into(),
                    attributes: Attributes::new(),
                })
                .collect(),
        }
    }

    /// Context made of a node and all its ancestors.
    pub fn from_node(tree: &Tree, id: NodeId) -> Self {
        let items = tree
            .ancestors(id)
            .into_iter()
            .chain(std::iter::once(id))
            .map(|node| SchemaContextItem {
                name: tree.name(node).to_string(),
                attributes: tree.attributes(node).clone(),
            })
            .collect();
        Self { items }
    }

    /// Context of a position: its parent and the parent's ancestors.
    pub fn from_position(tree: &Tree, position: &Position) -> ModelResult<Self> {
        Ok(Self::from_node(tree, tree.resolve_parent(position)?))
    }

    pub fn push(mut self, name: impl Into<String>) -> Self {
        self.items.push(SchemaContextItem {
            name: name.into(),
            attributes: Attributes::new(),
        });
        self
    }

    pub fn items(&self) -> &[SchemaContextItem] {
        &self.items
    }

    pub fn last(&self) -> Option<&SchemaContextItem> {
        self.items.last()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }

    pub fn ends_with(&self, names: &[&str]) -> bool {
        let own = self.names();
        own.len() >= names.len() && own[own.len() - names.len()..] == *names
    }
}

pub type ChildCheck = Arc<dyn Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync>;
pub type AttributeCheck = Arc<dyn Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Schema {
    order: Vec<String>,
    sources: HashMap<String, Vec<SchemaItemDefinition>>,
    compiled: HashMap<String, CompiledDefinition>,
    child_checks: Vec<ChildCheck>,
    attribute_checks: Vec<AttributeCheck>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("items", &self.order)
            .field("child_checks", &self.child_checks.len())
            .field("attribute_checks", &self.attribute_checks.len())
            .finish()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema with the generic items every editor relies on.
    pub fn with_base_items() -> Self {
        let mut schema = Self::new();
        schema.register("$root", SchemaItemDefinition::new().limit());
        schema.register("$container", SchemaItemDefinition::new().allow_in(["$root", "$container"]));
        schema.register("$block", SchemaItemDefinition::new().allow_in(["$root", "$container"]).block());
        schema.register(
            "$blockObject",
            SchemaItemDefinition::new()
                .allow_where("$block")
                .block()
                .object()
                .limit()
                .selectable()
                .content(),
        );
        schema.register(
            "$inlineObject",
            SchemaItemDefinition::new()
                .allow_where("$text")
                .allow_attributes_of("$text")
                .inline()
                .object()
                .limit()
                .selectable()
                .content(),
        );
        schema.register("$text", SchemaItemDefinition::new().allow_in(["$block"]).inline().content());
        schema.register("$clipboardHolder", SchemaItemDefinition::new().allow_content_of("$root").limit());
        schema.register("$documentFragment", SchemaItemDefinition::new().allow_content_of("$root").limit());
        schema
    }

    /// Registers an item. Registering a name twice merges the definitions.
    pub fn register(&mut self, name: &str, definition: SchemaItemDefinition) {
        match self.sources.get_mut(name) {
            Some(defs) => {
                warn!(item = name, "Schema item registered twice, merging definitions");
                defs.push(definition);
            }
            None => {
                self.order.push(name.to_string());
                self.sources.insert(name.to_string(), vec![definition]);
            }
        }
        self.compile();
    }

    pub fn extend(&mut self, name: &str, definition: SchemaItemDefinition) -> ModelResult<()> {
        let defs = self
            .sources
            .get_mut(name)
            .ok_or_else(|| ModelError::SchemaMissingItem(name.to_string()))?;
        defs.push(definition);
        self.compile();
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    pub fn get_definition(&self, name: &str) -> Option<&CompiledDefinition> {
        self.compiled.get(name)
    }

    /// Compiled definitions in registration order.
    pub fn get_definitions(&self) -> Vec<&CompiledDefinition> {
        self.order.iter().filter_map(|name| self.compiled.get(name)).collect()
    }

    pub fn is_block(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_block).unwrap_or(false)
    }

    pub fn is_inline(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_inline).unwrap_or(false)
    }

    /// Objects are limits too.
    pub fn is_limit(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_limit || d.is_object).unwrap_or(false)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_object).unwrap_or(false)
    }

    pub fn is_content(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_content || d.is_object).unwrap_or(false)
    }

    pub fn is_selectable(&self, name: &str) -> bool {
        self.compiled.get(name).map(|d| d.is_selectable || d.is_object).unwrap_or(false)
    }

    pub fn add_child_check(&mut self, check: impl Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync + 'static) {
        self.child_checks.push(Arc::new(check));
    }

    pub fn add_attribute_check(
        &mut self,
        check: impl Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync + 'static,
    ) {
        self.attribute_checks.push(Arc::new(check));
    }

    /// Whether `child` may be placed at the end of `context`.
    pub fn check_child(&self, context: &SchemaContext, child: &str) -> bool {
        if let Some(verdict) = combine_checks(self.child_checks.iter().map(|check| check(context, child))) {
            return verdict;
        }

        let Some(definition) = self.compiled.get(child) else {
            return false;
        };
        self.check_context_match(definition, context, context.items.len())
    }

    /// Whether the last item of `context` may carry `attribute`.
    pub fn check_attribute(&self, context: &SchemaContext, attribute: &str) -> bool {
        if let Some(verdict) = combine_checks(self.attribute_checks.iter().map(|check| check(context, attribute))) {
            return verdict;
        }

        context
            .last()
            .and_then(|item| self.compiled.get(&item.name))
            .map(|definition| definition.allow_attributes.iter().any(|a| a == attribute))
            .unwrap_or(false)
    }

    pub fn check_child_at(&self, tree: &Tree, position: &Position, child: &str) -> bool {
        SchemaContext::from_position(tree, position)
            .map(|context| self.check_child(&context, child))
            .unwrap_or(false)
    }

    pub fn check_attribute_on(&self, tree: &Tree, id: NodeId, attribute: &str) -> bool {
        self.check_attribute(&SchemaContext::from_node(tree, id), attribute)
    }

    /// Nearest ancestor of `position` (its parent included) that allows
    /// `child`. The search stops at limit elements.
    pub fn find_allowed_parent(&self, tree: &Tree, position: &Position, child: &str) -> Option<NodeId> {
        let mut parent = tree.resolve_parent(position).ok()?;
        loop {
            if self.check_child(&SchemaContext::from_node(tree, parent), child) {
                return Some(parent);
            }
            if self.is_limit(tree.name(parent)) {
                debug!(child, limit = tree.name(parent), "No allowed parent below limit element");
                return None;
            }
            parent = tree.parent(parent)?;
        }
    }

    /// `definition` is allowed inside `context[..end]`, recursively up to
    /// the outermost context item.
    fn check_context_match(&self, definition: &CompiledDefinition, context: &SchemaContext, end: usize) -> bool {
        if end == 0 {
            return false;
        }
        let parent = &context.items[end - 1];
        if !definition.allow_in.iter().any(|name| *name == parent.name) {
            return false;
        }
        if end == 1 {
            return true;
        }
        match self.compiled.get(&parent.name) {
            Some(parent_definition) => self.check_context_match(parent_definition, context, end - 1),
            None => false,
        }
    }

    fn compile(&mut self) {
        let mut working: HashMap<String, WorkingDefinition> = HashMap::new();
        for name in &self.order {
            let mut merged = WorkingDefinition::default();
            for def in self.sources.get(name).into_iter().flatten() {
                merged.merge(def);
            }
            working.insert(name.clone(), merged);
        }

        for name in &self.order {
            let children = working[name].allow_children.clone();
            for child in children {
                if let Some(child_def) = working.get_mut(&child) {
                    child_def.allow_in.push(name.clone());
                }
            }
        }

        for name in &self.order {
            let sources = working[name].allow_content_of.clone();
            for source in sources {
                if !working.contains_key(&source) {
                    continue;
                }
                let holders: Vec<String> = self
                    .order
                    .iter()
                    .filter(|other| working[*other].allow_in.contains(&source))
                    .cloned()
                    .collect();
                for holder in holders {
                    if let Some(def) = working.get_mut(&holder) {
                        def.allow_in.push(name.clone());
                    }
                }
            }
        }

        for name in &self.order {
            let sources = working[name].allow_where.clone();
            for source in sources {
                let inherited = working.get(&source).map(|d| d.allow_in.clone()).unwrap_or_default();
                if let Some(def) = working.get_mut(name) {
                    def.allow_in.extend(inherited);
                }
            }
        }

        for name in &self.order {
            let sources = working[name].allow_attributes_of.clone();
            for source in sources {
                let inherited = working.get(&source).map(|d| d.allow_attributes.clone()).unwrap_or_default();
                if let Some(def) = working.get_mut(name) {
                    def.allow_attributes.extend(inherited);
                }
            }
            let sources = working[name].inherit_types_from.clone();
            for source in sources {
                let Some(from) = working.get(&source).cloned() else {
                    continue;
                };
                if let Some(def) = working.get_mut(name) {
                    def.is_block = def.is_block.or(from.is_block);
                    def.is_inline = def.is_inline.or(from.is_inline);
                    def.is_limit = def.is_limit.or(from.is_limit);
                    def.is_object = def.is_object.or(from.is_object);
                    def.is_content = def.is_content.or(from.is_content);
                    def.is_selectable = def.is_selectable.or(from.is_selectable);
                }
            }
        }

        self.compiled = self
            .order
            .iter()
            .map(|name| {
                let def = &working[name];
                let mut allow_in: Vec<String> = Vec::new();
                for parent in &def.allow_in {
                    if working.contains_key(parent) && !allow_in.contains(parent) {
                        allow_in.push(parent.clone());
                    }
                }
                let mut allow_attributes: Vec<String> = Vec::new();
                for attribute in &def.allow_attributes {
                    if !allow_attributes.contains(attribute) {
                        allow_attributes.push(attribute.clone());
                    }
                }
                let compiled = CompiledDefinition {
                    name: name.clone(),
                    allow_in,
                    allow_attributes,
                    is_block: def.is_block.unwrap_or(false),
                    is_inline: def.is_inline.unwrap_or(false),
                    is_limit: def.is_limit.unwrap_or(false),
                    is_object: def.is_object.unwrap_or(false),
                    is_content: def.is_content.unwrap_or(false),
                    is_selectable: def.is_selectable.unwrap_or(false),
                };
                (name.clone(), compiled)
            })
            .collect();
    }
}

/// Verdict of the custom callbacks: any veto wins over any permit.
fn combine_checks(verdicts: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut verdict = None;
    for outcome in verdicts {
        match outcome {
            Some(false) => verdict = Some(false),
            Some(true) if verdict.is_none() => verdict = Some(true),
            _ => {}
        }
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        let mut schema = Schema::with_base_items();
        schema.register("paragraph", SchemaItemDefinition::new().inherit_all_from("$block"));
        schema.register(
            "simpleBox",
            SchemaItemDefinition::new().inherit_all_from("$blockObject").allow_attributes(["secret"]),
        );
        schema.register("simpleBoxTitle", SchemaItemDefinition::new().allow_in(["simpleBox"]).limit().allow_content_of("$block"));
        schema.extend("$text", SchemaItemDefinition::new().allow_attributes(["bold"])).unwrap();
        schema
    }

    #[test]
    fn test_check_child() {
        let schema = schema();
        let root = SchemaContext::from_names(["$root"]);
        assert!(schema.check_child(&root, "paragraph"));
        assert!(schema.check_child(&root, "simpleBox"));
        assert!(!schema.check_child(&root, "$text"));
        assert!(schema.check_child(&root.clone().push("paragraph"), "$text"));
        assert!(!schema.check_child(&root.clone().push("paragraph"), "paragraph"));
        assert!(schema.check_child(&root.clone().push("simpleBox").push("simpleBoxTitle"), "$text"));
        assert!(!schema.check_child(&root, "unknown"));
    }

    #[test]
    fn test_context_must_match_up_to_root() {
        let schema = schema();
        // A paragraph inside an unknown element is not allowed even though
        // paragraphs may contain text.
        let context = SchemaContext::from_names(["$root", "mystery", "paragraph"]);
        assert!(!schema.check_child(&context, "$text"));
    }

    #[test]
    fn test_attributes_and_flags() {
        let schema = schema();
        let paragraph_text = SchemaContext::from_names(["$root", "paragraph", "$text"]);
        assert!(schema.check_attribute(&paragraph_text, "bold"));
        assert!(!schema.check_attribute(&paragraph_text, "secret"));
        assert!(schema.is_object("simpleBox"));
        assert!(schema.is_limit("simpleBox"));
        assert!(schema.is_block("paragraph"));
        assert!(!schema.is_limit("paragraph"));
    }

    #[test]
    fn test_veto_wins_over_earlier_permit() {
        let mut schema = schema();
        schema.add_child_check(|_, _| Some(true));
        schema.add_child_check(|_, child| (child == "paragraph").then_some(false));
        schema.add_attribute_check(|_, _| Some(true));
        schema.add_attribute_check(|_, attribute| (attribute == "bold").then_some(false));

        let root = SchemaContext::from_names(["$root"]);
        assert!(!schema.check_child(&root, "paragraph"));
        assert!(schema.check_child(&root, "mystery"));

        let text = SchemaContext::from_names(["$root", "paragraph", "$text"]);
        assert!(!schema.check_attribute(&text, "bold"));
        assert!(schema.check_attribute(&text, "italic"));
    }

    #[test]
    fn test_combine_checks() {
        assert_eq!(combine_checks([None, None].into_iter()), None);
        assert_eq!(combine_checks([Some(true), None].into_iter()), Some(true));
        assert_eq!(combine_checks([Some(true), Some(false)].into_iter()), Some(false));
        assert_eq!(combine_checks([Some(false), Some(true)].into_iter()), Some(false));
    }

    #[test]
    fn test_callbacks_override_declarative_rules() {
        let mut schema = schema();
        schema.add_child_check(|context, child| {
            (child == "$text" && context.ends_with(&["simpleBoxTitle"])).then_some(false)
        });
        schema.add_child_check(|_, child| (child == "$text").then_some(true));

        let title = SchemaContext::from_names(["$root", "simpleBox", "simpleBoxTitle"]);
        assert!(!schema.check_child(&title, "$text"));
        // The permissive callback wins over the declarative rules.
        assert!(schema.check_child(&SchemaContext::from_names(["$root"]), "$text"));
    }

    #[test]
    fn test_extend_missing_item_fails() {
        let mut schema = Schema::new();
        assert_eq!(
            schema.extend("nope", SchemaItemDefinition::new()),
            Err(ModelError::SchemaMissingItem("nope".into()))
        );
    }

    #[test]
    fn test_find_allowed_parent_stops_at_limit() {
        let schema = schema();
        let mut tree = Tree::new();
        let root = tree.add_root("main", "$root");
        tree.insert_nodes(
            root,
            0,
            &[crate::node::Node::element("simpleBox").with_child(crate::node::Node::element("simpleBoxTitle"))],
        )
        .unwrap();

        let in_title = Position::new("main", vec![0, 0, 0]);
        assert_eq!(schema.find_allowed_parent(&tree, &in_title, "paragraph"), None);

        let mut tree = Tree::new();
        let root = tree.add_root("main", "$root");
        tree.insert_nodes(root, 0, &[crate::node::Node::element("paragraph")]).unwrap();
        let in_paragraph = Position::new("main", vec![0, 0]);
        assert_eq!(schema.find_allowed_parent(&tree, &in_paragraph, "paragraph"), Some(root));
    }
}
