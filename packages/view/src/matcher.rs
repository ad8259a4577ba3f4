//! Patterns describing view elements, used by upcast converters.

use crate::tree::{ViewElement, ViewNodeId, ViewTree};
use serde::{Deserialize, Serialize};

/// One pattern. Every part that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Attribute keys with an optional required value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, Option<String>)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<(String, Option<String>)>,
}

impl MatcherPattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.attributes.push((key.into(), value.map(str::to_string)));
        self
    }

    pub fn with_style(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.styles.push((key.into(), value.map(str::to_string)));
        self
    }

    pub fn match_element(&self, element: &ViewElement) -> Option<MatchResult> {
        if self.name.as_ref().is_some_and(|name| *name != element.name) {
            return None;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return None;
        }
        for (key, value) in &self.attributes {
            let actual = element.attributes().get(key)?;
            if value.as_ref().is_some_and(|expected| expected != actual) {
                return None;
            }
        }
        for (key, value) in &self.styles {
            let actual = element.styles().get(key)?;
            if value.as_ref().is_some_and(|expected| expected != actual) {
                return None;
            }
        }
        Some(MatchResult {
            name: self.name.is_some(),
            classes: self.classes.clone(),
            attributes: self.attributes.iter().map(|(key, _)| key.clone()).collect(),
            styles: self.styles.iter().map(|(key, _)| key.clone()).collect(),
        })
    }
}

/// What a successful match covered. Upcast converters consume exactly
/// these parts of the element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub name: bool,
    pub classes: Vec<String>,
    pub attributes: Vec<String>,
    pub styles: Vec<String>,
}

/// A set of alternative patterns. The first one that matches wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matcher {
    patterns: Vec<MatcherPattern>,
}

impl Matcher {
    pub fn new(patterns: Vec<MatcherPattern>) -> Self {
        Self { patterns }
    }

    pub fn add(&mut self, pattern: MatcherPattern) {
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[MatcherPattern] {
        &self.patterns
    }

    /// Element name shared by every pattern, used to bucket upcast events.
    pub fn element_name(&self) -> Option<&str> {
        let first = self.patterns.first()?.name.as_deref()?;
        self.patterns
            .iter()
            .all(|p| p.name.as_deref() == Some(first))
            .then_some(first)
    }

    pub fn match_node(&self, tree: &ViewTree, id: ViewNodeId) -> Option<MatchResult> {
        let element = tree.element(id)?;
        self.patterns.iter().find_map(|pattern| pattern.match_element(element))
    }
}

impl From<MatcherPattern> for Matcher {
    fn from(pattern: MatcherPattern) -> Self {
        Self::new(vec![pattern])
    }
}

impl From<&str> for Matcher {
    fn from(name: &str) -> Self {
        Self::new(vec![MatcherPattern::name(name)])
    }
}
