//! Owned model nodes.
//!
//! [`Node`] is the detached, serializable form of model content. It is the
//! payload of insert operations, the result of upcasting and the shape used
//! to compare document content in tests. Nodes living inside a document are
//! stored in the [`Tree`](crate::tree::Tree) arena instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map. Keys are ordered so serialization is stable.
pub type Attributes = BTreeMap<String, Value>;

/// Name reported for text nodes wherever an item name is expected.
pub const TEXT_NAME: &str = "$text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub data: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Node {
    pub fn element(name: impl Into<String>) -> Self {
        Node::Element(ElementNode {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        })
    }

    pub fn text(data: impl Into<String>) -> Self {
        Node::Text(TextNode {
            data: data.into(),
            attributes: Attributes::new(),
        })
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes_mut().insert(key.into(), value.into());
        self
    }

    /// Appends a child. Has no effect on text nodes.
    pub fn with_child(mut self, child: Node) -> Self {
        if let Node::Element(element) = &mut self {
            element.children.push(child);
        }
        self
    }

    pub fn with_children(self, children: impl IntoIterator<Item = Node>) -> Self {
        children.into_iter().fold(self, Node::with_child)
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Element(e) => &e.name,
            Node::Text(_) => TEXT_NAME,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Node::Element(e) => &e.attributes,
            Node::Text(t) => &t.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Element(e) => &mut e.attributes,
            Node::Text(t) => &mut t.attributes,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(e) => &e.children,
            Node::Text(_) => &[],
        }
    }

    /// Number of offsets the node occupies in its parent: one per character
    /// for text, one for an element.
    pub fn offset_size(&self) -> usize {
        match self {
            Node::Element(_) => 1,
            Node::Text(t) => char_len(&t.data),
        }
    }
}

/// Total offset size of a node list.
pub fn offset_size_of(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::offset_size).sum()
}

/// Merges adjacent text nodes with equal attributes and drops empty text.
pub fn normalize_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) if text.data.is_empty() => {}
            Node::Text(text) => match out.last_mut() {
                Some(Node::Text(prev)) if prev.attributes == text.attributes => prev.data.push_str(&text.data),
                _ => out.push(Node::Text(text)),
            },
            Node::Element(mut element) => {
                element.children = normalize_nodes(element.children);
                out.push(Node::Element(element));
            }
        }
    }
    out
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `n`-th character, or the string length.
pub(crate) fn byte_index(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

pub(crate) fn slice_chars(s: &str, start: usize, end: usize) -> &str {
    &s[byte_index(s, start)..byte_index(s, end)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offset_size_counts_characters() {
        assert_eq!(Node::text("żółw").offset_size(), 4);
        assert_eq!(Node::element("paragraph").with_child(Node::text("abc")).offset_size(), 1);
    }

    #[test]
    fn test_normalize_merges_equal_texts() {
        let nodes = vec![
            Node::text("ab"),
            Node::text("c"),
            Node::text("").with_attribute("bold", true),
            Node::text("d").with_attribute("bold", true),
        ];
        assert_eq!(
            normalize_nodes(nodes),
            vec![Node::text("abc"), Node::text("d").with_attribute("bold", true)]
        );
    }

    #[test]
    fn test_serialization_shape() {
        let node = Node::element("paragraph")
            .with_attribute("alignment", "left")
            .with_child(Node::text("Hi"));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({ "name": "paragraph", "attributes": { "alignment": "left" }, "children": [{ "data": "Hi" }] })
        );
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_slice_chars() {
        assert_eq!(slice_chars("zażółć", 2, 4), "żó");
    }
}
