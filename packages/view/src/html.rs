//! # HTML data processor
//!
//! Converts between HTML strings and view nodes. Parsing is lenient: a tag
//! lexer built on `logos` feeds a small stack machine that closes
//! unbalanced elements, ignores stray closing tags, drops comments and
//! doctypes, and collapses whitespace the way a browser renders it.
//!
//! Stringifying sorts attributes by name, with `class` and `style`
//! synthesized from the element's class list and style map.

use crate::error::ViewResult;
use crate::tree::{ElementKind, ViewNode, ViewNodeId, ViewTree};
use logos::Logos;
use tracing::trace;

#[derive(Logos, Debug, Clone, PartialEq)]
enum HtmlToken<'src> {
    /// Comments and doctypes.
    #[regex(r"<![^>]*>")]
    Declaration,

    #[regex(r"</[a-zA-Z][a-zA-Z0-9:-]*[ \t\r\n]*>", |lex| lex.slice())]
    CloseTag(&'src str),

    #[regex(r#"<[a-zA-Z][a-zA-Z0-9:-]*([^>"']|"[^"]*"|'[^']*')*>"#, |lex| lex.slice())]
    OpenTag(&'src str),

    #[regex(r"[^<]+", |lex| lex.slice())]
    Text(&'src str),

    #[token("<")]
    Lt,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum AttributeToken<'src> {
    #[regex(r#"[^ \t\r\n=/>"']+"#, |lex| lex.slice())]
    Name(&'src str),

    #[token("=")]
    Equals,

    #[regex(r#""[^"]*""#, |lex| &lex.slice()[1..lex.slice().len() - 1])]
    #[regex(r"'[^']*'", |lex| &lex.slice()[1..lex.slice().len() - 1])]
    Quoted(&'src str),

    #[token("/")]
    Slash,
}

struct TagSpec {
    name: String,
    attributes: Vec<(String, String)>,
    self_closing: bool,
}

/// Elements that never have content.
pub fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "img"
            | "input"
            | "br"
            | "hr"
            | "meta"
            | "link"
            | "area"
            | "base"
            | "col"
            | "embed"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Elements whose surrounding whitespace is not rendered.
fn is_block_element(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "aside"
            | "header"
            | "footer"
            | "blockquote"
            | "figure"
            | "figcaption"
            | "ul"
            | "ol"
            | "li"
            | "table"
            | "thead"
            | "tbody"
            | "tr"
            | "td"
            | "th"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "pre"
            | "hr"
            | "br"
    )
}

/// Parses an HTML fragment into detached view nodes.
pub fn parse(tree: &mut ViewTree, html: &str) -> ViewResult<Vec<ViewNodeId>> {
    let fragment = tree.create_element("$fragment", ElementKind::Container);
    let mut stack = vec![fragment];

    for (token, span) in HtmlToken::lexer(html).spanned() {
        let Ok(token) = token else {
            trace!(?span, "Skipping unreadable markup");
            continue;
        };
        let parent = stack.last().copied().unwrap_or(fragment);
        match token {
            HtmlToken::Declaration => {}
            HtmlToken::Text(text) => append_text(tree, parent, &decode_entities(text))?,
            HtmlToken::Lt => append_text(tree, parent, "<")?,
            HtmlToken::OpenTag(raw) => {
                let tag = parse_tag(raw);
                let kind = if is_void_element(&tag.name) {
                    ElementKind::Empty
                } else {
                    ElementKind::Container
                };
                let element = tree.create_element(&tag.name, kind);
                for (key, value) in &tag.attributes {
                    tree.set_attribute(element, key, value)?;
                }
                tree.append_child(parent, element)?;
                if !tag.self_closing && !is_void_element(&tag.name) {
                    stack.push(element);
                }
            }
            HtmlToken::CloseTag(raw) => {
                let name = raw[2..raw.len() - 1].trim().to_ascii_lowercase();
                if let Some(depth) = stack.iter().rposition(|id| *id != fragment && tree.name(*id) == name) {
                    stack.truncate(depth);
                } else {
                    trace!(tag = %name, "Ignoring unmatched closing tag");
                }
            }
        }
    }

    normalize_whitespace(tree, fragment)?;
    let count = tree.children(fragment).len();
    let nodes = tree.remove_children(fragment, 0, count)?;
    tree.destroy(fragment);
    Ok(nodes)
}

fn append_text(tree: &mut ViewTree, parent: ViewNodeId, text: &str) -> ViewResult<()> {
    if let Some(last) = tree.children(parent).last().copied() {
        if let Some(existing) = tree.text(last) {
            let joined = format!("{existing}{text}");
            return tree.set_text(last, joined);
        }
    }
    let id = tree.create_text(text);
    tree.append_child(parent, id)
}

fn parse_tag(raw: &str) -> TagSpec {
    let inner = raw[1..raw.len() - 1].trim();
    let name_end = inner
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(inner.len());
    let name = inner[..name_end].to_ascii_lowercase();

    let mut attributes: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;
    let mut pending: Option<String> = None;
    let mut expecting_value = false;

    for token in AttributeToken::lexer(&inner[name_end..]).flatten() {
        match token {
            AttributeToken::Name(value) if expecting_value => {
                if let Some(key) = pending.take() {
                    attributes.push((key, decode_entities(value)));
                }
                expecting_value = false;
            }
            AttributeToken::Quoted(value) => {
                if let Some(key) = pending.take() {
                    attributes.push((key, decode_entities(value)));
                }
                expecting_value = false;
            }
            AttributeToken::Name(key) => {
                if let Some(previous) = pending.replace(key.to_ascii_lowercase()) {
                    attributes.push((previous, String::new()));
                }
                self_closing = false;
            }
            AttributeToken::Equals => expecting_value = pending.is_some(),
            AttributeToken::Slash => self_closing = true,
        }
    }
    if let Some(key) = pending {
        attributes.push((key, String::new()));
    }

    TagSpec {
        name,
        attributes,
        self_closing,
    }
}

/// Collapses whitespace runs into single spaces and drops whitespace that
/// only separates block elements.
fn normalize_whitespace(tree: &mut ViewTree, parent: ViewNodeId) -> ViewResult<()> {
    if tree.name(parent) == "pre" {
        return Ok(());
    }
    let children = tree.children(parent).to_vec();
    let block_parent = is_block_element(tree.name(parent)) || tree.name(parent) == "$fragment";
    let mut index = 0;
    for (position, child) in children.iter().enumerate() {
        let Some(data) = tree.text(*child).map(str::to_string) else {
            normalize_whitespace(tree, *child)?;
            index += 1;
            continue;
        };
        let collapsed = collapse_spaces(&data);
        let at_block_edge = |neighbor: Option<&ViewNodeId>| match neighbor {
            None => block_parent,
            Some(id) => is_block_element(tree.name(*id)),
        };
        let previous = position.checked_sub(1).and_then(|i| children.get(i));
        let next = children.get(position + 1);
        let mut text = collapsed.as_str();
        if at_block_edge(previous) {
            text = text.trim_start_matches(' ');
        }
        if at_block_edge(next) {
            text = text.trim_end_matches(' ');
        }
        if text.is_empty() {
            tree.remove_children(parent, index, index + 1)?;
            tree.destroy(*child);
            continue;
        }
        let text = text.to_string();
        tree.set_text(*child, text)?;
        index += 1;
    }
    Ok(())
}

fn collapse_spaces(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut in_space = false;
    for c in data.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r') {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            c.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\u{a0}', "&nbsp;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Serializes nodes to HTML.
pub fn stringify(tree: &ViewTree, nodes: &[ViewNodeId]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(tree, *node, &mut out);
    }
    out
}

/// Serializes the children of an element, typically a root.
pub fn stringify_children(tree: &ViewTree, parent: ViewNodeId) -> String {
    stringify(tree, tree.children(parent))
}

fn write_node(tree: &ViewTree, id: ViewNodeId, out: &mut String) {
    let element = match tree.get(id) {
        Some(ViewNode::Text(data)) => {
            out.push_str(&escape_text(data));
            return;
        }
        Some(ViewNode::Element(element)) => element,
        None => return,
    };

    let mut attributes: Vec<(String, String)> = element
        .attributes()
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !element.classes().is_empty() {
        attributes.push(("class".into(), element.classes().join(" ")));
    }
    if !element.styles().is_empty() {
        let style = element
            .styles()
            .iter()
            .map(|(key, value)| format!("{key}:{value};"))
            .collect::<String>();
        attributes.push(("style".into(), style));
    }
    attributes.sort();

    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }
    out.push('>');

    match &element.kind {
        ElementKind::Empty => return,
        ElementKind::Raw { html } => out.push_str(html),
        _ => {
            for child in element.children() {
                write_node(tree, *child, out);
            }
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}
