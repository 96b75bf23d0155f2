// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Markup codec for node trees
//!
//! Snapshots travel as HTML-like markup. The serializer below is the only
//! producer on the capture side; the parser accepts its output and ordinary
//! well-formed HTML, and reports anything it cannot balance as a MarkupError so
//! replay can fall back to a raw-text preview.

use crate::node::{FRAGMENT_TAG, Node, TEXT_TAG};
use std::collections::BTreeMap;
use thiserror::Error;

/// Elements that never have a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is emitted and parsed verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Error, PartialEq)]
pub enum MarkupError {
    #[error("markup is empty")]
    Empty,

    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),

    #[error("unterminated attribute value starting at byte {0}")]
    UnterminatedAttribute(usize),

    #[error("unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("malformed tag at byte {0}")]
    MalformedTag(usize),

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("closing tag </{found}> does not match <{expected}>")]
    Mismatched { expected: String, found: String },

    #[error("closing tag </{0}> has no matching element")]
    Unexpected(String),
}

/// Result of parsing a full document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub doctype: Option<String>,
    pub root: Node,
}

/// Serialize a node tree to markup
pub fn to_markup(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, &mut out, false);
    out
}

fn write_node(node: &Node, out: &mut String, raw: bool) {
    if node.tag == TEXT_TAG {
        let text = node.text.as_deref().unwrap_or_default();
        if raw {
            out.push_str(text);
        } else {
            out.push_str(&escape_text(text));
        }
        return;
    }

    if node.tag == FRAGMENT_TAG {
        for child in &node.children {
            write_node(child, out, raw);
        }
        return;
    }

    out.push('<');
    out.push_str(&node.tag);
    for (name, value) in &node.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&node.tag.as_str()) {
        return;
    }

    let raw_content = RAW_TEXT_ELEMENTS.contains(&node.tag.as_str());
    if let Some(text) = &node.text {
        if raw_content {
            out.push_str(text);
        } else {
            out.push_str(&escape_text(text));
        }
    }
    for child in &node.children {
        write_node(child, out, raw_content);
    }

    out.push_str("</");
    out.push_str(&node.tag);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Decode the handful of entities the serializer emits plus numeric references
fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
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

/// Parse markup into a single root node
///
/// A single top-level element becomes the root; several top-level nodes are
/// wrapped in a fragment node.
pub fn parse_document(input: &str) -> Result<ParsedDocument, MarkupError> {
    if input.trim().is_empty() {
        return Err(MarkupError::Empty);
    }

    let mut parser = Parser {
        src: input,
        pos: 0,
        doctype: None,
    };
    let mut nodes = parser.parse_nodes(None)?;

    let root = if nodes.len() == 1 {
        nodes.remove(0)
    } else if nodes.is_empty() {
        return Err(MarkupError::Empty);
    } else {
        Node {
            tag: FRAGMENT_TAG.to_string(),
            children: nodes,
            ..Default::default()
        }
    };

    Ok(ParsedDocument {
        doctype: parser.doctype,
        root,
    })
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    doctype: Option<String>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn parse_nodes(&mut self, closing: Option<&str>) -> Result<Vec<Node>, MarkupError> {
        let mut nodes = Vec::new();

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return match closing {
                    Some(tag) => Err(MarkupError::Unclosed(tag.to_string())),
                    None => Ok(nodes),
                };
            }

            if rest.starts_with("<!--") {
                let start = self.pos;
                let end = rest.find("-->").ok_or(MarkupError::UnterminatedComment(start))?;
                self.pos += end + 3;
            } else if rest.starts_with("<!") {
                let start = self.pos;
                let end = rest.find('>').ok_or(MarkupError::UnterminatedTag(start))?;
                let declaration = rest[2..end].trim();
                if self.doctype.is_none() && declaration.to_ascii_lowercase().starts_with("doctype") {
                    self.doctype = Some(declaration[7..].trim().to_string());
                }
                self.pos += end + 1;
            } else if let Some(after) = rest.strip_prefix("</") {
                let start = self.pos;
                let end = after.find('>').ok_or(MarkupError::UnterminatedTag(start))?;
                let name = after[..end].trim().to_ascii_lowercase();
                self.pos += 2 + end + 1;
                return match closing {
                    Some(expected) if expected == name => Ok(nodes),
                    Some(expected) => Err(MarkupError::Mismatched {
                        expected: expected.to_string(),
                        found: name,
                    }),
                    None => Err(MarkupError::Unexpected(name)),
                };
            } else if starts_element(rest) {
                nodes.push(self.parse_element()?);
            } else {
                let len = next_markup_boundary(rest);
                let text = &rest[..len];
                self.pos += len;
                if !text.trim().is_empty() {
                    nodes.push(Node::text(decode_entities(text)));
                }
            }
        }
    }

    fn parse_element(&mut self) -> Result<Node, MarkupError> {
        let start = self.pos;
        self.pos += 1;

        let name_len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'))
            .unwrap_or(self.rest().len());
        let tag = self.rest()[..name_len].to_ascii_lowercase();
        self.pos += name_len;

        let mut attributes = BTreeMap::new();
        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(MarkupError::UnterminatedTag(start));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }

            let (name, value) = self.parse_attribute(start)?;
            attributes.entry(name).or_insert(value);
        };

        let mut node = Node {
            tag,
            attributes,
            ..Default::default()
        };

        if self_closing || VOID_ELEMENTS.contains(&node.tag.as_str()) {
            return Ok(node);
        }

        if RAW_TEXT_ELEMENTS.contains(&node.tag.as_str()) {
            let closing = format!("</{}", node.tag);
            let rest = self.rest();
            let end = rest
                .to_ascii_lowercase()
                .find(&closing)
                .ok_or_else(|| MarkupError::Unclosed(node.tag.clone()))?;
            let content = &rest[..end];
            let after = &rest[end..];
            let close_end = after.find('>').ok_or(MarkupError::UnterminatedTag(self.pos + end))?;
            if !content.is_empty() {
                node.children.push(Node::text(content));
            }
            self.pos += end + close_end + 1;
            return Ok(node);
        }

        let tag = node.tag.clone();
        node.children = self.parse_nodes(Some(&tag))?;
        Ok(node)
    }

    fn parse_attribute(&mut self, tag_start: usize) -> Result<(String, String), MarkupError> {
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/' || c == '<')
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(MarkupError::MalformedTag(self.pos));
        }
        let name = rest[..name_len].to_ascii_lowercase();
        self.pos += name_len;

        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return Ok((name, String::new()));
        }
        self.pos += 1;
        self.skip_whitespace();

        let rest = self.rest();
        let value_start = self.pos;
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let end = rest[1..]
                    .find(quote)
                    .ok_or(MarkupError::UnterminatedAttribute(value_start))?;
                self.pos += end + 2;
                decode_entities(&rest[1..=end])
            }
            Some(_) => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += end;
                decode_entities(&rest[..end])
            }
            None => return Err(MarkupError::UnterminatedTag(tag_start)),
        };

        Ok((name, value))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }
}

fn starts_element(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Length of the text run before the next tag, comment or declaration
fn next_markup_boundary(rest: &str) -> usize {
    let mut offset = 0;
    loop {
        match rest[offset..].find('<') {
            None => return rest.len(),
            Some(idx) => {
                let candidate = &rest[offset + idx..];
                if idx + offset > 0
                    && (starts_element(candidate) || candidate.starts_with("</") || candidate.starts_with("<!"))
                {
                    return offset + idx;
                }
                if idx + offset == 0 && !starts_element(candidate) {
                    // Stray '<' at the very start of a text run
                    offset += 1;
                    continue;
                }
                offset += idx + 1;
            }
        }
    }
}
