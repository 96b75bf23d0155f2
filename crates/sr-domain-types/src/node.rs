// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Generic node tree used to describe the observed surface

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute carrying the synthetic identity of an element
pub const MARKER_ATTRIBUTE: &str = "data-sr-id";

/// Tag used for text nodes
pub const TEXT_TAG: &str = "#text";

/// Tag used when a parsed document has more than one top-level node
pub const FRAGMENT_TAG: &str = "#fragment";

/// Synthetic element identity, stable for the lifetime of one capture session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomId(pub String);

impl DomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A node of the observed tree
///
/// Elements carry a tag, attributes and ordered children. Text nodes use the
/// [`TEXT_TAG`] tag and keep their content in `text`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Node {
    /// Create an element with no attributes or children
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Create a text node
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn is_fragment(&self) -> bool {
        self.tag == FRAGMENT_TAG
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Natural id of the element, if it has a non-empty `id` attribute
    pub fn natural_id(&self) -> Option<&str> {
        self.attr("id").map(str::trim).filter(|id| !id.is_empty())
    }

    /// Synthetic identity previously written onto this element
    pub fn dom_id(&self) -> Option<DomId> {
        self.attr(MARKER_ATTRIBUTE).map(DomId::from)
    }

    pub fn set_dom_id(&mut self, id: &DomId) {
        self.attributes.insert(MARKER_ATTRIBUTE.to_string(), id.0.clone());
    }

    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Depth-first search for the element carrying `id`
    pub fn find(&self, id: &DomId) -> Option<&Node> {
        if self.attr(MARKER_ATTRIBUTE) == Some(id.as_str()) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Visit every node in document order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Count of nodes in this subtree, including `self`
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_id_ignores_blank_values() {
        let node = Node::element("div").with_attr("id", "  ");
        assert_eq!(node.natural_id(), None);

        let node = Node::element("div").with_attr("id", "main");
        assert_eq!(node.natural_id(), Some("main"));
    }

    #[test]
    fn find_locates_marked_descendant() {
        let target = Node::element("span").with_attr(MARKER_ATTRIBUTE, "sr-1");
        let tree = Node::element("body").with_child(Node::element("div").with_child(target.clone()));

        assert_eq!(tree.find(&DomId::from("sr-1")), Some(&target));
        assert!(tree.find(&DomId::from("missing")).is_none());
    }

    #[test]
    fn text_content_concatenates_in_order() {
        let tree = Node::element("p")
            .with_child(Node::text("Hello, "))
            .with_child(Node::element("b").with_child(Node::text("world")));
        assert_eq!(tree.text_content(), "Hello, world");
        assert_eq!(tree.subtree_len(), 4);
    }
}
