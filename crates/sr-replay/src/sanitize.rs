// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Neutralise replayed markup
//!
//! Replay must never execute recorded scripts, fire recorded handlers,
//! navigate or submit. Script elements are dropped, `on*` attributes removed,
//! and anchor `href` / form `action` values moved to inert `data-sr-*`
//! attributes so they stay inspectable.

use sr_domain_types::Node;

pub const NEUTRALISED_HREF: &str = "data-sr-href";
pub const NEUTRALISED_ACTION: &str = "data-sr-action";

/// Tally of what [`sanitize`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub scripts_removed: usize,
    pub handlers_removed: usize,
    pub links_neutralised: usize,
}

pub fn sanitize(node: &mut Node) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    sanitize_into(node, &mut report);
    report
}

fn sanitize_into(node: &mut Node, report: &mut SanitizeReport) {
    let before = node.children.len();
    node.children.retain(|child| child.tag != "script");
    report.scripts_removed += before - node.children.len();

    let handlers: Vec<String> = node
        .attributes
        .keys()
        .filter(|name| name.to_ascii_lowercase().starts_with("on"))
        .cloned()
        .collect();
    for name in handlers {
        node.attributes.remove(&name);
        report.handlers_removed += 1;
    }

    let moved = match node.tag.as_str() {
        "a" | "area" => Some(("href", NEUTRALISED_HREF)),
        "form" => Some(("action", NEUTRALISED_ACTION)),
        _ => None,
    };
    if let Some((from, to)) = moved {
        if let Some(value) = node.attributes.remove(from) {
            node.attributes.insert(to.to_string(), value);
            report.links_neutralised += 1;
        }
    }

    for child in &mut node.children {
        sanitize_into(child, report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain_types::parse_document;

    #[test]
    fn scripts_handlers_and_links_are_neutralised() {
        let mut doc = parse_document(
            "<html><head><script>alert(1)</script></head>\
             <body onload=\"boot()\"><a href=\"/next\" onclick=\"go()\">next</a>\
             <form action=\"/submit\"><button onClick=\"x()\">send</button></form></body></html>",
        )
        .unwrap()
        .root;

        let report = sanitize(&mut doc);
        assert_eq!(
            report,
            SanitizeReport {
                scripts_removed: 1,
                handlers_removed: 3,
                links_neutralised: 2,
            }
        );

        let head = &doc.children[0];
        assert!(head.children.is_empty());
        let body = &doc.children[1];
        assert_eq!(body.attr("onload"), None);
        let anchor = &body.children[0];
        assert_eq!(anchor.attr("href"), None);
        assert_eq!(anchor.attr(NEUTRALISED_HREF), Some("/next"));
        let form = &body.children[1];
        assert_eq!(form.attr(NEUTRALISED_ACTION), Some("/submit"));
        assert!(form.children[0].attributes.is_empty());
    }

    #[test]
    fn ordinary_attributes_survive() {
        let mut node = Node::element("div")
            .with_attr("class", "panel")
            .with_attr("data-sr-id", "main")
            .with_child(Node::element("link").with_attr("href", "/style.css"));
        let report = sanitize(&mut node);

        assert_eq!(report, SanitizeReport::default());
        assert_eq!(node.attr("class"), Some("panel"));
        assert_eq!(node.children[0].attr("href"), Some("/style.css"));
    }
}
