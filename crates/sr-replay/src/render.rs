// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Rendering seam

use crate::engine::{DomView, Frame};
use sr_domain_types::{Node, MARKER_ATTRIBUTE};
use std::fmt::Write as _;
use std::io::{self, Write};

const TEXT_PREVIEW_CHARS: usize = 60;

/// Receives every frame the replay produces
pub trait Renderer {
    fn render(&mut self, frame: &Frame) -> io::Result<()>;
}

/// Renders frames as an indented textual outline
pub struct TextRenderer<W> {
    out: W,
    show_tree: bool,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_tree: true,
        }
    }

    /// Header lines only, without the document outline
    pub fn compact(mut self) -> Self {
        self.show_tree = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn render(&mut self, frame: &Frame) -> io::Result<()> {
        let text = describe(frame, self.show_tree);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

/// Textual outline of a frame
pub fn describe(frame: &Frame, with_tree: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{} ms] {} (scale {:.2})",
        frame.time,
        frame.url.as_deref().unwrap_or("<unknown url>"),
        frame.transform.scale
    );
    if let Some(cursor) = frame.cursor {
        let _ = writeln!(out, "cursor ({:.1}, {:.1})", cursor.x, cursor.y);
    }
    if let Some(click) = frame.click {
        let _ = writeln!(
            out,
            "click ({:.1}, {:.1}) {:.0}%",
            click.x,
            click.y,
            click.progress * 100.0
        );
    }
    for canvas in &frame.canvases {
        let _ = writeln!(
            out,
            "canvas {} {}x{}",
            canvas.dom_id,
            canvas.bitmap.width(),
            canvas.bitmap.height()
        );
    }

    match &frame.dom {
        DomView::Tree { doctype, root } => {
            if let Some(doctype) = doctype {
                let _ = writeln!(out, "<!DOCTYPE {doctype}>");
            }
            if with_tree {
                outline(root, 0, &mut out);
            }
        }
        DomView::RawText(text) => {
            let _ = writeln!(out, "(unparsed) {text}");
        }
        DomView::Placeholder(reason) => {
            let _ = writeln!(out, "(placeholder) {reason}");
        }
    }
    out
}

fn outline(node: &Node, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if node.is_text() {
        let text = node.text.as_deref().unwrap_or_default().trim();
        if !text.is_empty() {
            let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
            let _ = writeln!(out, "{indent}\"{preview}\"");
        }
        return;
    }

    let _ = write!(out, "{indent}<{}", node.tag);
    if let Some(id) = node.natural_id().or_else(|| node.attr(MARKER_ATTRIBUTE)) {
        let _ = write!(out, " #{id}");
    }
    let _ = writeln!(out, ">");
    for child in &node.children {
        outline(child, depth + 1, out);
    }
}
