// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The observed surface as seen by the instrumentation agent

use sr_domain_types::{parse_document, Bitmap, DomId, MarkupError, Node, Size};
use std::collections::HashMap;
use thiserror::Error;

/// Failures of individual surface reads; the agent degrades locally on these
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("canvas {0} is tainted by cross-origin content")]
    TaintedCanvas(DomId),

    #[error("access to {0} is restricted")]
    Restricted(String),

    #[error("no element {0} on the surface")]
    NotFound(String),
}

/// Position of a node in the document, as child indices from the root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.to_vec()))
    }

    pub fn resolve<'a>(&self, root: &'a Node) -> Option<&'a Node> {
        self.0.iter().try_fold(root, |node, &index| node.children.get(index))
    }

    pub fn resolve_mut<'a>(&self, root: &'a mut Node) -> Option<&'a mut Node> {
        self.0
            .iter()
            .try_fold(root, |node, &index| node.children.get_mut(index))
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(value: Vec<usize>) -> Self {
        Self(value)
    }
}

/// Host-side view of the page being captured
///
/// The host applies changes to the document itself and then notifies the
/// agent; the agent only writes identity markers back into the tree.
pub trait Surface: Send {
    fn document(&self) -> &Node;
    fn document_mut(&mut self) -> &mut Node;
    fn doctype(&self) -> Option<String>;
    fn url(&self) -> String;
    fn viewport(&self) -> Size;
    fn screen(&self) -> Size;
    fn user_agent(&self) -> String;
    fn referrer(&self) -> Option<String>;

    /// Current bitmap of the canvas carrying `id`
    fn read_canvas(&self, id: &DomId) -> Result<Bitmap, SurfaceError>;
}

#[derive(Debug, Clone)]
enum CanvasState {
    Readable(Bitmap),
    Tainted,
    Restricted,
}

/// In-memory surface for headless hosts and tests
#[derive(Debug, Clone)]
pub struct MemorySurface {
    pub document: Node,
    pub doctype: Option<String>,
    pub url: String,
    pub viewport: Size,
    pub screen: Size,
    pub user_agent: String,
    pub referrer: Option<String>,
    canvases: HashMap<DomId, CanvasState>,
}

impl MemorySurface {
    pub fn new(url: impl Into<String>, document: Node) -> Self {
        Self {
            document,
            doctype: Some("html".to_string()),
            url: url.into(),
            viewport: Size::new(1280, 720),
            screen: Size::new(1920, 1080),
            user_agent: concat!("sr-capture/", env!("CARGO_PKG_VERSION")).to_string(),
            referrer: None,
            canvases: HashMap::new(),
        }
    }

    pub fn from_markup(url: impl Into<String>, markup: &str) -> Result<Self, MarkupError> {
        let parsed = parse_document(markup)?;
        let mut surface = Self::new(url, parsed.root);
        surface.doctype = parsed.doctype;
        Ok(surface)
    }

    pub fn with_viewport(mut self, viewport: Size) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn set_canvas(&mut self, id: impl Into<DomId>, bitmap: Bitmap) {
        self.canvases.insert(id.into(), CanvasState::Readable(bitmap));
    }

    pub fn taint_canvas(&mut self, id: impl Into<DomId>) {
        self.canvases.insert(id.into(), CanvasState::Tainted);
    }

    pub fn restrict_canvas(&mut self, id: impl Into<DomId>) {
        self.canvases.insert(id.into(), CanvasState::Restricted);
    }

    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        path.resolve_mut(&mut self.document)
    }
}

impl Surface for MemorySurface {
    fn document(&self) -> &Node {
        &self.document
    }

    fn document_mut(&mut self) -> &mut Node {
        &mut self.document
    }

    fn doctype(&self) -> Option<String> {
        self.doctype.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn viewport(&self) -> Size {
        self.viewport
    }

    fn screen(&self) -> Size {
        self.screen
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn read_canvas(&self, id: &DomId) -> Result<Bitmap, SurfaceError> {
        match self.canvases.get(id) {
            Some(CanvasState::Readable(bitmap)) => Ok(bitmap.clone()),
            Some(CanvasState::Tainted) => Err(SurfaceError::TaintedCanvas(id.clone())),
            Some(CanvasState::Restricted) => Err(SurfaceError::Restricted(format!("canvas {id}"))),
            None => Err(SurfaceError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_through_children() {
        let surface =
            MemorySurface::from_markup("https://a.example/", "<html><body><p>x</p><div></div></body></html>")
                .unwrap();

        let div = NodePath::from(vec![0, 1]).resolve(surface.document()).unwrap();
        assert_eq!(div.tag, "div");
        assert!(NodePath::from(vec![0, 5]).resolve(surface.document()).is_none());
        assert_eq!(NodePath::from(vec![0, 1]).parent(), Some(NodePath::from(vec![0])));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn canvas_reads_report_their_failure_mode() {
        let mut surface = MemorySurface::new("https://a.example/", Node::element("html"));
        surface.set_canvas("ok", Bitmap::filled(1, 1, [0, 0, 0, 255]));
        surface.taint_canvas("tainted");

        assert!(surface.read_canvas(&DomId::from("ok")).is_ok());
        assert_eq!(
            surface.read_canvas(&DomId::from("tainted")),
            Err(SurfaceError::TaintedCanvas(DomId::from("tainted")))
        );
        assert!(matches!(
            surface.read_canvas(&DomId::from("missing")),
            Err(SurfaceError::NotFound(_))
        ));
    }
}
