// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Reconstruction of the replayed surface at a point in time
//!
//! The engine keeps one authoritative tree baseline, always a full recorded
//! snapshot, plus an independent canvas bitmap cache. Moving in time swaps
//! baselines; incremental `dom_mutation` records are not replayed onto the
//! tree, so between two snapshots the visible tree is the earlier snapshot.

use crate::config::ReplayConfig;
use crate::sanitize::sanitize;
use crate::timeline::Timeline;
use crate::transform::ViewportTransform;
use sr_domain_types::{
    parse_document, Bitmap, CanvasCapture, DomId, DomSnapshot, Event, EventPayload, Node, Size,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const PREVIEW_CHARS: usize = 200;

/// What the replay shows for the document tree
#[derive(Debug, Clone, PartialEq)]
pub enum DomView {
    Tree { doctype: Option<String>, root: Node },
    /// Text of markup that could not be parsed
    RawText(String),
    /// Diagnostic shown when there is nothing to render
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayer {
    pub dom_id: DomId,
    pub bitmap: Bitmap,
}

/// Cursor position in container coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorOverlay {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickPulse {
    pub x: f64,
    pub y: f64,
    /// Fraction of the pulse animation already elapsed, in `[0, 1)`
    pub progress: f64,
}

/// Everything a renderer needs to draw one instant of the replay
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: u64,
    pub url: Option<String>,
    pub dom: DomView,
    /// Timestamp of the snapshot the tree comes from
    pub baseline_at: Option<u64>,
    pub canvases: Vec<CanvasLayer>,
    pub cursor: Option<CursorOverlay>,
    pub click: Option<ClickPulse>,
    pub transform: ViewportTransform,
}

#[derive(Debug, Clone)]
struct Baseline {
    at: u64,
    dom: DomView,
    viewport: Size,
}

#[derive(Debug, Clone, Copy)]
struct Click {
    at: u64,
    x: f64,
    y: f64,
}

pub struct ReconstructionEngine {
    timeline: Arc<Timeline>,
    config: ReplayConfig,
    baseline: Option<Baseline>,
    canvases: BTreeMap<DomId, Bitmap>,
    cursor: Option<(f64, f64)>,
    last_click: Option<Click>,
    url: Option<String>,
    time: u64,
}

impl ReconstructionEngine {
    pub fn new(timeline: Arc<Timeline>, config: ReplayConfig) -> Self {
        let mut engine = Self {
            timeline,
            config,
            baseline: None,
            canvases: BTreeMap::new(),
            cursor: None,
            last_click: None,
            url: None,
            time: 0,
        };
        engine.reset();
        engine
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    /// Forget all applied events
    ///
    /// The first recorded snapshot stays adopted as the fallback baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.canvases.clear();
        self.cursor = None;
        self.last_click = None;
        self.url = self.timeline.session().url.clone();
        self.time = 0;

        let timeline = Arc::clone(&self.timeline);
        let first = timeline.snapshots().next();
        if let Some((at, snapshot)) = first {
            self.adopt(at, snapshot);
        }
    }

    /// Recompute the full state at `target` without dispatching
    pub fn seek(&mut self, target: u64) -> Frame {
        self.reset();

        let timeline = Arc::clone(&self.timeline);
        let window = timeline.window(..=target);
        let baseline_index = window
            .iter()
            .rposition(|event| matches!(event.payload, EventPayload::DomSnapshot(_)));

        if let Some(index) = baseline_index {
            if let EventPayload::DomSnapshot(snapshot) = &window[index].payload {
                self.adopt(window[index].timestamp, snapshot);
            }
        }

        for (index, event) in window.iter().enumerate() {
            match &event.payload {
                EventPayload::CanvasUpdate(capture) => {
                    if baseline_index.map_or(true, |baseline| index > baseline) {
                        self.overlay_canvas(event.timestamp, capture);
                    }
                }
                EventPayload::DomSnapshot(snapshot) => self.note_url(&snapshot.url),
                _ => self.apply_overlay(event),
            }
        }

        self.time = target;
        debug!(target, baseline_at = ?self.baseline.as_ref().map(|b| b.at), "seek");
        self.frame_at(target)
    }

    /// Apply one event during playback dispatch
    pub fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::DomSnapshot(snapshot) => {
                self.adopt(event.timestamp, snapshot);
                self.note_url(&snapshot.url);
            }
            EventPayload::CanvasUpdate(capture) => self.overlay_canvas(event.timestamp, capture),
            EventPayload::DomMutation(batch) => {
                trace!(
                    at = event.timestamp,
                    mutations = batch.mutations.len(),
                    "mutation batch left for the next snapshot"
                );
            }
            _ => self.apply_overlay(event),
        }
        self.time = self.time.max(event.timestamp);
    }

    /// Frame of the current state as seen at `now`
    pub fn frame_at(&self, now: u64) -> Frame {
        let transform = self.transform();
        let cursor = self.cursor.map(|(x, y)| {
            let (x, y) = transform.map(x, y);
            CursorOverlay { x, y }
        });
        let click = self.last_click.and_then(|click| {
            let age = now.checked_sub(click.at)?;
            if age >= self.config.click_pulse_ms {
                return None;
            }
            let (x, y) = transform.map(click.x, click.y);
            Some(ClickPulse {
                x,
                y,
                progress: age as f64 / self.config.click_pulse_ms as f64,
            })
        });

        let (dom, baseline_at) = match &self.baseline {
            Some(baseline) => (baseline.dom.clone(), Some(baseline.at)),
            None => (DomView::Placeholder("no snapshot recorded".to_string()), None),
        };

        Frame {
            time: now,
            url: self.url.clone(),
            dom,
            baseline_at,
            canvases: self
                .canvases
                .iter()
                .map(|(dom_id, bitmap)| CanvasLayer {
                    dom_id: dom_id.clone(),
                    bitmap: bitmap.clone(),
                })
                .collect(),
            cursor,
            click,
            transform,
        }
    }

    fn transform(&self) -> ViewportTransform {
        let recorded = self
            .baseline
            .as_ref()
            .map(|baseline| baseline.viewport)
            .filter(|size| size.width > 0 && size.height > 0)
            .or(self.timeline.session().viewport)
            .unwrap_or(self.config.container);
        ViewportTransform::fit(recorded, self.config.container, self.config.scale)
    }

    fn adopt(&mut self, at: u64, snapshot: &DomSnapshot) {
        self.canvases = snapshot
            .canvases
            .iter()
            .filter_map(|capture| Some((capture.dom_id.clone(), restore(at, capture)?)))
            .collect();
        self.baseline = Some(Baseline {
            at,
            dom: build_view(snapshot),
            viewport: snapshot.viewport,
        });
    }

    fn overlay_canvas(&mut self, at: u64, capture: &CanvasCapture) {
        if let Some(bitmap) = restore(at, capture) {
            self.canvases.insert(capture.dom_id.clone(), bitmap);
        }
    }

    fn note_url(&mut self, url: &str) {
        if !url.is_empty() {
            self.url = Some(url.to_string());
        }
    }

    fn apply_overlay(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::PointerMove(pos) => self.cursor = Some((pos.x, pos.y)),
            EventPayload::Click(pos) => {
                self.cursor = Some((pos.x, pos.y));
                self.last_click = Some(Click {
                    at: event.timestamp,
                    x: pos.x,
                    y: pos.y,
                });
            }
            EventPayload::SessionStart(start) => self.note_url(&start.url),
            _ => {}
        }
    }
}

/// Bitmap scaled to its recorded element size; `None` when that size is unusable
fn restore(at: u64, capture: &CanvasCapture) -> Option<Bitmap> {
    match capture.bitmap.resized(capture.width, capture.height) {
        Ok(bitmap) => Some(bitmap),
        Err(err) => {
            warn!(at, dom_id = %capture.dom_id, error = %err, "dropping canvas capture");
            None
        }
    }
}

fn build_view(snapshot: &DomSnapshot) -> DomView {
    if snapshot.html.trim().is_empty() {
        return DomView::Placeholder("snapshot has no markup".to_string());
    }
    match parse_document(&snapshot.html) {
        Ok(document) => {
            let mut root = document.root;
            sanitize(&mut root);
            DomView::Tree {
                doctype: snapshot.doctype.clone().or(document.doctype),
                root,
            }
        }
        Err(err) => {
            warn!(error = %err, "snapshot markup unparseable, showing text preview");
            DomView::RawText(text_preview(&snapshot.html))
        }
    }
}

/// Tag-stripped, whitespace-collapsed start of `markup`
fn text_preview(markup: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}
