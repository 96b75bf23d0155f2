// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Instrumentation agent
//!
//! The agent is a plain state machine owned by the host. The host forwards
//! user-interaction callbacks, mutation notices and a timer pump (`tick`) with
//! its own clock reading in milliseconds; the agent turns them into events in
//! the shared [`EventBuffer`](crate::buffer::EventBuffer) and raises a flush
//! request when the buffer should be delivered.

use crate::buffer::CaptureShared;
use crate::config::CaptureConfig;
use crate::identity;
use crate::scoring;
use crate::surface::{NodePath, Surface};
use sr_domain_types::{
    check_dimensions, to_markup, CanvasCapture, DomId, DomSnapshot, Event, EventPayload,
    InitialState, InputChange, InteractiveElement, MutationBatch, MutationRecord, Node,
    PointerButton, PointerPosition, ScrollPosition, SessionEnd, SessionStart, SessionUpsert,
    Visibility,
};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "details", "summary",
];
const INTERACTIVE_ROLES: &[&str] = &["button", "link", "checkbox", "radio", "tab", "menuitem"];
const MAX_LABEL_CHARS: usize = 80;
const CANVAS_TAG: &str = "canvas";

/// Structural change reported by the host after it modified the document
///
/// Paths refer to the document as it is when the notice is delivered.
/// Removed nodes are handed over by value since they are no longer reachable.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationNotice {
    ChildList {
        parent: NodePath,
        added: Vec<NodePath>,
        removed: Vec<Node>,
    },
    Attribute {
        target: NodePath,
        name: String,
    },
    Text {
        target: NodePath,
    },
}

#[derive(Debug, Default)]
struct Throttle {
    last: Option<u64>,
}

impl Throttle {
    fn admit(&mut self, now: u64, interval_ms: u64) -> bool {
        match self.last {
            Some(last) if now.saturating_sub(last) < interval_ms => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Default)]
struct Throttles {
    pointer: Throttle,
    drag: Throttle,
    scroll: Throttle,
}

pub struct InstrumentationAgent<S> {
    surface: S,
    config: CaptureConfig,
    shared: CaptureShared,
    running: bool,
    start_ms: u64,
    log: Vec<Event>,
    throttles: Throttles,
    pending_mutations: Vec<MutationRecord>,
    last_drain: Option<u64>,
    frame_requested: bool,
    last_snapshot: Option<u64>,
    next_periodic_snapshot: u64,
    interaction_snapshot_due: Option<u64>,
    last_interaction_snapshot: Option<u64>,
    canvas_due: BTreeMap<DomId, u64>,
    stroke_canvas: Option<DomId>,
    next_navigation_poll: u64,
    current_url: String,
    next_periodic_flush: u64,
    flush_requested: bool,
}

impl<S: Surface> InstrumentationAgent<S> {
    pub fn new(surface: S, config: CaptureConfig) -> Self {
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::with_shared(surface, config, CaptureShared::new(session_id))
    }

    /// Build an agent over shared state created by the embedder
    pub fn with_shared(surface: S, config: CaptureConfig, shared: CaptureShared) -> Self {
        Self {
            surface,
            config,
            shared,
            running: false,
            start_ms: 0,
            log: Vec::new(),
            throttles: Throttles::default(),
            pending_mutations: Vec::new(),
            last_drain: None,
            frame_requested: false,
            last_snapshot: None,
            next_periodic_snapshot: 0,
            interaction_snapshot_due: None,
            last_interaction_snapshot: None,
            canvas_due: BTreeMap::new(),
            stroke_canvas: None,
            next_navigation_poll: 0,
            current_url: String::new(),
            next_periodic_flush: 0,
            flush_requested: false,
        }
    }

    pub fn shared(&self) -> &CaptureShared {
        &self.shared
    }

    pub fn session_id(&self) -> String {
        self.shared.session_id()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Events emitted since the last `start`
    pub fn log(&self) -> &[Event] {
        &self.log
    }

    /// Whether the agent wants a render-aligned callback to finish a mutation drain
    pub fn wants_animation_frame(&self) -> bool {
        self.frame_requested
    }

    /// Consume a pending flush request
    pub fn take_flush_request(&mut self) -> bool {
        std::mem::take(&mut self.flush_requested)
    }

    /// Begin observation and emit the initial full-state capture
    ///
    /// Returns `false` when the agent is already running or capture has been
    /// switched off.
    pub fn start(&mut self, now: u64) -> bool {
        if self.running {
            debug!("capture already running");
            return false;
        }
        if !self.shared.switch.is_enabled() {
            warn!("capture is disabled, not starting");
            return false;
        }

        self.running = true;
        self.start_ms = now;
        self.log.clear();
        self.throttles = Throttles::default();
        self.pending_mutations.clear();
        self.last_drain = None;
        self.frame_requested = false;
        self.last_snapshot = None;
        self.interaction_snapshot_due = None;
        self.last_interaction_snapshot = None;
        self.canvas_due.clear();
        self.stroke_canvas = None;
        self.next_periodic_snapshot = now + self.config.periodic_snapshot_ms;
        self.next_navigation_poll = now + self.config.navigation_poll_ms;
        self.next_periodic_flush = now + self.config.flush_interval_ms;

        identity::assign_ids(self.surface.document_mut());

        let url = self.surface.url();
        let viewport = self.surface.viewport();
        let screen = self.surface.screen();
        let user_agent = self.surface.user_agent();
        let referrer = self.surface.referrer();
        self.current_url = url.clone();
        self.shared.describe_session(SessionUpsert {
            session_id: self.shared.session_id(),
            url: Some(url.clone()),
            viewport: Some(viewport),
            user_agent: Some(user_agent.clone()),
            screen_resolution: Some(screen),
            referrer: referrer.clone(),
            start_time: Some(now),
            end_time: None,
        });

        info!(session_id = %self.shared.session_id(), url = %url, "capture started");

        self.emit(
            now,
            EventPayload::SessionStart(SessionStart {
                url,
                viewport,
                screen,
                user_agent,
                referrer,
            }),
        );
        let elements = interactive_inventory(self.surface.document());
        self.emit(now, EventPayload::InitialState(InitialState { elements }));
        self.capture_snapshot(now);
        true
    }

    /// Halt observation and return every event emitted this session
    pub fn stop(&mut self, now: u64) -> Vec<Event> {
        if !self.running {
            return Vec::new();
        }

        self.drain_mutations(now);
        self.capture_snapshot(now);
        self.emit(
            now,
            EventPayload::SessionEnd(SessionEnd {
                reason: "stopped".to_string(),
            }),
        );

        self.running = false;
        self.frame_requested = false;
        self.interaction_snapshot_due = None;
        self.canvas_due.clear();
        self.stroke_canvas = None;
        self.flush_requested = true;

        info!(
            session_id = %self.shared.session_id(),
            events = self.log.len(),
            "capture stopped"
        );
        std::mem::take(&mut self.log)
    }

    pub fn on_pointer_move(&mut self, now: u64, x: f64, y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        if !self.throttles.pointer.admit(now, self.config.pointer_throttle_ms) {
            trace!("pointer move throttled");
            return;
        }
        let target = self.target_id(target);
        self.emit(now, EventPayload::PointerMove(PointerPosition { x, y, target }));
    }

    pub fn on_pointer_down(&mut self, now: u64, x: f64, y: f64, button: u8, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        let target_id = self.target_id(target);
        self.emit(
            now,
            EventPayload::PointerDown(PointerButton {
                x,
                y,
                button,
                target: target_id.clone(),
            }),
        );

        if let Some(id) = target_id.filter(|_| self.is_canvas(target)) {
            self.capture_canvas(now, &id);
            self.stroke_canvas = Some(id);
        }
    }

    pub fn on_pointer_up(&mut self, now: u64, x: f64, y: f64, button: u8, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        let target = self.target_id(target);
        self.emit(now, EventPayload::PointerUp(PointerButton { x, y, button, target }));

        if let Some(canvas) = self.stroke_canvas.take() {
            let due = now + self.config.stroke_capture_delay_ms;
            self.canvas_due.insert(canvas, due);
        }
    }

    pub fn on_click(&mut self, now: u64, x: f64, y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        let target = self.target_id(target);
        self.emit(now, EventPayload::Click(PointerPosition { x, y, target }));
        self.schedule_interaction_snapshot(now);
    }

    pub fn on_scroll(&mut self, now: u64, scroll_x: f64, scroll_y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        if !self.throttles.scroll.admit(now, self.config.scroll_throttle_ms) {
            trace!("scroll throttled");
            return;
        }
        let target = self.target_id(target);
        self.emit(
            now,
            EventPayload::Scroll(ScrollPosition {
                scroll_x,
                scroll_y,
                target,
            }),
        );
    }

    pub fn on_input(&mut self, now: u64, target: &NodePath, value: &str) {
        if !self.accepting() {
            return;
        }
        let Some(target_id) = self.target_id(Some(target)) else {
            warn!(path = ?target.0, "input target is not on the surface");
            return;
        };

        let is_password = target
            .resolve(self.surface.document())
            .is_some_and(is_password_input);
        let masked = is_password && self.config.mask_passwords;
        let value = if masked {
            mask(value)
        } else {
            value.to_string()
        };

        self.emit(
            now,
            EventPayload::InputChange(InputChange {
                target: target_id,
                value,
                masked,
            }),
        );
    }

    pub fn on_visibility_change(&mut self, now: u64, visible: bool) {
        if !self.accepting() {
            return;
        }
        self.emit(now, EventPayload::VisibilityChange(Visibility { visible }));
    }

    pub fn on_drag_start(&mut self, now: u64, x: f64, y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        self.throttles.drag.reset();
        let target = self.target_id(target);
        self.emit(now, EventPayload::DragStart(PointerPosition { x, y, target }));
    }

    pub fn on_drag(&mut self, now: u64, x: f64, y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        if !self.throttles.drag.admit(now, self.config.drag_throttle_ms) {
            trace!("drag throttled");
            return;
        }
        let target = self.target_id(target);
        self.emit(now, EventPayload::Drag(PointerPosition { x, y, target }));
    }

    pub fn on_drag_end(&mut self, now: u64, x: f64, y: f64, target: Option<&NodePath>) {
        if !self.accepting() {
            return;
        }
        let target = self.target_id(target);
        self.emit(now, EventPayload::DragEnd(PointerPosition { x, y, target }));
    }

    pub fn on_keyup(&mut self, now: u64) {
        if self.accepting() {
            self.schedule_interaction_snapshot(now);
        }
    }

    pub fn on_submit(&mut self, now: u64) {
        if self.accepting() {
            self.schedule_interaction_snapshot(now);
        }
    }

    /// Queue structural changes; they are drained at most once per drain window
    pub fn on_mutations(&mut self, now: u64, notices: Vec<MutationNotice>) {
        if !self.accepting() || notices.is_empty() {
            return;
        }

        identity::assign_ids(self.surface.document_mut());
        for notice in notices {
            if let Some(record) = self.resolve_notice(notice) {
                self.pending_mutations.push(record);
            }
        }
        self.try_drain(now);
    }

    /// A drawing operation touched the canvas at `canvas`
    pub fn on_canvas_draw(&mut self, now: u64, canvas: &NodePath) {
        if !self.accepting() {
            return;
        }
        match self.target_id(Some(canvas)) {
            Some(id) => {
                let due = now + self.config.canvas_debounce_ms;
                self.canvas_due.insert(id, due);
            }
            None => warn!(path = ?canvas.0, "drawn canvas is not on the surface"),
        }
    }

    /// Render-aligned callback requested through [`Self::wants_animation_frame`]
    pub fn on_animation_frame(&mut self, now: u64) {
        self.frame_requested = false;
        if self.accepting() {
            self.try_drain(now);
        }
    }

    /// Explicit navigation hook; checks the URL immediately
    pub fn on_history_navigation(&mut self, now: u64) {
        if self.accepting() {
            self.check_navigation(now);
        }
    }

    /// Timer pump
    pub fn tick(&mut self, now: u64) {
        if !self.accepting() {
            return;
        }

        let due_canvases: Vec<DomId> = self
            .canvas_due
            .iter()
            .filter(|&(_, &due)| due <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in due_canvases {
            self.canvas_due.remove(&id);
            self.capture_canvas(now, &id);
        }

        if self.interaction_snapshot_due.is_some_and(|due| due <= now) {
            self.interaction_snapshot_due = None;
            self.last_interaction_snapshot = Some(now);
            debug!("interaction snapshot");
            self.capture_snapshot(now);
        }

        if now >= self.next_periodic_snapshot {
            self.next_periodic_snapshot = now + self.config.periodic_snapshot_ms;
            debug!("periodic snapshot");
            self.capture_snapshot(now);
        }

        if now >= self.next_navigation_poll {
            self.next_navigation_poll = now + self.config.navigation_poll_ms;
            self.check_navigation(now);
        }

        if now >= self.next_periodic_flush {
            self.next_periodic_flush = now + self.config.flush_interval_ms;
            if !self.shared.buffer.is_empty() {
                self.flush_requested = true;
            }
        }
    }

    fn accepting(&self) -> bool {
        self.running && self.shared.switch.is_enabled()
    }

    fn emit(&mut self, now: u64, payload: EventPayload) {
        if !self.shared.switch.is_enabled() {
            return;
        }

        let event = Event::new(
            Uuid::new_v4().to_string(),
            now.saturating_sub(self.start_ms),
            payload,
        );
        trace!(
            event_type = %event.event_type(),
            timestamp = event.timestamp,
            "captured event"
        );

        self.log.push(event.clone());
        if self.shared.buffer.push(event) >= self.config.buffer_limit {
            self.flush_requested = true;
        }
    }

    /// Identity of the element at `path`, or of its parent element for text nodes
    fn target_id(&mut self, path: Option<&NodePath>) -> Option<DomId> {
        let path = path?;
        let document = self.surface.document();
        let node = path.resolve(document)?;
        let element_path = if node.is_text() { path.parent()? } else { path.clone() };

        if element_path.resolve(document)?.dom_id().is_none() {
            identity::assign_ids(self.surface.document_mut());
        }
        element_path.resolve(self.surface.document())?.dom_id()
    }

    fn is_canvas(&self, path: Option<&NodePath>) -> bool {
        path.and_then(|path| path.resolve(self.surface.document()))
            .is_some_and(|node| node.tag == CANVAS_TAG)
    }

    fn schedule_interaction_snapshot(&mut self, now: u64) {
        if self.interaction_snapshot_due.is_some() {
            return;
        }
        if let Some(last) = self.last_interaction_snapshot {
            if now.saturating_sub(last) < self.config.interaction_snapshot_gap_ms {
                trace!("interaction snapshot rate limited");
                return;
            }
        }
        self.interaction_snapshot_due = Some(now + self.config.interaction_settle_ms);
    }

    fn resolve_notice(&self, notice: MutationNotice) -> Option<MutationRecord> {
        let document = self.surface.document();
        match notice {
            MutationNotice::ChildList {
                parent,
                added,
                removed,
            } => {
                let Some(target) = parent.resolve(document).and_then(Node::dom_id) else {
                    warn!(path = ?parent.0, "mutation parent is not on the surface");
                    return None;
                };
                let added: Vec<Node> = added
                    .iter()
                    .filter_map(|path| path.resolve(document).cloned())
                    .collect();
                let removed: Vec<DomId> = removed.iter().filter_map(Node::dom_id).collect();
                if added.is_empty() && removed.is_empty() {
                    trace!(target = %target, "child list change with nothing observable");
                    return None;
                }
                Some(MutationRecord::ChildList {
                    target,
                    added,
                    removed,
                })
            }
            MutationNotice::Attribute { target, name } => {
                let Some(node) = target.resolve(document).filter(|node| !node.is_text()) else {
                    warn!(path = ?target.0, attribute = %name, "attribute target is not an element on the surface");
                    return None;
                };
                let id = node.dom_id()?;
                let mut value = node.attr(&name).map(str::to_string);
                if name == "value" && self.config.mask_passwords && is_password_input(node) {
                    value = value.map(|v| mask(&v));
                }
                Some(MutationRecord::Attributes {
                    target: id,
                    name,
                    value,
                })
            }
            MutationNotice::Text { target } => {
                let Some(node) = target.resolve(document) else {
                    warn!(path = ?target.0, "text target is not on the surface");
                    return None;
                };
                let text = node.text_content();
                let element_path = if node.is_text() { target.parent()? } else { target };
                let id = element_path.resolve(document)?.dom_id()?;
                Some(MutationRecord::CharacterData { target: id, text })
            }
        }
    }

    fn try_drain(&mut self, now: u64) {
        if self.pending_mutations.is_empty() {
            return;
        }
        if let Some(last) = self.last_drain {
            if now.saturating_sub(last) < self.config.mutation_drain_ms {
                self.frame_requested = true;
                return;
            }
        }
        self.drain_mutations(now);
    }

    fn drain_mutations(&mut self, now: u64) {
        if self.pending_mutations.is_empty() {
            return;
        }
        self.last_drain = Some(now);
        self.frame_requested = false;

        let mutations = std::mem::take(&mut self.pending_mutations);
        let score = scoring::score(&mutations);
        debug!(records = mutations.len(), score, "drained mutation batch");
        self.emit(now, EventPayload::DomMutation(MutationBatch { mutations, score }));

        let gap_elapsed = self
            .last_snapshot
            .map_or(true, |last| now.saturating_sub(last) >= self.config.significant_snapshot_gap_ms);
        if score >= self.config.significance_threshold && gap_elapsed {
            debug!(score, "significant mutation batch, taking snapshot");
            self.capture_snapshot(now);
        }
    }

    fn check_navigation(&mut self, now: u64) {
        let url = self.surface.url();
        if url == self.current_url {
            return;
        }

        info!(from = %self.current_url, to = %url, "navigation detected");
        let previous = std::mem::replace(&mut self.current_url, url.clone());
        self.shared.set_current_url(url.clone());

        identity::assign_ids(self.surface.document_mut());
        self.emit(
            now,
            EventPayload::SessionStart(SessionStart {
                url,
                viewport: self.surface.viewport(),
                screen: self.surface.screen(),
                user_agent: self.surface.user_agent(),
                referrer: Some(previous),
            }),
        );
        self.capture_snapshot(now);
        self.flush_requested = true;
    }

    fn capture_snapshot(&mut self, now: u64) {
        identity::assign_ids(self.surface.document_mut());
        let document = self.surface.document();

        let html = if self.config.mask_passwords {
            let mut masked = document.clone();
            mask_password_values(&mut masked);
            to_markup(&masked)
        } else {
            to_markup(document)
        };

        let mut canvas_nodes = Vec::new();
        document.walk(&mut |node| {
            if node.tag == CANVAS_TAG {
                if let Some(id) = node.dom_id() {
                    canvas_nodes.push((node, id));
                }
            }
        });
        let canvases: Vec<CanvasCapture> = canvas_nodes
            .into_iter()
            .filter_map(|(node, id)| self.read_canvas(node, id))
            .collect();

        let snapshot = DomSnapshot {
            html,
            doctype: self.surface.doctype(),
            url: self.surface.url(),
            viewport: self.surface.viewport(),
            canvases,
        };
        debug!(
            bytes = snapshot.html.len(),
            canvases = snapshot.canvases.len(),
            "dom snapshot"
        );

        self.last_snapshot = Some(now);
        self.emit(now, EventPayload::DomSnapshot(snapshot));
    }

    fn capture_canvas(&mut self, now: u64, id: &DomId) {
        let Some(node) = self.surface.document().find(id) else {
            warn!(dom_id = %id, "canvas left the surface before capture");
            return;
        };
        if let Some(capture) = self.read_canvas(node, id.clone()) {
            self.emit(now, EventPayload::CanvasUpdate(capture));
        }
    }

    fn read_canvas(&self, node: &Node, id: DomId) -> Option<CanvasCapture> {
        let bitmap = match self.surface.read_canvas(&id) {
            Ok(bitmap) => bitmap,
            Err(err) => {
                warn!(dom_id = %id, error = %err, "skipping canvas bitmap");
                return None;
            }
        };
        let mut width = dimension(node, &id, "width", bitmap.width());
        let mut height = dimension(node, &id, "height", bitmap.height());
        if let Err(err) = check_dimensions(width, height) {
            warn!(dom_id = %id, error = %err, "recorded canvas size unusable, keeping bitmap size");
            (width, height) = (bitmap.width(), bitmap.height());
        }
        Some(CanvasCapture {
            dom_id: id,
            width,
            height,
            bitmap,
        })
    }
}

fn dimension(node: &Node, id: &DomId, name: &str, fallback: u32) -> u32 {
    match node.attr(name) {
        None => fallback,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(dom_id = %id, attribute = name, value = raw, "malformed canvas dimension");
            fallback
        }),
    }
}

fn is_password_input(node: &Node) -> bool {
    node.tag == "input"
        && node
            .attr("type")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("password"))
}

fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

fn mask_password_values(node: &mut Node) {
    if is_password_input(node) {
        if let Some(value) = node.attributes.get_mut("value") {
            *value = mask(value);
        }
    }
    for child in &mut node.children {
        mask_password_values(child);
    }
}

fn interactive_inventory(root: &Node) -> Vec<InteractiveElement> {
    let mut elements = Vec::new();
    root.walk(&mut |node| {
        if node.is_text() {
            return;
        }
        let role = node.attr("role").map(str::to_ascii_lowercase);
        let interactive = INTERACTIVE_TAGS.contains(&node.tag.as_str())
            || role.as_deref().is_some_and(|r| INTERACTIVE_ROLES.contains(&r))
            || node.attr("tabindex").is_some();
        if !interactive {
            return;
        }
        let Some(dom_id) = node.dom_id() else {
            return;
        };

        let kind = if node.tag == "input" {
            node.attr("type")
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "text".to_string())
        } else {
            role.unwrap_or_else(|| node.tag.clone())
        };

        elements.push(InteractiveElement {
            dom_id,
            tag: node.tag.clone(),
            kind,
            label: label_of(node),
        });
    });
    elements
}

fn label_of(node: &Node) -> Option<String> {
    if let Some(label) = node.attr("aria-label") {
        return Some(label.to_string());
    }
    let text = node.text_content();
    let text = text.trim();
    if !text.is_empty() {
        return Some(text.chars().take(MAX_LABEL_CHARS).collect());
    }
    node.attr("placeholder")
        .or_else(|| node.attr("name"))
        .map(str::to_string)
}
