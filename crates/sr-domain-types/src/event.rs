// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Captured events and their payloads
//!
//! On the wire every event is `{"id", "type", "timestamp", "payload"}` with the
//! timestamp in milliseconds relative to the start of the capture session.

use crate::canvas::Bitmap;
use crate::node::{DomId, Node};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Width/height pair used for viewports, screens and canvases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single captured event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: impl Into<String>, timestamp: u64, payload: EventPayload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Discriminant of [`EventPayload`], spelled the way it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    PointerMove,
    PointerDown,
    PointerUp,
    Click,
    Scroll,
    InputChange,
    VisibilityChange,
    DragStart,
    Drag,
    DragEnd,
    DomMutation,
    DomSnapshot,
    CanvasUpdate,
    InitialState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStart(SessionStart),
    SessionEnd(SessionEnd),
    PointerMove(PointerPosition),
    PointerDown(PointerButton),
    PointerUp(PointerButton),
    Click(PointerPosition),
    Scroll(ScrollPosition),
    InputChange(InputChange),
    VisibilityChange(Visibility),
    DragStart(PointerPosition),
    Drag(PointerPosition),
    DragEnd(PointerPosition),
    DomMutation(MutationBatch),
    DomSnapshot(DomSnapshot),
    CanvasUpdate(CanvasCapture),
    InitialState(InitialState),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::SessionStart(_) => EventType::SessionStart,
            EventPayload::SessionEnd(_) => EventType::SessionEnd,
            EventPayload::PointerMove(_) => EventType::PointerMove,
            EventPayload::PointerDown(_) => EventType::PointerDown,
            EventPayload::PointerUp(_) => EventType::PointerUp,
            EventPayload::Click(_) => EventType::Click,
            EventPayload::Scroll(_) => EventType::Scroll,
            EventPayload::InputChange(_) => EventType::InputChange,
            EventPayload::VisibilityChange(_) => EventType::VisibilityChange,
            EventPayload::DragStart(_) => EventType::DragStart,
            EventPayload::Drag(_) => EventType::Drag,
            EventPayload::DragEnd(_) => EventType::DragEnd,
            EventPayload::DomMutation(_) => EventType::DomMutation,
            EventPayload::DomSnapshot(_) => EventType::DomSnapshot,
            EventPayload::CanvasUpdate(_) => EventType::CanvasUpdate,
            EventPayload::InitialState(_) => EventType::InitialState,
        }
    }
}

/// Start of a capture session, or a navigation boundary within one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub url: String,
    pub viewport: Size,
    #[serde(default)]
    pub screen: Size,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DomId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerButton {
    pub x: f64,
    pub y: f64,
    pub button: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DomId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub scroll_x: f64,
    pub scroll_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DomId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputChange {
    pub target: DomId,
    pub value: String,
    #[serde(default)]
    pub masked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    pub visible: bool,
}

/// One incremental change to the observed tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRecord {
    ChildList {
        target: DomId,
        #[serde(default)]
        added: Vec<Node>,
        #[serde(default)]
        removed: Vec<DomId>,
    },
    Attributes {
        target: DomId,
        name: String,
        value: Option<String>,
    },
    CharacterData {
        target: DomId,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    pub mutations: Vec<MutationRecord>,
    /// Significance score the capture side computed for this batch
    #[serde(default)]
    pub score: f64,
}

/// Bitmap of one canvas together with its recorded element size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasCapture {
    pub dom_id: DomId,
    pub width: u32,
    pub height: u32,
    pub bitmap: Bitmap,
}

/// Full capture of the observed tree at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub viewport: Size,
    #[serde(default)]
    pub canvases: Vec<CanvasCapture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub dom_id: DomId,
    pub tag: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Inventory of interactive elements present when capture started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub elements: Vec<InteractiveElement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_serializes_with_type_and_payload() {
        let event = Event::new(
            "e1",
            1200,
            EventPayload::Click(PointerPosition {
                x: 50.0,
                y: 80.0,
                target: None,
            }),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "e1",
                "timestamp": 1200,
                "type": "click",
                "payload": {"x": 50.0, "y": 80.0}
            })
        );

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn snapshot_payload_accepts_minimal_json() {
        let event: Event = serde_json::from_value(json!({
            "id": "s",
            "timestamp": 0,
            "type": "dom_snapshot",
            "payload": {"html": "<p>A</p>"}
        }))
        .unwrap();

        match event.payload {
            EventPayload::DomSnapshot(snapshot) => {
                assert_eq!(snapshot.html, "<p>A</p>");
                assert!(snapshot.canvases.is_empty());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn event_type_names_match_wire_names() {
        assert_eq!(EventType::DomSnapshot.as_ref(), "dom_snapshot");
        assert_eq!("pointer_move".parse::<EventType>().unwrap(), EventType::PointerMove);
        assert_eq!(EventType::InitialState.to_string(), "initial_state");
    }
}
