// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::Utc;
use sr_domain_types::{
    ChunkFingerprint, ChunkRecord, DomId, DomSnapshot, Event, EventPayload, MutationBatch,
    MutationRecord, Node, PointerPosition, RetrievalError, SessionRecord, SessionSource,
    SessionStart, Size,
};
use sr_replay::{DomView, PlaybackScheduler, ReconstructionEngine, ReplayConfig, SessionExport, Timeline};
use std::collections::HashMap;
use std::sync::Arc;

const PAGE: &str = "https://shop.example/cart";

#[derive(Default)]
struct FixedSource {
    sessions: HashMap<String, (SessionRecord, Vec<ChunkRecord>)>,
}

impl SessionSource for FixedSource {
    fn get_session(&self, session_id: &str) -> Result<SessionRecord, RetrievalError> {
        self.sessions
            .get(session_id)
            .map(|(session, _)| session.clone())
            .ok_or_else(|| RetrievalError::SessionNotFound(session_id.to_string()))
    }

    fn get_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, RetrievalError> {
        self.sessions
            .get(session_id)
            .map(|(_, chunks)| chunks.clone())
            .ok_or_else(|| RetrievalError::SessionNotFound(session_id.to_string()))
    }
}

fn session() -> SessionRecord {
    SessionRecord {
        id: "s-e2e".to_string(),
        url: Some(PAGE.to_string()),
        viewport: Some(Size::new(1280, 720)),
        user_agent: Some("agent/1".to_string()),
        screen_resolution: None,
        referrer: None,
        start_time: Some(1_700_000_000_000),
        end_time: None,
    }
}

fn snapshot(html: &str) -> EventPayload {
    EventPayload::DomSnapshot(DomSnapshot {
        html: html.to_string(),
        doctype: Some("html".to_string()),
        url: PAGE.to_string(),
        viewport: Size::new(1280, 720),
        canvases: vec![],
    })
}

fn recorded_events() -> Vec<Event> {
    vec![
        Event::new(
            "e1",
            0,
            EventPayload::SessionStart(SessionStart {
                url: PAGE.to_string(),
                viewport: Size::new(1280, 720),
                screen: Size::new(1920, 1080),
                user_agent: "agent/1".to_string(),
                referrer: None,
            }),
        ),
        Event::new("e2", 0, snapshot("<body><p id=\"state\">A</p></body>")),
        Event::new(
            "e3",
            1_200,
            EventPayload::Click(PointerPosition {
                x: 50.0,
                y: 80.0,
                target: None,
            }),
        ),
        Event::new(
            "e4",
            1_500,
            EventPayload::DomMutation(MutationBatch {
                mutations: vec![MutationRecord::CharacterData {
                    target: DomId::new("state"),
                    text: "A+".to_string(),
                }],
                score: 1.0,
            }),
        ),
        Event::new("e5", 3_000, snapshot("<body><p id=\"state\">B</p></body>")),
    ]
}

/// Events split over two chunks that arrived out of timestamp order
fn source() -> FixedSource {
    let events = recorded_events();
    let chunk = |seq: u64, events: Vec<Event>| ChunkRecord {
        seq,
        session_id: "s-e2e".to_string(),
        fingerprint: ChunkFingerprint(format!("fp-{seq}")),
        events,
        source_url: PAGE.to_string(),
        received_at: Utc::now(),
    };
    let mut source = FixedSource::default();
    source.sessions.insert(
        "s-e2e".to_string(),
        (
            session(),
            vec![chunk(1, events[3..].to_vec()), chunk(2, events[..3].to_vec())],
        ),
    );
    source
}

fn text_of(view: &DomView) -> String {
    match view {
        DomView::Tree { root, .. } => root.text_content(),
        other => panic!("expected a tree, got {other:?}"),
    }
}

#[test]
fn seek_reconstructs_tree_and_cursor() {
    let timeline = Arc::new(Timeline::load(&source(), "s-e2e").unwrap());
    assert_eq!(timeline.duration(), 3_000);

    let mut engine = ReconstructionEngine::new(timeline, ReplayConfig::default());

    let frame = engine.seek(2_000);
    assert_eq!(text_of(&frame.dom), "A");
    assert_eq!(frame.baseline_at, Some(0));
    let cursor = frame.cursor.unwrap();
    assert_eq!((cursor.x, cursor.y), (50.0, 80.0));
    assert!(frame.click.is_none());
    assert_eq!(frame.url.as_deref(), Some(PAGE));

    let frame = engine.seek(3_500);
    assert_eq!(text_of(&frame.dom), "B");
    assert_eq!(frame.baseline_at, Some(3_000));
}

#[test]
fn mutations_between_snapshots_are_not_shown() {
    let timeline = Arc::new(Timeline::load(&source(), "s-e2e").unwrap());
    let mut engine = ReconstructionEngine::new(timeline, ReplayConfig::default());

    let frame = engine.seek(2_999);
    assert_eq!(text_of(&frame.dom), "A");
}

#[test]
fn playback_reaches_the_same_state_as_seek() {
    let timeline = Arc::new(Timeline::load(&source(), "s-e2e").unwrap());
    let mut scheduler =
        PlaybackScheduler::new(Arc::clone(&timeline), ReplayConfig::default().with_speed(4.0)).unwrap();
    scheduler.play().unwrap();

    let mut last = None;
    loop {
        let outcome = scheduler.tick().unwrap();
        let ended = outcome.ended;
        last = Some(outcome.frame);
        if ended {
            break;
        }
    }

    let mut engine = ReconstructionEngine::new(timeline, ReplayConfig::default());
    let seeked = engine.seek(3_000);
    let played = last.unwrap();
    assert_eq!(played.dom, seeked.dom);
    assert_eq!(played.cursor, seeked.cursor);
    assert_eq!(played.time, 3_000);
}

#[test]
fn export_file_replays_like_the_live_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    SessionExport::fetch(&source(), "s-e2e").unwrap().write(&path).unwrap();

    let from_file = Timeline::from_export_file(&path).unwrap();
    let live = Timeline::load(&source(), "s-e2e").unwrap();
    assert_eq!(from_file.events(), live.events());
    assert_eq!(from_file.session(), live.session());
}

#[test]
fn export_with_malformed_canvas_is_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    SessionExport::fetch(&source(), "s-e2e").unwrap().write(&path).unwrap();

    let mut export: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let snapshot = export["chunks"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .flat_map(|chunk| chunk["events"].as_array_mut().unwrap().iter_mut())
        .find(|event| event["type"] == "dom_snapshot")
        .unwrap();
    // four raw bytes where a 2x2 PNG belongs
    snapshot["payload"]["canvases"] = serde_json::json!([{
        "dom_id": "pad",
        "width": 2,
        "height": 2,
        "bitmap": {"width": 2, "height": 2, "png": "AQIDBA=="}
    }]);
    std::fs::write(&path, export.to_string()).unwrap();

    let err = Timeline::from_export_file(&path).unwrap_err();
    assert!(matches!(err, sr_replay::TimelineError::Parse(_)), "{err}");
}

#[test]
fn unknown_session_is_reported() {
    let err = Timeline::load(&source(), "missing").unwrap_err();
    assert!(err.to_string().contains("missing"), "{err}");
}

#[test]
fn scripts_in_snapshots_never_reach_the_frame() {
    let session = session();
    let events = vec![Event::new(
        "e1",
        0,
        snapshot("<body><script>alert(1)</script><a href=\"/x\" onclick=\"go()\">x</a></body>"),
    )];
    let mut engine =
        ReconstructionEngine::new(Arc::new(Timeline::from_events(session, events)), ReplayConfig::default());
    let frame = engine.seek(0);
    let DomView::Tree { root, .. } = frame.dom else {
        panic!("expected a tree");
    };

    let mut tags = Vec::new();
    let mut handlers = 0;
    let mut hrefs = 0;
    root.walk(&mut |node: &Node| {
        tags.push(node.tag.clone());
        handlers += node.attributes.keys().filter(|name| name.starts_with("on")).count();
        hrefs += usize::from(node.attr("href").is_some());
    });
    assert!(!tags.iter().any(|tag| tag == "script"));
    assert_eq!(handlers, 0);
    assert_eq!(hrefs, 0);
}
