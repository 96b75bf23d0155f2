// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use sr_capture::{
    CaptureConfig, ChunkTransport, FlushOutcome, HttpIngestClient, IngestApi, InstrumentationAgent,
    MemorySurface,
};
use sr_domain_types::{Bitmap, EventPayload, EventType, SessionSource, SubmitOutcome};
use sr_ingest::{
    IngestConfig, IngestServer, IngestService, LocalIngest, MemoryStore, SqliteStore,
    StaticCredentials,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const PAGE: &str = "<html><body><h1 id=\"title\">Hello</h1><button>Go</button></body></html>";

fn agent(session_id: &str) -> InstrumentationAgent<MemorySurface> {
    let surface = MemorySurface::from_markup("https://app.example/start", PAGE).unwrap();
    InstrumentationAgent::new(surface, CaptureConfig::default().with_session_id(session_id))
}

const CANVAS_PAGE: &str =
    "<html><body><canvas id=\"board\" width=\"800\" height=\"800\"></canvas></body></html>";

/// Agent over a page holding an 800x800 canvas of noise that PNG cannot shrink much
fn canvas_agent(session_id: &str) -> InstrumentationAgent<MemorySurface> {
    let mut state = 0x2545_f491_u32;
    let pixels = (0..800 * 800 * 4)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();
    let mut surface = MemorySurface::from_markup("https://app.example/draw", CANVAS_PAGE).unwrap();
    surface.set_canvas("board", Bitmap::new(800, 800, pixels).unwrap());
    InstrumentationAgent::new(surface, CaptureConfig::default().with_session_id(session_id))
}

async fn spawn_server(
    config: IngestConfig,
    store: Arc<MemoryStore>,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<std::io::Result<()>>) {
    let service = IngestService::new(store, credentials());
    let server = IngestServer::with_service(config, service);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = stop_rx.await;
    }));
    (format!("http://{addr}"), stop_tx, handle)
}

fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new().with_key("key-app", "app.example"))
}

#[tokio::test]
async fn captured_session_lands_in_sqlite_and_reads_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("replay.db")).unwrap());
    let service = IngestService::new(store.clone(), credentials());
    let api: Arc<dyn IngestApi> = Arc::new(LocalIngest::new(service, "key-app"));

    let mut agent = agent("roundtrip-1");
    let transport = ChunkTransport::new(api, agent.shared().clone());

    assert!(agent.start(10_000));
    let first = transport.flush(10_000).await.unwrap();
    assert!(matches!(first, FlushOutcome::Delivered { outcome: SubmitOutcome::Stored, .. }));

    agent.on_click(11_200, 50.0, 80.0, None);
    let log = agent.stop(13_000);
    transport.flush(13_000).await.unwrap();

    let session = store.get_session("roundtrip-1").unwrap();
    assert_eq!(session.url.as_deref(), Some("https://app.example/start"));
    assert_eq!(session.start_time, Some(10_000));
    assert_eq!(session.end_time, Some(13_000));

    let stored: Vec<_> = store
        .get_chunks("roundtrip-1")
        .unwrap()
        .into_iter()
        .flat_map(|chunk| chunk.events)
        .collect();
    assert_eq!(stored, log);
    assert_eq!(stored[0].event_type(), EventType::SessionStart);
    assert!(stored.iter().any(|e| e.event_type() == EventType::Click && e.timestamp == 1_200));
}

#[tokio::test]
async fn resubmitted_chunk_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let service = IngestService::new(store.clone(), credentials());
    let local = LocalIngest::new(service, "key-app");

    let mut agent = agent("dup-1");
    agent.start(0);
    let events = agent.shared().buffer.take();
    let chunk = sr_domain_types::ChunkSubmission {
        session_id: "dup-1".to_string(),
        events,
        source_url: "https://app.example/start".to_string(),
    };

    assert_eq!(local.submit_chunk(&chunk).await.unwrap(), SubmitOutcome::Stored);
    assert_eq!(local.submit_chunk(&chunk).await.unwrap(), SubmitOutcome::Duplicate);
    assert_eq!(store.get_chunks("dup-1").unwrap().len(), 1);
}

#[tokio::test]
async fn http_client_delivers_to_a_live_server() {
    let store = Arc::new(MemoryStore::new());
    let service = IngestService::new(store.clone(), credentials());
    let server = IngestServer::with_service(IngestConfig::default(), service);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = stop_rx.await;
    }));

    let client = HttpIngestClient::new(&format!("http://{addr}"), "key-app").unwrap();
    let mut agent = agent("http-1");
    let transport = ChunkTransport::new(Arc::new(client), agent.shared().clone());

    agent.start(5_000);
    let outcome = transport.flush(5_000).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Delivered { outcome: SubmitOutcome::Stored, .. }));

    let chunks = store.get_chunks("http-1").unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].events[0].event_type(), EventType::SessionStart);

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn wrong_credential_switches_capture_off() {
    let service = IngestService::new(Arc::new(MemoryStore::new()), credentials());
    let api: Arc<dyn IngestApi> = Arc::new(LocalIngest::new(service, "unknown-key"));

    let mut agent = agent("denied-1");
    let transport = ChunkTransport::new(api, agent.shared().clone());
    agent.start(0);

    assert!(transport.flush(0).await.is_err());
    assert!(!agent.shared().switch.is_enabled());
    assert!(agent.shared().buffer.is_empty());
    assert_eq!(transport.flush(10).await.unwrap(), FlushOutcome::Disabled);
}

#[tokio::test]
async fn large_canvas_snapshot_is_stored_over_http() {
    let store = Arc::new(MemoryStore::new());
    let (base, stop_tx, handle) = spawn_server(IngestConfig::default(), store.clone()).await;

    let client = HttpIngestClient::new(&base, "key-app").unwrap();
    let mut agent = canvas_agent("canvas-1");
    let transport = ChunkTransport::new(Arc::new(client), agent.shared().clone());

    agent.start(1_000);
    let outcome = transport.flush(1_000).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Delivered { outcome: SubmitOutcome::Stored, .. }));
    assert!(agent.shared().buffer.is_empty());

    let chunks = store.get_chunks("canvas-1").unwrap();
    let snapshot = chunks[0]
        .events
        .iter()
        .find_map(|event| match &event.payload {
            EventPayload::DomSnapshot(snapshot) => Some(snapshot),
            _ => None,
        })
        .unwrap();
    assert_eq!(snapshot.canvases.len(), 1);
    assert_eq!(snapshot.canvases[0].bitmap.width(), 800);

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_oversized_snapshot_does_not_block_later_chunks() {
    let store = Arc::new(MemoryStore::new());
    let config = IngestConfig {
        max_body_bytes: 64 * 1024,
        ..IngestConfig::default()
    };
    let (base, stop_tx, handle) = spawn_server(config, store.clone()).await;

    let client = HttpIngestClient::new(&base, "key-app").unwrap();
    let mut agent = canvas_agent("canvas-2");
    let transport = ChunkTransport::new(Arc::new(client), agent.shared().clone());

    agent.start(1_000);
    let outcome = transport.flush(1_000).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Split { dropped: 1, .. }), "{outcome:?}");
    assert!(agent.shared().buffer.is_empty());

    agent.on_click(1_500, 10.0, 10.0, None);
    let later = transport.flush(1_600).await.unwrap();
    assert!(matches!(later, FlushOutcome::Delivered { outcome: SubmitOutcome::Stored, .. }));

    let stored: Vec<_> = store
        .get_chunks("canvas-2")
        .unwrap()
        .into_iter()
        .flat_map(|chunk| chunk.events)
        .collect();
    assert!(stored.iter().all(|e| e.event_type() != EventType::DomSnapshot));
    assert!(stored.iter().any(|e| e.event_type() == EventType::Click));

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
