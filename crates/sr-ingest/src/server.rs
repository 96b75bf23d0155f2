// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HTTP surface of the receiving boundary

use crate::config::{IngestConfig, DEFAULT_MAX_BODY_BYTES};
use crate::error::{IngestError, IngestResult};
use crate::service::IngestService;
use crate::store::StoreError;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sr_domain_types::{
    ChunkRecord, ChunkSubmission, SessionRecord, SessionUpsert, SubmitOutcome, SubmitReceipt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct IngestState {
    pub service: IngestService,
    pub admin_token: Option<Arc<str>>,
    pub max_body_bytes: usize,
}

impl IngestState {
    pub fn new(service: IngestService) -> Self {
        Self {
            service,
            admin_token: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Arc::from(token.into()));
        self
    }

    fn require_admin(&self, headers: &HeaderMap) -> IngestResult<()> {
        match &self.admin_token {
            None => Ok(()),
            Some(expected) if bearer(headers) == Some(&**expected) => Ok(()),
            Some(_) => Err(IngestError::Unauthorized),
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn upsert_session(
    State(state): State<IngestState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(upsert): Json<SessionUpsert>,
) -> IngestResult<Json<SessionRecord>> {
    if upsert.session_id != id {
        return Err(IngestError::BadRequest(format!(
            "body session id '{}' does not match path '{}'",
            upsert.session_id, id
        )));
    }
    let record = state.service.upsert_session(bearer(&headers), &upsert)?;
    Ok(Json(record))
}

async fn submit_chunk(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(chunk): Json<ChunkSubmission>,
) -> IngestResult<(StatusCode, Json<SubmitReceipt>)> {
    let receipt = state.service.submit_chunk(bearer(&headers), &chunk)?;
    let status = match receipt.outcome {
        SubmitOutcome::Stored => StatusCode::CREATED,
        SubmitOutcome::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(receipt)))
}

async fn list_sessions(
    State(state): State<IngestState>,
    headers: HeaderMap,
) -> IngestResult<Json<Vec<SessionRecord>>> {
    state.require_admin(&headers)?;
    Ok(Json(state.service.list_sessions()?))
}

async fn get_session(
    State(state): State<IngestState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> IngestResult<Json<SessionRecord>> {
    state.require_admin(&headers)?;
    Ok(Json(state.service.get_session(&id)?))
}

async fn get_chunks(
    State(state): State<IngestState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> IngestResult<Json<Vec<ChunkRecord>>> {
    state.require_admin(&headers)?;
    Ok(Json(state.service.get_chunks(&id)?))
}

async fn delete_session(
    State(state): State<IngestState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> IngestResult<StatusCode> {
    state.require_admin(&headers)?;
    state.service.delete_session(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build the router with all ingest routes
pub fn router(state: IngestState) -> Router {
    let api_routes = Router::new()
        .route("/sessions", get(list_sessions))
        .route(
            "/sessions/:id",
            get(get_session).put(upsert_session).delete(delete_session),
        )
        .route("/sessions/:id/chunks", get(get_chunks))
        .route("/chunks", post(submit_chunk));

    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(health_check))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Ingest HTTP server
pub struct IngestServer {
    config: IngestConfig,
    app: Router,
}

impl IngestServer {
    pub fn new(config: IngestConfig) -> Result<Self, StoreError> {
        let service = config.build_service()?;
        Ok(Self::with_service(config, service))
    }

    pub fn with_service(config: IngestConfig, service: IngestService) -> Self {
        let mut state = IngestState::new(service).with_max_body_bytes(config.max_body_bytes);
        if let Some(token) = &config.admin_token {
            state = state.with_admin_token(token.clone());
        }
        Self {
            app: router(state),
            config,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve until the process stops
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "ingest server listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::memory::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(admin: Option<&str>) -> Router {
        app_with_limit(admin, DEFAULT_MAX_BODY_BYTES)
    }

    fn app_with_limit(admin: Option<&str>, max_body_bytes: usize) -> Router {
        let service = IngestService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticCredentials::new().with_key("key-app", "app.example")),
        );
        let mut state = IngestState::new(service).with_max_body_bytes(max_body_bytes);
        if let Some(token) = admin {
            state = state.with_admin_token(token);
        }
        router(state)
    }

    fn chunk_body() -> Value {
        json!({
            "session_id": "s1",
            "source_url": "https://app.example/page",
            "events": [
                {"id": "e1", "timestamp": 0, "type": "visibility_change", "payload": {"visible": true}}
            ]
        })
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chunk_submission_is_idempotent_over_http() {
        let app = app(None);

        let first = app
            .clone()
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(chunk_body())))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(json_of(first).await["outcome"], "stored");

        let second = app
            .clone()
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(chunk_body())))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(json_of(second).await["outcome"], "duplicate");

        let chunks = app
            .oneshot(request("GET", "/api/v1/sessions/s1/chunks", None, None))
            .await
            .unwrap();
        assert_eq!(chunks.status(), StatusCode::OK);
        assert_eq!(json_of(chunks).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auth_failures_render_problem_json() {
        let app = app(None);

        let missing = app
            .clone()
            .oneshot(request("POST", "/api/v1/chunks", None, Some(chunk_body())))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_of(missing).await["status"], 401);

        let mut foreign = chunk_body();
        foreign["source_url"] = json!("https://evil.example/");
        let forbidden = app
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(foreign)))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_of(forbidden).await["type"], "about:blank#authz");
    }

    #[tokio::test]
    async fn session_upsert_requires_matching_path() {
        let app = app(None);
        let body = json!({"session_id": "s1", "url": "https://app.example/", "end_time": 5});

        let ok = app
            .clone()
            .oneshot(request("PUT", "/api/v1/sessions/s1", Some("key-app"), Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_of(ok).await["end_time"], 5);

        let mismatch = app
            .oneshot(request("PUT", "/api/v1/sessions/other", Some("key-app"), Some(body)))
            .await
            .unwrap();
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_token_gates_reads_and_deletes() {
        let app = app(Some("admin"));
        app.clone()
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(chunk_body())))
            .await
            .unwrap();

        let anonymous = app
            .clone()
            .oneshot(request("GET", "/api/v1/sessions/s1", None, None))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let session = app
            .clone()
            .oneshot(request("GET", "/api/v1/sessions/s1", Some("admin"), None))
            .await
            .unwrap();
        assert_eq!(session.status(), StatusCode::OK);
        assert_eq!(json_of(session).await["url"], "https://app.example/page");

        let deleted = app
            .clone()
            .oneshot(request("DELETE", "/api/v1/sessions/s1", Some("admin"), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let gone = app
            .oneshot(request("GET", "/api/v1/sessions/s1", Some("admin"), None))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bodies_past_the_configured_limit_are_refused() {
        let mut big = chunk_body();
        big["events"][0]["id"] = json!("x".repeat(4 * 1024 * 1024));

        let default_limit = app(None)
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(big.clone())))
            .await
            .unwrap();
        assert_eq!(default_limit.status(), StatusCode::CREATED);

        let tight = app_with_limit(None, 1024)
            .oneshot(request("POST", "/api/v1/chunks", Some("key-app"), Some(big)))
            .await
            .unwrap();
        assert_eq!(tight.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn health_endpoint_is_open() {
        let response = app(Some("admin"))
            .oneshot(request("GET", "/healthz", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["status"], "ok");
    }
}
