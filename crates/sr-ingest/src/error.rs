// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ingest error types and their problem+json rendering

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing or unknown credential")]
    Unauthorized,

    #[error("credential is not valid for host '{host}'")]
    Forbidden { host: String },

    #[error("chunk carries no events")]
    EmptyChunk,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// RFC 7807 problem body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub detail: String,
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            IngestError::EmptyChunk | IngestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IngestError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert error to Problem+JSON response
    pub fn to_problem(&self) -> ProblemDetails {
        let (slug, title) = match self {
            IngestError::Unauthorized => ("auth", "Authentication Failed"),
            IngestError::Forbidden { .. } => ("authz", "Authorization Failed"),
            IngestError::EmptyChunk => ("empty-chunk", "Empty Chunk"),
            IngestError::BadRequest(_) => ("bad-request", "Bad Request"),
            IngestError::SessionNotFound(_) => ("not-found", "Session Not Found"),
            IngestError::Store(_) => ("store", "Store Error"),
        };
        ProblemDetails {
            problem_type: format!("about:blank#{slug}"),
            title: title.to_string(),
            status: Some(self.status().as_u16()),
            detail: self.to_string(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        if let IngestError::Store(err) = &self {
            tracing::error!(error = %err, "ingest store failure");
        }
        (self.status(), Json(self.to_problem())).into_response()
    }
}
