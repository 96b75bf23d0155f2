// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Persistence seam of the receiving boundary

use chrono::{DateTime, Utc};
use sr_domain_types::{
    ChunkFingerprint, ChunkRecord, ChunkSubmission, RetrievalError, SessionRecord, SessionUpsert,
    SubmitOutcome,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode stored events: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("chunk references unknown session {0}")]
    UnknownSession(String),
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownSession(id) => RetrievalError::SessionNotFound(id),
            other => RetrievalError::Backend(other.to_string()),
        }
    }
}

/// Opaque insert/query/delete store for sessions and their chunks
///
/// Chunks are unique per `(session_id, fingerprint)`; inserting a second chunk
/// with the same pair reports [`SubmitOutcome::Duplicate`] and stores nothing.
#[cfg_attr(test, mockall::automock)]
pub trait ChunkStore: Send + Sync {
    /// Create the session or merge into the stored record
    fn upsert_session(&self, upsert: &SessionUpsert) -> Result<SessionRecord, StoreError>;

    fn insert_chunk(
        &self,
        chunk: &ChunkSubmission,
        fingerprint: &ChunkFingerprint,
        received_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, StoreError>;

    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Chunks of a session in arrival order
    fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Remove a session and its chunks; returns whether it existed
    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// Shared retrieval logic for every [`ChunkStore`]
pub(crate) fn load_session(
    store: &dyn ChunkStore,
    session_id: &str,
) -> Result<SessionRecord, RetrievalError> {
    store
        .find_session(session_id)?
        .ok_or_else(|| RetrievalError::SessionNotFound(session_id.to_string()))
}

pub(crate) fn load_chunks(
    store: &dyn ChunkStore,
    session_id: &str,
) -> Result<Vec<ChunkRecord>, RetrievalError> {
    load_session(store, session_id)?;
    Ok(store.list_chunks(session_id)?)
}
