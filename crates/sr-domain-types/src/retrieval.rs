// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Read side of the ingestion boundary

use crate::session::{ChunkRecord, SessionRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Anything replay can load a recorded session from
pub trait SessionSource: Send + Sync {
    /// Stored metadata for a session
    fn get_session(&self, session_id: &str) -> Result<SessionRecord, RetrievalError>;

    /// Every stored chunk of a session, in arrival order
    fn get_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, RetrievalError>;
}
