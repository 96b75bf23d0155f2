// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Chunks: ordered batches of events delivered to the ingestion boundary

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic identity of a chunk used for duplicate suppression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkFingerprint(pub String);

impl fmt::Display for ChunkFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a chunk
///
/// The fingerprint covers the session id, event count, first and last event
/// types and the first timestamp only. Two distinct chunks agreeing on all of
/// those collide, and the later one is treated as a duplicate.
///
/// Returns `None` for an empty chunk.
pub fn fingerprint(session_id: &str, events: &[Event]) -> Option<ChunkFingerprint> {
    let first = events.first()?;
    let last = events.last()?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(events.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(first.event_type().as_ref().as_bytes());
    hasher.update(b"\0");
    hasher.update(last.event_type().as_ref().as_bytes());
    hasher.update(b"\0");
    hasher.update(first.timestamp.to_string().as_bytes());

    Some(ChunkFingerprint(hasher.finalize().to_hex().to_string()))
}

/// Body of a `submit-chunk` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSubmission {
    pub session_id: String,
    pub events: Vec<Event>,
    pub source_url: String,
}

impl ChunkSubmission {
    pub fn fingerprint(&self) -> Option<ChunkFingerprint> {
        fingerprint(&self.session_id, &self.events)
    }
}

/// What the receiving boundary did with a submitted chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Stored,
    Duplicate,
}

/// Response body of a `submit-chunk` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub outcome: SubmitOutcome,
    pub fingerprint: ChunkFingerprint,
}
