// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Sorted, zero-based event timeline of one recorded session
//!
//! Chunks arrive in delivery order and their events are only append-ordered
//! within each chunk. Loading concatenates them, stable-sorts by timestamp
//! and shifts every timestamp so the earliest event sits at 0.

use serde::{Deserialize, Serialize};
use sr_domain_types::{
    ChunkRecord, DomSnapshot, Event, EventPayload, RetrievalError, SessionRecord, SessionSource,
};
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("failed to access export file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed export file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk form of a recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session: SessionRecord,
    pub chunks: Vec<ChunkRecord>,
}

impl SessionExport {
    pub fn fetch(source: &dyn SessionSource, session_id: &str) -> Result<Self, TimelineError> {
        Ok(Self {
            session: source.get_session(session_id)?,
            chunks: source.get_chunks(session_id)?,
        })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TimelineError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    session: SessionRecord,
    events: Vec<Event>,
}

impl Timeline {
    pub fn load(source: &dyn SessionSource, session_id: &str) -> Result<Self, TimelineError> {
        Ok(SessionExport::fetch(source, session_id)?.into())
    }

    pub fn from_export_file(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        Ok(SessionExport::read(path)?.into())
    }

    /// Build from chunks given in arrival order
    pub fn from_chunks(session: SessionRecord, chunks: Vec<ChunkRecord>) -> Self {
        let events = chunks.into_iter().flat_map(|chunk| chunk.events).collect();
        Self::from_events(session, events)
    }

    pub fn from_events(session: SessionRecord, mut events: Vec<Event>) -> Self {
        events.sort_by_key(|event| event.timestamp);
        if let Some(base) = events.first().map(|event| event.timestamp) {
            for event in &mut events {
                event.timestamp -= base;
            }
        }
        debug!(session_id = %session.id, events = events.len(), "timeline loaded");
        Self { session, events }
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the last event
    pub fn duration(&self) -> u64 {
        self.events.last().map_or(0, |event| event.timestamp)
    }

    /// Events whose timestamp falls inside `range`, in timeline order
    pub fn window(&self, range: impl RangeBounds<u64>) -> &[Event] {
        let start = match range.start_bound() {
            Bound::Included(&t) => self.events.partition_point(|e| e.timestamp < t),
            Bound::Excluded(&t) => self.events.partition_point(|e| e.timestamp <= t),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&t) => self.events.partition_point(|e| e.timestamp <= t),
            Bound::Excluded(&t) => self.events.partition_point(|e| e.timestamp < t),
            Bound::Unbounded => self.events.len(),
        };
        if start >= end {
            &[]
        } else {
            &self.events[start..end]
        }
    }

    /// Every full snapshot with its timestamp
    pub fn snapshots(&self) -> impl Iterator<Item = (u64, &DomSnapshot)> {
        self.events.iter().filter_map(|event| match &event.payload {
            EventPayload::DomSnapshot(snapshot) => Some((event.timestamp, snapshot)),
            _ => None,
        })
    }
}

impl From<SessionExport> for Timeline {
    fn from(export: SessionExport) -> Self {
        Timeline::from_chunks(export.session, export.chunks)
    }
}
