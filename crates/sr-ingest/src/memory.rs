// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory chunk store

use crate::store::{load_chunks, load_session, ChunkStore, StoreError};
use chrono::{DateTime, Utc};
use sr_domain_types::{
    ChunkFingerprint, ChunkRecord, ChunkSubmission, RetrievalError, SessionRecord, SessionSource,
    SessionUpsert, SubmitOutcome,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    sessions: BTreeMap<String, SessionRecord>,
    chunks: Vec<ChunkRecord>,
    fingerprints: HashSet<(String, ChunkFingerprint)>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChunkStore for MemoryStore {
    fn upsert_session(&self, upsert: &SessionUpsert) -> Result<SessionRecord, StoreError> {
        let mut state = self.state();
        let record = state
            .sessions
            .entry(upsert.session_id.clone())
            .and_modify(|record| {
                record.merge(upsert);
            })
            .or_insert_with(|| SessionRecord::from_upsert(upsert));
        Ok(record.clone())
    }

    fn insert_chunk(
        &self,
        chunk: &ChunkSubmission,
        fingerprint: &ChunkFingerprint,
        received_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, StoreError> {
        let mut state = self.state();
        if !state.sessions.contains_key(&chunk.session_id) {
            return Err(StoreError::UnknownSession(chunk.session_id.clone()));
        }
        let key = (chunk.session_id.clone(), fingerprint.clone());
        if !state.fingerprints.insert(key) {
            return Ok(SubmitOutcome::Duplicate);
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.chunks.push(ChunkRecord {
            seq,
            session_id: chunk.session_id.clone(),
            fingerprint: fingerprint.clone(),
            events: chunk.events.clone(),
            source_url: chunk.source_url.clone(),
            received_at,
        });
        Ok(SubmitOutcome::Stored)
    }

    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.state().sessions.get(session_id).cloned())
    }

    fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        Ok(self
            .state()
            .chunks
            .iter()
            .filter(|chunk| chunk.session_id == session_id)
            .cloned()
            .collect())
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.state().sessions.values().cloned().collect())
    }

    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        let existed = state.sessions.remove(session_id).is_some();
        state.chunks.retain(|chunk| chunk.session_id != session_id);
        state.fingerprints.retain(|(id, _)| id != session_id);
        Ok(existed)
    }
}

impl SessionSource for MemoryStore {
    fn get_session(&self, session_id: &str) -> Result<SessionRecord, RetrievalError> {
        load_session(self, session_id)
    }

    fn get_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, RetrievalError> {
        load_chunks(self, session_id)
    }
}
