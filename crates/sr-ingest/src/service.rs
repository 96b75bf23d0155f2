// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request-independent core of the receiving boundary
//!
//! Every write is authorized by a bearer credential whose allowed hostname
//! must equal the hostname of the URL the write is about. Chunks are
//! deduplicated by fingerprint and create their session on first contact.

use crate::credentials::{hostname_of, CredentialValidator};
use crate::error::{IngestError, IngestResult};
use crate::store::ChunkStore;
use chrono::Utc;
use sr_domain_types::{
    ChunkRecord, ChunkSubmission, RetrievalError, SessionRecord, SessionSource, SessionUpsert,
    SubmitReceipt,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn ChunkStore>,
    credentials: Arc<dyn CredentialValidator>,
}

impl IngestService {
    pub fn new(store: Arc<dyn ChunkStore>, credentials: Arc<dyn CredentialValidator>) -> Self {
        Self { store, credentials }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    fn allowed_host(&self, credential: Option<&str>) -> IngestResult<String> {
        let credential = credential.ok_or(IngestError::Unauthorized)?;
        self.credentials
            .allowed_hostname(credential)
            .map_err(|_| IngestError::Unauthorized)
    }

    fn check_host(allowed: &str, url: &str) -> IngestResult<()> {
        let host = hostname_of(url).map_err(|err| IngestError::BadRequest(err.to_string()))?;
        if host != allowed {
            warn!(%host, %allowed, "credential used for a foreign host");
            return Err(IngestError::Forbidden { host });
        }
        Ok(())
    }

    /// Check that `credential` may write data about `url`
    pub fn authorize(&self, credential: Option<&str>, url: &str) -> IngestResult<()> {
        let allowed = self.allowed_host(credential)?;
        Self::check_host(&allowed, url)
    }

    /// Create or merge a session record
    ///
    /// The hostname check uses the upsert's URL, or the stored session's URL
    /// when the upsert carries none.
    pub fn upsert_session(
        &self,
        credential: Option<&str>,
        upsert: &SessionUpsert,
    ) -> IngestResult<SessionRecord> {
        let allowed = self.allowed_host(credential)?;
        if upsert.session_id.is_empty() {
            return Err(IngestError::BadRequest("session id is empty".to_string()));
        }

        let url = match &upsert.url {
            Some(url) => url.clone(),
            None => self
                .store
                .find_session(&upsert.session_id)?
                .and_then(|record| record.url)
                .ok_or_else(|| {
                    IngestError::BadRequest("session has no url to authorize against".to_string())
                })?,
        };
        Self::check_host(&allowed, &url)?;

        let record = self.store.upsert_session(upsert)?;
        debug!(session_id = %record.id, end_time = ?record.end_time, "session upserted");
        Ok(record)
    }

    /// Store a chunk unless an identical one was already received
    pub fn submit_chunk(
        &self,
        credential: Option<&str>,
        chunk: &ChunkSubmission,
    ) -> IngestResult<SubmitReceipt> {
        self.authorize(credential, &chunk.source_url)?;
        let fingerprint = chunk.fingerprint().ok_or(IngestError::EmptyChunk)?;

        self.store.upsert_session(&SessionUpsert {
            session_id: chunk.session_id.clone(),
            url: Some(chunk.source_url.clone()),
            ..Default::default()
        })?;

        let outcome = self.store.insert_chunk(chunk, &fingerprint, Utc::now())?;
        info!(
            session_id = %chunk.session_id,
            events = chunk.events.len(),
            fingerprint = %fingerprint,
            outcome = ?outcome,
            "chunk received"
        );
        Ok(SubmitReceipt {
            outcome,
            fingerprint,
        })
    }

    pub fn get_session(&self, session_id: &str) -> IngestResult<SessionRecord> {
        self.store
            .find_session(session_id)?
            .ok_or_else(|| IngestError::SessionNotFound(session_id.to_string()))
    }

    pub fn get_chunks(&self, session_id: &str) -> IngestResult<Vec<ChunkRecord>> {
        self.get_session(session_id)?;
        Ok(self.store.list_chunks(session_id)?)
    }

    pub fn list_sessions(&self) -> IngestResult<Vec<SessionRecord>> {
        Ok(self.store.list_sessions()?)
    }

    pub fn delete_session(&self, session_id: &str) -> IngestResult<()> {
        if self.store.delete_session(session_id)? {
            info!(%session_id, "session deleted");
            Ok(())
        } else {
            Err(IngestError::SessionNotFound(session_id.to_string()))
        }
    }
}

impl SessionSource for IngestService {
    fn get_session(&self, session_id: &str) -> Result<SessionRecord, RetrievalError> {
        IngestService::get_session(self, session_id).map_err(into_retrieval)
    }

    fn get_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, RetrievalError> {
        IngestService::get_chunks(self, session_id).map_err(into_retrieval)
    }
}

fn into_retrieval(err: IngestError) -> RetrievalError {
    match err {
        IngestError::SessionNotFound(id) => RetrievalError::SessionNotFound(id),
        other => RetrievalError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialError, MockCredentialValidator, StaticCredentials};
    use crate::memory::MemoryStore;
    use crate::store::MockChunkStore;
    use sr_domain_types::{Event, EventPayload, EventType, SubmitOutcome, Visibility};

    fn service() -> IngestService {
        IngestService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticCredentials::new().with_key("key-app", "app.example")),
        )
    }

    fn visibility(ts: u64, visible: bool) -> Event {
        Event::new(
            format!("v{ts}"),
            ts,
            EventPayload::VisibilityChange(Visibility { visible }),
        )
    }

    fn chunk(url: &str, events: Vec<Event>) -> ChunkSubmission {
        ChunkSubmission {
            session_id: "s1".to_string(),
            events,
            source_url: url.to_string(),
        }
    }

    #[test]
    fn identical_chunk_is_stored_once() {
        let service = service();
        let submission = chunk("https://app.example/a", vec![visibility(0, true)]);

        let first = service.submit_chunk(Some("key-app"), &submission).unwrap();
        let second = service.submit_chunk(Some("key-app"), &submission).unwrap();

        assert_eq!(first.outcome, SubmitOutcome::Stored);
        assert_eq!(second.outcome, SubmitOutcome::Duplicate);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(service.get_chunks("s1").unwrap().len(), 1);
    }

    #[test]
    fn colliding_fingerprints_drop_the_second_chunk() {
        // Same count, first/last type and first timestamp; different content.
        let service = service();
        let a = chunk("https://app.example/", vec![visibility(10, true), visibility(20, false)]);
        let b = chunk("https://app.example/", vec![visibility(10, false), visibility(99, true)]);

        service.submit_chunk(Some("key-app"), &a).unwrap();
        let receipt = service.submit_chunk(Some("key-app"), &b).unwrap();

        assert_eq!(receipt.outcome, SubmitOutcome::Duplicate);
        let stored = service.get_chunks("s1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].events, a.events);
    }

    #[test]
    fn first_chunk_creates_the_session() {
        let service = service();
        service
            .submit_chunk(Some("key-app"), &chunk("https://app.example/x", vec![visibility(0, true)]))
            .unwrap();

        let record = service.get_session("s1").unwrap();
        assert_eq!(record.url.as_deref(), Some("https://app.example/x"));
    }

    #[test]
    fn hostname_must_match_exactly() {
        let service = service();
        let foreign = chunk("https://other.example/", vec![visibility(0, true)]);
        let sub = chunk("https://www.app.example/", vec![visibility(0, true)]);
        let same_host = chunk("http://app.example:9000/deep/path?q=1", vec![visibility(0, true)]);

        assert!(matches!(
            service.submit_chunk(Some("key-app"), &foreign),
            Err(IngestError::Forbidden { .. })
        ));
        assert!(matches!(
            service.submit_chunk(Some("key-app"), &sub),
            Err(IngestError::Forbidden { .. })
        ));
        assert!(service.submit_chunk(Some("key-app"), &same_host).is_ok());
    }

    #[test]
    fn missing_or_unknown_credentials_are_unauthorized() {
        let service = service();
        let submission = chunk("https://app.example/", vec![visibility(0, true)]);
        assert!(matches!(
            service.submit_chunk(None, &submission),
            Err(IngestError::Unauthorized)
        ));
        assert!(matches!(
            service.submit_chunk(Some("stolen"), &submission),
            Err(IngestError::Unauthorized)
        ));
    }

    #[test]
    fn empty_chunks_are_rejected() {
        let service = service();
        assert!(matches!(
            service.submit_chunk(Some("key-app"), &chunk("https://app.example/", vec![])),
            Err(IngestError::EmptyChunk)
        ));
        assert!(service.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn upsert_without_url_authorizes_against_stored_url() {
        let service = service();
        service
            .upsert_session(
                Some("key-app"),
                &SessionUpsert {
                    session_id: "s1".to_string(),
                    url: Some("https://app.example/".to_string()),
                    end_time: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();

        let refreshed = service
            .upsert_session(
                Some("key-app"),
                &SessionUpsert {
                    session_id: "s1".to_string(),
                    end_time: Some(50),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(refreshed.end_time, Some(50));

        let unknown = service.upsert_session(
            Some("key-app"),
            &SessionUpsert {
                session_id: "s2".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(unknown, Err(IngestError::BadRequest(_))));
    }

    #[test]
    fn retrieval_goes_through_the_session_source_seam() {
        let service = service();
        service
            .submit_chunk(Some("key-app"), &chunk("https://app.example/", vec![visibility(3, true)]))
            .unwrap();

        let source: &dyn SessionSource = &service;
        let chunks = source.get_chunks("s1").unwrap();
        assert_eq!(chunks[0].events[0].event_type(), EventType::VisibilityChange);
        assert!(matches!(
            source.get_session("missing"),
            Err(RetrievalError::SessionNotFound(_))
        ));
    }

    #[test]
    fn rejected_credential_never_touches_the_store() {
        let mut store = MockChunkStore::new();
        store.expect_upsert_session().never();
        store.expect_insert_chunk().never();
        let mut credentials = MockCredentialValidator::new();
        credentials
            .expect_allowed_hostname()
            .returning(|_| Err(CredentialError::Unknown));

        let service = IngestService::new(Arc::new(store), Arc::new(credentials));
        let result =
            service.submit_chunk(Some("k"), &chunk("https://app.example/", vec![visibility(0, true)]));
        assert!(matches!(result, Err(IngestError::Unauthorized)));
    }

    #[test]
    fn deleting_unknown_session_is_not_found() {
        let service = service();
        assert!(matches!(
            service.delete_session("ghost"),
            Err(IngestError::SessionNotFound(_))
        ));
    }
}
