// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Chunk delivery to the ingestion boundary

use crate::buffer::CaptureShared;
use async_trait::async_trait;
use sr_domain_types::{ChunkSubmission, Event, SessionUpsert, SubmitOutcome};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("credential rejected with status {status}")]
    CredentialRejected { status: u16 },

    #[error("chunk too large for the ingestion boundary (status {status})")]
    PayloadTooLarge { status: u16 },

    #[error("ingestion failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("invalid ingest endpoint: {0}")]
    Endpoint(String),
}

impl TransportError {
    /// Map a non-success HTTP status to the matching error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 | 403 => TransportError::CredentialRejected { status },
            413 => TransportError::PayloadTooLarge { status },
            _ => TransportError::Status {
                status,
                body: body.into(),
            },
        }
    }

    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, TransportError::CredentialRejected { .. })
    }

    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, TransportError::PayloadTooLarge { .. })
    }
}

/// The two calls a capture session makes against the ingestion boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestApi: Send + Sync {
    async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<(), TransportError>;

    async fn submit_chunk(&self, chunk: &ChunkSubmission) -> Result<SubmitOutcome, TransportError>;
}

/// Result of one flush attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// Capture is switched off; nothing was sent
    Disabled,
    Delivered { events: usize, outcome: SubmitOutcome },
    /// An oversized chunk went out in smaller pieces; `dropped` single
    /// events were refused even on their own
    Split { delivered: usize, dropped: usize },
}

/// Moves buffered events to an [`IngestApi`]
///
/// Delivery is at-least-once: a failed chunk goes back to the head of the
/// buffer and is retried on the next flush. A credential rejection turns
/// capture off and drops the chunk. A chunk refused as too large is resent
/// in halves until the pieces fit.
#[derive(Clone)]
pub struct ChunkTransport {
    api: Arc<dyn IngestApi>,
    shared: CaptureShared,
}

impl ChunkTransport {
    pub fn new(api: Arc<dyn IngestApi>, shared: CaptureShared) -> Self {
        Self { api, shared }
    }

    pub fn shared(&self) -> &CaptureShared {
        &self.shared
    }

    pub async fn flush(&self, now: u64) -> Result<FlushOutcome, TransportError> {
        if !self.shared.switch.is_enabled() {
            return Ok(FlushOutcome::Disabled);
        }

        let events = self.shared.buffer.take();
        if events.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let upsert = self.shared.session_upsert(now);
        let chunk = ChunkSubmission {
            session_id: upsert.session_id.clone(),
            events,
            source_url: self.shared.current_url(),
        };
        let count = chunk.events.len();

        match self.deliver(&upsert, &chunk).await {
            Ok(outcome) => {
                debug!(
                    session_id = %chunk.session_id,
                    events = count,
                    outcome = ?outcome,
                    "flushed chunk"
                );
                Ok(FlushOutcome::Delivered {
                    events: count,
                    outcome,
                })
            }
            Err(err) if err.is_credential_rejection() => {
                warn!(
                    session_id = %chunk.session_id,
                    error = %err,
                    dropped = count,
                    "credential rejected, disabling capture"
                );
                self.shared.switch.disable();
                Err(err)
            }
            Err(err) if err.is_payload_too_large() => {
                warn!(
                    session_id = %chunk.session_id,
                    events = count,
                    "chunk refused as too large, splitting"
                );
                self.deliver_split(chunk).await
            }
            Err(err) => {
                warn!(
                    session_id = %chunk.session_id,
                    error = %err,
                    events = count,
                    "flush failed, requeueing chunk"
                );
                self.shared.buffer.requeue_front(chunk.events);
                Err(err)
            }
        }
    }

    async fn deliver_split(&self, chunk: ChunkSubmission) -> Result<FlushOutcome, TransportError> {
        let ChunkSubmission {
            session_id,
            events,
            source_url,
        } = chunk;

        // Stack of (events, already refused); the last entry goes next.
        let mut pending: Vec<(Vec<Event>, bool)> = vec![(events, true)];
        let mut delivered = 0;
        let mut dropped = 0;

        while let Some((mut events, refused)) = pending.pop() {
            if refused {
                if events.len() <= 1 {
                    for event in &events {
                        warn!(
                            %session_id,
                            id = %event.id,
                            kind = %event.event_type(),
                            "dropping event too large to deliver"
                        );
                    }
                    dropped += events.len();
                } else {
                    let second = events.split_off(events.len() / 2);
                    pending.push((second, false));
                    pending.push((events, false));
                }
                continue;
            }

            let piece = ChunkSubmission {
                session_id: session_id.clone(),
                events,
                source_url: source_url.clone(),
            };
            match self.api.submit_chunk(&piece).await {
                Ok(_) => delivered += piece.events.len(),
                Err(err) if err.is_payload_too_large() => pending.push((piece.events, true)),
                Err(err) if err.is_credential_rejection() => {
                    warn!(%session_id, error = %err, "credential rejected, disabling capture");
                    self.shared.switch.disable();
                    return Err(err);
                }
                Err(err) => {
                    let mut undelivered = piece.events;
                    while let Some((rest, _)) = pending.pop() {
                        undelivered.extend(rest);
                    }
                    warn!(
                        %session_id,
                        error = %err,
                        events = undelivered.len(),
                        "flush of split chunk failed, requeueing remainder"
                    );
                    self.shared.buffer.requeue_front(undelivered);
                    return Err(err);
                }
            }
        }

        debug!(%session_id, delivered, dropped, "flushed oversized chunk in pieces");
        Ok(FlushOutcome::Split { delivered, dropped })
    }

    async fn deliver(
        &self,
        upsert: &SessionUpsert,
        chunk: &ChunkSubmission,
    ) -> Result<SubmitOutcome, TransportError> {
        self.api.upsert_session(upsert).await?;
        self.api.submit_chunk(chunk).await
    }
}
