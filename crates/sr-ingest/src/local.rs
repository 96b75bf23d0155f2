// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-process [`IngestApi`] for embedding capture and ingestion together

use crate::error::IngestError;
use crate::service::IngestService;
use async_trait::async_trait;
use sr_capture::{IngestApi, TransportError};
use sr_domain_types::{ChunkSubmission, SessionUpsert, SubmitOutcome};

/// Delivers chunks straight into an [`IngestService`] with a fixed credential
#[derive(Clone)]
pub struct LocalIngest {
    service: IngestService,
    credential: Option<String>,
}

impl LocalIngest {
    pub fn new(service: IngestService, credential: impl Into<String>) -> Self {
        Self {
            service,
            credential: Some(credential.into()),
        }
    }

    pub fn anonymous(service: IngestService) -> Self {
        Self {
            service,
            credential: None,
        }
    }

    pub fn service(&self) -> &IngestService {
        &self.service
    }
}

fn transport_error(err: IngestError) -> TransportError {
    TransportError::from_status(err.status().as_u16(), err.to_string())
}

#[async_trait]
impl IngestApi for LocalIngest {
    async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<(), TransportError> {
        self.service
            .upsert_session(self.credential.as_deref(), upsert)
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn submit_chunk(&self, chunk: &ChunkSubmission) -> Result<SubmitOutcome, TransportError> {
        self.service
            .submit_chunk(self.credential.as_deref(), chunk)
            .map(|receipt| receipt.outcome)
            .map_err(transport_error)
    }
}
