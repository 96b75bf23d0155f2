// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HTTP client for the ingestion service

use crate::transport::{IngestApi, TransportError};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use sr_domain_types::{ChunkSubmission, SessionUpsert, SubmitOutcome, SubmitReceipt};
use url::Url;

/// Talks JSON to `/api/v1` with a bearer credential
#[derive(Debug, Clone)]
pub struct HttpIngestClient {
    http_client: HttpClient,
    base_url: Url,
    credential: String,
}

impl HttpIngestClient {
    pub fn new(base_url: &str, credential: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url).map_err(|e| TransportError::Endpoint(e.to_string()))?;
        let http_client = HttpClient::builder()
            .user_agent(concat!("sr-capture/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            credential: credential.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Endpoint(e.to_string()))
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = self.endpoint(path)?;
        let response = self
            .http_client
            .request(method, url)
            .bearer_auth(&self.credential)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Status {
            status: status.as_u16(),
            body: format!("unreadable response body: {e}"),
        })
    }
}

#[async_trait]
impl IngestApi for HttpIngestClient {
    async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<(), TransportError> {
        let path = format!("/api/v1/sessions/{}", upsert.session_id);
        let _: serde_json::Value = self.request(Method::PUT, &path, upsert).await?;
        Ok(())
    }

    async fn submit_chunk(&self, chunk: &ChunkSubmission) -> Result<SubmitOutcome, TransportError> {
        let receipt: SubmitReceipt = self.request(Method::POST, "/api/v1/chunks", chunk).await?;
        Ok(receipt.outcome)
    }
}
