// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server configuration

use crate::credentials::StaticCredentials;
use crate::memory::MemoryStore;
use crate::service::IngestService;
use crate::sqlite::SqliteStore;
use crate::store::{ChunkStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

pub const DEFAULT_BIND_PORT: u16 = 8085;
pub const IN_MEMORY_DATABASE: &str = ":memory:";
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Ingest server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Path to SQLite database; `:memory:` keeps everything in process
    pub database_path: String,

    /// Credential to allowed hostname
    pub credentials: BTreeMap<String, String>,

    /// Bearer token required on the read/delete endpoints when set
    pub admin_token: Option<String>,

    /// Largest accepted request body; snapshots with canvases are the big ones
    pub max_body_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_BIND_PORT)),
            database_path: IN_MEMORY_DATABASE.to_string(),
            credentials: BTreeMap::new(),
            admin_token: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl IngestConfig {
    /// Open the configured store
    pub fn open_store(&self) -> Result<Arc<dyn ChunkStore>, StoreError> {
        if self.database_path == IN_MEMORY_DATABASE {
            Ok(Arc::new(MemoryStore::new()))
        } else {
            Ok(Arc::new(SqliteStore::open(&self.database_path)?))
        }
    }

    pub fn static_credentials(&self) -> StaticCredentials {
        self.credentials
            .iter()
            .map(|(key, host)| (key.clone(), host.clone()))
            .collect()
    }

    pub fn build_service(&self) -> Result<IngestService, StoreError> {
        Ok(IngestService::new(
            self.open_store()?,
            Arc::new(self.static_credentials()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialValidator;

    #[test]
    fn defaults_bind_locally_in_memory() {
        let config = IngestConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8085");
        assert_eq!(config.database_path, ":memory:");
        assert!(config.admin_token.is_none());
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn credentials_table_feeds_the_validator() {
        let config: IngestConfig = serde_json::from_value(serde_json::json!({
            "credentials": {"key-1": "App.Example"}
        }))
        .unwrap();

        let creds = config.static_credentials();
        assert_eq!(creds.allowed_hostname("key-1").unwrap(), "app.example");
        assert_eq!(config.bind_addr.port(), DEFAULT_BIND_PORT);
    }

    #[test]
    fn file_backed_store_is_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = IngestConfig {
            database_path: dir.path().join("ingest.db").display().to_string(),
            ..Default::default()
        };
        let store = config.open_store().unwrap();
        assert!(store.list_sessions().unwrap().is_empty());
        assert!(dir.path().join("ingest.db").exists());
    }
}
