// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Receiving boundary for captured sessions
//!
//! Accepts session upserts and event chunks from capture agents, scoped to
//! one hostname per credential, deduplicates chunks by fingerprint and keeps
//! them in a [`ChunkStore`]. Stored sessions are read back through the
//! [`sr_domain_types::SessionSource`] seam.

pub mod config;
pub mod credentials;
pub mod error;
pub mod local;
pub mod memory;
pub mod server;
pub mod service;
pub mod sqlite;
pub mod store;

pub use config::IngestConfig;
pub use credentials::{hostname_of, CredentialError, CredentialValidator, StaticCredentials};
pub use error::{IngestError, IngestResult, ProblemDetails};
pub use local::LocalIngest;
pub use memory::MemoryStore;
pub use server::{router, IngestServer, IngestState};
pub use service::IngestService;
pub use sqlite::SqliteStore;
pub use store::{ChunkStore, StoreError};
