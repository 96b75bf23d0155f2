// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capture side of Session Replay
//!
//! [`InstrumentationAgent`] observes a [`Surface`] and appends events to a
//! shared buffer; [`ChunkTransport`] delivers that buffer to an
//! [`IngestApi`] in chunks; [`CaptureRuntime`] drives both on a tokio timer.

pub mod agent;
pub mod buffer;
pub mod config;
pub mod http;
pub mod identity;
pub mod runtime;
pub mod scoring;
pub mod surface;
pub mod transport;

pub use agent::{InstrumentationAgent, MutationNotice};
pub use buffer::{CaptureShared, CaptureSwitch, EventBuffer};
pub use config::{CaptureConfig, ConfigError};
pub use http::HttpIngestClient;
pub use runtime::{CaptureRuntime, HostClock, SharedAgent};
pub use surface::{MemorySurface, NodePath, Surface, SurfaceError};
pub use transport::{ChunkTransport, FlushOutcome, IngestApi, TransportError};
