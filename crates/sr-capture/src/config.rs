// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capture configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default pointer-move sampling interval (100ms)
const DEFAULT_POINTER_THROTTLE_MS: u64 = 100;

/// Default drag sampling interval (150ms)
const DEFAULT_DRAG_THROTTLE_MS: u64 = 150;

/// Default scroll sampling interval (100ms)
const DEFAULT_SCROLL_THROTTLE_MS: u64 = 100;

/// Minimum spacing between two mutation drains (500ms)
const DEFAULT_MUTATION_DRAIN_MS: u64 = 500;

const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 5.0;

/// Minimum spacing between a significance-triggered snapshot and the previous one
const DEFAULT_SIGNIFICANT_SNAPSHOT_GAP_MS: u64 = 5_000;

const DEFAULT_PERIODIC_SNAPSHOT_MS: u64 = 10_000;

const DEFAULT_INTERACTION_SETTLE_MS: u64 = 100;

const DEFAULT_INTERACTION_SNAPSHOT_GAP_MS: u64 = 3_000;

const DEFAULT_CANVAS_DEBOUNCE_MS: u64 = 100;

/// Delay between pointer-up over a canvas and the closing capture of the stroke
const DEFAULT_STROKE_CAPTURE_DELAY_MS: u64 = 50;

const DEFAULT_NAVIGATION_POLL_MS: u64 = 500;

/// Buffered event count that forces a flush
const DEFAULT_BUFFER_LIMIT: usize = 10;

const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// Interval at which the runtime pumps the agent's timers
const DEFAULT_TICK_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse capture config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid capture config: {0}")]
    Invalid(String),
}

/// Tunables of the instrumentation agent and its transport
///
/// Every field has a default so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub pointer_throttle_ms: u64,
    pub drag_throttle_ms: u64,
    pub scroll_throttle_ms: u64,
    pub mutation_drain_ms: u64,
    pub significance_threshold: f64,
    pub significant_snapshot_gap_ms: u64,
    pub periodic_snapshot_ms: u64,
    pub interaction_settle_ms: u64,
    pub interaction_snapshot_gap_ms: u64,
    pub canvas_debounce_ms: u64,
    pub stroke_capture_delay_ms: u64,
    pub navigation_poll_ms: u64,
    pub buffer_limit: usize,
    pub flush_interval_ms: u64,
    pub tick_ms: u64,
    /// Replace the value of password inputs with `*` per character
    pub mask_passwords: bool,
    /// Fixed session id; a random one is generated when unset
    pub session_id: Option<String>,
    /// Base URL of the ingestion service
    pub ingest_endpoint: Option<String>,
    /// Bearer credential presented to the ingestion service
    pub credential: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pointer_throttle_ms: DEFAULT_POINTER_THROTTLE_MS,
            drag_throttle_ms: DEFAULT_DRAG_THROTTLE_MS,
            scroll_throttle_ms: DEFAULT_SCROLL_THROTTLE_MS,
            mutation_drain_ms: DEFAULT_MUTATION_DRAIN_MS,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            significant_snapshot_gap_ms: DEFAULT_SIGNIFICANT_SNAPSHOT_GAP_MS,
            periodic_snapshot_ms: DEFAULT_PERIODIC_SNAPSHOT_MS,
            interaction_settle_ms: DEFAULT_INTERACTION_SETTLE_MS,
            interaction_snapshot_gap_ms: DEFAULT_INTERACTION_SNAPSHOT_GAP_MS,
            canvas_debounce_ms: DEFAULT_CANVAS_DEBOUNCE_MS,
            stroke_capture_delay_ms: DEFAULT_STROKE_CAPTURE_DELAY_MS,
            navigation_poll_ms: DEFAULT_NAVIGATION_POLL_MS,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            tick_ms: DEFAULT_TICK_MS,
            mask_passwords: true,
            session_id: None,
            ingest_endpoint: None,
            credential: None,
        }
    }
}

impl CaptureConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_limit == 0 {
            return Err(ConfigError::Invalid("buffer_limit must be at least 1".into()));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if !self.significance_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "significance_threshold must be finite".into(),
            ));
        }
        Ok(())
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    pub fn with_mask_passwords(mut self, mask: bool) -> Self {
        self.mask_passwords = mask;
        self
    }
}
