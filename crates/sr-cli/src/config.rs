// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `sr` configuration file
//!
//! ```toml
//! [logging]
//! log-level = "debug"
//!
//! [ingest]
//! bind_addr = "0.0.0.0:8085"
//! database_path = "/var/lib/sr/sessions.db"
//!
//! [ingest.credentials]
//! "site-key-1" = "shop.example"
//!
//! [replay]
//! speed = 2.0
//! container = { width = 1920, height = 1080 }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sr_ingest::IngestConfig;
use sr_logging::CliLoggingArgs;
use sr_replay::ReplayConfig;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: CliLoggingArgs,
    pub ingest: IngestConfig,
    pub replay: ReplayConfig,
}

impl CliConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid configuration")
    }

    /// Read `path`, or fall back to defaults when no file was given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain_types::Size;
    use sr_logging::CliLogLevel;

    #[test]
    fn tables_are_optional() {
        assert_eq!(CliConfig::from_toml_str("").unwrap(), CliConfig::default());
    }

    #[test]
    fn full_file_is_understood() {
        let config = CliConfig::from_toml_str(
            r#"
            [logging]
            log-level = "debug"

            [ingest]
            bind_addr = "0.0.0.0:9000"
            database_path = "sessions.db"
            admin_token = "ops"

            [ingest.credentials]
            "site-key-1" = "shop.example"

            [replay]
            speed = 2.0
            container = { width = 1920, height = 1080 }
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.log_level, Some(CliLogLevel::Debug));
        assert_eq!(config.ingest.bind_addr.port(), 9000);
        assert_eq!(config.ingest.database_path, "sessions.db");
        assert_eq!(
            config.ingest.credentials.get("site-key-1").map(String::as_str),
            Some("shop.example")
        );
        assert_eq!(config.replay.speed, 2.0);
        assert_eq!(config.replay.container, Size::new(1920, 1080));
        assert_eq!(config.replay.tick_ms, sr_replay::config::DEFAULT_TICK_MS);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
