// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session records and the upsert rules applied to them

use crate::chunk::ChunkFingerprint;
use crate::event::{Event, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of an `upsert-session` call
///
/// Times are milliseconds since the UNIX epoch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionUpsert {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
}

/// Stored session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub url: Option<String>,
    pub viewport: Option<Size>,
    pub user_agent: Option<String>,
    pub screen_resolution: Option<Size>,
    pub referrer: Option<String>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl SessionRecord {
    /// Record created by the first upsert that references a session
    pub fn from_upsert(upsert: &SessionUpsert) -> Self {
        Self {
            id: upsert.session_id.clone(),
            url: upsert.url.clone(),
            viewport: upsert.viewport,
            user_agent: upsert.user_agent.clone(),
            screen_resolution: upsert.screen_resolution,
            referrer: upsert.referrer.clone(),
            start_time: upsert.start_time,
            end_time: upsert.end_time,
        }
    }

    /// Apply a later upsert
    ///
    /// Descriptive fields are first-write-wins: only unset fields are filled.
    /// `end_time` only ever moves forward. Returns whether anything changed.
    pub fn merge(&mut self, upsert: &SessionUpsert) -> bool {
        let before = self.clone();

        fill(&mut self.url, &upsert.url);
        fill(&mut self.viewport, &upsert.viewport);
        fill(&mut self.user_agent, &upsert.user_agent);
        fill(&mut self.screen_resolution, &upsert.screen_resolution);
        fill(&mut self.referrer, &upsert.referrer);
        fill(&mut self.start_time, &upsert.start_time);

        if let Some(end) = upsert.end_time {
            if self.end_time.map_or(true, |current| end > current) {
                self.end_time = Some(end);
            }
        }

        *self != before
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// A stored chunk as returned by the retrieval boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Monotonic arrival sequence within the store
    pub seq: u64,
    pub session_id: String,
    pub fingerprint: ChunkFingerprint,
    pub events: Vec<Event>,
    pub source_url: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(url: &str, end: u64) -> SessionUpsert {
        SessionUpsert {
            session_id: "s1".to_string(),
            url: Some(url.to_string()),
            viewport: Some(Size::new(1280, 720)),
            user_agent: Some("agent/1".to_string()),
            start_time: Some(1_000),
            end_time: Some(end),
            ..Default::default()
        }
    }

    #[test]
    fn descriptive_fields_are_first_write_wins() {
        let mut record = SessionRecord::from_upsert(&upsert("https://a.example/", 2_000));
        record.merge(&upsert("https://b.example/", 3_000));

        assert_eq!(record.url.as_deref(), Some("https://a.example/"));
        assert_eq!(record.end_time, Some(3_000));
    }

    #[test]
    fn unset_fields_are_filled_by_later_upserts() {
        let mut record = SessionRecord::from_upsert(&SessionUpsert {
            session_id: "s1".to_string(),
            ..Default::default()
        });
        assert!(record.merge(&SessionUpsert {
            referrer: Some("https://ref.example/".to_string()),
            ..upsert("https://a.example/", 5)
        }));

        assert_eq!(record.referrer.as_deref(), Some("https://ref.example/"));
        assert_eq!(record.url.as_deref(), Some("https://a.example/"));
    }

    #[test]
    fn end_time_never_moves_backwards() {
        let mut record = SessionRecord::from_upsert(&upsert("https://a.example/", 9_000));
        assert!(!record.merge(&upsert("https://a.example/", 4_000)));
        assert_eq!(record.end_time, Some(9_000));
    }
}
