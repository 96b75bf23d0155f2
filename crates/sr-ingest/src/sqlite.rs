// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! SQLite-backed chunk store

use crate::store::{load_chunks, load_session, ChunkStore, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sr_domain_types::{
    ChunkFingerprint, ChunkRecord, ChunkSubmission, Event, RetrievalError, SessionRecord,
    SessionSource, SessionUpsert, Size, SubmitOutcome,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r#"
-- Session metadata, one row per capture session
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    url TEXT,
    viewport_width INTEGER,
    viewport_height INTEGER,
    user_agent TEXT,
    screen_width INTEGER,
    screen_height INTEGER,
    referrer TEXT,
    start_time INTEGER,
    end_time INTEGER
);

-- Chunks (append-only, deduplicated per session)
CREATE TABLE IF NOT EXISTS chunks (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    events TEXT NOT NULL,
    source_url TEXT NOT NULL,
    received_at INTEGER NOT NULL,
    UNIQUE(session_id, fingerprint)
);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id, seq);
"#;

const SESSION_COLUMNS: &str = "id, url, viewport_width, viewport_height, user_agent, \
     screen_width, screen_height, referrer, start_time, end_time";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn size(width: Option<u32>, height: Option<u32>) -> Option<Size> {
    Some(Size::new(width?, height?))
}

fn to_millis(value: Option<u64>) -> Option<i64> {
    value.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX))
}

fn from_millis(value: Option<i64>) -> Option<u64> {
    value.map(|ms| u64::try_from(ms).unwrap_or_default())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        viewport: size(row.get(2)?, row.get(3)?),
        user_agent: row.get(4)?,
        screen_resolution: size(row.get(5)?, row.get(6)?),
        referrer: row.get(7)?,
        start_time: from_millis(row.get(8)?),
        end_time: from_millis(row.get(9)?),
    })
}

fn find_in(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<SessionRecord>> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
        params![session_id],
        session_from_row,
    )
    .optional()
}

fn write_session(conn: &Connection, record: &SessionRecord) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO sessions ({SESSION_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            record.id,
            record.url,
            record.viewport.map(|s| s.width),
            record.viewport.map(|s| s.height),
            record.user_agent,
            record.screen_resolution.map(|s| s.width),
            record.screen_resolution.map(|s| s.height),
            record.referrer,
            to_millis(record.start_time),
            to_millis(record.end_time),
        ],
    )
}

impl ChunkStore for SqliteStore {
    fn upsert_session(&self, upsert: &SessionUpsert) -> Result<SessionRecord, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let record = match find_in(&tx, &upsert.session_id)? {
            Some(mut existing) => {
                if existing.merge(upsert) {
                    write_session(&tx, &existing)?;
                }
                existing
            }
            None => {
                let created = SessionRecord::from_upsert(upsert);
                write_session(&tx, &created)?;
                debug!(session_id = %created.id, "created session");
                created
            }
        };

        tx.commit()?;
        Ok(record)
    }

    fn insert_chunk(
        &self,
        chunk: &ChunkSubmission,
        fingerprint: &ChunkFingerprint,
        received_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, StoreError> {
        let events = serde_json::to_string(&chunk.events)?;
        let conn = self.conn();

        if find_in(&conn, &chunk.session_id)?.is_none() {
            return Err(StoreError::UnknownSession(chunk.session_id.clone()));
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO chunks (session_id, fingerprint, events, source_url, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chunk.session_id,
                fingerprint.0,
                events,
                chunk.source_url,
                received_at.timestamp_millis(),
            ],
        )?;

        Ok(if inserted == 0 {
            SubmitOutcome::Duplicate
        } else {
            SubmitOutcome::Stored
        })
    }

    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(find_in(&self.conn(), session_id)?)
    }

    fn list_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT seq, fingerprint, events, source_url, received_at
                 FROM chunks WHERE session_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|(seq, fingerprint, events, source_url, received_at)| {
                let events: Vec<Event> = serde_json::from_str(&events)?;
                Ok(ChunkRecord {
                    seq: u64::try_from(seq).unwrap_or_default(),
                    session_id: session_id.to_string(),
                    fingerprint: ChunkFingerprint(fingerprint),
                    events,
                    source_url,
                    received_at: DateTime::from_timestamp_millis(received_at).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY id"))?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE session_id = ?1", params![session_id])?;
        let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

impl SessionSource for SqliteStore {
    fn get_session(&self, session_id: &str) -> Result<SessionRecord, RetrievalError> {
        load_session(self, session_id)
    }

    fn get_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, RetrievalError> {
        load_chunks(self, session_id)
    }
}
