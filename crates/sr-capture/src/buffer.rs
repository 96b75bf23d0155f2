// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! State shared between the agent and the transport

use sr_domain_types::{Event, SessionUpsert};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning is ignored: every critical section leaves the data consistent.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pending events awaiting delivery
///
/// The agent appends, the transport swaps the whole buffer out in one step and
/// puts undelivered events back in front of anything captured meanwhile.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    inner: Arc<Mutex<Vec<Event>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return the new length
    pub fn push(&self, event: Event) -> usize {
        let mut events = lock(&self.inner);
        events.push(event);
        events.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Swap the buffer with an empty one
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *lock(&self.inner))
    }

    /// Put events back ahead of whatever was appended since they were taken
    pub fn requeue_front(&self, mut events: Vec<Event>) {
        let mut live = lock(&self.inner);
        events.append(&mut live);
        *live = events;
    }
}

/// Global on/off switch for capture
///
/// Turned off for good once the ingestion boundary rejects the credential.
#[derive(Debug, Clone)]
pub struct CaptureSwitch {
    enabled: Arc<AtomicBool>,
}

impl Default for CaptureSwitch {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl CaptureSwitch {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    upsert: SessionUpsert,
    current_url: String,
}

/// Everything the agent and the transport both touch
#[derive(Debug, Clone, Default)]
pub struct CaptureShared {
    pub buffer: EventBuffer,
    pub switch: CaptureSwitch,
    session: Arc<Mutex<SessionState>>,
}

impl CaptureShared {
    pub fn new(session_id: impl Into<String>) -> Self {
        let shared = Self::default();
        lock(&shared.session).upsert.session_id = session_id.into();
        shared
    }

    pub fn session_id(&self) -> String {
        lock(&self.session).upsert.session_id.clone()
    }

    /// Record the descriptive fields known when capture starts
    pub fn describe_session(&self, upsert: SessionUpsert) {
        let mut state = lock(&self.session);
        state.current_url = upsert.url.clone().unwrap_or_default();
        state.upsert = upsert;
    }

    pub fn set_current_url(&self, url: impl Into<String>) {
        lock(&self.session).current_url = url.into();
    }

    pub fn current_url(&self) -> String {
        lock(&self.session).current_url.clone()
    }

    /// Session upsert to send alongside a flush happening at `now`
    pub fn session_upsert(&self, now: u64) -> SessionUpsert {
        let state = lock(&self.session);
        SessionUpsert {
            end_time: Some(now),
            ..state.upsert.clone()
        }
    }
}
