// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tokio driver for a capture session
//!
//! Pumps the agent's timers on a fixed interval, stands in for the host's
//! render-aligned callback when a mutation drain is pending, and performs the
//! flushes the agent asks for. The host keeps forwarding its callbacks through
//! the shared agent handle while the runtime runs.

use crate::agent::InstrumentationAgent;
use crate::surface::Surface;
use crate::transport::{ChunkTransport, FlushOutcome, IngestApi};
use sr_domain_types::Event;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Millisecond clock anchored to the UNIX epoch at construction
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
    epoch_ms: u64,
}

impl HostClock {
    pub fn system() -> Self {
        let epoch_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self::starting_at(epoch_ms)
    }

    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            epoch_ms,
        }
    }

    pub fn now(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_ms.saturating_add(elapsed)
    }
}

pub type SharedAgent<S> = Arc<Mutex<InstrumentationAgent<S>>>;

fn lock<S>(agent: &SharedAgent<S>) -> MutexGuard<'_, InstrumentationAgent<S>> {
    agent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CaptureRuntime<S> {
    agent: SharedAgent<S>,
    transport: ChunkTransport,
    clock: HostClock,
    tick: Duration,
}

impl<S: Surface> CaptureRuntime<S> {
    pub fn new(agent: InstrumentationAgent<S>, api: Arc<dyn IngestApi>) -> Self {
        let transport = ChunkTransport::new(api, agent.shared().clone());
        let tick = Duration::from_millis(agent.config().tick_ms.max(1));
        Self {
            agent: Arc::new(Mutex::new(agent)),
            transport,
            clock: HostClock::system(),
            tick,
        }
    }

    pub fn with_clock(mut self, clock: HostClock) -> Self {
        self.clock = clock;
        self
    }

    /// Handle the host uses to forward its callbacks
    pub fn agent(&self) -> SharedAgent<S> {
        Arc::clone(&self.agent)
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Start capture and drive it until `shutdown` fires or capture is disabled
    ///
    /// Returns the session log handed back by the agent on stop.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Vec<Event> {
        let started = lock(&self.agent).start(self.now());
        if !started {
            debug!("capture runtime did not start the agent");
        }

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.pump().await;
                    if !self.transport.shared().switch.is_enabled() {
                        info!("capture disabled, leaving capture runtime");
                        break;
                    }
                }
                _ = &mut shutdown => {
                    debug!("capture runtime shutting down");
                    break;
                }
            }
        }

        let now = self.now();
        let log = lock(&self.agent).stop(now);
        self.flush(now).await;
        log
    }

    async fn pump(&self) {
        let now = self.now();
        let flush = {
            let mut agent = lock(&self.agent);
            if agent.wants_animation_frame() {
                agent.on_animation_frame(now);
            }
            agent.tick(now);
            agent.take_flush_request()
        };
        if flush {
            self.flush(now).await;
        }
    }

    async fn flush(&self, now: u64) {
        // Failures are logged and requeued by the transport.
        if let Ok(outcome) = self.transport.flush(now).await {
            match outcome {
                FlushOutcome::Delivered { events, outcome } => {
                    trace!(events, outcome = ?outcome, "runtime flush delivered");
                }
                FlushOutcome::Split { delivered, dropped } => {
                    trace!(delivered, dropped, "runtime flush split an oversized chunk");
                }
                FlushOutcome::Empty | FlushOutcome::Disabled => {}
            }
        }
    }
}
