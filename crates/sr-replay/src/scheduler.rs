// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Playback state machine
//!
//! `Stopped -> Playing <-> Paused`, `Playing -> Ended`. `Ended` is left only
//! through [`PlaybackScheduler::restart`]. Each tick advances the cursor by
//! `tick_ms * speed` and dispatches every event in `(previous, cursor]` to the
//! engine; the very first tick from 0 also takes events stamped exactly 0.

use crate::config::ReplayConfig;
use crate::engine::{Frame, ReconstructionEngine};
use crate::timeline::Timeline;
use std::ops::Bound;
use std::sync::Arc;
use strum::Display;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: PlaybackState,
        action: &'static str,
    },

    #[error("playback speed must be finite and positive, got {0}")]
    InvalidSpeed(f64),
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub frame: Frame,
    pub dispatched: usize,
    pub ended: bool,
}

pub struct PlaybackScheduler {
    engine: ReconstructionEngine,
    state: PlaybackState,
    position: f64,
    speed: f64,
    tick_ms: u64,
    include_zero: bool,
}

impl PlaybackScheduler {
    pub fn new(timeline: Arc<Timeline>, config: ReplayConfig) -> Result<Self, PlaybackError> {
        validate_speed(config.speed)?;
        let speed = config.speed;
        let tick_ms = config.tick_ms.max(1);
        Ok(Self {
            engine: ReconstructionEngine::new(timeline, config),
            state: PlaybackState::Stopped,
            position: 0.0,
            speed,
            tick_ms,
            include_zero: true,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Cursor in timeline milliseconds
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn duration(&self) -> u64 {
        self.engine.timeline().duration()
    }

    pub fn engine(&self) -> &ReconstructionEngine {
        &self.engine
    }

    pub fn frame(&self) -> Frame {
        self.engine.frame_at(self.position())
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Stopped => {
                let at = self.position();
                if at == 0 {
                    self.engine.reset();
                    self.include_zero = true;
                } else {
                    self.engine.seek(at);
                    self.include_zero = false;
                }
            }
            PlaybackState::Paused => {}
            from => return Err(invalid(from, "play")),
        }
        self.transition(PlaybackState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Playing => {
                self.transition(PlaybackState::Paused);
                Ok(())
            }
            from => Err(invalid(from, "pause")),
        }
    }

    /// Halt playback, keeping the cursor where it is
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                self.transition(PlaybackState::Stopped);
                Ok(())
            }
            from => Err(invalid(from, "stop")),
        }
    }

    /// Start over from 0, from any state
    pub fn restart(&mut self) {
        self.position = 0.0;
        self.engine.reset();
        self.include_zero = true;
        self.transition(PlaybackState::Playing);
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        validate_speed(speed)?;
        debug!(from = self.speed, to = speed, "playback speed changed");
        self.speed = speed;
        Ok(())
    }

    /// Jump to `target` without dispatching the events in between
    pub fn seek(&mut self, target: u64) -> Frame {
        let target = target.min(self.duration());
        self.position = target as f64;
        self.include_zero = false;
        self.engine.seek(target)
    }

    pub fn tick(&mut self) -> Result<TickOutcome, PlaybackError> {
        if self.state != PlaybackState::Playing {
            return Err(invalid(self.state, "tick"));
        }

        let previous = self.position();
        let duration = self.duration();
        self.position = (self.position + self.tick_ms as f64 * self.speed).min(duration as f64);
        let current = self.position();

        let lower = if self.include_zero && previous == 0 {
            Bound::Included(0)
        } else {
            Bound::Excluded(previous)
        };
        self.include_zero = false;

        let timeline = Arc::clone(self.engine.timeline());
        let due = timeline.window((lower, Bound::Included(current)));
        for event in due {
            trace!(id = %event.id, at = event.timestamp, kind = %event.event_type(), "dispatch");
            self.engine.apply(event);
        }

        let ended = current >= duration;
        if ended {
            self.transition(PlaybackState::Ended);
        }

        Ok(TickOutcome {
            frame: self.engine.frame_at(current),
            dispatched: due.len(),
            ended,
        })
    }

    fn transition(&mut self, to: PlaybackState) {
        if self.state != to {
            debug!(from = %self.state, %to, position = self.position(), "playback state");
            self.state = to;
        }
    }
}

fn validate_speed(speed: f64) -> Result<(), PlaybackError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(PlaybackError::InvalidSpeed(speed))
    }
}

fn invalid(from: PlaybackState, action: &'static str) -> PlaybackError {
    PlaybackError::InvalidTransition { from, action }
}
