// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tokio driver for playback
//!
//! Ticks the scheduler on an interval of the tick length and renders after
//! every tick. Control commands arrive over an mpsc channel; pause and stop
//! end the run with the scheduler left resumable.

use crate::render::Renderer;
use crate::scheduler::{PlaybackError, PlaybackScheduler, PlaybackState};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Pause,
    Stop,
    SetSpeed(f64),
    Seek(u64),
}

/// Why [`PlaybackDriver::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    Ended,
    Paused,
    Stopped,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("render failed: {0}")]
    Render(#[from] std::io::Error),
}

pub struct PlaybackDriver<R> {
    scheduler: PlaybackScheduler,
    renderer: R,
    commands: mpsc::Receiver<PlaybackCommand>,
}

impl<R: Renderer> PlaybackDriver<R> {
    /// Driver plus the sender used to control it
    pub fn new(scheduler: PlaybackScheduler, renderer: R) -> (Self, mpsc::Sender<PlaybackCommand>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                scheduler,
                renderer,
                commands: rx,
            },
            tx,
        )
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut PlaybackScheduler {
        &mut self.scheduler
    }

    pub fn into_parts(self) -> (PlaybackScheduler, R) {
        (self.scheduler, self.renderer)
    }

    /// Play until the session ends or a pause/stop command arrives
    pub async fn run(&mut self) -> Result<DriverExit, DriverError> {
        match self.scheduler.state() {
            PlaybackState::Playing => {}
            PlaybackState::Ended => self.scheduler.restart(),
            PlaybackState::Stopped | PlaybackState::Paused => self.scheduler.play()?,
        }
        info!(
            duration = self.scheduler.duration(),
            speed = self.scheduler.speed(),
            "playback started"
        );

        let mut interval = tokio::time::interval(Duration::from_millis(self.scheduler.tick_ms()));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.scheduler.tick()?;
                    self.renderer.render(&outcome.frame)?;
                    if outcome.ended {
                        info!(position = self.scheduler.position(), "playback ended");
                        return Ok(DriverExit::Ended);
                    }
                }
                Some(command) = self.commands.recv() => {
                    debug!(?command, "playback command");
                    match command {
                        PlaybackCommand::Pause => {
                            self.scheduler.pause()?;
                            return Ok(DriverExit::Paused);
                        }
                        PlaybackCommand::Stop => {
                            self.scheduler.stop()?;
                            return Ok(DriverExit::Stopped);
                        }
                        PlaybackCommand::SetSpeed(speed) => self.scheduler.set_speed(speed)?,
                        PlaybackCommand::Seek(target) => {
                            let frame = self.scheduler.seek(target);
                            self.renderer.render(&frame)?;
                        }
                    }
                }
            }
        }
    }
}
