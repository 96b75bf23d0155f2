// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Replay side of Session Replay
//!
//! A [`Timeline`] is loaded from any [`sr_domain_types::SessionSource`] or an
//! export file. [`ReconstructionEngine`] rebuilds the surface at an instant,
//! [`PlaybackScheduler`] walks it forward in ticks and [`PlaybackDriver`]
//! runs that walk on a tokio interval, handing frames to a [`Renderer`].

pub mod config;
pub mod driver;
pub mod engine;
pub mod render;
pub mod sanitize;
pub mod scheduler;
pub mod timeline;
pub mod transform;

pub use config::ReplayConfig;
pub use driver::{DriverError, DriverExit, PlaybackCommand, PlaybackDriver};
pub use engine::{CanvasLayer, ClickPulse, CursorOverlay, DomView, Frame, ReconstructionEngine};
pub use render::{describe, Renderer, TextRenderer};
pub use sanitize::{sanitize, SanitizeReport};
pub use scheduler::{PlaybackError, PlaybackScheduler, PlaybackState, TickOutcome};
pub use timeline::{SessionExport, Timeline, TimelineError};
pub use transform::ViewportTransform;
