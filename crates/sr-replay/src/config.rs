// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use sr_domain_types::Size;

pub const DEFAULT_CONTAINER: Size = Size {
    width: 1280,
    height: 720,
};
pub const DEFAULT_TICK_MS: u64 = 50;
pub const DEFAULT_CLICK_PULSE_MS: u64 = 500;

/// Replay presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Size of the area the replay is drawn into
    pub container: Size,
    /// Upper bound on the scale applied to recorded content
    pub scale: f64,
    pub speed: f64,
    pub tick_ms: u64,
    pub click_pulse_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER,
            scale: 1.0,
            speed: 1.0,
            tick_ms: DEFAULT_TICK_MS,
            click_pulse_ms: DEFAULT_CLICK_PULSE_MS,
        }
    }
}

impl ReplayConfig {
    pub fn with_container(mut self, width: u32, height: u32) -> Self {
        self.container = Size::new(width, height);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}
