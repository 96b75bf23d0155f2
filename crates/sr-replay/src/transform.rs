// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use sr_domain_types::Size;

/// Maps recorded viewport coordinates into the replay container
///
/// Content is scaled by `min(container / recorded, requested)` on both axes
/// and centred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewportTransform {
    pub fn fit(recorded: Size, container: Size, requested_scale: f64) -> Self {
        let requested = if requested_scale.is_finite() && requested_scale > 0.0 {
            requested_scale
        } else {
            1.0
        };
        if recorded.width == 0 || recorded.height == 0 {
            return Self {
                scale: requested,
                ..Self::default()
            };
        }

        let scale_x = f64::from(container.width) / f64::from(recorded.width);
        let scale_y = f64::from(container.height) / f64::from(recorded.height);
        let scale = scale_x.min(scale_y).min(requested);

        Self {
            scale,
            offset_x: (f64::from(container.width) - f64::from(recorded.width) * scale) / 2.0,
            offset_y: (f64::from(container.height) - f64::from(recorded.height) * scale) / 2.0,
        }
    }

    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}
