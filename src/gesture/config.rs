use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Drag-to-anchor thresholds. All distances in surface units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GestureConfig {
    pub anchor_radius: f64,
    pub bubble_radius: f64,
    pub snap_multiplier: f64,
    /// Fraction of the snap zone the displayed bubble is pulled toward the anchor
    pub magnetic_pull: f64,
    pub detection_multiplier: f64,
    pub tap_delay_ms: u64,
    /// Movement below this still counts as a tap
    pub tap_slop: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            anchor_radius: 36.0,
            bubble_radius: 20.0,
            snap_multiplier: 1.2,
            magnetic_pull: 0.8,
            detection_multiplier: 2.5,
            tap_delay_ms: 80,
            tap_slop: 8.0,
        }
    }
}

impl GestureConfig {
    fn contact_radius(&self) -> f64 {
        self.anchor_radius + self.bubble_radius
    }

    pub fn snap_zone(&self) -> f64 {
        self.contact_radius() * self.snap_multiplier
    }

    pub fn drop_threshold(&self) -> f64 {
        self.contact_radius() * self.detection_multiplier
    }

    pub fn tap_delay(&self) -> Duration {
        Duration::from_millis(self.tap_delay_ms)
    }
}
