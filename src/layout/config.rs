use serde::{Deserialize, Serialize};

use super::geometry::Position;

/// Which placement policy the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LayoutPolicy {
    /// Continuous radar: radius from distance, cached random angle, collision avoidance.
    #[default]
    Distance,
    /// Discrete radar: recency-ranked users in fixed slots around a ring.
    FixedSlots,
}

/// Surface geometry and placement tuning. Collision numbers are empirical defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub policy: LayoutPolicy,

    /// Side of the square surface; the radar circle is inscribed in it
    pub surface_diameter: f64,
    pub bubble_diameter: f64,

    /// Minimum centre-to-centre distance between two bubbles
    pub min_separation: f64,

    /// No bubble centre closer than this to the anchor
    pub center_buffer: f64,

    /// Gap kept between a bubble and the surface rim
    pub edge_margin: f64,

    /// Distance (metres) mapped to the outer ring
    pub max_distance: f64,

    pub max_slots: usize,

    /// Slot ring radius as a fraction of the surface diameter
    pub slot_radius_factor: f64,

    /// Radial push per collision step, as a fraction of `min_separation`
    pub push_fraction: f64,

    /// Max angle perturbation per collision step, radians
    pub angle_jitter: f64,

    /// Failed attempts before falling back to a random edge position
    pub edge_fallback_after: u32,

    pub max_attempts: u32,

    /// Seed for first-time angle draws; random when unset
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let bubble_diameter = 40.0;
        Self {
            policy: LayoutPolicy::Distance,
            surface_diameter: 360.0,
            bubble_diameter,
            min_separation: bubble_diameter * 1.8,
            center_buffer: 60.0,
            edge_margin: 6.0,
            max_distance: 10.0,
            max_slots: 10,
            slot_radius_factor: 0.35,
            push_fraction: 0.25,
            angle_jitter: 0.25,
            edge_fallback_after: 30,
            max_attempts: 40,
            seed: None,
        }
    }
}

impl LayoutConfig {
    pub fn surface_radius(&self) -> f64 {
        self.surface_diameter / 2.0
    }

    pub fn bubble_radius(&self) -> f64 {
        self.bubble_diameter / 2.0
    }

    /// The current user's fixed position: the surface centre.
    pub fn anchor(&self) -> Position {
        Position::new(self.surface_radius(), self.surface_radius())
    }

    /// Largest radius a bubble centre may sit at.
    pub fn usable_radius(&self) -> f64 {
        (self.surface_radius() - self.bubble_radius() - self.edge_margin).max(0.0)
    }

    pub fn slot_radius(&self) -> f64 {
        self.slot_radius_factor * self.surface_diameter
    }
}
