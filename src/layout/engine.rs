use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{DiscoveredUser, UserId};

use super::config::{LayoutConfig, LayoutPolicy};
use super::geometry::Position;
use super::radar::RadarPolicy;
use super::slots::SlotPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedUser {
    pub user_id: UserId,
    pub position: Position,
}

/// One computed frame of the radar.
///
/// `placements` is ordered by user id for the distance policy and by slot
/// for the fixed-slot policy. `hidden` lists users that got no position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub anchor: Position,
    pub placements: Vec<PlacedUser>,
    pub hidden: Vec<UserId>,
}

impl Layout {
    pub fn empty(anchor: Position) -> Self {
        Self {
            anchor,
            placements: Vec::new(),
            hidden: Vec::new(),
        }
    }

    pub fn position_of(&self, user_id: &UserId) -> Option<Position> {
        self.placements
            .iter()
            .find(|p| &p.user_id == user_id)
            .map(|p| p.position)
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }
}

enum PolicyState {
    Radar(RadarPolicy),
    Slots(SlotPolicy),
}

impl PolicyState {
    fn for_config(config: &LayoutConfig) -> Self {
        match config.policy {
            LayoutPolicy::Distance => PolicyState::Radar(RadarPolicy::new(config)),
            LayoutPolicy::FixedSlots => PolicyState::Slots(SlotPolicy::default()),
        }
    }
}

/// Maps the discovered set to 2D positions around the anchor.
///
/// Stateful: angles drawn for a user and positions it settled into are kept
/// across calls, so recomputing with unchanged input returns the same frame.
pub struct LayoutEngine {
    config: LayoutConfig,
    state: PolicyState,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let state = PolicyState::for_config(&config);
        Self { config, state }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.config.policy
    }

    pub fn anchor(&self) -> Position {
        self.config.anchor()
    }

    pub fn compute(&mut self, users: &[DiscoveredUser]) -> Layout {
        let mut seen = HashSet::with_capacity(users.len());
        let unique: Vec<&DiscoveredUser> = users
            .iter()
            .filter(|user| seen.insert(&user.user_id))
            .collect();

        let (placements, hidden) = match &mut self.state {
            PolicyState::Radar(radar) => radar.place(&self.config, &unique),
            PolicyState::Slots(slots) => slots.place(&self.config, &unique),
        };

        Layout {
            anchor: self.config.anchor(),
            placements,
            hidden,
        }
    }

    /// Forget cached angles and settled positions.
    pub fn reset(&mut self) {
        self.state = PolicyState::for_config(&self.config);
    }

    #[cfg(test)]
    fn angle_of(&self, user_id: &UserId) -> Option<f64> {
        match &self.state {
            PolicyState::Radar(radar) => radar.angle_of(user_id),
            PolicyState::Slots(_) => None,
        }
    }

    #[cfg(test)]
    fn slot_recomputations(&self) -> u64 {
        match &self.state {
            PolicyState::Radar(_) => 0,
            PolicyState::Slots(slots) => slots.recomputations(),
        }
    }
}
