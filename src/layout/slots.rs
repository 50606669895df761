//! Discrete radar: the most recently seen users fill a fixed ring of slots.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::models::{DiscoveredUser, UserId};

use super::config::LayoutConfig;
use super::engine::PlacedUser;
use super::geometry::Position;

/// Number of slots the ring can hold without breaking the spacing rules.
///
/// At most `max_slots`, and only as many as keep neighbours `min_separation`
/// apart. Zero when the ring sits inside the centre buffer or past the rim.
pub fn usable_slot_count(config: &LayoutConfig) -> usize {
    let radius = config.slot_radius();
    if radius < config.center_buffer || radius > config.usable_radius() {
        return 0;
    }
    let mut count = config.max_slots;
    while count > 1 && 2.0 * radius * (PI / count as f64).sin() < config.min_separation {
        count -= 1;
    }
    count
}

/// Slot `i` sits at angle `-π/2 + i·2π/N` on the slot ring, slot 0 at the top,
/// with `N` from [`usable_slot_count`].
pub fn slot_positions(config: &LayoutConfig) -> Vec<Position> {
    let anchor = config.anchor();
    let radius = config.slot_radius();
    let count = usable_slot_count(config);
    (0..count)
        .map(|i| {
            let angle = -FRAC_PI_2 + TAU * i as f64 / count as f64;
            Position::from_polar(anchor, radius, angle)
        })
        .collect()
}

#[derive(Default)]
pub(crate) struct SlotPolicy {
    ranking: Option<Vec<UserId>>,
    cached: (Vec<PlacedUser>, Vec<UserId>),
    recomputations: u64,
}

impl SlotPolicy {
    #[cfg(test)]
    pub(crate) fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub(crate) fn place(
        &mut self,
        config: &LayoutConfig,
        users: &[&DiscoveredUser],
    ) -> (Vec<PlacedUser>, Vec<UserId>) {
        let mut ranked: Vec<&DiscoveredUser> = users.to_vec();
        ranked.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        let ranking: Vec<UserId> = ranked.iter().map(|u| u.user_id.clone()).collect();

        if self.ranking.as_ref() == Some(&ranking) {
            return self.cached.clone();
        }

        let slots = slot_positions(config);
        let placed: Vec<PlacedUser> = ranking
            .iter()
            .zip(slots.iter())
            .map(|(user_id, position)| PlacedUser {
                user_id: user_id.clone(),
                position: *position,
            })
            .collect();
        let mut hidden: Vec<UserId> = ranking.iter().skip(slots.len()).cloned().collect();
        hidden.sort();

        self.recomputations += 1;
        self.cached = (placed, hidden);
        self.ranking = Some(ranking);
        self.cached.clone()
    }
}
