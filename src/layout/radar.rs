//! Continuous radar: radius from distance, persisted random angle, iterative
//! collision resolution.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{DiscoveredUser, UserId};

use super::config::LayoutConfig;
use super::engine::PlacedUser;
use super::geometry::Position;

/// Drawn once per user and kept for the engine's lifetime.
#[derive(Debug, Clone, Copy)]
struct PlacementSeed {
    angle: f64,
    /// Stand-in when no ranging source reports a real distance.
    pseudo_distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Settled {
    distance_bits: u64,
    position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Push,
    Rotate,
    Both,
    Edge,
}

pub(crate) struct RadarPolicy {
    seeds: HashMap<UserId, PlacementSeed>,
    settled: HashMap<UserId, Settled>,
    rng: StdRng,
    base_seed: u64,
}

impl RadarPolicy {
    pub(crate) fn new(config: &LayoutConfig) -> Self {
        let base_seed = config.seed.unwrap_or_else(rand::random);
        Self {
            seeds: HashMap::new(),
            settled: HashMap::new(),
            rng: StdRng::seed_from_u64(base_seed),
            base_seed,
        }
    }

    pub(crate) fn angle_of(&self, user_id: &UserId) -> Option<f64> {
        self.seeds.get(user_id).map(|seed| seed.angle)
    }

    pub(crate) fn place(
        &mut self,
        config: &LayoutConfig,
        users: &[&DiscoveredUser],
    ) -> (Vec<PlacedUser>, Vec<UserId>) {
        self.assign_seeds(config, users);

        let mut order: Vec<(&DiscoveredUser, f64)> = users
            .iter()
            .map(|user| (*user, self.distance_for(user)))
            .collect();
        // Closest users claim contested space first.
        order.sort_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.user_id.cmp(&b.user_id)));

        let mut placed: Vec<PlacedUser> = Vec::with_capacity(order.len());
        let mut settled: HashMap<UserId, Settled> = HashMap::with_capacity(order.len());
        let mut pending = Vec::new();

        for (user, distance) in order {
            match self.settled.get(&user.user_id) {
                Some(prev)
                    if prev.distance_bits == distance.to_bits()
                        && is_clear(config, prev.position, &placed) =>
                {
                    placed.push(PlacedUser {
                        user_id: user.user_id.clone(),
                        position: prev.position,
                    });
                    settled.insert(user.user_id.clone(), *prev);
                }
                _ => pending.push((user, distance)),
            }
        }

        let mut hidden = Vec::new();
        for (user, distance) in pending {
            match self.resolve(config, user, distance, &placed) {
                Some(position) => {
                    placed.push(PlacedUser {
                        user_id: user.user_id.clone(),
                        position,
                    });
                    settled.insert(
                        user.user_id.clone(),
                        Settled {
                            distance_bits: distance.to_bits(),
                            position,
                        },
                    );
                }
                None => hidden.push(user.user_id.clone()),
            }
        }

        self.settled = settled;
        placed.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        hidden.sort();
        (placed, hidden)
    }

    fn assign_seeds(&mut self, config: &LayoutConfig, users: &[&DiscoveredUser]) {
        let mut fresh: Vec<&UserId> = users
            .iter()
            .map(|user| &user.user_id)
            .filter(|id| !self.seeds.contains_key(*id))
            .collect();
        // Stable draw order regardless of input order.
        fresh.sort();

        for id in fresh {
            let angle = self.rng.gen_range(0.0..TAU);
            let pseudo_distance = if config.max_distance > 0.0 {
                self.rng.gen_range(0.0..=config.max_distance)
            } else {
                0.0
            };
            self.seeds.insert(
                id.clone(),
                PlacementSeed {
                    angle,
                    pseudo_distance,
                },
            );
        }
    }

    fn distance_for(&self, user: &DiscoveredUser) -> f64 {
        user.distance
            .or_else(|| self.seeds.get(&user.user_id).map(|s| s.pseudo_distance))
            .unwrap_or(0.0)
    }

    fn resolve(
        &self,
        config: &LayoutConfig,
        user: &DiscoveredUser,
        distance: f64,
        placed: &[PlacedUser],
    ) -> Option<Position> {
        let anchor = config.anchor();
        let mut rng = StdRng::seed_from_u64(self.base_seed ^ user_hash(&user.user_id));
        let mut radius = base_radius(config, distance);
        let mut angle = self.angle_of(&user.user_id).unwrap_or(0.0);
        let push = config.min_separation * config.push_fraction;

        for attempt in 0..config.max_attempts {
            let candidate = clamp_to_usable(config, Position::from_polar(anchor, radius, angle));
            if is_clear(config, candidate, placed) {
                return Some(candidate);
            }
            match stage(attempt + 1, config.edge_fallback_after) {
                Stage::Push => radius += push,
                Stage::Rotate => angle += jitter(&mut rng, config.angle_jitter),
                Stage::Both => {
                    radius += push;
                    angle += jitter(&mut rng, config.angle_jitter);
                }
                Stage::Edge => {
                    radius = config.usable_radius();
                    angle = rng.gen_range(0.0..TAU);
                }
            }
        }
        None
    }
}

/// `(sqrt(min(1, d / max)) * 0.5 + 0.3) * R`
pub fn base_radius(config: &LayoutConfig, distance: f64) -> f64 {
    let ratio = if config.max_distance > 0.0 {
        (distance / config.max_distance).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (ratio.sqrt() * 0.5 + 0.3) * config.surface_radius()
}

fn clamp_to_usable(config: &LayoutConfig, position: Position) -> Position {
    let anchor = config.anchor();
    let usable = config.usable_radius();
    if position.distance_to(anchor) <= usable {
        position
    } else {
        Position::from_polar(anchor, usable, position.angle_from(anchor))
    }
}

fn is_clear(config: &LayoutConfig, candidate: Position, placed: &[PlacedUser]) -> bool {
    candidate.distance_to(config.anchor()) >= config.center_buffer
        && placed
            .iter()
            .all(|other| other.position.distance_to(candidate) >= config.min_separation)
}

fn stage(failures: u32, edge_fallback_after: u32) -> Stage {
    if failures >= edge_fallback_after {
        return Stage::Edge;
    }
    let band = (edge_fallback_after / 3).max(1);
    match failures / band {
        0 => Stage::Push,
        1 => Stage::Rotate,
        _ => Stage::Both,
    }
}

fn jitter(rng: &mut StdRng, max: f64) -> f64 {
    if max > 0.0 {
        rng.gen_range(-max..=max)
    } else {
        0.0
    }
}

fn user_hash(user_id: &UserId) -> u64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
