use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{DiscoveredUser, Sighting, UserId, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    Added,
    Refreshed,
}

/// Live set of resolved nearby users, at most one entry per user id.
#[derive(Debug, Default)]
pub struct Roster {
    users: HashMap<UserId, DiscoveredUser>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, record: &UserRecord, sighting: &Sighting) -> RosterChange {
        match self.users.get_mut(&record.user_id) {
            Some(existing) => {
                existing.refresh(record, sighting);
                RosterChange::Refreshed
            }
            None => {
                self.users.insert(
                    record.user_id.clone(),
                    DiscoveredUser::from_resolution(record, sighting),
                );
                RosterChange::Added
            }
        }
    }

    /// Attach a ranged distance in metres. Returns false for unknown users.
    pub fn record_range(&mut self, user_id: &UserId, metres: f64) -> bool {
        match self.users.get_mut(user_id) {
            Some(user) if metres.is_finite() && metres >= 0.0 => {
                user.distance = Some(metres);
                true
            }
            _ => false,
        }
    }

    /// Drop users last seen more than `window` before `now`.
    pub fn prune_stale(&mut self, now: DateTime<Utc>, window: Duration) -> Vec<UserId> {
        let cutoff = now - window;
        let mut removed: Vec<UserId> = self
            .users
            .values()
            .filter(|user| user.last_seen_at < cutoff)
            .map(|user| user.user_id.clone())
            .collect();
        removed.sort();
        for id in &removed {
            self.users.remove(id);
        }
        removed
    }

    /// Snapshot ordered by user id.
    pub fn visible(&self) -> Vec<DiscoveredUser> {
        let mut users: Vec<DiscoveredUser> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn get(&self, user_id: &UserId) -> Option<&DiscoveredUser> {
        self.users.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
