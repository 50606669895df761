use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Sighting;

/// Opaque identity key handed out by the external directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Directory entry returned by a token lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    /// Broadcast token this user advertises, in the directory's canonical form.
    pub token: String,
    pub display_name: String,
    pub photo_ref: Option<String>,
    pub is_verified: bool,
}

/// A resolved, displayable nearby user. One per `user_id` at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredUser {
    pub user_id: UserId,
    pub display_name: String,
    pub photo_ref: Option<String>,
    pub is_verified: bool,
    /// Refreshed on every sighting that resolves to this user; recency rank for slot layout.
    pub last_seen_at: DateTime<Utc>,
    pub device_id: String,
    pub signal_strength: i32,
    /// Metres, only when a ranging source reported one.
    pub distance: Option<f64>,
}

impl DiscoveredUser {
    pub fn from_resolution(record: &UserRecord, sighting: &Sighting) -> Self {
        Self {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
            photo_ref: record.photo_ref.clone(),
            is_verified: record.is_verified,
            last_seen_at: sighting.observed_at,
            device_id: sighting.device_id.clone(),
            signal_strength: sighting.signal_strength,
            distance: None,
        }
    }

    /// Apply a fresh resolution in place. `last_seen_at` never moves backwards.
    pub fn refresh(&mut self, record: &UserRecord, sighting: &Sighting) {
        self.display_name = record.display_name.clone();
        self.photo_ref = record.photo_ref.clone();
        self.is_verified = record.is_verified;
        self.device_id = sighting.device_id.clone();
        self.signal_strength = sighting.signal_strength;
        if sighting.observed_at > self.last_seen_at {
            self.last_seen_at = sighting.observed_at;
        }
    }
}
