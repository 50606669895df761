use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One radio detection event as reported by the adapter.
///
/// `signal_strength` follows the adapter's own sign convention. The core only
/// ever carries it along; it is never mapped to a distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    pub device_id: String,
    pub advertised_name: String,
    pub signal_strength: i32,
    pub observed_at: DateTime<Utc>,
}

impl Sighting {
    pub fn new(
        device_id: impl Into<String>,
        advertised_name: impl Into<String>,
        signal_strength: i32,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            advertised_name: advertised_name.into(),
            signal_strength,
            observed_at: Utc::now(),
        }
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}
