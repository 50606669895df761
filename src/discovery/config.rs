use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the scan lifecycle. Values are empirically tuned defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    /// Length of one scan cycle before the adapter is restarted
    pub cycle_duration_ms: u64,

    /// Pause between stopping and restarting the adapter scan
    pub restart_cooldown_ms: u64,

    /// A user not refreshed for this long drops off the radar
    pub staleness_window_ms: u64,

    /// Automatic re-initialization attempts after power returns
    pub max_init_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cycle_duration_ms: 30_000,
            restart_cooldown_ms: 1_000,
            staleness_window_ms: 31_000,
            max_init_retries: 3,
        }
    }
}

impl DiscoveryConfig {
    pub fn cycle_duration(&self) -> Duration {
        Duration::from_millis(self.cycle_duration_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }
}
