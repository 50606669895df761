use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityConfig {
    /// Canonical suffix the directory stores tokens with, e.g. `@app`. Empty disables it.
    pub token_suffix: String,

    /// Upper bound on concurrent directory queries
    pub max_in_flight_resolutions: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_suffix: String::new(),
            max_in_flight_resolutions: 4,
        }
    }
}
