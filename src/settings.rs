use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::discovery::DiscoveryConfig;
use crate::gesture::GestureConfig;
use crate::identity::IdentityConfig;
use crate::layout::LayoutConfig;

/// Everything tunable about discovery, resolution, layout and gestures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RadarSettings {
    pub discovery: DiscoveryConfig,
    pub identity: IdentityConfig,
    pub layout: LayoutConfig,
    pub gesture: GestureConfig,
}

impl RadarSettings {
    /// Apply `RADAR_CYCLE_MS`, `RADAR_COOLDOWN_MS` and `RADAR_MAX_SLOTS`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = parse_var(&lookup, "RADAR_CYCLE_MS") {
            self.discovery.cycle_duration_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "RADAR_COOLDOWN_MS") {
            self.discovery.restart_cooldown_ms = ms;
        }
        if let Some(slots) = parse_var(&lookup, "RADAR_MAX_SLOTS") {
            self.layout.max_slots = slots;
        }
        self
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {key}={raw}: not a number");
            None
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<RadarSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("{} is not valid settings JSON ({err}), using defaults", path.display());
                RadarSettings::default()
            })
        } else {
            RadarSettings::default()
        };
        info!("settings loaded from {}", path.display());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn radar(&self) -> RadarSettings {
        self.read().clone()
    }

    pub fn update_layout(&self, layout: LayoutConfig) -> Result<()> {
        self.write().layout = layout;
        self.persist()
    }

    pub fn update(&self, settings: RadarSettings) -> Result<()> {
        *self.write() = settings;
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.read())?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, RadarSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RadarSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
