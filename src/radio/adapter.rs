//! Contract of the platform radio driver. The core never talks to hardware directly.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Sighting;

/// Raw error raised by the adapter while a scan is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,
    pub device_id: Option<String>,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            device_id: None,
        }
    }

    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Delivered on the adapter's own thread, once per report.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Sighting(Sighting),
    Error(AdapterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    On,
    Off,
    Unauthorized,
    Unsupported,
}

/// Identifies one running adapter scan so it can be stopped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanHandle(pub u64);

pub type ScanCallback = Arc<dyn Fn(ScanEvent) + Send + Sync>;
pub type PowerCallback = Arc<dyn Fn(PowerState) + Send + Sync>;

/// Keeps a power-state listener registered. Dropping it unsubscribes.
pub struct PowerSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl PowerSubscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// For adapters without power-state reporting.
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }
}

impl Drop for PowerSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for PowerSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerSubscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Short-range radio driver: scanning, advertising and power reporting.
///
/// Callbacks may fire on any thread, including synchronously from inside
/// `start_scan`. Implementations must not hold internal locks while invoking them.
pub trait RadioAdapter: Send + Sync + 'static {
    /// Returns `false` when the radio is off, unsupported or permission was denied.
    fn initialize(&self) -> bool;

    fn start_scan(&self, callback: ScanCallback) -> Result<ScanHandle, AdapterError>;

    fn stop_scan(&self, handle: ScanHandle);

    /// Scan-only adapters return `false`; advertising calls then become no-ops.
    fn supports_advertising(&self) -> bool {
        true
    }

    fn start_advertise(&self, token: &str) -> bool;

    fn stop_advertise(&self);

    fn on_power_state_change(&self, callback: PowerCallback) -> PowerSubscription;

    /// Whether a scan can be restarted after a callback error on this platform.
    fn recovers_from_scan_errors(&self) -> bool {
        true
    }
}
