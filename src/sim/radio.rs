use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::Sighting;
use crate::radio::{
    AdapterError, PowerCallback, PowerState, PowerSubscription, RadioAdapter, ScanCallback,
    ScanEvent, ScanHandle,
};

#[derive(Default)]
struct RadioState {
    powered: bool,
    next_id: u64,
    scans: BTreeMap<u64, ScanCallback>,
    power_listeners: BTreeMap<u64, PowerCallback>,
    advertising: Option<String>,
    init_calls: u32,
    scan_starts: u32,
}

/// In-memory radio: tests and the demo script sightings, errors and power flips.
pub struct SimulatedRadio {
    state: Arc<Mutex<RadioState>>,
    advertises: bool,
    advertise_accepted: bool,
    recovers: bool,
    permission_denied: bool,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRadio {
    /// Powered, able to advertise, recovers from scan errors.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RadioState {
                powered: true,
                ..RadioState::default()
            })),
            advertises: true,
            advertise_accepted: true,
            recovers: true,
            permission_denied: false,
        }
    }

    pub fn powered_off(self) -> Self {
        self.lock().powered = false;
        self
    }

    pub fn scan_only(mut self) -> Self {
        self.advertises = false;
        self
    }

    pub fn refusing_advertise(mut self) -> Self {
        self.advertise_accepted = false;
        self
    }

    pub fn without_recovery(mut self) -> Self {
        self.recovers = false;
        self
    }

    /// `initialize` fails even while powered.
    pub fn denied(mut self) -> Self {
        self.permission_denied = true;
        self
    }

    /// Deliver a sighting to every running scan. Returns how many scans got it.
    pub fn emit(&self, sighting: Sighting) -> usize {
        self.broadcast(ScanEvent::Sighting(sighting))
    }

    pub fn emit_error(&self, err: AdapterError) -> usize {
        self.broadcast(ScanEvent::Error(err))
    }

    /// Flip the radio power and notify every listener, even if nothing changed.
    pub fn set_power(&self, on: bool) {
        let listeners: Vec<PowerCallback> = {
            let mut state = self.lock();
            state.powered = on;
            state.power_listeners.values().cloned().collect()
        };
        let power = if on { PowerState::On } else { PowerState::Off };
        for listener in listeners {
            listener(power);
        }
    }

    pub fn scan_callbacks(&self) -> Vec<ScanCallback> {
        self.lock().scans.values().cloned().collect()
    }

    pub fn active_scans(&self) -> usize {
        self.lock().scans.len()
    }

    pub fn scan_starts(&self) -> u32 {
        self.lock().scan_starts
    }

    pub fn init_calls(&self) -> u32 {
        self.lock().init_calls
    }

    pub fn power_listeners(&self) -> usize {
        self.lock().power_listeners.len()
    }

    pub fn advertised_token(&self) -> Option<String> {
        self.lock().advertising.clone()
    }

    fn broadcast(&self, event: ScanEvent) -> usize {
        let callbacks = self.scan_callbacks();
        for callback in &callbacks {
            callback(event.clone());
        }
        callbacks.len()
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RadioAdapter for SimulatedRadio {
    fn initialize(&self) -> bool {
        let mut state = self.lock();
        state.init_calls += 1;
        state.powered && !self.permission_denied
    }

    fn start_scan(&self, callback: ScanCallback) -> Result<ScanHandle, AdapterError> {
        let mut state = self.lock();
        if !state.powered {
            return Err(AdapterError::new("radio is powered off"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.scans.insert(id, callback);
        state.scan_starts += 1;
        Ok(ScanHandle(id))
    }

    fn stop_scan(&self, handle: ScanHandle) {
        self.lock().scans.remove(&handle.0);
    }

    fn supports_advertising(&self) -> bool {
        self.advertises
    }

    fn start_advertise(&self, token: &str) -> bool {
        let mut state = self.lock();
        if !self.advertise_accepted || !state.powered {
            return false;
        }
        state.advertising = Some(token.to_string());
        true
    }

    fn stop_advertise(&self) {
        self.lock().advertising = None;
    }

    fn on_power_state_change(&self, callback: PowerCallback) -> PowerSubscription {
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.power_listeners.insert(id, callback);
            id
        };
        let state = Arc::clone(&self.state);
        PowerSubscription::new(move || {
            let mut guard = match state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.power_listeners.remove(&id);
        })
    }

    fn recovers_from_scan_errors(&self) -> bool {
        self.recovers
    }
}
