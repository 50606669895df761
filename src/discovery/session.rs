use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DiscoveryError;
use crate::models::Sighting;
use crate::radio::{
    AdapterError, PowerState, PowerSubscription, RadioAdapter, ScanCallback, ScanEvent,
    ScanHandle,
};

use super::config::DiscoveryConfig;
use super::filter::{FilterVerdict, SelfIdentity, SightingFilter};
use super::loop_worker::{scan_loop, ScanWorker};
use super::state::SessionState;

/// Receives every sighting that survives the filter.
pub type SightingSink = Arc<dyn Fn(Sighting) + Send + Sync>;

/// Adapter event tagged with the scan generation that produced it.
pub(crate) type TaggedEvent = (u64, ScanEvent);

const MIN_CYCLE: Duration = Duration::from_millis(100);

struct ActiveScan {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct PowerWatch {
    cancel: CancellationToken,
    _subscription: PowerSubscription,
}

struct SessionInner {
    state: SessionState,
    advertising: bool,
    filter: SightingFilter,
    scan: Option<ActiveScan>,
    scan_handle: Option<ScanHandle>,
    /// Bumped on every adapter `start_scan`; events from older scans are ignored.
    scan_generation: u64,
    sink: Option<SightingSink>,
    cycle_duration: Duration,
    /// Start (or resume) scanning as soon as the radio is ready again.
    resume_on_power: bool,
    power: Option<PowerWatch>,
    init_attempts: u32,
    last_error: Option<DiscoveryError>,
}

/// Scan/advertise lifecycle for one radio adapter.
///
/// Cheap to clone; clones share the same session. All dedup and state
/// mutation happens under one lock, and sightings are funnelled through a
/// single worker task per scan.
pub struct DiscoverySession<A: RadioAdapter> {
    id: Uuid,
    adapter: Arc<A>,
    config: DiscoveryConfig,
    inner: Arc<Mutex<SessionInner>>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl<A: RadioAdapter> Clone for DiscoverySession<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            state_tx: Arc::clone(&self.state_tx),
        }
    }
}

/// Non-owning handle held by background tasks that must not keep the session alive.
struct WeakSession<A: RadioAdapter> {
    id: Uuid,
    adapter: Arc<A>,
    config: DiscoveryConfig,
    inner: Weak<Mutex<SessionInner>>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl<A: RadioAdapter> WeakSession<A> {
    fn upgrade(&self) -> Option<DiscoverySession<A>> {
        Some(DiscoverySession {
            id: self.id,
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
            inner: self.inner.upgrade()?,
            state_tx: Arc::clone(&self.state_tx),
        })
    }
}

impl<A: RadioAdapter> DiscoverySession<A> {
    pub fn new(adapter: Arc<A>, identity: SelfIdentity, config: DiscoveryConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let inner = SessionInner {
            state: SessionState::Idle,
            advertising: false,
            filter: SightingFilter::new(identity),
            scan: None,
            scan_handle: None,
            scan_generation: 0,
            sink: None,
            cycle_duration: config.cycle_duration(),
            resume_on_power: false,
            power: None,
            init_attempts: 0,
            last_error: None,
        };

        Self {
            id: Uuid::new_v4(),
            adapter,
            config,
            inner: Arc::new(Mutex::new(inner)),
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_advertising(&self) -> bool {
        self.lock().advertising
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Last error surfaced to the caller (exhausted init retries, halted scan).
    pub fn take_error(&self) -> Option<DiscoveryError> {
        self.lock().last_error.take()
    }

    /// Devices admitted so far in the current cycle.
    pub fn seen_this_cycle(&self) -> usize {
        self.lock().filter.seen_count()
    }

    pub fn initialize(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.lock();
        if inner.state.is_ready() {
            return Ok(());
        }
        inner.init_attempts = 0;
        self.try_initialize(&mut inner)
    }

    pub fn start_scanning<F>(
        &self,
        on_sighting: F,
        cycle_duration: Option<Duration>,
    ) -> Result<(), DiscoveryError>
    where
        F: Fn(Sighting) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Ready | SessionState::Stopped => {}
            SessionState::Scanning | SessionState::RestartingCycle => {
                return Err(DiscoveryError::AlreadyScanning)
            }
            other => return Err(DiscoveryError::NotInitialized(other)),
        }
        let sink = self.install_sink(&mut inner, Arc::new(on_sighting), cycle_duration);
        self.begin_scanning(&mut inner, sink)
    }

    /// Like [`start_scanning`](Self::start_scanning), but when the radio is not
    /// ready yet the sink is parked and scanning starts on the next power-on.
    pub fn scan_when_ready<F>(
        &self,
        on_sighting: F,
        cycle_duration: Option<Duration>,
    ) -> Result<(), DiscoveryError>
    where
        F: Fn(Sighting) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        if inner.state.is_scanning() {
            return Err(DiscoveryError::AlreadyScanning);
        }
        let sink = self.install_sink(&mut inner, Arc::new(on_sighting), cycle_duration);
        if inner.state.is_ready() {
            return self.begin_scanning(&mut inner, sink);
        }
        info!(
            "discovery session {}: radio not ready ({}), scanning deferred",
            self.id,
            inner.state.as_str()
        );
        inner.resume_on_power = true;
        if inner.power.is_none() {
            self.ensure_power_watch(&mut inner);
        }
        Ok(())
    }

    pub fn stop_scanning(&self) {
        let mut inner = self.lock();
        inner.resume_on_power = false;
        inner.sink = None;
        self.halt_scan(&mut inner);
        if inner.state.is_ready() {
            self.transition(&mut inner, SessionState::Ready);
        }
    }

    /// Broadcast our token. Success no-op on scan-only adapters.
    pub fn start_advertising(&self) -> Result<(), DiscoveryError> {
        if !self.adapter.supports_advertising() {
            debug!("discovery session {}: adapter is scan-only", self.id);
            return Ok(());
        }
        let mut inner = self.lock();
        if !inner.state.is_ready() {
            return Err(DiscoveryError::NotInitialized(inner.state));
        }
        if inner.advertising {
            return Ok(());
        }
        let token = inner.filter.identity().broadcast_token.clone();
        if self.adapter.start_advertise(&token) {
            inner.advertising = true;
            info!("discovery session {} advertising '{}'", self.id, token);
            Ok(())
        } else {
            warn!(
                "discovery session {}: advertising '{}' refused while {}",
                self.id,
                token,
                inner.state.as_str()
            );
            Err(DiscoveryError::AdvertiseFailed)
        }
    }

    pub fn stop_advertising(&self) {
        if !self.adapter.supports_advertising() {
            return;
        }
        let mut inner = self.lock();
        if inner.advertising {
            self.adapter.stop_advertise();
            inner.advertising = false;
        }
    }

    /// Stop everything and return to `Idle`. Safe from any state, any number of times.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        inner.resume_on_power = false;
        inner.sink = None;
        self.halt_scan(&mut inner);
        if inner.advertising {
            self.adapter.stop_advertise();
            inner.advertising = false;
        }
        if let Some(power) = inner.power.take() {
            power.cancel.cancel();
        }
        inner.init_attempts = 0;
        inner.last_error = None;
        if inner.state != SessionState::Idle {
            info!("discovery session {} torn down", self.id);
        }
        self.transition(&mut inner, SessionState::Idle);
    }

    fn downgrade(&self) -> WeakSession<A> {
        WeakSession {
            id: self.id,
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
            inner: Arc::downgrade(&self.inner),
            state_tx: Arc::clone(&self.state_tx),
        }
    }

        fn lock(&self) -> MutexGuard<'_, SessionInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        if inner.state == next {
            return;
        }
        debug!(
            "discovery session {}: {} -> {}",
            self.id,
            inner.state.as_str(),
            next.as_str()
        );
        inner.state = next;
        self.state_tx.send_replace(next);
    }

    fn install_sink(
        &self,
        inner: &mut SessionInner,
        sink: SightingSink,
        cycle_duration: Option<Duration>,
    ) -> SightingSink {
        inner.cycle_duration = cycle_duration
            .unwrap_or_else(|| self.config.cycle_duration())
            .max(MIN_CYCLE);
        inner.sink = Some(Arc::clone(&sink));
        inner.last_error = None;
        sink
    }

    fn try_initialize(&self, inner: &mut SessionInner) -> Result<(), DiscoveryError> {
        self.transition(inner, SessionState::Initializing);
        let ready = self.adapter.initialize();
        self.ensure_power_watch(inner);

        if ready {
            inner.init_attempts = 0;
            inner.last_error = None;
            self.transition(inner, SessionState::Ready);
            info!("discovery session {} ready", self.id);
            return Ok(());
        }

        self.transition(inner, SessionState::Idle);
        warn!(
            "discovery session {}: radio unavailable (attempt {}), waiting for power-on",
            self.id, inner.init_attempts
        );
        Err(DiscoveryError::AdapterUnavailable(
            "radio is powered off or permission was denied".into(),
        ))
    }

    /// Subscribe to adapter power changes once per session lifetime.
    fn ensure_power_watch(&self, inner: &mut SessionInner) {
        if inner.power.is_some() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                "discovery session {}: no runtime, power-state recovery disabled",
                self.id
            );
            return;
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self
            .adapter
            .on_power_state_change(Arc::new(move |power| {
                let _ = tx.send(power);
            }));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let session = self.downgrade();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(power) => match session.upgrade() {
                            Some(live) => live.on_power_state(power, &token),
                            None => break,
                        },
                        None => break,
                    },
                }
            }
        });

        inner.power = Some(PowerWatch {
            cancel,
            _subscription: subscription,
        });
    }

    fn on_power_state(&self, power: PowerState, watch: &CancellationToken) {
        let mut inner = self.lock();
        if watch.is_cancelled() {
            return;
        }

        if power != PowerState::On {
            if !inner.state.is_ready() {
                return;
            }
            warn!(
                "discovery session {}: radio reported {:?} while {}",
                self.id,
                power,
                inner.state.as_str()
            );
            if inner.state.is_scanning() {
                inner.resume_on_power = true;
            }
            self.halt_scan(&mut inner);
            inner.advertising = false;
            self.transition(&mut inner, SessionState::Idle);
            return;
        }

        if inner.state.is_ready() {
            return;
        }
        let max_attempts = self.config.max_init_retries;
        if inner.init_attempts >= max_attempts {
            warn!(
                "discovery session {}: power on ignored, {} initialization retries exhausted",
                self.id, max_attempts
            );
            return;
        }
        inner.init_attempts += 1;
        info!(
            "discovery session {}: power on, initialization retry {}/{}",
            self.id, inner.init_attempts, max_attempts
        );

        match self.try_initialize(&mut inner) {
            Ok(()) => {
                if !inner.resume_on_power {
                    return;
                }
                inner.resume_on_power = false;
                if let Some(sink) = inner.sink.clone() {
                    if let Err(err) = self.begin_scanning(&mut inner, sink) {
                        error!("discovery session {}: resume failed: {err}", self.id);
                        inner.last_error = Some(err);
                    }
                }
            }
            Err(err) => {
                if inner.init_attempts >= max_attempts {
                    error!(
                        "discovery session {}: giving up after {} retries: {err}",
                        self.id, inner.init_attempts
                    );
                    inner.last_error = Some(err);
                }
            }
        }
    }

    fn begin_scanning(
        &self,
        inner: &mut SessionInner,
        sink: SightingSink,
    ) -> Result<(), DiscoveryError> {
        let runtime = Handle::try_current().map_err(|_| DiscoveryError::NoRuntime)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        inner.filter.reset_cycle();
        let handle = self.open_scan(inner, &events_tx)?;
        inner.scan_handle = Some(handle);

        let cancel = CancellationToken::new();
        let worker = ScanWorker {
            session: self.clone(),
            events: events_rx,
            events_tx,
            sink,
            cycle_duration: inner.cycle_duration,
            cooldown: self.config.restart_cooldown(),
            cancel: cancel.clone(),
        };
        let task = runtime.spawn(scan_loop(worker));

        inner.scan = Some(ActiveScan { cancel, task });
        self.transition(inner, SessionState::Scanning);
        info!(
            "discovery session {} scanning (cycle {:?})",
            self.id, inner.cycle_duration
        );
        Ok(())
    }

    fn open_scan(
        &self,
        inner: &mut SessionInner,
        events_tx: &mpsc::UnboundedSender<TaggedEvent>,
    ) -> Result<ScanHandle, DiscoveryError> {
        inner.scan_generation += 1;
        let generation = inner.scan_generation;
        let tx = events_tx.clone();
        let callback: ScanCallback = Arc::new(move |event| {
            let _ = tx.send((generation, event));
        });

        self.adapter.start_scan(callback).map_err(|err| {
            error!(
                "discovery session {}: adapter refused scan while {}: {err}",
                self.id,
                inner.state.as_str()
            );
            DiscoveryError::ScanStartFailed(err.message)
        })
    }

    fn halt_scan(&self, inner: &mut SessionInner) {
        if let Some(scan) = inner.scan.take() {
            scan.cancel.cancel();
            scan.task.abort();
        }
        if let Some(handle) = inner.scan_handle.take() {
            self.adapter.stop_scan(handle);
        }
        inner.filter.reset_cycle();
    }

    /// Run a sighting through the filter. `None` when it came from a stale scan.
    pub(crate) fn admit(&self, generation: u64, sighting: &Sighting) -> Option<FilterVerdict> {
        let mut inner = self.lock();
        if generation != inner.scan_generation || inner.state != SessionState::Scanning {
            return None;
        }
        Some(inner.filter.check(sighting))
    }

    /// Returns whether the worker should keep running.
    pub(crate) fn recover_from_scan_error(
        &self,
        generation: u64,
        err: &AdapterError,
        events_tx: &mpsc::UnboundedSender<TaggedEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        if generation != inner.scan_generation {
            return true;
        }

        if let Some(handle) = inner.scan_handle.take() {
            self.adapter.stop_scan(handle);
        }

        if self.adapter.recovers_from_scan_errors() {
            match self.open_scan(&mut inner, events_tx) {
                Ok(handle) => {
                    inner.scan_handle = Some(handle);
                    return true;
                }
                Err(restart_err) => inner.last_error = Some(restart_err),
            }
        } else {
            inner.last_error = Some(DiscoveryError::ScanCallback {
                device_id: err.device_id.clone(),
                message: err.message.clone(),
            });
        }

        inner.scan = None;
        inner.filter.reset_cycle();
        self.transition(&mut inner, SessionState::Stopped);
        false
    }

    /// End of a cycle: stop the adapter scan and forget this cycle's devices.
    pub(crate) fn finish_cycle(&self, cancel: &CancellationToken) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        if let Some(handle) = inner.scan_handle.take() {
            self.adapter.stop_scan(handle);
        }
        inner.filter.reset_cycle();
        self.transition(&mut inner, SessionState::RestartingCycle);
        true
    }

    pub(crate) fn restart_cycle(
        &self,
        cancel: &CancellationToken,
        events_tx: &mpsc::UnboundedSender<TaggedEvent>,
    ) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        match self.open_scan(&mut inner, events_tx) {
            Ok(handle) => {
                inner.scan_handle = Some(handle);
                self.transition(&mut inner, SessionState::Scanning);
                true
            }
            Err(err) => {
                inner.last_error = Some(err);
                inner.scan = None;
                self.transition(&mut inner, SessionState::Stopped);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::sim::SimulatedRadio;

    fn collector() -> (Arc<StdMutex<Vec<Sighting>>>, impl Fn(Sighting) + Send + Sync + 'static) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        (seen, move |s: Sighting| sink_seen.lock().unwrap().push(s))
    }

    fn session(radio: &Arc<SimulatedRadio>) -> DiscoverySession<SimulatedRadio> {
        DiscoverySession::new(
            Arc::clone(radio),
            SelfIdentity::new("maya").with_device_id("SELF-01"),
            DiscoveryConfig::default(),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_is_idempotent() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        s.initialize().unwrap();
        s.initialize().unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(radio.init_calls(), 1);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn scanning_requires_initialization() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (_seen, sink) = collector();
        assert_eq!(
            s.start_scanning(sink, None),
            Err(DiscoveryError::NotInitialized(SessionState::Idle))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_and_self_reports_are_filtered_within_a_cycle() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, None).unwrap();

        radio.emit(Sighting::new("A", "alice", -40));
        radio.emit(Sighting::new("A", "alice", -42));
        radio.emit(Sighting::new("SELF-01", "maya", -10));
        radio.emit(Sighting::new("B", "bob", -70));
        settle().await;

        let ids: Vec<String> = seen.lock().unwrap().iter().map(|s| s.device_id.clone()).collect();
        assert_eq!(ids, vec!["A".to_string(), "B".to_string()]);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_restart_resurfaces_known_devices() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, Some(Duration::from_secs(30))).unwrap();

        radio.emit(Sighting::new("A", "alice", -40));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(30_200)).await;
        assert_eq!(s.state(), SessionState::RestartingCycle);
        assert_eq!(radio.active_scans(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(s.state(), SessionState::Scanning);
        assert_eq!(radio.scan_starts(), 2);

        radio.emit(Sighting::new("A", "alice", -41));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 2);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_scanning_cancels_pending_restart() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (_seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, Some(Duration::from_secs(1))).unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(s.state(), SessionState::RestartingCycle);
        s.stop_scanning();
        s.stop_scanning();
        assert_eq!(s.state(), SessionState::Ready);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(radio.scan_starts(), 1);
        assert_eq!(radio.active_scans(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_scan_error_restarts_the_scan() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, None).unwrap();

        radio.emit(Sighting::new("A", "alice", -40));
        radio.emit_error(AdapterError::new("gatt 133").for_device("A"));
        settle().await;

        assert_eq!(s.state(), SessionState::Scanning);
        assert_eq!(radio.scan_starts(), 2);
        assert_eq!(radio.active_scans(), 1);

        // Same cycle: A is still deduplicated after the restart.
        radio.emit(Sighting::new("A", "alice", -40));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_scan_error_halts_in_stopped() {
        let radio = Arc::new(SimulatedRadio::new().without_recovery());
        let s = session(&radio);
        let (_seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, None).unwrap();

        radio.emit_error(AdapterError::new("scan failed"));
        settle().await;

        assert_eq!(s.state(), SessionState::Stopped);
        assert!(matches!(
            s.take_error(),
            Some(DiscoveryError::ScanCallback { .. })
        ));
        assert_eq!(radio.active_scans(), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(radio.scan_starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn powered_off_radio_retries_on_power_on() {
        let radio = Arc::new(SimulatedRadio::new().powered_off());
        let s = session(&radio);
        assert!(matches!(
            s.initialize(),
            Err(DiscoveryError::AdapterUnavailable(_))
        ));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(radio.power_listeners(), 1);

        radio.set_power(true);
        settle().await;
        assert_eq!(s.state(), SessionState::Ready);
        s.teardown();
        assert_eq!(radio.power_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded_and_surfaced() {
        let radio = Arc::new(SimulatedRadio::new().powered_off().denied());
        let s = session(&radio);
        assert!(s.initialize().is_err());

        for _ in 0..5 {
            radio.set_power(true);
            settle().await;
        }
        assert_eq!(radio.init_calls(), 4);
        assert!(matches!(
            s.take_error(),
            Some(DiscoveryError::AdapterUnavailable(_))
        ));
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn power_loss_pauses_and_power_on_resumes_scanning() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, None).unwrap();

        radio.set_power(false);
        settle().await;
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(radio.active_scans(), 0);

        radio.set_power(true);
        settle().await;
        assert_eq!(s.state(), SessionState::Scanning);

        radio.emit(Sighting::new("C", "carol", -55));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn advertising_is_a_noop_on_scan_only_adapters() {
        let radio = Arc::new(SimulatedRadio::new().scan_only());
        let s = session(&radio);
        s.initialize().unwrap();
        assert_eq!(s.start_advertising(), Ok(()));
        assert!(!s.is_advertising());
        assert_eq!(radio.advertised_token(), None);
        s.stop_advertising();
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn advertising_failure_does_not_affect_scanning() {
        let radio = Arc::new(SimulatedRadio::new().refusing_advertise());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        assert_eq!(s.start_advertising(), Err(DiscoveryError::AdvertiseFailed));
        s.start_scanning(sink, None).unwrap();
        radio.emit(Sighting::new("A", "alice", -40));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        s.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_from_any_state_is_repeatable() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        s.teardown();

        let (_seen, sink) = collector();
        s.initialize().unwrap();
        s.start_advertising().unwrap();
        s.start_scanning(sink, None).unwrap();
        assert_eq!(radio.advertised_token().as_deref(), Some("maya"));

        s.teardown();
        s.teardown();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.is_advertising());
        assert_eq!(radio.advertised_token(), None);
        assert_eq!(radio.active_scans(), 0);
        assert_eq!(radio.power_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_callbacks_after_stop_are_dropped() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        let (seen, sink) = collector();
        s.initialize().unwrap();
        s.start_scanning(sink, None).unwrap();

        let stale = radio.scan_callbacks();
        s.stop_scanning();
        for callback in stale {
            callback(ScanEvent::Sighting(Sighting::new("Z", "zed", -60)));
        }
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_releases_the_power_listener() {
        let radio = Arc::new(SimulatedRadio::new());
        let s = session(&radio);
        s.initialize().unwrap();
        settle().await;
        assert_eq!(radio.power_listeners(), 1);

        drop(s);
        settle().await;
        assert_eq!(radio.power_listeners(), 0);

        // No listener left to wake the watcher.
        radio.set_power(false);
        radio.set_power(true);
        settle().await;
        assert_eq!(radio.init_calls(), 1);
    }
}
