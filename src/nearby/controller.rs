use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::conversation::{ConversationInitiator, ConversationRequest};
use crate::discovery::{DiscoverySession, SelfIdentity};
use crate::error::{DiscoveryError, ResolveError};
use crate::gesture::{GestureOutcome, SelectionGesture};
use crate::identity::{normalize_token, Directory, IdentityResolver};
use crate::layout::{Layout, LayoutEngine, Position};
use crate::models::{DiscoveredUser, Sighting, UserId, UserRecord};
use crate::radio::RadioAdapter;
use crate::settings::RadarSettings;

use super::roster::{Roster, RosterChange};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

struct Shared {
    roster: Roster,
    engine: LayoutEngine,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// State the resolution tasks and the sweeper need, detached from the radio type.
struct Pipeline<D: Directory> {
    resolver: Arc<IdentityResolver<D>>,
    shared: Arc<Mutex<Shared>>,
    layout_tx: Arc<watch::Sender<Layout>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<D: Directory> Clone for Pipeline<D> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            shared: Arc::clone(&self.shared),
            layout_tx: Arc::clone(&self.layout_tx),
            permits: Arc::clone(&self.permits),
            cancel: self.cancel.clone(),
        }
    }
}

/// Wires discovery, resolution and layout into one nearby-users surface.
pub struct NearbyController<A: RadioAdapter, D: Directory> {
    session: DiscoverySession<A>,
    resolver: Arc<IdentityResolver<D>>,
    settings: RadarSettings,
    shared: Arc<Mutex<Shared>>,
    layout_tx: Arc<watch::Sender<Layout>>,
    permits: Arc<Semaphore>,
    conversations: Arc<dyn ConversationInitiator>,
    running: Mutex<Option<Running>>,
}

impl<A: RadioAdapter, D: Directory> NearbyController<A, D> {
    pub fn new(
        adapter: Arc<A>,
        directory: Arc<D>,
        identity: SelfIdentity,
        settings: RadarSettings,
        conversations: Arc<dyn ConversationInitiator>,
    ) -> Self {
        let suffix = settings.identity.token_suffix.clone();
        let broadcast = normalize_token(&identity.broadcast_token, &suffix)
            .unwrap_or_else(|| identity.broadcast_token.clone());
        let identity = identity.with_broadcast_token(broadcast);

        let session = DiscoverySession::new(adapter, identity, settings.discovery.clone());
        let resolver = Arc::new(IdentityResolver::new(directory, settings.identity.clone()));
        let engine = LayoutEngine::new(settings.layout.clone());
        let (layout_tx, _) = watch::channel(Layout::empty(engine.anchor()));
        let permits = Arc::new(Semaphore::new(
            settings.identity.max_in_flight_resolutions.max(1),
        ));

        Self {
            session,
            resolver,
            settings,
            shared: Arc::new(Mutex::new(Shared {
                roster: Roster::new(),
                engine,
            })),
            layout_tx: Arc::new(layout_tx),
            permits,
            conversations,
            running: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &DiscoverySession<A> {
        &self.session
    }

    pub fn resolver(&self) -> &IdentityResolver<D> {
        &self.resolver
    }

    pub fn settings(&self) -> &RadarSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Bring the radio up and start feeding the radar. Idempotent.
    ///
    /// A radio that is not ready yet is not an error: scanning starts on the
    /// next power-on.
    pub fn start(&self) -> Result<(), DiscoveryError> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| DiscoveryError::NoRuntime)?;

        match self.session.initialize() {
            Ok(()) => {
                if let Err(err) = self.session.start_advertising() {
                    warn!("nearby: advertising unavailable ({err}), continuing scan-only");
                }
            }
            Err(err) => warn!("nearby: {err}; scanning deferred until the radio is ready"),
        }

        let (tx, rx) = mpsc::unbounded_channel::<Sighting>();
        self.session.scan_when_ready(
            move |sighting| {
                let _ = tx.send(sighting);
            },
            None,
        )?;

        let cancel = CancellationToken::new();
        let pipeline = self.pipeline(cancel.clone());
        let window = self.settings.discovery.staleness_window();
        let tasks = vec![
            runtime.spawn(resolution_pump(pipeline.clone(), rx)),
            runtime.spawn(staleness_sweeper(pipeline, window)),
        ];
        info!("nearby: started (session {})", self.session.id());

        *running = Some(Running { cancel, tasks });
        Ok(())
    }

    pub fn subscribe_layout(&self) -> watch::Receiver<Layout> {
        self.layout_tx.subscribe()
    }

    pub fn current_layout(&self) -> Layout {
        self.layout_tx.borrow().clone()
    }

    pub fn visible_users(&self) -> Vec<DiscoveredUser> {
        lock(&self.shared).roster.visible()
    }

    pub fn position_of(&self, user_id: &UserId) -> Option<Position> {
        self.layout_tx.borrow().position_of(user_id)
    }

    /// Feed a ranged distance from a host that can measure one.
    pub fn record_range(&self, user_id: &UserId, metres: f64) -> bool {
        let mut shared = lock(&self.shared);
        let known = shared.roster.record_range(user_id, metres);
        if known {
            republish(&mut shared, &self.layout_tx);
        }
        known
    }

    /// Press on a placed bubble. `None` when the user has no position.
    pub fn begin_gesture(&self, user_id: &UserId, at: Instant) -> Option<SelectionGesture> {
        let position = self.position_of(user_id)?;
        let anchor = self.layout_tx.borrow().anchor;
        let mut gesture = SelectionGesture::new(self.settings.gesture.clone(), anchor);
        gesture.press(user_id.clone(), position, at);
        Some(gesture)
    }

    /// Hand a `Selected` outcome to the conversation initiator.
    /// Returns whether a conversation was requested.
    pub fn complete_selection(
        &self,
        outcome: &GestureOutcome,
        first_message: Option<String>,
    ) -> bool {
        match outcome {
            GestureOutcome::Selected(user_id) => {
                info!("nearby: starting conversation with {user_id}");
                self.conversations.initiate(ConversationRequest {
                    user_id: user_id.clone(),
                    first_message,
                });
                true
            }
            GestureOutcome::Tapped(_) | GestureOutcome::Cancelled(_) => false,
        }
    }

    /// Stop scanning and advertising, drop every user and wait for the
    /// background tasks. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let running = lock(&self.running).take();
        if let Some(running) = &running {
            running.cancel.cancel();
        }

        self.session.teardown();
        self.resolver.clear_cache();
        {
            let mut shared = lock(&self.shared);
            shared.roster.clear();
            shared.engine.reset();
            let empty = Layout::empty(shared.engine.anchor());
            self.layout_tx.send_replace(empty);
        }

        if let Some(running) = running {
            for task in running.tasks {
                if let Err(err) = task.await {
                    warn!("nearby: background task ended abnormally: {err}");
                }
            }
            info!("nearby: torn down");
        }
    }

    fn pipeline(&self, cancel: CancellationToken) -> Pipeline<D> {
        Pipeline {
            resolver: Arc::clone(&self.resolver),
            shared: Arc::clone(&self.shared),
            layout_tx: Arc::clone(&self.layout_tx),
            permits: Arc::clone(&self.permits),
            cancel,
        }
    }
}

impl<D: Directory> Pipeline<D> {
    async fn resolve_one(self, sighting: Sighting) {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            outcome = self.resolve_bounded(&sighting) => outcome,
        };

        match outcome {
            Some(Ok(record)) => self.apply(&record, &sighting),
            Some(Err(ResolveError::NotFound { token })) => {
                log_debug!(
                    "nearby: '{}' from {} is nobody we know",
                    token,
                    sighting.device_id
                );
            }
            Some(Err(err)) => {
                log_warn!("nearby: resolving {} failed: {}", sighting.device_id, err);
            }
            None => {}
        }
    }

    async fn resolve_bounded(
        &self,
        sighting: &Sighting,
    ) -> Option<Result<UserRecord, ResolveError>> {
        let _permit = self.permits.acquire().await.ok()?;
        Some(self.resolver.resolve(sighting).await)
    }

    fn apply(&self, record: &UserRecord, sighting: &Sighting) {
        let mut shared = lock(&self.shared);
        // Late results after teardown are discarded.
        if self.cancel.is_cancelled() {
            log_debug!("nearby: dropping late resolution for {}", record.user_id);
            return;
        }
        if shared.roster.upsert(record, sighting) == RosterChange::Added {
            log_info!(
                "nearby: {} ({}) is nearby via {}",
                record.display_name,
                record.user_id,
                sighting.device_id
            );
        }
        republish(&mut shared, &self.layout_tx);
    }

    fn sweep(&self, window: Duration) {
        let mut shared = lock(&self.shared);
        if self.cancel.is_cancelled() {
            return;
        }
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(1));
        let removed = shared.roster.prune_stale(Utc::now(), window);
        if !removed.is_empty() {
            log_info!("nearby: {} user(s) went stale: {:?}", removed.len(), removed);
            republish(&mut shared, &self.layout_tx);
        }
    }
}

async fn resolution_pump<D: Directory>(
    pipeline: Pipeline<D>,
    mut sightings: mpsc::UnboundedReceiver<Sighting>,
) {
    loop {
        tokio::select! {
            biased;
            _ = pipeline.cancel.cancelled() => break,
            next = sightings.recv() => match next {
                Some(sighting) => {
                    // Permits are acquired inside the task.
                    tokio::spawn(pipeline.clone().resolve_one(sighting));
                }
                None => break,
            },
        }
    }
    log_debug!("nearby: resolution pump stopped");
}

async fn staleness_sweeper<D: Directory>(pipeline: Pipeline<D>, window: Duration) {
    let mut ticker = tokio::time::interval((window / 4).max(MIN_SWEEP_PERIOD));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = pipeline.cancel.cancelled() => break,
            _ = ticker.tick() => pipeline.sweep(window),
        }
    }
}

fn republish(shared: &mut Shared, layout_tx: &watch::Sender<Layout>) {
    let users = shared.roster.visible();
    let layout = shared.engine.compute(&users);
    layout_tx.send_if_modified(|current| {
        if *current == layout {
            false
        } else {
            *current = layout;
            true
        }
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
