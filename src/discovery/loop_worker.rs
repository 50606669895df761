use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::radio::{RadioAdapter, ScanEvent};

use super::filter::FilterVerdict;
use super::session::{DiscoverySession, SightingSink, TaggedEvent};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything the scan worker owns for the lifetime of one `start_scanning`.
pub(crate) struct ScanWorker<A: RadioAdapter> {
    pub(crate) session: DiscoverySession<A>,
    pub(crate) events: mpsc::UnboundedReceiver<TaggedEvent>,
    pub(crate) events_tx: mpsc::UnboundedSender<TaggedEvent>,
    pub(crate) sink: SightingSink,
    pub(crate) cycle_duration: Duration,
    pub(crate) cooldown: Duration,
    pub(crate) cancel: CancellationToken,
}

/// Single consumer of adapter events. Runs cycles until cancelled or halted.
pub(crate) async fn scan_loop<A: RadioAdapter>(mut worker: ScanWorker<A>) {
    let session_id = worker.session.id();
    let mut cycle: u64 = 1;
    log_info!(
        "scan loop started for session {} (cycle {:?}, cooldown {:?})",
        session_id,
        worker.cycle_duration,
        worker.cooldown
    );

    loop {
        let cycle_end = time::sleep(worker.cycle_duration);
        tokio::pin!(cycle_end);

        loop {
            tokio::select! {
                biased;
                _ = worker.cancel.cancelled() => {
                    log_info!("scan loop for session {} shutting down", session_id);
                    return;
                }
                _ = &mut cycle_end => break,
                next = worker.events.recv() => {
                    let Some((generation, event)) = next else {
                        return;
                    };
                    if !worker.handle_event(generation, event) {
                        return;
                    }
                }
            }
        }

        if !worker.session.finish_cycle(&worker.cancel) {
            return;
        }
        log_debug!(
            "session {} cycle {} elapsed, restarting in {:?}",
            session_id,
            cycle,
            worker.cooldown
        );

        tokio::select! {
            biased;
            _ = worker.cancel.cancelled() => {
                log_info!("scan loop for session {} cancelled during cooldown", session_id);
                return;
            }
            _ = time::sleep(worker.cooldown) => {}
        }

        if !worker
            .session
            .restart_cycle(&worker.cancel, &worker.events_tx)
        {
            if !worker.cancel.is_cancelled() {
                log_error!("session {} could not restart scanning after cycle {}", session_id, cycle);
            }
            return;
        }
        cycle += 1;
    }
}

impl<A: RadioAdapter> ScanWorker<A> {
    /// Returns whether the loop should keep going.
    fn handle_event(&self, generation: u64, event: ScanEvent) -> bool {
        match event {
            ScanEvent::Sighting(sighting) => {
                match self.session.admit(generation, &sighting) {
                    Some(FilterVerdict::Accepted) => {
                        if !self.cancel.is_cancelled() {
                            (self.sink)(sighting);
                        }
                    }
                    Some(FilterVerdict::Duplicate) => {
                        log_debug!("duplicate report from {} dropped", sighting.device_id);
                    }
                    Some(FilterVerdict::OwnBroadcast) => {
                        log_debug!("own broadcast {} dropped", sighting.device_id);
                    }
                    None => {
                        log_debug!("late report from {} after scan restart", sighting.device_id);
                    }
                }
                true
            }
            ScanEvent::Error(err) => {
                log_warn!(
                    "scan error in session {} (state {}, device {}): {}",
                    self.session.id(),
                    self.session.state().as_str(),
                    err.device_id.as_deref().unwrap_or("-"),
                    err
                );
                let keep_going = self.session.recover_from_scan_error(
                    generation,
                    &err,
                    &self.events_tx,
                    &self.cancel,
                );
                if !keep_going && !self.cancel.is_cancelled() {
                    log_error!(
                        "session {} halted scanning after adapter error: {}",
                        self.session.id(),
                        err
                    );
                }
                keep_going
            }
        }
    }
}
