//! Poll reconciler: the fetch / merge / reschedule loop over `GET /queue`.
//!
//! ## Cycle
//!
//! ```text
//! Idle --start--> Fetching --response--> Merging --> Scheduled --interval--> Fetching ...
//! ```
//!
//! - At most one fetch is in flight. A cycle that finds one pending only
//!   reschedules itself.
//! - Failures (transport, non-2xx, body without `success`) are absorbed: the
//!   state does not advance and the next cycle is scheduled as usual.
//! - Commands suspend the loop with [`PollReconciler::suspend`]. Suspension
//!   cancels the pending timer but never an issued fetch; its result is
//!   merged through the optimistic lock tickets taken before dispatch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::WallBackend;
use crate::errors::{Result, WallError};
use crate::events::{SessionEvent, SessionEventBus};
use crate::model::normalize_vol_pct;
use crate::state::{SharedState, lock_state};

/// Consecutive failed polls after which a single warning is logged.
pub const FAILURE_WARN_THRESHOLD: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Fetching,
    Merging,
    Scheduled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The response was merged into the session state.
    Merged,
    /// The backend answered without `success`.
    NoData,
    /// Transport or decoding failure.
    Failed,
    /// Another fetch was already in flight.
    Skipped,
    /// Polling is suspended by a command.
    Suspended,
}

struct PollControl {
    phase: PollPhase,
    running: bool,
    fetch_in_flight: bool,
    suspensions: usize,
    // Longest resume delay requested by the guards of the current suspension
    resume_delay: Duration,
    timer: Option<JoinHandle<()>>,
    consecutive_failures: u32,
}

pub struct PollReconciler {
    backend: Arc<dyn WallBackend>,
    state: SharedState,
    events: SessionEventBus,
    interval: Duration,
    control: Mutex<PollControl>,
}

// Clears the in-flight flag even if the polling future is dropped.
struct FetchGuard<'a> {
    control: &'a Mutex<PollControl>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        control.fetch_in_flight = false;
        if matches!(control.phase, PollPhase::Fetching | PollPhase::Merging) {
            control.phase = PollPhase::Idle;
        }
    }
}

impl PollReconciler {
    pub fn new(
        backend: Arc<dyn WallBackend>,
        state: SharedState,
        events: SessionEventBus,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            state,
            events,
            interval,
            control: Mutex::new(PollControl {
                phase: PollPhase::Idle,
                running: false,
                fetch_in_flight: false,
                suspensions: 0,
                resume_delay: Duration::ZERO,
                timer: None,
                consecutive_failures: 0,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, PollControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self) -> PollPhase {
        self.control().phase
    }

    pub fn is_running(&self) -> bool {
        self.control().running
    }

    pub fn is_suspended(&self) -> bool {
        self.control().suspensions > 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.control().consecutive_failures
    }

    /// Starts the loop with an immediate first poll. No-op when running.
    pub fn start(self: &Arc<Self>) {
        {
            let mut control = self.control();
            if control.running {
                return;
            }
            control.running = true;
        }
        info!(interval_ms = self.interval.as_millis() as u64, "Wall poll loop started");
        self.schedule(Duration::ZERO);
    }

    /// Stops scheduling new cycles. A fetch already in flight completes and
    /// is merged.
    pub fn shutdown(&self) {
        let mut control = self.control();
        if !control.running {
            return;
        }
        control.running = false;
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if !control.fetch_in_flight {
            control.phase = PollPhase::Idle;
        }
        info!("Wall poll loop stopped");
    }

    /// Replaces the pending timer with an immediate cycle.
    pub fn poll_now(self: &Arc<Self>) {
        self.schedule(Duration::ZERO);
    }

    /// Runs one fetch/merge step without touching the timer.
    pub async fn poll_once(&self) -> PollOutcome {
        let tickets = {
            let mut control = self.control();
            if control.suspensions > 0 {
                return PollOutcome::Suspended;
            }
            if control.fetch_in_flight {
                debug!("Queue poll skipped, a fetch is already in flight");
                return PollOutcome::Skipped;
            }
            control.fetch_in_flight = true;
            control.phase = PollPhase::Fetching;
            // Lock snapshots must predate the request
            lock_state(&self.state).poll_tickets(Instant::now())
        };
        let _guard = FetchGuard {
            control: &self.control,
        };

        match self.backend.get_queue().await {
            Ok(response) if response.success => {
                self.control().phase = PollPhase::Merging;
                let events = lock_state(&self.state).apply_poll(response, tickets);
                self.record_success();
                self.events.broadcast_all(events);
                PollOutcome::Merged
            }
            Ok(_) => {
                debug!("Queue poll returned no data");
                self.record_failure();
                PollOutcome::NoData
            }
            Err(err) => {
                debug!(error = %err, "Queue poll failed");
                self.record_failure();
                PollOutcome::Failed
            }
        }
    }

    /// Reads `GET /vol_pct` outside the loop, honouring the volume lock.
    ///
    /// Returns the volume now held in the session state.
    pub async fn refresh_vol_pct(&self) -> Result<Option<u8>> {
        let ticket = lock_state(&self.state).volume_lock.ticket(Instant::now());
        let response = self.backend.get_vol_pct().await?;
        if !response.success {
            return Err(WallError::rejected("vol_pct"));
        }

        let (vol_pct, changed) = {
            let mut state = lock_state(&self.state);
            let mut changed = false;
            if let Some(raw) = response.vol_pct {
                if state.volume_lock.admit(ticket) {
                    let vol_pct = normalize_vol_pct(raw);
                    changed = state.vol_pct != Some(vol_pct);
                    state.vol_pct = Some(vol_pct);
                }
            }
            (state.vol_pct, changed)
        };
        if let (true, Some(vol_pct)) = (changed, vol_pct) {
            self.events.broadcast(SessionEvent::VolumeChanged { vol_pct });
        }
        Ok(vol_pct)
    }

    fn record_success(&self) {
        let mut control = self.control();
        if control.consecutive_failures >= FAILURE_WARN_THRESHOLD {
            info!(
                failures = control.consecutive_failures,
                "Wall backend reachable again"
            );
        }
        control.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut control = self.control();
        control.consecutive_failures = control.consecutive_failures.saturating_add(1);
        if control.consecutive_failures == FAILURE_WARN_THRESHOLD {
            warn!(
                failures = control.consecutive_failures,
                "Wall backend not answering, still polling"
            );
        }
    }

    async fn run_cycle(self: Arc<Self>) {
        let outcome = self.poll_once().await;
        if outcome != PollOutcome::Suspended {
            self.schedule(self.interval);
        }
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let mut control = self.control();
        if !control.running || control.suspensions > 0 {
            return;
        }
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }

        let this = Arc::clone(self);
        control.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so that aborting the timer never cancels a fetch
            tokio::spawn(this.run_cycle());
        }));
        if !control.fetch_in_flight {
            control.phase = PollPhase::Scheduled;
        }
    }

    /// Cancels the pending cycle until the returned guard is dropped.
    ///
    /// Suspensions nest; when the last guard goes away polling resumes after
    /// the longest resume delay any of the nested guards asked for.
    pub fn suspend(self: &Arc<Self>, resume_delay: Duration) -> PollSuspension {
        let mut control = self.control();
        control.suspensions += 1;
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if !control.fetch_in_flight {
            control.phase = PollPhase::Idle;
        }
        PollSuspension {
            reconciler: Arc::clone(self),
            resume_delay,
        }
    }

    fn resume(self: &Arc<Self>, delay: Duration) {
        let resumed = {
            let mut control = self.control();
            control.suspensions = control.suspensions.saturating_sub(1);
            control.resume_delay = control.resume_delay.max(delay);
            if control.suspensions == 0 {
                Some(std::mem::take(&mut control.resume_delay))
            } else {
                None
            }
        };
        if let Some(delay) = resumed {
            self.schedule(delay);
        }
    }
}

/// Held by a command for its whole duration.
#[must_use = "polling resumes as soon as the suspension is dropped"]
pub struct PollSuspension {
    reconciler: Arc<PollReconciler>,
    resume_delay: Duration,
}

impl PollSuspension {
    pub fn set_resume_delay(&mut self, delay: Duration) {
        self.resume_delay = delay;
    }
}

impl Drop for PollSuspension {
    fn drop(&mut self) {
        self.reconciler.resume(self.resume_delay);
    }
}
