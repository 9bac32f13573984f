//! Sync scheduling: debounce, single-flight execution and auth-driven syncs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::bus::{SyncEvent, SyncEventBus};
use super::engine::{SyncEngine, SyncReport};
use super::{SyncError, SyncErrorKind, SyncResult};
use crate::auth::AuthChanges;
use crate::state::{SyncPhase, SyncReason};

const SIGNED_OUT_NOTICE: &str = "Changes saved on this device; they will sync at next sign-in.";

#[derive(Default)]
struct ControllerState {
    phase: SyncPhase,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    timer_reason: Option<SyncReason>,
    pending_changes: bool,
    resync_requested: bool,
    signed_out_notice_shown: bool,
    auth_watcher: Option<JoinHandle<()>>,
}

struct Inner {
    engine: SyncEngine,
    bus: SyncEventBus,
    debounce: Duration,
    state: Mutex<ControllerState>,
}

/// Drives the engine: coalesces local changes, runs at most one sync at a
/// time and reacts to sign-in.
///
/// Scheduling spawns tasks, so the controller must be used inside a Tokio
/// runtime. Clones share the same state.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncController")
            .field("phase", &self.phase())
            .field("debounce", &self.inner.debounce)
            .finish_non_exhaustive()
    }
}

impl SyncController {
    pub fn new(engine: SyncEngine, bus: SyncEventBus, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                bus,
                debounce,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    /// True when local changes have not been synced yet.
    pub fn has_pending_changes(&self) -> bool {
        self.lock().pending_changes
    }

    /// Request a sync after the debounce delay.
    ///
    /// Calls within the delay restart the timer, so a burst of edits produces
    /// one sync. While signed out the change is only remembered.
    pub fn schedule_sync(&self, reason: SyncReason) {
        if !self.inner.engine.is_authenticated() {
            self.note_signed_out();
            return;
        }

        {
            let mut state = self.lock();
            state.pending_changes = true;
            if state.phase.is_syncing() {
                state.resync_requested = true;
                tracing::debug!("Sync in progress; {} change will resync afterwards", reason);
                return;
            }
            self.arm_timer(&mut state, reason);
        }
        self.inner.bus.publish(SyncEvent::PhaseChanged {
            phase: SyncPhase::Debouncing,
        });
    }

    /// Cancel any pending timer and sync now.
    ///
    /// Returns `Ok(None)` when a sync is already running.
    pub async fn immediate_sync(&self, reason: SyncReason) -> SyncResult<Option<SyncReport>> {
        self.cancel_timer();
        self.run(reason).await
    }

    /// Run a debounced sync now instead of waiting for its timer.
    ///
    /// Returns `Ok(None)` when nothing was scheduled.
    pub async fn flush(&self) -> SyncResult<Option<SyncReport>> {
        let reason = {
            let mut state = self.lock();
            let Some(timer) = state.timer.take() else {
                return Ok(None);
            };
            timer.abort();
            if state.phase == SyncPhase::Debouncing {
                state.phase = SyncPhase::Idle;
            }
            state.timer_reason.take().unwrap_or(SyncReason::LocalChange)
        };
        self.run(reason).await
    }

    /// Sync on every transition to signed in; forget the notice on sign-out.
    pub fn watch_auth(&self, mut changes: AuthChanges) {
        let controller = self.clone();
        let mut signed_in = changes.borrow_and_update().is_some();
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let now_signed_in = changes.borrow_and_update().is_some();
                if now_signed_in == signed_in {
                    continue;
                }
                signed_in = now_signed_in;
                if signed_in {
                    tracing::info!("Signed in; syncing");
                    controller.lock().signed_out_notice_shown = false;
                    let _ = controller.immediate_sync(SyncReason::Login).await;
                } else {
                    tracing::info!("Signed out; sync paused");
                    controller.cancel_timer();
                    controller.lock().signed_out_notice_shown = false;
                    controller
                        .inner
                        .bus
                        .publish(SyncEvent::StateChanged { connected: false });
                }
            }
        });

        if let Some(previous) = self.lock().auth_watcher.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the timer and the auth watcher. A sync in flight finishes.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if let Some(watcher) = state.auth_watcher.take() {
            watcher.abort();
        }
        if state.phase == SyncPhase::Debouncing {
            state.phase = SyncPhase::Idle;
        }
    }

    fn arm_timer(&self, state: &mut ControllerState, reason: SyncReason) {
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        state.timer_generation += 1;
        state.timer_reason = Some(reason);
        state.phase = SyncPhase::Debouncing;

        let generation = state.timer_generation;
        let delay = self.inner.debounce;
        let controller = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.fire_timer(generation).await;
        }));
    }

    async fn fire_timer(&self, generation: u64) {
        let reason = {
            let mut state = self.lock();
            // Superseded or cancelled while this task was waiting for the lock.
            if state.timer_generation != generation || state.timer.is_none() {
                return;
            }
            state.timer = None;
            state.phase = SyncPhase::Idle;
            state.timer_reason.take().unwrap_or(SyncReason::LocalChange)
        };
        let _ = self.run(reason).await;
    }

    fn cancel_timer(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
            tracing::debug!("Cancelled pending debounced sync");
        }
        state.timer_reason = None;
        if state.phase == SyncPhase::Debouncing {
            state.phase = SyncPhase::Idle;
        }
    }

    fn note_signed_out(&self) {
        let first_notice = {
            let mut state = self.lock();
            state.pending_changes = true;
            !std::mem::replace(&mut state.signed_out_notice_shown, true)
        };
        if first_notice {
            self.inner.bus.publish(SyncEvent::Notice {
                message: SIGNED_OUT_NOTICE.to_string(),
            });
        }
    }

    async fn run(&self, reason: SyncReason) -> SyncResult<Option<SyncReport>> {
        if !self.inner.engine.is_authenticated() {
            self.note_signed_out();
            return Err(SyncError::Unauthenticated);
        }

        {
            let mut state = self.lock();
            if state.phase.is_syncing() {
                tracing::debug!("Sync already running; ignoring {} request", reason);
                return Ok(None);
            }
            state.phase = SyncPhase::Syncing;
            state.pending_changes = false;
            state.resync_requested = false;
        }
        self.inner.bus.publish(SyncEvent::PhaseChanged {
            phase: SyncPhase::Syncing,
        });
        tracing::info!(reason = %reason, "Starting sync");

        let result = self.inner.engine.run().await;

        let resync = {
            let mut state = self.lock();
            state.phase = SyncPhase::Idle;
            if result.is_err() {
                state.pending_changes = true;
            }
            std::mem::take(&mut state.resync_requested)
        };
        self.inner.bus.publish(SyncEvent::PhaseChanged {
            phase: SyncPhase::Idle,
        });

        match &result {
            Ok(report) => self.announce(report),
            Err(error) => {
                tracing::warn!(reason = %reason, "Sync failed: {}", error);
                if error.kind() == SyncErrorKind::Unauthenticated {
                    self.inner
                        .bus
                        .publish(SyncEvent::StateChanged { connected: false });
                }
                self.inner.bus.publish(SyncEvent::Failed {
                    message: error.user_message(),
                });
            }
        }

        if resync {
            self.schedule_sync(SyncReason::Resync);
        }
        result.map(Some)
    }

    fn announce(&self, report: &SyncReport) {
        let bus = &self.inner.bus;
        bus.publish(SyncEvent::StateChanged { connected: true });
        bus.publish(SyncEvent::DataUpdated {
            bookmarks: report.snapshot.bookmarks.clone(),
            notes: report.snapshot.notes.clone(),
            reading_positions: report.snapshot.reading_positions.clone(),
            deleted_items: report.deleted_items.clone(),
        });
        bus.publish(SyncEvent::SyncComplete {
            sync_version: report.sync_version,
        });
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
