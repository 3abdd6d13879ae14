//! reconciler — the periodic refresh cycle.
//!
//! One tick decides which destinations are due, probes upstream at most
//! once, keeps the presence indicator in step with the statuses, prunes
//! destinations the platform no longer lets us reach, and then edits (or
//! recreates) the notification in every due destination.
//!
//! # Architecture
//!
//! ```text
//!   timer ──► tick ─┬─► ConfigStore::snapshot ──► due set
//!                   ├─► Prober::probe (skipped when nothing is due)
//!                   ├─► ChatPlatform::set_presence (on change)
//!                   ├─► DestinationResolver::refresh (every destination)
//!                   ├─► ConfigStore::remove_many (unreachable ones)
//!                   └─► edit / send per due destination ──► mark_updated
//! ```
//!
//! Ticks never overlap: the timer and the forcing commands share one
//! async mutex.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::MutexGuard;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use statusboard_probe::{Prober, ServiceStatus, StatusSnapshot};
use statusboard_state::{ConfigStore, DestinationId, MessageRef, Tracker, epoch_secs};

use crate::platform::{ChatPlatform, PlatformError};
use crate::render::{Presence, Renderer};
use crate::resolver::DestinationResolver;

/// Upper bound on any single platform call made during a tick.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ── Reports ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// Driven by the timer; only due destinations are refreshed.
    Scheduled,
    /// Every destination is treated as due.
    Forced,
}

/// What happened to one destination during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NotDue,
    /// Existing notification edited in place.
    Updated { message_ref: MessageRef },
    /// A new notification was posted because none existed or the old one was gone.
    Posted {
        message_ref: MessageRef,
        replaced: Option<MessageRef>,
    },
    /// Access was lost mid-tick; the next sweep decides.
    Deferred { reason: String },
    /// Transient failure; retried next tick.
    Failed { reason: String },
    /// Removed from the configuration as permanently unreachable.
    Pruned,
    /// The tracker disappeared while the tick was running.
    Skipped { reason: String },
}

impl Outcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Outcome::Updated { .. } | Outcome::Posted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub at: u64,
    pub mode: TickMode,
    pub probed: bool,
    pub presence_changed: bool,
    pub statuses: Option<BTreeMap<String, ServiceStatus>>,
    pub outcomes: BTreeMap<DestinationId, Outcome>,
}

impl TickReport {
    fn new(at: u64, mode: TickMode) -> Self {
        Self {
            at,
            mode,
            probed: false,
            presence_changed: false,
            statuses: None,
            outcomes: BTreeMap::new(),
        }
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }

    pub fn refreshed(&self) -> usize {
        self.count(Outcome::is_refreshed)
    }

    pub fn pruned(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Pruned))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. } | Outcome::Deferred { .. }))
    }
}

// ── Counters ───────────────────────────────────────────────────

/// Lifetime counters, readable without taking the tick lock.
#[derive(Debug, Default)]
pub struct Counters {
    ticks: AtomicU64,
    probes: AtomicU64,
    updates: AtomicU64,
    recreations: AtomicU64,
    pruned: AtomicU64,
    failures: AtomicU64,
    presence_pushes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CountersSnapshot {
    pub ticks: u64,
    pub probes: u64,
    pub updates: u64,
    pub recreations: u64,
    pub pruned: u64,
    pub failures: u64,
    pub presence_pushes: u64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            recreations: self.recreations.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            presence_pushes: self.presence_pushes.load(Ordering::Relaxed),
        }
    }
}

// ── Reconciler ─────────────────────────────────────────────────

/// State owned by whoever holds the tick lock.
#[derive(Debug, Default)]
pub(crate) struct TickState {
    /// Statuses behind the last presence that was successfully pushed.
    presence_statuses: Option<BTreeMap<String, ServiceStatus>>,
}

pub struct Reconciler {
    store: ConfigStore,
    prober: Arc<dyn Prober>,
    platform: Arc<dyn ChatPlatform>,
    resolver: Arc<dyn DestinationResolver>,
    renderer: Renderer,
    call_timeout: Duration,
    tick_lock: tokio::sync::Mutex<TickState>,
    last_snapshot: Mutex<Option<StatusSnapshot>>,
    last_tick_at: AtomicU64,
    counters: Counters,
}

impl Reconciler {
    pub fn new(
        store: ConfigStore,
        prober: Arc<dyn Prober>,
        platform: Arc<dyn ChatPlatform>,
        resolver: Arc<dyn DestinationResolver>,
        renderer: Renderer,
    ) -> Self {
        Self {
            store,
            prober,
            platform,
            resolver,
            renderer,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            tick_lock: tokio::sync::Mutex::new(TickState::default()),
            last_snapshot: Mutex::new(None),
            last_tick_at: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub(crate) fn platform(&self) -> &dyn ChatPlatform {
        self.platform.as_ref()
    }

    pub(crate) fn resolver(&self) -> &dyn DestinationResolver {
        self.resolver.as_ref()
    }

    pub(crate) fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Statuses from the most recent probe, if any probe has run.
    pub fn last_snapshot(&self) -> Option<StatusSnapshot> {
        self.last_snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Unix seconds of the last completed tick; 0 before the first.
    pub fn last_tick_at(&self) -> u64 {
        self.last_tick_at.load(Ordering::Relaxed)
    }

    /// Hold off ticks while a command mutates destinations.
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, TickState> {
        self.tick_lock.lock().await
    }

    /// Probe once outside a tick, recording the result for `debug`.
    pub(crate) async fn probe_now(&self) -> StatusSnapshot {
        Counters::bump(&self.counters.probes, 1);
        let snapshot = self.prober.probe().await;
        self.remember(&snapshot);
        snapshot
    }

    fn remember(&self, snapshot: &StatusSnapshot) {
        *self.last_snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
    }

    pub async fn tick(&self, mode: TickMode) -> TickReport {
        self.tick_at(epoch_secs(), mode).await
    }

    /// Run one tick as if the clock read `now`.
    pub async fn tick_at(&self, now: u64, mode: TickMode) -> TickReport {
        let mut state = self.tick_lock.lock().await;
        Counters::bump(&self.counters.ticks, 1);

        let config = self.store.snapshot();
        let due: BTreeSet<DestinationId> = match mode {
            TickMode::Forced => config.trackers.keys().cloned().collect(),
            TickMode::Scheduled => config.due_destinations(now).into_iter().collect(),
        };

        let mut report = TickReport::new(now, mode);
        for id in config.trackers.keys().filter(|id| !due.contains(*id)) {
            report.outcomes.insert(id.clone(), Outcome::NotDue);
        }

        let snapshot = if due.is_empty() {
            debug!(destinations = config.trackers.len(), "no destinations due, skipping probe");
            None
        } else {
            Counters::bump(&self.counters.probes, 1);
            let snapshot = self.prober.probe().await;
            self.remember(&snapshot);
            report.probed = true;
            report.statuses = Some(snapshot.statuses.clone());
            Some(snapshot)
        };

        if let Some(snapshot) = &snapshot {
            report.presence_changed = self
                .update_presence(&mut state, snapshot, config.trackers.len())
                .await;
        }

        let lost = self.sweep(config.trackers.keys()).await;
        if !lost.is_empty() {
            self.prune(&lost, &mut report);
        }

        if let Some(snapshot) = &snapshot {
            for id in due.iter().filter(|id| !lost.contains(*id)) {
                let outcome = match self.store.get(id) {
                    Some(tracker) => self.apply(id, &tracker, snapshot, now).await,
                    None => Outcome::Skipped {
                        reason: "tracker removed during tick".to_string(),
                    },
                };
                self.count_outcome(&outcome);
                report.outcomes.insert(id.clone(), outcome);
            }
        }

        self.last_tick_at.store(now, Ordering::Relaxed);
        info!(
            mode = ?mode,
            due = due.len(),
            probed = report.probed,
            refreshed = report.refreshed(),
            pruned = report.pruned(),
            failed = report.failed(),
            "tick complete"
        );
        report
    }

    /// Drive scheduled ticks until `shutdown` flips.
    pub async fn run(&self, period: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(period_secs = period.as_secs(), "reconciler started");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(TickMode::Scheduled).await;
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    // ── Tick steps ─────────────────────────────────────────────

    async fn update_presence(
        &self,
        state: &mut TickState,
        snapshot: &StatusSnapshot,
        destinations: usize,
    ) -> bool {
        if destinations == 0 || state.presence_statuses.as_ref() == Some(&snapshot.statuses) {
            return false;
        }

        let presence = Presence::from_snapshot(snapshot);
        match self.bounded(self.platform.set_presence(presence)).await {
            Ok(()) => {
                state.presence_statuses = Some(snapshot.statuses.clone());
                Counters::bump(&self.counters.presence_pushes, 1);
                info!(presence = ?presence, "presence updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "presence update failed");
                false
            }
        }
    }

    /// Resolve every destination remotely; returns the permanently lost ones.
    async fn sweep<'a>(&self, ids: impl Iterator<Item = &'a DestinationId>) -> Vec<DestinationId> {
        let mut lost = Vec::new();
        for id in ids {
            match self.bounded(self.resolver.refresh(id)).await {
                Ok(_) => {}
                Err(e) if e.is_destination_lost() => {
                    warn!(destination = %id, error = %e, "destination permanently unreachable");
                    lost.push(id.clone());
                }
                Err(e) => {
                    debug!(destination = %id, error = %e, "destination transiently unreachable");
                }
            }
        }
        lost
    }

    fn prune(&self, lost: &[DestinationId], report: &mut TickReport) {
        match self.store.remove_many(lost) {
            Ok(removed) => {
                Counters::bump(&self.counters.pruned, removed as u64);
                info!(removed, "pruned unreachable destinations");
                for id in lost {
                    self.resolver.invalidate(id);
                    report.outcomes.insert(id.clone(), Outcome::Pruned);
                }
            }
            Err(e) => {
                error!(error = %e, "failed to prune unreachable destinations");
                for id in lost {
                    report.outcomes.insert(
                        id.clone(),
                        Outcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
    }

    async fn apply(
        &self,
        id: &str,
        tracker: &Tracker,
        snapshot: &StatusSnapshot,
        now: u64,
    ) -> Outcome {
        let dest = match self.bounded(self.resolver.resolve(id)).await {
            Ok(dest) => dest,
            Err(e) => return self.failure(id, e),
        };
        let payload = self.renderer.render(snapshot, tracker.refresh_interval);

        if let Some(message) = &tracker.message_ref {
            match self.bounded(self.platform.edit(&dest, message, &payload)).await {
                Ok(()) => {
                    return match self.store.mark_updated(id, now) {
                        Ok(()) => Outcome::Updated {
                            message_ref: message.clone(),
                        },
                        Err(e) => {
                            error!(destination = %id, error = %e, "failed to record update");
                            Outcome::Failed {
                                reason: e.to_string(),
                            }
                        }
                    };
                }
                Err(e) if e.is_message_missing() => {
                    info!(
                        destination = %id,
                        message = %message,
                        "notification missing, recreating"
                    );
                }
                Err(e) => return self.failure(id, e),
            }
        }

        let posted = match self.bounded(self.platform.send(&dest, &payload)).await {
            Ok(posted) => posted,
            Err(e) => return self.failure(id, e),
        };

        match self.store.set_message_ref(id, posted.clone()) {
            Ok(true) => {}
            Ok(false) => {
                // Tracker vanished between snapshot and send; do not leave an orphan.
                if let Err(e) = self.bounded(self.platform.delete(&dest, &posted)).await {
                    warn!(destination = %id, error = %e, "failed to delete orphaned notification");
                }
                return Outcome::Skipped {
                    reason: "tracker removed during tick".to_string(),
                };
            }
            Err(e) => {
                error!(destination = %id, error = %e, "failed to store notification reference");
                return Outcome::Failed {
                    reason: e.to_string(),
                };
            }
        }
        if let Err(e) = self.store.mark_updated(id, now) {
            error!(destination = %id, error = %e, "failed to record update");
        }

        Outcome::Posted {
            message_ref: posted,
            replaced: tracker.message_ref.clone(),
        }
    }

    fn failure(&self, id: &str, e: PlatformError) -> Outcome {
        if e.is_destination_lost() {
            self.resolver.invalidate(id);
            warn!(
                destination = %id,
                error = %e,
                "lost access to destination, deferring to next sweep"
            );
            Outcome::Deferred {
                reason: e.to_string(),
            }
        } else {
            warn!(destination = %id, error = %e, "refresh failed, retrying next tick");
            Outcome::Failed {
                reason: e.to_string(),
            }
        }
    }

    fn count_outcome(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Updated { .. } => Counters::bump(&self.counters.updates, 1),
            Outcome::Posted { replaced, .. } => {
                Counters::bump(&self.counters.updates, 1);
                if replaced.is_some() {
                    Counters::bump(&self.counters.recreations, 1);
                }
            }
            Outcome::Failed { .. } | Outcome::Deferred { .. } => {
                Counters::bump(&self.counters.failures, 1)
            }
            Outcome::NotDue | Outcome::Pruned | Outcome::Skipped { .. } => {}
        }
    }

    /// Cap a platform call at the configured timeout.
    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, PlatformError>>,
    ) -> Result<T, PlatformError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Transient(format!(
                "no response within {:?}",
                self.call_timeout
            ))),
        }
    }
}
