//! Administrative commands.
//!
//! Thin layer over the store and the reconciler. Commands that create or
//! delete notifications hold the tick lock so a concurrent tick never sees
//! a half-created tracker.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use statusboard_probe::ServiceStatus;
use statusboard_state::{DestinationId, MIN_REFRESH_INTERVAL, MessageRef, Tracker, epoch_secs};

use crate::error::{CommandError, CommandResult};
use crate::reconciler::{CountersSnapshot, Reconciler, TickMode, TickReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    pub destination: DestinationId,
    pub message_ref: MessageRef,
    pub refresh_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// A tracker existed before the call.
    pub existed: bool,
    /// The rendered notification was removed from the destination.
    pub message_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerSummary {
    pub destination: DestinationId,
    pub message_ref: Option<MessageRef>,
    pub refresh_interval: u32,
    pub last_update_time: u64,
    pub next_due_at: u64,
}

impl TrackerSummary {
    fn new(destination: &str, tracker: &Tracker) -> Self {
        Self {
            destination: destination.to_string(),
            message_ref: tracker.message_ref.clone(),
            refresh_interval: tracker.refresh_interval,
            last_update_time: tracker.last_update_time,
            next_due_at: tracker.last_update_time.saturating_add(tracker.interval_secs()),
        }
    }
}

/// Counts from a forced refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub pruned: usize,
}

/// A forced reconciliation plus a check that each notification still exists.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tick: TickReport,
    pub message_present: BTreeMap<DestinationId, bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub counters: CountersSnapshot,
    pub trackers: usize,
    pub default_refresh_interval: u32,
    pub last_tick_at: u64,
    pub last_statuses: Option<BTreeMap<String, ServiceStatus>>,
    pub last_probed_at: Option<u64>,
}

fn validate_interval(minutes: u32) -> CommandResult<u32> {
    if minutes < MIN_REFRESH_INTERVAL {
        return Err(CommandError::InvalidInterval(minutes));
    }
    Ok(minutes)
}

/// Log a failed command at a level matching who caused it.
fn logged<T>(command: &str, result: CommandResult<T>) -> CommandResult<T> {
    if let Err(e) = &result {
        if e.is_internal() {
            error!(command, error = %e, "command failed");
        } else {
            debug!(command, error = %e, "command rejected");
        }
    }
    result
}

#[derive(Clone)]
pub struct CommandSurface {
    reconciler: Arc<Reconciler>,
}

impl CommandSurface {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Start tracking `destination` and post its first notification.
    pub async fn create(
        &self,
        destination: &str,
        interval: Option<u32>,
    ) -> CommandResult<CreateOutcome> {
        logged("create", self.create_inner(destination, interval).await)
    }

    async fn create_inner(
        &self,
        destination: &str,
        interval: Option<u32>,
    ) -> CommandResult<CreateOutcome> {
        let store = self.reconciler.store();
        let minutes = validate_interval(interval.unwrap_or_else(|| store.default_interval()))?;

        let _guard = self.reconciler.exclusive().await;
        store.insert(destination, Tracker::new(minutes))?;

        match self.seed(destination, minutes).await {
            Ok(message_ref) => {
                info!(destination = %destination, interval = minutes, "tracker created");
                Ok(CreateOutcome {
                    destination: destination.to_string(),
                    message_ref,
                    refresh_interval: minutes,
                })
            }
            Err(e) => {
                if let Err(rollback) = store.remove(destination) {
                    error!(
                        destination = %destination,
                        error = %rollback,
                        "failed to roll back tracker"
                    );
                }
                Err(e)
            }
        }
    }

    async fn seed(&self, destination: &str, minutes: u32) -> CommandResult<MessageRef> {
        let r = &self.reconciler;
        let dest = r.bounded(r.resolver().refresh(destination)).await?;
        let snapshot = r.probe_now().await;
        let payload = r.renderer().render(&snapshot, minutes);
        let message_ref = r.bounded(r.platform().send(&dest, &payload)).await?;

        if let Err(e) = self.record_seed(destination, &message_ref) {
            if let Err(cleanup) = r.bounded(r.platform().delete(&dest, &message_ref)).await {
                warn!(
                    destination = %destination,
                    error = %cleanup,
                    "failed to delete unrecorded notification"
                );
            }
            return Err(e);
        }
        Ok(message_ref)
    }

    fn record_seed(&self, destination: &str, message_ref: &MessageRef) -> CommandResult<()> {
        let store = self.reconciler.store();
        if !store.set_message_ref(destination, message_ref.clone())? {
            return Err(CommandError::NotFound(destination.to_string()));
        }
        store.mark_updated(destination, epoch_secs())?;
        Ok(())
    }

    /// Stop tracking `destination`. Deleting an unknown destination is a no-op.
    pub async fn delete(&self, destination: &str) -> CommandResult<DeleteOutcome> {
        logged("delete", self.delete_inner(destination).await)
    }

    async fn delete_inner(&self, destination: &str) -> CommandResult<DeleteOutcome> {
        let r = &self.reconciler;
        let _guard = r.exclusive().await;

        let Some(tracker) = r.store().get(destination) else {
            return Ok(DeleteOutcome {
                existed: false,
                message_deleted: false,
            });
        };

        let mut message_deleted = false;
        if let Some(message) = &tracker.message_ref {
            let deleted = match r.bounded(r.resolver().resolve(destination)).await {
                Ok(dest) => r.bounded(r.platform().delete(&dest, message)).await,
                Err(e) => Err(e),
            };
            match deleted {
                Ok(()) => message_deleted = true,
                Err(e) => {
                    warn!(destination = %destination, error = %e, "could not delete notification");
                }
            }
        }

        r.store().remove(destination)?;
        r.resolver().invalidate(destination);
        info!(destination = %destination, message_deleted, "tracker deleted");
        Ok(DeleteOutcome {
            existed: true,
            message_deleted,
        })
    }

    pub fn list(&self) -> Vec<TrackerSummary> {
        self.reconciler
            .store()
            .snapshot()
            .trackers
            .iter()
            .map(|(id, tracker)| TrackerSummary::new(id, tracker))
            .collect()
    }

    /// Change one destination's cadence; it is refreshed on the next tick.
    pub fn set_interval(&self, destination: &str, minutes: u32) -> CommandResult<()> {
        let result = validate_interval(minutes).and_then(|m| {
            self.reconciler
                .store()
                .set_interval(destination, m)
                .map_err(CommandError::from)
        });
        if result.is_ok() {
            info!(destination = %destination, interval = minutes, "interval updated");
        }
        logged("set_interval", result)
    }

    pub fn set_default_interval(&self, minutes: u32) -> CommandResult<()> {
        let result = validate_interval(minutes).and_then(|m| {
            self.reconciler
                .store()
                .set_default_interval(m)
                .map_err(CommandError::from)
        });
        if result.is_ok() {
            info!(interval = minutes, "default interval updated");
        }
        logged("set_default_interval", result)
    }

    /// Force an immediate refresh of every destination.
    pub async fn refresh(&self) -> RefreshSummary {
        let report = self.reconciler.tick(TickMode::Forced).await;
        RefreshSummary {
            refreshed: report.refreshed(),
            failed: report.failed(),
            pruned: report.pruned(),
        }
    }

    /// Force a refresh, then confirm every stored notification still exists.
    pub async fn sync(&self) -> SyncReport {
        let tick = self.reconciler.tick(TickMode::Forced).await;
        let r = &self.reconciler;

        let mut message_present = BTreeMap::new();
        for (id, tracker) in r.store().snapshot().trackers {
            let present = match &tracker.message_ref {
                None => false,
                Some(message) => match r.bounded(r.resolver().resolve(&id)).await {
                    Ok(dest) => r
                        .bounded(r.platform().fetch_message(&dest, message))
                        .await
                        .is_ok(),
                    Err(_) => false,
                },
            };
            message_present.insert(id, present);
        }

        SyncReport {
            tick,
            message_present,
        }
    }

    pub fn debug(&self) -> DebugReport {
        let r = &self.reconciler;
        let store = r.store();
        let snapshot = r.last_snapshot();
        DebugReport {
            counters: r.counters(),
            trackers: store.len(),
            default_refresh_interval: store.default_interval(),
            last_tick_at: r.last_tick_at(),
            last_probed_at: snapshot.as_ref().map(|s| s.taken_at),
            last_statuses: snapshot.map(|s| s.statuses),
        }
    }
}
