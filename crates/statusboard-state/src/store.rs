//! ConfigStore — mutex-guarded, file-backed tracker configuration.
//!
//! Every read and write goes through one mutex, so concurrent callers see a
//! linearizable sequence of configurations. Mutations are applied to a copy,
//! written to disk, and only then swapped in. The critical section never
//! awaits.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::migrate::{self, Layout};
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

enum Backend {
    File(PathBuf),
    Memory,
}

/// Thread-safe configuration store.
#[derive(Clone)]
pub struct ConfigStore {
    config: Arc<Mutex<Configuration>>,
    backend: Arc<Backend>,
}

impl ConfigStore {
    /// Open (or create) the configuration file at `path`.
    ///
    /// A missing file starts from defaults using `default_interval`. An
    /// unparseable file is moved aside and replaced by defaults; it never
    /// fails startup. Legacy layouts are migrated and rewritten.
    pub fn open(path: &Path, default_interval: u32) -> StoreResult<Self> {
        let (config, rewrite) = match std::fs::read(path) {
            Ok(bytes) => match migrate::decode(&bytes) {
                Ok((config, Layout::Current)) => (config, false),
                Ok((config, layout)) => {
                    info!(?path, ?layout, "migrating legacy configuration");
                    (config, true)
                }
                Err(e) => {
                    let aside = path.with_extension("json.corrupt");
                    warn!(
                        ?path,
                        error = %e,
                        ?aside,
                        "configuration corrupt, starting from defaults"
                    );
                    if let Err(e) = std::fs::rename(path, &aside) {
                        warn!(error = %e, "failed to move corrupt configuration aside");
                    }
                    (Configuration::with_default_interval(default_interval), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no configuration file, starting from defaults");
                (Configuration::with_default_interval(default_interval), true)
            }
            Err(e) => return Err(StoreError::Persist(e.to_string())),
        };

        let store = Self {
            config: Arc::new(Mutex::new(config)),
            backend: Arc::new(Backend::File(path.to_path_buf())),
        };
        if rewrite {
            let snapshot = store.snapshot();
            store.persist(&snapshot)?;
        }
        debug!(?path, trackers = store.len(), "configuration store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory(default_interval: u32) -> Self {
        Self {
            config: Arc::new(Mutex::new(Configuration::with_default_interval(
                default_interval,
            ))),
            backend: Arc::new(Backend::Memory),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Configuration> {
        // A panic while holding the lock cannot leave a half-applied
        // mutation behind: changes are made on a copy.
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, config: &Configuration) -> StoreResult<()> {
        let Backend::File(path) = self.backend.as_ref() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(config).map_err(map_err!(Serialize))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(map_err!(Persist))?;
        tmp.write_all(&bytes).map_err(map_err!(Persist))?;
        tmp.as_file().sync_all().map_err(map_err!(Persist))?;
        tmp.persist(path).map_err(map_err!(Persist))?;
        Ok(())
    }

    /// Apply `f` to a copy, persist it when `f` reports a change, then swap.
    fn commit<T>(
        &self,
        f: impl FnOnce(&mut Configuration) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(out)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// A copy of the full configuration.
    pub fn snapshot(&self) -> Configuration {
        self.lock().clone()
    }

    /// The tracker for a destination, if any.
    pub fn get(&self, destination: &str) -> Option<Tracker> {
        self.lock().trackers.get(destination).cloned()
    }

    /// Number of trackers.
    pub fn len(&self) -> usize {
        self.lock().trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a destination's interval has elapsed. Absent ⇒ never due.
    pub fn is_due(&self, destination: &str, now: u64) -> bool {
        self.lock()
            .trackers
            .get(destination)
            .is_some_and(|t| t.is_due(now))
    }

    /// All destinations due at `now`.
    pub fn due_destinations(&self, now: u64) -> Vec<DestinationId> {
        self.lock().due_destinations(now)
    }

    /// The destination's interval, or the process default when absent.
    pub fn get_interval(&self, destination: &str) -> u32 {
        let config = self.lock();
        config
            .trackers
            .get(destination)
            .map(|t| t.refresh_interval)
            .unwrap_or(config.default_refresh_interval)
    }

    /// The process-wide default interval.
    pub fn default_interval(&self) -> u32 {
        self.lock().default_refresh_interval
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Swap in a whole new configuration.
    ///
    /// For destinations already present, an omitted `last_update_time`
    /// keeps the stored value and a supplied one never moves it backwards.
    pub fn replace(&self, update: ConfigurationUpdate) -> StoreResult<()> {
        validate_interval(update.default_refresh_interval)?;
        for t in update.trackers.values() {
            validate_interval(t.refresh_interval)?;
        }
        self.commit(|config| {
            let trackers = update
                .trackers
                .into_iter()
                .map(|(id, t)| {
                    let prior = config.trackers.get(&id).map(|p| p.last_update_time);
                    let last_update_time = match (prior, t.last_update_time) {
                        (Some(prior), Some(supplied)) => prior.max(supplied),
                        (Some(prior), None) => prior,
                        (None, supplied) => supplied.unwrap_or(0),
                    };
                    let tracker = Tracker {
                        message_ref: t.message_ref,
                        refresh_interval: t.refresh_interval,
                        last_update_time,
                    };
                    (id, tracker)
                })
                .collect();
            *config = Configuration {
                trackers,
                default_refresh_interval: update.default_refresh_interval,
            };
            Ok(((), true))
        })?;
        debug!("configuration replaced");
        Ok(())
    }

    /// Insert a new tracker. Fails with `AlreadyExists` if one is present.
    pub fn insert(&self, destination: &str, tracker: Tracker) -> StoreResult<()> {
        validate_interval(tracker.refresh_interval)?;
        self.commit(|config| {
            if config.trackers.contains_key(destination) {
                return Err(StoreError::AlreadyExists(destination.to_string()));
            }
            config.trackers.insert(destination.to_string(), tracker);
            Ok(((), true))
        })?;
        debug!(%destination, "tracker inserted");
        Ok(())
    }

    /// Record a successful render at `now`. No-op if the tracker is gone.
    pub fn mark_updated(&self, destination: &str, now: u64) -> StoreResult<()> {
        self.commit(|config| match config.trackers.get_mut(destination) {
            Some(t) => {
                t.last_update_time = t.last_update_time.max(now);
                Ok(((), true))
            }
            None => {
                debug!(%destination, "mark_updated on removed tracker ignored");
                Ok(((), false))
            }
        })
    }

    /// Point the tracker at a new notification. Returns false if it is gone.
    pub fn set_message_ref(&self, destination: &str, message: MessageRef) -> StoreResult<bool> {
        self.commit(|config| match config.trackers.get_mut(destination) {
            Some(t) => {
                t.message_ref = Some(message);
                Ok((true, true))
            }
            None => Ok((false, false)),
        })
    }

    /// Change a tracker's interval and make it due on the next tick.
    pub fn set_interval(&self, destination: &str, minutes: u32) -> StoreResult<()> {
        validate_interval(minutes)?;
        self.commit(|config| match config.trackers.get_mut(destination) {
            Some(t) => {
                t.refresh_interval = minutes;
                t.last_update_time = 0;
                Ok(((), true))
            }
            None => Err(StoreError::NotFound(destination.to_string())),
        })?;
        info!(%destination, minutes, "refresh interval updated");
        Ok(())
    }

    /// Change the interval applied to trackers created from now on.
    pub fn set_default_interval(&self, minutes: u32) -> StoreResult<()> {
        validate_interval(minutes)?;
        self.commit(|config| {
            config.default_refresh_interval = minutes;
            Ok(((), true))
        })?;
        info!(minutes, "default refresh interval updated");
        Ok(())
    }

    /// Delete a tracker. Returns true if it existed.
    pub fn remove(&self, destination: &str) -> StoreResult<bool> {
        let existed = self.commit(|config| {
            let existed = config.trackers.remove(destination).is_some();
            Ok((existed, existed))
        })?;
        debug!(%destination, existed, "tracker removed");
        Ok(existed)
    }

    /// Delete several trackers with a single write. Returns how many existed.
    pub fn remove_many(&self, destinations: &[DestinationId]) -> StoreResult<usize> {
        self.commit(|config| {
            let removed = destinations
                .iter()
                .filter(|id| config.trackers.remove(id.as_str()).is_some())
                .count();
            Ok((removed, removed > 0))
        })
    }
}

fn validate_interval(minutes: u32) -> StoreResult<()> {
    if minutes < MIN_REFRESH_INTERVAL {
        return Err(StoreError::InvalidInterval(minutes));
    }
    Ok(())
}
