//! Domain types for the configuration store.
//!
//! These are the persisted shapes: one [`Tracker`] per destination and the
//! process-wide [`Configuration`] that owns them. All types serialize to
//! the JSON configuration file.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of a notification target (e.g. a channel snowflake).
pub type DestinationId = String;

/// Reference to a rendered notification (e.g. a message snowflake).
pub type MessageRef = String;

/// Refresh interval applied to new trackers when nothing else is configured.
pub const DEFAULT_REFRESH_INTERVAL: u32 = 5;

/// Smallest accepted refresh interval, in minutes.
pub const MIN_REFRESH_INTERVAL: u32 = 1;

// ── Tracker ───────────────────────────────────────────────────────

/// Persisted state binding a destination to its rendered notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tracker {
    /// Last known rendered notification. May point at a deleted message.
    #[serde(
        default,
        alias = "message_id",
        deserialize_with = "deserialize_opt_id"
    )]
    pub message_ref: Option<MessageRef>,
    /// Refresh cadence in minutes (>= 1).
    #[serde(default, alias = "interval")]
    pub refresh_interval: u32,
    /// Unix timestamp (seconds) of the last successful render. 0 = never.
    #[serde(default)]
    pub last_update_time: u64,
}

impl Tracker {
    /// A fresh tracker with no notification yet, due immediately.
    pub fn new(refresh_interval: u32) -> Self {
        Self {
            message_ref: None,
            refresh_interval,
            last_update_time: 0,
        }
    }

    /// Refresh interval converted to seconds.
    pub fn interval_secs(&self) -> u64 {
        u64::from(self.refresh_interval) * 60
    }

    /// Never updated, or at least one full interval has elapsed since.
    pub fn is_due(&self, now: u64) -> bool {
        self.last_update_time == 0
            || now.saturating_sub(self.last_update_time) >= self.interval_secs()
    }
}

// ── Configuration ─────────────────────────────────────────────────

/// Process-wide configuration: every tracker plus the default interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    #[serde(default)]
    pub trackers: BTreeMap<DestinationId, Tracker>,
    #[serde(default = "default_refresh_interval")]
    pub default_refresh_interval: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            trackers: BTreeMap::new(),
            default_refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl Configuration {
    /// An empty configuration with the given default interval.
    pub fn with_default_interval(minutes: u32) -> Self {
        Self {
            trackers: BTreeMap::new(),
            default_refresh_interval: minutes.max(MIN_REFRESH_INTERVAL),
        }
    }

    /// Destinations whose interval has elapsed at `now`.
    pub fn due_destinations(&self, now: u64) -> Vec<DestinationId> {
        self.trackers
            .iter()
            .filter(|(_, t)| t.is_due(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Replace zero intervals with the default. Returns how many were fixed.
    pub(crate) fn normalize(&mut self) -> usize {
        if self.default_refresh_interval < MIN_REFRESH_INTERVAL {
            self.default_refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        let default = self.default_refresh_interval;
        let mut fixed = 0;
        for tracker in self.trackers.values_mut() {
            if tracker.refresh_interval < MIN_REFRESH_INTERVAL {
                tracker.refresh_interval = default;
                fixed += 1;
            }
        }
        fixed
    }
}

// ── Replace payload ───────────────────────────────────────────────

/// Caller-supplied tracker for [`ConfigStore::replace`](crate::ConfigStore::replace).
///
/// `last_update_time: None` keeps whatever the store already has.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerUpdate {
    pub message_ref: Option<MessageRef>,
    pub refresh_interval: u32,
    pub last_update_time: Option<u64>,
}

impl From<Tracker> for TrackerUpdate {
    fn from(t: Tracker) -> Self {
        Self {
            message_ref: t.message_ref,
            refresh_interval: t.refresh_interval,
            last_update_time: Some(t.last_update_time),
        }
    }
}

/// Full replacement payload for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationUpdate {
    pub trackers: BTreeMap<DestinationId, TrackerUpdate>,
    pub default_refresh_interval: u32,
}

impl From<Configuration> for ConfigurationUpdate {
    fn from(c: Configuration) -> Self {
        Self {
            trackers: c
                .trackers
                .into_iter()
                .map(|(id, t)| (id, TrackerUpdate::from(t)))
                .collect(),
            default_refresh_interval: c.default_refresh_interval,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────

fn default_refresh_interval() -> u32 {
    DEFAULT_REFRESH_INTERVAL
}

/// Accept snowflakes stored either as JSON strings or numbers.
pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| id_from_value(&v)))
}

pub(crate) fn id_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
