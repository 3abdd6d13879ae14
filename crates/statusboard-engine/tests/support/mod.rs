//! In-memory platform and prober shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use statusboard_engine::*;
use statusboard_probe::{Prober, ServiceStatus, StatusSnapshot};
use statusboard_state::{ConfigStore, MessageRef};

pub const T0: u64 = 1_000_000;

// ── Platform ───────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    channels: BTreeSet<String>,
    forbidden: BTreeSet<String>,
    messages: BTreeMap<String, BTreeSet<String>>,
    next_id: u64,
    presence: Vec<Presence>,
    lookups: u32,
    sends: u32,
    edits: u32,
    fail_edits: bool,
    fail_sends: bool,
    deny_edits: bool,
    hang_edits: BTreeSet<String>,
    on_send: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Channels and messages held in memory.
#[derive(Default)]
pub struct FakePlatform {
    inner: Mutex<Inner>,
}

impl FakePlatform {
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    pub fn add_channel(&self, id: &str) {
        self.with(|i| i.channels.insert(id.to_string()));
    }

    pub fn remove_channel(&self, id: &str) {
        self.with(|i| {
            i.channels.remove(id);
            i.messages.remove(id);
        });
    }

    pub fn forbid(&self, id: &str) {
        self.with(|i| i.forbidden.insert(id.to_string()));
    }

    /// Someone deleted the notification by hand.
    pub fn delete_externally(&self, channel: &str, message: &str) {
        self.with(|i| {
            if let Some(set) = i.messages.get_mut(channel) {
                set.remove(message);
            }
        });
    }

    pub fn messages(&self, channel: &str) -> Vec<String> {
        self.with(|i| {
            i.messages
                .get(channel)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn presence(&self) -> Vec<Presence> {
        self.with(|i| i.presence.clone())
    }

    pub fn lookups(&self) -> u32 {
        self.with(|i| i.lookups)
    }

    pub fn sends(&self) -> u32 {
        self.with(|i| i.sends)
    }

    pub fn edits(&self) -> u32 {
        self.with(|i| i.edits)
    }

    pub fn fail_edits(&self, fail: bool) {
        self.with(|i| i.fail_edits = fail);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.with(|i| i.fail_sends = fail);
    }

    /// Edits fail as if the bot lost access to every channel.
    pub fn deny_edits(&self, deny: bool) {
        self.with(|i| i.deny_edits = deny);
    }

    /// Edits in `channel` never answer.
    pub fn hang_edits(&self, channel: &str) {
        self.with(|i| i.hang_edits.insert(channel.to_string()));
    }

    /// Run `hook` after every successful send.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.with(|i| i.on_send = Some(Arc::new(hook)));
    }

    fn check_channel(i: &Inner, id: &str) -> PlatformResult<()> {
        if i.forbidden.contains(id) {
            return Err(PlatformError::PermissionDenied("missing access".into()));
        }
        if !i.channels.contains(id) {
            return Err(PlatformError::NotFound(Resource::Destination));
        }
        Ok(())
    }

    fn check_message(i: &Inner, channel: &str, message: &str) -> PlatformResult<()> {
        Self::check_channel(i, channel)?;
        let exists = i
            .messages
            .get(channel)
            .is_some_and(|set| set.contains(message));
        if !exists {
            return Err(PlatformError::NotFound(Resource::Message));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_destination(&self, id: &str) -> PlatformResult<Destination> {
        self.with(|i| {
            i.lookups += 1;
            Self::check_channel(i, id)?;
            Ok(Destination::new(id))
        })
    }

    async fn send(
        &self,
        dest: &Destination,
        _payload: &NotificationPayload,
    ) -> PlatformResult<MessageRef> {
        let (posted, hook) = self.with(|i| {
            Self::check_channel(i, &dest.id)?;
            if i.fail_sends {
                return Err(PlatformError::Transient("connection reset".into()));
            }
            i.sends += 1;
            i.next_id += 1;
            let id = format!("m{}", i.next_id);
            i.messages.entry(dest.id.clone()).or_default().insert(id.clone());
            Ok((id, i.on_send.clone()))
        })?;
        if let Some(hook) = hook {
            hook();
        }
        Ok(posted)
    }

    async fn edit(
        &self,
        dest: &Destination,
        message: &str,
        _payload: &NotificationPayload,
    ) -> PlatformResult<()> {
        if self.with(|i| i.hang_edits.contains(&dest.id)) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.with(|i| {
            if i.deny_edits {
                return Err(PlatformError::PermissionDenied("missing access".into()));
            }
            if i.fail_edits {
                return Err(PlatformError::Transient("gateway timeout".into()));
            }
            Self::check_message(i, &dest.id, message)?;
            i.edits += 1;
            Ok(())
        })
    }

    async fn delete(&self, dest: &Destination, message: &str) -> PlatformResult<()> {
        self.with(|i| {
            Self::check_message(i, &dest.id, message)?;
            if let Some(set) = i.messages.get_mut(&dest.id) {
                set.remove(message);
            }
            Ok(())
        })
    }

    async fn fetch_message(&self, dest: &Destination, message: &str) -> PlatformResult<()> {
        self.with(|i| Self::check_message(i, &dest.id, message))
    }

    async fn set_presence(&self, presence: Presence) -> PlatformResult<()> {
        self.with(|i| i.presence.push(presence));
        Ok(())
    }
}

// ── Prober ─────────────────────────────────────────────────────

/// Returns whatever statuses the test set, counting calls.
pub struct FakeProber {
    statuses: Mutex<BTreeMap<String, ServiceStatus>>,
    calls: AtomicU32,
}

impl Default for FakeProber {
    fn default() -> Self {
        Self {
            statuses: Mutex::new(BTreeMap::from([
                ("Alpha".to_string(), ServiceStatus::Operational),
                ("Beta".to_string(), ServiceStatus::Operational),
            ])),
            calls: AtomicU32::new(0),
        }
    }
}

impl FakeProber {
    pub fn set(&self, service: &str, status: ServiceStatus) {
        self.statuses.lock().unwrap().insert(service.to_string(), status);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self) -> StatusSnapshot {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StatusSnapshot::new(self.statuses.lock().unwrap().clone(), 1_700_000_000)
    }
}

// ── Harness ────────────────────────────────────────────────────

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub prober: Arc<FakeProber>,
    pub reconciler: Arc<Reconciler>,
    pub commands: CommandSurface,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_call_timeout(Duration::from_secs(10))
    }

    pub fn with_call_timeout(timeout: Duration) -> Self {
        let platform = Arc::new(FakePlatform::default());
        let prober = Arc::new(FakeProber::default());
        let resolver = Arc::new(CachedResolver::new(platform.clone()));
        let reconciler = Arc::new(Reconciler::new(
            ConfigStore::open_in_memory(5),
            prober.clone(),
            platform.clone(),
            resolver,
            Renderer::default(),
        )
        .with_call_timeout(timeout));
        let commands = CommandSurface::new(reconciler.clone());
        Self {
            platform,
            prober,
            reconciler,
            commands,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        self.reconciler.store()
    }
}
