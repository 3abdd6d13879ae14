//! Stub platform and prober shared by the router tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use statusboard_engine::*;
use statusboard_probe::{Prober, ServiceStatus, StatusSnapshot};
use statusboard_state::ConfigStore;

/// Every channel exists except "gone"; "broken" rejects sends.
#[derive(Default)]
pub struct StubPlatform {
    next_id: AtomicU64,
}

#[async_trait]
impl ChatPlatform for StubPlatform {
    async fn fetch_destination(&self, id: &str) -> PlatformResult<Destination> {
        if id == "gone" {
            return Err(PlatformError::NotFound(Resource::Destination));
        }
        Ok(Destination::new(id))
    }

    async fn send(&self, dest: &Destination, _: &NotificationPayload) -> PlatformResult<String> {
        if dest.id == "broken" {
            return Err(PlatformError::Other("internal failure at shard 7".into()));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    async fn edit(&self, _: &Destination, _: &str, _: &NotificationPayload) -> PlatformResult<()> {
        Ok(())
    }

    async fn delete(&self, _: &Destination, _: &str) -> PlatformResult<()> {
        Ok(())
    }

    async fn fetch_message(&self, _: &Destination, _: &str) -> PlatformResult<()> {
        Ok(())
    }

    async fn set_presence(&self, _: Presence) -> PlatformResult<()> {
        Ok(())
    }
}

pub struct StubProber;

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self) -> StatusSnapshot {
        StatusSnapshot::new(
            BTreeMap::from([("Alpha".to_string(), ServiceStatus::Operational)]),
            1_700_000_000,
        )
    }
}

pub fn commands() -> CommandSurface {
    let platform = Arc::new(StubPlatform::default());
    let reconciler = Arc::new(Reconciler::new(
        ConfigStore::open_in_memory(5),
        Arc::new(StubProber),
        platform.clone(),
        Arc::new(CachedResolver::new(platform)),
        Renderer::default(),
    ));
    CommandSurface::new(reconciler)
}
