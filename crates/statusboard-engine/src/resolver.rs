//! Destination handle resolution.
//!
//! `RemoteResolver` always asks the platform. `CachedResolver` serves
//! repeat lookups from memory and falls back to the platform on a miss.
//! The reachability sweep calls [`DestinationResolver::refresh`], which
//! always goes remote and re-seeds the cache, so the apply step that
//! follows in the same tick is served from memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::platform::{ChatPlatform, Destination, PlatformResult};

#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Resolve a destination, possibly from cache.
    async fn resolve(&self, id: &str) -> PlatformResult<Destination>;

    /// Resolve a destination remotely, updating any cache.
    async fn refresh(&self, id: &str) -> PlatformResult<Destination>;

    /// Forget anything cached for `id`.
    fn invalidate(&self, _id: &str) {}
}

/// No caching: every call goes to the platform.
pub struct RemoteResolver {
    platform: Arc<dyn ChatPlatform>,
}

impl RemoteResolver {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl DestinationResolver for RemoteResolver {
    async fn resolve(&self, id: &str) -> PlatformResult<Destination> {
        self.platform.fetch_destination(id).await
    }

    async fn refresh(&self, id: &str) -> PlatformResult<Destination> {
        self.platform.fetch_destination(id).await
    }
}

/// Cache-first resolution with remote fallback.
pub struct CachedResolver {
    platform: Arc<dyn ChatPlatform>,
    cache: Mutex<HashMap<String, Destination>>,
}

impl CachedResolver {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            platform,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, id: &str) -> Option<Destination> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn store(&self, dest: &Destination) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dest.id.clone(), dest.clone());
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DestinationResolver for CachedResolver {
    async fn resolve(&self, id: &str) -> PlatformResult<Destination> {
        if let Some(dest) = self.cached(id) {
            return Ok(dest);
        }
        debug!(destination = %id, "destination cache miss");
        self.refresh(id).await
    }

    async fn refresh(&self, id: &str) -> PlatformResult<Destination> {
        match self.platform.fetch_destination(id).await {
            Ok(dest) => {
                self.store(&dest);
                Ok(dest)
            }
            Err(e) => {
                if e.is_destination_lost() {
                    self.invalidate(id);
                }
                Err(e)
            }
        }
    }

    fn invalidate(&self, id: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}
