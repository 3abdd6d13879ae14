//! The `Prober` seam and its HTTP implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::catalog::{ServiceCatalog, ServiceDefinition};
use crate::checker::probe_service;
use crate::error::ProbeResult;
use crate::fetch::{HttpFetch, ReqwestFetcher};
use crate::retry::RetryPolicy;
use crate::status::{ServiceStatus, StatusSnapshot};

/// Produces a status snapshot for every monitored service.
///
/// Implementations never fail: a service that cannot be assessed is
/// reported as `IssuesDetected`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> StatusSnapshot;
}

/// Probes all catalog services concurrently over HTTP.
pub struct HttpProber {
    services: Arc<[ServiceDefinition]>,
    fetch: Arc<dyn HttpFetch>,
    policy: RetryPolicy,
}

impl HttpProber {
    pub fn new(
        services: Vec<ServiceDefinition>,
        fetch: Arc<dyn HttpFetch>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            services: services.into(),
            fetch,
            policy,
        }
    }

    /// Build a reqwest-backed prober from a catalog.
    pub fn from_catalog(catalog: &ServiceCatalog) -> ProbeResult<Self> {
        let fetch = ReqwestFetcher::new(catalog.probe.timeout())?;
        Ok(Self::new(
            catalog.services.clone(),
            Arc::new(fetch),
            catalog.probe.retry_policy(),
        ))
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self) -> StatusSnapshot {
        let mut statuses: BTreeMap<String, ServiceStatus> = self
            .services
            .iter()
            .map(|s| (s.name.clone(), ServiceStatus::IssuesDetected))
            .collect();

        let mut tasks = JoinSet::new();
        for index in 0..self.services.len() {
            let services = self.services.clone();
            let fetch = self.fetch.clone();
            let policy = self.policy;
            tasks.spawn(async move {
                let service = &services[index];
                let status = probe_service(fetch.as_ref(), service, &policy).await;
                (service.name.clone(), status)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, status)) => {
                    statuses.insert(name, status);
                }
                Err(e) => error!(error = %e, "probe task failed"),
            }
        }

        let snapshot = StatusSnapshot::new(statuses, epoch_secs());
        debug!(worst = %snapshot.worst(), services = snapshot.statuses.len(), "probe complete");
        snapshot
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
