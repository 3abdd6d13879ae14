//! Per-endpoint and per-service probe logic.
//!
//! An endpoint attempt either yields a status or a failure. Transport
//! errors and non-2xx replies are retried under the [`RetryPolicy`]; a 429
//! is an answer in itself (the service is up but throttling us) and is
//! never retried.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::ServiceDefinition;
use crate::fetch::{FetchError, HttpFetch};
use crate::retry::RetryPolicy;
use crate::status::{normalize_description, ServiceStatus};

const TOO_MANY_REQUESTS: u16 = 429;

/// Why a single attempt produced no status.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] FetchError),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("undecodable status document: {0}")]
    Decode(String),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transport(_) | AttemptError::Status(_))
    }
}

/// Statuspage-style document; only the description matters.
#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    status: Option<StatusBlock>,
}

#[derive(Debug, Deserialize)]
struct StatusBlock {
    #[serde(default)]
    description: Option<String>,
}

impl StatusDocument {
    fn classify(&self) -> ServiceStatus {
        self.status
            .as_ref()
            .and_then(|s| s.description.as_deref())
            .map(normalize_description)
            .unwrap_or(ServiceStatus::IssuesDetected)
    }
}

async fn fetch_document(fetch: &dyn HttpFetch, url: &str) -> Result<ServiceStatus, AttemptError> {
    let reply = fetch.get(url).await?;
    match reply.status {
        TOO_MANY_REQUESTS => Ok(ServiceStatus::Limited),
        200..=299 => {
            let doc: StatusDocument = serde_json::from_slice(&reply.body)
                .map_err(|e| AttemptError::Decode(e.to_string()))?;
            Ok(doc.classify())
        }
        code => Err(AttemptError::Status(code)),
    }
}

async fn fetch_liveness(fetch: &dyn HttpFetch, url: &str) -> Result<ServiceStatus, AttemptError> {
    let reply = fetch.get(url).await?;
    match reply.status {
        TOO_MANY_REQUESTS => Ok(ServiceStatus::Limited),
        // Unauthenticated calls are expected to be rejected; any answer
        // below 500 proves the API is serving.
        200..=499 => Ok(ServiceStatus::Operational),
        code => Err(AttemptError::Status(code)),
    }
}

/// Probe one status document, retrying transient failures.
///
/// Returns `IssuesDetected` once the retry budget is spent.
pub async fn probe_endpoint(
    fetch: &dyn HttpFetch,
    url: &str,
    policy: &RetryPolicy,
) -> ServiceStatus {
    match policy
        .run(|_| fetch_document(fetch, url), AttemptError::is_transient)
        .await
    {
        Ok(status) => status,
        Err(e) => {
            debug!(%url, error = %e, "status endpoint failed");
            ServiceStatus::IssuesDetected
        }
    }
}

/// Reachability check of a non-status API.
pub async fn probe_liveness(
    fetch: &dyn HttpFetch,
    url: &str,
    policy: &RetryPolicy,
) -> ServiceStatus {
    match policy
        .run(|_| fetch_liveness(fetch, url), AttemptError::is_transient)
        .await
    {
        Ok(status) => status,
        Err(e) => {
            debug!(%url, error = %e, "liveness check failed");
            ServiceStatus::IssuesDetected
        }
    }
}

/// Resolve one service's status from its endpoints and liveness fallback.
pub async fn probe_service(
    fetch: &dyn HttpFetch,
    service: &ServiceDefinition,
    policy: &RetryPolicy,
) -> ServiceStatus {
    for url in &service.endpoints {
        let status = probe_endpoint(fetch, url, policy).await;
        if status != ServiceStatus::IssuesDetected {
            debug!(service = %service.name, %url, %status, "service probed");
            return status;
        }
    }

    let status = match &service.liveness {
        Some(url) => probe_liveness(fetch, url, policy).await,
        None => ServiceStatus::IssuesDetected,
    };
    if status == ServiceStatus::IssuesDetected {
        warn!(service = %service.name, "all status endpoints report issues");
    } else {
        debug!(service = %service.name, %status, "status derived from liveness check");
    }
    status
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::scripted::ScriptedFetch;
    use crate::fetch::HttpReply;

    const PRIMARY: &str = "https://status.test/api/v2/status.json";
    const FALLBACK: &str = "https://status.test/api/v2/summary.json";
    const LIVENESS: &str = "https://api.test/v1/models";

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    fn service(liveness: bool) -> ServiceDefinition {
        ServiceDefinition {
            name: "Test".into(),
            status_page: None,
            endpoints: vec![PRIMARY.into(), FALLBACK.into()],
            liveness: liveness.then(|| LIVENESS.to_string()),
        }
    }

    #[tokio::test]
    async fn operational_description() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "All Systems Operational");
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::Operational
        );
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let fetch = ScriptedFetch::default();
        fetch.status(PRIMARY, 429);
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::Limited
        );
        assert_eq!(fetch.calls(PRIMARY), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_issues() {
        let fetch = ScriptedFetch::default();
        fetch.status(PRIMARY, 503).status(PRIMARY, 502).status(PRIMARY, 500);
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::IssuesDetected
        );
        assert_eq!(fetch.calls(PRIMARY), 3);
    }

    #[tokio::test]
    async fn timeout_then_success() {
        let fetch = ScriptedFetch::default();
        fetch
            .push(PRIMARY, Err(FetchError::Timeout))
            .json(PRIMARY, "All Systems Operational");
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::Operational
        );
        assert_eq!(fetch.calls(PRIMARY), 2);
    }

    #[tokio::test]
    async fn garbage_body_is_issues_without_retry() {
        let fetch = ScriptedFetch::default();
        fetch.push(PRIMARY, Ok(HttpReply::new(200, "<html>maintenance</html>")));
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::IssuesDetected
        );
        assert_eq!(fetch.calls(PRIMARY), 1);
    }

    #[tokio::test]
    async fn missing_description_is_issues() {
        let fetch = ScriptedFetch::default();
        fetch.push(PRIMARY, Ok(HttpReply::new(200, r#"{"page": {}}"#)));
        assert_eq!(
            probe_endpoint(&fetch, PRIMARY, &policy()).await,
            ServiceStatus::IssuesDetected
        );
    }

    #[tokio::test]
    async fn fallback_used_when_primary_reports_issues() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "Partial outage");
        fetch.json(FALLBACK, "Limited availability");
        assert_eq!(
            probe_service(&fetch, &service(false), &policy()).await,
            ServiceStatus::Limited
        );
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "all systems operational");
        assert_eq!(
            probe_service(&fetch, &service(true), &policy()).await,
            ServiceStatus::Operational
        );
        assert_eq!(fetch.calls(FALLBACK), 0);
        assert_eq!(fetch.calls(LIVENESS), 0);
    }

    #[tokio::test]
    async fn liveness_client_error_means_operational() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "Major outage");
        fetch.json(FALLBACK, "Major outage");
        fetch.status(LIVENESS, 401);
        assert_eq!(
            probe_service(&fetch, &service(true), &policy()).await,
            ServiceStatus::Operational
        );
    }

    #[tokio::test]
    async fn liveness_rate_limit_means_limited() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "Major outage");
        fetch.json(FALLBACK, "Major outage");
        fetch.status(LIVENESS, 429);
        assert_eq!(
            probe_service(&fetch, &service(true), &policy()).await,
            ServiceStatus::Limited
        );
    }

    #[tokio::test]
    async fn unreachable_everywhere_is_issues() {
        // Nothing scripted: every call is a network error.
        let fetch = ScriptedFetch::default();
        assert_eq!(
            probe_service(&fetch, &service(true), &policy()).await,
            ServiceStatus::IssuesDetected
        );
        assert_eq!(fetch.calls(PRIMARY), 3);
        assert_eq!(fetch.calls(FALLBACK), 3);
        assert_eq!(fetch.calls(LIVENESS), 3);
    }

    #[tokio::test]
    async fn no_liveness_keeps_issues() {
        let fetch = ScriptedFetch::default();
        fetch.json(PRIMARY, "Degraded performance");
        fetch.json(FALLBACK, "Degraded performance");
        assert_eq!(
            probe_service(&fetch, &service(false), &policy()).await,
            ServiceStatus::IssuesDetected
        );
    }
}
