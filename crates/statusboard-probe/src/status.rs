//! Status categories and the per-tick snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized health of one upstream service.
///
/// Variants are ordered by severity so the worst of several statuses is
/// simply their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Operational,
    Limited,
    IssuesDetected,
}

impl ServiceStatus {
    /// Human-readable label used in rendered notifications.
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Operational => "Operational",
            ServiceStatus::Limited => "Limited",
            ServiceStatus::IssuesDetected => "Issues Detected",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a status page's self-reported description to a category.
///
/// Exact "all systems operational" (any case) is operational, anything
/// mentioning "limited" is limited, everything else counts as issues.
pub fn normalize_description(description: &str) -> ServiceStatus {
    let lowered = description.trim().to_lowercase();
    if lowered == "all systems operational" {
        ServiceStatus::Operational
    } else if lowered.contains("limited") {
        ServiceStatus::Limited
    } else {
        ServiceStatus::IssuesDetected
    }
}

/// Result of probing every configured service once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Service name → status.
    pub statuses: BTreeMap<String, ServiceStatus>,
    /// Unix timestamp (seconds) when the probe completed.
    pub taken_at: u64,
}

impl StatusSnapshot {
    pub fn new(statuses: BTreeMap<String, ServiceStatus>, taken_at: u64) -> Self {
        Self { statuses, taken_at }
    }

    /// The most severe status across all services. Empty ⇒ operational.
    pub fn worst(&self) -> ServiceStatus {
        self.statuses
            .values()
            .copied()
            .max()
            .unwrap_or(ServiceStatus::Operational)
    }

    pub fn get(&self, service: &str) -> Option<ServiceStatus> {
        self.statuses.get(service).copied()
    }
}
