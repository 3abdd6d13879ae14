//! services.toml — which upstream services to monitor and how.
//!
//! ```toml
//! [probe]
//! timeout_secs = 10
//! max_retries = 2
//! base_delay_ms = 500
//!
//! [[service]]
//! name = "OpenAI"
//! status_page = "https://status.openai.com/"
//! endpoints = [
//!     "https://status.openai.com/api/v2/status.json",
//!     "https://status.openai.com/api/v2/summary.json",
//! ]
//! liveness = "https://api.openai.com/v1/models"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, ProbeResult};
use crate::retry::RetryPolicy;

/// One monitored upstream service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Display name; also the key in status snapshots.
    pub name: String,
    /// Human-facing status page, linked from notifications.
    #[serde(default)]
    pub status_page: Option<String>,
    /// Status documents, primary first.
    pub endpoints: Vec<String>,
    /// Reachability check used when every endpoint reports issues.
    #[serde(default)]
    pub liveness: Option<String>,
}

/// Timeouts and retry budget shared by every probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }
}

/// The full services file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCatalog {
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(rename = "service")]
    pub services: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn from_file(path: &Path) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ProbeResult<Self> {
        let catalog: ServiceCatalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// OpenAI and Anthropic, both hosted on Statuspage.
    pub fn builtin() -> Self {
        Self {
            probe: ProbeSettings::default(),
            services: vec![
                statuspage_service(
                    "OpenAI",
                    "https://status.openai.com",
                    Some("https://api.openai.com/v1/models"),
                ),
                statuspage_service(
                    "Anthropic",
                    "https://status.anthropic.com",
                    Some("https://api.anthropic.com/v1/models"),
                ),
            ],
        }
    }

    fn validate(&self) -> ProbeResult<()> {
        if self.services.is_empty() {
            return Err(ProbeError::Catalog("no services defined".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ProbeError::Catalog("probe.timeout_secs must be positive".into()));
        }
        let mut seen = HashSet::new();
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                return Err(ProbeError::Catalog("service with empty name".into()));
            }
            if !seen.insert(svc.name.as_str()) {
                return Err(ProbeError::Catalog(format!("duplicate service '{}'", svc.name)));
            }
            if svc.endpoints.is_empty() {
                return Err(ProbeError::Catalog(format!(
                    "service '{}' has no endpoints",
                    svc.name
                )));
            }
        }
        Ok(())
    }
}

fn statuspage_service(name: &str, base: &str, liveness: Option<&str>) -> ServiceDefinition {
    ServiceDefinition {
        name: name.to_string(),
        status_page: Some(format!("{base}/")),
        endpoints: vec![
            format!("{base}/api/v2/status.json"),
            format!("{base}/api/v2/summary.json"),
        ],
        liveness: liveness.map(str::to_string),
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}
