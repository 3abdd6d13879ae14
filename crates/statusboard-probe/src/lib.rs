//! statusboard-probe — upstream status probing for statusboard.
//!
//! Queries each monitored service's status documents and reduces whatever
//! comes back to one of three categories: operational, limited, or issues
//! detected. Probing never fails as a whole; an unreachable service is
//! simply reported as having issues.
//!
//! # Architecture
//!
//! ```text
//! HttpProber::probe()
//!   ├── per service (concurrently)
//!   │   ├── endpoints in order: primary, fallbacks
//!   │   │   └── RetryPolicy: transient failures back off base × 2^n
//!   │   └── liveness URL when every endpoint reports issues
//!   └── StatusSnapshot { service → ServiceStatus, taken_at }
//! ```
//!
//! The HTTP transport sits behind [`HttpFetch`] so the classification
//! logic can be exercised without a network.

pub mod catalog;
pub mod checker;
pub mod error;
pub mod fetch;
pub mod prober;
pub mod retry;
pub mod status;

pub use catalog::{ProbeSettings, ServiceCatalog, ServiceDefinition};
pub use error::{ProbeError, ProbeResult};
pub use fetch::{FetchError, HttpFetch, HttpReply, ReqwestFetcher};
pub use prober::{HttpProber, Prober};
pub use retry::RetryPolicy;
pub use status::{normalize_description, ServiceStatus, StatusSnapshot};
