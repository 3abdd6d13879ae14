//! Prober error types.
//!
//! Probing itself never errors; these cover setup (catalog loading, HTTP
//! client construction).

use thiserror::Error;

/// Errors that can occur while setting up the prober.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read service catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse service catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid service catalog: {0}")]
    Catalog(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
