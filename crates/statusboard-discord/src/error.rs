//! Discord adapter errors and HTTP failure classification.

use thiserror::Error;

use statusboard_engine::{PlatformError, Resource};

/// JSON error codes Discord returns alongside 404s.
const UNKNOWN_CHANNEL: u64 = 10003;
const UNKNOWN_MESSAGE: u64 = 10008;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("discord rejected the request: {0}")]
    Api(#[from] PlatformError),
}

impl DiscordError {
    /// Retrying cannot fix this (bad token, bad config).
    pub fn is_fatal(&self) -> bool {
        match self {
            DiscordError::Config(_) | DiscordError::Client(_) => true,
            DiscordError::Api(e) => !is_retryable(e),
        }
    }
}

pub type DiscordResult<T> = Result<T, DiscordError>;

pub(crate) fn is_retryable(e: &PlatformError) -> bool {
    matches!(
        e,
        PlatformError::Transient(_) | PlatformError::RateLimited { .. }
    )
}

/// Map a non-success response onto the engine's error vocabulary.
///
/// `code` is the `code` field of Discord's JSON error body, when present;
/// `retry_after` is in seconds as Discord reports it.
pub(crate) fn classify(
    status: u16,
    code: Option<u64>,
    retry_after: Option<f64>,
    message: &str,
) -> PlatformError {
    match status {
        401 => PlatformError::Unauthorized,
        403 => PlatformError::PermissionDenied(message.to_string()),
        404 => match code {
            Some(UNKNOWN_MESSAGE) => PlatformError::NotFound(Resource::Message),
            Some(UNKNOWN_CHANNEL) => PlatformError::NotFound(Resource::Destination),
            _ => PlatformError::Other(format!("404: {message}")),
        },
        429 => PlatformError::RateLimited {
            retry_after_ms: retry_after.map(|s| (s * 1000.0) as u64).unwrap_or(1000),
        },
        500..=599 => PlatformError::Transient(format!("{status}: {message}")),
        _ => PlatformError::Other(format!("{status}: {message}")),
    }
}

pub(crate) fn transport(e: reqwest::Error) -> PlatformError {
    PlatformError::Transient(e.to_string())
}
