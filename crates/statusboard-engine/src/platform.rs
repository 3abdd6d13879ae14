//! Chat-platform boundary.
//!
//! Everything the engine needs from the platform, expressed as one async
//! trait. Errors are classified so the engine can tell a deleted message
//! (recreate it) from a deleted or forbidden channel (prune it) from a
//! hiccup (try again next tick).

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use statusboard_state::{DestinationId, MessageRef};

use crate::render::{NotificationPayload, Presence};

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Destination,
    Message,
}

/// Errors surfaced by the platform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0:?} not found")]
    NotFound(Resource),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("transient network error: {0}")]
    Transient(String),

    #[error("credentials rejected")]
    Unauthorized,

    #[error("platform error: {0}")]
    Other(String),
}

impl PlatformError {
    /// The destination itself is gone or forbidden; retrying will not help.
    pub fn is_destination_lost(&self) -> bool {
        matches!(
            self,
            PlatformError::NotFound(Resource::Destination) | PlatformError::PermissionDenied(_)
        )
    }

    /// Only the rendered message is gone.
    pub fn is_message_missing(&self) -> bool {
        matches!(self, PlatformError::NotFound(Resource::Message))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// A resolved notification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub id: DestinationId,
    /// Display name, when the platform reports one.
    pub name: Option<String>,
}

impl Destination {
    pub fn new(id: impl Into<DestinationId>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Operations consumed from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Look a destination up remotely (no cache).
    async fn fetch_destination(&self, id: &str) -> PlatformResult<Destination>;

    /// Post a new notification; returns its reference.
    async fn send(
        &self,
        dest: &Destination,
        payload: &NotificationPayload,
    ) -> PlatformResult<MessageRef>;

    /// Replace an existing notification's content in place.
    async fn edit(
        &self,
        dest: &Destination,
        message: &str,
        payload: &NotificationPayload,
    ) -> PlatformResult<()>;

    async fn delete(&self, dest: &Destination, message: &str) -> PlatformResult<()>;

    /// Check that a notification still exists.
    async fn fetch_message(&self, dest: &Destination, message: &str) -> PlatformResult<()>;

    /// Set the platform-wide presence indicator.
    async fn set_presence(&self, presence: Presence) -> PlatformResult<()>;
}

/// Completes a command reply that was acknowledged before the work finished.
#[async_trait]
pub trait CommandResponder: Send + Sync {
    /// Replace the placeholder reply identified by `interaction_token`.
    async fn edit_response(&self, interaction_token: &str, content: &str) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_lost_classification() {
        assert!(PlatformError::NotFound(Resource::Destination).is_destination_lost());
        assert!(PlatformError::PermissionDenied("missing access".into()).is_destination_lost());
        assert!(!PlatformError::NotFound(Resource::Message).is_destination_lost());
        assert!(!PlatformError::Transient("reset".into()).is_destination_lost());
        assert!(!PlatformError::RateLimited { retry_after_ms: 10 }.is_destination_lost());
    }

    #[test]
    fn message_missing_classification() {
        assert!(PlatformError::NotFound(Resource::Message).is_message_missing());
        assert!(!PlatformError::NotFound(Resource::Destination).is_message_missing());
    }
}
