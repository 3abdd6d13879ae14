//! Command error types.

use thiserror::Error;

use statusboard_state::StoreError;

use crate::platform::PlatformError;

/// Errors returned by administrative commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("refresh interval must be at least 1 minute (got {0})")]
    InvalidInterval(u32),

    #[error("a status tracker already exists for destination {0}")]
    AlreadyExists(String),

    #[error("no status tracker exists for destination {0}")]
    NotFound(String),

    #[error("destination is not accessible: {0}")]
    Unreachable(PlatformError),

    #[error("platform error: {0}")]
    Platform(PlatformError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => CommandError::NotFound(id),
            StoreError::AlreadyExists(id) => CommandError::AlreadyExists(id),
            StoreError::InvalidInterval(m) => CommandError::InvalidInterval(m),
            other => CommandError::Store(other),
        }
    }
}

impl From<PlatformError> for CommandError {
    fn from(e: PlatformError) -> Self {
        if e.is_destination_lost() {
            CommandError::Unreachable(e)
        } else {
            CommandError::Platform(e)
        }
    }
}

impl CommandError {
    /// Failures whose detail stays in the logs.
    pub fn is_internal(&self) -> bool {
        matches!(self, CommandError::Platform(_) | CommandError::Store(_))
    }

    /// Message safe to show the invoking user.
    pub fn public_message(&self) -> String {
        match self {
            CommandError::Platform(_) | CommandError::Store(_) => {
                "Something went wrong while processing the command. Please try again later."
                    .to_string()
            }
            CommandError::Unreachable(_) => {
                "The bot cannot access that destination. Check its permissions.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Resource;

    #[test]
    fn store_errors_map_to_user_errors() {
        assert!(matches!(
            CommandError::from(StoreError::NotFound("x".into())),
            CommandError::NotFound(_)
        ));
        assert!(matches!(
            CommandError::from(StoreError::Persist("disk full".into())),
            CommandError::Store(_)
        ));
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = CommandError::from(StoreError::Persist("/var/lib/secret: EIO".into()));
        assert!(err.is_internal());
        assert!(!err.public_message().contains("secret"));

        let err = CommandError::from(PlatformError::Other("500 from upstream".into()));
        assert!(err.is_internal());
        assert!(!err.public_message().contains("500"));
    }

    #[test]
    fn lost_destination_is_user_facing() {
        let err = CommandError::from(PlatformError::NotFound(Resource::Destination));
        assert!(matches!(err, CommandError::Unreachable(_)));
        assert!(!err.is_internal());
    }

    #[test]
    fn validation_message_is_verbatim() {
        let err = CommandError::InvalidInterval(0);
        assert_eq!(err.public_message(), err.to_string());
    }
}
