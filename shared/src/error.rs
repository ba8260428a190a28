use shigodeki_atoms::{EntityKind, InvitationError, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// An update targeted a document that does not exist.
    NotFound,
    /// The store cannot be reached, or the client is offline.
    Unavailable,
    PermissionDenied,
    /// A batch was rejected as a whole (conflict, condition failure).
    Aborted,
    InvalidArgument,
    /// A stored document could not be decoded, or any other failure.
    Internal,
}

/// Failure reported by a [`crate::DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("no document at {what}"))
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidArgument, message)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::internal(format!("document codec: {err}"))
    }
}

/// Everything a manager operation can fail with. The message is shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("could not save changes: {0}")]
    Persistence(#[from] StoreError),

    #[error("{kind} '{id}' was not found")]
    NotFound { kind: EntityKind, id: String },

    /// A migration step failed. Nodes created by earlier steps are left in place;
    /// `project_id` names the partially migrated project when one was created.
    #[error("migration failed while {state}: {message}")]
    Migration {
        state: String,
        project_id: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Invitation(#[from] InvitationError),
}

impl SyncError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        SyncError::NotFound { kind, id: id.into() }
    }

    /// Store failures caused by the store being unreachable can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Persistence(StoreError {
                kind: StoreErrorKind::Unavailable | StoreErrorKind::Aborted,
                ..
            })
        )
    }
}
