use std::fmt;
use thiserror::Error;

/// The kind of record a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Phase,
    Section,
    TaskList,
    Task,
    Subtask,
    Family,
    User,
    Member,
    Invitation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Project => "project",
            EntityKind::Phase => "phase",
            EntityKind::Section => "section",
            EntityKind::TaskList => "task list",
            EntityKind::Task => "task",
            EntityKind::Subtask => "subtask",
            EntityKind::Family => "family",
            EntityKind::User => "user",
            EntityKind::Member => "member",
            EntityKind::Invitation => "invitation",
        };
        f.write_str(s)
    }
}

/// A record failed a field rule or a hierarchy rule. Never sent to the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(String),

    #[error("{field} must be between {min} and {max} characters")]
    InvalidLength {
        field: String,
        min: usize,
        max: usize,
    },

    #[error("{0} has an invalid value")]
    InvalidFormat(String),

    #[error("{0}: start must not be after end")]
    InvalidDateRange(String),

    #[error("{kind} '{id}': {reason}")]
    Relationship {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("duplicate {0}")]
    Duplicate(String),
}

impl ValidationError {
    pub fn relationship(kind: EntityKind, id: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Relationship {
            kind,
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Why an invitation code could not be redeemed. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvitationError {
    #[error("invalid invitation code: {0}")]
    InvalidCode(String),

    #[error("this invitation code has expired")]
    Expired,

    #[error("this invitation code has already been used")]
    AlreadyUsed,
}
