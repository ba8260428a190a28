//! Domain records for the project hierarchy and the legacy family schema.
//!
//! Nothing in this crate performs I/O. Records, composite keys, store paths and
//! field-level validation live here so that every other crate agrees on them.

pub mod error;
pub mod paths;
pub mod record;
pub mod validation;

pub mod families;
pub mod invitations;
pub mod lists;
pub mod phases;
pub mod projects;
pub mod sections;
pub mod subtasks;
pub mod tasks;
pub mod users;

pub use error::{EntityKind, InvitationError, ValidationError};
pub use paths::{
    CollectionPath, DocumentPath, FamilyKey, LegacyListKey, ListAddress, ListKey, PhaseKey,
    ProjectKey, TaskKey,
};
pub use record::Record;
pub use validation::Validate;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
