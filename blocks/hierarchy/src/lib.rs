//! The project hierarchy: one generic collection manager configured for each
//! level (project, phase, section, list, task, subtask), plus the operations
//! that span levels: ordering, cascade delete, tree validation, export/import,
//! family migration and invitations.

pub mod cascade;
pub mod export;
pub mod invitations;
pub mod levels;
pub mod manager;
pub mod migration;
pub mod ordering;
pub mod relationships;
pub mod tree;

pub use invitations::{AcceptOutcome, InvitationManager};
pub use levels::{
    ListLevel, ListManager, PhaseLevel, PhaseManager, ProjectLevel, ProjectManager, SectionLevel,
    SectionManager, SubtaskLevel, SubtaskManager, TaskLevel, TaskManager,
};
pub use manager::{CollectionManager, Level, ManagerState};
pub use migration::{MigrationReport, MigrationState, MigrationUtility};
pub use tree::ProjectTree;
