//! Infrastructure shared by every block: the document store adapter, the error
//! taxonomy managers report, configuration, logging and external collaborators.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use error::{StoreError, StoreErrorKind, SyncError};
pub use state::AppState;
pub use store::{
    DocumentStore, ListenerRegistration, SnapshotFeed, StoredDocument, WriteBatch, WriteOp,
};
