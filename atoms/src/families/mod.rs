//! The legacy family schema: `/families/{familyId}/taskLists/{listId}/tasks/{taskId}`.
//! Legacy lists reuse [`crate::lists::TaskList`] with a `Legacy` parent.

pub mod model;

pub use model::{Family, LegacyTask};
