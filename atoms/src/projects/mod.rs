pub mod model;

pub use model::{OwnerType, Permission, Project, ProjectMember, Role};
